// Copyright 2019 Dmitry Tantsur <divius.inside@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Identity administration for credential providers.

use std::rc::Rc;

use crate::auth::{Credentials, IdentityVersion};
use crate::clients::{Domain, IdentityAdminApi, NewProject, NewUser, Project, Role, User};
use crate::{Error, ErrorKind, Result};

/// Creates and deletes projects, users and role assignments.
///
/// The identity version is fixed at construction.
#[derive(Debug, Clone)]
pub enum CredsClient {
    /// Identity API v2.0.
    V2 {
        /// Admin identity client.
        identity: Rc<dyn IdentityAdminApi>,
    },
    /// Identity API v3.
    V3 {
        /// Admin identity client.
        identity: Rc<dyn IdentityAdminApi>,
        /// Domain to create projects and users in.
        domain: Domain,
    },
}

fn v3_only(what: &str) -> Error {
    Error::new(
        ErrorKind::InvalidConfig,
        format!("{} requires Identity API v3", what),
    )
}

impl CredsClient {
    /// Create a client.
    ///
    /// With Identity API v3 the domain is looked up by name, a missing
    /// domain results in `InvalidCredentials`.
    pub fn new(
        identity_version: IdentityVersion,
        identity: Rc<dyn IdentityAdminApi>,
        domain_name: &str,
    ) -> Result<CredsClient> {
        match identity_version {
            IdentityVersion::V2 => Ok(CredsClient::V2 { identity }),
            IdentityVersion::V3 => {
                let found = match identity.list_domains(Some(domain_name)) {
                    Ok(domains) => domains.into_iter().find(|d| d.name == domain_name),
                    Err(ref e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                };
                let domain = found.ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidCredentials,
                        format!("Domain {} cannot be found", domain_name),
                    )
                })?;
                debug!("Using domain {} ({}) for credentials", domain.name, domain.id);
                Ok(CredsClient::V3 { identity, domain })
            }
        }
    }

    fn identity(&self) -> &Rc<dyn IdentityAdminApi> {
        match *self {
            CredsClient::V2 { ref identity } => identity,
            CredsClient::V3 { ref identity, .. } => identity,
        }
    }

    /// Identity API version.
    pub fn identity_version(&self) -> IdentityVersion {
        match *self {
            CredsClient::V2 { .. } => IdentityVersion::V2,
            CredsClient::V3 { .. } => IdentityVersion::V3,
        }
    }

    /// Domain of created resources, `None` for Identity API v2.0.
    pub fn domain(&self) -> Option<&Domain> {
        match *self {
            CredsClient::V2 { .. } => None,
            CredsClient::V3 { ref domain, .. } => Some(domain),
        }
    }

    /// Create a project.
    pub fn create_project<S1, S2>(&self, name: S1, description: S2) -> Result<Project>
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.identity().create_project(&NewProject {
            name: name.into(),
            description: description.into(),
            domain_id: self.domain().map(|d| d.id.clone()),
        })
    }

    /// Delete a project.
    pub fn delete_project(&self, id: &str) -> Result<()> {
        self.identity().delete_project(id)
    }

    /// Create a user in a project.
    pub fn create_user<S1, S2, S3>(
        &self,
        username: S1,
        password: S2,
        project: &Project,
        email: S3,
    ) -> Result<User>
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        self.identity().create_user(&NewUser {
            name: username.into(),
            password: password.into(),
            project_id: project.id.clone(),
            email: email.into(),
            domain_id: self.domain().map(|d| d.id.clone()),
        })
    }

    /// Delete a user.
    pub fn delete_user(&self, id: &str) -> Result<()> {
        self.identity().delete_user(id)
    }

    fn find_role(&self, name: &str) -> Result<Role> {
        self.identity()
            .list_roles()?
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ResourceNotFound,
                    format!("No {} role found", name),
                )
            })
    }

    /// Create a role unless a role with this name exists (ignoring case).
    pub fn create_user_role(&self, name: &str) -> Result<Role> {
        match self.find_role(name) {
            Ok(role) => {
                debug!("Role {} already exists", name);
                Ok(role)
            }
            Err(ref e) if e.is_not_found() => self.identity().create_role(name),
            Err(e) => Err(e),
        }
    }

    /// Grant a role to a user on a project.
    ///
    /// An existing assignment is not an error.
    pub fn assign_user_role(&self, user: &User, project: &Project, role_name: &str) -> Result<()> {
        let role = self.find_role(role_name)?;
        match self
            .identity()
            .assign_project_role(&project.id, &user.id, &role.id)
        {
            Err(ref e) if e.kind() == ErrorKind::Conflict => {
                debug!(
                    "Role {} already assigned to user {} on project {}",
                    role_name, user.id, project.id
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Grant a role to a user on a domain, by default the client's domain.
    pub fn assign_user_role_on_domain(
        &self,
        user: &User,
        role_name: &str,
        domain_id: Option<&str>,
    ) -> Result<()> {
        let domain = self
            .domain()
            .ok_or_else(|| v3_only("Domain role assignment"))?;
        let role = self.find_role(role_name)?;
        let domain_id = domain_id.unwrap_or(&domain.id);
        match self.identity().assign_domain_role(domain_id, &user.id, &role.id) {
            Err(ref e) if e.kind() == ErrorKind::Conflict => Ok(()),
            other => other,
        }
    }

    /// Grant a system role to a user.
    pub fn assign_user_role_on_system(&self, user: &User, role_name: &str) -> Result<()> {
        if self.domain().is_none() {
            return Err(v3_only("System role assignment"));
        }
        let role = self.find_role(role_name)?;
        match self.identity().assign_system_role(&user.id, &role.id) {
            Err(ref e) if e.kind() == ErrorKind::Conflict => Ok(()),
            other => other,
        }
    }

    /// Assemble credentials for a created user.
    ///
    /// `domain` and `system` select domain and system scope, they require
    /// Identity API v3.
    pub fn get_credentials(
        &self,
        user: &User,
        project: Option<&Project>,
        password: &str,
        domain: Option<&str>,
        system: Option<&str>,
    ) -> Result<Credentials> {
        let mut attrs = vec![
            ("username", user.name.clone()),
            ("user_id", user.id.clone()),
            ("password", password.to_string()),
        ];
        match self.domain() {
            None => {
                if domain.is_some() || system.is_some() {
                    return Err(v3_only("Domain or system scope"));
                }
                if let Some(project) = project {
                    attrs.push(("tenant_name", project.name.clone()));
                    attrs.push(("tenant_id", project.id.clone()));
                }
            }
            Some(creds_domain) => {
                attrs.push(("user_domain_name", creds_domain.name.clone()));
                attrs.push(("user_domain_id", creds_domain.id.clone()));
                if let Some(project) = project {
                    attrs.push(("project_name", project.name.clone()));
                    attrs.push(("project_id", project.id.clone()));
                    attrs.push(("project_domain_name", creds_domain.name.clone()));
                    attrs.push(("project_domain_id", creds_domain.id.clone()));
                }
                if let Some(domain) = domain {
                    attrs.push(("domain_name", domain.to_string()));
                    if domain == creds_domain.name {
                        attrs.push(("domain_id", creds_domain.id.clone()));
                    }
                }
                if let Some(system) = system {
                    attrs.push(("system", system.to_string()));
                }
            }
        }
        Credentials::new(self.identity_version(), attrs)
    }
}

#[cfg(test)]
pub mod test {
    use std::rc::Rc;

    use super::CredsClient;
    use crate::auth::IdentityVersion;
    use crate::clients::fake::FakeCloud;
    use crate::ErrorKind;

    fn v3(cloud: &FakeCloud) -> CredsClient {
        CredsClient::new(IdentityVersion::V3, Rc::new(cloud.clone()), "Default").unwrap()
    }

    #[test]
    fn test_v3_missing_domain() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let err = CredsClient::new(IdentityVersion::V3, Rc::new(cloud), "Nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_v3_domain_lookup_not_found() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        cloud.fail("list_domains", ErrorKind::ResourceNotFound);
        let err = CredsClient::new(IdentityVersion::V3, Rc::new(cloud), "Default").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_create_user_role_idempotent() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["Member"]);
        let client = v3(&cloud);
        let role = client.create_user_role("member").unwrap();
        assert_eq!(role.name, "Member");
        assert_eq!(cloud.count("create_role"), 0);
        let role = client.create_user_role("reader").unwrap();
        assert_eq!(role.name, "reader");
        assert_eq!(cloud.count("create_role"), 1);
    }

    #[test]
    fn test_assign_user_role() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let client = v3(&cloud);
        let project = client.create_project("p", "desc").unwrap();
        assert_eq!(project.domain_id.as_deref(), Some("default"));
        let user = client.create_user("u", "pass", &project, "u@example.com").unwrap();

        client.assign_user_role(&user, &project, "MEMBER").unwrap();
        // Repeated assignment conflicts and is ignored
        client.assign_user_role(&user, &project, "member").unwrap();
        assert_eq!(cloud.state.borrow().project_roles.len(), 1);

        let err = client.assign_user_role(&user, &project, "unknown").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    }

    #[test]
    fn test_v2_rejects_domain_and_system() {
        let cloud = FakeCloud::new(IdentityVersion::V2, &["admin"]);
        let client = CredsClient::new(IdentityVersion::V2, Rc::new(cloud.clone()), "ignored").unwrap();
        assert!(client.domain().is_none());
        let project = client.create_project("p", "desc").unwrap();
        assert_eq!(project.domain_id, None);
        let user = client.create_user("u", "pass", &project, "").unwrap();
        assert_eq!(
            client.assign_user_role_on_domain(&user, "admin", None).unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        assert_eq!(
            client.assign_user_role_on_system(&user, "admin").unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        assert_eq!(
            client
                .get_credentials(&user, None, "pass", Some("d"), None)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidConfig
        );
        // The fake cloud is never asked for domains with v2
        assert_eq!(cloud.count("list_domains"), 0);
    }

    #[test]
    fn test_get_credentials_v2() {
        let cloud = FakeCloud::new(IdentityVersion::V2, &[]);
        let client = CredsClient::new(IdentityVersion::V2, Rc::new(cloud), "").unwrap();
        let project = client.create_project("p", "").unwrap();
        let user = client.create_user("u", "pass", &project, "").unwrap();
        let creds = client
            .get_credentials(&user, Some(&project), "pass", None, None)
            .unwrap();
        assert_eq!(creds.tenant_name(), Some("p"));
        assert_eq!(creds.project_id(), Some(project.id.as_str()));
        assert_eq!(creds.user_id(), Some(user.id.as_str()));
        assert!(creds.is_valid());
    }

    #[test]
    fn test_get_credentials_v3_scopes() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["admin"]);
        let client = v3(&cloud);
        let project = client.create_project("p", "").unwrap();
        let user = client.create_user("u", "pass", &project, "").unwrap();

        let creds = client
            .get_credentials(&user, Some(&project), "pass", None, None)
            .unwrap();
        assert_eq!(creds.project_name(), Some("p"));
        assert_eq!(creds.project_domain_id(), Some("default"));
        assert_eq!(creds.user_domain_name(), Some("Default"));
        assert_eq!(creds.domain_name(), None);
        assert!(creds.is_valid());

        let creds = client
            .get_credentials(&user, None, "pass", Some("Default"), None)
            .unwrap();
        assert_eq!(creds.project_name(), None);
        assert_eq!(creds.domain_name(), Some("Default"));
        assert_eq!(creds.domain_id(), Some("default"));

        let creds = client
            .get_credentials(&user, None, "pass", None, Some("all"))
            .unwrap();
        assert_eq!(creds.system(), Some("all"));
        assert_eq!(creds.domain_name(), None);

        client.assign_user_role_on_domain(&user, "admin", None).unwrap();
        client.assign_user_role_on_system(&user, "admin").unwrap();
        let state = cloud.state.borrow();
        assert!(state
            .domain_roles
            .contains(&(String::from("default"), user.id.clone(), String::from("role-admin"))));
        assert!(state
            .system_roles
            .contains(&(user.id.clone(), String::from("role-admin"))));
    }
}
