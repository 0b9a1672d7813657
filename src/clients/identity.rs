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

//! Identity administration over HTTP.

use serde_json::json;

use super::protocol::*;
use super::rest::RestClient;
use super::IdentityAdminApi;
use crate::auth::IdentityVersion;
use crate::{Error, ErrorKind, Result};

/// Identity administration client for Identity API v2.0 or v3.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    rest: RestClient,
    version: IdentityVersion,
}

fn not_in_v2(what: &str) -> Error {
    Error::new(
        ErrorKind::InvalidConfig,
        format!("{} is not supported by Identity API v2.0", what),
    )
}

impl IdentityClient {
    /// Create a client.
    pub fn new(rest: RestClient, version: IdentityVersion) -> IdentityClient {
        IdentityClient { rest, version }
    }

    fn projects_path(&self) -> &'static str {
        match self.version {
            IdentityVersion::V2 => "tenants",
            IdentityVersion::V3 => "projects",
        }
    }

    fn roles_path(&self) -> &'static str {
        match self.version {
            IdentityVersion::V2 => "OS-KSADM/roles",
            IdentityVersion::V3 => "roles",
        }
    }
}

impl IdentityAdminApi for IdentityClient {
    fn identity_version(&self) -> IdentityVersion {
        self.version
    }

    fn create_project(&self, request: &NewProject) -> Result<Project> {
        debug!("Creating a new project with {:?}", request);
        let body = match self.version {
            IdentityVersion::V2 => json!({
                "tenant": {"name": request.name, "description": request.description}
            }),
            IdentityVersion::V3 => json!({ "project": request }),
        };
        let root: ProjectRoot = self.rest.post_json(self.projects_path(), body)?;
        debug!("Created project {:?}", root.project);
        Ok(root.project)
    }

    fn delete_project(&self, id: &str) -> Result<()> {
        debug!("Deleting project {}", id);
        self.rest.delete(&format!("{}/{}", self.projects_path(), id))?;
        debug!("Project {} was deleted", id);
        Ok(())
    }

    fn create_user(&self, request: &NewUser) -> Result<User> {
        debug!("Creating a new user {} in project {}", request.name, request.project_id);
        let body = match self.version {
            IdentityVersion::V2 => json!({"user": {
                "name": request.name,
                "password": request.password,
                "tenantId": request.project_id,
                "email": request.email,
            }}),
            IdentityVersion::V3 => {
                let mut user = json!({
                    "name": request.name,
                    "password": request.password,
                    "default_project_id": request.project_id,
                    "email": request.email,
                });
                if let Some(ref domain_id) = request.domain_id {
                    user["domain_id"] = json!(domain_id);
                }
                json!({ "user": user })
            }
        };
        let root: UserRoot = self.rest.post_json("users", body)?;
        debug!("Created user {:?}", root.user);
        Ok(root.user)
    }

    fn delete_user(&self, id: &str) -> Result<()> {
        debug!("Deleting user {}", id);
        self.rest.delete(&format!("users/{}", id))?;
        debug!("User {} was deleted", id);
        Ok(())
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        trace!("Listing roles");
        let root: RolesRoot = self.rest.get_json(self.roles_path(), &[])?;
        trace!("Received roles: {:?}", root.roles);
        Ok(root.roles)
    }

    fn create_role(&self, name: &str) -> Result<Role> {
        debug!("Creating a new role {}", name);
        let root: RoleRoot = self
            .rest
            .post_json(self.roles_path(), json!({"role": {"name": name}}))?;
        debug!("Created role {:?}", root.role);
        Ok(root.role)
    }

    fn assign_project_role(&self, project_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        debug!(
            "Assigning role {} to user {} on project {}",
            role_id, user_id, project_id
        );
        let path = match self.version {
            IdentityVersion::V2 => format!(
                "tenants/{}/users/{}/roles/OS-KSADM/{}",
                project_id, user_id, role_id
            ),
            IdentityVersion::V3 => {
                format!("projects/{}/users/{}/roles/{}", project_id, user_id, role_id)
            }
        };
        self.rest.put_empty(&path)
    }

    fn assign_domain_role(&self, domain_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        if self.version == IdentityVersion::V2 {
            return Err(not_in_v2("Domain role assignment"));
        }
        debug!(
            "Assigning role {} to user {} on domain {}",
            role_id, user_id, domain_id
        );
        self.rest
            .put_empty(&format!("domains/{}/users/{}/roles/{}", domain_id, user_id, role_id))
    }

    fn assign_system_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        if self.version == IdentityVersion::V2 {
            return Err(not_in_v2("System role assignment"));
        }
        debug!("Assigning system role {} to user {}", role_id, user_id);
        self.rest
            .put_empty(&format!("system/users/{}/roles/{}", user_id, role_id))
    }

    fn list_domains(&self, name: Option<&str>) -> Result<Vec<Domain>> {
        if self.version == IdentityVersion::V2 {
            return Err(not_in_v2("Domains"));
        }
        trace!("Listing domains with name {:?}", name);
        let query: Vec<(&str, &str)> = name.into_iter().map(|n| ("name", n)).collect();
        let root: DomainsRoot = self.rest.get_json("domains", &query)?;
        trace!("Received domains: {:?}", root.domains);
        Ok(root.domains)
    }
}
