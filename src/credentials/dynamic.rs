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

//! Credentials created on demand.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

use ipnet::Ipv4Net;

use super::client::CredsClient;
use super::factory::get_configured_admin_credentials;
use super::{CredentialProvider, CredentialScope, CredentialType, NetworkResources, TestResources};
use crate::auth::IdentityVersion;
use crate::clients::{
    ClientsRegistry, ExternalGateway, IdentityAdminApi, Network, NetworksApi, NewNetwork,
    NewRouter, NewSubnet, Project, Router, RoutersApi, SecurityGroupsApi, ServiceClients,
    Subnet, SubnetsApi, User,
};
use crate::config::Config;
use crate::session::HttpClient;
use crate::utils::{rand_name, rand_password};
use crate::{Error, ErrorKind, Result};

const PASSWORD_LENGTH: usize = 16;
const SUBNET_OVERLAP: &str = "overlaps with another subnet";

/// Parameters of dynamic credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicCredentialsParams {
    /// Name used as a root for all resource names.
    pub name: String,
    /// Identity API version to use.
    pub identity_version: IdentityVersion,
    /// Prefix of all resource names.
    pub resource_prefix: String,
    /// Domain to create projects and users in (Identity API v3).
    pub credentials_domain: String,
    /// Role granted to admin credentials.
    pub admin_role: String,
    /// Also grant the admin role on the domain (Identity API v3).
    pub admin_domain_scope: bool,
    /// Roles granted to all users.
    pub extra_roles: Vec<String>,
    /// Role granted to Identity API v3 users without any project role.
    pub default_member_role: Option<String>,
    /// Network resources to create.
    pub network_resources: NetworkResources,
    /// Whether to create networks at all.
    pub create_networks: bool,
    /// Whether the network service is available.
    pub neutron_available: bool,
    /// Block to carve project subnets from.
    pub project_network_cidr: Ipv4Net,
    /// Prefix length of project subnets.
    pub project_network_mask_bits: u8,
    /// External network for router gateways.
    pub public_network_id: Option<String>,
    /// Physical network of project networks.
    pub physical_network: Option<String>,
}

impl DynamicCredentialsParams {
    /// Parameters from configuration.
    ///
    /// `network_resources` defaults to creating everything.
    pub fn from_config<S: Into<String>>(
        config: &Config,
        name: S,
        network_resources: Option<NetworkResources>,
        identity_version: IdentityVersion,
    ) -> DynamicCredentialsParams {
        DynamicCredentialsParams {
            name: name.into(),
            identity_version,
            resource_prefix: config.resource_name_prefix.clone(),
            credentials_domain: config.auth.default_credentials_domain_name.clone(),
            admin_role: config.identity.admin_role.clone(),
            admin_domain_scope: config.identity.admin_domain_scope,
            extra_roles: config.auth.tempest_roles.clone(),
            default_member_role: config.identity.default_member_role.clone(),
            network_resources: network_resources.unwrap_or_default(),
            create_networks: config.auth.create_isolated_networks,
            neutron_available: config.neutron_available(),
            project_network_cidr: config.network.project_network_cidr,
            project_network_mask_bits: config.network.project_network_mask_bits,
            public_network_id: config.network.public_network_id.clone(),
            physical_network: config.network.shared_physical_network.clone(),
        }
    }
}

/// Admin clients used by dynamic credentials.
#[derive(Debug, Clone)]
pub struct AdminClients {
    /// Identity administration.
    pub identity: Rc<dyn IdentityAdminApi>,
    /// Networks.
    pub networks: Rc<dyn NetworksApi>,
    /// Subnets.
    pub subnets: Rc<dyn SubnetsApi>,
    /// Routers.
    pub routers: Rc<dyn RoutersApi>,
    /// Security groups.
    pub security_groups: Rc<dyn SecurityGroupsApi>,
}

impl AdminClients {
    /// Admin clients over HTTP.
    pub fn from_service_clients(clients: &ServiceClients) -> AdminClients {
        let network = clients.network();
        AdminClients {
            identity: clients.identity(),
            networks: network.clone(),
            subnets: network.clone(),
            routers: network.clone(),
            security_groups: network,
        }
    }
}

type CacheKey = (CredentialType, usize);

/// Cached credentials with the identity resources backing them.
#[derive(Debug, Clone)]
struct Allocation {
    resources: Rc<TestResources>,
    user_id: String,
    project_id: String,
}

/// Creates projects, users and networks on demand using admin credentials.
///
/// Created credentials are cached by their type and reused until
/// `clear_creds` is called.
#[derive(Debug)]
pub struct DynamicCredentialProvider {
    params: DynamicCredentialsParams,
    creds_client: CredsClient,
    clients: AdminClients,
    cache: RefCell<BTreeMap<CacheKey, Allocation>>,
    generation: Cell<usize>,
}

/// Record a cleanup result, tolerating missing resources.
fn tolerate(result: Result<()>, what: &str, failures: &mut Vec<Error>) {
    match result {
        Ok(()) => {}
        Err(ref e) if e.is_not_found() => warn!("{} was not found during cleanup", what),
        Err(e) => {
            error!("Failed to clean up {}: {}", what, e);
            failures.push(e);
        }
    }
}

/// Log a rollback failure without propagating it.
fn rollback(result: Result<()>, what: &str) {
    if let Err(e) = result {
        error!("Failed to roll back {}: {}", what, e);
    }
}

impl DynamicCredentialProvider {
    /// Create a provider with the given admin clients.
    pub fn new(
        params: DynamicCredentialsParams,
        clients: AdminClients,
    ) -> Result<DynamicCredentialProvider> {
        let creds_client = CredsClient::new(
            params.identity_version,
            clients.identity.clone(),
            &params.credentials_domain,
        )?;
        Ok(DynamicCredentialProvider {
            params,
            creds_client,
            clients,
            cache: RefCell::new(BTreeMap::new()),
            generation: Cell::new(0),
        })
    }

    /// Create a provider using the admin credentials from configuration.
    pub fn from_config<S: Into<String>>(
        config: &Config,
        name: S,
        network_resources: Option<NetworkResources>,
        identity_version: IdentityVersion,
    ) -> Result<DynamicCredentialProvider> {
        let params =
            DynamicCredentialsParams::from_config(config, name, network_resources, identity_version);
        let admin = get_configured_admin_credentials(config, false, identity_version)?;
        let http = Rc::new(HttpClient::new(&config.http)?);
        let registry = Rc::new(ClientsRegistry::from_config(config, identity_version)?);
        let clients = ServiceClients::new(
            admin,
            config.identity.uri_for(identity_version)?,
            http,
            registry,
            config,
        )?;
        DynamicCredentialProvider::new(params, AdminClients::from_service_clients(&clients))
    }

    /// Parameters of this provider.
    #[inline]
    pub fn params(&self) -> &DynamicCredentialsParams {
        &self.params
    }

    /// Get cached credentials of the given type or create them.
    pub fn get_credentials(&self, credential_type: CredentialType) -> Result<Rc<TestResources>> {
        self.get_or_create(credential_type, false)
    }

    fn get_or_create(
        &self,
        credential_type: CredentialType,
        force_new: bool,
    ) -> Result<Rc<TestResources>> {
        let key = (credential_type.clone(), 0);
        let existing = self.cache.borrow().get(&key).cloned();
        if let Some(existing) = existing {
            if !force_new {
                trace!("Reusing cached {} credentials", credential_type);
                return Ok(existing.resources);
            }
            let generation = self.generation.get() + 1;
            self.generation.set(generation);
            debug!(
                "Keeping existing {} credentials as generation {}",
                credential_type, generation
            );
            let mut cache = self.cache.borrow_mut();
            let _ = cache.remove(&key);
            let _ = cache.insert((credential_type.clone(), generation), existing);
        }

        let (mut allocation, scope) = self.create_creds(&credential_type)?;
        let _ = self.cache.borrow_mut().insert(key.clone(), allocation.clone());
        info!(
            "Acquired dynamic {} credentials for user {:?}",
            credential_type,
            allocation.resources.username()
        );

        // Already cached, clear_creds removes the project if networking fails
        if scope != CredentialScope::Project
            || !self.params.neutron_available
            || !self.params.create_networks
        {
            return Ok(allocation.resources);
        }
        let (network, subnet, router) = self.create_network_resources(&allocation.project_id)?;
        allocation.resources = Rc::new(
            (*allocation.resources)
                .clone()
                .with_network(network, subnet, router),
        );
        let resources = allocation.resources.clone();
        let _ = self.cache.borrow_mut().insert(key, allocation);
        Ok(resources)
    }

    fn create_creds(&self, credential_type: &CredentialType) -> Result<(Allocation, CredentialScope)> {
        let (root, roles, scope, admin) = match *credential_type {
            CredentialType::Primary | CredentialType::Alt => {
                (self.params.name.clone(), Vec::new(), CredentialScope::Project, false)
            }
            CredentialType::Admin => (
                format!("{}-admin", self.params.name),
                Vec::new(),
                CredentialScope::Project,
                true,
            ),
            CredentialType::Roles {
                ref roles,
                scope,
            } => {
                let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
                let root = format!("{}-{}", self.params.name, roles.join("-"));
                (root, roles, scope, false)
            }
        };

        let prefix = Some(self.params.resource_prefix.as_str()).filter(|p| !p.is_empty());
        let project_name = rand_name(&root, prefix);
        let project = self
            .creds_client
            .create_project(project_name.clone(), format!("{}-desc", project_name))?;

        let password = rand_password(PASSWORD_LENGTH);
        let email = format!("{}@example.com", project_name);
        let user = match self
            .creds_client
            .create_user(project_name.clone(), password.clone(), &project, email)
        {
            Ok(user) => user,
            Err(e) => {
                rollback(self.creds_client.delete_project(&project.id), "project");
                return Err(e);
            }
        };

        if let Err(e) = self.assign_roles(&user, &project, &roles, scope, admin) {
            rollback(self.creds_client.delete_user(&user.id), "user");
            rollback(self.creds_client.delete_project(&project.id), "project");
            return Err(e);
        }

        let domain = match scope {
            CredentialScope::Domain => self.creds_client.domain().map(|d| d.name.as_str()),
            _ => None,
        };
        let system = match scope {
            CredentialScope::System => Some("all"),
            _ => None,
        };
        let project_ref = match scope {
            CredentialScope::Project => Some(&project),
            _ => None,
        };
        let credentials =
            self.creds_client
                .get_credentials(&user, project_ref, &password, domain, system)?;
        let allocation = Allocation {
            resources: Rc::new(TestResources::new(credentials)),
            user_id: user.id,
            project_id: project.id,
        };
        Ok((allocation, scope))
    }

    fn assign_roles(
        &self,
        user: &User,
        project: &Project,
        roles: &[&str],
        scope: CredentialScope,
        admin: bool,
    ) -> Result<()> {
        let v3 = self.creds_client.identity_version() == IdentityVersion::V3;
        let mut has_project_role = false;

        if admin {
            self.creds_client
                .assign_user_role(user, project, &self.params.admin_role)?;
            has_project_role = true;
            if v3 && self.params.admin_domain_scope {
                self.creds_client
                    .assign_user_role_on_domain(user, &self.params.admin_role, None)?;
            }
        }

        for role in &self.params.extra_roles {
            self.creds_client.assign_user_role(user, project, role)?;
            has_project_role = true;
        }

        for role in roles {
            match scope {
                CredentialScope::Project => {
                    self.creds_client.assign_user_role(user, project, role)?;
                    has_project_role = true;
                }
                CredentialScope::Domain => {
                    self.creds_client.assign_user_role_on_domain(user, role, None)?
                }
                CredentialScope::System => self.creds_client.assign_user_role_on_system(user, role)?,
            }
        }

        // Identity API v3 users need a role on their project to get a token
        if v3 && !has_project_role {
            if let Some(ref member) = self.params.default_member_role {
                warn!(
                    "User {} has no role on project {}, granting {}",
                    user.name, project.name, member
                );
                match self.creds_client.create_user_role(member) {
                    Ok(_) => {}
                    Err(ref e) if e.kind() == ErrorKind::Conflict => {
                        warn!("Role {} was created concurrently", member)
                    }
                    Err(e) => return Err(e),
                }
                self.creds_client.assign_user_role(user, project, member)?;
            }
        }

        Ok(())
    }

    /// Create a network, a subnet and a router for a project.
    ///
    /// Everything created by this call is deleted if any step fails.
    pub fn create_network_resources(
        &self,
        project_id: &str,
    ) -> Result<(Option<Network>, Option<Subnet>, Option<Router>)> {
        let resources = self.params.network_resources;
        resources.validate()?;

        let prefix = Some(self.params.resource_prefix.as_str()).filter(|p| !p.is_empty());
        let base_name = rand_name(&self.params.name, prefix);
        let mut created = CreatedNetwork::default();
        match self.create_network_resources_into(project_id, &base_name, resources, &mut created) {
            Ok(()) => Ok((created.network, created.subnet, created.router)),
            Err(e) => {
                error!("Failed to create network resources for {}: {}", project_id, e);
                self.rollback_network(&created);
                Err(e)
            }
        }
    }

    fn create_network_resources_into(
        &self,
        project_id: &str,
        base_name: &str,
        resources: NetworkResources,
        created: &mut CreatedNetwork,
    ) -> Result<()> {
        if !resources.network {
            return Ok(());
        }
        let network = self.clients.networks.create_network(&NewNetwork {
            name: format!("{}-network", base_name),
            project_id: project_id.to_string(),
            physical_network: self.params.physical_network.clone(),
            port_security_enabled: None,
        })?;
        let network_id = network.id.clone();
        created.network = Some(network);

        if !resources.subnet {
            return Ok(());
        }
        let subnet = self.create_subnet(
            &format!("{}-subnet", base_name),
            &network_id,
            project_id,
            resources.dhcp,
        )?;
        let subnet_id = subnet.id.clone();
        created.subnet = Some(subnet);

        if !resources.router {
            return Ok(());
        }
        let router = self.clients.routers.create_router(&NewRouter {
            name: format!("{}-router", base_name),
            project_id: project_id.to_string(),
            external_gateway_info: self.params.public_network_id.as_ref().map(|id| {
                ExternalGateway {
                    network_id: id.clone(),
                }
            }),
        })?;
        let router_id = router.id.clone();
        created.router = Some(router);

        self.clients
            .routers
            .add_router_interface(&router_id, &subnet_id)?;
        created.interface = true;
        Ok(())
    }

    fn create_subnet(
        &self,
        name: &str,
        network_id: &str,
        project_id: &str,
        dhcp: bool,
    ) -> Result<Subnet> {
        let candidates = self
            .params
            .project_network_cidr
            .subnets(self.params.project_network_mask_bits)
            .map_err(|e| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!(
                        "Cannot split {} into /{} subnets: {}",
                        self.params.project_network_cidr,
                        self.params.project_network_mask_bits,
                        e
                    ),
                )
            })?;

        for cidr in candidates {
            let request = NewSubnet {
                name: name.to_string(),
                network_id: network_id.to_string(),
                project_id: project_id.to_string(),
                cidr: cidr.to_string(),
                ip_version: 4,
                enable_dhcp: Some(dhcp),
            };
            match self.clients.subnets.create_subnet(&request) {
                Ok(subnet) => return Ok(subnet),
                Err(ref e)
                    if e.kind() == ErrorKind::InvalidInput
                        && e.message().map_or(false, |m| m.contains(SUBNET_OVERLAP)) =>
                {
                    info!("Subnet CIDR {} is in use, trying the next one", cidr);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::new(
            ErrorKind::OperationFailed,
            format!(
                "No free CIDR for a subnet found in {}",
                self.params.project_network_cidr
            ),
        ))
    }

    fn rollback_network(&self, created: &CreatedNetwork) {
        if let Some(ref router) = created.router {
            if created.interface {
                if let Some(ref subnet) = created.subnet {
                    rollback(
                        self.clients
                            .routers
                            .remove_router_interface(&router.id, &subnet.id),
                        "router interface",
                    );
                }
            }
            rollback(self.clients.routers.delete_router(&router.id), "router");
        }
        if let Some(ref subnet) = created.subnet {
            rollback(self.clients.subnets.delete_subnet(&subnet.id), "subnet");
        }
        if let Some(ref network) = created.network {
            rollback(self.clients.networks.delete_network(&network.id), "network");
        }
    }

    fn clear_network(&self, resources: &TestResources, failures: &mut Vec<Error>) {
        if let Some(router) = resources.router() {
            if let Some(subnet) = resources.subnet() {
                tolerate(
                    self.clients
                        .routers
                        .remove_router_interface(&router.id, &subnet.id),
                    &format!("interface of router {}", router.id),
                    failures,
                );
            }
            tolerate(
                self.clients.routers.delete_router(&router.id),
                &format!("router {}", router.id),
                failures,
            );
        }
        if let Some(subnet) = resources.subnet() {
            tolerate(
                self.clients.subnets.delete_subnet(&subnet.id),
                &format!("subnet {}", subnet.id),
                failures,
            );
        }
        if let Some(network) = resources.network() {
            tolerate(
                self.clients.networks.delete_network(&network.id),
                &format!("network {}", network.id),
                failures,
            );
        }
    }

    fn clear_security_groups(&self, project_id: &str, failures: &mut Vec<Error>) {
        let groups = match self
            .clients
            .security_groups
            .list_security_groups(Some(project_id), Some("default"))
        {
            Ok(groups) => groups,
            Err(e) => {
                tolerate(Err(e), &format!("security groups of {}", project_id), failures);
                return;
            }
        };
        for group in groups {
            tolerate(
                self.clients.security_groups.delete_security_group(&group.id),
                &format!("security group {}", group.id),
                failures,
            );
        }
    }
}

/// Network resources created so far.
#[derive(Debug, Default)]
struct CreatedNetwork {
    network: Option<Network>,
    subnet: Option<Subnet>,
    router: Option<Router>,
    interface: bool,
}

impl CredentialProvider for DynamicCredentialProvider {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn identity_version(&self) -> IdentityVersion {
        self.params.identity_version
    }

    fn get_primary_creds(&self) -> Result<Rc<TestResources>> {
        self.get_credentials(CredentialType::Primary)
    }

    fn get_alt_creds(&self) -> Result<Rc<TestResources>> {
        self.get_credentials(CredentialType::Alt)
    }

    fn get_admin_creds(&self) -> Result<Rc<TestResources>> {
        self.get_credentials(CredentialType::Admin)
    }

    fn get_scoped_creds_by_roles(
        &self,
        roles: &[&str],
        scope: CredentialScope,
        force_new: bool,
    ) -> Result<Rc<TestResources>> {
        self.get_or_create(CredentialType::with_roles(roles.iter().copied(), scope), force_new)
    }

    fn clear_creds(&self) -> Result<()> {
        let cache = mem::take(&mut *self.cache.borrow_mut());
        let mut failures = Vec::new();
        for ((credential_type, _), allocation) in cache {
            debug!("Clearing {} credentials", credential_type);
            self.clear_network(&allocation.resources, &mut failures);
            tolerate(
                self.creds_client.delete_user(&allocation.user_id),
                &format!("user {}", allocation.user_id),
                &mut failures,
            );
            if self.params.neutron_available {
                self.clear_security_groups(&allocation.project_id, &mut failures);
            }
            tolerate(
                self.creds_client.delete_project(&allocation.project_id),
                &format!("project {}", allocation.project_id),
                &mut failures,
            );
        }

        Error::from_failures(
            format!("Cleanup of dynamic credentials {} failed", self.params.name),
            failures,
        )
    }

    fn is_multi_user(&self) -> bool {
        true
    }

    fn is_multi_tenant(&self) -> bool {
        true
    }

    fn is_role_available(&self, _role: &str) -> bool {
        true
    }
}

#[cfg(test)]
pub mod test {
    use std::rc::Rc;

    use super::{AdminClients, DynamicCredentialProvider, DynamicCredentialsParams};
    use crate::auth::IdentityVersion;
    use crate::clients::fake::FakeCloud;
    use crate::config::Config;
    use crate::credentials::{CredentialProvider, CredentialScope, NetworkResources};
    use crate::ErrorKind;

    fn admin_clients(cloud: &FakeCloud) -> AdminClients {
        AdminClients {
            identity: Rc::new(cloud.clone()),
            networks: Rc::new(cloud.clone()),
            subnets: Rc::new(cloud.clone()),
            routers: Rc::new(cloud.clone()),
            security_groups: Rc::new(cloud.clone()),
        }
    }

    fn params(version: IdentityVersion) -> DynamicCredentialsParams {
        let mut config = Config::default();
        config.network.public_network_id = Some(String::from("public"));
        DynamicCredentialsParams::from_config(&config, "TestServers", None, version)
    }

    fn provider(cloud: &FakeCloud, params: DynamicCredentialsParams) -> DynamicCredentialProvider {
        DynamicCredentialProvider::new(params, admin_clients(cloud)).unwrap()
    }

    #[test]
    fn test_primary_creds_with_network() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["admin", "member"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));

        let creds = provider.get_primary_creds().unwrap();
        assert!(creds.is_valid());
        assert!(creds.username().unwrap().starts_with("tempest-TestServers-"));
        assert_eq!(creds.project_domain_name(), Some("Default"));
        let network = creds.network().unwrap();
        let subnet = creds.subnet().unwrap();
        let router = creds.router().unwrap();
        assert_eq!(subnet.network_id, network.id);
        assert_eq!(subnet.cidr, "10.100.0.0/28");
        assert!(subnet.enable_dhcp);
        assert_eq!(
            router.external_gateway_info.as_ref().unwrap().network_id,
            "public"
        );
        assert!(cloud
            .state
            .borrow()
            .interfaces
            .contains(&(router.id.clone(), subnet.id.clone())));

        // Member role fallback for v3
        let state = cloud.state.borrow();
        assert_eq!(state.project_roles.len(), 1);
        assert!(state
            .project_roles
            .iter()
            .all(|(p, u, r)| Some(p.as_str()) == creds.project_id()
                && Some(u.as_str()) == creds.user_id()
                && r == "role-member"));
    }

    #[test]
    fn test_cached() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let first = provider.get_primary_creds().unwrap();
        let second = provider.get_primary_creds().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cloud.count("create_project"), 1);

        let alt = provider.get_alt_creds().unwrap();
        assert_ne!(alt.project_id(), first.project_id());
        assert_eq!(cloud.count("create_project"), 2);
    }

    #[test]
    fn test_admin_creds() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["admin", "member"]);
        let mut params = params(IdentityVersion::V3);
        params.admin_domain_scope = true;
        let provider = provider(&cloud, params);
        let creds = provider.get_admin_creds().unwrap();
        assert!(creds.username().unwrap().starts_with("tempest-TestServers-admin-"));
        let state = cloud.state.borrow();
        let user_id = creds.user_id().unwrap().to_string();
        assert!(state.project_roles.iter().any(|(_, u, r)| *u == user_id && r == "role-admin"));
        // No member fallback for admins
        assert!(!state.project_roles.iter().any(|(_, _, r)| r == "role-member"));
        assert!(state
            .domain_roles
            .contains(&(String::from("default"), user_id, String::from("role-admin"))));
    }

    #[test]
    fn test_extra_roles_and_no_member_fallback() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member", "reader"]);
        let mut params = params(IdentityVersion::V3);
        params.extra_roles = vec![String::from("reader")];
        params.default_member_role = None;
        let provider = provider(&cloud, params);
        let _ = provider.get_primary_creds().unwrap();
        let state = cloud.state.borrow();
        let roles: Vec<_> = state.project_roles.iter().map(|(_, _, r)| r.clone()).collect();
        assert_eq!(roles, vec![String::from("role-reader")]);
    }

    #[test]
    fn test_v2_no_member_fallback() {
        let cloud = FakeCloud::new(IdentityVersion::V2, &["member"]);
        let provider = provider(&cloud, params(IdentityVersion::V2));
        let creds = provider.get_primary_creds().unwrap();
        assert!(creds.tenant_id().is_some());
        assert!(cloud.state.borrow().project_roles.is_empty());
    }

    #[test]
    fn test_creds_by_roles() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member", "reader"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let one = provider.get_creds_by_roles(&["reader", "member"], false).unwrap();
        let two = provider.get_creds_by_roles(&["member", "reader"], false).unwrap();
        assert!(Rc::ptr_eq(&one, &two));
        assert_eq!(cloud.state.borrow().project_roles.len(), 2);

        let three = provider.get_creds_by_roles(&["member", "reader"], true).unwrap();
        assert!(!Rc::ptr_eq(&one, &three));
        // The latest allocation is cached
        let four = provider.get_creds_by_roles(&["reader", "member"], false).unwrap();
        assert!(Rc::ptr_eq(&three, &four));

        // Both allocations are cleaned up
        provider.clear_creds().unwrap();
        assert_eq!(cloud.count("delete_project"), 2);
        assert_eq!(cloud.count("delete_user"), 2);
        assert!(cloud.state.borrow().projects.is_empty());
    }

    #[test]
    fn test_scoped_creds() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member", "admin"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));

        let domain = provider
            .get_scoped_creds_by_roles(&["admin"], CredentialScope::Domain, false)
            .unwrap();
        assert_eq!(domain.domain_name(), Some("Default"));
        assert_eq!(domain.project_id(), None);
        assert!(domain.network().is_none());

        let system = provider
            .get_scoped_creds_by_roles(&["admin"], CredentialScope::System, false)
            .unwrap();
        assert_eq!(system.system(), Some("all"));
        assert!(system.network().is_none());

        assert_eq!(cloud.state.borrow().domain_roles.len(), 1);
        assert_eq!(cloud.state.borrow().system_roles.len(), 1);
        assert_eq!(cloud.count("create_network"), 0);

        provider.clear_creds().unwrap();
        assert!(cloud.state.borrow().projects.is_empty());
        assert!(cloud.state.borrow().users.is_empty());
    }

    #[test]
    fn test_subnet_overlap_retry() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        {
            let mut state = cloud.state.borrow_mut();
            let _ = state.used_cidrs.insert(String::from("10.100.0.0/28"));
            let _ = state.used_cidrs.insert(String::from("10.100.0.16/28"));
        }
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let creds = provider.get_primary_creds().unwrap();
        assert_eq!(creds.subnet().unwrap().cidr, "10.100.0.32/28");
        assert_eq!(cloud.count("create_subnet"), 3);
    }

    #[test]
    fn test_subnet_exhausted() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let mut params = params(IdentityVersion::V3);
        params.project_network_cidr = "10.100.0.0/27".parse().unwrap();
        {
            let mut state = cloud.state.borrow_mut();
            let _ = state.used_cidrs.insert(String::from("10.100.0.0/28"));
            let _ = state.used_cidrs.insert(String::from("10.100.0.16/28"));
        }
        let provider = provider(&cloud, params);
        let err = provider.get_primary_creds().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        // The network was rolled back
        assert_eq!(cloud.count("delete_network"), 1);
        assert!(cloud.state.borrow().networks.is_empty());

        // The project and user are still cleaned up
        provider.clear_creds().unwrap();
        assert!(cloud.state.borrow().projects.is_empty());
        assert!(cloud.state.borrow().users.is_empty());
    }

    #[test]
    fn test_subnet_other_error_not_retried() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        cloud.fail("create_subnet", ErrorKind::InvalidInput);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let err = provider.get_primary_creds().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(cloud.count("create_subnet"), 1);
        assert!(cloud.state.borrow().networks.is_empty());
    }

    #[test]
    fn test_router_failure_rollback() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        cloud.fail("add_router_interface", ErrorKind::InternalServerError);
        cloud.fail("delete_subnet", ErrorKind::InternalServerError);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let err = provider.get_primary_creds().unwrap_err();
        // The original error, not the rollback one
        assert_eq!(err.kind(), ErrorKind::InternalServerError);
        assert!(err.message().unwrap().contains("add_router_interface"));
        let state = cloud.state.borrow();
        assert!(state.routers.is_empty());
        assert_eq!(state.subnets.len(), 1);
        assert!(state.networks.is_empty());
    }

    #[test]
    fn test_invalid_network_resources() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let mut params = params(IdentityVersion::V3);
        params.network_resources = NetworkResources {
            network: false,
            ..NetworkResources::default()
        };
        let provider = provider(&cloud, params);
        let err = provider.create_network_resources("p1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert_eq!(cloud.count("create_network"), 0);
    }

    #[test]
    fn test_network_only() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let mut params = params(IdentityVersion::V3);
        params.network_resources = NetworkResources {
            network: true,
            ..NetworkResources::none()
        };
        let provider = provider(&cloud, params);
        let (network, subnet, router) = provider.create_network_resources("p1").unwrap();
        assert_eq!(network.unwrap().project_id.as_deref(), Some("p1"));
        assert!(subnet.is_none());
        assert!(router.is_none());
    }

    #[test]
    fn test_no_networks_without_neutron() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let mut params = params(IdentityVersion::V3);
        params.neutron_available = false;
        let provider = provider(&cloud, params);
        let creds = provider.get_primary_creds().unwrap();
        assert!(creds.network().is_none());
        provider.clear_creds().unwrap();
        assert_eq!(cloud.count("create_network"), 0);
        assert_eq!(cloud.count("list_security_groups"), 0);
    }

    #[test]
    fn test_clear_creds() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member", "admin"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let _ = provider.get_primary_creds().unwrap();
        let _ = provider.get_admin_creds().unwrap();
        provider.clear_creds().unwrap();

        let state = cloud.state.borrow();
        assert!(state.projects.is_empty());
        assert!(state.users.is_empty());
        assert!(state.networks.is_empty());
        assert!(state.subnets.is_empty());
        assert!(state.routers.is_empty());
        assert!(state.interfaces.is_empty());
        // Default security groups are gone too
        assert!(state.security_groups.is_empty());
        drop(state);

        let calls = cloud.calls();
        let pos = |name: &str| calls.iter().position(|c| c == name).unwrap();
        assert!(pos("remove_router_interface") < pos("delete_router"));
        assert!(pos("delete_router") < pos("delete_subnet"));
        assert!(pos("delete_subnet") < pos("delete_network"));
        assert!(pos("delete_network") < pos("delete_user"));
        assert!(pos("delete_user") < pos("delete_project"));

        // Nothing is left to clean
        let before = cloud.calls().len();
        provider.clear_creds().unwrap();
        assert_eq!(cloud.calls().len(), before);
    }

    #[test]
    fn test_clear_creds_tolerates_not_found() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let creds = provider.get_primary_creds().unwrap();
        let _ = cloud
            .state
            .borrow_mut()
            .networks
            .remove(&creds.network().unwrap().id);
        provider.clear_creds().unwrap();
        assert!(cloud.state.borrow().projects.is_empty());
    }

    #[test]
    fn test_clear_creds_accumulates_failures() {
        let cloud = FakeCloud::new(IdentityVersion::V3, &["member"]);
        let provider = provider(&cloud, params(IdentityVersion::V3));
        let _ = provider.get_primary_creds().unwrap();
        let _ = provider.get_alt_creds().unwrap();
        cloud.fail("delete_user", ErrorKind::InternalServerError);
        cloud.fail("delete_router", ErrorKind::AccessDenied);

        let err = provider.clear_creds().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CleanupFailed);
        assert_eq!(err.failures().len(), 4);
        assert_eq!(err.failures()[0].kind(), ErrorKind::AccessDenied);
        assert_eq!(err.failures()[1].kind(), ErrorKind::InternalServerError);
        // Later steps still ran
        assert!(cloud.state.borrow().projects.is_empty());
        // The cache is cleared regardless
        let before = cloud.calls().len();
        provider.clear_creds().unwrap();
        assert_eq!(cloud.calls().len(), before);
    }
}
