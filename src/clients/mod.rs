// Copyright 2018 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Service clients.
//!
//! Credential providers and validation helpers only depend on the small
//! capability traits defined here. HTTP implementations are provided by
//! [IdentityClient](struct.IdentityClient.html),
//! [NetworkClient](struct.NetworkClient.html) and
//! [ComputeClient](struct.ComputeClient.html).

use std::fmt::Debug;
use std::rc::Rc;

use crate::auth::{Credentials, IdentityVersion};
use crate::Result;

mod compute;
#[cfg(test)]
pub(crate) mod fake;
mod identity;
mod network;
mod protocol;
mod registry;
mod rest;
mod waiter;

pub use self::compute::ComputeClient;
pub use self::identity::IdentityClient;
pub use self::network::NetworkClient;
pub use self::protocol::{
    Domain, ExternalGateway, FloatingIp, KeyPair, NewNetwork, NewProject, NewRouter,
    NewSecurityGroupRule, NewSubnet, NewUser, Network, Project, Role, Router, SecurityGroup,
    SecurityGroupRule, Subnet, User,
};
pub use self::registry::{
    ClientsRegistry, ServiceClientParams, ServiceClients, ServiceClientsFactory,
};
pub use self::rest::RestClient;
pub use self::waiter::DeletionWaiter;

/// Identity administration calls.
pub trait IdentityAdminApi: Debug {
    /// Identity API version of this client.
    fn identity_version(&self) -> IdentityVersion;

    /// Create a project (tenant).
    fn create_project(&self, request: &NewProject) -> Result<Project>;

    /// Delete a project (tenant).
    fn delete_project(&self, id: &str) -> Result<()>;

    /// Create a user.
    fn create_user(&self, request: &NewUser) -> Result<User>;

    /// Delete a user.
    fn delete_user(&self, id: &str) -> Result<()>;

    /// List all roles.
    fn list_roles(&self) -> Result<Vec<Role>>;

    /// Create a role.
    fn create_role(&self, name: &str) -> Result<Role>;

    /// Grant a role to a user on a project.
    fn assign_project_role(&self, project_id: &str, user_id: &str, role_id: &str) -> Result<()>;

    /// Grant a role to a user on a domain.
    fn assign_domain_role(&self, domain_id: &str, user_id: &str, role_id: &str) -> Result<()>;

    /// Grant a system role to a user.
    fn assign_system_role(&self, user_id: &str, role_id: &str) -> Result<()>;

    /// List domains, optionally filtered by name.
    fn list_domains(&self, name: Option<&str>) -> Result<Vec<Domain>>;
}

/// Network calls.
pub trait NetworksApi: Debug {
    /// Create a network.
    fn create_network(&self, request: &NewNetwork) -> Result<Network>;

    /// Delete a network.
    fn delete_network(&self, id: &str) -> Result<()>;

    /// List networks visible to the caller.
    fn list_networks(&self) -> Result<Vec<Network>>;
}

/// Subnet calls.
pub trait SubnetsApi: Debug {
    /// Create a subnet.
    fn create_subnet(&self, request: &NewSubnet) -> Result<Subnet>;

    /// Delete a subnet.
    fn delete_subnet(&self, id: &str) -> Result<()>;
}

/// Router calls.
pub trait RoutersApi: Debug {
    /// Create a router.
    fn create_router(&self, request: &NewRouter) -> Result<Router>;

    /// Delete a router.
    fn delete_router(&self, id: &str) -> Result<()>;

    /// Attach a subnet to a router.
    fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;

    /// Detach a subnet from a router.
    fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;
}

/// Security group calls.
pub trait SecurityGroupsApi: Debug {
    /// Create a security group.
    fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup>;

    /// Delete a security group.
    fn delete_security_group(&self, id: &str) -> Result<()>;

    /// Get a security group.
    fn show_security_group(&self, id: &str) -> Result<SecurityGroup>;

    /// List security groups, optionally filtered by project and name.
    fn list_security_groups(
        &self,
        project_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<SecurityGroup>>;

    /// Create an ingress rule.
    fn create_security_group_rule(&self, request: &NewSecurityGroupRule)
        -> Result<SecurityGroupRule>;

    /// Wait for a deleted security group to disappear.
    fn wait_for_security_group_deletion(&self, id: &str) -> Result<()>;
}

/// Floating IP calls.
pub trait FloatingIpsApi: Debug {
    /// Allocate a floating IP.
    ///
    /// `network` is an external network ID for the network service or a
    /// pool name for nova-network.
    fn create_floating_ip(&self, network: &str) -> Result<FloatingIp>;

    /// Release a floating IP.
    fn delete_floating_ip(&self, id: &str) -> Result<()>;
}

/// Key pair calls.
pub trait KeyPairsApi: Debug {
    /// Generate a key pair.
    fn create_keypair(&self, name: &str) -> Result<KeyPair>;

    /// Delete a key pair.
    fn delete_keypair(&self, name: &str) -> Result<()>;
}

/// Builds clients for arbitrary credentials.
pub trait ClientsFactory: Debug {
    /// A networks client authenticated with the given credentials.
    fn networks_client(&self, credentials: &Credentials) -> Result<Rc<dyn NetworksApi>>;
}
