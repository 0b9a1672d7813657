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

//! Credential providers for tests.
//!
//! A provider hands out [TestResources](struct.TestResources.html): a set of
//! credentials, optionally with an isolated network. Two implementations
//! exist:
//!
//! * [DynamicCredentialProvider](struct.DynamicCredentialProvider.html)
//!   creates projects, users and networks on demand using admin
//!   credentials;
//! * [PreProvisionedCredentialProvider](struct.PreProvisionedCredentialProvider.html)
//!   leases accounts from a fixed pool described in a YAML file.
//!
//! Use [get_credentials_provider](fn.get_credentials_provider.html) to pick
//! one based on configuration.

use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::ops::Deref;
use std::rc::Rc;

use crate::auth::{Credentials, IdentityVersion};
use crate::clients::{Network, Router, Subnet};
use crate::{Error, ErrorKind, Result};

mod accounts;
mod client;
mod dynamic;
mod factory;
mod preprov;

pub use self::accounts::{read_accounts_yaml, Account, AccountPool};
pub use self::client::CredsClient;
pub use self::dynamic::{AdminClients, DynamicCredentialProvider, DynamicCredentialsParams};
pub use self::factory::{
    get_configured_admin_credentials, get_credentials, get_credentials_provider,
    is_admin_available, is_alt_available,
};
pub use self::preprov::{PreProvisionedCredentialProvider, PreProvisionedParams};

/// What a role-based set of credentials is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialScope {
    /// Roles on the user's project.
    Project,
    /// Roles on the user's domain.
    Domain,
    /// System roles.
    System,
}

impl Default for CredentialScope {
    fn default() -> CredentialScope {
        CredentialScope::Project
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            CredentialScope::Project => "project",
            CredentialScope::Domain => "domain",
            CredentialScope::System => "system",
        })
    }
}

/// Kind of credentials requested from a provider.
///
/// Also used as a cache key, so role lists are kept as sorted sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialType {
    /// The main credentials of a test.
    Primary,
    /// Credentials of a second, unrelated user.
    Alt,
    /// Credentials with the admin role.
    Admin,
    /// Credentials with the given roles.
    Roles {
        /// Requested roles.
        roles: BTreeSet<String>,
        /// Where the roles are granted.
        scope: CredentialScope,
    },
}

impl CredentialType {
    /// Role-based credentials.
    pub fn with_roles<I, S>(roles: I, scope: CredentialScope) -> CredentialType
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CredentialType::Roles {
            roles: roles.into_iter().map(Into::into).collect(),
            scope,
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CredentialType::Primary => f.write_str("primary"),
            CredentialType::Alt => f.write_str("alt"),
            CredentialType::Admin => f.write_str("admin"),
            CredentialType::Roles {
                ref roles,
                ref scope,
            } => {
                let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
                write!(f, "{}-roles-{}", scope, roles.join(","))
            }
        }
    }
}

/// Which network resources to create for dynamic credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkResources {
    /// Create a network.
    pub network: bool,
    /// Create a subnet in the network.
    pub subnet: bool,
    /// Create a router attached to the subnet.
    pub router: bool,
    /// Enable DHCP on the subnet.
    pub dhcp: bool,
}

impl Default for NetworkResources {
    fn default() -> NetworkResources {
        NetworkResources {
            network: true,
            subnet: true,
            router: true,
            dhcp: true,
        }
    }
}

impl NetworkResources {
    /// No network resources at all.
    pub fn none() -> NetworkResources {
        NetworkResources {
            network: false,
            subnet: false,
            router: false,
            dhcp: false,
        }
    }

    /// Check that the requested resources are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.router && !(self.subnet && self.network) {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "A router requires a subnet and a network",
            ));
        }
        if self.subnet && !self.network {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "A subnet requires a network",
            ));
        }
        if self.dhcp && !self.subnet {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "DHCP requires a subnet",
            ));
        }
        Ok(())
    }
}

/// Credentials with the resources allocated for them.
#[derive(Debug, Clone)]
pub struct TestResources {
    credentials: Credentials,
    network: Option<Network>,
    subnet: Option<Subnet>,
    router: Option<Router>,
}

impl TestResources {
    /// Credentials without network resources.
    pub fn new(credentials: Credentials) -> TestResources {
        TestResources {
            credentials,
            network: None,
            subnet: None,
            router: None,
        }
    }

    /// Attach network resources.
    pub fn with_network(
        mut self,
        network: Option<Network>,
        subnet: Option<Subnet>,
        router: Option<Router>,
    ) -> TestResources {
        self.network = network;
        self.subnet = subnet;
        self.router = router;
        self
    }

    /// The credentials.
    #[inline]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Network of the credentials, if any.
    #[inline]
    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    /// Subnet of the credentials, if any.
    #[inline]
    pub fn subnet(&self) -> Option<&Subnet> {
        self.subnet.as_ref()
    }

    /// Router of the credentials, if any.
    #[inline]
    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }
}

impl Deref for TestResources {
    type Target = Credentials;

    fn deref(&self) -> &Credentials {
        &self.credentials
    }
}

/// A source of credentials for tests.
///
/// The same provider returns the same credentials for repeated requests of
/// the same kind until `clear_creds` is called.
pub trait CredentialProvider: Debug {
    /// Name used to identify resources of this provider.
    fn name(&self) -> &str;

    /// Identity API version of the credentials.
    fn identity_version(&self) -> IdentityVersion;

    /// Main credentials.
    fn get_primary_creds(&self) -> Result<Rc<TestResources>>;

    /// Credentials of another user in another project.
    fn get_alt_creds(&self) -> Result<Rc<TestResources>>;

    /// Admin credentials.
    fn get_admin_creds(&self) -> Result<Rc<TestResources>>;

    /// Credentials with the given roles on a project.
    ///
    /// With `force_new` a fresh set is allocated even if one exists.
    fn get_creds_by_roles(&self, roles: &[&str], force_new: bool) -> Result<Rc<TestResources>> {
        self.get_scoped_creds_by_roles(roles, CredentialScope::Project, force_new)
    }

    /// Credentials with the given roles in the given scope.
    fn get_scoped_creds_by_roles(
        &self,
        roles: &[&str],
        scope: CredentialScope,
        force_new: bool,
    ) -> Result<Rc<TestResources>>;

    /// Release all credentials and their resources.
    fn clear_creds(&self) -> Result<()>;

    /// Whether different calls can return different users.
    fn is_multi_user(&self) -> bool;

    /// Whether different calls can return different projects.
    fn is_multi_tenant(&self) -> bool;

    /// Whether credentials with this role can be provided.
    fn is_role_available(&self, role: &str) -> bool;
}
