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

//! Support for the configuration file.
//!
//! Every option has a default, so an empty document is a valid
//! configuration.

use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;

use super::auth::IdentityVersion;
use super::session::HttpOptions;
use super::{Error, ErrorKind, Result};

/// Environment variable with the path to the configuration file.
pub const CONFIG_ENV: &str = "TEMPEST_CONFIG";

/// Authentication and credentials options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Create credentials on the fly.
    pub use_dynamic_credentials: bool,
    /// YAML file with pre-provisioned accounts.
    pub test_accounts_file: Option<PathBuf>,
    /// Domain used for V3 credentials without an explicit domain.
    pub default_credentials_domain_name: String,
    /// Create a network, a subnet and a router for every new project.
    pub create_isolated_networks: bool,
    /// Roles assigned to every created user.
    pub tempest_roles: Vec<String>,
    /// Administrator user name.
    pub admin_username: Option<String>,
    /// Administrator password.
    pub admin_password: Option<String>,
    /// Administrator project name.
    pub admin_project_name: Option<String>,
    /// Administrator domain name.
    pub admin_domain_name: Option<String>,
    /// Administrator system scope, e.g. `all`.
    pub admin_system: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> AuthConfig {
        AuthConfig {
            use_dynamic_credentials: true,
            test_accounts_file: None,
            default_credentials_domain_name: String::from("Default"),
            create_isolated_networks: true,
            tempest_roles: Vec::new(),
            admin_username: None,
            admin_password: None,
            admin_project_name: None,
            admin_domain_name: None,
            admin_system: None,
        }
    }
}

/// Identity service options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identity API version to use.
    pub auth_version: IdentityVersion,
    /// Identity API v2.0 endpoint.
    pub uri: Option<String>,
    /// Identity API v3 endpoint.
    pub uri_v3: Option<String>,
    /// Region of the identity service.
    pub region: Option<String>,
    /// Role with administrative rights.
    pub admin_role: String,
    /// Also assign the admin role on the domain for admin credentials.
    pub admin_domain_scope: bool,
    /// Role assigned to V3 users that end up without any role.
    ///
    /// `None` disables the fallback.
    pub default_member_role: Option<String>,
    /// Endpoint type of the V2 admin API.
    pub v2_admin_endpoint_type: String,
    /// Interface of the V3 API.
    pub v3_endpoint_type: String,
}

impl Default for IdentityConfig {
    fn default() -> IdentityConfig {
        IdentityConfig {
            auth_version: IdentityVersion::V3,
            uri: None,
            uri_v3: None,
            region: None,
            admin_role: String::from("admin"),
            admin_domain_scope: false,
            default_member_role: Some(String::from("member")),
            v2_admin_endpoint_type: String::from("adminURL"),
            v3_endpoint_type: String::from("public"),
        }
    }
}

impl IdentityConfig {
    /// Identity endpoint for the given API version.
    pub fn uri_for(&self, version: IdentityVersion) -> Result<&str> {
        let uri = match version {
            IdentityVersion::V2 => self.uri.as_deref(),
            IdentityVersion::V3 => self.uri_v3.as_deref(),
        };
        uri.ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Identity endpoint for {} is not configured", version),
            )
        })
    }
}

/// Network service options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Block to carve project subnets from.
    pub project_network_cidr: Ipv4Net,
    /// Prefix length of project subnets.
    pub project_network_mask_bits: u8,
    /// External network for routers.
    pub public_network_id: Option<String>,
    /// External network for floating IPs (by name).
    pub floating_network_name: Option<String>,
    /// Physical network to create project networks on.
    pub shared_physical_network: Option<String>,
    /// Endpoint type of the network service.
    pub endpoint_type: Option<String>,
    /// Region of the network service.
    pub region: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> NetworkConfig {
        NetworkConfig {
            project_network_cidr: Ipv4Net::new([10, 100, 0, 0].into(), 16)
                .unwrap_or_default(),
            project_network_mask_bits: 28,
            public_network_id: None,
            floating_network_name: None,
            shared_physical_network: None,
            endpoint_type: None,
            region: None,
        }
    }
}

/// Compute service options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Endpoint type of the compute service.
    pub endpoint_type: Option<String>,
    /// Region of the compute service.
    pub region: Option<String>,
}

/// Availability of optional services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceAvailable {
    /// Whether the network service is deployed.
    pub neutron: bool,
}

impl Default for ServiceAvailable {
    fn default() -> ServiceAvailable {
        ServiceAvailable { neutron: true }
    }
}

/// Validation resources options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Whether validation resources are needed at all.
    pub run_validation: bool,
    /// Create a keypair.
    pub keypair: bool,
    /// Create a security group.
    pub security_group: bool,
    /// Add SSH and ICMP rules to the security group.
    pub security_group_rules: bool,
    /// Allocate a floating IP.
    pub floating_ip: bool,
    /// IP version of the security group rules.
    pub ethertype: String,
    /// Timeout for waiting operations, in seconds.
    pub build_timeout: u64,
    /// Interval between checks, in seconds.
    pub build_interval: u64,
}

impl Default for ValidationConfig {
    fn default() -> ValidationConfig {
        ValidationConfig {
            run_validation: true,
            keypair: true,
            security_group: true,
            security_group_rules: true,
            floating_ip: true,
            ethertype: String::from("IPv4"),
            build_timeout: 300,
            build_interval: 1,
        }
    }
}

/// Object storage options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    /// Role of object storage operators.
    pub operator_role: String,
    /// Role of reseller administrators.
    pub reseller_admin_role: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> ObjectStorageConfig {
        ObjectStorageConfig {
            operator_role: String::from("member"),
            reseller_admin_role: String::from("ResellerAdmin"),
        }
    }
}

/// Parameters of an additional service client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceClientConfig {
    /// Service type in the catalog.
    pub service: String,
    /// Endpoint type or interface.
    pub endpoint_type: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// API version to put into the endpoint path.
    pub api_version: Option<String>,
}

/// The complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Authentication and credentials.
    pub auth: AuthConfig,
    /// Identity service.
    pub identity: IdentityConfig,
    /// Network service.
    pub network: NetworkConfig,
    /// Compute service.
    pub compute: ComputeConfig,
    /// Available services.
    pub service_available: ServiceAvailable,
    /// Validation resources.
    pub validation: ValidationConfig,
    /// Object storage.
    pub object_storage: ObjectStorageConfig,
    /// Prefix of created resource names.
    pub resource_name_prefix: String,
    /// Directory for inter-process locks.
    pub lock_path: PathBuf,
    /// HTTP client options.
    pub http: HttpOptions,
    /// Additional service clients by name.
    pub service_clients: BTreeMap<String, ServiceClientConfig>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            auth: AuthConfig::default(),
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            compute: ComputeConfig::default(),
            service_available: ServiceAvailable::default(),
            validation: ValidationConfig::default(),
            object_storage: ObjectStorageConfig::default(),
            resource_name_prefix: String::from("tempest"),
            lock_path: env::temp_dir().join("tempest-locks"),
            http: HttpOptions::default(),
            service_clients: BTreeMap::new(),
        }
    }
}

fn find_config() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    let current = Path::new("./etc/tempest.yaml");
    if current.is_file() {
        match current.canonicalize() {
            Ok(val) => return Some(val),
            Err(e) => warn!("Cannot canonicalize {:?}: {}", current, e),
        }
    }

    let abs = PathBuf::from("/etc/tempest/tempest.yaml");
    if abs.is_file() {
        Some(abs)
    } else {
        None
    }
}

impl Config {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(value: &str) -> Result<Config> {
        serde_yaml::from_str(value).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Cannot parse configuration: {}", e),
            )
        })
    }

    /// Read configuration from the given file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Cannot read {}: {}", path.display(), e),
            )
        })?;
        let config = serde_yaml::from_reader(file).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Cannot parse {}: {}", path.display(), e),
            )
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Find and read the configuration file.
    ///
    /// The path is taken from `TEMPEST_CONFIG`, then `./etc/tempest.yaml`
    /// and `/etc/tempest/tempest.yaml` are tried.
    pub fn from_env() -> Result<Config> {
        let path = find_config().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                "tempest.yaml was not found in any location",
            )
        })?;
        Config::from_file(path)
    }

    /// Whether the network service is available for credential providers.
    #[inline]
    pub fn neutron_available(&self) -> bool {
        self.service_available.neutron
    }
}
