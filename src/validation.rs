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

//! Resources needed to reach a server over the network.
//!
//! A test that boots a server and wants to SSH or ping into it needs a key
//! pair, a security group allowing SSH and ICMP, and a floating IP.

use std::rc::Rc;

use crate::clients::{
    FloatingIp, FloatingIpsApi, KeyPair, KeyPairsApi, NewSecurityGroupRule, SecurityGroup,
    SecurityGroupsApi, ServiceClients,
};
use crate::config::Config;
use crate::utils::rand_name;
use crate::{Error, ErrorKind, Result};

/// Which validation resources to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    /// Create a key pair.
    pub keypair: bool,
    /// Allocate a floating IP.
    pub floating_ip: bool,
    /// Create a security group.
    pub security_group: bool,
    /// Add SSH and ICMP rules to the security group.
    pub security_group_rules: bool,
    /// IP version of the rules, `IPv4` or `IPv6`.
    pub ethertype: String,
    /// Use the network service instead of nova-network.
    pub use_neutron: bool,
    /// External network for floating IPs (network service).
    pub floating_network_id: Option<String>,
    /// Floating IP pool (nova-network).
    pub floating_network_name: Option<String>,
    /// Prefix of resource names.
    pub name_prefix: String,
}

impl Default for ValidationRequest {
    fn default() -> ValidationRequest {
        ValidationRequest {
            keypair: false,
            floating_ip: false,
            security_group: false,
            security_group_rules: false,
            ethertype: String::from("IPv4"),
            use_neutron: true,
            floating_network_id: None,
            floating_network_name: None,
            name_prefix: String::from("tempest"),
        }
    }
}

impl ValidationRequest {
    /// Request everything enabled in configuration.
    pub fn from_config(config: &Config) -> ValidationRequest {
        let validation = &config.validation;
        ValidationRequest {
            keypair: validation.keypair,
            floating_ip: validation.floating_ip,
            security_group: validation.security_group,
            security_group_rules: validation.security_group_rules,
            ethertype: validation.ethertype.clone(),
            use_neutron: config.neutron_available(),
            floating_network_id: config.network.public_network_id.clone(),
            floating_network_name: config.network.floating_network_name.clone(),
            name_prefix: config.resource_name_prefix.clone(),
        }
    }

    fn floating_network(&self) -> Result<&str> {
        let (value, option) = if self.use_neutron {
            (&self.floating_network_id, "network.public_network_id")
        } else {
            (&self.floating_network_name, "network.floating_network_name")
        };
        value.as_deref().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("{} is required to allocate floating IPs", option),
            )
        })
    }
}

/// Clients used for validation resources.
pub trait ValidationClients {
    /// Key pairs client.
    fn keypairs(&self) -> Rc<dyn KeyPairsApi>;

    /// Security groups client of the network service or nova-network.
    fn security_groups(&self, use_neutron: bool) -> Rc<dyn SecurityGroupsApi>;

    /// Floating IPs client of the network service or nova-network.
    fn floating_ips(&self, use_neutron: bool) -> Rc<dyn FloatingIpsApi>;
}

impl ValidationClients for ServiceClients {
    fn keypairs(&self) -> Rc<dyn KeyPairsApi> {
        self.compute()
    }

    fn security_groups(&self, use_neutron: bool) -> Rc<dyn SecurityGroupsApi> {
        if use_neutron {
            self.network()
        } else {
            self.compute()
        }
    }

    fn floating_ips(&self, use_neutron: bool) -> Rc<dyn FloatingIpsApi> {
        if use_neutron {
            self.network()
        } else {
            self.compute()
        }
    }
}

/// Created validation resources.
#[derive(Debug, Clone, Default)]
pub struct ValidationResources {
    /// Key pair with the private key.
    pub keypair: Option<KeyPair>,
    /// Security group with its rules.
    pub security_group: Option<SecurityGroup>,
    /// Floating IP.
    pub floating_ip: Option<FloatingIp>,
    /// Whether the network service was used.
    pub use_neutron: bool,
}

/// Create a security group allowing SSH and ICMP.
///
/// Without `add_rule` the group is created empty. If a rule cannot be
/// created, the group is deleted.
pub fn create_ssh_security_group(
    client: &dyn SecurityGroupsApi,
    name_prefix: &str,
    add_rule: bool,
    ethertype: &str,
) -> Result<SecurityGroup> {
    let name = rand_name("securitygroup", Some(name_prefix));
    let description = format!("{}-desc", name);
    let mut group = client.create_security_group(&name, &description)?;
    debug!("Created security group {} ({})", group.name, group.id);

    if add_rule {
        let rules = [
            NewSecurityGroupRule::ssh(group.id.clone(), ethertype),
            NewSecurityGroupRule::icmp(group.id.clone(), ethertype),
        ];
        for rule in &rules {
            match client.create_security_group_rule(rule) {
                Ok(created) => group.rules.push(created),
                Err(e) => {
                    warn!(
                        "Failed to add a {} rule to security group {}: {}",
                        rule.protocol, group.id, e
                    );
                    if let Err(cleanup) = client.delete_security_group(&group.id) {
                        error!("Failed to delete security group {}: {}", group.id, cleanup);
                    }
                    return Err(e);
                }
            }
        }
    }

    Ok(group)
}

/// Create the requested validation resources.
///
/// Resources are created in order: key pair, security group, floating IP.
/// On failure everything created so far is removed and the original error
/// is returned.
pub fn create_validation_resources<C: ValidationClients + ?Sized>(
    clients: &C,
    request: &ValidationRequest,
) -> Result<ValidationResources> {
    let floating_network = if request.floating_ip {
        Some(request.floating_network()?.to_string())
    } else {
        None
    };

    let mut resources = ValidationResources {
        use_neutron: request.use_neutron,
        ..ValidationResources::default()
    };
    match create_into(clients, request, floating_network.as_deref(), &mut resources) {
        Ok(()) => Ok(resources),
        Err(e) => {
            warn!("Failed to create validation resources: {}", e);
            if let Err(cleanup) = clear_validation_resources(clients, &resources) {
                error!("Cleanup of partially created validation resources failed: {}", cleanup);
            }
            Err(e)
        }
    }
}

fn create_into<C: ValidationClients + ?Sized>(
    clients: &C,
    request: &ValidationRequest,
    floating_network: Option<&str>,
    resources: &mut ValidationResources,
) -> Result<()> {
    if request.keypair {
        let name = rand_name("keypair", Some(&request.name_prefix));
        let keypair = clients.keypairs().create_keypair(&name)?;
        debug!("Created validation key pair {}", keypair.name);
        resources.keypair = Some(keypair);
    }

    if request.security_group {
        let client = clients.security_groups(request.use_neutron);
        let group = create_ssh_security_group(
            &*client,
            &request.name_prefix,
            request.security_group_rules,
            &request.ethertype,
        )?;
        resources.security_group = Some(group);
    }

    if let Some(network) = floating_network {
        let fip = clients
            .floating_ips(request.use_neutron)
            .create_floating_ip(network)?;
        debug!("Allocated floating IP {}", fip.floating_ip_address);
        resources.floating_ip = Some(fip);
    }

    Ok(())
}

fn tolerate(result: Result<()>, what: &str, failures: &mut Vec<Error>) {
    match result {
        Ok(()) => {}
        Err(ref e) if e.is_not_found() => {
            warn!("{} was already deleted", what);
        }
        Err(e) => {
            error!("Failed to delete {}: {}", what, e);
            failures.push(e);
        }
    }
}

/// Delete validation resources.
///
/// Every resource is attempted even if deleting another one fails. Missing
/// resources are not an error, other failures are returned together as
/// `CleanupFailed`.
pub fn clear_validation_resources<C: ValidationClients + ?Sized>(
    clients: &C,
    resources: &ValidationResources,
) -> Result<()> {
    let mut failures = Vec::new();

    if let Some(ref keypair) = resources.keypair {
        let result = clients.keypairs().delete_keypair(&keypair.name);
        tolerate(result, &format!("key pair {}", keypair.name), &mut failures);
    }

    if let Some(ref group) = resources.security_group {
        let client = clients.security_groups(resources.use_neutron);
        let result = client
            .delete_security_group(&group.id)
            .and_then(|_| client.wait_for_security_group_deletion(&group.id));
        tolerate(result, &format!("security group {}", group.id), &mut failures);
    }

    if let Some(ref fip) = resources.floating_ip {
        let result = clients
            .floating_ips(resources.use_neutron)
            .delete_floating_ip(&fip.id);
        tolerate(result, &format!("floating IP {}", fip.floating_ip_address), &mut failures);
    }

    Error::from_failures("Cleanup of validation resources failed", failures)
}
