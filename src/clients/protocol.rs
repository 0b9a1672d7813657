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

//! JSON structures and protocol bits for the identity, network and compute
//! APIs.

#![allow(missing_docs)]

use serde::de::Error as DeserError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize an ID that may be a number (nova-network) or a string.
pub fn deser_id<'de, D>(des: D) -> ::std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(des)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DeserError::custom(format!("invalid ID {}", other))),
    }
}

/// Deserialize `null` as an empty string.
pub fn deser_null_as_empty<'de, D>(des: D) -> ::std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(des)?;
    Ok(value.unwrap_or_default())
}

/// A project (tenant in Identity API v2.0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRoot {
    #[serde(alias = "tenant")]
    pub project: Project,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
}

/// A user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRoot {
    pub user: User,
}

/// A request to create a user.
///
/// The project is serialized as `tenantId` for Identity API v2.0 and as
/// `default_project_id` for v3 by the identity client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub password: String,
    pub project_id: String,
    pub email: String,
    pub domain_id: Option<String>,
}

/// A role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleRoot {
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolesRoot {
    pub roles: Vec<Role>,
}

/// A domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainsRoot {
    pub domains: Vec<Domain>,
}

/// A network.
///
/// Networks from nova-network carry a `label` instead of a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Network {
    #[serde(deserialize_with = "deser_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deser_null_as_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, alias = "tenant_id", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
}

impl Network {
    /// Whether the network has the given name or label.
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.label.as_deref() == Some(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRoot {
    pub network: Network,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworksRoot {
    pub networks: Vec<Network>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNetwork {
    pub name: String,
    #[serde(rename = "tenant_id")]
    pub project_id: String,
    #[serde(
        rename = "provider:physical_network",
        skip_serializing_if = "Option::is_none"
    )]
    pub physical_network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_security_enabled: Option<bool>,
}

/// A subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default, deserialize_with = "deser_null_as_empty")]
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    #[serde(default)]
    pub ip_version: u8,
    #[serde(default)]
    pub enable_dhcp: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubnetRoot {
    pub subnet: Subnet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSubnet {
    pub name: String,
    pub network_id: String,
    #[serde(rename = "tenant_id")]
    pub project_id: String,
    pub cidr: String,
    pub ip_version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_dhcp: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExternalGateway {
    pub network_id: String,
}

/// A router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Router {
    pub id: String,
    #[serde(default, deserialize_with = "deser_null_as_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_gateway_info: Option<ExternalGateway>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterRoot {
    pub router: Router,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRouter {
    pub name: String,
    #[serde(rename = "tenant_id")]
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_gateway_info: Option<ExternalGateway>,
}

/// A security group rule.
///
/// Field aliases cover the nova-network representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecurityGroupRule {
    #[serde(deserialize_with = "deser_id")]
    pub id: String,
    #[serde(default, alias = "parent_group_id", deserialize_with = "deser_optional_id")]
    pub security_group_id: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default, alias = "ip_protocol")]
    pub protocol: Option<String>,
    #[serde(default, alias = "from_port")]
    pub port_range_min: Option<i32>,
    #[serde(default, alias = "to_port")]
    pub port_range_max: Option<i32>,
}

/// Deserialize an optional ID that may be a number.
pub fn deser_optional_id<'de, D>(des: D) -> ::std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(des)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(DeserError::custom(format!("invalid ID {}", other))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityGroupRuleRoot {
    #[serde(alias = "security_group_rule")]
    pub rule: SecurityGroupRule,
}

/// A request to create an ingress security group rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecurityGroupRule {
    pub security_group_id: String,
    pub protocol: String,
    pub port_range_min: Option<i32>,
    pub port_range_max: Option<i32>,
    pub ethertype: String,
}

impl NewSecurityGroupRule {
    /// Rule allowing SSH.
    pub fn ssh<S1: Into<String>, S2: Into<String>>(group_id: S1, ethertype: S2) -> NewSecurityGroupRule {
        NewSecurityGroupRule {
            security_group_id: group_id.into(),
            protocol: String::from("tcp"),
            port_range_min: Some(22),
            port_range_max: Some(22),
            ethertype: ethertype.into(),
        }
    }

    /// Rule allowing ICMP (ping).
    pub fn icmp<S1: Into<String>, S2: Into<String>>(group_id: S1, ethertype: S2) -> NewSecurityGroupRule {
        let ethertype = ethertype.into();
        NewSecurityGroupRule {
            security_group_id: group_id.into(),
            protocol: if ethertype == "IPv6" {
                String::from("icmpv6")
            } else {
                String::from("icmp")
            },
            port_range_min: None,
            port_range_max: None,
            ethertype,
        }
    }
}

/// A security group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecurityGroup {
    #[serde(deserialize_with = "deser_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "deser_null_as_empty")]
    pub description: String,
    #[serde(default, alias = "tenant_id", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, alias = "security_group_rules")]
    pub rules: Vec<SecurityGroupRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityGroupRoot {
    pub security_group: SecurityGroup,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityGroupsRoot {
    pub security_groups: Vec<SecurityGroup>,
}

/// A key pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyPair {
    pub name: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyPairRoot {
    pub keypair: KeyPair,
}

/// A floating IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FloatingIp {
    #[serde(deserialize_with = "deser_id")]
    pub id: String,
    #[serde(alias = "ip")]
    pub floating_ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIpRoot {
    #[serde(alias = "floating_ip")]
    pub floatingip: FloatingIp,
}
