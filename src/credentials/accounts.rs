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

//! Accounts file and the pool of pre-provisioned accounts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use md5::{Digest, Md5};
use serde::de::{self, Deserialize, Deserializer};
use serde_yaml::Value;

use super::CredentialScope;
use crate::auth::Attribute;
use crate::{Error, ErrorKind, Result};

/// An account from the accounts file.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Account {
    /// Credential attributes, e.g. `username`.
    #[serde(flatten, deserialize_with = "scalar_attributes")]
    pub attributes: BTreeMap<String, String>,
    /// Roles of the account.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Well-known role shorthands: `admin`, `operator`, `reseller_admin`.
    #[serde(default)]
    pub types: Vec<String>,
    /// Resources associated with the account, only `network` is recognized.
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}

/// Attribute values may be any YAML scalar, e.g. a numeric `project_id`.
fn scalar_attributes<'de, D>(
    deserializer: D,
) -> ::std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, Value>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(de::Error::invalid_type(
                        unexpected(&other),
                        &"a string, a number or a boolean",
                    ))
                }
            };
            Ok((key, value))
        })
        .collect()
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Null => de::Unexpected::Unit,
        Value::Sequence(..) => de::Unexpected::Seq,
        Value::Mapping(..) => de::Unexpected::Map,
        _ => de::Unexpected::Other("YAML value"),
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let attributes: BTreeMap<&str, &str> = self
            .attributes
            .iter()
            .map(|(k, v)| {
                if k == "password" {
                    (k.as_str(), "***")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("Account")
            .field("attributes", &attributes)
            .field("roles", &self.roles)
            .field("types", &self.types)
            .field("resources", &self.resources)
            .finish()
    }
}

impl Account {
    /// Scope implied by the attributes, if any.
    pub fn scope(&self) -> Option<CredentialScope> {
        let has = |name: &str| self.attributes.contains_key(name);
        if has("project_name") || has("tenant_name") || has("project_id") || has("tenant_id") {
            Some(CredentialScope::Project)
        } else if has("domain_name") || has("domain_id") {
            Some(CredentialScope::Domain)
        } else if has("system") {
            Some(CredentialScope::System)
        } else {
            None
        }
    }

    /// Hash identifying the account.
    ///
    /// Only attributes valid for all identity versions are hashed, rendered
    /// as a JSON object with sorted keys.
    pub fn hash(&self) -> Result<String> {
        let fields: BTreeMap<&str, &str> = Attribute::common()
            .filter_map(|attr| {
                self.attributes
                    .get(attr.as_str())
                    .map(|v| (attr.as_str(), v.as_str()))
            })
            .collect();
        let rendered = serde_json::to_string(&fields)?;
        Ok(hex::encode(Md5::digest(rendered.as_bytes())))
    }
}

/// Read an accounts YAML file.
pub fn read_accounts_yaml<P: AsRef<Path>>(path: P) -> Result<Vec<Account>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot read accounts file {}: {}", path.display(), e),
        )
    })?;
    serde_yaml::from_str(&contents).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Invalid accounts file {}: {}", path.display(), e),
        )
    })
}

fn missing_role(kind: &str) -> Error {
    Error::new(
        ErrorKind::InvalidCredentials,
        format!("Account type {} is used but no role is configured for it", kind),
    )
}

/// Indexed pool of accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountPool {
    creds: BTreeMap<String, Account>,
    roles: BTreeMap<String, BTreeSet<String>>,
    scoped_roles: BTreeMap<(CredentialScope, String), BTreeSet<String>>,
    networks: BTreeMap<String, String>,
    admin_role: String,
}

impl AccountPool {
    /// Index accounts.
    ///
    /// Account types are translated to the given roles.
    pub fn new(
        accounts: Vec<Account>,
        admin_role: &str,
        operator_role: Option<&str>,
        reseller_role: Option<&str>,
    ) -> Result<AccountPool> {
        let mut pool = AccountPool {
            admin_role: admin_role.to_string(),
            ..AccountPool::default()
        };

        for account in accounts {
            let hash = account.hash()?;
            let mut roles: BTreeSet<String> = account.roles.iter().cloned().collect();
            for kind in &account.types {
                let role = match kind.as_str() {
                    "admin" => Some(admin_role).filter(|r| !r.is_empty()),
                    "operator" => operator_role,
                    "reseller_admin" => reseller_role,
                    other => {
                        warn!("Unknown account type {}, ignoring it", other);
                        continue;
                    }
                };
                let _ = roles.insert(role.ok_or_else(|| missing_role(kind))?.to_string());
            }

            let scope = account.scope();
            for role in roles {
                if let Some(scope) = scope {
                    let _ = pool
                        .scoped_roles
                        .entry((scope, role.clone()))
                        .or_default()
                        .insert(hash.clone());
                }
                let _ = pool.roles.entry(role).or_default().insert(hash.clone());
            }

            for (kind, value) in &account.resources {
                if kind == "network" {
                    let _ = pool.networks.insert(hash.clone(), value.clone());
                } else {
                    warn!("Unknown resource type {}, ignoring it", kind);
                }
            }

            if pool.creds.insert(hash.clone(), account).is_some() {
                warn!("Duplicate account with hash {} in the accounts file", hash);
            }
        }

        debug!("Loaded {} pre-provisioned accounts", pool.creds.len());
        Ok(pool)
    }

    /// Number of accounts.
    #[inline]
    pub fn len(&self) -> usize {
        self.creds.len()
    }

    /// Whether the pool is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.creds.is_empty()
    }

    /// Account by hash.
    pub fn account(&self, hash: &str) -> Option<&Account> {
        self.creds.get(hash)
    }

    /// Iterate over hashes and accounts.
    pub fn accounts(&self) -> impl Iterator<Item = (&str, &Account)> {
        self.creds.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether any account has the role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.get(role).map_or(false, |h| !h.is_empty())
    }

    /// Network name associated with an account.
    pub fn network_name(&self, hash: &str) -> Option<&str> {
        self.networks.get(hash).map(String::as_str)
    }

    /// Hashes of accounts having all roles.
    ///
    /// Without roles all accounts match. Accounts with the admin role are
    /// only returned if the admin role is requested explicitly.
    pub fn match_hash_list(
        &self,
        roles: &[&str],
        scope: Option<CredentialScope>,
    ) -> Result<Vec<String>> {
        let mut matching: Option<BTreeSet<String>> = None;
        for role in roles {
            let hashes = match scope {
                Some(scope) => self.scoped_roles.get(&(scope, role.to_string())),
                None => self.roles.get(*role),
            };
            let hashes = hashes.filter(|h| !h.is_empty()).ok_or_else(|| {
                let scope = scope.map(|s| format!(" on {}", s)).unwrap_or_default();
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("No credentials with role {}{} in the accounts file", role, scope),
                )
            })?;
            matching = Some(match matching {
                Some(current) => current.intersection(hashes).cloned().collect(),
                None => hashes.clone(),
            });
        }

        let matching = matching.unwrap_or_else(|| self.creds.keys().cloned().collect());
        let wants_admin = roles.iter().any(|r| *r == self.admin_role);
        match self.roles.get(&self.admin_role) {
            Some(admins) if !wants_admin => {
                Ok(matching.into_iter().filter(|h| !admins.contains(h)).collect())
            }
            _ => Ok(matching.into_iter().collect()),
        }
    }
}
