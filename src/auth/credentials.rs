// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Identity credentials.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use static_assertions::assert_impl_all;

use super::protocol::AuthBody;
use crate::{Error, ErrorKind, Result};

/// Identity API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum IdentityVersion {
    /// Identity API v2.0.
    #[serde(rename = "v2")]
    V2,
    /// Identity API v3.
    #[serde(rename = "v3")]
    V3,
}

impl Default for IdentityVersion {
    fn default() -> IdentityVersion {
        IdentityVersion::V3
    }
}

impl FromStr for IdentityVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<IdentityVersion> {
        match s {
            "v2" | "v2.0" => Ok(IdentityVersion::V2),
            "v3" => Ok(IdentityVersion::V3),
            other => Err(Error::new(
                ErrorKind::InvalidConfig,
                format!("Unsupported identity version: {}", other),
            )),
        }
    }
}

impl fmt::Display for IdentityVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            IdentityVersion::V2 => "v2",
            IdentityVersion::V3 => "v3",
        })
    }
}

/// A known credentials attribute.
///
/// The order of variants is the order in which attributes are applied on
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Attribute {
    Username,
    Password,
    UserId,
    TenantName,
    TenantId,
    ProjectName,
    ProjectId,
    UserDomainId,
    UserDomainName,
    ProjectDomainId,
    ProjectDomainName,
    DomainId,
    DomainName,
    System,
}

const V2_ATTRIBUTES: &[Attribute] = &[
    Attribute::Username,
    Attribute::Password,
    Attribute::UserId,
    Attribute::TenantName,
    Attribute::TenantId,
    Attribute::ProjectName,
    Attribute::ProjectId,
];

const V3_ATTRIBUTES: &[Attribute] = &[
    Attribute::Username,
    Attribute::Password,
    Attribute::UserId,
    Attribute::TenantName,
    Attribute::TenantId,
    Attribute::ProjectName,
    Attribute::ProjectId,
    Attribute::UserDomainId,
    Attribute::UserDomainName,
    Attribute::ProjectDomainId,
    Attribute::ProjectDomainName,
    Attribute::DomainId,
    Attribute::DomainName,
    Attribute::System,
];

const COLLISIONS: &[(Attribute, Attribute)] = &[
    (Attribute::ProjectName, Attribute::TenantName),
    (Attribute::ProjectId, Attribute::TenantId),
];

impl Attribute {
    /// Attribute name as used in configuration and account files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Username => "username",
            Attribute::Password => "password",
            Attribute::UserId => "user_id",
            Attribute::TenantName => "tenant_name",
            Attribute::TenantId => "tenant_id",
            Attribute::ProjectName => "project_name",
            Attribute::ProjectId => "project_id",
            Attribute::UserDomainId => "user_domain_id",
            Attribute::UserDomainName => "user_domain_name",
            Attribute::ProjectDomainId => "project_domain_id",
            Attribute::ProjectDomainName => "project_domain_name",
            Attribute::DomainId => "domain_id",
            Attribute::DomainName => "domain_name",
            Attribute::System => "system",
        }
    }

    /// Attributes accepted by the given identity version.
    pub fn supported(version: IdentityVersion) -> &'static [Attribute] {
        match version {
            IdentityVersion::V2 => V2_ATTRIBUTES,
            IdentityVersion::V3 => V3_ATTRIBUTES,
        }
    }

    /// Attributes accepted by all identity versions.
    ///
    /// These fields identify a pre-provisioned account.
    pub fn common() -> impl Iterator<Item = Attribute> {
        V2_ATTRIBUTES
            .iter()
            .copied()
            .filter(|a| V3_ATTRIBUTES.contains(a))
    }

    /// Whether the attribute is a domain attribute.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Attribute::UserDomainId
                | Attribute::UserDomainName
                | Attribute::ProjectDomainId
                | Attribute::ProjectDomainName
                | Attribute::DomainId
                | Attribute::DomainName
        )
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Attribute> {
        V3_ATTRIBUTES
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidCredentials,
                    format!("{} is not a valid credentials attribute", s),
                )
            })
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of identity attributes.
///
/// Attributes are validated against the list supported by the identity
/// version. Project and tenant attributes are aliases, with Identity API v3
/// the user and project domains default to each other and to `domain_name`.
/// Explicitly passed attributes are never overridden by aliases.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    version: IdentityVersion,
    values: BTreeMap<Attribute, String>,
    initial: BTreeMap<Attribute, String>,
}

assert_impl_all!(Credentials: Send, Sync);

impl Credentials {
    /// Create credentials from name-value pairs.
    ///
    /// Fails with `InvalidCredentials` on unknown attributes or conflicting
    /// project and tenant values.
    pub fn new<I, K, V>(version: IdentityVersion, attributes: I) -> Result<Credentials>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut initial = BTreeMap::new();
        for (key, value) in attributes {
            let key = key.as_ref();
            let attr = key.parse::<Attribute>().ok().filter(|a| {
                Attribute::supported(version).contains(a)
            });
            match attr {
                Some(attr) => {
                    let _ = initial.insert(attr, value.into());
                }
                None => {
                    return Err(Error::new(
                        ErrorKind::InvalidCredentials,
                        format!("{} is not a valid attr for {} credentials", key, version),
                    ))
                }
            }
        }

        Credentials::from_initial(version, initial)
    }

    fn from_initial(
        version: IdentityVersion,
        initial: BTreeMap<Attribute, String>,
    ) -> Result<Credentials> {
        for (first, second) in COLLISIONS {
            if let (Some(v1), Some(v2)) = (initial.get(first), initial.get(second)) {
                if !v1.is_empty() && !v2.is_empty() && v1 != v2 {
                    return Err(Error::new(
                        ErrorKind::InvalidCredentials,
                        format!("Cannot have conflicting values for {} and {}", first, second),
                    ));
                }
            }
        }

        let mut result = Credentials {
            version,
            values: BTreeMap::new(),
            initial,
        };
        result.apply_initial();
        Ok(result)
    }

    /// Explicit values first, then aliases into the slots left empty.
    fn apply_initial(&mut self) {
        let initial = self.initial.clone();
        for (attr, value) in &initial {
            self.set_raw(*attr, value);
        }

        const ALIASES: &[(Attribute, Attribute)] = &[
            (Attribute::TenantId, Attribute::ProjectId),
            (Attribute::ProjectId, Attribute::TenantId),
            (Attribute::TenantName, Attribute::ProjectName),
            (Attribute::ProjectName, Attribute::TenantName),
            // domain_name takes precedence over the cross-fill below
            (Attribute::DomainName, Attribute::UserDomainName),
            (Attribute::DomainName, Attribute::ProjectDomainName),
            (Attribute::UserDomainId, Attribute::ProjectDomainId),
            (Attribute::ProjectDomainId, Attribute::UserDomainId),
            (Attribute::UserDomainName, Attribute::ProjectDomainName),
            (Attribute::ProjectDomainName, Attribute::UserDomainName),
        ];
        let supported = Attribute::supported(self.version);
        for (source, target) in ALIASES {
            if !supported.contains(target) {
                continue;
            }
            if let Some(value) = initial.get(source) {
                self.set_if_unset(*target, value);
            }
        }
    }

    /// Identity API version of these credentials.
    #[inline]
    pub fn identity_version(&self) -> IdentityVersion {
        self.version
    }

    /// Get an attribute value.
    #[inline]
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        self.values.get(&attr).map(String::as_str)
    }

    /// Get an attribute value by its name.
    ///
    /// Unknown names yield `None`.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        name.parse::<Attribute>().ok().and_then(|a| self.get(a))
    }

    /// Set an attribute, propagating it to its aliases.
    ///
    /// Attributes that are not supported by the identity version are ignored.
    pub fn set<S: Into<String>>(&mut self, attr: Attribute, value: S) {
        if !Attribute::supported(self.version).contains(&attr) {
            warn!(
                "Ignoring attribute {} not supported by {} credentials",
                attr, self.version
            );
            return;
        }

        let value = value.into();
        match attr {
            Attribute::TenantId => self.set_raw(Attribute::ProjectId, &value),
            Attribute::TenantName => self.set_raw(Attribute::ProjectName, &value),
            Attribute::ProjectId => self.set_raw(Attribute::TenantId, &value),
            Attribute::ProjectName => self.set_raw(Attribute::TenantName, &value),
            Attribute::UserDomainId => self.set_if_unset(Attribute::ProjectDomainId, &value),
            Attribute::ProjectDomainId => self.set_if_unset(Attribute::UserDomainId, &value),
            Attribute::UserDomainName => self.set_if_unset(Attribute::ProjectDomainName, &value),
            Attribute::ProjectDomainName => self.set_if_unset(Attribute::UserDomainName, &value),
            Attribute::DomainName => {
                self.set_if_unset(Attribute::UserDomainName, &value);
                self.set_if_unset(Attribute::ProjectDomainName, &value);
            }
            _ => {}
        }
        self.set_raw(attr, &value);
    }

    /// Set an attribute only if it has no value yet.
    pub fn set_if_missing<S: Into<String>>(&mut self, attr: Attribute, value: S) {
        if self.get(attr).is_none() {
            self.set(attr, value);
        }
    }

    fn set_raw(&mut self, attr: Attribute, value: &str) {
        let _ = self.values.insert(attr, value.to_string());
    }

    fn set_if_unset(&mut self, attr: Attribute, value: &str) {
        if !self.values.contains_key(&attr) {
            self.set_raw(attr, value);
        }
    }

    /// Attributes passed on construction.
    pub fn initial_attributes(&self) -> BTreeSet<Attribute> {
        self.initial.keys().copied().collect()
    }

    /// Restore the state right after construction.
    pub fn reset(&mut self) {
        self.values.clear();
        self.apply_initial();
    }

    /// Check that the minimum set of attributes required to authenticate is
    /// present. No API calls are made.
    pub fn is_valid(&self) -> bool {
        let has = |attr| self.values.contains_key(&attr);
        match self.version {
            IdentityVersion::V2 => has(Attribute::Username) && has(Attribute::Password),
            IdentityVersion::V3 => {
                let user_domain = has(Attribute::UserDomainId) || has(Attribute::UserDomainName);
                let project_domain =
                    has(Attribute::ProjectDomainId) || has(Attribute::ProjectDomainName);
                let user = has(Attribute::UserId) || (has(Attribute::Username) && user_domain);
                let project_scope = (!has(Attribute::ProjectName) && !has(Attribute::ProjectId))
                    || has(Attribute::ProjectId)
                    || (has(Attribute::ProjectName) && project_domain);
                has(Attribute::Password) && user && project_scope
            }
        }
    }

    /// Fill in attributes that are not set yet from an authentication response.
    pub fn fill_from(&mut self, body: &AuthBody) {
        match body {
            AuthBody::V2(access) => {
                if let Some(ref tenant) = access.token.tenant {
                    self.set_if_missing(Attribute::TenantName, tenant.name.as_str());
                    self.set_if_missing(Attribute::TenantId, tenant.id.as_str());
                }
                self.set_if_missing(Attribute::Username, access.user.name.as_str());
                self.set_if_missing(Attribute::UserId, access.user.id.as_str());
            }
            AuthBody::V3(token) => {
                if let Some(ref project) = token.project {
                    self.set_if_missing(Attribute::ProjectName, project.name.as_str());
                    self.set_if_missing(Attribute::ProjectId, project.id.as_str());
                    self.set_if_missing(Attribute::ProjectDomainId, project.domain.id.as_str());
                    self.set_if_missing(
                        Attribute::ProjectDomainName,
                        project.domain.name.as_str(),
                    );
                }
                if let Some(ref domain) = token.domain {
                    self.set_if_missing(Attribute::DomainId, domain.id.as_str());
                    self.set_if_missing(Attribute::DomainName, domain.name.as_str());
                }
                self.set_if_missing(Attribute::Username, token.user.name.as_str());
                self.set_if_missing(Attribute::UserId, token.user.id.as_str());
                self.set_if_missing(Attribute::UserDomainId, token.user.domain.id.as_str());
                self.set_if_missing(Attribute::UserDomainName, token.user.domain.name.as_str());
            }
        }
    }

    /// Iterate over attributes that have values.
    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// User name.
    #[inline]
    pub fn username(&self) -> Option<&str> {
        self.get(Attribute::Username)
    }

    /// Password.
    #[inline]
    pub fn password(&self) -> Option<&str> {
        self.get(Attribute::Password)
    }

    /// User ID.
    #[inline]
    pub fn user_id(&self) -> Option<&str> {
        self.get(Attribute::UserId)
    }

    /// Project (tenant) name.
    #[inline]
    pub fn project_name(&self) -> Option<&str> {
        self.get(Attribute::ProjectName)
    }

    /// Project (tenant) ID.
    #[inline]
    pub fn project_id(&self) -> Option<&str> {
        self.get(Attribute::ProjectId)
    }

    /// Tenant name, an alias of the project name.
    #[inline]
    pub fn tenant_name(&self) -> Option<&str> {
        self.get(Attribute::TenantName)
    }

    /// Tenant ID, an alias of the project ID.
    #[inline]
    pub fn tenant_id(&self) -> Option<&str> {
        self.get(Attribute::TenantId)
    }

    /// Domain name (for domain scope).
    #[inline]
    pub fn domain_name(&self) -> Option<&str> {
        self.get(Attribute::DomainName)
    }

    /// Domain ID (for domain scope).
    #[inline]
    pub fn domain_id(&self) -> Option<&str> {
        self.get(Attribute::DomainId)
    }

    /// User domain name.
    #[inline]
    pub fn user_domain_name(&self) -> Option<&str> {
        self.get(Attribute::UserDomainName)
    }

    /// User domain ID.
    #[inline]
    pub fn user_domain_id(&self) -> Option<&str> {
        self.get(Attribute::UserDomainId)
    }

    /// Project domain name.
    #[inline]
    pub fn project_domain_name(&self) -> Option<&str> {
        self.get(Attribute::ProjectDomainName)
    }

    /// Project domain ID.
    #[inline]
    pub fn project_domain_id(&self) -> Option<&str> {
        self.get(Attribute::ProjectDomainId)
    }

    /// System scope (e.g. `all`).
    #[inline]
    pub fn system(&self) -> Option<&str> {
        self.get(Attribute::System)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_map();
        let _ = map.entry(&"version", &self.version);
        for (attr, value) in &self.values {
            if *attr == Attribute::Password {
                let _ = map.entry(&attr.as_str(), &"<redacted>");
            } else {
                let _ = map.entry(&attr.as_str(), value);
            }
        }
        map.finish()
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let attrs: Vec<_> = self
            .values
            .iter()
            .filter(|(attr, _)| **attr != Attribute::Password)
            .map(|(attr, value)| format!("{}={}", attr, value))
            .collect();
        write!(f, "Credentials: {}", attrs.join(", "))
    }
}
