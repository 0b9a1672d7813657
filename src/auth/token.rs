// Copyright 2019-2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Token requests.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use reqwest::Method;
use serde_json::{json, Map, Value};

use super::credentials::{Credentials, IdentityVersion};
use super::protocol::{AccessRoot, AuthBody, TokenRoot};
use crate::session::{HttpClient, Request};
use crate::utils::url;
use crate::{Error, ErrorKind, Result};

const MISSING_SUBJECT_HEADER: &str = "Missing X-Subject-Token header";

/// Scope of a requested token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Project scope (unscoped if no project is known).
    Project,
    /// Domain scope.
    Domain,
    /// System scope.
    System,
}

impl Scope {
    /// Scope matching the given credentials.
    pub fn for_credentials(credentials: &Credentials) -> Scope {
        let has_project = credentials.project_id().is_some() || credentials.project_name().is_some();
        if credentials.system().is_some() {
            Scope::System
        } else if !has_project
            && (credentials.domain_id().is_some() || credentials.domain_name().is_some())
        {
            Scope::Domain
        } else {
            Scope::Project
        }
    }
}

impl Default for Scope {
    fn default() -> Scope {
        Scope::Project
    }
}

/// A token together with the authentication response.
#[derive(Clone, PartialEq)]
pub struct AuthData {
    /// Token value.
    pub token: String,
    /// Authentication response body.
    pub body: AuthBody,
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut hasher = DefaultHasher::new();
        self.token.hash(&mut hasher);
        write!(
            f,
            "AuthData {{ token: hash({}), body: {:?} }}",
            hasher.finish(),
            self.body
        )
    }
}

/// A source of authentication tokens.
pub trait TokenClient: fmt::Debug {
    /// Identity endpoint used for authentication.
    fn auth_url(&self) -> &str;

    /// Request a new token.
    fn get_token(&self, credentials: &Credentials, scope: Scope) -> Result<AuthData>;
}

/// Token client talking to the Identity service over HTTP.
#[derive(Debug, Clone)]
pub struct KeystoneTokenClient {
    http: Rc<HttpClient>,
    auth_url: String,
}

impl KeystoneTokenClient {
    /// Create a token client.
    ///
    /// `auth_url` is the versioned identity endpoint, e.g.
    /// `https://cloud/identity/v3`.
    pub fn new<S: Into<String>>(http: Rc<HttpClient>, auth_url: S) -> Result<KeystoneTokenClient> {
        let auth_url = auth_url.into();
        let _ = url::parse(&auth_url)?;
        Ok(KeystoneTokenClient { http, auth_url })
    }

    fn get_v2_token(&self, credentials: &Credentials) -> Result<AuthData> {
        let endpoint = url::join(&self.auth_url, "tokens")?;
        let body = v2_auth_body(credentials)?;
        let resp = self
            .http
            .send(&Request::new(Method::POST, endpoint).with_body(body))?;
        let root: AccessRoot = serde_json::from_value(resp.body)?;
        debug!("Received a V2 token expiring at {}", root.access.token.expires);
        Ok(AuthData {
            token: root.access.token.id.clone(),
            body: AuthBody::V2(root.access),
        })
    }

    fn get_v3_token(&self, credentials: &Credentials, scope: Scope) -> Result<AuthData> {
        let endpoint = url::join(&self.auth_url, "auth/tokens")?;
        let body = v3_auth_body(credentials, scope)?;
        let resp = self
            .http
            .send(&Request::new(Method::POST, endpoint).with_body(body))?;
        let token = match resp.headers.get("x-subject-token") {
            Some(value) => value
                .to_str()
                .map_err(|e| {
                    error!("Invalid X-Subject-Token received: {}", e);
                    Error::new(ErrorKind::InvalidResponse, e.to_string())
                })?
                .to_string(),
            None => {
                error!("No X-Subject-Token header received from {}", self.auth_url);
                return Err(Error::new(ErrorKind::InvalidResponse, MISSING_SUBJECT_HEADER));
            }
        };
        let root: TokenRoot = serde_json::from_value(resp.body)?;
        debug!("Received a V3 token expiring at {}", root.token.expires_at);
        trace!("Received catalog: {:?}", root.token.catalog);
        Ok(AuthData {
            token,
            body: AuthBody::V3(root.token),
        })
    }
}

impl TokenClient for KeystoneTokenClient {
    fn auth_url(&self) -> &str {
        &self.auth_url
    }

    fn get_token(&self, credentials: &Credentials, scope: Scope) -> Result<AuthData> {
        match credentials.identity_version() {
            IdentityVersion::V2 => self.get_v2_token(credentials),
            IdentityVersion::V3 => self.get_v3_token(credentials, scope),
        }
    }
}

fn missing(what: &str) -> Error {
    Error::new(
        ErrorKind::InvalidCredentials,
        format!("Cannot request a token without {}", what),
    )
}

/// Request body for Identity API v2.0.
pub(crate) fn v2_auth_body(credentials: &Credentials) -> Result<Value> {
    let username = credentials.username().ok_or_else(|| missing("username"))?;
    let password = credentials.password().ok_or_else(|| missing("password"))?;
    let mut auth = Map::new();
    let _ = auth.insert(
        "passwordCredentials".to_string(),
        json!({"username": username, "password": password}),
    );
    if let Some(tenant_id) = credentials.tenant_id() {
        let _ = auth.insert("tenantId".to_string(), json!(tenant_id));
    } else if let Some(tenant_name) = credentials.tenant_name() {
        let _ = auth.insert("tenantName".to_string(), json!(tenant_name));
    }
    Ok(json!({ "auth": auth }))
}

fn id_or_name(id: Option<&str>, name: Option<&str>) -> Option<Value> {
    match (id, name) {
        (Some(id), _) => Some(json!({ "id": id })),
        (None, Some(name)) => Some(json!({ "name": name })),
        (None, None) => None,
    }
}

/// Request body for Identity API v3.
pub(crate) fn v3_auth_body(credentials: &Credentials, scope: Scope) -> Result<Value> {
    let password = credentials.password().ok_or_else(|| missing("password"))?;
    let user = match credentials.user_id() {
        Some(user_id) => json!({"id": user_id, "password": password}),
        None => {
            let username = credentials.username().ok_or_else(|| missing("username"))?;
            let domain = id_or_name(credentials.user_domain_id(), credentials.user_domain_name())
                .ok_or_else(|| missing("user domain"))?;
            json!({"name": username, "password": password, "domain": domain})
        }
    };

    let scope = match scope {
        Scope::Project => match credentials.project_id() {
            Some(project_id) => Some(json!({"project": {"id": project_id}})),
            None => match credentials.project_name() {
                Some(project_name) => {
                    let domain = id_or_name(
                        credentials.project_domain_id(),
                        credentials.project_domain_name(),
                    )
                    .ok_or_else(|| missing("project domain"))?;
                    Some(json!({"project": {"name": project_name, "domain": domain}}))
                }
                None => None,
            },
        },
        Scope::Domain => id_or_name(credentials.domain_id(), credentials.domain_name())
            .map(|domain| json!({ "domain": domain })),
        Scope::System => credentials.system().map(|system| {
            let mut value = Map::new();
            let _ = value.insert(system.to_string(), Value::Bool(true));
            json!({ "system": value })
        }),
    };

    let mut auth = Map::new();
    let _ = auth.insert(
        "identity".to_string(),
        json!({"methods": ["password"], "password": {"user": user}}),
    );
    if let Some(scope) = scope {
        let _ = auth.insert("scope".to_string(), scope);
    }
    Ok(json!({ "auth": auth }))
}
