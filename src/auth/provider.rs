// Copyright 2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Authentication provider with a token cache.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{Duration, NaiveDateTime, Utc};

use super::catalog::{v2_base_url, v3_base_url, EndpointFilters};
use super::credentials::Credentials;
use super::protocol::AuthBody;
use super::token::{AuthData, Scope, TokenClient};
use crate::session::Request;
use crate::utils::url;
use crate::{Error, ErrorKind, Result};

/// Tokens expiring within this number of seconds are considered expired.
pub const TOKEN_EXPIRY_THRESHOLD: i64 = 60;

const EXPIRY_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Part of a request that can be built from alternate authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPart {
    /// Request URL.
    Url,
    /// Request headers.
    Headers,
    /// Request body.
    Body,
}

impl fmt::Display for RequestPart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            RequestPart::Url => "url",
            RequestPart::Headers => "headers",
            RequestPart::Body => "body",
        })
    }
}

#[derive(Debug, Clone)]
struct AltAuth {
    part: RequestPart,
    data: Option<AuthData>,
}

/// Authentication provider for one set of credentials.
///
/// The provider caches the token and refreshes it transparently. It uses no
/// internal locking and is meant to be used from one test context at a time.
pub struct AuthProvider {
    credentials: RefCell<Credentials>,
    scope: Scope,
    token_client: Rc<dyn TokenClient>,
    cache: RefCell<Option<AuthData>>,
    alt: RefCell<Option<AltAuth>>,
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthProvider")
            .field("credentials", &self.credentials.borrow())
            .field("scope", &self.scope)
            .field("auth_url", &self.token_client.auth_url())
            .field("cached", &self.cache.borrow().is_some())
            .finish()
    }
}

/// Parse a token expiry time.
pub fn parse_expiry(value: &str) -> Result<NaiveDateTime> {
    EXPIRY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidResponse,
                format!("time data '{}' does not match any of the known formats", value),
            )
        })
}

fn decorate_request(request: &Request, base_url: &str, token: &str) -> Result<Request> {
    let url = if request.url.is_empty() {
        base_url.to_string()
    } else {
        url::join(base_url, &request.url)?
    };
    let mut result = request.clone().with_header("X-Auth-Token", token);
    result.url = url;
    Ok(result)
}

fn replace_part(target: &mut Request, source: &Request, part: RequestPart) -> Result<()> {
    let unchanged = match part {
        RequestPart::Url => target.url == source.url,
        RequestPart::Headers => target.headers == source.headers,
        RequestPart::Body => target.body == source.body,
    };
    if unchanged {
        return Err(Error::new(
            ErrorKind::BadAltAuth,
            format!("The {} part of the request would not change", part),
        ));
    }

    match part {
        RequestPart::Url => target.url = source.url.clone(),
        RequestPart::Headers => target.headers = source.headers.clone(),
        RequestPart::Body => target.body = source.body.clone(),
    }
    Ok(())
}

impl AuthProvider {
    /// Create a provider.
    ///
    /// Fails with `InvalidCredentials` if the credentials are not sufficient
    /// to authenticate.
    pub fn new(
        credentials: Credentials,
        token_client: Rc<dyn TokenClient>,
        scope: Scope,
    ) -> Result<AuthProvider> {
        if !credentials.is_valid() {
            return Err(Error::new(
                ErrorKind::InvalidCredentials,
                format!("Credentials are not valid: {}", credentials),
            ));
        }

        Ok(AuthProvider {
            credentials: RefCell::new(credentials),
            scope,
            token_client,
            cache: RefCell::new(None),
            alt: RefCell::new(None),
        })
    }

    /// A copy of the current credentials.
    pub fn credentials(&self) -> Credentials {
        self.credentials.borrow().clone()
    }

    /// Requested token scope.
    #[inline]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Identity endpoint.
    #[inline]
    pub fn auth_url(&self) -> &str {
        self.token_client.auth_url()
    }

    /// Cached authentication data, refreshed if expired.
    pub fn get_auth(&self) -> Result<AuthData> {
        let cached = self.cache.borrow().clone();
        if let Some(data) = cached {
            if !self.is_expired(&data)? {
                return Ok(data);
            }
            debug!("Cached token has expired, requesting a new one");
        }
        self.set_auth()?;
        self.cache
            .borrow()
            .clone()
            .ok_or_else(|| Error::new(ErrorKind::AuthenticationFailed, "No token was cached"))
    }

    /// Request a new token and fill in the credentials from the response.
    pub fn set_auth(&self) -> Result<()> {
        let data = {
            let credentials = self.credentials.borrow();
            self.token_client.get_token(&credentials, self.scope)?
        };
        self.credentials.borrow_mut().fill_from(&data.body);
        *self.cache.borrow_mut() = Some(data);
        Ok(())
    }

    /// Drop the cached token and reset the credentials to the initial state.
    pub fn clear_auth(&self) {
        *self.cache.borrow_mut() = None;
        self.credentials.borrow_mut().reset();
    }

    /// Current token value.
    pub fn get_token(&self) -> Result<String> {
        self.get_auth().map(|data| data.token)
    }

    /// Authenticate and return the credentials with all fields filled in.
    pub fn fill_credentials(&self) -> Result<Credentials> {
        let _ = self.get_auth()?;
        Ok(self.credentials())
    }

    /// Whether the token expires within the threshold.
    pub fn is_expired(&self, auth_data: &AuthData) -> Result<bool> {
        let expiry = parse_expiry(auth_data.body.expires())?;
        let threshold = Duration::seconds(TOKEN_EXPIRY_THRESHOLD);
        Ok(expiry - threshold <= Utc::now().naive_utc())
    }

    /// Find the base URL of a service.
    ///
    /// Uses the cached authentication data if `auth_data` is `None`.
    pub fn base_url(&self, filters: &EndpointFilters, auth_data: Option<&AuthData>) -> Result<String> {
        let owned;
        let data = match auth_data {
            Some(data) => data,
            None => {
                owned = self.get_auth()?;
                &owned
            }
        };

        match data.body {
            AuthBody::V2(ref access) => v2_base_url(&access.service_catalog, filters),
            AuthBody::V3(ref token) => v3_base_url(&token.catalog, filters, self.auth_url()),
        }
    }

    /// Turn a request with a relative URL into an authenticated one.
    ///
    /// If alternate authentication was requested, the selected part is taken
    /// from the alternate request. The alternate setting only affects one
    /// call, even a failed one.
    pub fn auth_request(&self, request: &Request, filters: &EndpointFilters) -> Result<Request> {
        let alt = self.alt.borrow_mut().take();

        let auth_data = self.get_auth()?;
        let base_url = self.base_url(filters, Some(&auth_data))?;
        let mut result = decorate_request(request, &base_url, &auth_data.token)?;

        if let Some(alt) = alt {
            match alt.data {
                Some(ref alt_data) => {
                    let alt_base_url = self.base_url(filters, Some(alt_data))?;
                    let alt_request = decorate_request(request, &alt_base_url, &alt_data.token)?;
                    replace_part(&mut result, &alt_request, alt.part)?;
                }
                None => replace_part(&mut result, request, alt.part)?,
            }
            debug!("Using alternate authentication for request {}", alt.part);
        }

        Ok(result)
    }

    /// Build the given part of the next request from alternate authentication
    /// data, or without authentication if `auth_data` is `None`.
    pub fn set_alt_auth_data(&self, part: RequestPart, auth_data: Option<AuthData>) {
        *self.alt.borrow_mut() = Some(AltAuth {
            part,
            data: auth_data,
        });
    }

    /// Cancel alternate authentication.
    pub fn reset_alt_auth_data(&self) {
        *self.alt.borrow_mut() = None;
    }
}
