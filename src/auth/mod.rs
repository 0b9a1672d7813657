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

//! Credentials and authentication.
//!
//! A [Credentials](struct.Credentials.html) object is a validated set of
//! identity attributes. An [AuthProvider](struct.AuthProvider.html) turns it
//! into a cached token and service endpoints:
//!
//! ```rust,no_run
//! use std::rc::Rc;
//!
//! use tempest::auth::{AuthProvider, Credentials, IdentityVersion, KeystoneTokenClient, Scope};
//! use tempest::auth::EndpointFilters;
//! use tempest::session::{HttpClient, HttpOptions};
//!
//! let creds = Credentials::new(IdentityVersion::V3, vec![
//!     ("username", "demo"),
//!     ("password", "secret"),
//!     ("project_name", "demo"),
//!     ("domain_name", "Default"),
//! ]).expect("Invalid credentials");
//! let http = Rc::new(HttpClient::new(&HttpOptions::default()).unwrap());
//! let client = KeystoneTokenClient::new(http, "https://cloud/identity/v3").unwrap();
//! let provider = AuthProvider::new(creds, Rc::new(client), Scope::Project).unwrap();
//! let url = provider.base_url(&EndpointFilters::new("compute"), None).unwrap();
//! ```
//!
//! # Limitations
//!
//! * Only password authentication is supported.

use std::rc::Rc;

mod catalog;
mod credentials;
mod protocol;
mod provider;
mod token;

pub use self::catalog::{apply_url_filters, EndpointFilters};
pub use self::credentials::{Attribute, Credentials, IdentityVersion};
pub use self::protocol::{
    Access, AuthBody, IdAndName, TokenInfo, V2CatalogRecord, V2Endpoint, V2Token,
    V3CatalogRecord, V3Endpoint, V3Project, V3User,
};
pub use self::provider::{parse_expiry, AuthProvider, RequestPart, TOKEN_EXPIRY_THRESHOLD};
pub use self::token::{AuthData, KeystoneTokenClient, Scope, TokenClient};

use crate::session::{HttpClient, HttpOptions};
use crate::{Error, ErrorKind, Result};

/// Build credentials and optionally fill in missing attributes.
///
/// With `fill_in` a real token request is made against `auth_url`. Only
/// attributes that were not passed explicitly are populated from the
/// response.
pub fn get_credentials<I, K, V>(
    auth_url: Option<&str>,
    fill_in: bool,
    identity_version: IdentityVersion,
    attributes: I,
    http: &HttpOptions,
) -> Result<Credentials>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let credentials = Credentials::new(identity_version, attributes)?;
    if !fill_in {
        return Ok(credentials);
    }

    let auth_url = auth_url.ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfig,
            "Identity endpoint is required to fill in credentials",
        )
    })?;
    let http = Rc::new(HttpClient::new(http)?);
    let client = KeystoneTokenClient::new(http, auth_url)?;
    fill_in_credentials(credentials, Rc::new(client))
}

/// Authenticate with the given token client and fill in missing attributes.
pub fn fill_in_credentials(
    credentials: Credentials,
    token_client: Rc<dyn TokenClient>,
) -> Result<Credentials> {
    let scope = Scope::for_credentials(&credentials);
    let provider = AuthProvider::new(credentials, token_client, scope)?;
    provider.fill_credentials()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for tests of other modules.

    pub use super::token::test::FakeTokenClient;
    use super::{AuthProvider, Credentials, IdentityVersion, Scope};

    /// A provider for V3 project credentials backed by a fake token client.
    pub fn v3_provider() -> AuthProvider {
        let creds = Credentials::new(
            IdentityVersion::V3,
            vec![
                ("username", "user"),
                ("password", "pass"),
                ("project_name", "project"),
                ("domain_name", "Default"),
            ],
        )
        .unwrap();
        AuthProvider::new(creds, FakeTokenClient::new(), Scope::Project).unwrap()
    }
}

#[cfg(test)]
pub mod test {
    use super::token::test::FakeTokenClient;
    use super::{fill_in_credentials, get_credentials, Credentials, IdentityVersion};
    use crate::session::HttpOptions;
    use crate::ErrorKind;

    #[test]
    fn test_get_credentials_no_fill_in() {
        let creds = get_credentials(
            None,
            false,
            IdentityVersion::V3,
            vec![("username", "u"), ("password", "p")],
            &HttpOptions::default(),
        )
        .unwrap();
        assert_eq!(creds.username(), Some("u"));
        assert_eq!(creds.user_id(), None);
    }

    #[test]
    fn test_get_credentials_fill_in_requires_url() {
        let err = get_credentials(
            None,
            true,
            IdentityVersion::V3,
            vec![("user_id", "u"), ("password", "p")],
            &HttpOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_fill_in_preserves_explicit() {
        let original = Credentials::new(
            IdentityVersion::V3,
            vec![
                ("username", "mine"),
                ("password", "p"),
                ("project_name", "my-project"),
                ("user_domain_name", "MyDomain"),
                ("project_domain_name", "MyDomain"),
            ],
        )
        .unwrap();
        let filled = fill_in_credentials(original.clone(), FakeTokenClient::new()).unwrap();
        for attr in original.initial_attributes() {
            assert_eq!(filled.get(attr), original.get(attr), "{}", attr);
        }
        assert_eq!(filled.user_id(), Some("user-id"));
        assert_eq!(filled.project_domain_id(), Some("default"));
    }
}
