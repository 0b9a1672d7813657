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

//! JSON structures and protocol bits for the Identity V2 and V3 token APIs.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdAndName {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct V2Token {
    pub id: String,
    pub expires: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<IdAndName>,
}

/// An endpoint of the V2 catalog.
///
/// URLs are keyed by the endpoint type, e.g. `publicURL`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct V2Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(flatten)]
    pub urls: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct V2CatalogRecord {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<V2Endpoint>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Access {
    pub token: V2Token,
    pub user: IdAndName,
    #[serde(rename = "serviceCatalog", default)]
    pub service_catalog: Vec<V2CatalogRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AccessRoot {
    pub access: Access,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct V3User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: IdAndName,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct V3Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: IdAndName,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct V3Endpoint {
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct V3CatalogRecord {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<V3Endpoint>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TokenInfo {
    pub expires_at: String,
    pub user: V3User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<V3Project>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<IdAndName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    #[serde(default)]
    pub roles: Vec<IdAndName>,
    #[serde(default)]
    pub catalog: Vec<V3CatalogRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenRoot {
    pub token: TokenInfo,
}

/// Body of an authentication response.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthBody {
    /// Identity API v2.0 access information.
    V2(Access),
    /// Identity API v3 token information.
    V3(TokenInfo),
}

impl AuthBody {
    /// Raw token expiration time.
    pub fn expires(&self) -> &str {
        match self {
            AuthBody::V2(access) => &access.token.expires,
            AuthBody::V3(token) => &token.expires_at,
        }
    }

    /// Whether the service catalog is empty.
    pub fn is_catalog_empty(&self) -> bool {
        match self {
            AuthBody::V2(access) => access.service_catalog.is_empty(),
            AuthBody::V3(token) => token.catalog.is_empty(),
        }
    }
}
