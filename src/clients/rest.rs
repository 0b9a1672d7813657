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

//! Generic REST client bound to one service.

use std::rc::Rc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::auth::{AuthProvider, EndpointFilters};
use crate::session::{HttpClient, Request};
use crate::utils::url;
use crate::Result;

/// A REST client for one service, authenticated by an auth provider.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Rc<HttpClient>,
    auth: Rc<AuthProvider>,
    filters: EndpointFilters,
}

impl RestClient {
    /// Create a client.
    pub fn new(http: Rc<HttpClient>, auth: Rc<AuthProvider>, filters: EndpointFilters) -> RestClient {
        RestClient {
            http,
            auth,
            filters,
        }
    }

    /// Auth provider of this client.
    #[inline]
    pub fn auth_provider(&self) -> &Rc<AuthProvider> {
        &self.auth
    }

    /// Endpoint filters of this client.
    #[inline]
    pub fn filters(&self) -> &EndpointFilters {
        &self.filters
    }

    /// Build an authenticated request for a path relative to the service.
    pub fn prepare(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Request> {
        let mut request = Request::new(method, path);
        request.body = body;
        let mut request = self.auth.auth_request(&request, &self.filters)?;
        if !query.is_empty() {
            let mut parsed = url::parse(&request.url)?;
            let _ = parsed.query_pairs_mut().extend_pairs(query);
            request.url = parsed.to_string();
        }
        Ok(request)
    }

    /// Issue a request and return the JSON body.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value> {
        let request = self.prepare(method, path, query, body)?;
        self.http.send(&request).map(|resp| resp.body)
    }

    /// GET and parse the result.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let body = self.request(Method::GET, path, query, None)?;
        Ok(serde_json::from_value(body)?)
    }

    /// POST a body and parse the result.
    pub fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: B) -> Result<T> {
        let body = self.request(Method::POST, path, &[], Some(serde_json::to_value(body)?))?;
        Ok(serde_json::from_value(body)?)
    }

    /// PUT without a body, ignoring the result.
    pub fn put_empty(&self, path: &str) -> Result<()> {
        let _ = self.request(Method::PUT, path, &[], None)?;
        Ok(())
    }

    /// PUT a body, ignoring the result.
    pub fn put<B: Serialize>(&self, path: &str, body: B) -> Result<()> {
        let _ = self.request(Method::PUT, path, &[], Some(serde_json::to_value(body)?))?;
        Ok(())
    }

    /// DELETE a resource.
    pub fn delete(&self, path: &str) -> Result<()> {
        let _ = self.request(Method::DELETE, path, &[], None)?;
        Ok(())
    }
}
