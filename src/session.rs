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

//! Synchronous HTTP plumbing.
//!
//! Requests are executed by an asynchronous `reqwest` client on a private
//! single-threaded runtime, so that the rest of the crate can stay blocking.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Certificate, Client, Method, StatusCode};
use serde_json::Value;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};

use super::{Error, ErrorKind, Result};

/// Options of the HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
    /// Skip TLS certificate verification.
    pub disable_ssl_certificate_validation: bool,
    /// Additional CA bundle in PEM format.
    pub ca_certificates_file: Option<PathBuf>,
}

/// An HTTP request.
///
/// Requests are plain values so that they can be compared and partially
/// replaced before sending.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL or a path relative to a service endpoint.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// JSON body.
    pub body: Option<Value>,
}

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// JSON body, `Null` if empty.
    pub body: Value,
}

/// A blocking HTTP client.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    runtime: Runtime,
}

impl Request {
    /// Create a request without headers and body.
    pub fn new<S: Into<String>>(method: Method, url: S) -> Request {
        Request {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Add a header.
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Request {
        let _ = self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a JSON body.
    pub fn with_body(mut self, body: Value) -> Request {
        self.body = Some(body);
        self
    }
}

impl HttpClient {
    /// Create a new client.
    pub fn new(options: &HttpOptions) -> Result<HttpClient> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        if options.disable_ssl_certificate_validation {
            warn!("TLS certificate validation is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ref path) = options.ca_certificates_file {
            let pem = fs::read(path).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Cannot read CA bundle {}: {}", path.display(), e),
                )
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Invalid CA bundle {}: {}", path.display(), e),
                )
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build()?;
        let runtime = RuntimeBuilder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::new(
                    ErrorKind::ProtocolError,
                    format!("Could not create a runtime: {}", e),
                )
            })?;
        Ok(HttpClient { client, runtime })
    }

    /// Send a request and wait for the response.
    ///
    /// Unsuccessful statuses are converted into errors.
    pub fn send(&self, request: &Request) -> Result<Response> {
        trace!("Sending {} request to {}", request.method, request.url);
        self.runtime.block_on(self.send_async(request))
    }

    async fn send_async(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            debug!(
                "{} request to {} failed with {}: {}",
                request.method, request.url, status, message
            );
            return Err(Error::from_status(status, message));
        }

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                error!(
                    "Invalid JSON received from {} {}: {}",
                    request.method, request.url, e
                );
                Error::new(
                    ErrorKind::InvalidResponse,
                    format!("Invalid JSON from {}: {}", request.url, e),
                )
            })?
        };

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub mod test {
    use reqwest::Method;
    use serde_json::json;

    use super::{HttpClient, HttpOptions, Request};
    use crate::ErrorKind;

    #[test]
    fn test_request_builder() {
        let req = Request::new(Method::POST, "servers")
            .with_header("X-Auth-Token", "abcd")
            .with_body(json!({"a": 1}));
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "servers");
        assert_eq!(req.headers.get("X-Auth-Token").unwrap(), "abcd");
        assert_eq!(req.body, Some(json!({"a": 1})));
    }

    #[test]
    fn test_http_client_new() {
        let _ = HttpClient::new(&HttpOptions::default()).unwrap();
    }

    #[test]
    fn test_http_client_missing_ca() {
        let options = HttpOptions {
            ca_certificates_file: Some("/nonexistent/ca.pem".into()),
            ..HttpOptions::default()
        };
        let err = HttpClient::new(&options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
