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

//! Registry of service clients and a set of clients for one credential set.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use super::compute::ComputeClient;
use super::identity::IdentityClient;
use super::network::NetworkClient;
use super::rest::RestClient;
use super::{ClientsFactory, NetworksApi};
use crate::auth::{AuthProvider, Credentials, EndpointFilters, IdentityVersion, KeystoneTokenClient, Scope};
use crate::config::Config;
use crate::session::HttpClient;
use crate::{Error, ErrorKind, Result};

/// Name of the built-in identity client.
pub const IDENTITY: &str = "identity";
/// Name of the built-in network client.
pub const NETWORK: &str = "network";
/// Name of the built-in compute client.
pub const COMPUTE: &str = "compute";

/// Parameters of a named service client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceClientParams {
    /// Service type in the catalog.
    pub service: String,
    /// Endpoint type or interface.
    pub endpoint_type: Option<String>,
    /// Region name.
    pub region: Option<String>,
    /// API version to put into the endpoint.
    pub api_version: Option<String>,
}

impl ServiceClientParams {
    /// Parameters for the given service type.
    pub fn new<S: Into<String>>(service: S) -> ServiceClientParams {
        ServiceClientParams {
            service: service.into(),
            ..ServiceClientParams::default()
        }
    }

    /// Add an endpoint type.
    pub fn with_endpoint_type<S: Into<String>>(mut self, value: Option<S>) -> ServiceClientParams {
        self.endpoint_type = value.map(Into::into);
        self
    }

    /// Add a region.
    pub fn with_region<S: Into<String>>(mut self, value: Option<S>) -> ServiceClientParams {
        self.region = value.map(Into::into);
        self
    }

    /// Add an API version.
    pub fn with_api_version<S: Into<String>>(mut self, value: Option<S>) -> ServiceClientParams {
        self.api_version = value.map(Into::into);
        self
    }

    /// Endpoint filters matching these parameters.
    pub fn filters(&self) -> EndpointFilters {
        EndpointFilters::new(self.service.clone())
            .with_endpoint_type(self.endpoint_type.clone())
            .with_region(self.region.clone())
            .with_api_version(self.api_version.clone())
    }
}

/// Named service client parameters.
///
/// The registry is constructed explicitly and shared by reference, there is
/// no global instance.
#[derive(Debug, Clone, Default)]
pub struct ClientsRegistry {
    clients: BTreeMap<String, ServiceClientParams>,
}

impl ClientsRegistry {
    /// An empty registry.
    pub fn new() -> ClientsRegistry {
        ClientsRegistry::default()
    }

    /// A registry with the built-in clients and the ones from configuration.
    pub fn from_config(config: &Config, identity_version: IdentityVersion) -> Result<ClientsRegistry> {
        let mut registry = ClientsRegistry::new();

        let (identity_endpoint, identity_api) = match identity_version {
            IdentityVersion::V2 => (&config.identity.v2_admin_endpoint_type, "v2.0"),
            IdentityVersion::V3 => (&config.identity.v3_endpoint_type, "v3"),
        };
        registry.register(
            IDENTITY,
            ServiceClientParams::new("identity")
                .with_endpoint_type(Some(identity_endpoint.clone()))
                .with_region(config.identity.region.clone())
                .with_api_version(Some(identity_api)),
        )?;
        registry.register(
            NETWORK,
            ServiceClientParams::new("network")
                .with_endpoint_type(config.network.endpoint_type.clone())
                .with_region(config.network.region.clone().or_else(|| config.identity.region.clone())),
        )?;
        registry.register(
            COMPUTE,
            ServiceClientParams::new("compute")
                .with_endpoint_type(config.compute.endpoint_type.clone())
                .with_region(config.compute.region.clone().or_else(|| config.identity.region.clone())),
        )?;

        for (name, client) in &config.service_clients {
            registry.register(
                name.clone(),
                ServiceClientParams::new(client.service.clone())
                    .with_endpoint_type(client.endpoint_type.clone())
                    .with_region(client.region.clone())
                    .with_api_version(client.api_version.clone()),
            )?;
        }

        Ok(registry)
    }

    /// Register a client under a unique name.
    pub fn register<S: Into<String>>(&mut self, name: S, params: ServiceClientParams) -> Result<()> {
        let name = name.into();
        if self.clients.contains_key(&name) {
            return Err(Error::new(
                ErrorKind::Conflict,
                format!("Service client {} is already registered", name),
            ));
        }
        debug!("Registering service client {} with {:?}", name, params);
        let _ = self.clients.insert(name, params);
        Ok(())
    }

    /// Parameters of a registered client.
    pub fn get(&self, name: &str) -> Option<&ServiceClientParams> {
        self.clients.get(name)
    }

    /// Names of all registered clients.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    fn filters(&self, name: &str) -> Result<EndpointFilters> {
        self.get(name).map(ServiceClientParams::filters).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Service client {} is not registered", name),
            )
        })
    }
}

/// All service clients for one credential set.
#[derive(Debug, Clone)]
pub struct ServiceClients {
    http: Rc<HttpClient>,
    auth: Rc<AuthProvider>,
    registry: Rc<ClientsRegistry>,
    identity: Rc<IdentityClient>,
    network: Rc<NetworkClient>,
    compute: Rc<ComputeClient>,
    use_neutron: bool,
}

impl ServiceClients {
    /// Authenticate the credentials against `identity_uri` and build clients.
    ///
    /// No request is made until a client is used.
    pub fn new(
        credentials: Credentials,
        identity_uri: &str,
        http: Rc<HttpClient>,
        registry: Rc<ClientsRegistry>,
        config: &Config,
    ) -> Result<ServiceClients> {
        let version = credentials.identity_version();
        let scope = Scope::for_credentials(&credentials);
        let token_client = KeystoneTokenClient::new(http.clone(), identity_uri)?;
        let auth = Rc::new(AuthProvider::new(credentials, Rc::new(token_client), scope)?);

        let wait_timeout = Duration::from_secs(config.validation.build_timeout);
        let delay = Duration::from_secs(config.validation.build_interval);
        let rest = |name: &str| -> Result<RestClient> {
            Ok(RestClient::new(http.clone(), auth.clone(), registry.filters(name)?))
        };

        let identity = Rc::new(IdentityClient::new(rest(IDENTITY)?, version));
        let network = Rc::new(NetworkClient::new(rest(NETWORK)?, wait_timeout, delay));
        let compute = Rc::new(ComputeClient::new(rest(COMPUTE)?, wait_timeout, delay));

        Ok(ServiceClients {
            http,
            auth,
            registry,
            identity,
            network,
            compute,
            use_neutron: config.neutron_available(),
        })
    }

    /// Auth provider shared by all clients.
    #[inline]
    pub fn auth_provider(&self) -> &Rc<AuthProvider> {
        &self.auth
    }

    /// Identity administration client.
    #[inline]
    pub fn identity(&self) -> Rc<IdentityClient> {
        self.identity.clone()
    }

    /// Network service client.
    #[inline]
    pub fn network(&self) -> Rc<NetworkClient> {
        self.network.clone()
    }

    /// Compute service client.
    #[inline]
    pub fn compute(&self) -> Rc<ComputeClient> {
        self.compute.clone()
    }

    /// Whether the network service is used for security groups and floating IPs.
    #[inline]
    pub fn use_neutron(&self) -> bool {
        self.use_neutron
    }

    /// A REST client for any registered service.
    pub fn client(&self, name: &str) -> Result<RestClient> {
        Ok(RestClient::new(
            self.http.clone(),
            self.auth.clone(),
            self.registry.filters(name)?,
        ))
    }
}

/// Builds service clients over HTTP.
#[derive(Debug, Clone)]
pub struct ServiceClientsFactory {
    http: Rc<HttpClient>,
    registry: Rc<ClientsRegistry>,
    config: Rc<Config>,
}

impl ServiceClientsFactory {
    /// Create a factory.
    pub fn new(http: Rc<HttpClient>, registry: Rc<ClientsRegistry>, config: Rc<Config>) -> ServiceClientsFactory {
        ServiceClientsFactory {
            http,
            registry,
            config,
        }
    }

    /// Build all clients for the given credentials.
    pub fn service_clients(&self, credentials: &Credentials) -> Result<ServiceClients> {
        let uri = self.config.identity.uri_for(credentials.identity_version())?;
        ServiceClients::new(
            credentials.clone(),
            uri,
            self.http.clone(),
            self.registry.clone(),
            &self.config,
        )
    }
}

impl ClientsFactory for ServiceClientsFactory {
    fn networks_client(&self, credentials: &Credentials) -> Result<Rc<dyn NetworksApi>> {
        Ok(self.service_clients(credentials)?.network())
    }
}
