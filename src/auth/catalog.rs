// Copyright 2021 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Endpoint lookup in a service catalog.

use super::protocol::{V2CatalogRecord, V3CatalogRecord};
use crate::utils::url;
use crate::{Error, ErrorKind, Result};

/// Filters used to find a service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointFilters {
    /// Service type, e.g. `compute`. Required for any lookup.
    pub service: Option<String>,
    /// Region name.
    pub region: Option<String>,
    /// Service name in the catalog.
    pub name: Option<String>,
    /// Endpoint type (`publicURL`) or interface (`public`).
    pub endpoint_type: Option<String>,
    /// API version to put into the endpoint path, e.g. `v3`.
    pub api_version: Option<String>,
    /// Drop the path of the endpoint.
    pub skip_path: bool,
}

impl EndpointFilters {
    /// Filters for the given service type.
    pub fn new<S: Into<String>>(service: S) -> EndpointFilters {
        EndpointFilters {
            service: Some(service.into()),
            ..EndpointFilters::default()
        }
    }

    /// Add a region.
    pub fn with_region<S: Into<String>>(mut self, region: Option<S>) -> EndpointFilters {
        self.region = region.map(Into::into);
        self
    }

    /// Add an endpoint type.
    pub fn with_endpoint_type<S: Into<String>>(mut self, endpoint_type: Option<S>) -> EndpointFilters {
        self.endpoint_type = endpoint_type.map(Into::into);
        self
    }

    /// Add an API version.
    pub fn with_api_version<S: Into<String>>(mut self, api_version: Option<S>) -> EndpointFilters {
        self.api_version = api_version.map(Into::into);
        self
    }

    fn required_service(&self) -> Result<&str> {
        self.service.as_deref().ok_or_else(|| {
            Error::new(
                ErrorKind::EndpointNotFound,
                "Mandatory filter 'service' is missing",
            )
        })
    }
}

/// Apply `api_version` and `skip_path` to a base URL.
pub fn apply_url_filters(base_url: &str, filters: &EndpointFilters) -> Result<String> {
    let versioned = match filters.api_version {
        Some(ref version) => url::replace_version(base_url, version)?,
        None => base_url.to_string(),
    };
    if filters.skip_path {
        url::strip_path(&versioned)
    } else {
        Ok(versioned)
    }
}

/// Find a base URL in a V2 service catalog.
///
/// If no endpoint matches the region, the first endpoint of the service is
/// used.
pub fn v2_base_url(catalog: &[V2CatalogRecord], filters: &EndpointFilters) -> Result<String> {
    let service = filters.required_service()?;
    let endpoint_type = filters.endpoint_type.as_deref().unwrap_or("publicURL");

    let record = catalog
        .iter()
        .filter(|r| r.service_type == service)
        .find(|r| match filters.name {
            Some(ref name) => r.name.as_ref() == Some(name),
            None => true,
        })
        .ok_or_else(|| Error::new_endpoint_not_found(service))?;

    let matching = filters.region.as_ref().and_then(|region| {
        record
            .endpoints
            .iter()
            .rev()
            .find(|e| e.region.as_ref() == Some(region))
    });
    let endpoint = matching
        .or_else(|| record.endpoints.first())
        .ok_or_else(|| Error::new_endpoint_not_found(service))?;

    let base_url = endpoint
        .urls
        .get(endpoint_type)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::new_endpoint_not_found(service))?;
    debug!("Found {} endpoint {} for {}", endpoint_type, base_url, service);
    apply_url_filters(base_url, filters)
}

/// Find a base URL in a V3 service catalog.
///
/// An empty catalog is only acceptable for the identity service, in which
/// case `auth_url` is used.
pub fn v3_base_url(
    catalog: &[V3CatalogRecord],
    filters: &EndpointFilters,
    auth_url: &str,
) -> Result<String> {
    let service = filters.required_service()?;
    let interface = filters.endpoint_type.as_deref().unwrap_or("public");
    let interface = interface.strip_suffix("URL").unwrap_or(interface);

    let mut records = catalog.iter().filter(|r| r.service_type == service).peekable();
    if records.peek().is_none() {
        if catalog.is_empty() && service == "identity" {
            warn!(
                "Got an empty catalog, falling back to configured URL for {}: {}",
                service, auth_url
            );
            return apply_url_filters(auth_url, filters);
        }
        return Err(Error::new_endpoint_not_found(service));
    }

    let record = match filters.name {
        Some(ref name) => records.find(|r| r.name.as_ref() == Some(name)),
        None => records.next(),
    }
    .ok_or_else(|| Error::new_endpoint_not_found(service))?;

    let by_interface: Vec<_> = record
        .endpoints
        .iter()
        .filter(|e| e.interface == interface)
        .collect();
    let endpoint = filters
        .region
        .as_ref()
        .and_then(|region| {
            by_interface
                .iter()
                .find(|e| e.region.as_ref() == Some(region))
                .copied()
        })
        .or_else(|| by_interface.first().copied())
        .or_else(|| record.endpoints.first())
        .ok_or_else(|| Error::new_endpoint_not_found(service))?;

    debug!("Found {} endpoint {} for {}", interface, endpoint.url, service);
    apply_url_filters(&endpoint.url, filters)
}

#[cfg(test)]
pub mod test {
    use super::{apply_url_filters, v2_base_url, v3_base_url, EndpointFilters};
    use crate::auth::protocol::test::{v2_access, v3_token};
    use crate::ErrorKind;

    const AUTH_URL: &str = "http://auth/identity/v3";

    #[test]
    fn test_service_required() {
        let filters = EndpointFilters::default();
        let err = v2_base_url(&v2_access().service_catalog, &filters).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
        let err = v3_base_url(&v3_token().catalog, &filters, AUTH_URL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
    }

    #[test]
    fn test_v2_base_url() {
        let catalog = v2_access().service_catalog;

        let url = v2_base_url(&catalog, &EndpointFilters::new("compute")).unwrap();
        assert_eq!(url, "http://one/compute/v2.1");

        let filters = EndpointFilters::new("compute").with_region(Some("RegionTwo"));
        assert_eq!(v2_base_url(&catalog, &filters).unwrap(), "http://two/compute/v2.1");

        let filters = EndpointFilters::new("compute").with_region(Some("RegionNone"));
        assert_eq!(v2_base_url(&catalog, &filters).unwrap(), "http://one/compute/v2.1");

        let filters = EndpointFilters::new("identity").with_endpoint_type(Some("adminURL"));
        assert_eq!(
            v2_base_url(&catalog, &filters).unwrap(),
            "http://one/identity/v2.0/admin"
        );
    }

    #[test]
    fn test_v2_base_url_not_found() {
        let catalog = v2_access().service_catalog;
        let err = v2_base_url(&catalog, &EndpointFilters::new("volume")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);

        let mut filters = EndpointFilters::new("compute");
        filters.name = Some("not-nova".to_string());
        let err = v2_base_url(&catalog, &filters).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);

        let filters = EndpointFilters::new("compute").with_endpoint_type(Some("internalURL"));
        let err = v2_base_url(&catalog, &filters).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
    }

    #[test]
    fn test_v3_base_url() {
        let catalog = v3_token().catalog;

        let url = v3_base_url(&catalog, &EndpointFilters::new("network"), AUTH_URL).unwrap();
        assert_eq!(url, "http://one:9696");

        let filters = EndpointFilters::new("network").with_endpoint_type(Some("internalURL"));
        assert_eq!(v3_base_url(&catalog, &filters, AUTH_URL).unwrap(), "http://int:9696");

        let filters = EndpointFilters::new("network").with_region(Some("RegionTwo"));
        assert_eq!(v3_base_url(&catalog, &filters, AUTH_URL).unwrap(), "http://two:9696");

        let filters = EndpointFilters::new("network").with_region(Some("RegionNone"));
        assert_eq!(v3_base_url(&catalog, &filters, AUTH_URL).unwrap(), "http://one:9696");
    }

    #[test]
    fn test_v3_base_url_name() {
        let catalog = v3_token().catalog;
        let mut filters = EndpointFilters::new("network");
        filters.name = Some("neutron".to_string());
        assert_eq!(v3_base_url(&catalog, &filters, AUTH_URL).unwrap(), "http://one:9696");

        filters.name = Some("other".to_string());
        let err = v3_base_url(&catalog, &filters, AUTH_URL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
    }

    #[test]
    fn test_v3_empty_catalog() {
        let url = v3_base_url(&[], &EndpointFilters::new("identity"), AUTH_URL).unwrap();
        assert_eq!(url, AUTH_URL);

        let err = v3_base_url(&[], &EndpointFilters::new("compute"), AUTH_URL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);

        // Non-empty catalog without identity is not acceptable.
        let catalog = v3_token().catalog;
        let err = v3_base_url(&catalog, &EndpointFilters::new("identity"), AUTH_URL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
    }

    #[test]
    fn test_apply_url_filters() {
        let filters = EndpointFilters::new("compute").with_api_version(Some("v2"));
        assert_eq!(
            apply_url_filters("http://one/compute/v2.1", &filters).unwrap(),
            "http://one/compute/v2"
        );

        let mut filters = EndpointFilters::new("compute");
        filters.skip_path = true;
        assert_eq!(
            apply_url_filters("http://one:8774/compute/v2.1", &filters).unwrap(),
            "http://one:8774/"
        );

        let filters = EndpointFilters::new("compute");
        assert_eq!(
            apply_url_filters("http://one/compute/v2.1", &filters).unwrap(),
            "http://one/compute/v2.1"
        );
    }
}
