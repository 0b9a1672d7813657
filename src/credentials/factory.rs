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

//! Picking a credential provider from configuration.

use super::accounts::{read_accounts_yaml, AccountPool};
use super::dynamic::DynamicCredentialProvider;
use super::preprov::{PreProvisionedCredentialProvider, PreProvisionedParams};
use super::{CredentialProvider, NetworkResources};
use crate::auth::{self, Attribute, Credentials, IdentityVersion};
use crate::config::Config;
use crate::{Error, ErrorKind, Result};

/// Create a credential provider according to configuration.
///
/// Dynamic credentials are used when enabled or when `force_tenant_isolation`
/// is set, otherwise the accounts file is used.
pub fn get_credentials_provider<S: Into<String>>(
    config: &Config,
    name: S,
    network_resources: Option<NetworkResources>,
    force_tenant_isolation: bool,
    identity_version: IdentityVersion,
) -> Result<Box<dyn CredentialProvider>> {
    let name = name.into();
    if config.auth.use_dynamic_credentials || force_tenant_isolation {
        debug!("Using dynamic credentials for {}", name);
        let provider =
            DynamicCredentialProvider::from_config(config, name, network_resources, identity_version)?;
        Ok(Box::new(provider))
    } else if config.auth.test_accounts_file.is_some() {
        debug!("Using pre-provisioned credentials for {}", name);
        let provider = PreProvisionedCredentialProvider::from_config(config, name, identity_version)?;
        Ok(Box::new(provider))
    } else {
        Err(Error::new(
            ErrorKind::InvalidConfig,
            "Either dynamic credentials or an accounts file must be configured",
        ))
    }
}

fn pool_from_config(config: &Config, identity_version: IdentityVersion) -> Result<AccountPool> {
    let params = PreProvisionedParams::from_config(config, "", identity_version)?;
    let accounts = read_accounts_yaml(&params.accounts_file)?;
    AccountPool::new(
        accounts,
        &params.admin_role,
        params.operator_role.as_deref(),
        params.reseller_admin_role.as_deref(),
    )
}

/// Whether admin credentials can be provided.
pub fn is_admin_available(config: &Config, identity_version: IdentityVersion) -> Result<bool> {
    if config.auth.use_dynamic_credentials {
        Ok(true)
    } else if config.auth.test_accounts_file.is_some() {
        let pool = pool_from_config(config, identity_version)?;
        Ok(pool.has_role(&config.identity.admin_role))
    } else {
        match get_configured_admin_credentials(config, false, identity_version) {
            Ok(_) => Ok(true),
            Err(ref e) if e.kind() == ErrorKind::InvalidConfig => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Whether credentials of a second user can be provided.
pub fn is_alt_available(config: &Config, identity_version: IdentityVersion) -> Result<bool> {
    if config.auth.use_dynamic_credentials {
        Ok(true)
    } else if config.auth.test_accounts_file.is_some() {
        let pool = pool_from_config(config, identity_version)?;
        Ok(pool.len() > 1)
    } else {
        Ok(false)
    }
}

/// Admin credentials from the `auth` section.
pub fn get_configured_admin_credentials(
    config: &Config,
    fill_in: bool,
    identity_version: IdentityVersion,
) -> Result<Credentials> {
    let auth = &config.auth;
    let required = |value: &Option<String>, name: &str| {
        value.clone().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("auth.{} is required for admin credentials", name),
            )
        })
    };

    let mut attributes = vec![
        (Attribute::Username, required(&auth.admin_username, "admin_username")?),
        (Attribute::Password, required(&auth.admin_password, "admin_password")?),
    ];
    if let Some(ref project) = auth.admin_project_name {
        attributes.push((Attribute::ProjectName, project.clone()));
    }
    if identity_version == IdentityVersion::V3 {
        if let Some(ref domain) = auth.admin_domain_name {
            attributes.push((Attribute::DomainName, domain.clone()));
        }
        if let Some(ref system) = auth.admin_system {
            attributes.push((Attribute::System, system.clone()));
        }
    }

    let credentials = get_credentials(
        config,
        fill_in,
        identity_version,
        attributes.into_iter().map(|(k, v)| (k.as_str(), v)),
    )?;
    if credentials.is_valid() {
        Ok(credentials)
    } else {
        Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("The admin credentials are incomplete: {}", credentials),
        ))
    }
}

/// Build credentials with defaults from configuration.
///
/// With Identity API v3 the default credentials domain is used when no
/// domain attribute is given.
pub fn get_credentials<I, K, V>(
    config: &Config,
    fill_in: bool,
    identity_version: IdentityVersion,
    attributes: I,
) -> Result<Credentials>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut attributes: Vec<(String, String)> = attributes
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.into()))
        .collect();
    if identity_version == IdentityVersion::V3 {
        let has_domain = attributes.iter().any(|(k, _)| {
            k.parse::<Attribute>()
                .map(|a| a.is_domain())
                .unwrap_or(false)
        });
        if !has_domain {
            attributes.push((
                Attribute::DomainName.as_str().to_string(),
                config.auth.default_credentials_domain_name.clone(),
            ));
        }
    }

    let auth_url = if fill_in {
        Some(config.identity.uri_for(identity_version)?)
    } else {
        None
    };
    auth::get_credentials(auth_url, fill_in, identity_version, attributes, &config.http)
}

#[cfg(test)]
pub mod test {
    use std::io::Write;

    use super::{
        get_configured_admin_credentials, get_credentials, get_credentials_provider,
        is_admin_available, is_alt_available,
    };
    use crate::auth::IdentityVersion;
    use crate::config::Config;
    use crate::credentials::accounts::test::ACCOUNTS;
    use crate::ErrorKind;

    fn admin_config() -> Config {
        Config::from_yaml(
            r#"
auth:
  admin_username: admin
  admin_password: secret
  admin_project_name: admin
identity:
  uri: http://keystone/v2.0
  uri_v3: http://keystone/v3
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_admin_credentials() {
        let config = admin_config();
        let v3 = get_configured_admin_credentials(&config, false, IdentityVersion::V3).unwrap();
        assert_eq!(v3.username(), Some("admin"));
        assert_eq!(v3.project_name(), Some("admin"));
        assert_eq!(v3.domain_name(), Some("Default"));
        assert_eq!(v3.project_domain_name(), Some("Default"));

        let v2 = get_configured_admin_credentials(&config, false, IdentityVersion::V2).unwrap();
        assert_eq!(v2.tenant_name(), Some("admin"));
        assert_eq!(v2.domain_name(), None);
    }

    #[test]
    fn test_admin_credentials_missing() {
        let config = Config::from_yaml(
            "auth:\n  use_dynamic_credentials: false\n  admin_username: admin\n",
        )
        .unwrap();
        let err = get_configured_admin_credentials(&config, false, IdentityVersion::V3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(!is_admin_available(&config, IdentityVersion::V3).unwrap());
        assert!(is_admin_available(&admin_config(), IdentityVersion::V3).unwrap());
    }

    #[test]
    fn test_get_credentials_explicit_domain() {
        let config = admin_config();
        let creds = get_credentials(
            &config,
            false,
            IdentityVersion::V3,
            vec![
                ("username", "u"),
                ("password", "p"),
                ("user_domain_name", "users"),
            ],
        )
        .unwrap();
        assert_eq!(creds.user_domain_name(), Some("users"));
        assert_eq!(creds.domain_name(), None);
    }

    #[test]
    fn test_accounts_file_availability() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ACCOUNTS.as_bytes()).unwrap();
        let mut config = Config::default();
        config.auth.use_dynamic_credentials = false;
        config.auth.test_accounts_file = Some(file.path().to_path_buf());
        assert!(is_admin_available(&config, IdentityVersion::V3).unwrap());
        assert!(is_alt_available(&config, IdentityVersion::V3).unwrap());

        // The admin account type cannot be mapped to a role
        config.identity.admin_role = String::new();
        let err = is_admin_available(&config, IdentityVersion::V3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_provider_selection() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ACCOUNTS.as_bytes()).unwrap();
        let lock_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.auth.use_dynamic_credentials = false;
        config.lock_path = lock_dir.path().to_path_buf();

        let err = get_credentials_provider(&config, "test", None, false, IdentityVersion::V3)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(!is_alt_available(&config, IdentityVersion::V3).unwrap());

        config.auth.test_accounts_file = Some(file.path().to_path_buf());
        let provider =
            get_credentials_provider(&config, "test", None, false, IdentityVersion::V3).unwrap();
        assert_eq!(provider.name(), "test");
        assert!(provider.is_multi_user());
        assert!(provider.is_role_available("reader"));

        // Dynamic credentials need admin credentials
        let err = get_credentials_provider(&config, "test", None, true, IdentityVersion::V3)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
