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

//! Credentials leased from a pool of pre-provisioned accounts.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::path::PathBuf;
use std::rc::Rc;

use super::accounts::{read_accounts_yaml, Account, AccountPool};
use super::{CredentialProvider, CredentialScope, CredentialType, TestResources};
use crate::auth::{Attribute, Credentials, IdentityVersion};
use crate::clients::{ClientsFactory, ClientsRegistry, ServiceClientsFactory};
use crate::config::Config;
use crate::session::HttpClient;
use crate::utils::ExternalLock;
use crate::{Error, ErrorKind, Result};

/// Name of the external lock guarding the accounts directory.
const ACCOUNTS_LOCK: &str = "tempest-test_accounts_io";
/// Directory with lease files inside the lock path.
const ACCOUNTS_DIR: &str = "test_accounts";

/// Parameters of pre-provisioned credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreProvisionedParams {
    /// Name written into lease files.
    pub name: String,
    /// Identity API version to use.
    pub identity_version: IdentityVersion,
    /// Path to the accounts YAML file.
    pub accounts_file: PathBuf,
    /// Directory for locks and lease files.
    pub lock_path: PathBuf,
    /// Admin role name.
    pub admin_role: String,
    /// Role of the `operator` account type.
    pub operator_role: Option<String>,
    /// Role of the `reseller_admin` account type.
    pub reseller_admin_role: Option<String>,
    /// Domain assumed for accounts without domain fields (Identity API v3).
    pub credentials_domain: String,
}

impl PreProvisionedParams {
    /// Parameters from configuration.
    ///
    /// Fails with `InvalidConfig` if no accounts file is configured.
    pub fn from_config<S: Into<String>>(
        config: &Config,
        name: S,
        identity_version: IdentityVersion,
    ) -> Result<PreProvisionedParams> {
        let accounts_file = config.auth.test_accounts_file.clone().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                "auth.test_accounts_file is required for pre-provisioned credentials",
            )
        })?;
        let non_empty = |s: &String| Some(s.clone()).filter(|s| !s.is_empty());
        Ok(PreProvisionedParams {
            name: name.into(),
            identity_version,
            accounts_file,
            lock_path: config.lock_path.clone(),
            admin_role: config.identity.admin_role.clone(),
            operator_role: non_empty(&config.object_storage.operator_role),
            reseller_admin_role: non_empty(&config.object_storage.reseller_admin_role),
            credentials_domain: config.auth.default_credentials_domain_name.clone(),
        })
    }
}

/// A leased account.
#[derive(Debug, Clone)]
struct Lease {
    resources: Rc<TestResources>,
    hash: String,
}

/// Leases accounts from a pool described in a YAML file.
///
/// A lease is a file named after the account hash, created exclusively in a
/// directory shared by all test processes.
#[derive(Debug)]
pub struct PreProvisionedCredentialProvider {
    params: PreProvisionedParams,
    pool: AccountPool,
    accounts_dir: PathBuf,
    clients_factory: Rc<dyn ClientsFactory>,
    cache: RefCell<BTreeMap<(CredentialType, usize), Lease>>,
    generation: Cell<usize>,
}

impl PreProvisionedCredentialProvider {
    /// Create a provider from already loaded accounts.
    pub fn new(
        params: PreProvisionedParams,
        accounts: Vec<Account>,
        clients_factory: Rc<dyn ClientsFactory>,
    ) -> Result<PreProvisionedCredentialProvider> {
        let pool = AccountPool::new(
            accounts,
            &params.admin_role,
            params.operator_role.as_deref(),
            params.reseller_admin_role.as_deref(),
        )?;
        let accounts_dir = params.lock_path.join(ACCOUNTS_DIR);
        Ok(PreProvisionedCredentialProvider {
            params,
            pool,
            accounts_dir,
            clients_factory,
            cache: RefCell::new(BTreeMap::new()),
            generation: Cell::new(0),
        })
    }

    /// Create a provider from configuration, networks are looked up over HTTP.
    pub fn from_config<S: Into<String>>(
        config: &Config,
        name: S,
        identity_version: IdentityVersion,
    ) -> Result<PreProvisionedCredentialProvider> {
        let params = PreProvisionedParams::from_config(config, name, identity_version)?;
        let accounts = read_accounts_yaml(&params.accounts_file)?;
        let http = Rc::new(HttpClient::new(&config.http)?);
        let registry = Rc::new(ClientsRegistry::from_config(config, identity_version)?);
        let factory = ServiceClientsFactory::new(http, registry, Rc::new(config.clone()));
        PreProvisionedCredentialProvider::new(params, accounts, Rc::new(factory))
    }

    /// The pool of accounts.
    #[inline]
    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    /// Whether an account with the admin role exists.
    pub fn admin_available(&self) -> bool {
        self.pool.has_role(&self.params.admin_role)
    }

    /// Lease the first free account among the hashes.
    ///
    /// Fails with `InvalidCredentials` if all are taken.
    pub fn get_free_hash(&self, hashes: &[String]) -> Result<String> {
        let _lock = ExternalLock::acquire(&self.params.lock_path, ACCOUNTS_LOCK)?;
        fs::create_dir_all(&self.accounts_dir)?;

        for hash in hashes {
            let path = self.accounts_dir.join(hash);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(self.params.name.as_bytes())?;
                    debug!("Leased account {} for {}", hash, self.params.name);
                    return Ok(hash.clone());
                }
                Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    trace!("Account {} is already leased", hash);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let holders: Vec<String> = hashes
            .iter()
            .filter_map(|hash| fs::read_to_string(self.accounts_dir.join(hash)).ok())
            .collect();
        Err(Error::new(
            ErrorKind::InvalidCredentials,
            format!(
                "Insufficient number of users provided. {} have allocated all the \
                 credentials for this allocation request",
                holders.join(",")
            ),
        ))
    }

    /// Release a leased account.
    ///
    /// The lease directory is removed once it is empty.
    pub fn remove_hash(&self, hash: &str) -> Result<()> {
        let _lock = ExternalLock::acquire(&self.params.lock_path, ACCOUNTS_LOCK)?;
        let path = self.accounts_dir.join(hash);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Released account {}", hash),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Expected an account lock file {} to remove, but it did not exist", hash);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        if fs::read_dir(&self.accounts_dir)?.next().is_none() {
            trace!("Removing empty directory {}", self.accounts_dir.display());
            fs::remove_dir(&self.accounts_dir)?;
        }
        Ok(())
    }

    /// Hash of the account the credentials came from.
    ///
    /// Only attributes passed on construction and valid for all identity
    /// versions are compared.
    pub fn get_hash(&self, credentials: &Credentials) -> Result<String> {
        let attributes: Vec<Attribute> = credentials
            .initial_attributes()
            .into_iter()
            .filter(|a| Attribute::common().any(|c| c == *a))
            .collect();
        self.pool
            .accounts()
            .find(|(_, account)| {
                attributes.iter().all(|attr| {
                    credentials.get(*attr)
                        == account.attributes.get(attr.as_str()).map(String::as_str)
                })
            })
            .map(|(hash, _)| hash.to_string())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidCredentials,
                    format!("Invalid credentials {}", credentials),
                )
            })
    }

    /// Release the account the credentials came from.
    pub fn remove_credentials(&self, credentials: &Credentials) -> Result<()> {
        let hash = self.get_hash(credentials)?;
        self.cache.borrow_mut().retain(|_, lease| lease.hash != hash);
        self.remove_hash(&hash)
    }

    /// Credentials for an account, adjusted to the identity version.
    pub fn credentials_for(&self, account: &Account) -> Result<Credentials> {
        let mut attributes = account.attributes.clone();
        let is_domain = |name: &str| {
            name.parse::<Attribute>()
                .map(|a| a.is_domain())
                .unwrap_or(false)
        };
        match self.params.identity_version {
            IdentityVersion::V3 => {
                if !attributes.keys().any(|k| is_domain(k)) {
                    warn!(
                        "Using account {:?} for v3 API calls, assuming domain {}",
                        account, self.params.credentials_domain
                    );
                    let _ = attributes.insert(
                        String::from("domain_name"),
                        self.params.credentials_domain.clone(),
                    );
                }
            }
            IdentityVersion::V2 => {
                let before = attributes.len();
                attributes.retain(|k, _| {
                    k.parse::<Attribute>()
                        .map(|a| Attribute::supported(IdentityVersion::V2).contains(&a))
                        .unwrap_or(true)
                });
                if attributes.len() != before {
                    warn!(
                        "Using account {:?} for v2 API calls, dropping domain fields",
                        account
                    );
                }
            }
        }
        Credentials::new(self.params.identity_version, attributes)
    }

    fn wrap_creds_with_network(
        &self,
        hash: &str,
        credentials: Credentials,
    ) -> Result<TestResources> {
        let resources = TestResources::new(credentials);
        let network_name = match self.pool.network_name(hash) {
            Some(name) => name,
            None => return Ok(resources),
        };

        let client = self.clients_factory.networks_client(resources.credentials())?;
        let network = client
            .list_networks()?
            .into_iter()
            .find(|n| n.is_named(network_name));
        if network.is_none() {
            warn!("Network {} of account {} was not found", network_name, hash);
        }
        Ok(resources.with_network(network, None, None))
    }

    fn allocate(
        &self,
        credential_type: CredentialType,
        roles: &[&str],
        scope: Option<CredentialScope>,
        force_new: bool,
    ) -> Result<Rc<TestResources>> {
        let key = (credential_type.clone(), 0);
        let existing = self.cache.borrow().get(&key).cloned();
        if let Some(existing) = existing {
            if !force_new {
                return Ok(existing.resources);
            }
            let generation = self.generation.get() + 1;
            self.generation.set(generation);
            let mut cache = self.cache.borrow_mut();
            let _ = cache.remove(&key);
            let _ = cache.insert((credential_type.clone(), generation), existing);
        }

        let hashes = self.pool.match_hash_list(roles, scope)?;
        let hash = self.get_free_hash(&hashes)?;
        let result = self
            .pool
            .account(&hash)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidCredentials, format!("Unknown account {}", hash))
            })
            .and_then(|account| self.credentials_for(account))
            .and_then(|creds| self.wrap_creds_with_network(&hash, creds));
        let resources = match result {
            Ok(resources) => Rc::new(resources),
            Err(e) => {
                if let Err(release) = self.remove_hash(&hash) {
                    error!("Failed to release account {}: {}", hash, release);
                }
                return Err(e);
            }
        };

        info!(
            "Leased pre-provisioned {} credentials for user {:?}",
            credential_type,
            resources.username()
        );
        let _ = self.cache.borrow_mut().insert(
            key,
            Lease {
                resources: resources.clone(),
                hash,
            },
        );
        Ok(resources)
    }
}

impl CredentialProvider for PreProvisionedCredentialProvider {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn identity_version(&self) -> IdentityVersion {
        self.params.identity_version
    }

    fn get_primary_creds(&self) -> Result<Rc<TestResources>> {
        self.allocate(CredentialType::Primary, &[], None, false)
    }

    fn get_alt_creds(&self) -> Result<Rc<TestResources>> {
        self.allocate(CredentialType::Alt, &[], None, false)
    }

    fn get_admin_creds(&self) -> Result<Rc<TestResources>> {
        let admin_role = self.params.admin_role.clone();
        self.allocate(CredentialType::Admin, &[admin_role.as_str()], None, false)
    }

    fn get_creds_by_roles(&self, roles: &[&str], force_new: bool) -> Result<Rc<TestResources>> {
        let credential_type =
            CredentialType::with_roles(roles.iter().copied(), CredentialScope::Project);
        self.allocate(credential_type, roles, None, force_new)
    }

    fn get_scoped_creds_by_roles(
        &self,
        roles: &[&str],
        scope: CredentialScope,
        force_new: bool,
    ) -> Result<Rc<TestResources>> {
        let credential_type = CredentialType::with_roles(roles.iter().copied(), scope);
        self.allocate(credential_type, roles, Some(scope), force_new)
    }

    fn clear_creds(&self) -> Result<()> {
        let cache = mem::take(&mut *self.cache.borrow_mut());
        let mut failures = Vec::new();
        for ((credential_type, _), lease) in cache {
            debug!("Releasing {} credentials", credential_type);
            if let Err(e) = self.remove_hash(&lease.hash) {
                error!("Failed to release account {}: {}", lease.hash, e);
                failures.push(e);
            }
        }
        Error::from_failures(
            format!("Release of pre-provisioned credentials {} failed", self.params.name),
            failures,
        )
    }

    fn is_multi_user(&self) -> bool {
        self.pool.len() > 1
    }

    fn is_multi_tenant(&self) -> bool {
        self.is_multi_user()
    }

    fn is_role_available(&self, role: &str) -> bool {
        self.pool.has_role(role)
    }
}

#[cfg(test)]
pub mod test {
    use std::fs;
    use std::rc::Rc;

    use super::{PreProvisionedCredentialProvider, PreProvisionedParams, ACCOUNTS_DIR};
    use crate::auth::{Credentials, IdentityVersion};
    use crate::clients::fake::FakeCloud;
    use crate::clients::Network;
    use crate::credentials::accounts::test::accounts;
    use crate::credentials::{CredentialProvider, CredentialScope};
    use crate::ErrorKind;

    fn params(dir: &tempfile::TempDir, version: IdentityVersion) -> PreProvisionedParams {
        PreProvisionedParams {
            name: String::from("test-process"),
            identity_version: version,
            accounts_file: dir.path().join("accounts.yaml"),
            lock_path: dir.path().to_path_buf(),
            admin_role: String::from("admin"),
            operator_role: None,
            reseller_admin_role: None,
            credentials_domain: String::from("Default"),
        }
    }

    fn provider(
        dir: &tempfile::TempDir,
        cloud: &FakeCloud,
        version: IdentityVersion,
    ) -> PreProvisionedCredentialProvider {
        let factory = Rc::new(cloud.clone());
        PreProvisionedCredentialProvider::new(params(dir, version), accounts(), factory).unwrap()
    }

    fn cloud_with_network(name: &str) -> FakeCloud {
        let cloud = FakeCloud::new(IdentityVersion::V3, &[]);
        let _ = cloud.state.borrow_mut().networks.insert(
            String::from("net-1"),
            Network {
                id: String::from("net-1"),
                name: name.to_string(),
                ..Network::default()
            },
        );
        cloud
    }

    #[test]
    fn test_primary_and_alt() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = cloud_with_network("private-2");
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        assert!(provider.is_multi_user());
        assert!(provider.is_multi_tenant());
        assert!(provider.admin_available());

        let primary = provider.get_primary_creds().unwrap();
        let alt = provider.get_alt_creds().unwrap();
        assert_ne!(primary.username(), alt.username());
        assert_ne!(primary.username(), Some("admin"));
        assert_ne!(alt.username(), Some("admin"));
        // Cached
        let again = provider.get_primary_creds().unwrap();
        assert!(Rc::ptr_eq(&primary, &again));

        let leases = fs::read_dir(dir.path().join(ACCOUNTS_DIR)).unwrap().count();
        assert_eq!(leases, 2);

        provider.clear_creds().unwrap();
        assert!(!dir.path().join(ACCOUNTS_DIR).exists());
    }

    #[test]
    fn test_v3_domain_added() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = FakeCloud::new(IdentityVersion::V3, &[]);
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        let admin = provider.get_admin_creds().unwrap();
        assert_eq!(admin.username(), Some("admin"));
        assert_eq!(admin.domain_name(), Some("Default"));
        assert_eq!(admin.user_domain_name(), Some("Default"));
        assert!(admin.is_valid());
        let leased = provider.cache.borrow().values().next().unwrap().hash.clone();
        assert_eq!(provider.get_hash(&admin).unwrap(), leased);
    }

    #[test]
    fn test_v2_domain_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = FakeCloud::new(IdentityVersion::V2, &[]);
        let provider = provider(&dir, &cloud, IdentityVersion::V2);
        let creds = provider
            .get_scoped_creds_by_roles(&["reader"], CredentialScope::Domain, false)
            .unwrap();
        assert_eq!(creds.username(), Some("domain-reader"));
        assert_eq!(creds.domain_name(), None);
        assert_eq!(creds.identity_version(), IdentityVersion::V2);
    }

    #[test]
    fn test_network_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = cloud_with_network("private-2");
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        let creds = provider
            .get_scoped_creds_by_roles(&["reader"], CredentialScope::Project, false)
            .unwrap();
        assert_eq!(creds.username(), Some("user-2"));
        assert_eq!(creds.network().unwrap().id, "net-1");
        assert_eq!(cloud.count("networks_client"), 1);
    }

    #[test]
    fn test_network_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = cloud_with_network("something-else");
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        let creds = provider
            .get_scoped_creds_by_roles(&["reader"], CredentialScope::Project, false)
            .unwrap();
        assert!(creds.network().is_none());
    }

    #[test]
    fn test_network_lookup_failure_releases() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = cloud_with_network("private-2");
        cloud.fail("list_networks", ErrorKind::AccessDenied);
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        let err = provider
            .get_scoped_creds_by_roles(&["reader"], CredentialScope::Project, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert!(!dir.path().join(ACCOUNTS_DIR).exists());
    }

    #[test]
    fn test_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = FakeCloud::new(IdentityVersion::V3, &[]);
        let first = provider(&dir, &cloud, IdentityVersion::V3);
        let mut params = params(&dir, IdentityVersion::V3);
        params.name = String::from("other-process");
        let second =
            PreProvisionedCredentialProvider::new(params, accounts(), Rc::new(cloud.clone())).unwrap();

        let _ = first.get_creds_by_roles(&["reader"], false).unwrap();
        let _ = first.get_creds_by_roles(&["reader"], true).unwrap();
        let err = second.get_creds_by_roles(&["reader"], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
        assert!(err.message().unwrap().contains("test-process"));

        first.clear_creds().unwrap();
        let creds = second.get_creds_by_roles(&["reader"], false).unwrap();
        assert!(creds.username().is_some());
        second.clear_creds().unwrap();
    }

    #[test]
    fn test_get_hash_and_remove_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = FakeCloud::new(IdentityVersion::V3, &[]);
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        let primary = provider.get_primary_creds().unwrap();
        let alt = provider.get_alt_creds().unwrap();

        provider.remove_credentials(primary.credentials()).unwrap();
        assert_eq!(fs::read_dir(dir.path().join(ACCOUNTS_DIR)).unwrap().count(), 1);
        provider.remove_credentials(alt.credentials()).unwrap();
        assert!(!dir.path().join(ACCOUNTS_DIR).exists());

        let unknown = Credentials::new(
            IdentityVersion::V3,
            vec![("username", "nobody"), ("password", "p")],
        )
        .unwrap();
        let err = provider.get_hash(&unknown).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_remove_missing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = FakeCloud::new(IdentityVersion::V3, &[]);
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        provider.remove_hash("0123456789abcdef").unwrap();
    }

    #[test]
    fn test_roles() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = FakeCloud::new(IdentityVersion::V3, &[]);
        let provider = provider(&dir, &cloud, IdentityVersion::V3);
        assert!(provider.is_role_available("reader"));
        assert!(!provider.is_role_available("operator"));
        let err = provider.get_creds_by_roles(&["operator"], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
