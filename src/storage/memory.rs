//! In-memory cloud storage backend.
//!
//! Emulates the storage management plane with no persistence: accounts,
//! their containers, tags and access keys live in a `RwLock<HashMap>`.
//! SAS tokens are signed with the real Shared Key scheme so issued URLs
//! have the same shape as production ones.  Each operation is counted so
//! callers can assert how many backend calls a flow performed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use super::backend::{
    AccountOptions, BackendError, BackendResult, CloudStorageBackend, EnsuredAccount,
    SharedKeyCredential,
};
use super::shared_key;
use super::signature::SasSignatureValues;

#[derive(Debug, Clone)]
struct AccountRecord {
    subscription_id: String,
    resource_group: String,
    options: AccountOptions,
    key: String,
    tags: BTreeMap<String, String>,
    containers: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    calls: HashMap<&'static str, usize>,
}

pub struct MemoryBackend {
    inner: RwLock<Inner>,
    subscription_id: String,
    endpoint_suffix: String,
}

impl MemoryBackend {
    pub fn new(subscription_id: &str, endpoint_suffix: &str) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            subscription_id: subscription_id.to_string(),
            endpoint_suffix: endpoint_suffix.to_string(),
        }
    }

    /// Number of times `operation` was invoked (e.g. `"create_container"`).
    pub fn call_count(&self, operation: &str) -> usize {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.calls.get(operation).copied().unwrap_or(0)
    }

    /// Whether `account` currently exists.
    pub fn has_account(&self, account: &str) -> bool {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.accounts.contains_key(account)
    }

    /// Whether `container` exists inside `account`.
    pub fn has_container(&self, account: &str, container: &str) -> bool {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner
            .accounts
            .get(account)
            .map(|a| a.containers.contains(container))
            .unwrap_or(false)
    }

    /// Resource tags currently applied to `account`.
    pub fn account_tags(&self, account: &str) -> Option<BTreeMap<String, String>> {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.accounts.get(account).map(|a| a.tags.clone())
    }

    /// Options the account was created with.
    pub fn account_options(&self, account: &str) -> Option<AccountOptions> {
        let inner = self.inner.read().expect("rwlock poisoned");
        inner.accounts.get(account).map(|a| a.options.clone())
    }

    fn record_call(inner: &mut Inner, operation: &'static str) {
        *inner.calls.entry(operation).or_insert(0) += 1;
    }

    fn generate_account_name() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("cosi{}", &id[..20])
    }

    fn generate_key() -> String {
        let mut key = rand::random::<[u8; 32]>().to_vec();
        key.extend_from_slice(&rand::random::<[u8; 32]>());
        BASE64_STANDARD.encode(key)
    }

    fn check_key(record: &AccountRecord, account: &str, key: &str) -> BackendResult<()> {
        shared_key::decode_account_key(key)?;
        if record.key != key {
            return Err(BackendError::InvalidCredential(format!(
                "key does not match storage account {}",
                account
            )));
        }
        Ok(())
    }
}

/// Storage account names are 3-24 lowercase letters and digits.
pub fn validate_account_name(name: &str) -> BackendResult<()> {
    let valid = (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidRequest(format!(
            "invalid storage account name {:?}",
            name
        )))
    }
}

/// Container names are 3-63 lowercase letters, digits and single hyphens,
/// starting and ending with a letter or digit.
pub fn validate_container_name(name: &str) -> BackendResult<()> {
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid = (3..=63).contains(&name.len())
        && chars_ok
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--");
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidRequest(format!(
            "invalid container name {:?}",
            name
        )))
    }
}

impl CloudStorageBackend for MemoryBackend {
    fn ensure_storage_account(
        &self,
        options: &AccountOptions,
    ) -> Pin<Box<dyn Future<Output = BackendResult<EnsuredAccount>> + Send + '_>> {
        let options = options.clone();
        Box::pin(async move {
            let name = if options.name.is_empty() {
                Self::generate_account_name()
            } else {
                options.name.clone()
            };
            validate_account_name(&name)?;

            let mut inner = self.inner.write().expect("rwlock poisoned");
            Self::record_call(&mut inner, "ensure_storage_account");
            if let Some(existing) = inner.accounts.get(&name) {
                debug!("Storage account {} already exists", name);
                return Ok(EnsuredAccount {
                    name,
                    key: existing.key.clone(),
                });
            }

            let key = Self::generate_key();
            let subscription_id = if options.subscription_id.is_empty() {
                self.subscription_id.clone()
            } else {
                options.subscription_id.clone()
            };
            let record = AccountRecord {
                subscription_id,
                resource_group: options.resource_group.clone(),
                tags: options.tags.clone(),
                options,
                key: key.clone(),
                containers: BTreeSet::new(),
            };
            inner.accounts.insert(name.clone(), record);
            debug!("Created storage account {}", name);
            Ok(EnsuredAccount { name, key })
        })
    }

    fn create_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
        _metadata: &HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>> {
        let account = account.to_string();
        let key = key.to_string();
        let name = name.to_string();
        Box::pin(async move {
            validate_container_name(&name)?;
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Self::record_call(&mut inner, "create_container");
            let record = inner
                .accounts
                .get_mut(&account)
                .ok_or_else(|| BackendError::NotFound {
                    resource: format!("storage account {}", account),
                })?;
            Self::check_key(record, &account, &key)?;
            let url = format!("{}{}", self.account_url(&account), name);
            if !record.containers.insert(name.clone()) {
                return Err(BackendError::AlreadyExists {
                    resource: format!("container {}", url),
                });
            }
            Ok(url)
        })
    }

    fn delete_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>> {
        let account = account.to_string();
        let key = key.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Self::record_call(&mut inner, "delete_container");
            let record = inner
                .accounts
                .get_mut(&account)
                .ok_or_else(|| BackendError::NotFound {
                    resource: format!("storage account {}", account),
                })?;
            Self::check_key(record, &account, &key)?;
            if !record.containers.remove(&name) {
                return Err(BackendError::NotFound {
                    resource: format!("container {}/{}", account, name),
                });
            }
            Ok(())
        })
    }

    fn delete_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>> {
        let subscription_id = subscription_id.to_string();
        let resource_group = resource_group.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Self::record_call(&mut inner, "delete_storage_account");
            let matches = inner.accounts.get(&name).map(|a| {
                a.subscription_id == subscription_id && a.resource_group == resource_group
            });
            match matches {
                Some(true) => {
                    inner.accounts.remove(&name);
                    Ok(())
                }
                _ => Err(BackendError::NotFound {
                    resource: format!(
                        "storage account {}/{}/{}",
                        subscription_id, resource_group, name
                    ),
                }),
            }
        })
    }

    fn get_access_key(
        &self,
        subscription_id: &str,
        account: &str,
        resource_group: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>> {
        let subscription_id = subscription_id.to_string();
        let account = account.to_string();
        let resource_group = resource_group.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Self::record_call(&mut inner, "get_access_key");
            match inner.accounts.get(&account) {
                Some(a)
                    if a.subscription_id == subscription_id
                        && (resource_group.is_empty() || a.resource_group == resource_group) =>
                {
                    Ok(a.key.clone())
                }
                _ => Err(BackendError::NotFound {
                    resource: format!("storage account {}", account),
                }),
            }
        })
    }

    fn tag_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        account: &str,
        tags: &BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>> {
        let subscription_id = subscription_id.to_string();
        let resource_group = resource_group.to_string();
        let account = account.to_string();
        let tags = tags.clone();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Self::record_call(&mut inner, "tag_storage_account");
            match inner.accounts.get_mut(&account) {
                Some(a)
                    if a.subscription_id == subscription_id
                        && a.resource_group == resource_group =>
                {
                    a.tags.extend(tags);
                    Ok(())
                }
                _ => Err(BackendError::NotFound {
                    resource: format!("storage account {}", account),
                }),
            }
        })
    }

    fn sign_sas(
        &self,
        credential: &SharedKeyCredential,
        values: &SasSignatureValues,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>> {
        let credential = credential.clone();
        let values = values.clone();
        Box::pin(async move {
            {
                let mut inner = self.inner.write().expect("rwlock poisoned");
                Self::record_call(&mut inner, "sign_sas");
                if !inner.accounts.contains_key(&credential.account_name) {
                    return Err(BackendError::NotFound {
                        resource: format!("storage account {}", credential.account_name),
                    });
                }
            }
            shared_key::sign_sas(&credential, &values)
        })
    }

    fn account_url(&self, account: &str) -> String {
        format!("https://{}.blob.{}/", account, self.endpoint_suffix)
    }
}
