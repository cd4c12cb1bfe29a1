//! Abstract cloud storage backend trait.
//!
//! Every backend must implement [`CloudStorageBackend`].  The trait covers
//! the management-plane primitives the provisioner needs (accounts,
//! containers, keys, tags) plus the SAS signing primitive.  Dropping a
//! returned future cancels the call; callers never hold provisioner locks
//! across these awaits.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use super::signature::SasSignatureValues;
use crate::parameters::{AccessTier, AccountKind, Sku};

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The addressed resource does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The resource already exists.
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    /// The access key could not be used for signing.
    #[error("invalid credentials: {0}")]
    InvalidCredential(String),

    /// The backend rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or service failure.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Options used when ensuring a storage account exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountOptions {
    /// Account name. Empty lets the backend generate one.
    pub name: String,
    /// Empty selects the backend's default subscription.
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    pub sku: Sku,
    pub kind: AccountKind,
    pub access_tier: AccessTier,
    pub tags: BTreeMap<String, String>,
    pub virtual_network_resource_ids: Vec<String>,
    pub enable_https_traffic_only: bool,
    pub create_private_endpoint: bool,
    pub is_hns_enabled: bool,
    pub enable_nfs_v3: bool,
    pub enable_large_file_share: bool,
    pub allow_blob_public_access: bool,
    pub allow_shared_key_access: bool,
}

/// A storage account known to exist, with one of its access keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredAccount {
    pub name: String,
    pub key: String,
}

/// Account name plus base64 account key, as used by Shared Key signing.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKeyCredential {
    pub account_name: String,
    pub account_key: String,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Async cloud storage contract.
pub trait CloudStorageBackend: Send + Sync + 'static {
    /// Ensure a storage account matching `options` exists, creating it if
    /// needed, and return its name and an access key.
    fn ensure_storage_account(
        &self,
        options: &AccountOptions,
    ) -> Pin<Box<dyn Future<Output = BackendResult<EnsuredAccount>> + Send + '_>>;

    /// Create a blob container, returning its URL.
    fn create_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
        metadata: &HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>>;

    /// Delete a blob container.
    fn delete_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>>;

    /// Delete a whole storage account.
    fn delete_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>>;

    /// Fetch an access key for an existing storage account.
    fn get_access_key(
        &self,
        subscription_id: &str,
        account: &str,
        resource_group: &str,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>>;

    /// Merge `tags` into the account's resource tags.
    fn tag_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        account: &str,
        tags: &BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = BackendResult<()>> + Send + '_>>;

    /// Sign `values` with `credential`, returning the encoded SAS query
    /// string (without a leading `?`).
    fn sign_sas(
        &self,
        credential: &SharedKeyCredential,
        values: &SasSignatureValues,
    ) -> Pin<Box<dyn Future<Output = BackendResult<String>> + Send + '_>>;

    /// Blob service URL for `account`, with a trailing slash.
    fn account_url(&self, account: &str) -> String;
}
