//! Bucket lifecycle routing.
//!
//! Create and delete are dispatched on the bucket unit type: a container
//! bucket lives inside an existing or ensured storage account, a storage
//! account bucket owns the whole account. Nothing here retries; backend
//! failures are wrapped with the operation and resource and returned.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bucket_id::{BlobUrl, BucketId};
use crate::errors::ProvisionError;
use crate::parameters::bucket_class::{
    BLOB_DELETE_RETENTION_DAYS_FIELD, CONTAINER_DELETE_RETENTION_DAYS_FIELD,
    ENABLE_BLOB_DELETE_RETENTION_FIELD, ENABLE_BLOB_VERSIONING_FIELD,
    ENABLE_CONTAINER_DELETE_RETENTION_FIELD,
};
use crate::parameters::{BucketClassParameters, BucketUnitType, TRUE_VALUE};
use crate::storage::{AccountOptions, BackendError, CloudStorageBackend, EnsuredAccount};

/// Values applied when bucket class parameters leave them empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionDefaults {
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
}

pub struct BucketLifecycle {
    backend: Arc<dyn CloudStorageBackend>,
    defaults: ProvisionDefaults,
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Versioning and retention settings recorded as account tags.
///
/// Only settings the class turned on are included.
pub fn retention_tags(params: &BucketClassParameters) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if params.enable_blob_versioning {
        tags.insert(ENABLE_BLOB_VERSIONING_FIELD.to_string(), TRUE_VALUE.to_string());
    }
    if params.enable_blob_delete_retention {
        tags.insert(
            ENABLE_BLOB_DELETE_RETENTION_FIELD.to_string(),
            TRUE_VALUE.to_string(),
        );
        tags.insert(
            BLOB_DELETE_RETENTION_DAYS_FIELD.to_string(),
            params.blob_delete_retention_days.to_string(),
        );
    }
    if params.enable_container_delete_retention {
        tags.insert(
            ENABLE_CONTAINER_DELETE_RETENTION_FIELD.to_string(),
            TRUE_VALUE.to_string(),
        );
        tags.insert(
            CONTAINER_DELETE_RETENTION_DAYS_FIELD.to_string(),
            params.container_delete_retention_days.to_string(),
        );
    }
    tags
}

impl BucketLifecycle {
    pub fn new(backend: Arc<dyn CloudStorageBackend>, defaults: ProvisionDefaults) -> Self {
        Self { backend, defaults }
    }

    /// Account options for `params`, with configured defaults filled in.
    pub fn account_options(&self, params: &BucketClassParameters) -> AccountOptions {
        AccountOptions {
            name: params.storage_account_name.clone(),
            subscription_id: or_default(&params.subscription_id, &self.defaults.subscription_id),
            resource_group: or_default(&params.resource_group, &self.defaults.resource_group),
            location: or_default(&params.region, &self.defaults.location),
            sku: params.sku_name,
            kind: params.kind,
            access_tier: params.access_tier,
            tags: params.tags.clone(),
            virtual_network_resource_ids: params.virtual_network_resource_ids.clone(),
            enable_https_traffic_only: params.enable_https_traffic_only,
            create_private_endpoint: params.create_private_endpoint,
            is_hns_enabled: params.is_hns_enabled,
            enable_nfs_v3: params.enable_nfs_v3,
            enable_large_file_share: params.enable_large_file_share,
            allow_blob_public_access: params.allow_blob_access,
            allow_shared_key_access: params.allow_shared_access_key,
        }
    }

    /// Provision `name` and return its bucket ID.
    pub async fn create_bucket(
        &self,
        name: &str,
        params: &BucketClassParameters,
    ) -> Result<BucketId, ProvisionError> {
        match params.bucket_unit_type {
            BucketUnitType::Container => self.create_container_bucket(name, params).await,
            BucketUnitType::StorageAccount => self.create_storage_account_bucket(params).await,
        }
    }

    /// Ensure the account described by `options`. An "already exists"
    /// answer counts as success and the key is fetched instead.
    async fn ensure_account(
        &self,
        options: &AccountOptions,
    ) -> Result<EnsuredAccount, ProvisionError> {
        match self.backend.ensure_storage_account(options).await {
            Ok(account) => Ok(account),
            Err(BackendError::AlreadyExists { .. }) if !options.name.is_empty() => {
                debug!("Storage account {} already exists", options.name);
                let key = self
                    .backend
                    .get_access_key(&options.subscription_id, &options.name, &options.resource_group)
                    .await
                    .map_err(|e| ProvisionError::backend("get access key", options.name.as_str(), e))?;
                Ok(EnsuredAccount {
                    name: options.name.clone(),
                    key,
                })
            }
            Err(e) => Err(ProvisionError::backend(
                "ensure storage account",
                options.name.as_str(),
                e,
            )),
        }
    }

    async fn create_container_bucket(
        &self,
        name: &str,
        params: &BucketClassParameters,
    ) -> Result<BucketId, ProvisionError> {
        let options = self.account_options(params);

        let account = if !options.name.is_empty() && !params.create_storage_account {
            let key = self
                .backend
                .get_access_key(&options.subscription_id, &options.name, &options.resource_group)
                .await
                .map_err(|e| ProvisionError::backend("get access key", options.name.as_str(), e))?;
            EnsuredAccount {
                name: options.name.clone(),
                key,
            }
        } else {
            self.ensure_account(&options).await?
        };

        let metadata = HashMap::new();
        let url = match self
            .backend
            .create_container(&account.name, &account.key, name, &metadata)
            .await
        {
            Ok(url) => url,
            Err(BackendError::AlreadyExists { .. }) => {
                debug!("Container {}/{} already exists", account.name, name);
                format!("{}{}", self.backend.account_url(&account.name), name)
            }
            Err(e) => {
                return Err(ProvisionError::backend(
                    "create container",
                    format!("{}/{}", account.name, name),
                    e,
                ))
            }
        };

        info!("Created container bucket {} in account {}", name, account.name);
        self.bucket_id(&options, &url)
    }

    async fn create_storage_account_bucket(
        &self,
        params: &BucketClassParameters,
    ) -> Result<BucketId, ProvisionError> {
        let options = self.account_options(params);
        let account = self.ensure_account(&options).await?;

        let tags = retention_tags(params);
        if !tags.is_empty() {
            if let Err(e) = self
                .backend
                .tag_storage_account(
                    &options.subscription_id,
                    &options.resource_group,
                    &account.name,
                    &tags,
                )
                .await
            {
                warn!(
                    "Could not tag storage account {} with retention settings: {}",
                    account.name, e
                );
            }
        }

        info!("Created storage account bucket {}", account.name);
        let url = self.backend.account_url(&account.name);
        self.bucket_id(&options, &url)
    }

    fn bucket_id(&self, options: &AccountOptions, url: &str) -> Result<BucketId, ProvisionError> {
        let url = BlobUrl::parse(url).map_err(|e| {
            ProvisionError::Internal(anyhow::anyhow!("backend returned unusable url: {}", e))
        })?;
        Ok(BucketId {
            subscription_id: options.subscription_id.clone(),
            resource_group: options.resource_group.clone(),
            url,
        })
    }

    /// Delete the container or storage account behind `id`.
    ///
    /// IDs addressing an individual blob are rejected before any backend
    /// call.
    pub async fn delete_bucket(&self, id: &BucketId) -> Result<(), ProvisionError> {
        if id.url.blob().is_some() {
            return Err(ProvisionError::invalid_argument(
                "Individual Blobs unsupported. Please use Blob Containers or Storage Accounts instead.",
            ));
        }
        let account = id.url.account();

        match id.url.container() {
            None => {
                self.backend
                    .delete_storage_account(&id.subscription_id, &id.resource_group, account)
                    .await
                    .map_err(|e| ProvisionError::backend("delete storage account", account, e))?;
                info!("Deleted storage account {}", account);
            }
            Some(container) => {
                let key = self
                    .backend
                    .get_access_key(&id.subscription_id, account, &id.resource_group)
                    .await
                    .map_err(|e| ProvisionError::backend("get access key", account, e))?;
                self.backend
                    .delete_container(account, &key, container)
                    .await
                    .map_err(|e| {
                        ProvisionError::backend(
                            "delete container",
                            format!("{}/{}", account, container),
                            e,
                        )
                    })?;
                info!("Deleted container {} in storage account {}", container, account);
            }
        }
        Ok(())
    }
}
