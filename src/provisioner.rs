//! Provisioner service.
//!
//! Sequences the parser, registry, lifecycle router and SAS builder for
//! each request. Registry mutation happens in a single step after the
//! backend call has returned. Calls for the same bucket name are
//! serialized through [`NameLocks`], and so are calls touching the same
//! backend resource, so a delete by ID cannot overtake a create that is
//! still provisioning that resource.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bucket_id::BucketId;
use crate::errors::ProvisionError;
use crate::lifecycle::{BucketLifecycle, ProvisionDefaults};
use crate::metrics;
use crate::parameters::{BucketAccessClassParameters, BucketClassParameters, BucketUnitType};
use crate::registry::{BucketRegistry, NameLocks, RecordOutcome};
use crate::sas::SasUrlBuilder;
use crate::storage::CloudStorageBackend;

/// A granted bucket access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Account endpoint the credentials apply to.
    pub account_id: String,
    pub sas_url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct Provisioner {
    registry: BucketRegistry,
    locks: NameLocks,
    resources: NameLocks,
    lifecycle: BucketLifecycle,
    sas: SasUrlBuilder,
}

fn outcome_label<T>(result: &Result<T, ProvisionError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}

/// Resource lock key for a create, when the resource is known before the
/// backend call. Generated account names are not.
fn planned_resource(name: &str, params: &BucketClassParameters) -> Option<String> {
    let account = params.storage_account_name.to_ascii_lowercase();
    if account.is_empty() {
        return None;
    }
    match params.bucket_unit_type {
        BucketUnitType::Container => Some(format!("{}/{}", account, name)),
        BucketUnitType::StorageAccount => Some(account),
    }
}

/// Resource lock key for the resource behind `id`.
fn id_resource(id: &BucketId) -> String {
    let account = id.url.account().to_ascii_lowercase();
    match id.url.container() {
        Some(container) => format!("{}/{}", account, container),
        None => account,
    }
}

impl Provisioner {
    pub fn new(backend: Arc<dyn CloudStorageBackend>, defaults: ProvisionDefaults) -> Self {
        Self {
            registry: BucketRegistry::new(),
            locks: NameLocks::new(),
            resources: NameLocks::new(),
            lifecycle: BucketLifecycle::new(backend.clone(), defaults),
            sas: SasUrlBuilder::new(backend),
        }
    }

    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    /// Create bucket `name`, returning its opaque ID.
    ///
    /// Re-creating a name with identical parameters returns the existing ID
    /// without touching the backend.
    pub async fn create_bucket(
        &self,
        name: &str,
        parameters: Option<&HashMap<String, String>>,
    ) -> Result<String, ProvisionError> {
        let result = self.create_bucket_inner(name, parameters).await;
        metrics::record_operation("create_bucket", outcome_label(&result));
        result
    }

    async fn create_bucket_inner(
        &self,
        name: &str,
        parameters: Option<&HashMap<String, String>>,
    ) -> Result<String, ProvisionError> {
        if name.is_empty() {
            return Err(ProvisionError::invalid_argument("Bucket name missing"));
        }
        let parameters = parameters.ok_or_else(|| {
            ProvisionError::invalid_argument("Parameters missing. Cannot initialize bucket.")
        })?;
        let params = BucketClassParameters::parse(parameters)?;

        let _guard = self.locks.lock(name).await;
        let _resource_guard = match planned_resource(name, &params) {
            Some(key) => Some(self.resources.lock(&key).await),
            None => None,
        };

        if let Some(existing) = self.registry.lookup(name) {
            if existing.parameters == params {
                info!("Bucket {} already exists with id {}", name, existing.bucket_id);
                return Ok(existing.bucket_id);
            }
            warn!("Bucket {} exists with different parameters", name);
            return Err(ProvisionError::BucketConflict {
                bucket: name.to_string(),
            });
        }

        info!(
            "Creating bucket {} as {}",
            name,
            params.bucket_unit_type.as_str()
        );
        let id = self.lifecycle.create_bucket(name, &params).await?;
        let encoded = id.encode()?;

        let outcome = self.registry.record_create(name, &encoded, &params)?;
        metrics::set_registry_buckets(self.registry.len());
        if let RecordOutcome::Inserted(_) = outcome {
            info!("Created bucket {} with id {}", name, encoded);
        }
        Ok(outcome.bucket_id().to_string())
    }

    /// Delete the bucket behind `bucket_id`.
    ///
    /// The registry entry is removed once the backend confirms the resource
    /// is gone, including when it was already missing.
    pub async fn delete_bucket(&self, bucket_id: &str) -> Result<(), ProvisionError> {
        let result = self.delete_bucket_inner(bucket_id).await;
        metrics::record_operation("delete_bucket", outcome_label(&result));
        result
    }

    async fn delete_bucket_inner(&self, bucket_id: &str) -> Result<(), ProvisionError> {
        let id = BucketId::decode(bucket_id)?;

        let _guard = match self.registry.name_for_id(bucket_id) {
            Some(name) => Some(self.locks.lock(&name).await),
            None => None,
        };
        let _resource_guard = self.resources.lock(&id_resource(&id)).await;

        info!("Deleting bucket {}", id.url);
        let result = self.lifecycle.delete_bucket(&id).await;
        match &result {
            Ok(()) | Err(ProvisionError::NotFound { .. }) => {
                if let Some(name) = self.registry.record_delete(bucket_id) {
                    info!("Removed bucket {} from registry", name);
                }
                metrics::set_registry_buckets(self.registry.len());
            }
            Err(_) => {}
        }
        result
    }

    /// Issue a SAS URL for `bucket_id`.
    pub async fn grant_access(
        &self,
        bucket_id: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<AccessGrant, ProvisionError> {
        let result = self.grant_access_inner(bucket_id, parameters).await;
        metrics::record_operation("grant_access", outcome_label(&result));
        result
    }

    async fn grant_access_inner(
        &self,
        bucket_id: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<AccessGrant, ProvisionError> {
        let id = BucketId::decode(bucket_id)?;
        let params = BucketAccessClassParameters::parse(parameters)?;
        let grant = self.sas.build(&id, &params, Utc::now()).await?;
        Ok(AccessGrant {
            account_id: grant.account_url,
            sas_url: grant.sas_url,
            expires_at: grant.expiry,
        })
    }

    /// Revoke a previous grant.
    ///
    /// SAS grants are stateless and lapse at their expiry, so this only
    /// validates the request.
    pub async fn revoke_access(
        &self,
        bucket_id: &str,
        account_id: &str,
    ) -> Result<(), ProvisionError> {
        let result = BucketId::decode(bucket_id).and_then(|id| {
            if account_id.is_empty() {
                return Err(ProvisionError::invalid_argument("Account ID missing"));
            }
            info!(
                "Revoke requested for {} on {}; SAS grants expire on their own",
                account_id, id.url
            );
            Ok(())
        });
        metrics::record_operation("revoke_access", outcome_label(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bucket_id::BlobUrl;
    use crate::storage::memory::MemoryBackend;
    use crate::storage::scripted::ScriptedBackend;

    fn setup() -> (Arc<MemoryBackend>, Arc<Provisioner>) {
        let backend = Arc::new(MemoryBackend::new("sub-1", "core.windows.net"));
        let provisioner = Provisioner::new(
            backend.clone(),
            ProvisionDefaults {
                subscription_id: "sub-1".to_string(),
                resource_group: "rg".to_string(),
                location: "eastus".to_string(),
            },
        );
        (backend, Arc::new(provisioner))
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn container_params() -> HashMap<String, String> {
        params(&[
            ("storageaccountname", "validaccount"),
            ("createstorageaccount", "true"),
        ])
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (backend, p) = setup();
        let first = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        let second = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.call_count("create_container"), 1);
        assert_eq!(backend.call_count("ensure_storage_account"), 1);
        assert_eq!(p.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_create_conflict_keeps_original() {
        let (backend, p) = setup();
        let first = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();

        let mut different = container_params();
        different.insert("accesstier".to_string(), "cool".to_string());
        let err = p
            .create_bucket("validcontainer", Some(&different))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::BucketConflict { .. }));
        assert_eq!(p.registry().lookup("validcontainer").unwrap().bucket_id, first);
        assert_eq!(backend.call_count("create_container"), 1);
    }

    #[tokio::test]
    async fn test_create_requires_parameters() {
        let (backend, p) = setup();
        let err = p.create_bucket("validcontainer", None).await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("Parameters missing"));

        let err = p
            .create_bucket("", Some(&container_params()))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(backend.call_count("ensure_storage_account"), 0);
    }

    #[tokio::test]
    async fn test_parse_error_short_circuits() {
        let (backend, p) = setup();
        let err = p
            .create_bucket("validcontainer", Some(&params(&[("accesstier", "ultra")])))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(backend.call_count("ensure_storage_account"), 0);
        assert!(p.registry().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_no_entry() {
        let (_, p) = setup();
        let err = p
            .create_bucket(
                "validcontainer",
                Some(&params(&[("storageaccountname", "invalidaccount")])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound { .. }));
        assert!(p.registry().lookup("validcontainer").is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_container() {
        let (backend, p) = setup();
        let id = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        p.delete_bucket(&id).await.unwrap();
        assert!(!backend.has_container("validaccount", "validcontainer"));
        assert!(p.registry().lookup("validcontainer").is_none());
        assert!(p.registry().name_for_id(&id).is_none());

        // The name can be provisioned again afterwards.
        let again = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        assert_eq!(again, id);
    }

    #[tokio::test]
    async fn test_delete_already_gone_cleans_registry() {
        let (backend, p) = setup();
        let id = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        let decoded = BucketId::decode(&id).unwrap();
        let key = backend
            .get_access_key("sub-1", "validaccount", "rg")
            .await
            .unwrap();
        backend
            .delete_container(decoded.url.account(), &key, "validcontainer")
            .await
            .unwrap();

        let err = p.delete_bucket(&id).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound { .. }));
        assert!(p.registry().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_id() {
        let (backend, p) = setup();
        let err = p.delete_bucket("garbage").await.unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(backend.call_count("delete_container"), 0);
        assert_eq!(backend.call_count("delete_storage_account"), 0);
    }

    #[tokio::test]
    async fn test_storage_account_bucket_round_trip() {
        let (backend, p) = setup();
        let id = p
            .create_bucket(
                "accountbucket",
                Some(&params(&[
                    ("bucketunittype", "storageaccount"),
                    ("storageaccountname", "validaccount"),
                ])),
            )
            .await
            .unwrap();
        assert!(backend.has_account("validaccount"));
        p.delete_bucket(&id).await.unwrap();
        assert!(!backend.has_account("validaccount"));
        assert!(p.registry().is_empty());
    }

    #[tokio::test]
    async fn test_grant_access() {
        let (_, p) = setup();
        let id = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        let grant = p
            .grant_access(&id, &params(&[("validationperiod", "86400000")]))
            .await
            .unwrap();
        assert_eq!(grant.account_id, "https://validaccount.blob.core.windows.net");
        assert!(grant
            .sas_url
            .starts_with("https://validaccount.blob.core.windows.net/validcontainer?"));
        assert!(grant.sas_url.contains("sp=rl"));
        assert!(grant.expires_at > Utc::now());

        let err = p.grant_access("garbage", &HashMap::new()).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_revoke_access() {
        let (_, p) = setup();
        let id = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();
        p.revoke_access(&id, "https://validaccount.blob.core.windows.net")
            .await
            .unwrap();
        assert!(p.revoke_access(&id, "").await.unwrap_err().is_invalid_argument());
        assert!(p.revoke_access("garbage", "acct").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_names() {
        let (backend, p) = setup();
        let mut handles = Vec::new();
        for i in 0..16 {
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                p.create_bucket(&format!("bucket-{:02}", i), Some(&container_params()))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(p.registry().len(), 16);
        assert_eq!(backend.call_count("create_container"), 16);
        for i in 0..16 {
            let entry = p.registry().lookup(&format!("bucket-{:02}", i)).unwrap();
            assert_eq!(
                p.registry().name_for_id(&entry.bucket_id).as_deref(),
                Some(format!("bucket-{:02}", i).as_str())
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_name() {
        let (backend, p) = setup();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                p.create_bucket("validcontainer", Some(&container_params()))
                    .await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap());
        }
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(p.registry().len(), 1);
        assert_eq!(backend.call_count("create_container"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delete_waits_for_in_flight_create() {
        let memory = Arc::new(MemoryBackend::new("sub-1", "core.windows.net"));
        let scripted = Arc::new(ScriptedBackend::new(memory.clone()));
        scripted.pause_create_container();
        let p = Arc::new(Provisioner::new(
            scripted.clone(),
            ProvisionDefaults {
                subscription_id: "sub-1".to_string(),
                resource_group: "rg".to_string(),
                location: "eastus".to_string(),
            },
        ));

        // Container IDs are deterministic, so a caller can hold one before
        // the create that produces it has returned.
        let expected = BucketId {
            subscription_id: "sub-1".to_string(),
            resource_group: "rg".to_string(),
            url: BlobUrl::parse("https://validaccount.blob.core.windows.net/validcontainer")
                .unwrap(),
        }
        .encode()
        .unwrap();

        let creator = {
            let p = p.clone();
            tokio::spawn(async move {
                p.create_bucket("validcontainer", Some(&container_params()))
                    .await
            })
        };
        scripted.container_created.notified().await;
        assert!(memory.has_container("validaccount", "validcontainer"));

        let mut deleter = {
            let p = p.clone();
            let id = expected.clone();
            tokio::spawn(async move { p.delete_bucket(&id).await })
        };
        assert!(
            tokio::time::timeout(Duration::from_millis(100), &mut deleter)
                .await
                .is_err(),
            "delete must wait for the create holding the same container"
        );

        scripted.release_create.notify_one();
        assert_eq!(creator.await.unwrap().unwrap(), expected);
        deleter.await.unwrap().unwrap();

        assert!(p.registry().lookup("validcontainer").is_none());
        assert!(p.registry().name_for_id(&expected).is_none());
        assert!(!memory.has_container("validaccount", "validcontainer"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_and_delete_same_name() {
        let (_, p) = setup();
        let id = p
            .create_bucket("validcontainer", Some(&container_params()))
            .await
            .unwrap();

        let deleter = {
            let p = p.clone();
            let id = id.clone();
            tokio::spawn(async move { p.delete_bucket(&id).await })
        };
        let creator = {
            let p = p.clone();
            tokio::spawn(async move {
                p.create_bucket("validcontainer", Some(&container_params()))
                    .await
            })
        };
        deleter.await.unwrap().unwrap();
        creator.await.unwrap().unwrap();

        // Whichever ran last decides; the two maps always agree.
        let forward = p.registry().lookup("validcontainer");
        let reverse = p.registry().name_for_id(&id);
        assert_eq!(forward.is_some(), reverse.is_some());
    }
}
