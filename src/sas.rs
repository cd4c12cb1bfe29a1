//! SAS URL construction.
//!
//! Turns an access intent plus a resolved bucket into a signed URL: the
//! permission and resource-type sets are composed from the intent's flags,
//! the validity window is computed from the start time and period, and the
//! signature itself comes from the backend's signing primitive.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::bucket_id::BucketId;
use crate::errors::ProvisionError;
use crate::parameters::{BucketAccessClassParameters, BucketUnitType};
use crate::storage::signature::{
    format_sas_time, SasPermissions, SasResourceTypes, SasScope, SasSignatureValues,
};
use crate::storage::{CloudStorageBackend, SharedKeyCredential};

/// A signed URL and the account endpoint it was issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasGrant {
    pub sas_url: String,
    pub account_url: String,
    pub expiry: DateTime<Utc>,
}

/// OR the intent's permission flags onto an empty permission set.
pub fn compose_permissions(params: &BucketAccessClassParameters) -> SasPermissions {
    let mut p = SasPermissions::default();
    if params.enable_list {
        p.list = true;
    }
    if params.enable_read {
        p.read = true;
    }
    if params.enable_write {
        p.write = true;
    }
    if params.enable_add {
        p.add = true;
    }
    if params.enable_create {
        p.create = true;
    }
    if params.enable_delete {
        p.delete = true;
    }
    if params.enable_permanent_delete {
        p.delete_previous_version = true;
    }
    if params.enable_tags {
        p.tag = true;
    }
    if params.enable_filter {
        p.filter_by_tags = true;
    }
    p
}

/// Resource levels the token may address.
pub fn compose_resource_types(params: &BucketAccessClassParameters) -> SasResourceTypes {
    SasResourceTypes {
        service: params.allow_service_resource_type,
        container: params.allow_container_resource_type,
        object: params.allow_object_resource_type,
    }
}

/// `start` is the explicit override or `now`; `end` is `start` plus the
/// validity period.
pub fn validity_window(
    params: &BucketAccessClassParameters,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ProvisionError> {
    let start = params.signed_start.unwrap_or(now);
    let period = i64::try_from(params.validation_period_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .ok_or_else(|| ProvisionError::invalid_argument("validity period is too large"))?;
    let end = start
        .checked_add_signed(period)
        .ok_or_else(|| ProvisionError::invalid_argument("validity window ends out of range"))?;
    Ok((start, end))
}

/// Resolve the signing scope from the bucket ID, checking the intent does
/// not contradict it.
fn resolve_scope(
    id: &BucketId,
    params: &BucketAccessClassParameters,
) -> Result<SasScope, ProvisionError> {
    if id.url.blob().is_some() {
        return Err(ProvisionError::invalid_argument(
            "Individual Blobs unsupported. Please use Blob Containers or Storage Accounts instead.",
        ));
    }
    if !params.storage_account_name.is_empty()
        && !params.storage_account_name.eq_ignore_ascii_case(id.url.account())
    {
        return Err(ProvisionError::invalid_argument(format!(
            "storage account {} does not match bucket account {}",
            params.storage_account_name,
            id.url.account()
        )));
    }

    let scope = match id.url.container() {
        Some(name) => SasScope::Container {
            name: name.to_string(),
        },
        None => SasScope::Account,
    };
    match (params.bucket_unit_type, &scope) {
        (None, _)
        | (Some(BucketUnitType::Container), SasScope::Container { .. })
        | (Some(BucketUnitType::StorageAccount), SasScope::Account) => Ok(scope),
        (Some(unit), _) => Err(ProvisionError::invalid_argument(format!(
            "bucket unit type {} does not match bucket {}",
            unit.as_str(),
            id.url
        ))),
    }
}

/// Builds SAS URLs against a storage backend.
pub struct SasUrlBuilder {
    backend: Arc<dyn CloudStorageBackend>,
}

impl SasUrlBuilder {
    pub fn new(backend: Arc<dyn CloudStorageBackend>) -> Self {
        Self { backend }
    }

    /// Issue a signed URL for `id` according to `params`, with `now` as the
    /// default window start.
    pub async fn build(
        &self,
        id: &BucketId,
        params: &BucketAccessClassParameters,
        now: DateTime<Utc>,
    ) -> Result<SasGrant, ProvisionError> {
        let scope = resolve_scope(id, params)?;

        let permissions = compose_permissions(params);
        if permissions.is_empty() {
            return Err(ProvisionError::invalid_argument(
                "access grant selects no permissions",
            ));
        }
        let resource_types = compose_resource_types(params);
        if scope == SasScope::Account && resource_types.is_empty() {
            return Err(ProvisionError::invalid_argument(
                "account access grant selects no resource types",
            ));
        }
        let (start, expiry) = validity_window(params, now)?;

        let account = id.url.account().to_string();
        let key = if params.key.is_empty() {
            self.backend
                .get_access_key(&id.subscription_id, &account, &id.resource_group)
                .await
                .map_err(|e| ProvisionError::backend("get access key", account.as_str(), e))?
        } else {
            params.key.clone()
        };
        let credential = SharedKeyCredential {
            account_name: account.clone(),
            account_key: key,
        };

        let values = SasSignatureValues {
            version: params.signed_version.clone(),
            protocol: params.signed_protocol,
            start,
            expiry,
            permissions,
            resource_types,
            ip_range: params.signed_ip,
            scope: scope.clone(),
        };
        let query = self
            .backend
            .sign_sas(&credential, &values)
            .await
            .map_err(|e| ProvisionError::backend("sign sas", account.as_str(), e))?;

        let resource_url = match &scope {
            SasScope::Account => id.url.account_url(),
            SasScope::Container { name } => format!("{}/{}", id.url.endpoint(), name),
        };
        info!(
            account = %account,
            scope = ?scope,
            expiry = %format_sas_time(&expiry),
            "Issued SAS URL"
        );

        Ok(SasGrant {
            sas_url: format!("{}?{}", resource_url, query),
            account_url: id.url.endpoint().to_string(),
            expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket_id::BlobUrl;
    use crate::storage::memory::MemoryBackend;
    use crate::storage::AccountOptions;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn params(pairs: &[(&str, &str)]) -> BucketAccessClassParameters {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BucketAccessClassParameters::parse(&map).unwrap()
    }

    fn bucket(url: &str) -> BucketId {
        BucketId {
            subscription_id: "sub-1".to_string(),
            resource_group: "rg".to_string(),
            url: BlobUrl::parse(url).unwrap(),
        }
    }

    async fn backend_with_account() -> (Arc<MemoryBackend>, String) {
        let backend = Arc::new(MemoryBackend::new("sub-1", "core.windows.net"));
        let acct = backend
            .ensure_storage_account(&AccountOptions {
                name: "validaccount".to_string(),
                resource_group: "rg".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        (backend, acct.key)
    }

    fn query_value<'a>(url: &'a str, name: &str) -> Option<&'a str> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_read_without_write() {
        let p = params(&[("enableRead", "true"), ("enableWrite", "false")]);
        let perms = compose_permissions(&p);
        assert!(perms.read);
        assert!(!perms.write);
        assert_eq!(compose_resource_types(&p), SasResourceTypes::all());
    }

    #[test]
    fn test_one_day_window_from_explicit_start() {
        let p = params(&[
            ("validationperiod", "86400000"),
            ("signedstart", "2024-01-02T03:04:05Z"),
        ]);
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let (start, end) = validity_window(&p, now).unwrap();
        assert_eq!(start, t);
        assert_eq!(end, t + Duration::hours(24));
    }

    #[test]
    fn test_default_window_starts_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (start, end) = validity_window(&params(&[]), now).unwrap();
        assert_eq!(start, now);
        assert_eq!(end, now + Duration::weeks(1));
    }

    #[test]
    fn test_oversized_period_is_rejected() {
        let p = params(&[("validationperiod", &u64::MAX.to_string())]);
        let err = validity_window(&p, Utc::now()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_container_sas_url() {
        let (backend, _) = backend_with_account().await;
        let builder = SasUrlBuilder::new(backend.clone());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let grant = builder
            .build(
                &bucket("https://validaccount.blob.core.windows.net/validcontainer"),
                &params(&[("enablewrite", "true")]),
                now,
            )
            .await
            .unwrap();

        assert!(grant
            .sas_url
            .starts_with("https://validaccount.blob.core.windows.net/validcontainer?"));
        assert_eq!(grant.account_url, "https://validaccount.blob.core.windows.net");
        assert_eq!(query_value(&grant.sas_url, "sr"), Some("c"));
        assert_eq!(query_value(&grant.sas_url, "sp"), Some("rwl"));
        assert_eq!(query_value(&grant.sas_url, "srt"), None);
        assert!(query_value(&grant.sas_url, "sig").is_some());
        assert_eq!(grant.expiry, now + Duration::weeks(1));
        assert_eq!(backend.call_count("get_access_key"), 1);
    }

    #[tokio::test]
    async fn test_account_sas_url_with_explicit_key() {
        let (backend, key) = backend_with_account().await;
        let builder = SasUrlBuilder::new(backend.clone());

        let grant = builder
            .build(
                &bucket("https://validaccount.blob.core.windows.net/"),
                &params(&[
                    ("key", &key),
                    ("signedresourcetypes", "co"),
                    ("signedprotocol", "https"),
                ]),
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(grant
            .sas_url
            .starts_with("https://validaccount.blob.core.windows.net/?"));
        assert_eq!(query_value(&grant.sas_url, "ss"), Some("b"));
        assert_eq!(query_value(&grant.sas_url, "srt"), Some("co"));
        assert_eq!(query_value(&grant.sas_url, "spr"), Some("https"));
        assert_eq!(query_value(&grant.sas_url, "sp"), Some("rl"));
        assert_eq!(backend.call_count("get_access_key"), 0);
    }

    #[tokio::test]
    async fn test_malformed_key_is_surfaced() {
        let (backend, _) = backend_with_account().await;
        let builder = SasUrlBuilder::new(backend);
        let err = builder
            .build(
                &bucket("https://validaccount.blob.core.windows.net/validcontainer"),
                &params(&[("key", "val")]),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BackendError");
        assert!(err.to_string().contains("invalid credentials"));
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let backend = Arc::new(MemoryBackend::new("sub-1", "core.windows.net"));
        let builder = SasUrlBuilder::new(backend);
        let err = builder
            .build(
                &bucket("https://invalidaccount.blob.core.windows.net/validcontainer"),
                &params(&[]),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_scope_contradictions_rejected() {
        let (backend, _) = backend_with_account().await;
        let builder = SasUrlBuilder::new(backend.clone());
        let container = bucket("https://validaccount.blob.core.windows.net/validcontainer");

        let err = builder
            .build(&container, &params(&[("bucketunittype", "storageaccount")]), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = builder
            .build(&container, &params(&[("storageaccountname", "otheraccount")]), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = builder
            .build(
                &bucket("https://validaccount.blob.core.windows.net/validcontainer/validblob"),
                &params(&[]),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        let err = builder
            .build(&container, &params(&[("signedpermissions", "")]), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        assert_eq!(backend.call_count("sign_sas"), 0);
    }
}
