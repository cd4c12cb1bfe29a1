//! Creation-time bucket class parameters.

use std::collections::{BTreeMap, HashMap};

use super::{
    normalize_keys, parse_enum, parse_flag, parse_list, parse_tags, parse_u32, AccessTier,
    AccountKind, BucketUnitType, Sku,
};
use crate::errors::ProvisionError;

pub const BUCKET_UNIT_TYPE_FIELD: &str = "bucketunittype";
pub const CREATE_BUCKET_FIELD: &str = "createbucket";
pub const CREATE_STORAGE_ACCOUNT_FIELD: &str = "createstorageaccount";
pub const STORAGE_ACCOUNT_NAME_FIELD: &str = "storageaccountname";
pub const REGION_FIELD: &str = "region";
pub const ACCESS_TIER_FIELD: &str = "accesstier";
pub const SKU_NAME_FIELD: &str = "skuname";
pub const RESOURCE_GROUP_FIELD: &str = "resourcegroup";
pub const SUBSCRIPTION_ID_FIELD: &str = "subscriptionid";
pub const ALLOW_BLOB_ACCESS_FIELD: &str = "allowblobaccess";
pub const ALLOW_SHARED_ACCESS_KEY_FIELD: &str = "allowsharedaccesskey";
pub const ENABLE_BLOB_VERSIONING_FIELD: &str = "enableblobversioning";
pub const ENABLE_BLOB_DELETE_RETENTION_FIELD: &str = "enableblobdeleteretention";
pub const BLOB_DELETE_RETENTION_DAYS_FIELD: &str = "blobdeleteretentiondays";
pub const ENABLE_CONTAINER_DELETE_RETENTION_FIELD: &str = "enablecontainerdeleteretention";
pub const CONTAINER_DELETE_RETENTION_DAYS_FIELD: &str = "containerdeleteretentiondays";
pub const KIND_FIELD: &str = "kind";
pub const TAGS_FIELD: &str = "tags";
pub const VNET_RESOURCE_IDS_FIELD: &str = "vnetresourceids";
pub const HTTPS_TRAFFIC_ONLY_FIELD: &str = "enablehttpstrafficonly";
pub const CREATE_PRIVATE_ENDPOINT_FIELD: &str = "createprivateendpoint";
pub const HNS_ENABLED_FIELD: &str = "ishnsenabled";
pub const ENABLE_NFS_V3_FIELD: &str = "enablenfsv3";
pub const ENABLE_LARGE_FILE_SHARE_FIELD: &str = "enablelargefileshare";

/// Typed creation intent for a bucket.
///
/// Every field not named in the source map keeps its zero value. Two
/// values compare equal exactly when they would provision the same bucket,
/// which is what the registry uses to tell an idempotent replay from a
/// conflicting create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketClassParameters {
    pub bucket_unit_type: BucketUnitType,
    /// Recorded for completeness; container creation is implied by the unit type.
    pub create_bucket: bool,
    pub create_storage_account: bool,
    pub storage_account_name: String,
    pub region: String,
    pub access_tier: AccessTier,
    pub sku_name: Sku,
    pub resource_group: String,
    pub subscription_id: String,
    pub allow_blob_access: bool,
    pub allow_shared_access_key: bool,
    pub enable_blob_versioning: bool,
    pub enable_blob_delete_retention: bool,
    pub blob_delete_retention_days: u32,
    pub enable_container_delete_retention: bool,
    pub container_delete_retention_days: u32,
    pub kind: AccountKind,
    pub tags: BTreeMap<String, String>,
    pub virtual_network_resource_ids: Vec<String>,
    pub enable_https_traffic_only: bool,
    pub create_private_endpoint: bool,
    pub is_hns_enabled: bool,
    pub enable_nfs_v3: bool,
    pub enable_large_file_share: bool,
}

impl BucketClassParameters {
    /// Parse a bucket class parameter map.
    pub fn parse(parameters: &HashMap<String, String>) -> Result<Self, ProvisionError> {
        let params = normalize_keys(parameters)?;
        let mut out = BucketClassParameters::default();

        for (key, v) in params {
            match key.as_str() {
                BUCKET_UNIT_TYPE_FIELD => {
                    out.bucket_unit_type = BucketUnitType::parse(BUCKET_UNIT_TYPE_FIELD, v)?
                }
                CREATE_BUCKET_FIELD => out.create_bucket = parse_flag(v),
                CREATE_STORAGE_ACCOUNT_FIELD => out.create_storage_account = parse_flag(v),
                STORAGE_ACCOUNT_NAME_FIELD => out.storage_account_name = v.to_string(),
                REGION_FIELD => out.region = v.to_string(),
                ACCESS_TIER_FIELD => {
                    out.access_tier = parse_enum(
                        ACCESS_TIER_FIELD,
                        v,
                        &AccessTier::ALL,
                        AccessTier::as_str,
                        "unsupported access tier",
                    )?
                }
                SKU_NAME_FIELD => {
                    out.sku_name =
                        parse_enum(SKU_NAME_FIELD, v, &Sku::ALL, Sku::as_str, "unsupported SKU")?
                }
                RESOURCE_GROUP_FIELD => out.resource_group = v.to_string(),
                SUBSCRIPTION_ID_FIELD => out.subscription_id = v.to_string(),
                ALLOW_BLOB_ACCESS_FIELD => out.allow_blob_access = parse_flag(v),
                ALLOW_SHARED_ACCESS_KEY_FIELD => out.allow_shared_access_key = parse_flag(v),
                ENABLE_BLOB_VERSIONING_FIELD => out.enable_blob_versioning = parse_flag(v),
                ENABLE_BLOB_DELETE_RETENTION_FIELD => out.enable_blob_delete_retention = parse_flag(v),
                BLOB_DELETE_RETENTION_DAYS_FIELD => {
                    out.blob_delete_retention_days = parse_u32(BLOB_DELETE_RETENTION_DAYS_FIELD, v)?
                }
                ENABLE_CONTAINER_DELETE_RETENTION_FIELD => {
                    out.enable_container_delete_retention = parse_flag(v)
                }
                CONTAINER_DELETE_RETENTION_DAYS_FIELD => {
                    out.container_delete_retention_days =
                        parse_u32(CONTAINER_DELETE_RETENTION_DAYS_FIELD, v)?
                }
                KIND_FIELD => {
                    out.kind = parse_enum(
                        KIND_FIELD,
                        v,
                        &AccountKind::ALL,
                        AccountKind::as_str,
                        "unsupported account kind",
                    )?
                }
                TAGS_FIELD => out.tags = parse_tags(TAGS_FIELD, v)?,
                VNET_RESOURCE_IDS_FIELD => out.virtual_network_resource_ids = parse_list(v),
                HTTPS_TRAFFIC_ONLY_FIELD => out.enable_https_traffic_only = parse_flag(v),
                CREATE_PRIVATE_ENDPOINT_FIELD => out.create_private_endpoint = parse_flag(v),
                HNS_ENABLED_FIELD => out.is_hns_enabled = parse_flag(v),
                ENABLE_NFS_V3_FIELD => out.enable_nfs_v3 = parse_flag(v),
                ENABLE_LARGE_FILE_SHARE_FIELD => out.enable_large_file_share = parse_flag(v),
                _ => {}
            }
        }

        Ok(out)
    }
}
