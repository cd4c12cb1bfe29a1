//! Class parameter parsing.
//!
//! Bucket classes and bucket access classes arrive as flat string maps.
//! This module turns them into closed, typed parameter structs at the
//! boundary: keys are matched case-insensitively against a fixed
//! vocabulary, unknown keys are ignored, and any enum value outside its
//! vocabulary is rejected with the offending field named.

use std::collections::{BTreeMap, HashMap};

use crate::errors::ProvisionError;

pub mod access_class;
pub mod bucket_class;

pub use access_class::BucketAccessClassParameters;
pub use bucket_class::BucketClassParameters;

/// The only value a boolean parameter treats as true.
pub const TRUE_VALUE: &str = "true";

/// Separator between tag pairs and between VNet resource IDs.
pub const LIST_DELIMITER: char = ',';

// -- Enumerations --------------------------------------------------------------

/// What backs a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BucketUnitType {
    #[default]
    Container,
    StorageAccount,
}

impl BucketUnitType {
    pub const ALL: [BucketUnitType; 2] = [BucketUnitType::Container, BucketUnitType::StorageAccount];

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketUnitType::Container => "container",
            BucketUnitType::StorageAccount => "storageaccount",
        }
    }

    /// Parse a unit type; an empty value means [`BucketUnitType::Container`].
    pub fn parse(field: &str, value: &str) -> Result<Self, ProvisionError> {
        if value.is_empty() {
            return Ok(BucketUnitType::Container);
        }
        parse_enum(field, value, &Self::ALL, Self::as_str, "unsupported bucket unit type")
    }
}

/// Blob access tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessTier {
    #[default]
    Hot,
    Cool,
    Archive,
}

impl AccessTier {
    pub const ALL: [AccessTier; 3] = [AccessTier::Hot, AccessTier::Cool, AccessTier::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Hot => "hot",
            AccessTier::Cool => "cool",
            AccessTier::Archive => "archive",
        }
    }
}

/// Redundancy SKU of a storage account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Sku {
    #[default]
    StandardLrs,
    StandardGrs,
    StandardRagrs,
    PremiumLrs,
}

impl Sku {
    pub const ALL: [Sku; 4] = [
        Sku::StandardLrs,
        Sku::StandardGrs,
        Sku::StandardRagrs,
        Sku::PremiumLrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sku::StandardLrs => "Standard_LRS",
            Sku::StandardGrs => "Standard_GRS",
            Sku::StandardRagrs => "Standard_RAGRS",
            Sku::PremiumLrs => "Premium_LRS",
        }
    }
}

/// Storage account kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccountKind {
    #[default]
    StorageV2,
    Storage,
    BlobStorage,
    BlockBlobStorage,
    FileStorage,
}

impl AccountKind {
    pub const ALL: [AccountKind; 5] = [
        AccountKind::StorageV2,
        AccountKind::Storage,
        AccountKind::BlobStorage,
        AccountKind::BlockBlobStorage,
        AccountKind::FileStorage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::StorageV2 => "StorageV2",
            AccountKind::Storage => "Storage",
            AccountKind::BlobStorage => "BlobStorage",
            AccountKind::BlockBlobStorage => "BlockBlobStorage",
            AccountKind::FileStorage => "FileStorage",
        }
    }
}

// -- Shared helpers ------------------------------------------------------------

/// Lower-case every key, rejecting keys that collide after lower-casing.
///
/// The result is ordered, so parsing never depends on map iteration order.
pub fn normalize_keys(
    parameters: &HashMap<String, String>,
) -> Result<BTreeMap<String, &str>, ProvisionError> {
    let mut out = BTreeMap::new();
    for (k, v) in parameters {
        let key = k.to_lowercase();
        if out.insert(key.clone(), v.as_str()).is_some() {
            return Err(ProvisionError::invalid_parameter(
                &key,
                v,
                "parameter given more than once with different letter case",
            ));
        }
    }
    Ok(out)
}

/// Boolean rule: true only for a case-insensitive `"true"`.
pub fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case(TRUE_VALUE)
}

/// Match `value` case-insensitively against each variant's wire name.
pub fn parse_enum<T: Copy>(
    field: &str,
    value: &str,
    variants: &[T],
    name: fn(&T) -> &'static str,
    reason: &str,
) -> Result<T, ProvisionError> {
    variants
        .iter()
        .find(|v| name(v).eq_ignore_ascii_case(value))
        .copied()
        .ok_or_else(|| ProvisionError::invalid_parameter(field, value, reason))
}

/// Parse a non-negative base-10 integer.
pub fn parse_u32(field: &str, value: &str) -> Result<u32, ProvisionError> {
    value
        .parse::<u32>()
        .map_err(|e| ProvisionError::invalid_parameter(field, value, e.to_string()))
}

/// Parse a non-negative base-10 integer.
pub fn parse_u64(field: &str, value: &str) -> Result<u64, ProvisionError> {
    value
        .parse::<u64>()
        .map_err(|e| ProvisionError::invalid_parameter(field, value, e.to_string()))
}

/// Parse `k1=v1,k2=v2` into a map. An empty string yields no tags.
pub fn parse_tags(field: &str, value: &str) -> Result<BTreeMap<String, String>, ProvisionError> {
    let mut tags = BTreeMap::new();
    if value.trim().is_empty() {
        return Ok(tags);
    }
    for pair in value.split(LIST_DELIMITER) {
        let mut kv = pair.split('=');
        let (key, val) = match (kv.next(), kv.next(), kv.next()) {
            (Some(k), Some(v), None) => (k.trim(), v.trim()),
            _ => {
                return Err(ProvisionError::invalid_parameter(
                    field,
                    value,
                    format!("malformed tag {:?}, expected key1=value1,key2=value2", pair),
                ))
            }
        };
        if key.is_empty() {
            return Err(ProvisionError::invalid_parameter(
                field,
                value,
                format!("tag {:?} has an empty key", pair),
            ));
        }
        tags.insert(key.to_string(), val.to_string());
    }
    Ok(tags)
}

/// Split a delimiter-separated list. Entries are kept verbatim; an empty
/// value is an empty list.
pub fn parse_list(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(LIST_DELIMITER).map(str::to_string).collect()
}
