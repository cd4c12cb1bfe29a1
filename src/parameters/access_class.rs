//! Access-grant (bucket access class) parameters.
//!
//! Omitting every key yields a read+list grant over all resource types,
//! valid for one week, usable over HTTPS or HTTP.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::{normalize_keys, parse_flag, parse_u64, BucketUnitType};
use crate::errors::ProvisionError;
use crate::storage::shared_key::MIN_SAS_VERSION;
use crate::storage::signature::{IpRange, SasProtocol};

pub const BUCKET_UNIT_TYPE_FIELD: &str = "bucketunittype";
pub const STORAGE_ACCOUNT_NAME_FIELD: &str = "storageaccountname";
pub const REGION_FIELD: &str = "region";
pub const SIGNED_VERSION_FIELD: &str = "signedversion";
pub const SIGNED_IP_FIELD: &str = "signedipfield";
pub const SIGNED_PROTOCOL_FIELD: &str = "signedprotocol";
pub const SIGNED_START_FIELD: &str = "signedstart";
pub const VALIDATION_PERIOD_FIELD: &str = "validationperiod";
pub const SIGNED_PERMISSIONS_FIELD: &str = "signedpermissions";
pub const SIGNED_RESOURCE_TYPES_FIELD: &str = "signedresourcetypes";
pub const ENABLE_LIST_FIELD: &str = "enablelist";
pub const ENABLE_READ_FIELD: &str = "enableread";
pub const ENABLE_WRITE_FIELD: &str = "enablewrite";
pub const ENABLE_ADD_FIELD: &str = "enableadd";
pub const ENABLE_CREATE_FIELD: &str = "enablecreate";
pub const ENABLE_DELETE_FIELD: &str = "enabledelete";
pub const ENABLE_PERMANENT_DELETE_FIELD: &str = "enablepermanentdelete";
pub const ENABLE_TAGS_FIELD: &str = "enabletags";
pub const ENABLE_FILTER_FIELD: &str = "enablefilter";
pub const ALLOW_SERVICE_RESOURCE_TYPE_FIELD: &str = "allowservicesignedresourcetypefield";
pub const ALLOW_CONTAINER_RESOURCE_TYPE_FIELD: &str = "allowcontainersignedresourcetypefield";
pub const ALLOW_OBJECT_RESOURCE_TYPE_FIELD: &str = "allowobjectsignedresourcetypefield";
pub const KEY_FIELD: &str = "key";

/// One week in milliseconds.
pub const DEFAULT_VALIDATION_PERIOD_MS: u64 = 604_800_000;

/// Typed access-grant intent.
#[derive(Clone, PartialEq, Eq)]
pub struct BucketAccessClassParameters {
    /// Only set when the map names a unit type; the bucket ID decides otherwise.
    pub bucket_unit_type: Option<BucketUnitType>,
    pub storage_account_name: String,
    pub region: String,
    /// Empty selects the signing primitive's default version.
    pub signed_version: String,
    pub signed_ip: Option<IpRange>,
    pub signed_protocol: SasProtocol,
    pub signed_start: Option<DateTime<Utc>>,
    pub validation_period_ms: u64,
    pub enable_list: bool,
    pub enable_read: bool,
    pub enable_write: bool,
    pub enable_add: bool,
    pub enable_create: bool,
    pub enable_delete: bool,
    pub enable_permanent_delete: bool,
    pub enable_tags: bool,
    pub enable_filter: bool,
    pub allow_service_resource_type: bool,
    pub allow_container_resource_type: bool,
    pub allow_object_resource_type: bool,
    /// Raw account key. Empty means fetch it from the backend.
    pub key: String,
}

impl Default for BucketAccessClassParameters {
    fn default() -> Self {
        Self {
            bucket_unit_type: None,
            storage_account_name: String::new(),
            region: String::new(),
            signed_version: String::new(),
            signed_ip: None,
            signed_protocol: SasProtocol::HttpsAndHttp,
            signed_start: None,
            validation_period_ms: DEFAULT_VALIDATION_PERIOD_MS,
            enable_list: true,
            enable_read: true,
            enable_write: false,
            enable_add: false,
            enable_create: false,
            enable_delete: false,
            enable_permanent_delete: false,
            enable_tags: false,
            enable_filter: false,
            allow_service_resource_type: true,
            allow_container_resource_type: true,
            allow_object_resource_type: true,
            key: String::new(),
        }
    }
}

impl std::fmt::Debug for BucketAccessClassParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketAccessClassParameters")
            .field("bucket_unit_type", &self.bucket_unit_type)
            .field("storage_account_name", &self.storage_account_name)
            .field("region", &self.region)
            .field("signed_version", &self.signed_version)
            .field("signed_ip", &self.signed_ip)
            .field("signed_protocol", &self.signed_protocol)
            .field("signed_start", &self.signed_start)
            .field("validation_period_ms", &self.validation_period_ms)
            .field("enable_list", &self.enable_list)
            .field("enable_read", &self.enable_read)
            .field("enable_write", &self.enable_write)
            .field("enable_add", &self.enable_add)
            .field("enable_create", &self.enable_create)
            .field("enable_delete", &self.enable_delete)
            .field("enable_permanent_delete", &self.enable_permanent_delete)
            .field("enable_tags", &self.enable_tags)
            .field("enable_filter", &self.enable_filter)
            .field("allow_service_resource_type", &self.allow_service_resource_type)
            .field("allow_container_resource_type", &self.allow_container_resource_type)
            .field("allow_object_resource_type", &self.allow_object_resource_type)
            .field("key", &if self.key.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

impl BucketAccessClassParameters {
    /// Parse a bucket access class parameter map.
    ///
    /// The composite `signedpermissions` and `signedresourcetypes` keys are
    /// applied first; individual `enable*` and `allow*` flags then override
    /// them.
    pub fn parse(parameters: &HashMap<String, String>) -> Result<Self, ProvisionError> {
        let params = normalize_keys(parameters)?;
        let mut out = BucketAccessClassParameters::default();

        if let Some(v) = params.get(SIGNED_PERMISSIONS_FIELD) {
            out.apply_permission_letters(v)?;
        }
        if let Some(v) = params.get(SIGNED_RESOURCE_TYPES_FIELD) {
            out.apply_resource_type_letters(v)?;
        }

        for (key, v) in &params {
            let v = *v;
            match key.as_str() {
                BUCKET_UNIT_TYPE_FIELD => {
                    out.bucket_unit_type = Some(BucketUnitType::parse(BUCKET_UNIT_TYPE_FIELD, v)?)
                }
                STORAGE_ACCOUNT_NAME_FIELD => out.storage_account_name = v.to_string(),
                REGION_FIELD => out.region = v.to_string(),
                SIGNED_VERSION_FIELD => out.signed_version = parse_signed_version(v)?,
                SIGNED_IP_FIELD => out.signed_ip = parse_ip_range(v)?,
                SIGNED_PROTOCOL_FIELD => out.signed_protocol = parse_protocol(v)?,
                SIGNED_START_FIELD => out.signed_start = parse_signed_start(v)?,
                VALIDATION_PERIOD_FIELD => {
                    let ms = parse_u64(VALIDATION_PERIOD_FIELD, v)?;
                    if ms == 0 {
                        return Err(ProvisionError::invalid_parameter(
                            VALIDATION_PERIOD_FIELD,
                            v,
                            "validity period must be positive",
                        ));
                    }
                    out.validation_period_ms = ms;
                }
                ENABLE_LIST_FIELD => out.enable_list = parse_flag(v),
                ENABLE_READ_FIELD => out.enable_read = parse_flag(v),
                ENABLE_WRITE_FIELD => out.enable_write = parse_flag(v),
                ENABLE_ADD_FIELD => out.enable_add = parse_flag(v),
                ENABLE_CREATE_FIELD => out.enable_create = parse_flag(v),
                ENABLE_DELETE_FIELD => out.enable_delete = parse_flag(v),
                ENABLE_PERMANENT_DELETE_FIELD => out.enable_permanent_delete = parse_flag(v),
                ENABLE_TAGS_FIELD => out.enable_tags = parse_flag(v),
                ENABLE_FILTER_FIELD => out.enable_filter = parse_flag(v),
                ALLOW_SERVICE_RESOURCE_TYPE_FIELD => out.allow_service_resource_type = parse_flag(v),
                ALLOW_CONTAINER_RESOURCE_TYPE_FIELD => {
                    out.allow_container_resource_type = parse_flag(v)
                }
                ALLOW_OBJECT_RESOURCE_TYPE_FIELD => out.allow_object_resource_type = parse_flag(v),
                KEY_FIELD => out.key = v.to_string(),
                _ => {}
            }
        }

        Ok(out)
    }

    /// Replace the permission set with the letters in `value`.
    fn apply_permission_letters(&mut self, value: &str) -> Result<(), ProvisionError> {
        self.enable_read = false;
        self.enable_write = false;
        self.enable_delete = false;
        self.enable_permanent_delete = false;
        self.enable_list = false;
        self.enable_add = false;
        self.enable_create = false;
        self.enable_tags = false;
        self.enable_filter = false;
        for c in value.chars() {
            match c.to_ascii_lowercase() {
                'r' => self.enable_read = true,
                'w' => self.enable_write = true,
                'd' => self.enable_delete = true,
                'x' => self.enable_permanent_delete = true,
                'l' => self.enable_list = true,
                'a' => self.enable_add = true,
                'c' => self.enable_create = true,
                't' => self.enable_tags = true,
                'f' => self.enable_filter = true,
                other => {
                    return Err(ProvisionError::invalid_parameter(
                        SIGNED_PERMISSIONS_FIELD,
                        value,
                        format!("unsupported permission {:?}", other),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Replace the resource-type set with the letters in `value`.
    fn apply_resource_type_letters(&mut self, value: &str) -> Result<(), ProvisionError> {
        self.allow_service_resource_type = false;
        self.allow_container_resource_type = false;
        self.allow_object_resource_type = false;
        for c in value.chars() {
            match c.to_ascii_lowercase() {
                's' => self.allow_service_resource_type = true,
                'c' => self.allow_container_resource_type = true,
                'o' => self.allow_object_resource_type = true,
                other => {
                    return Err(ProvisionError::invalid_parameter(
                        SIGNED_RESOURCE_TYPES_FIELD,
                        value,
                        format!("unsupported resource type {:?}", other),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// `<ip>` or `<ip1>-<ip2>`. Empty means no restriction.
fn parse_ip_range(value: &str) -> Result<Option<IpRange>, ProvisionError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let invalid = || {
        ProvisionError::invalid_parameter(
            SIGNED_IP_FIELD,
            value,
            "must be formatted as <ip> or <ip1>-<ip2>",
        )
    };
    let parse = |s: &str| s.trim().parse::<IpAddr>().map_err(|_| invalid());

    let parts: Vec<&str> = value.split('-').collect();
    match parts.as_slice() {
        [start] => Ok(Some(IpRange {
            start: parse(start)?,
            end: None,
        })),
        [start, end] => Ok(Some(IpRange {
            start: parse(start)?,
            end: Some(parse(end)?),
        })),
        _ => Err(invalid()),
    }
}

fn parse_protocol(value: &str) -> Result<SasProtocol, ProvisionError> {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "https" => Ok(SasProtocol::Https),
        "https,http" => Ok(SasProtocol::HttpsAndHttp),
        _ => Err(ProvisionError::invalid_parameter(
            SIGNED_PROTOCOL_FIELD,
            value,
            "expected \"https\" or \"https,http\"",
        )),
    }
}

/// RFC 3339, `YYYY-MM-DDThh:mmZ`, or a bare `YYYY-MM-DD` (midnight UTC).
/// A pinned service version must be a canonical `YYYY-MM-DD` date no older
/// than [`MIN_SAS_VERSION`]. Empty keeps the signer's default.
fn parse_signed_version(value: &str) -> Result<String, ProvisionError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }
    let canonical = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok()
        .filter(|c| c == value)
        .ok_or_else(|| {
            ProvisionError::invalid_parameter(
                SIGNED_VERSION_FIELD,
                value,
                "expected a service version such as 2021-08-06",
            )
        })?;
    if canonical.as_str() < MIN_SAS_VERSION {
        return Err(ProvisionError::invalid_parameter(
            SIGNED_VERSION_FIELD,
            value,
            format!("service versions before {} are not supported", MIN_SAS_VERSION),
        ));
    }
    Ok(canonical)
}

fn parse_signed_start(value: &str) -> Result<Option<DateTime<Utc>>, ProvisionError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(t.with_timezone(&Utc)));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%MZ") {
        return Ok(Some(t.and_utc()));
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(Some(t.and_utc()));
        }
    }
    Err(ProvisionError::invalid_parameter(
        SIGNED_START_FIELD,
        value,
        "expected an ISO 8601 UTC date or timestamp",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_read_list_one_week() {
        let p = BucketAccessClassParameters::parse(&HashMap::new()).unwrap();
        assert!(p.enable_read);
        assert!(p.enable_list);
        assert!(!p.enable_write);
        assert!(!p.enable_add);
        assert!(!p.enable_create);
        assert!(!p.enable_delete);
        assert!(!p.enable_permanent_delete);
        assert!(!p.enable_tags);
        assert!(!p.enable_filter);
        assert!(p.allow_service_resource_type);
        assert!(p.allow_container_resource_type);
        assert!(p.allow_object_resource_type);
        assert_eq!(p.validation_period_ms, 604_800_000);
        assert_eq!(p.signed_protocol, SasProtocol::HttpsAndHttp);
        assert_eq!(p.bucket_unit_type, None);
        assert!(p.signed_start.is_none());
        assert!(p.signed_ip.is_none());
    }

    #[test]
    fn test_individual_flags() {
        let p = BucketAccessClassParameters::parse(&params(&[
            ("enableRead", "true"),
            ("enableWrite", "false"),
            ("enableList", "false"),
            ("enableDelete", "TRUE"),
            ("enablePermanentDelete", "true"),
            ("allowContainerSignedResourceTypeField", "false"),
        ]))
        .unwrap();
        assert!(p.enable_read);
        assert!(!p.enable_write);
        assert!(!p.enable_list);
        assert!(p.enable_delete);
        assert!(p.enable_permanent_delete);
        assert!(p.allow_service_resource_type);
        assert!(!p.allow_container_resource_type);
        assert!(p.allow_object_resource_type);
    }

    #[test]
    fn test_non_true_value_clears_default() {
        let p = BucketAccessClassParameters::parse(&params(&[("enableread", "yes")])).unwrap();
        assert!(!p.enable_read);
    }

    #[test]
    fn test_composite_keys_then_individual_flags() {
        let p = BucketAccessClassParameters::parse(&params(&[
            ("signedPermissions", "rwl"),
            ("enablewrite", "false"),
            ("signedResourceTypes", "co"),
        ]))
        .unwrap();
        assert!(p.enable_read);
        assert!(!p.enable_write);
        assert!(p.enable_list);
        assert!(!p.enable_delete);
        assert!(!p.allow_service_resource_type);
        assert!(p.allow_container_resource_type);
        assert!(p.allow_object_resource_type);
    }

    #[test]
    fn test_invalid_composite_letters() {
        let err =
            BucketAccessClassParameters::parse(&params(&[("signedpermissions", "rz")])).unwrap_err();
        assert!(err.to_string().contains("signedpermissions"));
        assert!(
            BucketAccessClassParameters::parse(&params(&[("signedresourcetypes", "b")])).is_err()
        );
    }

    #[test]
    fn test_protocol() {
        let p = BucketAccessClassParameters::parse(&params(&[("signedprotocol", "https")])).unwrap();
        assert_eq!(p.signed_protocol, SasProtocol::Https);
        let p =
            BucketAccessClassParameters::parse(&params(&[("signedprotocol", "HTTPS, HTTP")])).unwrap();
        assert_eq!(p.signed_protocol, SasProtocol::HttpsAndHttp);
        assert!(BucketAccessClassParameters::parse(&params(&[("signedprotocol", "ftp")])).is_err());
    }

    #[test]
    fn test_ip_range() {
        let p = BucketAccessClassParameters::parse(&params(&[("signedipfield", "10.0.0.1")])).unwrap();
        assert_eq!(p.signed_ip.unwrap().to_string(), "10.0.0.1");

        let p = BucketAccessClassParameters::parse(&params(&[(
            "signedipfield",
            "10.0.0.1-10.0.0.255",
        )]))
        .unwrap();
        assert_eq!(p.signed_ip.unwrap().to_string(), "10.0.0.1-10.0.0.255");

        assert!(BucketAccessClassParameters::parse(&params(&[("signedipfield", "nope")])).is_err());
        assert!(
            BucketAccessClassParameters::parse(&params(&[("signedipfield", "1.1.1.1-2.2.2.2-3.3.3.3")]))
                .is_err()
        );
    }

    #[test]
    fn test_signed_start_formats() {
        let p = BucketAccessClassParameters::parse(&params(&[("signedstart", "2024-01-02")])).unwrap();
        assert_eq!(
            p.signed_start,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );

        let p = BucketAccessClassParameters::parse(&params(&[(
            "signedstart",
            "2024-01-02T03:04:05Z",
        )]))
        .unwrap();
        assert_eq!(
            p.signed_start,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );

        let p = BucketAccessClassParameters::parse(&params(&[("signedstart", "2024-01-02T03:04Z")]))
            .unwrap();
        assert_eq!(
            p.signed_start,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap())
        );

        assert!(BucketAccessClassParameters::parse(&params(&[("signedstart", "tomorrow")])).is_err());
    }

    #[test]
    fn test_validation_period() {
        let p = BucketAccessClassParameters::parse(&params(&[("validationperiod", "86400000")]))
            .unwrap();
        assert_eq!(p.validation_period_ms, 86_400_000);
        assert!(BucketAccessClassParameters::parse(&params(&[("validationperiod", "1d")])).is_err());
        assert!(BucketAccessClassParameters::parse(&params(&[("validationperiod", "0")])).is_err());
    }

    #[test]
    fn test_unit_type_only_when_given() {
        let p = BucketAccessClassParameters::parse(&params(&[("bucketunittype", "storageaccount")]))
            .unwrap();
        assert_eq!(p.bucket_unit_type, Some(BucketUnitType::StorageAccount));
        let p = BucketAccessClassParameters::parse(&params(&[("bucketunittype", "")])).unwrap();
        assert_eq!(p.bucket_unit_type, Some(BucketUnitType::Container));
    }

    #[test]
    fn test_signed_version() {
        let p = BucketAccessClassParameters::parse(&params(&[("signedversion", "2021-08-06")]))
            .unwrap();
        assert_eq!(p.signed_version, "2021-08-06");
        let p = BucketAccessClassParameters::parse(&params(&[("signedversion", MIN_SAS_VERSION)]))
            .unwrap();
        assert_eq!(p.signed_version, MIN_SAS_VERSION);
        let p = BucketAccessClassParameters::parse(&params(&[("signedversion", "")])).unwrap();
        assert!(p.signed_version.is_empty());

        for bad in ["2019-12-12", "2020-12-05", "garbage", "2021-8-6"] {
            let err = BucketAccessClassParameters::parse(&params(&[("signedversion", bad)]))
                .unwrap_err();
            assert!(err.is_invalid_argument(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_key_is_redacted_in_debug() {
        let p = BucketAccessClassParameters::parse(&params(&[("key", "c2VjcmV0")])).unwrap();
        assert_eq!(p.key, "c2VjcmV0");
        assert!(!format!("{:?}", p).contains("c2VjcmV0"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let map = params(&[
            ("signedpermissions", "rl"),
            ("enablewrite", "true"),
            ("signedresourcetypes", "o"),
            ("allowservicesignedresourcetypefield", "true"),
            ("validationperiod", "3600000"),
            ("signedstart", "2024-06-01"),
        ]);
        let a = BucketAccessClassParameters::parse(&map).unwrap();
        let b = BucketAccessClassParameters::parse(&map).unwrap();
        assert_eq!(a, b);
        assert!(a.enable_write);
        assert!(a.allow_service_resource_type);
        assert!(!a.allow_container_resource_type);
    }
}
