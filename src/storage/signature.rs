//! Typed SAS signature values handed to the signing primitive.
//!
//! These mirror the axes of a shared access signature: permissions,
//! resource types, validity window, protocol, and client IP range.
//! Rendering to the single-letter wire forms happens here so every
//! backend emits the same canonical ordering.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

/// Permissions granted by a SAS token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub delete_previous_version: bool,
    pub list: bool,
    pub add: bool,
    pub create: bool,
    pub tag: bool,
    pub filter_by_tags: bool,
}

impl SasPermissions {
    /// Account SAS ordering (`rwdxlactf`).
    pub fn to_account_string(&self) -> String {
        let mut s = String::new();
        for (set, c) in [
            (self.read, 'r'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.delete_previous_version, 'x'),
            (self.list, 'l'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.tag, 't'),
            (self.filter_by_tags, 'f'),
        ] {
            if set {
                s.push(c);
            }
        }
        s
    }

    /// Container (service) SAS ordering (`racwdxltf`).
    pub fn to_container_string(&self) -> String {
        let mut s = String::new();
        for (set, c) in [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.delete_previous_version, 'x'),
            (self.list, 'l'),
            (self.tag, 't'),
            (self.filter_by_tags, 'f'),
        ] {
            if set {
                s.push(c);
            }
        }
        s
    }

    pub fn is_empty(&self) -> bool {
        self.to_account_string().is_empty()
    }
}

/// Resource levels an account SAS may address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SasResourceTypes {
    pub service: bool,
    pub container: bool,
    pub object: bool,
}

impl SasResourceTypes {
    pub fn all() -> Self {
        Self {
            service: true,
            container: true,
            object: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.service || self.container || self.object)
    }
}

impl fmt::Display for SasResourceTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.service {
            f.write_str("s")?;
        }
        if self.container {
            f.write_str("c")?;
        }
        if self.object {
            f.write_str("o")?;
        }
        Ok(())
    }
}

/// Protocols a SAS token may be used over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SasProtocol {
    Https,
    #[default]
    HttpsAndHttp,
}

impl SasProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SasProtocol::Https => "https",
            SasProtocol::HttpsAndHttp => "https,http",
        }
    }
}

/// A single client address or an inclusive address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub start: IpAddr,
    pub end: Option<IpAddr>,
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}", self.start),
        }
    }
}

/// What the token is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SasScope {
    /// Account SAS over the blob service.
    Account,
    /// Service SAS over a single container.
    Container { name: String },
}

/// Everything the signing primitive needs besides the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasSignatureValues {
    /// Signed service version. Empty selects the backend default.
    pub version: String,
    pub protocol: SasProtocol,
    pub start: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub permissions: SasPermissions,
    pub resource_types: SasResourceTypes,
    pub ip_range: Option<IpRange>,
    pub scope: SasScope,
}

/// Wire format for `st`/`se`: ISO 8601 UTC without fractional seconds.
pub fn format_sas_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
