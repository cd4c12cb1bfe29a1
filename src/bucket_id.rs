//! Opaque bucket identifiers.
//!
//! A [`BucketId`] names the subscription, resource group and blob URL that
//! back a bucket. On the wire it is base64-encoded JSON; callers treat the
//! string as opaque and only this module decodes it. The record carries a
//! version field so fields can be added later; records without one were
//! written by earlier drivers and decode as version 1.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ProvisionError;

/// Version written by [`BucketId::encode`].
pub const CURRENT_VERSION: u32 = 1;

/// A parsed blob service URL: account endpoint plus optional container and
/// blob segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUrl {
    endpoint: String,
    account: String,
    container: Option<String>,
    blob: Option<String>,
}

impl BlobUrl {
    /// Parse `https://<account>.blob.<suffix>/[<container>[/<blob>]]`.
    pub fn parse(raw: &str) -> Result<Self, ProvisionError> {
        let malformed = |reason: &str| ProvisionError::MalformedBucketId {
            reason: format!("{}: {}", reason, raw),
        };

        let url = Url::parse(raw).map_err(|e| malformed(&format!("invalid url ({})", e)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(malformed("unsupported scheme"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(malformed("unexpected query or fragment"));
        }
        let host = url.host_str().ok_or_else(|| malformed("missing host"))?;
        let account = match host.split_once(".blob.") {
            Some((account, suffix)) if !account.is_empty() && !suffix.is_empty() => account,
            _ => return Err(malformed("host is not a blob service endpoint")),
        };

        let endpoint = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let path = url.path().trim_start_matches('/');
        let (container, blob) = match path.split_once('/') {
            Some((c, b)) => (c, b),
            None => (path, ""),
        };

        Ok(BlobUrl {
            endpoint,
            account: account.to_string(),
            container: non_empty(container),
            blob: non_empty(blob),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    /// Account endpoint without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Account endpoint with a trailing slash.
    pub fn account_url(&self) -> String {
        format!("{}/", self.endpoint)
    }
}

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.container, &self.blob) {
            (None, _) => write!(f, "{}/", self.endpoint),
            (Some(c), None) => write!(f, "{}/{}", self.endpoint, c),
            (Some(c), Some(b)) => write!(f, "{}/{}/{}", self.endpoint, c, b),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Decoded bucket identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketId {
    pub subscription_id: String,
    pub resource_group: String,
    pub url: BlobUrl,
}

#[derive(Serialize, Deserialize)]
struct BucketIdRecord {
    #[serde(default = "legacy_version")]
    version: u32,
    #[serde(rename = "subscriptionID")]
    subscription_id: String,
    #[serde(rename = "resourceGroup")]
    resource_group: String,
    url: String,
}

fn legacy_version() -> u32 {
    1
}

impl BucketId {
    /// Encode into the opaque wire form.
    pub fn encode(&self) -> Result<String, ProvisionError> {
        let record = BucketIdRecord {
            version: CURRENT_VERSION,
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            url: self.url.to_string(),
        };
        let json = serde_json::to_vec(&record)
            .map_err(|e| ProvisionError::Internal(anyhow::anyhow!("encode bucket id: {}", e)))?;
        Ok(BASE64.encode(json))
    }

    /// Decode an opaque ID. Anything this codec did not produce is rejected.
    pub fn decode(encoded: &str) -> Result<Self, ProvisionError> {
        if encoded.is_empty() {
            return Err(ProvisionError::invalid_argument("bucket id is empty"));
        }
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| ProvisionError::MalformedBucketId {
                reason: format!("not base64: {}", e),
            })?;
        let record: BucketIdRecord =
            serde_json::from_slice(&bytes).map_err(|e| ProvisionError::MalformedBucketId {
                reason: format!("not a bucket id record: {}", e),
            })?;
        if record.version == 0 || record.version > CURRENT_VERSION {
            return Err(ProvisionError::MalformedBucketId {
                reason: format!("unsupported version {}", record.version),
            });
        }
        Ok(BucketId {
            subscription_id: record.subscription_id,
            resource_group: record.resource_group,
            url: BlobUrl::parse(&record.url)?,
        })
    }
}
