//! Shared Key SAS signing.
//!
//! Builds the account SAS and container service SAS string-to-sign,
//! signs it with HMAC-SHA256 keyed by the base64-decoded account key, and
//! renders the signed query string:
//!
//! ```text
//! account:   sv, ss, srt, spr, st, se, sip, sp, sig
//! container: sv, spr, st, se, sip, sr, sp, sig
//! ```

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;

use super::backend::{BackendError, SharedKeyCredential};
use super::signature::{format_sas_time, SasScope, SasSignatureValues};

type HmacSha256 = Hmac<Sha256>;

/// Service version used when the caller does not pin one.
pub const DEFAULT_SAS_VERSION: &str = "2021-08-06";

/// Oldest service version whose string-to-sign layout this module produces.
pub const MIN_SAS_VERSION: &str = "2020-12-06";

/// Query values keep unreserved characters literal.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Decode a base64 account key.
pub fn decode_account_key(key: &str) -> Result<Vec<u8>, BackendError> {
    BASE64_STANDARD
        .decode(key)
        .map_err(|e| BackendError::InvalidCredential(e.to_string()))
}

/// HMAC-SHA256 `string_to_sign` and base64 the digest.
pub fn compute_signature(key_bytes: &[u8], string_to_sign: &str) -> Result<String, BackendError> {
    let mut mac = HmacSha256::new_from_slice(key_bytes)
        .map_err(|e| BackendError::InvalidCredential(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

fn effective_version(values: &SasSignatureValues) -> &str {
    if values.version.is_empty() {
        DEFAULT_SAS_VERSION
    } else {
        &values.version
    }
}

fn ip_string(values: &SasSignatureValues) -> String {
    values.ip_range.map(|r| r.to_string()).unwrap_or_default()
}

/// String-to-sign for an account SAS over the blob service.
pub fn account_string_to_sign(account: &str, values: &SasSignatureValues) -> String {
    [
        account,
        values.permissions.to_account_string().as_str(),
        "b",
        values.resource_types.to_string().as_str(),
        format_sas_time(&values.start).as_str(),
        format_sas_time(&values.expiry).as_str(),
        ip_string(values).as_str(),
        values.protocol.as_str(),
        effective_version(values),
        "",
        "",
    ]
    .join("\n")
}

/// String-to-sign for a container service SAS.
pub fn container_string_to_sign(
    account: &str,
    container: &str,
    values: &SasSignatureValues,
) -> String {
    let canonical_resource = format!("/blob/{}/{}", account, container);
    [
        values.permissions.to_container_string().as_str(),
        format_sas_time(&values.start).as_str(),
        format_sas_time(&values.expiry).as_str(),
        canonical_resource.as_str(),
        "",
        ip_string(values).as_str(),
        values.protocol.as_str(),
        effective_version(values),
        "c",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
    ]
    .join("\n")
}

fn push_param(out: &mut Vec<String>, name: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push(format!(
        "{}={}",
        name,
        utf8_percent_encode(value, QUERY_ENCODE_SET)
    ));
}

/// Sign `values` and return the encoded query string.
pub fn sign_sas(
    credential: &SharedKeyCredential,
    values: &SasSignatureValues,
) -> Result<String, BackendError> {
    let key_bytes = decode_account_key(&credential.account_key)?;

    let (string_to_sign, permissions) = match &values.scope {
        SasScope::Account => (
            account_string_to_sign(&credential.account_name, values),
            values.permissions.to_account_string(),
        ),
        SasScope::Container { name } => (
            container_string_to_sign(&credential.account_name, name, values),
            values.permissions.to_container_string(),
        ),
    };
    let signature = compute_signature(&key_bytes, &string_to_sign)?;

    let mut params = Vec::new();
    push_param(&mut params, "sv", effective_version(values));
    if values.scope == SasScope::Account {
        push_param(&mut params, "ss", "b");
        push_param(&mut params, "srt", &values.resource_types.to_string());
    }
    push_param(&mut params, "spr", values.protocol.as_str());
    push_param(&mut params, "st", &format_sas_time(&values.start));
    push_param(&mut params, "se", &format_sas_time(&values.expiry));
    push_param(&mut params, "sip", &ip_string(values));
    if let SasScope::Container { .. } = values.scope {
        push_param(&mut params, "sr", "c");
    }
    push_param(&mut params, "sp", &permissions);
    push_param(&mut params, "sig", &signature);
    Ok(params.join("&"))
}
