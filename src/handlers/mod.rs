//! HTTP handlers for the provisioner RPCs.
//!
//! Handlers are invoked by the dispatcher in [`crate::server`]. Each one
//! decodes its JSON request body, calls the [`crate::provisioner::Provisioner`],
//! and serializes the result.

pub mod access;
pub mod bucket;

use serde::de::DeserializeOwned;

use crate::errors::ProvisionError;

/// Decode a JSON request body. An empty body decodes as `{}`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ProvisionError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| ProvisionError::invalid_argument(format!("malformed request body: {}", e)))
}
