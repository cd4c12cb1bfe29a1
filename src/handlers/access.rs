//! Bucket access grant/revoke handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use super::parse_body;
use crate::errors::ProvisionError;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessRequest {
    #[serde(default)]
    pub bucket_id: String,
    /// Name of the access being granted. Informational.
    #[serde(default)]
    pub name: Option<String>,
    /// Bucket access class parameters.
    #[serde(default)]
    pub parameters: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessResponse {
    /// Account endpoint the SAS URL applies to.
    pub account_id: String,
    pub sas_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAccessRequest {
    #[serde(default)]
    pub bucket_id: String,
    #[serde(default)]
    pub account_id: String,
}

/// `POST /v1/buckets:grantAccess` -- Issue a SAS URL for a bucket.
#[utoipa::path(
    post,
    path = "/v1/buckets:grantAccess",
    tag = "Access",
    operation_id = "GrantBucketAccess",
    request_body = GrantAccessRequest,
    responses(
        (status = 200, description = "Access granted", body = GrantAccessResponse),
        (status = 400, description = "Invalid parameters or bucket ID"),
        (status = 404, description = "Storage account not found"),
        (status = 502, description = "Signing failed")
    )
)]
pub async fn grant_access(state: Arc<AppState>, body: &[u8]) -> Result<Response, ProvisionError> {
    let req: GrantAccessRequest = parse_body(body)?;
    let parameters = req.parameters.unwrap_or_default();
    let grant = state
        .provisioner
        .grant_access(&req.bucket_id, &parameters)
        .await?;
    if let Some(name) = req.name.as_deref() {
        debug!("Granted access {} on {}", name, grant.account_id);
    }
    Ok(Json(GrantAccessResponse {
        account_id: grant.account_id,
        sas_url: grant.sas_url,
    })
    .into_response())
}

/// `POST /v1/buckets:revokeAccess` -- Revoke a previous grant.
#[utoipa::path(
    post,
    path = "/v1/buckets:revokeAccess",
    tag = "Access",
    operation_id = "RevokeBucketAccess",
    request_body = RevokeAccessRequest,
    responses(
        (status = 200, description = "Revocation accepted"),
        (status = 400, description = "Invalid bucket or account ID")
    )
)]
pub async fn revoke_access(state: Arc<AppState>, body: &[u8]) -> Result<Response, ProvisionError> {
    let req: RevokeAccessRequest = parse_body(body)?;
    state
        .provisioner
        .revoke_access(&req.bucket_id, &req.account_id)
        .await?;
    Ok(Json(serde_json::json!({})).into_response())
}
