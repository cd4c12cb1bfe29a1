//! Bucket create/delete handlers.

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
pub struct CreateBucketRequest {
    /// Bucket name; also the container name for container buckets.
    #[serde(default)]
    pub name: String,
    /// Bucket class parameters. Required.
    #[serde(default)]
    pub parameters: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketResponse {
    /// Opaque bucket ID.
    pub bucket_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBucketRequest {
    #[serde(default)]
    pub bucket_id: String,
}

/// `POST /v1/buckets:create` -- Provision a bucket.
#[utoipa::path(
    post,
    path = "/v1/buckets:create",
    tag = "Bucket",
    operation_id = "CreateBucket",
    request_body = CreateBucketRequest,
    responses(
        (status = 200, description = "Bucket created or already present", body = CreateBucketResponse),
        (status = 400, description = "Invalid parameters"),
        (status = 409, description = "Bucket exists with different parameters"),
        (status = 502, description = "Storage backend failure")
    )
)]
pub async fn create_bucket(state: Arc<AppState>, body: &[u8]) -> Result<Response, ProvisionError> {
    let req: CreateBucketRequest = parse_body(body)?;
    debug!("CreateBucket request for {}", req.name);
    let bucket_id = state
        .provisioner
        .create_bucket(&req.name, req.parameters.as_ref())
        .await?;
    Ok(Json(CreateBucketResponse { bucket_id }).into_response())
}

/// `POST /v1/buckets:delete` -- Delete a bucket by ID.
#[utoipa::path(
    post,
    path = "/v1/buckets:delete",
    tag = "Bucket",
    operation_id = "DeleteBucket",
    request_body = DeleteBucketRequest,
    responses(
        (status = 200, description = "Bucket deleted"),
        (status = 400, description = "Malformed bucket ID or blob-level ID"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn delete_bucket(state: Arc<AppState>, body: &[u8]) -> Result<Response, ProvisionError> {
    let req: DeleteBucketRequest = parse_body(body)?;
    state.provisioner.delete_bucket(&req.bucket_id).await?;
    Ok(Json(serde_json::json!({})).into_response())
}
