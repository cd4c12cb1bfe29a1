//! Axum router construction and RPC route mapping.
//!
//! RPC paths use the `/v1/buckets:<verb>` form. Axum treats `:` as the
//! start of a path parameter, so all four RPCs share the `/v1/:method`
//! route and [`handle_rpc`] dispatches on the captured method.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ProvisionError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the provisioner API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Azure Blob Bucket Provisioner API",
        version = "0.1.0",
        description = "Provisions Azure Blob containers and storage accounts and issues SAS URLs"
    ),
    paths(
        health_check,
        crate::handlers::bucket::create_bucket,
        crate::handlers::bucket::delete_bucket,
        crate::handlers::access::grant_access,
        crate::handlers::access::revoke_access,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Bucket", description = "Bucket lifecycle"),
        (name = "Access", description = "Bucket access grants"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all provisioner routes.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/v1/:method", post(handle_rpc));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date` and `server` headers to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Error responses carry their own request id.
    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("azblob-provisioner"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok", "buckets": <n>}`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "buckets": state.provisioner.registry().len(),
    }))
}

/// `GET /openapi.json`
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- RPC dispatch ------------------------------------------------------------

/// `POST /v1/:method` -- dispatches on `buckets:<verb>`.
async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    body: axum::body::Bytes,
) -> Result<Response, ProvisionError> {
    match method.as_str() {
        "buckets:create" => crate::handlers::bucket::create_bucket(state, &body).await,
        "buckets:delete" => crate::handlers::bucket::delete_bucket(state, &body).await,
        "buckets:grantAccess" => crate::handlers::access::grant_access(state, &body).await,
        "buckets:revokeAccess" => crate::handlers::access::revoke_access(state, &body).await,
        _ => Err(ProvisionError::NotFound {
            resource: format!("method /v1/{}", method),
        }),
    }
}
