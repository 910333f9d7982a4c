//! REST API handlers.
//!
//! Each handler submits one operation to the gateway and returns a JSON
//! envelope. Gateway errors map to 400 (invalid input), 404 (unknown
//! record), or 503 (writer gone).

use axum::Json;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use scanward_gateway::GatewayError;
use scanward_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// `Json` extractor whose rejections use the API envelope and are counted.
pub struct ApiJson<T>(pub T);

impl<T> FromRequest<ApiState> for ApiJson<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &ApiState) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                state.gateway.metrics().record_rejected_request();
                debug!(status = %rejection.status(), "rejected request body");
                Err(error_response(&rejection.body_text(), rejection.status()).into_response())
            }
        }
    }
}

fn gateway_error(state: &ApiState, err: GatewayError) -> Response {
    let status = match &err {
        GatewayError::Model(ModelError::Validation(_) | ModelError::InvalidArgument(_)) => {
            StatusCode::BAD_REQUEST
        }
        GatewayError::Model(ModelError::NotFound(_)) => StatusCode::NOT_FOUND,
        GatewayError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_client_error() {
        state.gateway.metrics().record_rejected_request();
    }
    error_response(&err.to_string(), status).into_response()
}

// ── Pods ───────────────────────────────────────────────────────

/// POST /api/v1/pods
pub async fn add_pod(
    State(state): State<ApiState>,
    ApiJson(pod): ApiJson<Pod>,
) -> impl IntoResponse {
    let name = pod.qualified_name();
    match state.gateway.add_pod(pod).await {
        Ok(()) => ApiResponse::ok(name).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

/// PUT /api/v1/pods
pub async fn update_pod(
    State(state): State<ApiState>,
    ApiJson(pod): ApiJson<Pod>,
) -> impl IntoResponse {
    let name = pod.qualified_name();
    match state.gateway.update_pod(pod).await {
        Ok(()) => ApiResponse::ok(name).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

/// DELETE /api/v1/pods/{namespace}/{name}
pub async fn delete_pod(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    // Watchers replay deletes after a re-list, so an unknown pod is not an error.
    match state.gateway.delete_pod(qualified_name(&namespace, &name)).await {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => ApiResponse::ok("not found").into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

/// PUT /api/v1/allpods
pub async fn replace_all_pods(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<AllPods>,
) -> impl IntoResponse {
    let count = body.pods.len();
    match state.gateway.replace_all_pods(body.pods).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({ "pods": count })).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

// ── Images ─────────────────────────────────────────────────────

/// POST /api/v1/images
pub async fn add_image(
    State(state): State<ApiState>,
    ApiJson(image): ApiJson<Image>,
) -> impl IntoResponse {
    let sha = image.sha.clone();
    match state.gateway.add_image(image).await {
        Ok(()) => ApiResponse::ok(sha).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

/// PUT /api/v1/allimages
pub async fn replace_all_images(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<AllImages>,
) -> impl IntoResponse {
    let count = body.images.len();
    match state.gateway.replace_all_images(body.images).await {
        Ok(removed) => {
            ApiResponse::ok(serde_json::json!({ "images": count, "removed": removed }))
                .into_response()
        }
        Err(e) => gateway_error(&state, e),
    }
}

// ── Scanner workers ────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NextImageQuery {
    pub worker: Option<String>,
}

/// GET|POST /api/v1/nextimage
///
/// No work is a normal 200 with `imageSpec: null`.
pub async fn next_image(
    State(state): State<ApiState>,
    Query(query): Query<NextImageQuery>,
) -> impl IntoResponse {
    match state.gateway.next_image(query.worker).await {
        Ok(next) => ApiResponse::ok(next).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

/// POST /api/v1/finishedscan
///
/// Stale and unknown digests are accepted; the writer logs and counts them.
pub async fn finished_scan(
    State(state): State<ApiState>,
    ApiJson(job): ApiJson<FinishedScan>,
) -> impl IntoResponse {
    if job.digest.is_empty() {
        state.gateway.metrics().record_rejected_request();
        return error_response("digest must not be empty", StatusCode::BAD_REQUEST)
            .into_response();
    }
    match state.gateway.finish_scan(job).await {
        Ok(()) => ApiResponse::ok("accepted").into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

// ── Control & diagnostics ──────────────────────────────────────

/// PUT /api/v1/concurrentscanlimit
pub async fn set_concurrency_limit(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<SetConcurrencyLimit>,
) -> impl IntoResponse {
    match state.gateway.set_concurrency_limit(body.limit).await {
        Ok(()) => ApiResponse::ok(body).into_response(),
        Err(e) => {
            warn!(limit = body.limit, error = %e, "concurrent scan limit rejected");
            gateway_error(&state, e)
        }
    }
}

/// GET /api/v1/scanresults
pub async fn scan_results(State(state): State<ApiState>) -> impl IntoResponse {
    match state.gateway.scan_results().await {
        Ok(results) => ApiResponse::ok(results).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

/// GET /api/v1/model
pub async fn get_model(State(state): State<ApiState>) -> impl IntoResponse {
    match state.gateway.snapshot().await {
        Ok(snapshot) => ApiResponse::ok(snapshot).into_response(),
        Err(e) => gateway_error(&state, e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = scanward_metrics::render_prometheus(&state.gateway.metrics().report());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
