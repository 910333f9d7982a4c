//! scanward-api — REST API for Scanward.
//!
//! Binds every gateway operation to an HTTP route. Handlers only translate
//! between JSON and gateway calls; all state lives behind the gateway.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/pods` | Add a pod |
//! | PUT | `/api/v1/pods` | Update a pod |
//! | DELETE | `/api/v1/pods/{namespace}/{name}` | Delete a pod |
//! | POST | `/api/v1/images` | Add an image |
//! | PUT | `/api/v1/allpods` | Replace the full pod set |
//! | PUT | `/api/v1/allimages` | Replace the full image set |
//! | GET, POST | `/api/v1/nextimage` | Claim the next image to scan |
//! | POST | `/api/v1/finishedscan` | Report a finished scan |
//! | PUT | `/api/v1/concurrentscanlimit` | Set the concurrency budget |
//! | GET | `/api/v1/scanresults` | Fully scanned pods and images |
//! | GET | `/api/v1/model` | Full model snapshot |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use axum::Router;
use axum::routing::{delete, get, post, put};
use scanward_gateway::Gateway;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub gateway: Gateway,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(gateway: Gateway) -> Router {
    let api_state = ApiState { gateway };

    let api_routes = Router::new()
        .route("/pods", post(handlers::add_pod).put(handlers::update_pod))
        .route("/pods/{namespace}/{name}", delete(handlers::delete_pod))
        .route("/images", post(handlers::add_image))
        .route("/allpods", put(handlers::replace_all_pods))
        .route("/allimages", put(handlers::replace_all_images))
        .route("/nextimage", get(handlers::next_image).post(handlers::next_image))
        .route("/finishedscan", post(handlers::finished_scan))
        .route("/concurrentscanlimit", put(handlers::set_concurrency_limit))
        .route("/scanresults", get(handlers::scan_results))
        .route("/model", get(handlers::get_model))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}
