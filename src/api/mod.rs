//! REST API module using Axum
//!
//! Transport for the tool health pipeline. Every response uses the
//! [`envelope`] shape; malformed readings (including unknown metric keys)
//! are rejected here, before they reach the pipeline.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable holding a comma-separated list of allowed origins
pub const CORS_ORIGINS_ENV: &str = "SENTINEL_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `SENTINEL_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for a separately served dashboard (e.g. `http://localhost:3000`).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/v1", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
