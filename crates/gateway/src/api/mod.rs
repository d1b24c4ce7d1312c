//! HTTP/WebSocket surface.

pub mod auth;
pub mod costs;
pub mod files;
pub mod server_state;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/costs", get(costs::costs_handler))
        .route("/api/files", get(files::files_handler))
        .route("/api/state", get(server_state::state_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
