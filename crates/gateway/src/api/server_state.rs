//! GET /api/state — ladder position and gardener counters for debugging.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use valet_providers::LadderState;

use crate::gardener::GardenerSnapshot;
use crate::state::AppState;

use super::auth::validate_request;

#[derive(Serialize)]
struct StateReport {
    ladder: LadderState,
    degraded: bool,
    gardener: GardenerSnapshot,
    providers: Vec<String>,
}

pub async fn state_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !validate_request(&headers, None, state.api_token_hash.as_deref()) {
        return (axum::http::StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    Json(StateReport {
        ladder: state.ladder.state(),
        degraded: state.ladder.is_degraded(),
        gardener: state.gardener_stats.snapshot(),
        providers: state.ladder.registry().list_providers(),
    })
    .into_response()
}
