//! GET /api/costs — the credits dashboard feed.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use valet_providers::ModelSpend;

use crate::state::AppState;

use super::auth::validate_request;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowReport {
    spent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    budget: Option<f64>,
    warning: bool,
    exceeded: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CostsReport {
    enabled: bool,
    daily: WindowReport,
    monthly: WindowReport,
    total_requests: usize,
    top_models: Vec<ModelSpend>,
}

fn window(spent: f64, budget: Option<f64>, warning_threshold: f64) -> WindowReport {
    WindowReport {
        spent,
        budget,
        warning: budget.map_or(false, |b| spent >= b * warning_threshold),
        exceeded: budget.map_or(false, |b| spent > b),
    }
}

pub async fn costs_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !validate_request(&headers, None, state.api_token_hash.as_deref()) {
        return (axum::http::StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let budget_cfg = state.budget.config();
    let report = CostsReport {
        enabled: budget_cfg.daily_usd.is_some() || budget_cfg.monthly_usd.is_some(),
        daily: window(
            state.costs.daily_spend(),
            budget_cfg.daily_usd,
            budget_cfg.warning_threshold,
        ),
        monthly: window(
            state.costs.monthly_spend(),
            budget_cfg.monthly_usd,
            budget_cfg.warning_threshold,
        ),
        total_requests: state.costs.total_requests(),
        top_models: state.costs.top_models(5),
    };
    Json(report).into_response()
}
