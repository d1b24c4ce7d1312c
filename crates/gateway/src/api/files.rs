//! GET /api/files?path=… — workspace-rooted binary download.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use valet_tools::file_ops::resolve_in_workspace;

use crate::state::AppState;

use super::auth::validate_request;

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub path: String,
}

pub async fn files_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FilesQuery>,
) -> impl IntoResponse {
    if !validate_request(&headers, None, state.api_token_hash.as_deref()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let path = match resolve_in_workspace(&state.workspace, &query.path) {
        Ok(p) => p,
        Err(e) => return (StatusCode::FORBIDDEN, e).into_response(),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".into());
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, format!("not found: {}", query.path)).into_response(),
    }
}
