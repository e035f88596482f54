use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use kist_store::StoreError;

use crate::error::ServerError;
use crate::state::AppState;

/// GET /contents/{content_id} — metadata record as JSON.
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Result<Response, ServerError> {
    let record = state.store().get_metadata(&content_id).await?;
    Ok(axum::Json(record).into_response())
}

#[derive(serde::Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

/// POST /contents/{content_id}/rename — set the metadata document's
/// `fileName`, repairing an unparseable document in passing.
///
/// The response body always carries the `{success, error?}` contract.
pub async fn rename(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    axum::Json(req): axum::Json<RenameRequest>,
) -> Response {
    match state
        .store()
        .rename_content(&content_id, &req.new_name)
        .await
    {
        Ok(()) => axum::Json(serde_json::json!({ "success": true })).into_response(),
        Err(StoreError::ContentNotFound(_)) => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({
                "success": false,
                "error": format!("Content not found: '{content_id}'"),
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({
                "success": false,
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize)]
pub struct PinRequest {
    pub pinned: bool,
}

/// PUT /contents/{content_id}/pinned — idempotent pin/unpin toggle.
pub async fn set_pinned(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    axum::Json(req): axum::Json<PinRequest>,
) -> Result<Response, ServerError> {
    state.store().set_pinned(&content_id, req.pinned).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE /contents/{content_id} — explicit deletion, pinned included.
pub async fn delete_content(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Result<Response, ServerError> {
    state.store().delete_content(&content_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /sessions/{session_id}/end — retention sweep for an ended session.
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ServerError> {
    let sweep = state.store().end_session(&session_id).await?;
    Ok(axum::Json(sweep).into_response())
}
