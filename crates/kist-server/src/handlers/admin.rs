use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::state::AppState;

/// GET /health — unauthenticated liveness check.
pub async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /stats — store-wide totals.
pub async fn stats(State(state): State<AppState>) -> Result<Response, ServerError> {
    let content_root = state.inner.data_dir.join("content");

    let (contents, chunks, bytes) =
        tokio::task::spawn_blocking(move || count_store_stats(&content_root))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(axum::Json(serde_json::json!({
        "contents": contents,
        "chunks": chunks,
        "chunk_bytes": bytes,
        "uptime_seconds": state.inner.start_time.elapsed().as_secs(),
    }))
    .into_response())
}

/// Walk the content root counting records, chunk files, and chunk bytes.
fn count_store_stats(content_root: &std::path::Path) -> (u64, u64, u64) {
    let mut contents = 0u64;
    let mut chunks = 0u64;
    let mut bytes = 0u64;

    let entries = match std::fs::read_dir(content_root) {
        Ok(e) => e,
        Err(_) => return (0, 0, 0),
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        contents += 1;
        if let Ok(chunk_entries) = std::fs::read_dir(entry.path().join("chunks")) {
            for chunk in chunk_entries.flatten() {
                if let Ok(meta) = chunk.path().metadata() {
                    chunks += 1;
                    bytes += meta.len();
                }
            }
        }
    }
    (contents, chunks, bytes)
}
