use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

use kist_store::{ContentRecord, SaveChunkRequest};

use crate::error::ServerError;
use crate::state::AppState;

/// Envelope fields riding alongside one chunk delivery.
#[derive(serde::Deserialize)]
pub struct ChunkQuery {
    pub session_id: String,
    pub total_chunks: u32,
    /// Declared plaintext byte count for the whole content.
    pub total_size: u64,
    /// Per-chunk IV, hex encoded.
    pub iv: String,
    pub content_type: Option<String>,
    #[serde(default)]
    pub is_large_file: bool,
}

/// PUT /contents/{content_id}/chunks/{index} — store one ciphertext chunk.
///
/// Streams the request body with the size cap enforced mid-read, so an
/// oversized upload is rejected without buffering it whole. 201 on first
/// write of the index, 204 on an idempotent overwrite.
pub async fn save_chunk(
    State(state): State<AppState>,
    Path((content_id, index)): Path<(String, u32)>,
    Query(query): Query<ChunkQuery>,
    headers: axum::http::HeaderMap,
    body: axum::body::Body,
) -> Result<Response, ServerError> {
    let iv = hex::decode(&query.iv)
        .map_err(|e| ServerError::BadRequest(format!("invalid iv hex: {e}")))?;

    let cap = state.inner.config.max_chunk_bytes;

    // Cap pre-check using Content-Length if available; the read loop below
    // still enforces it for bodies without one.
    if cap > 0 {
        if let Some(content_length) = headers
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            if content_length > cap {
                return Err(ServerError::PayloadTooLarge(format!(
                    "chunk of {content_length} bytes exceeds {cap} byte limit"
                )));
            }
        }
    }
    let bytes = {
        let stream = body.into_data_stream();
        let stream = TryStreamExt::map_err(stream, std::io::Error::other);
        let mut reader = StreamReader::new(stream);

        let mut data: Vec<u8> = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).await.map_err(ServerError::from)?;
            if n == 0 {
                break;
            }
            if cap > 0 && (data.len() + n) as u64 > cap {
                return Err(ServerError::PayloadTooLarge(format!(
                    "chunk exceeds {cap} byte limit"
                )));
            }
            data.extend_from_slice(&buf[..n]);
        }
        data
    };

    let outcome = state
        .store()
        .save_chunk(
            SaveChunkRequest {
                content_id,
                session_id: query.session_id,
                chunk_index: index,
                total_chunks: query.total_chunks,
                total_size: query.total_size,
                content_type: query.content_type,
                is_large_file: query.is_large_file,
                iv,
            },
            &bytes,
        )
        .await?;

    let status = if outcome.overwritten {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CREATED
    };
    Ok(status.into_response())
}

/// PUT /contents/{content_id} — register or update metadata (upsert).
pub async fn save_content(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    axum::Json(mut record): axum::Json<ContentRecord>,
) -> Result<Response, ServerError> {
    if record.content_id.is_empty() {
        record.content_id = content_id;
    } else if record.content_id != content_id {
        return Err(ServerError::BadRequest(
            "content id in path and body disagree".into(),
        ));
    }

    state.store().save_content(record).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /contents/{content_id}/complete — explicit completion marker.
pub async fn mark_complete(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Result<Response, ServerError> {
    state.store().set_complete(&content_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
