use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use kist_store::{declared_length, StoreError};

use crate::error::ServerError;
use crate::state::AppState;

/// GET /contents/{content_id}/download — reconstruct and stream a content.
///
/// The Content-Length is announced from the padding-model formula before the
/// first byte is read; the store compares bytes actually sent against it
/// after the stream ends and surfaces a divergence as an integrity
/// diagnostic.
pub async fn download(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
) -> Result<Response, ServerError> {
    let record = state.store().get_metadata(&content_id).await?;

    if !record.is_large_file {
        return Err(ServerError::BadRequest(format!(
            "content '{content_id}' is not a large-file item"
        )));
    }
    if !record.is_complete {
        return Err(ServerError::BadRequest(format!(
            "content '{content_id}' is not complete"
        )));
    }

    let declared = declared_length(record.total_size, record.total_chunks);
    let filename = sanitize_filename(&record.resolved_filename());
    let content_type = if record.content_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        record.content_type.clone()
    };

    // The streamer runs in its own task feeding the response body channel;
    // dropping the body (client disconnect) closes the channel and stops it.
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(8);
    let stream_state = state.clone();
    let stream_id = content_id.clone();
    tokio::spawn(async move {
        match stream_state
            .store()
            .stream_for_download(&stream_id, tx)
            .await
        {
            Ok(_) | Err(StoreError::DownloadAborted) => {}
            Err(e) => {
                tracing::warn!(content_id = %stream_id, error = %e, "download stream failed mid-flight");
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>));
    Ok((
        StatusCode::OK,
        [
            ("Content-Length", declared.to_string()),
            ("Content-Type", content_type),
            (
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// Keep the quoted-string form of Content-Disposition well-formed: quotes,
/// backslashes, and control bytes become underscores.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '"' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}
