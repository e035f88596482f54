pub mod admin;
pub mod content;
pub mod download;
pub mod ingest;
#[cfg(test)]
pub mod test_helpers;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route(
            "/contents/{content_id}",
            axum::routing::get(content::get_metadata)
                .put(ingest::save_content)
                .delete(content::delete_content),
        )
        .route(
            "/contents/{content_id}/chunks/{index}",
            axum::routing::put(ingest::save_chunk),
        )
        .route(
            "/contents/{content_id}/complete",
            axum::routing::post(ingest::mark_complete),
        )
        .route(
            "/contents/{content_id}/download",
            axum::routing::get(download::download),
        )
        .route(
            "/contents/{content_id}/rename",
            axum::routing::post(content::rename),
        )
        .route(
            "/contents/{content_id}/pinned",
            axum::routing::put(content::set_pinned),
        )
        .route(
            "/sessions/{session_id}/end",
            axum::routing::post(content::end_session),
        )
        .route("/stats", axum::routing::get(admin::stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health endpoint is unauthenticated
    let public = Router::new().route("/health", axum::routing::get(admin::health));

    public
        .merge(authed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Access-scope check, delegated here at the boundary: the store itself
/// never implements authorization.
async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.inner.config.token.as_bytes();

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if provided.as_bytes().ct_eq(expected).into() {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "invalid or missing token").into_response()
    }
}
