use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use kist_store::IV_SIZE;

use crate::config::ServerSection;
use crate::state::AppState;

pub const TEST_TOKEN: &str = "test-token";

/// Create a wired-up router and AppState backed by a temp directory.
pub fn setup_app(max_chunk_bytes: u64) -> (Router, AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create tempdir");

    let config = ServerSection {
        data_dir: tmp.path().to_string_lossy().into_owned(),
        token: TEST_TOKEN.to_string(),
        max_chunk_bytes,
        ..Default::default()
    };

    let state = AppState::new(config).expect("open store");
    let router = super::router(state.clone());
    (router, state, tmp)
}

/// Deterministic per-index test IV.
pub fn test_iv(index: u32) -> [u8; IV_SIZE] {
    [index as u8; IV_SIZE]
}

/// Dispatch a raw request through the router.
pub async fn send(router: Router, req: Request<Body>) -> axum::response::Response {
    router.oneshot(req).await.unwrap()
}

/// Send an authenticated PUT request with the given body bytes.
pub async fn authed_put(router: Router, path: &str, body: Vec<u8>) -> axum::response::Response {
    let req = Request::builder()
        .method("PUT")
        .uri(path)
        .header("Authorization", format!("Bearer {TEST_TOKEN}"))
        .header("Content-Length", body.len().to_string())
        .body(Body::from(body))
        .unwrap();

    send(router, req).await
}

/// Send an authenticated PUT request with a JSON body.
pub async fn authed_put_json(
    router: Router,
    path: &str,
    body: Vec<u8>,
) -> axum::response::Response {
    let req = Request::builder()
        .method("PUT")
        .uri(path)
        .header("Authorization", format!("Bearer {TEST_TOKEN}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    send(router, req).await
}

/// Send an authenticated GET request.
pub async fn authed_get(router: Router, path: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .header("Authorization", format!("Bearer {TEST_TOKEN}"))
        .body(Body::empty())
        .unwrap();

    send(router, req).await
}

/// Send an authenticated POST request with a JSON body.
pub async fn authed_post(router: Router, path: &str, body: Vec<u8>) -> axum::response::Response {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("Authorization", format!("Bearer {TEST_TOKEN}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    send(router, req).await
}

/// Send an authenticated DELETE request.
pub async fn authed_delete(router: Router, path: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("DELETE")
        .uri(path)
        .header("Authorization", format!("Bearer {TEST_TOKEN}"))
        .body(Body::empty())
        .unwrap();

    send(router, req).await
}

/// Upload one chunk of a large-file content in session `s1`.
pub async fn put_chunk(
    router: Router,
    content_id: &str,
    index: u32,
    total: u32,
    cipher: &[u8],
) -> axum::response::Response {
    let total_size = u64::from(total) * cipher.len() as u64;
    put_chunk_sized(router, content_id, index, total, total_size, cipher).await
}

/// Upload one chunk with an explicit declared plaintext size.
pub async fn put_chunk_sized(
    router: Router,
    content_id: &str,
    index: u32,
    total: u32,
    total_size: u64,
    cipher: &[u8],
) -> axum::response::Response {
    let uri = format!(
        "/contents/{content_id}/chunks/{index}?session_id=s1&total_chunks={total}\
         &total_size={total_size}&iv={}&is_large_file=true",
        hex::encode(test_iv(index))
    );
    authed_put(router, &uri, cipher.to_vec()).await
}

/// Upload one chunk of an inline (non-large-file) content.
pub async fn put_chunk_inline(
    router: Router,
    content_id: &str,
    index: u32,
    total: u32,
    cipher: &[u8],
) -> axum::response::Response {
    let total_size = u64::from(total) * cipher.len() as u64;
    let uri = format!(
        "/contents/{content_id}/chunks/{index}?session_id=s1&total_chunks={total}\
         &total_size={total_size}&iv={}",
        hex::encode(test_iv(index))
    );
    authed_put(router, &uri, cipher.to_vec()).await
}

/// Read full response body into `Vec<u8>`.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body")
        .to_vec()
}

/// Assert response has expected status.
pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "expected {expected}, got {}",
        response.status()
    );
}
