use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem layout of the store: one directory per content under
/// `<data_dir>/content/`, holding `meta.json` and a `chunks/` directory with
/// one file per chunk index. Every piece is independently addressable, which
/// the completion tracker and restart recovery rely on.
#[derive(Debug, Clone)]
pub(crate) struct StoreLayout {
    data_dir: PathBuf,
}

impl StoreLayout {
    pub(crate) fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub(crate) fn content_root(&self) -> PathBuf {
        self.data_dir.join("content")
    }

    pub(crate) fn content_dir(&self, content_id: &str) -> PathBuf {
        self.content_root().join(content_id)
    }

    pub(crate) fn meta_path(&self, content_id: &str) -> PathBuf {
        self.content_dir(content_id).join("meta.json")
    }

    pub(crate) fn chunk_dir(&self, content_id: &str) -> PathBuf {
        self.content_dir(content_id).join("chunks")
    }

    pub(crate) fn chunk_path(&self, content_id: &str, index: u32) -> PathBuf {
        self.chunk_dir(content_id).join(index.to_string())
    }
}

/// Reject ids that could escape the data directory or collide with layout
/// entries. Ids are opaque but must be safe as a single path component.
pub(crate) fn validate_content_id(id: &str) -> Result<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidContentId(id.to_string()))
    }
}

pub(crate) fn validate_session_id(id: &str) -> Result<()> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidSessionId(id.to_string()))
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id != "."
        && id != ".."
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// Write `data` to a unique temp file in the target's directory, fsync it,
/// then atomically rename into place. Readers never observe a partial file,
/// and the data is durable when this returns.
pub(crate) async fn atomic_write_durable(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let unique_id = TEMP_COUNTER.fetch_add(1, Relaxed);
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!(".tmp.{file_name}.{unique_id}"));

    let write_result: std::io::Result<()> = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}
