use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content not found: '{0}'")]
    ContentNotFound(String),

    #[error("chunk {index} missing for content '{content_id}'")]
    ChunkMissing { content_id: String, index: u32 },

    #[error("invalid content id: '{0}'")]
    InvalidContentId(String),

    #[error("invalid session id: '{0}'")]
    InvalidSessionId(String),

    #[error("chunk index {index} out of range for content '{content_id}' ({total} chunks declared)")]
    ChunkIndexOutOfRange {
        content_id: String,
        index: u32,
        total: u32,
    },

    #[error("invalid IV length: expected {expected} bytes, got {got}")]
    InvalidIv { expected: usize, got: usize },

    #[error("metadata record corrupt for content '{content_id}': {reason}")]
    CorruptRecord { content_id: String, reason: String },

    #[error("write failure: {0}")]
    WriteFailure(#[source] std::io::Error),

    #[error("download aborted: sink closed")]
    DownloadAborted,

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
