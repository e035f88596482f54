//! Typed non-fatal diagnostics surfaced by the store.
//!
//! Some conditions must be observable without failing the operation that
//! detected them (a length mismatch is found only after the response bytes
//! are already on the wire). Those are emitted as [`Diagnostic`] values
//! through a [`StoreObserver`] rather than buried in ad-hoc log lines.

/// Non-fatal events emitted alongside (never instead of) operation results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Bytes actually streamed for a download differ from the declared
    /// Content-Length. The response is already committed; this is an
    /// integrity signal for operators.
    LengthMismatch {
        content_id: String,
        declared: u64,
        actual: u64,
    },

    /// `additional_metadata` was absent or unparseable and was replaced by a
    /// fresh document during a rename.
    MetadataRepaired { content_id: String },

    /// A content transitioned to complete (all chunk indices present).
    ContentComplete {
        content_id: String,
        total_chunks: u32,
    },

    /// A download stopped early because the sink closed.
    DownloadAborted {
        content_id: String,
        bytes_sent: u64,
    },

    /// A session-end retention sweep finished.
    SessionSwept {
        session_id: String,
        evicted: usize,
        retained: usize,
    },
}

/// Sink for [`Diagnostic`] events.
pub trait StoreObserver: Send + Sync {
    fn diagnostic(&self, event: Diagnostic);
}

/// Default observer that forwards diagnostics to `tracing`.
pub struct LogObserver;

impl StoreObserver for LogObserver {
    fn diagnostic(&self, event: Diagnostic) {
        match event {
            Diagnostic::LengthMismatch {
                content_id,
                declared,
                actual,
            } => {
                tracing::warn!(
                    %content_id,
                    declared,
                    actual,
                    "download length mismatch: sent bytes differ from declared Content-Length"
                );
            }
            Diagnostic::MetadataRepaired { content_id } => {
                tracing::warn!(%content_id, "unparseable additional metadata replaced");
            }
            Diagnostic::ContentComplete {
                content_id,
                total_chunks,
            } => {
                tracing::info!(%content_id, total_chunks, "content complete");
            }
            Diagnostic::DownloadAborted {
                content_id,
                bytes_sent,
            } => {
                tracing::debug!(%content_id, bytes_sent, "download sink closed early");
            }
            Diagnostic::SessionSwept {
                session_id,
                evicted,
                retained,
            } => {
                tracing::info!(%session_id, evicted, retained, "session retention sweep");
            }
        }
    }
}
