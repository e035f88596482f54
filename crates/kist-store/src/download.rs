//! Download streamer: byte-exact reconstruction of a content for transfer.
//!
//! Each chunk was independently cipher-padded on ingestion, so the exact
//! transfer length is computable from the plaintext size alone. The number
//! announced as Content-Length comes from [`declared_length`]; the streamer
//! counts what it actually sends and surfaces any divergence as a
//! [`Diagnostic::LengthMismatch`] — the response is already committed by
//! then, so the mismatch is non-fatal but never silent.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, StoreError};
use crate::events::Diagnostic;
use crate::ledger::ContentStore;

/// Plaintext chunk boundary used by the ingestion side.
pub const CHUNK_SIZE: u64 = 65536;

/// Cipher block width each chunk is padded to.
pub const CIPHER_BLOCK: u64 = 16;

/// Fixed per-chunk IV width. One cipher/IV model end to end: block-padded
/// ciphertext with a 16-byte IV prepended to every chunk on the wire.
pub const IV_SIZE: usize = 16;

/// Result of a finished download stream.
#[derive(Debug, Clone, Copy)]
pub struct DownloadResult {
    pub bytes_sent: u64,
    pub declared: u64,
}

/// Exact transfer size for a content: per-chunk ciphertext (every full
/// 64 KiB chunk carries one padding block, the final partial chunk is padded
/// up to the block width) plus one IV per chunk.
pub fn declared_length(total_size: u64, total_chunks: u32) -> u64 {
    let full_chunks = total_size / CHUNK_SIZE;
    let last_chunk_size = total_size % CHUNK_SIZE;

    let full_chunk_cipher = full_chunks * (CHUNK_SIZE + CIPHER_BLOCK);
    let last_chunk_cipher = if last_chunk_size > 0 {
        last_chunk_size.div_ceil(CIPHER_BLOCK) * CIPHER_BLOCK
    } else {
        0
    };

    full_chunk_cipher + last_chunk_cipher + u64::from(total_chunks) * IV_SIZE as u64
}

impl ContentStore {
    /// Stream a content's chunks in ascending index order into `sink`, each
    /// frame being `IV ‖ ciphertext` exactly as stored. Returns the bytes
    /// sent.
    ///
    /// Never mutates content state. If the sink closes early (client
    /// disconnect) the stream stops promptly with `DownloadAborted`; if the
    /// content disappears mid-stream the next chunk read fails cleanly with
    /// `ChunkMissing`.
    pub async fn stream_for_download(
        &self,
        content_id: &str,
        sink: mpsc::Sender<Bytes>,
    ) -> Result<DownloadResult> {
        let record = self.get_metadata(content_id).await?;
        let declared = declared_length(record.total_size, record.total_chunks);

        let mut bytes_sent: u64 = 0;
        for index in 0..record.total_chunks {
            let frame = self.chunks.read_frame(content_id, index).await?;
            let frame_len = frame.len() as u64;
            if sink.send(frame).await.is_err() {
                self.observer.diagnostic(Diagnostic::DownloadAborted {
                    content_id: content_id.to_string(),
                    bytes_sent,
                });
                return Err(StoreError::DownloadAborted);
            }
            bytes_sent += frame_len;
        }

        if bytes_sent != declared {
            self.observer.diagnostic(Diagnostic::LengthMismatch {
                content_id: content_id.to_string(),
                declared,
                actual: bytes_sent,
            });
        }

        Ok(DownloadResult {
            bytes_sent,
            declared,
        })
    }
}
