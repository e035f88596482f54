//! Chunk persistence engine: raw byte read/write keyed by
//! `(content_id, chunk_index)`.
//!
//! Each chunk is one file holding `IV ‖ ciphertext`, written durably via
//! temp-file + fsync + atomic rename. Overwriting an existing index replaces
//! the prior bytes, which makes retransmission from an unreliable transport
//! safe. Writes to distinct `(content, index)` pairs target distinct files
//! and never interfere.

use bytes::Bytes;

use crate::download::IV_SIZE;
use crate::error::{Result, StoreError};
use crate::layout::{atomic_write_durable, StoreLayout};

pub(crate) struct ChunkStore {
    layout: StoreLayout,
}

impl ChunkStore {
    pub(crate) fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Durably store one chunk. Returns the ciphertext length written.
    pub(crate) async fn write(
        &self,
        content_id: &str,
        index: u32,
        iv: &[u8],
        cipher: &[u8],
    ) -> Result<u64> {
        if iv.len() != IV_SIZE {
            return Err(StoreError::InvalidIv {
                expected: IV_SIZE,
                got: iv.len(),
            });
        }

        let path = self.layout.chunk_path(content_id, index);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::WriteFailure)?;
        }

        let mut frame = Vec::with_capacity(iv.len() + cipher.len());
        frame.extend_from_slice(iv);
        frame.extend_from_slice(cipher);
        atomic_write_durable(&path, &frame)
            .await
            .map_err(StoreError::WriteFailure)?;

        Ok(cipher.len() as u64)
    }

    /// Read a chunk's IV and ciphertext.
    pub(crate) async fn read(&self, content_id: &str, index: u32) -> Result<(Bytes, Bytes)> {
        let frame = self.read_frame(content_id, index).await?;
        let iv = frame.slice(..IV_SIZE);
        let cipher = frame.slice(IV_SIZE..);
        Ok((iv, cipher))
    }

    /// Read the stored frame as written to disk (`IV ‖ ciphertext`), which
    /// is exactly the shape the download stream emits.
    pub(crate) async fn read_frame(&self, content_id: &str, index: u32) -> Result<Bytes> {
        let path = self.layout.chunk_path(content_id, index);
        match tokio::fs::read(&path).await {
            Ok(data) if data.len() >= IV_SIZE => Ok(Bytes::from(data)),
            Ok(data) => Err(StoreError::CorruptRecord {
                content_id: content_id.to_string(),
                reason: format!(
                    "chunk {index} file is {} bytes, shorter than the {IV_SIZE}-byte IV",
                    data.len()
                ),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::ChunkMissing {
                content_id: content_id.to_string(),
                index,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Independent per-chunk existence check.
    pub(crate) async fn exists(&self, content_id: &str, index: u32) -> bool {
        tokio::fs::try_exists(self.layout.chunk_path(content_id, index))
            .await
            .unwrap_or(false)
    }
}
