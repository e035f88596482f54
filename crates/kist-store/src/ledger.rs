//! Metadata ledger: the per-content record arena and every mutation path
//! into it.
//!
//! All mutations of a single content are serialized through a per-content
//! async mutex; distinct contents proceed in parallel. The completion check
//! runs under the same mutex as chunk bookkeeping, so it always observes a
//! consistent snapshot of which indices exist regardless of arrival order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::chunks::ChunkStore;
use crate::content::{ChunkMeta, ContentRecord};
use crate::error::{Result, StoreError};
use crate::events::{Diagnostic, LogObserver, StoreObserver};
use crate::layout::{
    atomic_write_durable, validate_content_id, validate_session_id, StoreLayout,
};

/// Durable chunked content store.
///
/// Owns the filesystem layout, the chunk persistence engine, the per-content
/// lock registry, and a fast in-memory index rebuilt from disk at startup.
pub struct ContentStore {
    pub(crate) layout: StoreLayout,
    pub(crate) chunks: ChunkStore,
    pub(crate) locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    pub(crate) index: RwLock<HashMap<String, IndexEntry>>,
    pub(crate) observer: Arc<dyn StoreObserver>,
}

/// In-memory lookup entry: just enough for retention decisions without a
/// disk read. Authoritative state stays in the persisted record.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) session_id: String,
    pub(crate) pinned: bool,
}

/// Parameters accompanying one chunk delivery from the ingestion transport.
///
/// `total_size` is the content's declared plaintext byte count; the stored
/// ciphertext length is measured from the delivered bytes, never trusted
/// from the caller.
#[derive(Debug, Clone)]
pub struct SaveChunkRequest {
    pub content_id: String,
    pub session_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub total_size: u64,
    pub content_type: Option<String>,
    pub is_large_file: bool,
    pub iv: Vec<u8>,
}

/// Outcome of a chunk write.
#[derive(Debug, Clone, Copy)]
pub struct ChunkWritten {
    /// A prior chunk file existed at this index and was replaced.
    pub overwritten: bool,
    /// This write completed the content (exactly one write per content
    /// observes `true`).
    pub completed: bool,
    /// Ciphertext bytes stored for this chunk.
    pub stored_size: u64,
}

pub(crate) fn read_unpoisoned<'a, T>(
    lock: &'a RwLock<T>,
    lock_name: &'static str,
) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                lock = lock_name,
                "rwlock poisoned; continuing with inner state"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write_unpoisoned<'a, T>(
    lock: &'a RwLock<T>,
    lock_name: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                lock = lock_name,
                "rwlock poisoned; continuing with inner state"
            );
            poisoned.into_inner()
        }
    }
}

impl ContentStore {
    /// Open a store rooted at `data_dir`, creating the layout if absent and
    /// rebuilding the in-memory index from persisted records.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_observer(data_dir, Arc::new(LogObserver))
    }

    pub fn open_with_observer(
        data_dir: impl Into<PathBuf>,
        observer: Arc<dyn StoreObserver>,
    ) -> Result<Self> {
        let layout = StoreLayout::new(data_dir.into());
        std::fs::create_dir_all(layout.content_root())?;

        let index = scan_content_index(&layout.content_root());
        tracing::info!(contents = index.len(), "content store opened");

        Ok(Self {
            chunks: ChunkStore::new(layout.clone()),
            layout,
            locks: RwLock::new(HashMap::new()),
            index: RwLock::new(index),
            observer,
        })
    }

    /// Acquire (creating on first use) the mutation lock for one content.
    pub(crate) fn lock_for(&self, content_id: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = read_unpoisoned(&self.locks, "content_locks").get(content_id) {
            return existing.clone();
        }
        let mut locks = write_unpoisoned(&self.locks, "content_locks");
        locks
            .entry(content_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a content's lock entry if nothing else holds a handle to it.
    /// Called after deletion so the registry does not grow unbounded.
    pub(crate) fn release_lock_if_unused(&self, content_id: &str) {
        let mut locks = write_unpoisoned(&self.locks, "content_locks");
        if let Some(handle) = locks.get(content_id) {
            // Only the registry's own Arc left: no waiter can appear while
            // we hold the registry write lock.
            if Arc::strong_count(handle) == 1 {
                locks.remove(content_id);
            }
        }
    }

    /// Register or update a content's metadata record (upsert).
    ///
    /// First write creates the record; later writes merge, never resetting
    /// already-set fields to empty. `session_id` is fixed at creation.
    pub async fn save_content(&self, record: ContentRecord) -> Result<()> {
        validate_content_id(&record.content_id)?;
        validate_session_id(&record.session_id)?;

        let content_id = record.content_id.clone();
        let lock = self.lock_for(&content_id);
        let _guard = lock.lock().await;

        let merged = match self.load_record(&content_id).await? {
            Some(mut existing) => {
                existing.merge_from(record);
                existing
            }
            None => record,
        };

        self.persist_record(&merged).await?;
        self.index_upsert(&merged);
        Ok(())
    }

    /// Store one chunk and update per-chunk bookkeeping, flipping the record
    /// to complete when the last missing index lands.
    pub async fn save_chunk(&self, req: SaveChunkRequest, bytes: &[u8]) -> Result<ChunkWritten> {
        validate_content_id(&req.content_id)?;
        validate_session_id(&req.session_id)?;
        if req.total_chunks > 0 && req.chunk_index >= req.total_chunks {
            return Err(StoreError::ChunkIndexOutOfRange {
                content_id: req.content_id,
                index: req.chunk_index,
                total: req.total_chunks,
            });
        }

        // The byte write happens outside the per-content lock: chunk files
        // for different indices are independent and idempotent per index.
        let overwritten = self.chunks.exists(&req.content_id, req.chunk_index).await;
        let stored_size = self
            .chunks
            .write(&req.content_id, req.chunk_index, &req.iv, bytes)
            .await?;

        // Bookkeeping and the completion check run under the lock so the
        // snapshot of present indices is always consistent.
        let lock = self.lock_for(&req.content_id);
        let _guard = lock.lock().await;

        let mut record = match self.load_record(&req.content_id).await? {
            Some(existing) => {
                if existing.total_chunks > 0 && req.chunk_index >= existing.total_chunks {
                    return Err(StoreError::ChunkIndexOutOfRange {
                        content_id: req.content_id,
                        index: req.chunk_index,
                        total: existing.total_chunks,
                    });
                }
                let mut existing = existing;
                if existing.total_chunks == 0 {
                    existing.total_chunks = req.total_chunks;
                }
                if existing.total_size == 0 {
                    existing.total_size = req.total_size;
                }
                if existing.content_type.is_empty() {
                    existing.content_type = req.content_type.clone().unwrap_or_default();
                }
                existing.is_large_file |= req.is_large_file;
                existing
            }
            None => ContentRecord {
                content_id: req.content_id.clone(),
                session_id: req.session_id.clone(),
                content_type: req.content_type.clone().unwrap_or_default(),
                total_chunks: req.total_chunks,
                total_size: req.total_size,
                created_at: Utc::now(),
                encryption_iv: None,
                additional_metadata: None,
                is_complete: false,
                is_pinned: false,
                is_large_file: req.is_large_file,
                chunks: Default::default(),
            },
        };

        record.chunks.insert(
            req.chunk_index,
            ChunkMeta {
                size: stored_size,
                iv: hex::encode(&req.iv),
            },
        );

        // Completion state machine: Collecting -> Complete, driven only by
        // which indices are present.
        let mut completed = false;
        if !record.is_complete
            && record.total_chunks > 0
            && (0..record.total_chunks).all(|i| record.chunks.contains_key(&i))
        {
            record.is_complete = true;
            completed = true;
        }

        self.persist_record(&record).await?;
        self.index_upsert(&record);

        if completed {
            self.observer.diagnostic(Diagnostic::ContentComplete {
                content_id: record.content_id.clone(),
                total_chunks: record.total_chunks,
            });
        }

        Ok(ChunkWritten {
            overwritten,
            completed,
            stored_size,
        })
    }

    /// Read one stored chunk's IV and ciphertext.
    pub async fn read_chunk(&self, content_id: &str, index: u32) -> Result<(Bytes, Bytes)> {
        validate_content_id(content_id)?;
        self.chunks.read(content_id, index).await
    }

    /// Read a content's record. Never mutates.
    pub async fn get_metadata(&self, content_id: &str) -> Result<ContentRecord> {
        validate_content_id(content_id)?;
        self.load_record(content_id)
            .await?
            .ok_or_else(|| StoreError::ContentNotFound(content_id.to_string()))
    }

    /// Mark a content complete. Idempotent.
    pub async fn set_complete(&self, content_id: &str) -> Result<()> {
        validate_content_id(content_id)?;
        let lock = self.lock_for(content_id);
        let _guard = lock.lock().await;

        let mut record = self
            .load_record(content_id)
            .await?
            .ok_or_else(|| StoreError::ContentNotFound(content_id.to_string()))?;
        if record.is_complete {
            return Ok(());
        }
        record.is_complete = true;
        self.persist_record(&record).await?;
        self.observer.diagnostic(Diagnostic::ContentComplete {
            content_id: record.content_id.clone(),
            total_chunks: record.total_chunks,
        });
        Ok(())
    }

    /// Pin or unpin a content. Idempotent.
    pub async fn set_pinned(&self, content_id: &str, pinned: bool) -> Result<()> {
        validate_content_id(content_id)?;
        let lock = self.lock_for(content_id);
        let _guard = lock.lock().await;

        let mut record = self
            .load_record(content_id)
            .await?
            .ok_or_else(|| StoreError::ContentNotFound(content_id.to_string()))?;
        if record.is_pinned != pinned {
            record.is_pinned = pinned;
            self.persist_record(&record).await?;
        }
        self.index_upsert(&record);
        Ok(())
    }

    /// Delete a content's chunks and record. Works on pinned content too:
    /// pinned-deletion is always an explicit call, never a sweep.
    pub async fn delete_content(&self, content_id: &str) -> Result<()> {
        validate_content_id(content_id)?;
        let lock = self.lock_for(content_id);
        {
            let _guard = lock.lock().await;

            if self.load_record(content_id).await?.is_none() {
                return Err(StoreError::ContentNotFound(content_id.to_string()));
            }
            match tokio::fs::remove_dir_all(self.layout.content_dir(content_id)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.index_remove(content_id);
        }
        drop(lock);
        self.release_lock_if_unused(content_id);
        Ok(())
    }

    pub(crate) async fn load_record(&self, content_id: &str) -> Result<Option<ContentRecord>> {
        match tokio::fs::read(self.layout.meta_path(content_id)).await {
            Ok(raw) => serde_json::from_slice(&raw).map(Some).map_err(|e| {
                StoreError::CorruptRecord {
                    content_id: content_id.to_string(),
                    reason: e.to_string(),
                }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn persist_record(&self, record: &ContentRecord) -> Result<()> {
        let path = self.layout.meta_path(&record.content_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::WriteFailure)?;
        }
        let raw = serde_json::to_vec(record)?;
        atomic_write_durable(&path, &raw)
            .await
            .map_err(StoreError::WriteFailure)
    }

    pub(crate) fn index_upsert(&self, record: &ContentRecord) {
        let mut index = write_unpoisoned(&self.index, "content_index");
        index.insert(
            record.content_id.clone(),
            IndexEntry {
                session_id: record.session_id.clone(),
                pinned: record.is_pinned,
            },
        );
    }

    pub(crate) fn index_remove(&self, content_id: &str) {
        let mut index = write_unpoisoned(&self.index, "content_index");
        index.remove(content_id);
    }

    /// Contents currently indexed for a session, with their pin state.
    pub(crate) fn session_contents(&self, session_id: &str) -> Vec<(String, bool)> {
        read_unpoisoned(&self.index, "content_index")
            .iter()
            .filter(|(_, entry)| entry.session_id == session_id)
            .map(|(id, entry)| (id.clone(), entry.pinned))
            .collect()
    }
}

/// Scan persisted records at startup and rebuild the in-memory index.
/// Unreadable entries are skipped with a warning rather than failing open.
fn scan_content_index(content_root: &Path) -> HashMap<String, IndexEntry> {
    let mut index = HashMap::new();
    let entries = match std::fs::read_dir(content_root) {
        Ok(e) => e,
        Err(_) => return index,
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let meta_path = entry.path().join("meta.json");
        let raw = match std::fs::read(&meta_path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %meta_path.display(), error = %e, "skipping content without readable record");
                continue;
            }
        };
        match serde_json::from_slice::<ContentRecord>(&raw) {
            Ok(record) => {
                index.insert(
                    record.content_id.clone(),
                    IndexEntry {
                        session_id: record.session_id,
                        pinned: record.is_pinned,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(path = %meta_path.display(), error = %e, "skipping corrupt content record");
            }
        }
    }
    index
}
