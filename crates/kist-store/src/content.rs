use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-content metadata record, persisted as one JSON document per content.
///
/// `total_size` is the *plaintext* byte count declared at creation; stored
/// chunk sizes are ciphertext lengths and live in `chunks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,

    /// Owning session scope. Foreign reference, not ownership: the record
    /// outlives its session only if pinned. Never changes after creation.
    pub session_id: String,

    /// Payload kind tag (text/image/file/...). Opaque to the store.
    #[serde(default)]
    pub content_type: String,

    pub total_chunks: u32,
    pub total_size: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Representative IV associated with the content as a whole. Opaque;
    /// per-chunk IVs are tracked in `chunks` and in the chunk files.
    #[serde(default)]
    pub encryption_iv: Option<String>,

    /// Free-form serialized document, expected (not guaranteed) to contain a
    /// `fileName` field. Untrusted text: the store never assumes it parses.
    #[serde(default)]
    pub additional_metadata: Option<String>,

    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub is_pinned: bool,

    /// True if the content must be served via the streaming download path
    /// rather than inline transport.
    #[serde(default)]
    pub is_large_file: bool,

    /// Per-chunk bookkeeping, keyed by chunk index.
    #[serde(default)]
    pub chunks: BTreeMap<u32, ChunkMeta>,
}

/// Bookkeeping for one stored chunk: ciphertext length actually stored and
/// the per-chunk IV (hex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub size: u64,
    pub iv: String,
}

impl ContentRecord {
    /// Merge an incoming upsert into this record.
    ///
    /// Later writes never reset already-set fields to empty: strings only
    /// overwrite when the incoming value is non-empty, options when `Some`,
    /// flags only flip forward. `session_id` and `created_at` are fixed at
    /// creation. Chunk bookkeeping entries are unioned (incoming wins per
    /// index, matching idempotent chunk overwrite).
    pub fn merge_from(&mut self, incoming: ContentRecord) {
        if !incoming.content_type.is_empty() {
            self.content_type = incoming.content_type;
        }
        if incoming.total_chunks > 0 {
            self.total_chunks = incoming.total_chunks;
        }
        if incoming.total_size > 0 {
            self.total_size = incoming.total_size;
        }
        if incoming.encryption_iv.is_some() {
            self.encryption_iv = incoming.encryption_iv;
        }
        if incoming.additional_metadata.is_some() {
            self.additional_metadata = incoming.additional_metadata;
        }
        self.is_complete |= incoming.is_complete;
        self.is_pinned |= incoming.is_pinned;
        self.is_large_file |= incoming.is_large_file;
        self.chunks.extend(incoming.chunks);
    }

    /// Filename for the download Content-Disposition header: the metadata
    /// document's `fileName` when present, otherwise the content id.
    pub fn resolved_filename(&self) -> String {
        if let MetadataDocument::Valid(map) =
            MetadataDocument::parse(self.additional_metadata.as_deref())
        {
            if let Some(name) = map.get("fileName").and_then(|v| v.as_str()) {
                return name.to_string();
            }
        }
        self.content_id.clone()
    }
}

/// Parse outcome for the untrusted `additional_metadata` document.
///
/// `Unparseable` covers absent, `null`, non-object, and malformed input.
/// Callers operate on `Valid` only; the repair path replaces the document
/// explicitly, never coercing.
#[derive(Debug)]
pub enum MetadataDocument {
    Valid(serde_json::Map<String, serde_json::Value>),
    Unparseable,
}

impl MetadataDocument {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Unparseable;
        };
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => Self::Valid(map),
            _ => Self::Unparseable,
        }
    }
}
