//! Rename with repair: safe, partial, idempotent mutation of the untrusted
//! metadata document.
//!
//! Only the `fileName` key is ever touched; everything else in a parseable
//! document survives unmodified. An absent, null, or malformed document is
//! discarded and replaced with a fresh one holding only the new name —
//! repair is local and never surfaces as an error to the caller.

use serde_json::Value;

use crate::content::MetadataDocument;
use crate::error::{Result, StoreError};
use crate::events::Diagnostic;
use crate::ledger::ContentStore;

impl ContentStore {
    /// Set the content's filename in its metadata document.
    ///
    /// Empty and whitespace-only names are accepted: the store is
    /// metadata-agnostic about filename content.
    pub async fn rename_content(&self, content_id: &str, new_name: &str) -> Result<()> {
        crate::layout::validate_content_id(content_id)?;

        // Rename is a read-modify-write of the record; it holds the same
        // per-content lock as chunk completion so a concurrent completion
        // update cannot be overwritten by a stale write.
        let lock = self.lock_for(content_id);
        let _guard = lock.lock().await;

        let mut record = self
            .load_record(content_id)
            .await?
            .ok_or_else(|| StoreError::ContentNotFound(content_id.to_string()))?;

        let document = match MetadataDocument::parse(record.additional_metadata.as_deref()) {
            MetadataDocument::Valid(mut map) => {
                map.insert("fileName".to_string(), Value::String(new_name.to_string()));
                map
            }
            MetadataDocument::Unparseable => {
                if record.additional_metadata.is_some() {
                    self.observer.diagnostic(Diagnostic::MetadataRepaired {
                        content_id: content_id.to_string(),
                    });
                }
                let mut map = serde_json::Map::new();
                map.insert("fileName".to_string(), Value::String(new_name.to_string()));
                map
            }
        };

        record.additional_metadata = Some(serde_json::to_string(&document)?);
        self.persist_record(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::IV_SIZE;
    use crate::ledger::SaveChunkRequest;

    async fn store_with_content(
        dir: &std::path::Path,
        metadata: Option<&str>,
    ) -> ContentStore {
        let store = ContentStore::open(dir).unwrap();
        store
            .save_chunk(
                SaveChunkRequest {
                    content_id: "c1".to_string(),
                    session_id: "s1".to_string(),
                    chunk_index: 0,
                    total_chunks: 1,
                    total_size: 16,
                    content_type: Some("image".to_string()),
                    is_large_file: false,
                    iv: vec![0u8; IV_SIZE],
                },
                &[1u8; 16],
            )
            .await
            .unwrap();
        if let Some(metadata) = metadata {
            let mut record = store.get_metadata("c1").await.unwrap();
            record.additional_metadata = Some(metadata.to_string());
            store.save_content(record).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn rename_preserves_unrelated_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_content(
            tmp.path(),
            Some(
                "{\"fileName\":\"a.jpg\",\"mimeType\":\"image/jpeg\",\"size\":1024,\
                 \"imageInfo\":{\"width\":800,\"height\":600}}",
            ),
        )
        .await;

        store.rename_content("c1", "b.jpg").await.unwrap();

        let raw = store
            .get_metadata("c1")
            .await
            .unwrap()
            .additional_metadata
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["fileName"], "b.jpg");
        assert_eq!(doc["mimeType"], "image/jpeg");
        assert_eq!(doc["size"], 1024);
        assert_eq!(doc["imageInfo"]["width"], 800);
        assert_eq!(doc["imageInfo"]["height"], 600);
    }

    #[tokio::test]
    async fn malformed_metadata_is_repaired() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_content(tmp.path(), Some("invalid-json{broken")).await;

        store.rename_content("c1", "fixed.txt").await.unwrap();

        let raw = store
            .get_metadata("c1")
            .await
            .unwrap()
            .additional_metadata
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let map = doc.as_object().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["fileName"], "fixed.txt");
    }

    #[tokio::test]
    async fn absent_metadata_synthesizes_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_content(tmp.path(), None).await;

        store.rename_content("c1", "named.bin").await.unwrap();

        let record = store.get_metadata("c1").await.unwrap();
        assert_eq!(record.resolved_filename(), "named.bin");
    }

    #[tokio::test]
    async fn missing_content_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();

        let err = store.rename_content("missing-id", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn empty_and_whitespace_names_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_with_content(tmp.path(), Some("{\"fileName\":\"a\"}")).await;

        store.rename_content("c1", "").await.unwrap();
        assert_eq!(store.get_metadata("c1").await.unwrap().resolved_filename(), "");

        store.rename_content("c1", "   ").await.unwrap();
        assert_eq!(
            store.get_metadata("c1").await.unwrap().resolved_filename(),
            "   "
        );
    }
}
