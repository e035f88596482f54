use std::sync::{Arc, Mutex};

use kist_store::{
    declared_length, ContentStore, Diagnostic, SaveChunkRequest, StoreError, StoreObserver,
    CHUNK_SIZE, CIPHER_BLOCK, IV_SIZE,
};

/// Observer that records every diagnostic for assertions.
#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<Diagnostic>>,
}

impl StoreObserver for RecordingObserver {
    fn diagnostic(&self, event: Diagnostic) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingObserver {
    fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().unwrap().clone()
    }
}

fn chunk_request(content_id: &str, index: u32, total: u32, total_size: u64) -> SaveChunkRequest {
    SaveChunkRequest {
        content_id: content_id.to_string(),
        session_id: "session-1".to_string(),
        chunk_index: index,
        total_chunks: total,
        total_size,
        content_type: Some("file".to_string()),
        is_large_file: true,
        iv: vec![index as u8; IV_SIZE],
    }
}

/// Ciphertext sized the way the ingestion-side padding model produces it:
/// full chunks carry one extra cipher block, the tail is padded up to the
/// block width.
fn padded_ciphertext(index: u32, total: u32, total_size: u64) -> Vec<u8> {
    let last_chunk_size = total_size % CHUNK_SIZE;
    let len = if u64::from(index) + 1 < u64::from(total) || last_chunk_size == 0 {
        CHUNK_SIZE + CIPHER_BLOCK
    } else {
        last_chunk_size.div_ceil(CIPHER_BLOCK) * CIPHER_BLOCK
    };
    vec![index as u8; len as usize]
}

#[tokio::test]
async fn round_trip_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::open(tmp.path()).unwrap();

    let total_size = 3 * 1000;
    for index in 0..3u32 {
        store
            .save_chunk(chunk_request("c1", index, 3, total_size), &[index as u8; 1000])
            .await
            .unwrap();
    }

    let record = store.get_metadata("c1").await.unwrap();
    assert_eq!(record.total_size, total_size);
    assert_eq!(record.total_chunks, 3);
    assert!(record.is_complete);
}

#[tokio::test]
async fn store_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let store = ContentStore::open(tmp.path()).unwrap();
        for index in 0..2u32 {
            store
                .save_chunk(chunk_request("c1", index, 2, 128), &[index as u8; 64])
                .await
                .unwrap();
        }
        store.set_pinned("c1", true).await.unwrap();
    }

    // A fresh store over the same data dir serves the same state.
    let store = ContentStore::open(tmp.path()).unwrap();
    let record = store.get_metadata("c1").await.unwrap();
    assert!(record.is_complete);
    assert!(record.is_pinned);
    assert_eq!(record.chunks.len(), 2);

    // The rebuilt index still drives retention: pinned content survives.
    let sweep = store.end_session("session-1").await.unwrap();
    assert_eq!(sweep.retained, 1);
    assert_eq!(sweep.evicted, 0);
    assert!(store.get_metadata("c1").await.is_ok());
}

#[tokio::test]
async fn reverse_order_delivery_completes_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let store = ContentStore::open_with_observer(tmp.path(), observer.clone()).unwrap();

    let total = 8u32;
    let mut transitions = 0;
    for index in (0..total).rev() {
        let outcome = store
            .save_chunk(chunk_request("c1", index, total, 8 * 100), &[index as u8; 100])
            .await
            .unwrap();
        if outcome.completed {
            transitions += 1;
            assert_eq!(index, 0, "completion must land on the last missing index");
        }
    }
    assert_eq!(transitions, 1);

    let complete_events = observer
        .events()
        .into_iter()
        .filter(|e| matches!(e, Diagnostic::ContentComplete { .. }))
        .count();
    assert_eq!(complete_events, 1);
}

#[tokio::test]
async fn concurrent_delivery_completes_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(ContentStore::open(tmp.path()).unwrap());

    let total = 16u32;
    let mut handles = Vec::new();
    for index in (0..total).rev() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .save_chunk(
                    chunk_request("c1", index, total, u64::from(total) * 64),
                    &[index as u8; 64],
                )
                .await
                .unwrap()
                .completed
        }));
    }

    let mut transitions = 0;
    for handle in handles {
        if handle.await.unwrap() {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);
    assert!(store.get_metadata("c1").await.unwrap().is_complete);
}

#[tokio::test]
async fn streamed_bytes_match_declared_length() {
    let tmp = tempfile::tempdir().unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let store = ContentStore::open_with_observer(tmp.path(), observer.clone()).unwrap();

    let total_size = CHUNK_SIZE * 2 + 100;
    let total = 3u32;
    for index in 0..total {
        store
            .save_chunk(
                chunk_request("c1", index, total, total_size),
                &padded_ciphertext(index, total, total_size),
            )
            .await
            .unwrap();
    }

    let declared = declared_length(total_size, total);
    assert_eq!(
        declared,
        2 * (CHUNK_SIZE + CIPHER_BLOCK) + 112 + 3 * IV_SIZE as u64
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    let streamer = store.stream_for_download("c1", tx);

    let collector = async {
        let mut received = 0u64;
        let mut frames = 0u32;
        while let Some(frame) = rx.recv().await {
            received += frame.len() as u64;
            frames += 1;
        }
        (received, frames)
    };

    let (result, (received, frames)) = tokio::join!(streamer, collector);
    let result = result.unwrap();
    assert_eq!(result.bytes_sent, declared);
    assert_eq!(received, declared);
    assert_eq!(frames, total);

    // Exact match: no integrity warning.
    assert!(observer
        .events()
        .iter()
        .all(|e| !matches!(e, Diagnostic::LengthMismatch { .. })));
}

#[tokio::test]
async fn length_mismatch_is_surfaced_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let observer = Arc::new(RecordingObserver::default());
    let store = ContentStore::open_with_observer(tmp.path(), observer.clone()).unwrap();

    // Ciphertext sized differently than the padding model assumes.
    store
        .save_chunk(chunk_request("c1", 0, 1, 100), &[1u8; 50])
        .await
        .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    let streamer = store.stream_for_download("c1", tx);
    let drain = async {
        while rx.recv().await.is_some() {}
    };
    let (result, ()) = tokio::join!(streamer, drain);

    let result = result.unwrap();
    assert_ne!(result.bytes_sent, result.declared);
    assert!(observer.events().iter().any(|e| matches!(
        e,
        Diagnostic::LengthMismatch { actual, .. } if *actual == result.bytes_sent
    )));
}

#[tokio::test]
async fn download_stops_promptly_when_sink_closes() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::open(tmp.path()).unwrap();

    for index in 0..4u32 {
        store
            .save_chunk(chunk_request("c1", index, 4, 4 * 1024), &[index as u8; 1024])
            .await
            .unwrap();
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let streamer = store.stream_for_download("c1", tx);
    let dropper = async {
        let first = rx.recv().await;
        assert!(first.is_some());
        drop(rx);
    };

    let (result, ()) = tokio::join!(streamer, dropper);
    assert!(matches!(result.unwrap_err(), StoreError::DownloadAborted));
}

#[tokio::test]
async fn download_of_missing_content_fails_up_front() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::open(tmp.path()).unwrap();

    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    let err = store.stream_for_download("missing", tx).await.unwrap_err();
    assert!(matches!(err, StoreError::ContentNotFound(_)));
}

#[tokio::test]
async fn vanished_chunk_ends_stream_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ContentStore::open(tmp.path()).unwrap();

    for index in 0..3u32 {
        store
            .save_chunk(chunk_request("c1", index, 3, 3 * 256), &[index as u8; 256])
            .await
            .unwrap();
    }

    // Content removed between snapshot and chunk reads.
    std::fs::remove_file(tmp.path().join("content/c1/chunks/1")).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let streamer = store.stream_for_download("c1", tx);
    let drain = async {
        let mut frames = 0;
        while rx.recv().await.is_some() {
            frames += 1;
        }
        frames
    };

    let (result, frames) = tokio::join!(streamer, drain);
    assert!(matches!(
        result.unwrap_err(),
        StoreError::ChunkMissing { index: 1, .. }
    ));
    assert_eq!(frames, 1);
}
