use std::path::PathBuf;
use std::sync::Arc;

use kist_store::ContentStore;

use crate::config::ServerSection;

/// Shared application state, wrapped in Arc for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: ServerSection,
    pub data_dir: PathBuf,
    pub store: ContentStore,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: ServerSection) -> Result<Self, kist_store::StoreError> {
        let configured_data_dir = PathBuf::from(&config.data_dir);
        let data_dir = configured_data_dir
            .canonicalize()
            .unwrap_or(configured_data_dir);

        let store = ContentStore::open(&data_dir)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                data_dir,
                store,
                start_time: std::time::Instant::now(),
            }),
        })
    }

    pub fn store(&self) -> &ContentStore {
        &self.inner.store
    }
}
