//! Retention policy: what survives the end of its originating session.
//!
//! Unpinned content is evicted when its session ends; pinned content
//! survives and stays retrievable by content id alone. Pinned content is
//! only ever removed by an explicit delete.

use crate::error::Result;
use crate::events::Diagnostic;
use crate::layout::validate_session_id;
use crate::ledger::ContentStore;

/// Counts from one session-end sweep.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SessionSweep {
    pub evicted: usize,
    pub retained: usize,
}

impl ContentStore {
    /// Evict every unpinned content of the session. One wedged deletion is
    /// logged and skipped rather than aborting the sweep.
    pub async fn end_session(&self, session_id: &str) -> Result<SessionSweep> {
        validate_session_id(session_id)?;

        let mut evicted = 0;
        let mut retained = 0;
        for (content_id, pinned) in self.session_contents(session_id) {
            if pinned {
                retained += 1;
                continue;
            }
            match self.delete_content(&content_id).await {
                Ok(()) => evicted += 1,
                Err(e) => {
                    tracing::warn!(%content_id, error = %e, "session sweep failed to evict content");
                }
            }
        }

        self.observer.diagnostic(Diagnostic::SessionSwept {
            session_id: session_id.to_string(),
            evicted,
            retained,
        });
        Ok(SessionSweep { evicted, retained })
    }
}
