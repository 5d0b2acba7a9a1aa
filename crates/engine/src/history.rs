//! Best-effort listing of past completed prompts.

use contextos_core::service::EnrichmentService;
use contextos_core::session::HistoryEntry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::credentials::CredentialStore;

pub struct HistoryRepository {
    service: Arc<dyn EnrichmentService>,
    credentials: Arc<CredentialStore>,
    entries: RwLock<Vec<HistoryEntry>>,
}

impl HistoryRepository {
    pub fn new(service: Arc<dyn EnrichmentService>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            service,
            credentials,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// List completed prompts matching `query`. Never fails: a missing
    /// credential or any service error yields an empty list.
    pub async fn search(&self, query: Option<&str>) -> Vec<HistoryEntry> {
        let Some(credential) = self.credentials.credential().await else {
            debug!("No credential; history is empty");
            self.entries.write().await.clear();
            return Vec::new();
        };

        let entries = match self
            .service
            .list_history(credential.expose(), query)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "History fetch failed");
                Vec::new()
            }
        };

        debug!(count = entries.len(), "History loaded");
        *self.entries.write().await = entries.clone();
        entries
    }

    /// The entries from the most recent search.
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn find(&self, id: &str) -> Option<HistoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
