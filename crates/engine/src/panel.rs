//! The presentation-facing facade. Wires the credential store,
//! catalog, history, and session engine together around one event bus.

use contextos_config::AppConfig;
use contextos_core::error::{Error, Result};
use contextos_core::event::EventBus;
use contextos_core::service::EnrichmentService;
use contextos_core::session::{HistoryEntry, PromptSession};
use contextos_core::storage::KeyValueStore;
use std::sync::Arc;
use tracing::info;

use crate::assembler;
use crate::catalog::ContextCatalog;
use crate::credentials::{CredentialStore, FileKeyValueStore};
use crate::history::HistoryRepository;
use crate::session::{PollPolicy, SessionEngine};

pub struct Panel {
    events: Arc<EventBus>,
    credentials: Arc<CredentialStore>,
    catalog: ContextCatalog,
    history: HistoryRepository,
    engine: SessionEngine,
}

impl Panel {
    pub fn new(
        service: Arc<dyn EnrichmentService>,
        credentials: Arc<CredentialStore>,
        events: Arc<EventBus>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            catalog: ContextCatalog::new(service.clone(), credentials.clone(), events.clone()),
            history: HistoryRepository::new(service.clone(), credentials.clone()),
            engine: SessionEngine::new(service, credentials.clone(), events.clone(), policy),
            credentials,
            events,
        }
    }

    /// Build a panel from configuration, persisting the credential to the
    /// configured file. A key from the config or environment is used only
    /// when nothing is stored, and is never written to disk.
    pub async fn from_config(config: &AppConfig, service: Arc<dyn EnrichmentService>) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(config.credentials_path()));
        Self::with_store(config, service, store).await
    }

    /// Like `from_config`, with an explicit key-value store.
    pub async fn with_store(
        config: &AppConfig,
        service: Arc<dyn EnrichmentService>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let events = Arc::new(EventBus::default());
        let credentials = Arc::new(CredentialStore::load(store, events.clone()).await?);
        if !credentials.is_configured().await {
            if let Some(key) = config.api_key.as_deref() {
                credentials.set_transient(key).await;
            }
        }
        Ok(Self::new(
            service,
            credentials,
            events,
            PollPolicy::from(&config.poll),
        ))
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn catalog(&self) -> &ContextCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &HistoryRepository {
        &self.history
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    /// Store a key and load the catalog with it. Returns the number of
    /// published schemas.
    pub async fn connect(&self, key: &str) -> Result<usize> {
        if !self.credentials.configure(key).await? {
            return Err(Error::Configuration("Please enter an API key".into()));
        }
        self.catalog.refresh().await
    }

    /// Forget the key and everything fetched with it.
    pub async fn disconnect(&self) -> Result<()> {
        self.engine.reset().await;
        self.catalog.clear().await;
        self.history.clear().await;
        self.credentials.clear().await?;
        info!("Disconnected");
        Ok(())
    }

    pub async fn refresh_contexts(&self) -> Result<usize> {
        self.catalog.refresh().await
    }

    pub async fn search_history(&self, query: Option<&str>) -> Vec<HistoryEntry> {
        self.history.search(query).await
    }

    /// Resume a session from the most recent history listing.
    pub async fn resume(&self, id: &str) -> Result<PromptSession> {
        let entry = self
            .history
            .find(id)
            .await
            .ok_or_else(|| Error::Validation(format!("No history entry with id {id}")))?;
        Ok(self.engine.resume_from_history(&entry).await)
    }

    /// The composite for the live session, or `None` when idle. Without
    /// enriched text the labeled sections stand on their own.
    pub async fn composite(&self) -> Option<String> {
        let session = self.engine.session().await?;
        let schemas = self.catalog.schemas().await;
        Some(assembler::assemble(
            &session,
            &schemas,
            &session.answered_questions,
        ))
    }
}
