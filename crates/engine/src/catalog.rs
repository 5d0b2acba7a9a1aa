//! Context Catalog — the published context schemas the user can attach to
//! a prompt.

use contextos_core::error::{Error, Result};
use contextos_core::event::{DomainEvent, EventBus};
use contextos_core::schema::ContextSchema;
use contextos_core::service::EnrichmentService;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::credentials::CredentialStore;

pub struct ContextCatalog {
    service: Arc<dyn EnrichmentService>,
    credentials: Arc<CredentialStore>,
    events: Arc<EventBus>,
    schemas: RwLock<Vec<ContextSchema>>,
}

impl ContextCatalog {
    pub fn new(
        service: Arc<dyn EnrichmentService>,
        credentials: Arc<CredentialStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            service,
            credentials,
            events,
            schemas: RwLock::new(Vec::new()),
        }
    }

    /// Replace the cached set with the published schemas from the service.
    ///
    /// A rejected credential is cleared before the error is returned. On any
    /// other failure the cached set is left as it was.
    pub async fn refresh(&self) -> Result<usize> {
        let credential = self
            .credentials
            .credential()
            .await
            .ok_or_else(|| Error::Configuration("API key is not configured".into()))?;

        let fetched = match self.service.list_schemas(credential.expose()).await {
            Ok(schemas) => schemas,
            Err(e) if e.is_invalid_credential() => {
                let reason = e
                    .server_message()
                    .unwrap_or("Invalid API key")
                    .to_string();
                warn!(reason = %reason, "Credential rejected; clearing it");
                self.credentials.clear().await?;
                self.events.publish(DomainEvent::CredentialInvalidated {
                    reason: reason.clone(),
                    timestamp: chrono::Utc::now(),
                });
                return Err(Error::Configuration(reason));
            }
            Err(e) => {
                warn!(service = self.service.name(), error = %e, "Schema fetch failed");
                return Err(Error::remote(&e, "Failed to load schemas"));
            }
        };

        let total = fetched.len();
        let published: Vec<ContextSchema> =
            fetched.into_iter().filter(|s| s.is_published).collect();
        let count = published.len();
        *self.schemas.write().await = published;

        info!(published = count, total, "Context catalog refreshed");
        self.events.publish(DomainEvent::CatalogRefreshed {
            published: count,
            timestamp: chrono::Utc::now(),
        });
        Ok(count)
    }

    pub async fn schemas(&self) -> Vec<ContextSchema> {
        self.schemas.read().await.clone()
    }

    /// Case-insensitive match on name, company name, or type. A blank term
    /// returns everything.
    pub async fn search(&self, term: &str) -> Vec<ContextSchema> {
        self.schemas
            .read()
            .await
            .iter()
            .filter(|s| s.matches(term))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<ContextSchema> {
        self.schemas.read().await.iter().find(|s| s.id == id).cloned()
    }

    pub async fn clear(&self) {
        self.schemas.write().await.clear();
    }
}
