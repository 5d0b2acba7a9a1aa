//! Domain event system — how the engine tells the presentation layer that
//! something changed.
//!
//! Events are published when something interesting happens to the
//! credential, the catalog, or the live session. Renderers subscribe and
//! re-read engine state instead of polling it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::SessionStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A credential was configured or cleared by the user
    CredentialChanged {
        authenticated: bool,
        timestamp: DateTime<Utc>,
    },

    /// The service rejected the stored credential and it was cleared
    CredentialInvalidated {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The context catalog was replaced
    CatalogRefreshed {
        published: usize,
        timestamp: DateTime<Utc>,
    },

    /// The service accepted a prompt
    SessionSubmitted {
        prompt_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A poll response was applied
    SessionUpdated {
        prompt_id: String,
        status: SessionStatus,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// The service asked clarifying questions
    ClarificationRequested {
        prompt_id: String,
        questions: usize,
        timestamp: DateTime<Utc>,
    },

    /// Answers were accepted and polling restarted
    AnswersSubmitted {
        prompt_id: String,
        answered: usize,
        timestamp: DateTime<Utc>,
    },

    /// The session ended in failure
    SessionFailed {
        prompt_id: Option<String>,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The session was discarded
    SessionReset { timestamp: DateTime<Utc> },

    /// A session was hydrated from history
    SessionResumed {
        prompt_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
