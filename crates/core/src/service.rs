//! EnrichmentService trait — the abstraction over the remote prompt
//! enrichment backend.
//!
//! The service accepts prompts, processes them asynchronously, and reports
//! progress when polled. Every call carries the user's credential.
//!
//! Implementations: the HTTP client in `contextos-client`, scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::schema::ContextSchema;
use crate::session::{HistoryEntry, PromptRecord, QuestionAnswer};

/// Body of a prompt submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitPromptRequest {
    pub prompt: String,

    #[serde(rename = "schemaIds", default, skip_serializing_if = "Vec::is_empty")]
    pub schema_ids: Vec<String>,
}

type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// The remote enrichment service contract.
///
/// Every method takes the raw credential; implementations decide how to
/// transmit it.
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// All context schemas visible to the credential, published or not.
    async fn list_schemas(&self, api_key: &str) -> ServiceResult<Vec<ContextSchema>>;

    /// Submit a prompt. Returns the id the service assigned.
    async fn submit_prompt(
        &self,
        api_key: &str,
        request: &SubmitPromptRequest,
    ) -> ServiceResult<String>;

    /// Retrieve the current state of a prompt.
    async fn retrieve_prompt(&self, api_key: &str, prompt_id: &str)
    -> ServiceResult<PromptRecord>;

    /// Send answers to the clarifying questions of a prompt.
    async fn respond_prompt(
        &self,
        api_key: &str,
        prompt_id: &str,
        answers: &[QuestionAnswer],
    ) -> ServiceResult<()>;

    /// Completed prompts, optionally filtered by a search term.
    async fn list_history(
        &self,
        api_key: &str,
        search: Option<&str>,
    ) -> ServiceResult<Vec<HistoryEntry>>;
}
