//! HTTP implementation of the enrichment service contract.
//!
//! Talks JSON to the `functions/v1` endpoints:
//! - `GET  user-schemas-api`
//! - `POST submit-prompt`
//! - `GET  retrieve-prompts/{id}`
//! - `POST respond-prompt/{id}`
//! - `GET  retrieve-prompts?status=completed&search=`
//!
//! The credential travels as the `api_key` query parameter on every call.

use async_trait::async_trait;
use contextos_config::AppConfig;
use contextos_core::error::ServiceError;
use contextos_core::schema::ContextSchema;
use contextos_core::service::{EnrichmentService, SubmitPromptRequest};
use contextos_core::session::{HistoryEntry, PromptRecord, QuestionAnswer};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// An `EnrichmentService` backed by the hosted HTTP API.
pub struct HttpEnrichmentService {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpEnrichmentService {
    /// Create a client without a per-request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Self::with_timeout(base_url, None)
    }

    /// Create a client, optionally bounding every request.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ServiceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ServiceError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: "contextos".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::with_timeout(config.api_url.clone(), config.http.timeout())
    }

    /// Join `segments` under `functions/v1`. Each segment is
    /// percent-encoded, so ids never alter the path.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, ServiceError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ServiceError::Network(format!("Invalid API URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Network(format!("Invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["functions", "v1"])
            .extend(segments);
        Ok(url)
    }

    async fn get(
        &self,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .client
            .get(self.url(path)?)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        check_status(response).await
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        path: &[&str],
        api_key: &str,
        body: &B,
    ) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .client
            .post(self.url(path)?)
            .header("Accept", "application/json")
            .query(&[("api_key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        check_status(response).await
    }
}

#[async_trait]
impl EnrichmentService for HttpEnrichmentService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_schemas(&self, api_key: &str) -> Result<Vec<ContextSchema>, ServiceError> {
        debug!("Fetching context schemas");
        let response = self
            .get(&["user-schemas-api"], &[("api_key", api_key)])
            .await?;
        let body: ApiSchemasResponse = parse_json(response).await?;
        Ok(body.schemas.unwrap_or_default())
    }

    async fn submit_prompt(
        &self,
        api_key: &str,
        request: &SubmitPromptRequest,
    ) -> Result<String, ServiceError> {
        debug!(schemas = request.schema_ids.len(), "Submitting prompt");
        let response = self.post(&["submit-prompt"], api_key, request).await?;
        let body: ApiSubmitResponse = parse_json(response).await?;
        Ok(body.prompt_id)
    }

    async fn retrieve_prompt(
        &self,
        api_key: &str,
        prompt_id: &str,
    ) -> Result<PromptRecord, ServiceError> {
        debug!(prompt_id, "Retrieving prompt");
        let response = self
            .get(
                &["retrieve-prompts", prompt_id],
                &[("api_key", api_key)],
            )
            .await?;
        parse_json(response).await
    }

    async fn respond_prompt(
        &self,
        api_key: &str,
        prompt_id: &str,
        answers: &[QuestionAnswer],
    ) -> Result<(), ServiceError> {
        debug!(prompt_id, answers = answers.len(), "Submitting answers");
        self.post(&["respond-prompt", prompt_id], api_key, answers)
            .await?;
        Ok(())
    }

    async fn list_history(
        &self,
        api_key: &str,
        search: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, ServiceError> {
        let mut query = vec![("status", "completed"), ("api_key", api_key)];
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query.push(("search", term));
        }
        debug!(search = ?search, "Fetching prompt history");

        let response = self.get(&["retrieve-prompts"], &query).await?;
        let body: serde_json::Value = parse_json(response).await?;
        Ok(normalize_history(body))
    }
}

/// Turn a non-2xx response into a typed error, passing the body's message
/// through when there is one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Enrichment service returned error");
    Err(classify_error(status.as_u16(), &body))
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    response
        .json()
        .await
        .map_err(|e| ServiceError::Malformed(format!("Failed to parse response: {e}")))
}

/// Classify an error body.
///
/// A credential failure is reported as `InvalidCredential` when the status
/// is 401/403, when the body carries `code: "invalid_credential"`, or when
/// the message mentions `Invalid` (the deployed service only sends text).
fn classify_error(status_code: u16, body: &str) -> ServiceError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let (message, code) = match parsed {
        Some(b) => (b.error.or(b.message), b.code),
        None => (None, None),
    };

    let invalid_credential = matches!(status_code, 401 | 403)
        || code.as_deref() == Some("invalid_credential")
        || message.as_deref().is_some_and(|m| m.contains("Invalid"));

    if invalid_credential {
        ServiceError::InvalidCredential(message.unwrap_or_else(|| "Invalid API key".into()))
    } else {
        ServiceError::Status {
            status_code,
            message,
        }
    }
}

/// History arrives either as a bare array or wrapped in `{prompts: [...]}`.
/// Any other shape is an empty result; entries that do not parse are skipped.
fn normalize_history(body: serde_json::Value) -> Vec<HistoryEntry> {
    let items = match body {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("prompts") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<HistoryEntry>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping malformed history entry");
                None
            }
        })
        .collect()
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct ApiSchemasResponse {
    #[serde(default)]
    schemas: Option<Vec<ContextSchema>>,
}

#[derive(Debug, Deserialize)]
struct ApiSubmitResponse {
    prompt_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}
