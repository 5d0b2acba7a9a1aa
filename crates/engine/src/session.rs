//! Session Engine — owns the single live prompt session and drives it from
//! submission through polling and clarification to completion.
//!
//! ```text
//! idle ──submit──▶ pending ──poll──▶ processing ──poll──▶ completed
//!                     │                  │                    │
//!                     └──── error / timeout ──▶ failed        └─ questions ─▶ submit_answers ─▶ poll
//! ```
//!
//! Answering questions restarts polling without touching the status, so a
//! completed session stays completed while the follow-up text arrives. A
//! failed session is terminal until the next `submit`.
//!
//! Every poll loop carries a generation token. `submit`, `submit_answers`,
//! `reset`, and `resume_from_history` bump the generation; a tick whose
//! token no longer matches stops without touching state.

use contextos_config::PollConfig;
use contextos_core::error::{Error, Result};
use contextos_core::event::{DomainEvent, EventBus};
use contextos_core::service::{EnrichmentService, SubmitPromptRequest};
use contextos_core::session::{
    HistoryEntry, PromptRecord, PromptSession, QuestionAnswer, SessionStatus,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::{Credential, CredentialStore};

/// How often and how long to poll a submitted prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 30,
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }
}

/// A snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub session: Option<PromptSession>,
    pub clarification_pending: bool,
    pub submitting_answers: bool,
    pub error: Option<String>,
    generation: u64,
}

impl EngineState {
    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|s| s.status)
    }
}

/// What one applied poll response changed.
struct Applied {
    status: SessionStatus,
    questions: Option<usize>,
}

struct EngineInner {
    service: Arc<dyn EnrichmentService>,
    credentials: Arc<CredentialStore>,
    events: Arc<EventBus>,
    policy: PollPolicy,
    state: RwLock<EngineState>,
    poll_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    pub fn new(
        service: Arc<dyn EnrichmentService>,
        credentials: Arc<CredentialStore>,
        events: Arc<EventBus>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                service,
                credentials,
                events,
                policy,
                state: RwLock::new(EngineState::default()),
                poll_task: Mutex::new(None),
            }),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.inner.policy
    }

    pub async fn state(&self) -> EngineState {
        self.inner.state.read().await.clone()
    }

    pub async fn session(&self) -> Option<PromptSession> {
        self.inner.state.read().await.session.clone()
    }

    // ── Submission ──────────────────────────────────────────────────────

    /// Submit a prompt with the selected context schemas and start polling.
    ///
    /// Returns the id the service assigned. Validation happens before any
    /// network traffic, in order: prompt, credential, schema selection.
    pub async fn submit<I, S>(&self, prompt: &str, schema_ids: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prompt = prompt.trim().to_string();
        let schema_ids: BTreeSet<String> = schema_ids.into_iter().map(Into::into).collect();

        if prompt.is_empty() {
            return Err(self.surface(Error::Validation("Please enter a prompt".into())).await);
        }
        let credential = self.require_credential().await?;
        if schema_ids.is_empty() {
            return Err(self
                .surface(Error::Validation("Please select at least one context".into()))
                .await);
        }

        let generation = {
            let mut state = self.inner.state.write().await;
            if state.session.as_ref().is_some_and(|s| s.status.is_in_flight()) {
                let err = Error::Validation("A prompt is already being processed".into());
                state.error = Some(err.message());
                return Err(err);
            }
            state.generation += 1;
            state.session = Some(PromptSession::pending(prompt.clone(), schema_ids.clone()));
            state.clarification_pending = false;
            state.submitting_answers = false;
            state.error = None;
            state.generation
        };

        let request = SubmitPromptRequest {
            prompt,
            schema_ids: schema_ids.into_iter().collect(),
        };
        debug!(schemas = request.schema_ids.len(), "Submitting prompt");

        let prompt_id = match self
            .inner
            .service
            .submit_prompt(credential.expose(), &request)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(service = self.inner.service.name(), error = %e, "Prompt submission failed");
                let err = Error::remote(&e, "Failed to submit prompt");
                let mut state = self.inner.state.write().await;
                if state.generation == generation {
                    state.session = None;
                    state.error = Some(err.message());
                }
                drop(state);
                self.publish_failed(None, &err);
                return Err(err);
            }
        };

        {
            let mut state = self.inner.state.write().await;
            if state.generation != generation {
                debug!(prompt_id = %prompt_id, "Session replaced while submitting; not polling");
                return Ok(prompt_id);
            }
            if let Some(session) = state.session.as_mut() {
                session.id = Some(prompt_id.clone());
            }
        }

        info!(prompt_id = %prompt_id, "Prompt submitted");
        self.inner.events.publish(DomainEvent::SessionSubmitted {
            prompt_id: prompt_id.clone(),
            timestamp: chrono::Utc::now(),
        });

        self.start_poll_loop(generation, prompt_id.clone()).await;
        Ok(prompt_id)
    }

    // ── Polling ─────────────────────────────────────────────────────────

    /// Retrieve the live session once and apply the response.
    ///
    /// Rejected while a poll loop is running, so two ticks never overlap.
    pub async fn poll_once(&self, session_id: &str) -> Result<SessionStatus> {
        if self.is_polling().await {
            return Err(Error::Validation(format!(
                "Session {session_id} is already being polled"
            )));
        }
        let generation = {
            let state = self.inner.state.read().await;
            let active = state.session.as_ref().and_then(|s| s.id.as_deref());
            if active != Some(session_id) {
                return Err(Error::Validation(format!(
                    "Session {session_id} is not the active session"
                )));
            }
            state.generation
        };

        match self.poll_tick(generation, session_id, 0).await {
            Ok(Some(status)) => Ok(status),
            Ok(None) => Err(Error::Validation(format!(
                "Session {session_id} is no longer active"
            ))),
            Err(err) => Err(self.surface(err).await),
        }
    }

    /// Wait for the current poll loop, if any, and return its outcome.
    pub async fn settle(&self) -> Option<Result<()>> {
        let handle = self.inner.poll_task.lock().await.take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => Some(Err(Error::Internal(format!("Poll loop aborted: {e}")))),
        }
    }

    /// Whether a poll loop is still running.
    pub async fn is_polling(&self) -> bool {
        self.inner
            .poll_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn start_poll_loop(&self, generation: u64, prompt_id: String) {
        let engine = self.clone();
        let handle = tokio::spawn(engine.run_poll_loop(generation, prompt_id));
        // A replaced loop is left to notice its stale token and exit.
        *self.inner.poll_task.lock().await = Some(handle);
    }

    async fn run_poll_loop(self, generation: u64, prompt_id: String) -> Result<()> {
        let policy = self.inner.policy;

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(policy.interval).await;
            }

            let status = match self.poll_tick(generation, &prompt_id, attempt).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    debug!(prompt_id = %prompt_id, attempt, "Poll loop superseded; stopping");
                    return Ok(());
                }
                Err(err) => {
                    self.fail(generation, &prompt_id, &err).await;
                    return Err(err);
                }
            };

            match status {
                SessionStatus::Completed => {
                    info!(prompt_id = %prompt_id, attempts = attempt, "Prompt processing completed");
                    return Ok(());
                }
                SessionStatus::Failed => {
                    let err = Error::Remote("Prompt processing failed".into());
                    self.fail(generation, &prompt_id, &err).await;
                    return Err(err);
                }
                SessionStatus::Pending | SessionStatus::Processing => {}
            }
        }

        warn!(prompt_id = %prompt_id, attempts = policy.max_attempts, "Prompt processing timed out");
        let err = Error::Timeout {
            attempts: policy.max_attempts,
        };
        self.fail(generation, &prompt_id, &err).await;
        Err(err)
    }

    /// One retrieval. `Ok(None)` means the token went stale and nothing was
    /// applied.
    async fn poll_tick(
        &self,
        generation: u64,
        prompt_id: &str,
        attempt: u32,
    ) -> Result<Option<SessionStatus>> {
        if !self.is_current(generation).await {
            return Ok(None);
        }

        let credential = self
            .inner
            .credentials
            .credential()
            .await
            .ok_or_else(|| Error::Configuration("API key is not configured".into()))?;

        let record = self
            .inner
            .service
            .retrieve_prompt(credential.expose(), prompt_id)
            .await
            .map_err(|e| {
                warn!(prompt_id, attempt, error = %e, "Prompt retrieval failed");
                Error::Remote("Failed to retrieve prompt".into())
            })?;

        let applied = {
            let mut state = self.inner.state.write().await;
            if state.generation != generation {
                return Ok(None);
            }
            match apply_record(&mut state, &record) {
                Some(applied) => applied,
                None => return Ok(None),
            }
        };

        debug!(prompt_id, attempt, status = %applied.status, "Poll response applied");
        self.inner.events.publish(DomainEvent::SessionUpdated {
            prompt_id: prompt_id.to_string(),
            status: applied.status,
            attempt,
            timestamp: chrono::Utc::now(),
        });
        if let Some(questions) = applied.questions {
            info!(prompt_id, questions, "Clarification requested");
            self.inner.events.publish(DomainEvent::ClarificationRequested {
                prompt_id: prompt_id.to_string(),
                questions,
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(Some(record.status))
    }

    async fn fail(&self, generation: u64, prompt_id: &str, err: &Error) {
        let mut state = self.inner.state.write().await;
        if state.generation != generation {
            return;
        }
        if let Some(session) = state.session.as_mut() {
            session.status = SessionStatus::Failed;
        }
        state.error = Some(err.message());
        drop(state);
        self.publish_failed(Some(prompt_id.to_string()), err);
    }

    // ── Clarification ───────────────────────────────────────────────────

    /// Record a local answer. Returns `false` if there is no such question.
    pub async fn set_answer(&self, index: usize, answer: impl Into<String>) -> bool {
        let mut state = self.inner.state.write().await;
        match state
            .session
            .as_mut()
            .and_then(|s| s.questions.get_mut(index))
        {
            Some(question) => {
                question.answer = Some(answer.into());
                true
            }
            None => false,
        }
    }

    /// Send answers for the active session and resume polling.
    ///
    /// Without an active session id this is a no-op. A failed session
    /// rejects answers with a validation error. On failure the error is
    /// surfaced and the clarification flag stays raised.
    pub async fn submit_answers(&self, questions: Vec<QuestionAnswer>) -> Result<()> {
        let prompt_id = {
            let state = self.inner.state.read().await;
            let Some(session) = state.session.as_ref() else {
                debug!("No active session; ignoring answers");
                return Ok(());
            };
            let Some(id) = session.id.clone() else {
                debug!("Session has no id yet; ignoring answers");
                return Ok(());
            };
            if session.status == SessionStatus::Failed {
                drop(state);
                return Err(self
                    .surface(Error::Validation(
                        "This prompt has failed; submit it again".into(),
                    ))
                    .await);
            }
            id
        };
        let credential = self.require_credential().await?;

        {
            let mut state = self.inner.state.write().await;
            state.submitting_answers = true;
            if let Some(session) = state.session.as_mut() {
                session.questions = questions.clone();
            }
        }

        let result = self
            .inner
            .service
            .respond_prompt(credential.expose(), &prompt_id, &questions)
            .await;

        let mut state = self.inner.state.write().await;
        state.submitting_answers = false;
        if state.session.as_ref().and_then(|s| s.id.as_deref()) != Some(prompt_id.as_str()) {
            debug!(prompt_id = %prompt_id, "Session replaced while answering; dropping result");
            return Ok(());
        }

        if let Err(e) = result {
            warn!(prompt_id = %prompt_id, error = %e, "Answer submission failed");
            let err = Error::remote(&e, "Failed to submit answers");
            state.error = Some(err.message());
            return Err(err);
        }
        if state.status() == Some(SessionStatus::Failed) {
            let err = Error::Validation("This prompt has failed; submit it again".into());
            state.error = Some(err.message());
            return Err(err);
        }

        state.generation += 1;
        let generation = state.generation;
        state.clarification_pending = false;
        state.error = None;
        if let Some(session) = state.session.as_mut() {
            session.answered_questions = questions.clone();
        }
        drop(state);

        let answered = questions
            .iter()
            .filter(|q| q.non_blank_answer().is_some())
            .count();
        info!(prompt_id = %prompt_id, answered, "Answers submitted; resuming polling");
        self.inner.events.publish(DomainEvent::AnswersSubmitted {
            prompt_id: prompt_id.clone(),
            answered,
            timestamp: chrono::Utc::now(),
        });

        self.start_poll_loop(generation, prompt_id).await;
        Ok(())
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Flip a schema on the live session. `None` when idle.
    pub async fn toggle_schema(&self, schema_id: &str) -> Option<bool> {
        let mut state = self.inner.state.write().await;
        state.session.as_mut().map(|s| s.toggle_schema(schema_id))
    }

    /// Flip an extract on the live session. `None` when idle or unknown.
    pub async fn toggle_extract(&self, extract_id: &str) -> Option<bool> {
        let mut state = self.inner.state.write().await;
        state
            .session
            .as_mut()
            .and_then(|s| s.toggle_extract(extract_id))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Discard the session and return to idle. The credential is untouched.
    pub async fn reset(&self) {
        {
            let mut state = self.inner.state.write().await;
            let generation = state.generation + 1;
            *state = EngineState {
                generation,
                ..EngineState::default()
            };
        }
        info!("Session reset");
        self.inner.events.publish(DomainEvent::SessionReset {
            timestamp: chrono::Utc::now(),
        });
    }

    /// Replace the session with a completed one from history. No request is
    /// made and no poll loop starts.
    pub async fn resume_from_history(&self, entry: &HistoryEntry) -> PromptSession {
        let session = PromptSession::from_record(entry);
        {
            let mut state = self.inner.state.write().await;
            state.generation += 1;
            state.session = Some(session.clone());
            state.clarification_pending = false;
            state.submitting_answers = false;
            state.error = None;
        }
        info!(prompt_id = %entry.id, "Session resumed from history");
        self.inner.events.publish(DomainEvent::SessionResumed {
            prompt_id: entry.id.clone(),
            timestamp: chrono::Utc::now(),
        });
        session
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn is_current(&self, generation: u64) -> bool {
        self.inner.state.read().await.generation == generation
    }

    async fn require_credential(&self) -> Result<Credential> {
        match self.inner.credentials.credential().await {
            Some(credential) => Ok(credential),
            None => Err(self
                .surface(Error::Configuration("API key is not configured".into()))
                .await),
        }
    }

    /// Record `err` as the current error and hand it back.
    async fn surface(&self, err: Error) -> Error {
        self.inner.state.write().await.error = Some(err.message());
        err
    }

    fn publish_failed(&self, prompt_id: Option<String>, err: &Error) {
        self.inner.events.publish(DomainEvent::SessionFailed {
            prompt_id,
            error_message: err.message(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Fold one retrieval into the live session. `None` when idle.
fn apply_record(state: &mut EngineState, record: &PromptRecord) -> Option<Applied> {
    let session = state.session.as_mut()?;

    session.status = session.status.advance(record.status);
    if record.status == SessionStatus::Completed {
        session.enriched_prompt = record.enriched_prompt.clone();
    }
    session.replace_extracts(record.context.as_deref());

    let questions = if record.questions().is_empty() {
        None
    } else {
        session.questions = record.questions().to_vec();
        state.clarification_pending = true;
        Some(record.questions().len())
    };

    Some(Applied {
        status: session.status,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextos_core::session::ContextFragment;

    fn record(status: SessionStatus) -> PromptRecord {
        PromptRecord {
            id: "p1".into(),
            status,
            original_prompt: "Plan".into(),
            enriched_prompt: None,
            schemas_used: None,
            questions_answers: None,
            context: None,
            created_at: None,
        }
    }

    fn live_state() -> EngineState {
        let mut session = PromptSession::pending("Plan", BTreeSet::from(["s1".to_string()]));
        session.id = Some("p1".into());
        EngineState {
            session: Some(session),
            ..EngineState::default()
        }
    }

    #[test]
    fn default_policy_matches_service_cadence() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 30);
    }

    #[test]
    fn apply_completed_sets_enriched_text() {
        let mut state = live_state();
        let mut rec = record(SessionStatus::Completed);
        rec.enriched_prompt = Some("Plan better".into());

        let applied = apply_record(&mut state, &rec).unwrap();
        assert_eq!(applied.status, SessionStatus::Completed);
        assert!(applied.questions.is_none());
        let session = state.session.unwrap();
        assert_eq!(session.enriched_prompt.as_deref(), Some("Plan better"));
    }

    #[test]
    fn apply_never_regresses_status() {
        let mut state = live_state();
        apply_record(&mut state, &record(SessionStatus::Processing));
        let applied = apply_record(&mut state, &record(SessionStatus::Pending)).unwrap();
        assert_eq!(applied.status, SessionStatus::Processing);
    }

    #[test]
    fn apply_questions_raises_clarification() {
        let mut state = live_state();
        let mut rec = record(SessionStatus::Processing);
        rec.questions_answers = Some(vec![QuestionAnswer::new("Which team?")]);

        let applied = apply_record(&mut state, &rec).unwrap();
        assert_eq!(applied.questions, Some(1));
        assert!(state.clarification_pending);
        assert_eq!(state.session.unwrap().questions.len(), 1);
    }

    #[test]
    fn apply_keeps_extract_selection_by_content() {
        let mut state = live_state();
        let mut rec = record(SessionStatus::Processing);
        rec.context = Some(vec![
            ContextFragment {
                source: "a".into(),
                content: "alpha".into(),
            },
            ContextFragment {
                source: "b".into(),
                content: "beta".into(),
            },
        ]);
        apply_record(&mut state, &rec);
        state
            .session
            .as_mut()
            .unwrap()
            .toggle_extract("p1_1")
            .unwrap();

        // Same content arrives at a different index.
        rec.context = Some(vec![ContextFragment {
            source: "b".into(),
            content: "beta".into(),
        }]);
        apply_record(&mut state, &rec);

        let session = state.session.unwrap();
        assert_eq!(session.file_extracts.len(), 1);
        assert!(session.file_extracts[0].selected);
        assert_eq!(session.file_extracts[0].id, "p1_0");
    }

    #[test]
    fn apply_on_idle_state_is_noop() {
        let mut state = EngineState::default();
        assert!(apply_record(&mut state, &record(SessionStatus::Completed)).is_none());
        assert!(state.is_idle());
    }
}
