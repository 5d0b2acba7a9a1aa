//! Prompt sessions — the lifecycle of one prompt from submission to the
//! final composite text — and the records the service returns for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where a session is in its lifecycle.
///
/// `Pending < Processing < Completed`; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    fn rank(self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Processing => 1,
            SessionStatus::Completed => 2,
            SessionStatus::Failed => 3,
        }
    }

    /// Move towards `next`, never backwards.
    pub fn advance(self, next: SessionStatus) -> SessionStatus {
        if next.rank() >= self.rank() { next } else { self }
    }

    /// Still waiting on the service.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clarifying question produced by the service, answered locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,

    #[serde(default)]
    pub answer: Option<String>,

    /// Fields the service attached that we pass back untouched.
    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QuestionAnswer {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn answered(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            ..Self::new(question)
        }
    }

    /// The trimmed answer, if it is not blank.
    pub fn non_blank_answer(&self) -> Option<&str> {
        self.answer
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// One entry of a record's `context` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFragment {
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub content: String,
}

/// A selectable snippet of supplementary text attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExtract {
    /// `<session id>_<index>`
    pub id: String,
    pub source: String,
    pub content: String,
    pub selected: bool,
}

impl FileExtract {
    /// Derive extracts from a `context` array. Ids are index based, so the
    /// same array always yields the same ids.
    pub fn from_fragments(session_id: &str, fragments: &[ContextFragment]) -> Vec<FileExtract> {
        fragments
            .iter()
            .enumerate()
            .map(|(index, f)| FileExtract {
                id: format!("{session_id}_{index}"),
                source: f.source.clone(),
                content: f.content.clone(),
                selected: false,
            })
            .collect()
    }
}

/// A prompt as the service reports it, both from retrieval by id and in
/// history listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: String,

    pub status: SessionStatus,

    #[serde(default)]
    pub original_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas_used: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions_answers: Option<Vec<QuestionAnswer>>,

    /// `None` means the record carries no context array at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<ContextFragment>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PromptRecord {
    pub fn questions(&self) -> &[QuestionAnswer] {
        self.questions_answers.as_deref().unwrap_or_default()
    }
}

/// A read-only projection of a past completed session.
pub type HistoryEntry = PromptRecord;

/// The single live session owned by the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PromptSession {
    /// Assigned by the service; immutable once set.
    pub id: Option<String>,
    pub status: SessionStatus,
    pub original_prompt: String,
    pub enriched_prompt: Option<String>,
    pub selected_schema_ids: BTreeSet<String>,
    pub questions: Vec<QuestionAnswer>,
    /// Snapshot of `questions` at the last successful answer submission.
    pub answered_questions: Vec<QuestionAnswer>,
    pub file_extracts: Vec<FileExtract>,
    pub selected_extract_contents: BTreeSet<String>,
}

impl PromptSession {
    /// The optimistic session created before the service assigns an id.
    pub fn pending(prompt: impl Into<String>, schema_ids: BTreeSet<String>) -> Self {
        Self {
            original_prompt: prompt.into(),
            selected_schema_ids: schema_ids,
            ..Self::default()
        }
    }

    /// Hydrate a completed session from a history record. Extract
    /// selection starts empty.
    pub fn from_record(record: &PromptRecord) -> Self {
        let questions = record.questions().to_vec();
        let mut session = Self {
            id: Some(record.id.clone()),
            status: SessionStatus::Completed,
            original_prompt: record.original_prompt.clone(),
            enriched_prompt: record.enriched_prompt.clone(),
            selected_schema_ids: record
                .schemas_used
                .iter()
                .flatten()
                .cloned()
                .collect(),
            answered_questions: questions.clone(),
            questions,
            ..Self::default()
        };
        session.replace_extracts(record.context.as_deref());
        session
    }

    /// Regenerate extracts from a response, replacing the previous list
    /// wholesale. Selection is carried over by content; contents that no
    /// longer appear are dropped.
    pub fn replace_extracts(&mut self, fragments: Option<&[ContextFragment]>) {
        let id = self.id.clone().unwrap_or_default();
        self.file_extracts = fragments
            .map(|f| FileExtract::from_fragments(&id, f))
            .unwrap_or_default();

        let present: BTreeSet<&str> = self
            .file_extracts
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        self.selected_extract_contents
            .retain(|c| present.contains(c.as_str()));

        for extract in &mut self.file_extracts {
            extract.selected = self.selected_extract_contents.contains(&extract.content);
        }
    }

    /// Flip an extract's selection. Returns the new state, or `None` if no
    /// extract has that id.
    pub fn toggle_extract(&mut self, extract_id: &str) -> Option<bool> {
        let extract = self.file_extracts.iter_mut().find(|e| e.id == extract_id)?;
        extract.selected = !extract.selected;
        let selected = extract.selected;
        let content = extract.content.clone();

        if selected {
            self.selected_extract_contents.insert(content);
        } else {
            self.selected_extract_contents.remove(&content);
        }
        // Extracts sharing the same content stay in step with the set.
        for e in &mut self.file_extracts {
            e.selected = self.selected_extract_contents.contains(&e.content);
        }
        Some(selected)
    }

    /// Flip a schema's selection. Returns the new state.
    pub fn toggle_schema(&mut self, schema_id: &str) -> bool {
        if self.selected_schema_ids.remove(schema_id) {
            false
        } else {
            self.selected_schema_ids.insert(schema_id.to_string());
            true
        }
    }

    pub fn selected_extracts(&self) -> impl Iterator<Item = &FileExtract> {
        self.file_extracts.iter().filter(|e| e.selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(contents: &[&str]) -> Vec<ContextFragment> {
        contents
            .iter()
            .map(|c| ContextFragment {
                source: "notes.md".into(),
                content: (*c).into(),
            })
            .collect()
    }

    #[test]
    fn status_never_moves_backwards() {
        assert_eq!(
            SessionStatus::Processing.advance(SessionStatus::Pending),
            SessionStatus::Processing
        );
        assert_eq!(
            SessionStatus::Pending.advance(SessionStatus::Completed),
            SessionStatus::Completed
        );
        assert_eq!(
            SessionStatus::Failed.advance(SessionStatus::Completed),
            SessionStatus::Failed
        );
    }

    #[test]
    fn parses_retrieve_payload() {
        let json = r#"{
            "id": "p1",
            "status": "completed",
            "enriched_prompt": "Better prompt",
            "questions_answers": [{"question": "Who is the audience?", "answer": null, "qid": 7}],
            "context": [{"source": "a.pdf", "content": "alpha"}]
        }"#;
        let record: PromptRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.questions().len(), 1);
        assert_eq!(record.questions()[0].extra["qid"], 7);
        assert_eq!(record.context.as_ref().unwrap()[0].content, "alpha");
    }

    #[test]
    fn question_extra_fields_round_trip() {
        let json = r#"{"question":"Why?","answer":"Because","qid":3}"#;
        let qa: QuestionAnswer = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&qa).unwrap();
        assert_eq!(back["qid"], 3);
        assert_eq!(back["answer"], "Because");
    }

    #[test]
    fn blank_answers_are_not_answers() {
        assert_eq!(QuestionAnswer::answered("q", "   ").non_blank_answer(), None);
        assert_eq!(QuestionAnswer::new("q").non_blank_answer(), None);
        assert_eq!(QuestionAnswer::answered("q", " yes ").non_blank_answer(), Some("yes"));
    }

    #[test]
    fn extracts_use_index_based_ids() {
        let extracts = FileExtract::from_fragments("p9", &fragments(&["a", "b"]));
        assert_eq!(extracts[0].id, "p9_0");
        assert_eq!(extracts[1].id, "p9_1");
        assert!(extracts.iter().all(|e| !e.selected));
    }

    #[test]
    fn replace_extracts_carries_selection_by_content() {
        let mut session = PromptSession {
            id: Some("p1".into()),
            ..PromptSession::default()
        };
        session.replace_extracts(Some(&fragments(&["alpha", "beta"])));
        session.toggle_extract("p1_1");

        // "beta" moves to a new index and "alpha" disappears.
        session.replace_extracts(Some(&fragments(&["gamma", "beta"])));
        assert_eq!(session.file_extracts.len(), 2);
        assert!(!session.file_extracts[0].selected);
        assert!(session.file_extracts[1].selected);

        session.replace_extracts(Some(&fragments(&["gamma"])));
        assert!(session.selected_extract_contents.is_empty());
    }

    #[test]
    fn missing_context_clears_extracts() {
        let mut session = PromptSession {
            id: Some("p1".into()),
            ..PromptSession::default()
        };
        session.replace_extracts(Some(&fragments(&["alpha"])));
        session.toggle_extract("p1_0");
        session.replace_extracts(None);
        assert!(session.file_extracts.is_empty());
        assert!(session.selected_extract_contents.is_empty());
    }

    #[test]
    fn toggle_unknown_extract_is_none() {
        let mut session = PromptSession::default();
        assert_eq!(session.toggle_extract("nope"), None);
    }

    #[test]
    fn toggle_schema_flips() {
        let mut session = PromptSession::default();
        assert!(session.toggle_schema("s1"));
        assert!(session.selected_schema_ids.contains("s1"));
        assert!(!session.toggle_schema("s1"));
        assert!(session.selected_schema_ids.is_empty());
    }

    #[test]
    fn from_record_is_completed_and_unselected() {
        let record = PromptRecord {
            id: "h1".into(),
            status: SessionStatus::Completed,
            original_prompt: "Draft an email".into(),
            enriched_prompt: Some("Draft a formal email".into()),
            schemas_used: Some(vec!["s1".into(), "s2".into()]),
            questions_answers: Some(vec![QuestionAnswer::answered("Tone?", "formal")]),
            context: Some(fragments(&["alpha"])),
            created_at: None,
        };
        let session = PromptSession::from_record(&record);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.id.as_deref(), Some("h1"));
        assert_eq!(session.selected_schema_ids.len(), 2);
        assert_eq!(session.answered_questions, session.questions);
        assert_eq!(session.file_extracts[0].id, "h1_0");
        assert!(session.selected_extracts().next().is_none());
    }
}
