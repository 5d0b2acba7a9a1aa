//! Wire-level tests for the HTTP enrichment service against an in-process
//! stub of the `functions/v1` API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use contextos_client::HttpEnrichmentService;
use contextos_core::error::ServiceError;
use contextos_core::schema::ContextType;
use contextos_core::service::{EnrichmentService, SubmitPromptRequest};
use contextos_core::session::{QuestionAnswer, SessionStatus};
use serde_json::{Value, json};
use tokio::net::TcpListener;

const GOOD_KEY: &str = "good-key";

// ── Stub server ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct StubState {
    /// (endpoint, body) for every accepted POST
    posts: Arc<Mutex<Vec<(String, Value)>>>,
}

type Params = Query<HashMap<String, String>>;

fn authorized(q: &HashMap<String, String>) -> bool {
    q.get("api_key").map(String::as_str) == Some(GOOD_KEY)
}

fn invalid_key() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid API key"})),
    )
}

async fn schemas(Query(q): Params) -> (StatusCode, Json<Value>) {
    if !authorized(&q) {
        return invalid_key();
    }
    (
        StatusCode::OK,
        Json(json!({"schemas": [
            {"id": "s1", "name": "Acme core", "companyName": "Acme", "type": "business",
             "targetAudience": ["CFO"], "keyGoals": [], "description": "", "isPublished": true},
            {"id": "s2", "name": "Draft", "companyName": "Acme", "type": "other",
             "targetAudience": [], "keyGoals": [], "description": "", "isPublished": false}
        ]})),
    )
}

async fn submit(
    State(state): State<StubState>,
    Query(q): Params,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&q) {
        return invalid_key();
    }
    if body["prompt"].as_str().is_some_and(|p| p.contains("forbidden")) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "Prompt rejected by policy"})),
        );
    }
    state
        .posts
        .lock()
        .unwrap()
        .push(("submit-prompt".into(), body));
    (StatusCode::OK, Json(json!({"prompt_id": "p-42"})))
}

async fn retrieve(Path(id): Path<String>, Query(q): Params) -> (StatusCode, Json<Value>) {
    if !authorized(&q) {
        return invalid_key();
    }
    if id != "p-42" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "p-42",
            "status": "completed",
            "original_prompt": "Summarize Q3 sales",
            "enriched_prompt": "Summarize Q3 sales for Acme",
            "questions_answers": [{"question": "Which region?", "answer": null}],
            "context": [{"source": "q3.xlsx", "content": "EMEA up 4%"}]
        })),
    )
}

async fn respond(
    State(state): State<StubState>,
    Path(id): Path<String>,
    Query(q): Params,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&q) {
        return invalid_key();
    }
    state
        .posts
        .lock()
        .unwrap()
        .push((format!("respond-prompt/{id}"), body));
    (StatusCode::OK, Json(json!({"success": true})))
}

async fn history(Query(q): Params) -> (StatusCode, Json<Value>) {
    if !authorized(&q) {
        return invalid_key();
    }
    assert_eq!(q.get("status").map(String::as_str), Some("completed"));
    let entry = json!({
        "id": "h1",
        "status": "completed",
        "original_prompt": "Plan the offsite",
        "enriched_prompt": "Plan a two-day offsite",
        "schemas_used": ["s1"],
        "created_at": "2025-03-01T10:00:00Z"
    });
    match q.get("search").map(String::as_str) {
        Some("wrapped") => (StatusCode::OK, Json(json!({"prompts": [entry]}))),
        Some("weird") => (StatusCode::OK, Json(json!({"items": [entry]}))),
        _ => (StatusCode::OK, Json(json!([entry]))),
    }
}

async fn start_stub() -> (HttpEnrichmentService, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/functions/v1/user-schemas-api", get(schemas))
        .route("/functions/v1/submit-prompt", post(submit))
        .route("/functions/v1/retrieve-prompts", get(history))
        .route("/functions/v1/retrieve-prompts/{id}", get(retrieve))
        .route("/functions/v1/respond-prompt/{id}", post(respond))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            eprintln!("stub server error: {err}");
        }
    });

    let service = HttpEnrichmentService::new(format!("http://{addr}")).unwrap();
    (service, state)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_schemas_returns_all_records() {
    let (service, _) = start_stub().await;
    let schemas = service.list_schemas(GOOD_KEY).await.unwrap();
    assert_eq!(schemas.len(), 2);
    assert_eq!(schemas[0].context_type, ContextType::Business);
    assert!(!schemas[1].is_published);
}

#[tokio::test]
async fn rejected_key_is_typed_as_invalid_credential() {
    let (service, _) = start_stub().await;
    let err = service.list_schemas("bad-key").await.unwrap_err();
    assert!(err.is_invalid_credential());
    assert_eq!(err.server_message(), Some("Invalid API key"));
}

#[tokio::test]
async fn submit_sends_prompt_and_schema_ids() {
    let (service, state) = start_stub().await;
    let request = SubmitPromptRequest {
        prompt: "Summarize Q3 sales".into(),
        schema_ids: vec!["s1".into()],
    };
    let id = service.submit_prompt(GOOD_KEY, &request).await.unwrap();
    assert_eq!(id, "p-42");

    let posts = state.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "submit-prompt");
    assert_eq!(posts[0].1["schemaIds"], json!(["s1"]));
}

#[tokio::test]
async fn submit_rejection_passes_server_message_through() {
    let (service, _) = start_stub().await;
    let request = SubmitPromptRequest {
        prompt: "something forbidden".into(),
        schema_ids: vec!["s1".into()],
    };
    let err = service.submit_prompt(GOOD_KEY, &request).await.unwrap_err();
    match err {
        ServiceError::Status {
            status_code,
            message,
        } => {
            assert_eq!(status_code, 422);
            assert_eq!(message.as_deref(), Some("Prompt rejected by policy"));
        }
        other => panic!("Expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn retrieve_parses_full_record() {
    let (service, _) = start_stub().await;
    let record = service.retrieve_prompt(GOOD_KEY, "p-42").await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(
        record.enriched_prompt.as_deref(),
        Some("Summarize Q3 sales for Acme")
    );
    assert_eq!(record.questions().len(), 1);
    assert_eq!(record.context.unwrap()[0].source, "q3.xlsx");
}

#[tokio::test]
async fn retrieve_unknown_id_is_status_error() {
    let (service, _) = start_stub().await;
    let err = service.retrieve_prompt(GOOD_KEY, "nope").await.unwrap_err();
    assert!(matches!(err, ServiceError::Status { status_code: 404, .. }));
}

#[tokio::test]
async fn respond_posts_full_question_list() {
    let (service, state) = start_stub().await;
    let answers = vec![
        QuestionAnswer::answered("Which region?", "EMEA"),
        QuestionAnswer::new("Which currency?"),
    ];
    service
        .respond_prompt(GOOD_KEY, "p-42", &answers)
        .await
        .unwrap();

    let posts = state.posts.lock().unwrap();
    assert_eq!(posts[0].0, "respond-prompt/p-42");
    let body = posts[0].1.as_array().unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[0]["answer"], "EMEA");
    assert!(body[1]["answer"].is_null());
}

#[tokio::test]
async fn prompt_id_with_reserved_characters_stays_one_segment() {
    let (service, state) = start_stub().await;
    service
        .respond_prompt(GOOD_KEY, "p 1/x?y", &[QuestionAnswer::new("Which region?")])
        .await
        .unwrap();

    let posts = state.posts.lock().unwrap();
    assert_eq!(posts[0].0, "respond-prompt/p 1/x?y");
}

#[tokio::test]
async fn history_normalizes_both_shapes() {
    let (service, _) = start_stub().await;

    let bare = service.list_history(GOOD_KEY, None).await.unwrap();
    assert_eq!(bare.len(), 1);
    assert_eq!(bare[0].schemas_used.as_deref(), Some(&["s1".to_string()][..]));
    assert!(bare[0].created_at.is_some());

    let wrapped = service
        .list_history(GOOD_KEY, Some("wrapped"))
        .await
        .unwrap();
    assert_eq!(wrapped, bare);

    let other = service.list_history(GOOD_KEY, Some("weird")).await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let service = HttpEnrichmentService::new("http://127.0.0.1:9").unwrap();
    let err = service.list_schemas(GOOD_KEY).await.unwrap_err();
    assert!(matches!(err, ServiceError::Network(_)));
    assert!(err.server_message().is_none());
}
