//! # ContextOS Core
//!
//! Domain types, traits, and error definitions for the ContextOS
//! prompt-enhancement client. This crate has no HTTP or storage
//! dependencies; it defines the model the other crates implement against.
//!
//! The remote service and the local key-value store are traits here.
//! Implementations live in `contextos-client` and `contextos-engine`, which
//! keeps the engine testable against scripted stand-ins.

pub mod error;
pub mod event;
pub mod schema;
pub mod service;
pub mod session;
pub mod storage;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, ServiceError};
pub use event::{DomainEvent, EventBus};
pub use schema::{ContextSchema, ContextType};
pub use service::{EnrichmentService, SubmitPromptRequest};
pub use session::{
    ContextFragment, FileExtract, HistoryEntry, PromptRecord, PromptSession, QuestionAnswer,
    SessionStatus,
};
pub use storage::KeyValueStore;
