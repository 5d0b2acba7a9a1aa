//! # ContextOS Engine
//!
//! Turns a raw prompt plus selected context schemas into an enriched prompt
//! by driving the remote enrichment service:
//!
//! - `credentials`: the API key and the stores that persist it
//! - `catalog`: published context schemas
//! - `session`: the live session and its poll loop
//! - `history`: past completed prompts
//! - `assembler`: the final composite text
//! - `panel`: one facade over all of the above

pub mod assembler;
pub mod catalog;
pub mod credentials;
pub mod history;
pub mod panel;
pub mod session;

pub use assembler::assemble;
pub use catalog::ContextCatalog;
pub use credentials::{
    CREDENTIAL_KEY, Credential, CredentialStore, FileKeyValueStore, InMemoryKeyValueStore,
};
pub use history::HistoryRepository;
pub use panel::Panel;
pub use session::{EngineState, PollPolicy, SessionEngine};
