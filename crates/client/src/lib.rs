//! Remote enrichment service client for ContextOS.
//!
//! Implements the `contextos_core::EnrichmentService` trait over HTTP.

pub mod http;

pub use http::HttpEnrichmentService;
