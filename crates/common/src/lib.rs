//! Paper Curator Common Library
//!
//! Shared code for the gateway and ingestion binaries:
//! - Database entity and paper repository
//! - OpenSearch client and query builder
//! - Ollama client
//! - Error types and handling
//! - Configuration management
//! - Metrics and tracing setup

pub mod config;
pub mod db;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod search;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, NewPaper, PaperRepository};
pub use errors::{AppError, Result};
pub use llm::LlmClient;
pub use search::SearchEngine;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
