//! Keyword search over indexed papers
//!
//! Provides:
//! - [`SearchEngine`] trait used by the gateway and the ingestion pipeline
//! - [`OpenSearchClient`] talking to OpenSearch over its REST API
//! - [`MemorySearchEngine`] for local runs and tests
//! - the query builder and index mapping

mod index;
mod memory;
mod opensearch;
mod query;

pub use index::{papers_index_body, DEFAULT_INDEX_NAME};
pub use memory::MemorySearchEngine;
pub use opensearch::OpenSearchClient;
pub use query::{PaperQueryBuilder, DEFAULT_FIELDS, SOURCE_FIELDS};

use crate::config::OpenSearchConfig;
use crate::db::models::Paper;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Document stored in the papers index, keyed by arXiv id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperDocument {
    pub arxiv_id: String,
    pub title: String,
    /// Comma-separated author names
    pub authors: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub pdf_url: String,
    pub published_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaperDocument {
    /// Build the index document for a stored paper. `raw_text` is cut to `max_text_size` chars.
    pub fn from_paper(paper: &Paper, max_text_size: usize) -> Self {
        Self {
            arxiv_id: paper.arxiv_id.clone(),
            title: paper.title.clone(),
            authors: paper.author_names().join(", "),
            abstract_text: paper.abstract_text.clone(),
            categories: paper.category_names(),
            raw_text: paper
                .raw_text
                .as_ref()
                .map(|text| text.chars().take(max_text_size).collect()),
            pdf_url: paper.pdf_url.clone(),
            published_date: paper.published_date.with_timezone(&Utc),
            created_at: paper.created_at.with_timezone(&Utc),
            updated_at: paper.updated_at.with_timezone(&Utc),
        }
    }
}

/// Search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub size: u32,
    pub from: u32,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub latest_papers: bool,
}

/// A single search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub arxiv_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub pdf_url: String,
    /// BM25 score. Absent when results are sorted by date.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// Trait for the keyword search backend
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create the papers index. Returns `false` when it already existed and `force` is off.
    async fn ensure_index(&self, force: bool) -> Result<bool>;

    /// Index or replace one paper document
    async fn index_paper(&self, doc: &PaperDocument) -> Result<()>;

    /// Run a keyword search
    async fn search(&self, query: &SearchQuery) -> Result<SearchResults>;

    /// Number of documents in the index
    async fn count(&self) -> Result<u64>;

    /// Cluster status (`green` or `yellow`). Errors when unreachable or `red`.
    async fn health_check(&self) -> Result<String>;

    /// Backend name for logs and health output
    fn name(&self) -> &str;
}

/// Create a search engine from configuration.
///
/// `host = "memory"` selects the in-process engine.
pub fn create_search_engine(config: &OpenSearchConfig) -> Result<Arc<dyn SearchEngine>> {
    match config.host.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory search engine, documents are not persisted");
            Ok(Arc::new(MemorySearchEngine::new()))
        }
        _ => Ok(Arc::new(OpenSearchClient::new(config)?)),
    }
}
