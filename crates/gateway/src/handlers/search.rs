//! Search handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use paper_curator_common::{
    errors::{AppError, Result},
    metrics,
    search::{SearchHit, SearchQuery},
};

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    /// Keywords. Blank returns the latest papers.
    #[validate(length(max = 500))]
    pub query: String,

    /// Maximum results to return
    #[serde(default = "default_size")]
    #[validate(range(min = 1, max = 50))]
    pub size: u32,

    /// Offset for pagination. `from + size` stays within the result window.
    #[serde(default)]
    #[validate(range(max = MAX_RESULT_WINDOW))]
    pub from: u32,

    /// Restrict to these arXiv categories
    #[serde(default)]
    pub categories: Vec<String>,

    /// Sort by publication date instead of relevance
    #[serde(default)]
    pub latest_papers: bool,
}

fn default_size() -> u32 { 10 }

/// OpenSearch's default `index.max_result_window`
const MAX_RESULT_WINDOW: u32 = 10_000;

impl SearchRequest {
    fn check_result_window(&self) -> Result<()> {
        if self.from.saturating_add(self.size) > MAX_RESULT_WINDOW {
            return Err(AppError::Validation {
                message: format!(
                    "from + size must not exceed {}, got {} + {}",
                    MAX_RESULT_WINDOW, self.from, self.size
                ),
                field: Some("from".to_string()),
            });
        }
        Ok(())
    }
}

/// Search response
#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub processing_time_ms: u64,
}

/// Keyword search over indexed papers
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;
    request.check_result_window()?;

    let query = SearchQuery {
        query: request.query,
        size: request.size,
        from: request.from,
        categories: request.categories,
        latest_papers: request.latest_papers,
    };

    let results = state.search.search(&query).await;
    let elapsed = start.elapsed();
    metrics::record_search(
        elapsed.as_secs_f64(),
        results.as_ref().map(|r| r.hits.len()).unwrap_or(0),
        results.is_ok(),
    );
    let results = results?;

    let processing_time_ms = elapsed.as_millis() as u64;

    tracing::info!(
        query = %query.query,
        total = results.total,
        returned = results.hits.len(),
        latency_ms = processing_time_ms,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        query: query.query,
        total: results.total,
        hits: results.hits,
        processing_time_ms,
    }))
}
