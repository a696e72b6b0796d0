//! Question answering handler
//!
//! Sources come from the keyword index. The question is forwarded to
//! Ollama untouched when `llm.enabled` is set; otherwise a placeholder
//! answer is returned so clients can integrate against the response shape.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use paper_curator_common::{
    errors::{AppError, Result},
    search::SearchQuery,
};

#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,

    /// Number of source papers to attach
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 10))]
    pub top_k: u32,

    /// Defaults to `llm.default_model`
    #[serde(default)]
    pub model: Option<String>,
}

fn default_top_k() -> u32 { 3 }

#[derive(Debug, Serialize)]
pub struct PaperSource {
    pub arxiv_id: String,
    pub title: String,
    pub pdf_url: String,
    pub score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<PaperSource>,
    pub model: String,
    /// Whether `answer` came from the model
    pub llm_used: bool,
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let llm_config = &state.config.llm;
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| llm_config.default_model.clone());

    if !llm_config.models.contains(&model) {
        return Err(AppError::Validation {
            message: format!(
                "Model {} is not configured, expected one of: {}",
                model,
                llm_config.models.join(", ")
            ),
            field: Some("model".to_string()),
        });
    }

    let search = SearchQuery {
        query: request.query.clone(),
        size: request.top_k,
        ..SearchQuery::default()
    };
    let sources: Vec<PaperSource> = match state.search.search(&search).await {
        Ok(results) => results
            .hits
            .into_iter()
            .map(|hit| PaperSource {
                arxiv_id: hit.arxiv_id,
                title: hit.title,
                pdf_url: hit.pdf_url,
                score: hit.score,
            })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Source lookup failed, answering without sources");
            Vec::new()
        }
    };

    let (answer, llm_used) = if llm_config.enabled {
        let generation = state.llm.generate(&model, &request.query).await?;
        (generation.response, true)
    } else {
        (
            format!(
                "Answer generation is not enabled yet. \
                 Found {} related paper(s) for this question.",
                sources.len()
            ),
            false,
        )
    };

    tracing::info!(
        query = %request.query,
        model = %model,
        sources = sources.len(),
        llm_used,
        "Question answered"
    );

    Ok(Json(AskResponse {
        query: request.query,
        answer,
        sources,
        model,
        llm_used,
    }))
}
