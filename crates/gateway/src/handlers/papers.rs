//! Paper management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use paper_curator_common::{
    db::{models::Paper, NewPaper, PaperRepository},
    errors::{AppError, Result},
};

/// Request to create a new paper
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaperRequest {
    #[validate(length(min = 1, max = 64))]
    pub arxiv_id: String,

    #[validate(length(min = 1, max = 1000))]
    pub title: String,

    #[validate(length(min = 1))]
    pub authors: Vec<String>,

    #[validate(length(min = 1, max = 50000))]
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    #[serde(default)]
    pub categories: Vec<String>,

    pub published_date: DateTime<Utc>,

    #[validate(url)]
    pub pdf_url: String,

    #[serde(default)]
    pub raw_text: Option<String>,

    #[serde(default)]
    pub sections: Option<serde_json::Value>,

    #[serde(default)]
    pub parser_used: Option<String>,

    #[serde(default)]
    pub parser_metadata: Option<serde_json::Value>,

    #[serde(default)]
    pub pdf_processed: bool,

    #[serde(default)]
    pub pdf_processing_date: Option<DateTime<Utc>>,
}

impl From<CreatePaperRequest> for NewPaper {
    fn from(req: CreatePaperRequest) -> Self {
        NewPaper {
            arxiv_id: req.arxiv_id,
            title: req.title,
            authors: req.authors,
            abstract_text: req.abstract_text,
            categories: req.categories,
            published_date: req.published_date,
            pdf_url: req.pdf_url,
            raw_text: req.raw_text,
            sections: req.sections,
            parser_used: req.parser_used,
            parser_metadata: req.parser_metadata,
            pdf_processed: req.pdf_processed,
            pdf_processing_date: req.pdf_processing_date,
        }
    }
}

/// SQL OFFSET is a signed 64-bit value
const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Deserialize, Validate)]
pub struct ListPapersParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,

    #[serde(default)]
    #[validate(range(max = MAX_OFFSET))]
    pub offset: u64,
}

fn default_limit() -> u64 { 10 }

/// Paper as returned by the API
#[derive(Debug, Serialize)]
pub struct PaperResponse {
    pub id: Uuid,
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub published_date: String,
    pub pdf_url: String,
    pub raw_text: Option<String>,
    pub sections: Option<serde_json::Value>,
    pub parser_used: Option<String>,
    pub parser_metadata: Option<serde_json::Value>,
    pub pdf_processed: bool,
    pub pdf_processing_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Paper> for PaperResponse {
    fn from(paper: Paper) -> Self {
        Self {
            authors: paper.author_names(),
            categories: paper.category_names(),
            id: paper.id,
            arxiv_id: paper.arxiv_id,
            title: paper.title,
            abstract_text: paper.abstract_text,
            published_date: paper.published_date.to_rfc3339(),
            pdf_url: paper.pdf_url,
            raw_text: paper.raw_text,
            sections: paper.sections,
            parser_used: paper.parser_used,
            parser_metadata: paper.parser_metadata,
            pdf_processed: paper.pdf_processed,
            pdf_processing_date: paper.pdf_processing_date.map(|dt| dt.to_rfc3339()),
            created_at: paper.created_at.to_rfc3339(),
            updated_at: paper.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct PaperListResponse {
    pub papers: Vec<PaperResponse>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// List stored papers, newest first
pub async fn list_papers(
    State(state): State<AppState>,
    Query(params): Query<ListPapersParams>,
) -> Result<Json<PaperListResponse>> {
    params.validate().map_err(|e| AppError::Validation {
        field: e.field_errors().keys().next().map(|field| field.to_string()),
        message: e.to_string(),
    })?;

    let repo = PaperRepository::new(state.db.clone());
    let (papers, total) = repo.list(params.offset, params.limit).await?;

    Ok(Json(PaperListResponse {
        papers: papers.into_iter().map(PaperResponse::from).collect(),
        total,
        limit: params.limit,
        offset: params.offset,
    }))
}

/// Get a paper by arXiv id
pub async fn get_paper(
    State(state): State<AppState>,
    Path(arxiv_id): Path<String>,
) -> Result<Json<PaperResponse>> {
    let repo = PaperRepository::new(state.db.clone());

    let paper = repo
        .find_by_arxiv_id(&arxiv_id)
        .await?
        .ok_or(AppError::PaperNotFound { arxiv_id })?;

    Ok(Json(paper.into()))
}

/// Store a new paper. A second paper with the same arXiv id is a 409.
pub async fn create_paper(
    State(state): State<AppState>,
    Json(request): Json<CreatePaperRequest>,
) -> Result<(StatusCode, Json<PaperResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let repo = PaperRepository::new(state.db.clone());
    let paper = repo.create(request.into()).await?;

    tracing::info!(
        paper_id = %paper.id,
        arxiv_id = %paper.arxiv_id,
        title = %paper.title,
        "Paper created"
    );

    Ok((StatusCode::CREATED, Json(paper.into())))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{json_body, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    fn paper_body(arxiv_id: &str) -> serde_json::Value {
        json!({
            "arxiv_id": arxiv_id,
            "title": "Chain-of-Thought Prompting",
            "authors": ["Jason Wei", "Xuezhi Wang"],
            "abstract": "We explore how generating a chain of thought improves reasoning.",
            "categories": ["cs.CL", "cs.AI"],
            "published_date": "2022-01-28T02:33:07Z",
            "pdf_url": format!("https://arxiv.org/pdf/{arxiv_id}")
        })
    }

    #[tokio::test]
    async fn test_create_then_get_returns_identical_fields() {
        let app = TestApp::new().await;

        let response = app.post_json("/api/v1/papers", paper_body("2201.11903")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;

        let response = app.get("/api/v1/papers/2201.11903").await;
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = json_body(response).await;

        assert_eq!(created, fetched);
        assert_eq!(fetched["title"], "Chain-of-Thought Prompting");
        assert_eq!(fetched["authors"], json!(["Jason Wei", "Xuezhi Wang"]));
        assert_eq!(fetched["categories"], json!(["cs.CL", "cs.AI"]));
        assert_eq!(
            fetched["abstract"],
            "We explore how generating a chain of thought improves reasoning."
        );
        assert_eq!(fetched["pdf_processed"], false);
    }

    #[tokio::test]
    async fn test_duplicate_arxiv_id_is_conflict() {
        let app = TestApp::new().await;

        let first = app.post_json("/api/v1/papers", paper_body("2201.11903")).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.post_json("/api/v1/papers", paper_body("2201.11903")).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = json_body(second).await;
        assert_eq!(body["error"]["code"], "DUPLICATE_PAPER");
    }

    #[tokio::test]
    async fn test_invalid_paper_is_bad_request() {
        let app = TestApp::new().await;

        let mut body = paper_body("2201.11903");
        body["title"] = json!("");
        let response = app.post_json("/api/v1/papers", body).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_get_old_style_id_with_slash() {
        let app = TestApp::new().await;
        let response = app.post_json("/api/v1/papers", paper_body("hep-th/9901001")).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.get("/api/v1/papers/hep-th/9901001").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["arxiv_id"], "hep-th/9901001");
    }

    #[tokio::test]
    async fn test_missing_paper_is_not_found() {
        let app = TestApp::new().await;
        let response = app.get("/api/v1/papers/9999.99999").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "PAPER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_papers_paginates() {
        let app = TestApp::new().await;
        for id in ["2201.00001", "2201.00002", "2201.00003"] {
            app.post_json("/api/v1/papers", paper_body(id)).await;
        }

        let body = json_body(app.get("/api/v1/papers?limit=2&offset=0").await).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["papers"].as_array().unwrap().len(), 2);
        assert_eq!(body["limit"], 2);

        let response = app.get("/api/v1/papers?limit=500").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_papers_offset_beyond_sql_range_is_bad_request() {
        let app = TestApp::new().await;
        app.post_json("/api/v1/papers", paper_body("2201.00001")).await;

        let response = app.get("/api/v1/papers?offset=18446744073709551615").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["field"], "offset");

        let body = json_body(app.get("/api/v1/papers?offset=9223372036854775807").await).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["papers"].as_array().unwrap().len(), 0);
    }
}
