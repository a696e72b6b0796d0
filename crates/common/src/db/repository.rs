//! Repository for paper persistence
//!
//! Thin wrapper over SeaORM calls. The arXiv id is the natural key:
//! `create` refuses duplicates, `upsert` overwrites them. An upsert without
//! parsed PDF content leaves previously extracted content in place.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields supplied when storing a paper. Ids and timestamps are assigned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaper {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub published_date: DateTime<Utc>,
    pub pdf_url: String,
    pub raw_text: Option<String>,
    pub sections: Option<serde_json::Value>,
    pub parser_used: Option<String>,
    pub parser_metadata: Option<serde_json::Value>,
    pub pdf_processed: bool,
    pub pdf_processing_date: Option<DateTime<Utc>>,
}

impl NewPaper {
    fn into_active_model(self, now: DateTime<Utc>) -> PaperActiveModel {
        PaperActiveModel {
            id: Set(Uuid::new_v4()),
            arxiv_id: Set(self.arxiv_id),
            title: Set(self.title),
            authors: Set(serde_json::json!(self.authors)),
            abstract_text: Set(self.abstract_text),
            categories: Set(serde_json::json!(self.categories)),
            published_date: Set(self.published_date.into()),
            pdf_url: Set(self.pdf_url),
            raw_text: Set(self.raw_text),
            sections: Set(self.sections),
            parser_used: Set(self.parser_used),
            parser_metadata: Set(self.parser_metadata),
            pdf_processed: Set(self.pdf_processed),
            pdf_processing_date: Set(self.pdf_processing_date.map(Into::into)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}

/// Repository for paper data access
#[derive(Clone)]
pub struct PaperRepository {
    pool: DbPool,
}

impl PaperRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Insert a new paper. Fails with [`AppError::DuplicatePaper`] when the arXiv id exists.
    pub async fn create(&self, paper: NewPaper) -> Result<Paper> {
        let arxiv_id = paper.arxiv_id.clone();
        let model = paper.into_active_model(Utc::now());

        let created = model
            .insert(self.conn())
            .await
            .map_err(|e| AppError::from_paper_write(e, &arxiv_id))?;

        tracing::debug!(arxiv_id = %created.arxiv_id, id = %created.id, "Paper created");
        Ok(created)
    }

    /// Find paper by primary key
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Paper>> {
        PaperEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find paper by arXiv id
    pub async fn find_by_arxiv_id(&self, arxiv_id: &str) -> Result<Option<Paper>> {
        PaperEntity::find()
            .filter(PaperColumn::ArxivId.eq(arxiv_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// List papers, newest publication first, with the total row count.
    /// Offsets and limits past `i64::MAX` are clamped, the SQL drivers bind them as signed.
    pub async fn list(&self, offset: u64, limit: u64) -> Result<(Vec<Paper>, u64)> {
        let total = PaperEntity::find().count(self.conn()).await?;

        let papers = PaperEntity::find()
            .order_by_desc(PaperColumn::PublishedDate)
            .order_by_asc(PaperColumn::ArxivId)
            .offset(offset.min(i64::MAX as u64))
            .limit(limit.min(i64::MAX as u64))
            .all(self.conn())
            .await?;

        Ok((papers, total))
    }

    /// Total number of stored papers
    pub async fn count(&self) -> Result<u64> {
        PaperEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Insert the paper or overwrite the row with the same arXiv id.
    ///
    /// An existing row keeps its `id` and `created_at`. Content columns are
    /// only overwritten when `pdf_processed` is set, so a metadata-only run
    /// or a failed download never erases earlier extracted text.
    pub async fn upsert(&self, paper: NewPaper) -> Result<Paper> {
        let arxiv_id = paper.arxiv_id.clone();
        let with_content = paper.pdf_processed;
        let model = paper.into_active_model(Utc::now());

        let mut columns = vec![
            PaperColumn::Title,
            PaperColumn::Authors,
            PaperColumn::AbstractText,
            PaperColumn::Categories,
            PaperColumn::PublishedDate,
            PaperColumn::PdfUrl,
            PaperColumn::UpdatedAt,
        ];
        if with_content {
            columns.extend([
                PaperColumn::RawText,
                PaperColumn::Sections,
                PaperColumn::ParserUsed,
                PaperColumn::ParserMetadata,
                PaperColumn::PdfProcessed,
                PaperColumn::PdfProcessingDate,
            ]);
        }

        let on_conflict = OnConflict::column(PaperColumn::ArxivId)
            .update_columns(columns)
            .to_owned();

        PaperEntity::insert(model)
            .on_conflict(on_conflict)
            .exec_without_returning(self.conn())
            .await?;

        let stored = self
            .find_by_arxiv_id(&arxiv_id)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("Paper {} missing after upsert", arxiv_id),
            })?;

        tracing::debug!(arxiv_id = %stored.arxiv_id, id = %stored.id, "Paper upserted");
        Ok(stored)
    }
}
