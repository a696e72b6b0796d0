//! Ingestion processor
//!
//! Fetches one batch of arXiv metadata, then walks the papers one at a time:
//! download PDF, parse, upsert into the database, index into search.

use crate::arxiv::{ArxivClient, ArxivPaper};
use crate::errors::IngestionError;
use crate::pdf::{PdfContent, PdfParser};
use chrono::Utc;
use paper_curator_common::db::{DbPool, NewPaper, PaperRepository};
use paper_curator_common::metrics;
use paper_curator_common::search::{PaperDocument, SearchEngine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// What a single run should do
#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub max_results: u32,
    /// `YYYYMMDD`, inclusive
    pub from_date: Option<String>,
    /// `YYYYMMDD`, inclusive
    pub to_date: Option<String>,
    pub process_pdfs: bool,
    pub store_to_db: bool,
    pub index_to_search: bool,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            from_date: None,
            to_date: None,
            process_pdfs: true,
            store_to_db: true,
            index_to_search: true,
        }
    }
}

/// Outcome of a run. Per-paper failures are listed in `errors`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestionReport {
    pub papers_fetched: usize,
    pub pdfs_downloaded: usize,
    pub pdfs_parsed: usize,
    pub papers_stored: usize,
    pub papers_indexed: usize,
    pub errors: Vec<String>,
    pub processing_time_secs: f64,
}

impl IngestionReport {
    fn record_error(&mut self, arxiv_id: &str, stage: &'static str, e: &IngestionError) {
        error!(arxiv_id = %arxiv_id, stage, error = %e, "Paper processing step failed");
        metrics::record_paper_stage(stage, false);
        self.errors.push(format!("{} ({}): {}", arxiv_id, stage, e));
    }
}

/// Ingestion processor
pub struct IngestionProcessor {
    arxiv: ArxivClient,
    parser: PdfParser,
    repository: PaperRepository,
    search: Arc<dyn SearchEngine>,
    max_text_size: usize,
}

impl IngestionProcessor {
    pub fn new(
        arxiv: ArxivClient,
        parser: PdfParser,
        db_pool: DbPool,
        search: Arc<dyn SearchEngine>,
        max_text_size: usize,
    ) -> Self {
        Self {
            arxiv,
            parser,
            repository: PaperRepository::new(db_pool),
            search,
            max_text_size,
        }
    }

    /// Run the pipeline once. Only a failed metadata fetch aborts the run.
    #[instrument(skip(self, options), fields(from = ?options.from_date, to = ?options.to_date))]
    pub async fn fetch_and_process_papers(
        &self,
        options: &IngestionOptions,
    ) -> Result<IngestionReport, IngestionError> {
        let start = Instant::now();

        let papers = self
            .arxiv
            .fetch_papers(
                options.max_results,
                options.from_date.as_deref(),
                options.to_date.as_deref(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch papers from arXiv, aborting run");
                metrics::record_paper_stage("fetched", false);
                e
            })?;

        Ok(self.process_batch(&papers, options, start).await)
    }

    /// Run the pipeline for one paper looked up by id
    #[instrument(skip(self, options))]
    pub async fn ingest_paper_by_id(
        &self,
        arxiv_id: &str,
        options: &IngestionOptions,
    ) -> Result<IngestionReport, IngestionError> {
        let start = Instant::now();
        let paper = self.arxiv.fetch_paper_by_id(arxiv_id).await?.ok_or_else(|| {
            IngestionError::ArxivApi(format!("Paper {} not found on arXiv", arxiv_id))
        })?;

        Ok(self.process_batch(&[paper], options, start).await)
    }

    async fn process_batch(
        &self,
        papers: &[ArxivPaper],
        options: &IngestionOptions,
        start: Instant,
    ) -> IngestionReport {
        let mut report = IngestionReport {
            papers_fetched: papers.len(),
            ..IngestionReport::default()
        };
        for _ in papers {
            metrics::record_paper_stage("fetched", true);
        }

        for paper in papers {
            self.process_paper(paper, options, &mut report).await;
        }

        let elapsed = start.elapsed().as_secs_f64();
        report.processing_time_secs = elapsed;
        metrics::record_ingestion(elapsed);

        info!(
            fetched = report.papers_fetched,
            downloaded = report.pdfs_downloaded,
            parsed = report.pdfs_parsed,
            stored = report.papers_stored,
            indexed = report.papers_indexed,
            errors = report.errors.len(),
            elapsed_secs = elapsed,
            "Ingestion run complete"
        );

        report
    }

    #[instrument(skip_all, fields(arxiv_id = %paper.arxiv_id))]
    async fn process_paper(
        &self,
        paper: &ArxivPaper,
        options: &IngestionOptions,
        report: &mut IngestionReport,
    ) {
        let content = if options.process_pdfs {
            self.download_and_parse(paper, report).await
        } else {
            None
        };

        let new_paper = to_new_paper(paper, content);

        let stored = if options.store_to_db {
            match self.repository.upsert(new_paper.clone()).await {
                Ok(stored) => {
                    report.papers_stored += 1;
                    metrics::record_paper_stage("stored", true);
                    Some(stored)
                }
                Err(e) => {
                    report.record_error(&paper.arxiv_id, "stored", &e.into());
                    return;
                }
            }
        } else {
            None
        };

        if options.index_to_search {
            let doc = match &stored {
                Some(stored) => PaperDocument::from_paper(stored, self.max_text_size),
                None => document_from_new(&new_paper, self.max_text_size),
            };
            match self.search.index_paper(&doc).await {
                Ok(()) => {
                    report.papers_indexed += 1;
                    metrics::record_paper_stage("indexed", true);
                }
                Err(e) => report.record_error(&paper.arxiv_id, "indexed", &e.into()),
            }
        }
    }

    async fn download_and_parse(
        &self,
        paper: &ArxivPaper,
        report: &mut IngestionReport,
    ) -> Option<PdfContent> {
        let path = match self.arxiv.download_pdf(paper, true).await {
            Ok(path) => {
                report.pdfs_downloaded += 1;
                metrics::record_paper_stage("downloaded", true);
                path
            }
            Err(e) => {
                report.record_error(&paper.arxiv_id, "downloaded", &e);
                return None;
            }
        };

        match self.parser.parse(&path).await {
            Ok(content) => {
                report.pdfs_parsed += 1;
                metrics::record_paper_stage("parsed", true);
                Some(content)
            }
            Err(e) => {
                warn!(arxiv_id = %paper.arxiv_id, "Storing metadata without PDF content");
                report.record_error(&paper.arxiv_id, "parsed", &e);
                None
            }
        }
    }
}

/// Merge feed metadata with parsed content into a row to upsert
fn to_new_paper(paper: &ArxivPaper, content: Option<PdfContent>) -> NewPaper {
    let mut new_paper = NewPaper {
        arxiv_id: paper.arxiv_id.clone(),
        title: paper.title.clone(),
        authors: paper.authors.clone(),
        abstract_text: paper.abstract_text.clone(),
        categories: paper.categories.clone(),
        published_date: paper.published_date,
        pdf_url: paper.pdf_url.clone(),
        raw_text: None,
        sections: None,
        parser_used: None,
        parser_metadata: Some(serde_json::json!({ "note": "PDF not processed" })),
        pdf_processed: false,
        pdf_processing_date: None,
    };

    if let Some(content) = content {
        new_paper.raw_text = Some(content.raw_text);
        new_paper.sections = serde_json::to_value(&content.sections).ok();
        new_paper.parser_used = Some(content.parser_used);
        new_paper.parser_metadata = serde_json::to_value(&content.metadata).ok();
        new_paper.pdf_processed = true;
        new_paper.pdf_processing_date = Some(Utc::now());
    }

    new_paper
}

fn document_from_new(paper: &NewPaper, max_text_size: usize) -> PaperDocument {
    let now = Utc::now();
    PaperDocument {
        arxiv_id: paper.arxiv_id.clone(),
        title: paper.title.clone(),
        authors: paper.authors.join(", "),
        abstract_text: paper.abstract_text.clone(),
        categories: paper.categories.clone(),
        raw_text: paper
            .raw_text
            .as_ref()
            .map(|text| text.chars().take(max_text_size).collect()),
        pdf_url: paper.pdf_url.clone(),
        published_date: paper.published_date,
        created_at: now,
        updated_at: now,
    }
}
