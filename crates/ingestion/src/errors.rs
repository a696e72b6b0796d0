//! Ingestion service error types

use paper_curator_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("arXiv API error: {0}")]
    ArxivApi(String),

    #[error("arXiv API request timed out after {0}s")]
    ArxivTimeout(u64),

    #[error("arXiv API rate limit exceeded")]
    ArxivRateLimited,

    #[error("Failed to parse arXiv feed: {0}")]
    ArxivParse(String),

    #[error("PDF download failed for {arxiv_id}: {message}")]
    PdfDownload { arxiv_id: String, message: String },

    #[error("PDF download timed out for {0}")]
    PdfDownloadTimeout(String),

    #[error("PDF parse error for {path}: {message}")]
    PdfParse { path: String, message: String },

    #[error("Invalid PDF {path}: {message}")]
    PdfValidation { path: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Search index error: {0}")]
    SearchIndex(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::SearchEngine { .. } | AppError::ServiceUnavailable { .. } => {
                IngestionError::SearchIndex(e.to_string())
            }
            AppError::Configuration { message } => IngestionError::Config(message),
            other => IngestionError::Database(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for IngestionError {
    fn from(e: reqwest::Error) -> Self {
        IngestionError::ArxivApi(e.to_string())
    }
}
