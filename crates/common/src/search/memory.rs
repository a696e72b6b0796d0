//! In-process search engine
//!
//! Naive term matching over title, abstract and authors with the same
//! field weights as the OpenSearch query. Intended for local runs and tests.

use super::{PaperDocument, SearchEngine, SearchHit, SearchQuery, SearchResults};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

pub struct MemorySearchEngine {
    docs: RwLock<BTreeMap<String, PaperDocument>>,
    available: AtomicBool,
}

impl Default for MemorySearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySearchEngine {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage. Every call fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The stored document for an arXiv id, if indexed
    pub fn document(&self, arxiv_id: &str) -> Option<PaperDocument> {
        self.docs.read().ok()?.get(arxiv_id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::ServiceUnavailable {
                message: "search engine unavailable".to_string(),
            })
        }
    }

    fn poisoned() -> AppError {
        AppError::Internal {
            message: "search index lock poisoned".to_string(),
        }
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_hits(field: &str, query_terms: &[String]) -> f64 {
    let field_terms = terms(field);
    query_terms
        .iter()
        .filter(|q| field_terms.iter().any(|t| t == *q))
        .count() as f64
}

fn score(doc: &PaperDocument, query_terms: &[String]) -> f64 {
    3.0 * field_hits(&doc.title, query_terms)
        + 2.0 * field_hits(&doc.abstract_text, query_terms)
        + field_hits(&doc.authors, query_terms)
}

#[async_trait]
impl SearchEngine for MemorySearchEngine {
    async fn ensure_index(&self, force: bool) -> Result<bool> {
        self.check_available()?;
        if force {
            self.docs.write().map_err(|_| Self::poisoned())?.clear();
        }
        Ok(force)
    }

    async fn index_paper(&self, doc: &PaperDocument) -> Result<()> {
        self.check_available()?;
        self.docs
            .write()
            .map_err(|_| Self::poisoned())?
            .insert(doc.arxiv_id.clone(), doc.clone());
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        self.check_available()?;
        let docs = self.docs.read().map_err(|_| Self::poisoned())?;

        let query_terms = terms(&query.query);
        let blank = query_terms.is_empty();

        let mut matched: Vec<(f64, &PaperDocument)> = docs
            .values()
            .filter(|doc| {
                query.categories.is_empty()
                    || doc.categories.iter().any(|c| query.categories.contains(c))
            })
            .map(|doc| (if blank { 1.0 } else { score(doc, &query_terms) }, doc))
            .filter(|(s, _)| *s > 0.0)
            .collect();

        if blank || query.latest_papers {
            matched.sort_by(|a, b| b.1.published_date.cmp(&a.1.published_date));
        } else {
            matched.sort_by(|a, b| b.0.total_cmp(&a.0));
        }

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(query.from as usize)
            .take(query.size as usize)
            .map(|(s, doc)| SearchHit {
                arxiv_id: doc.arxiv_id.clone(),
                title: doc.title.clone(),
                authors: doc.authors.clone(),
                abstract_text: doc.abstract_text.clone(),
                categories: doc.categories.clone(),
                published_date: Some(doc.published_date.to_rfc3339()),
                pdf_url: doc.pdf_url.clone(),
                score: Some(s),
                highlights: None,
            })
            .collect();

        Ok(SearchResults { total, hits })
    }

    async fn count(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.docs.read().map_err(|_| Self::poisoned())?.len() as u64)
    }

    async fn health_check(&self) -> Result<String> {
        self.check_available()?;
        Ok("green".to_string())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
