//! arXiv API client
//!
//! Fetches paper metadata from the Atom export API and downloads PDFs into a
//! local cache. Every outbound call waits on a shared politeness limiter.

use crate::errors::IngestionError;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use paper_curator_common::config::ArxivConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Paper metadata as published in the arXiv feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivPaper {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub published_date: DateTime<Utc>,
    pub pdf_url: String,
}

/// Client for the arXiv export API
pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
    category: String,
    cache_dir: PathBuf,
    timeout_secs: u64,
    max_pdf_bytes: u64,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl ArxivClient {
    /// `max_pdf_bytes` bounds downloads; pass the parser's size limit.
    pub fn new(config: &ArxivConfig, max_pdf_bytes: u64) -> Result<Self, IngestionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("paper-curator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestionError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let delay = Duration::from_secs_f64(config.rate_limit_delay_secs.max(0.0));
        let limiter = Quota::with_period(delay).map(|quota| Arc::new(RateLimiter::direct(quota)));

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            category: config.search_category.clone(),
            cache_dir: PathBuf::from(&config.pdf_cache_dir),
            timeout_secs: config.timeout_secs,
            max_pdf_bytes,
            limiter,
        })
    }

    async fn wait_turn(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Fetch the newest papers in the configured category.
    ///
    /// Dates are `YYYYMMDD`; an open end is sent as `*`.
    #[instrument(skip(self), fields(category = %self.category))]
    pub async fn fetch_papers(
        &self,
        max_results: u32,
        from_date: Option<&str>,
        to_date: Option<&str>,
    ) -> Result<Vec<ArxivPaper>, IngestionError> {
        let search_query = build_search_query(&self.category, from_date, to_date);
        let max_results = max_results.to_string();

        let feed = self
            .get_feed(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .await?;

        let papers = parse_feed(&feed)?;
        info!(count = papers.len(), query = %search_query, "Fetched papers from arXiv");
        Ok(papers)
    }

    /// Look up a single paper. Returns `None` when arXiv has no such id.
    #[instrument(skip(self))]
    pub async fn fetch_paper_by_id(
        &self,
        arxiv_id: &str,
    ) -> Result<Option<ArxivPaper>, IngestionError> {
        let clean_id = strip_version(arxiv_id);
        let feed = self
            .get_feed(&[("id_list", clean_id.as_str()), ("max_results", "1")])
            .await?;

        Ok(parse_feed(&feed)?.into_iter().next())
    }

    async fn get_feed(&self, query: &[(&str, &str)]) -> Result<String, IngestionError> {
        self.wait_turn().await;

        let response = self
            .client
            .get(&self.base_url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IngestionError::ArxivTimeout(self.timeout_secs)
                } else {
                    IngestionError::ArxivApi(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestionError::ArxivRateLimited);
        }
        if !status.is_success() {
            return Err(IngestionError::ArxivApi(format!("HTTP {}", status)));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                IngestionError::ArxivTimeout(self.timeout_secs)
            } else {
                IngestionError::ArxivApi(e.to_string())
            }
        })
    }

    /// Path a paper's PDF is cached under
    pub fn cache_path(&self, arxiv_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.pdf", arxiv_id.replace('/', "_")))
    }

    /// Download a paper's PDF, reusing the cached file when allowed.
    #[instrument(skip(self, paper), fields(arxiv_id = %paper.arxiv_id))]
    pub async fn download_pdf(
        &self,
        paper: &ArxivPaper,
        use_cache: bool,
    ) -> Result<PathBuf, IngestionError> {
        let path = self.cache_path(&paper.arxiv_id);

        if use_cache && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "Using cached PDF");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        self.wait_turn().await;

        let download_error = |message: String| IngestionError::PdfDownload {
            arxiv_id: paper.arxiv_id.clone(),
            message,
        };
        let map_send_error = |e: reqwest::Error| {
            if e.is_timeout() {
                IngestionError::PdfDownloadTimeout(paper.arxiv_id.clone())
            } else {
                download_error(e.to_string())
            }
        };

        let mut response = self
            .client
            .get(&paper.pdf_url)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_pdf_bytes {
                return Err(download_error(format!(
                    "PDF is {} bytes, limit is {}",
                    length, self.max_pdf_bytes
                )));
            }
        }

        // Content-Length may be missing or wrong, so the limit holds per chunk
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_send_error)? {
            if (body.len() + chunk.len()) as u64 > self.max_pdf_bytes {
                return Err(download_error(format!(
                    "PDF exceeds the {} byte limit",
                    self.max_pdf_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        write_atomically(&path, &body).await?;
        info!(path = %path.display(), bytes = body.len(), "Downloaded PDF");
        Ok(path)
    }
}

/// Write through a temporary file so a failed download never leaves a
/// truncated PDF in the cache.
async fn write_atomically(path: &Path, body: &[u8]) -> Result<(), IngestionError> {
    let tmp = path.with_extension("pdf.part");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn build_search_query(category: &str, from_date: Option<&str>, to_date: Option<&str>) -> String {
    let mut query = format!("cat:{}", category);
    if from_date.is_some() || to_date.is_some() {
        let from = from_date.map(|d| format!("{}0000", d)).unwrap_or_else(|| "*".to_string());
        let to = to_date.map(|d| format!("{}2359", d)).unwrap_or_else(|| "*".to_string());
        query.push_str(&format!(" AND submittedDate:[{} TO {}]", from, to));
    }
    query
}

fn version_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v\d+$").expect("version suffix pattern is valid"))
}

fn strip_version(arxiv_id: &str) -> String {
    version_suffix().replace(arxiv_id, "").into_owned()
}

/// `http://arxiv.org/abs/2401.00001v2` -> `2401.00001`
fn id_from_entry_url(url: &str) -> String {
    let tail = url.split("/abs/").nth(1).unwrap_or(url);
    strip_version(tail)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// arXiv still emits `http://` links for its own hosts
fn https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) if rest.starts_with("arxiv.org/") || rest.starts_with("export.arxiv.org/") => {
            format!("https://{}", rest)
        }
        _ => url.to_string(),
    }
}

fn child_text<'a, 'input>(node: roxmltree::Node<'a, 'input>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name((ATOM_NS, name)))
        .and_then(|n| n.text())
}

/// Parse an Atom feed into papers. Malformed entries are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivPaper>, IngestionError> {
    let doc =
        roxmltree::Document::parse(xml).map_err(|e| IngestionError::ArxivParse(e.to_string()))?;

    let feed = doc.root_element();
    if !feed.has_tag_name((ATOM_NS, "feed")) {
        return Err(IngestionError::ArxivParse(format!(
            "Expected Atom feed, found <{}>",
            feed.tag_name().name()
        )));
    }

    let mut papers = Vec::new();
    for entry in feed.children().filter(|n| n.has_tag_name((ATOM_NS, "entry"))) {
        let Some(id_url) = child_text(entry, "id") else {
            warn!("Skipping feed entry without id");
            continue;
        };

        // arXiv reports query errors as a single entry under /api/errors
        if id_url.contains("/api/errors") {
            let message = child_text(entry, "summary").unwrap_or("unknown error");
            return Err(IngestionError::ArxivApi(collapse_whitespace(message)));
        }

        match parse_entry(entry, id_url) {
            Ok(paper) => papers.push(paper),
            Err(e) => warn!(entry = %id_url, error = %e, "Skipping malformed feed entry"),
        }
    }

    Ok(papers)
}

fn parse_entry(entry: roxmltree::Node, id_url: &str) -> Result<ArxivPaper, IngestionError> {
    let arxiv_id = id_from_entry_url(id_url);

    let title = collapse_whitespace(child_text(entry, "title").unwrap_or_default());
    let abstract_text = collapse_whitespace(child_text(entry, "summary").unwrap_or_default());

    let authors = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "author")))
        .filter_map(|author| child_text(author, "name"))
        .map(collapse_whitespace)
        .collect();

    let categories = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "category")))
        .filter_map(|n| n.attribute("term"))
        .map(str::to_string)
        .collect();

    let published = child_text(entry, "published").ok_or_else(|| {
        IngestionError::ArxivParse(format!("{}: missing published date", arxiv_id))
    })?;
    let published_date = DateTime::parse_from_rfc3339(published.trim())
        .map_err(|e| {
            IngestionError::ArxivParse(format!("{}: bad published date: {}", arxiv_id, e))
        })?
        .with_timezone(&Utc);

    let pdf_url = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "link")))
        .find(|n| {
            n.attribute("title") == Some("pdf") || n.attribute("type") == Some("application/pdf")
        })
        .and_then(|n| n.attribute("href"))
        .map(https)
        .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}", arxiv_id));

    Ok(ArxivPaper {
        arxiv_id,
        title,
        authors,
        abstract_text,
        categories,
        published_date,
        pdf_url,
    })
}
