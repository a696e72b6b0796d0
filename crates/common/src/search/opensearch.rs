//! OpenSearch REST client

use super::{
    papers_index_body, PaperDocument, PaperQueryBuilder, SearchEngine, SearchHit, SearchQuery,
    SearchResults,
};
use crate::config::OpenSearchConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub struct OpenSearchClient {
    client: Client,
    base_url: Url,
    index_name: String,
}

#[derive(Deserialize)]
struct IndexResponse {
    result: String,
}

#[derive(Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct ClusterHealth {
    status: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    total: TotalHits,
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: SearchHit,
    highlight: Option<serde_json::Value>,
}

impl OpenSearchClient {
    pub fn new(config: &OpenSearchConfig) -> Result<Self> {
        let base_url = Url::parse(&config.host).map_err(|e| AppError::Configuration {
            message: format!("Invalid OpenSearch host {}: {}", config.host, e),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        info!(host = %base_url, index = %config.index_name, "OpenSearch client initialized");

        Ok(Self {
            client,
            base_url,
            index_name: config.index_name.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Join path segments onto the host. Each segment is percent-encoded,
    /// so old-style ids like `hep-th/9901001` stay a single segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Configuration {
                message: format!("OpenSearch host cannot be a base URL: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| AppError::ServiceUnavailable {
            message: format!("OpenSearch unreachable: {}", e),
        })
    }

    async fn expect_success(
        response: reqwest::Response,
        action: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::SearchEngine {
            message: format!("{} failed with {}: {}", action, status, body),
        })
    }

    async fn index_exists(&self) -> Result<bool> {
        let response = self
            .send(Method::HEAD, self.url(&[self.index_name.as_str()])?, None)
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::SearchEngine {
                message: format!("Index existence check returned {}", status),
            }),
        }
    }
}

#[async_trait]
impl SearchEngine for OpenSearchClient {
    #[instrument(skip(self), fields(index = %self.index_name))]
    async fn ensure_index(&self, force: bool) -> Result<bool> {
        if self.index_exists().await? {
            if !force {
                debug!("Index already exists");
                return Ok(false);
            }
            info!("Deleting existing index");
            let response = self
                .send(Method::DELETE, self.url(&[self.index_name.as_str()])?, None)
                .await?;
            Self::expect_success(response, "Index delete").await?;
        }

        let response = self
            .send(
                Method::PUT,
                self.url(&[self.index_name.as_str()])?,
                Some(&papers_index_body()),
            )
            .await?;
        let ack: Acknowledged = Self::expect_success(response, "Index create")
            .await?
            .json()
            .await?;

        if !ack.acknowledged {
            return Err(AppError::SearchEngine {
                message: format!("Index {} creation not acknowledged", self.index_name),
            });
        }

        info!("Index created");
        Ok(true)
    }

    async fn index_paper(&self, doc: &PaperDocument) -> Result<()> {
        let mut url = self.url(&[self.index_name.as_str(), "_doc", doc.arxiv_id.as_str()])?;
        url.query_pairs_mut().append_pair("refresh", "true");

        let body = serde_json::to_value(doc)?;
        let response = self.send(Method::PUT, url, Some(&body)).await?;
        let indexed: IndexResponse = Self::expect_success(response, "Document index")
            .await?
            .json()
            .await?;

        match indexed.result.as_str() {
            "created" | "updated" => {
                debug!(arxiv_id = %doc.arxiv_id, result = %indexed.result, "Paper indexed");
                Ok(())
            }
            other => Err(AppError::SearchEngine {
                message: format!("Unexpected index result for {}: {}", doc.arxiv_id, other),
            }),
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let body = PaperQueryBuilder::from_search(query).build();

        let response = self
            .send(Method::POST, self.url(&[self.index_name.as_str(), "_search"])?, Some(&body))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(index = %self.index_name, "Search against missing index");
            return Err(AppError::SearchEngine {
                message: format!("Index {} not found", self.index_name),
            });
        }

        let parsed: SearchResponse = Self::expect_success(response, "Search")
            .await?
            .json()
            .await?;

        let hits = parsed
            .hits
            .hits
            .into_iter()
            .map(|raw| SearchHit {
                score: raw.score,
                highlights: raw.highlight,
                ..raw.source
            })
            .collect();

        let results = SearchResults {
            total: parsed.hits.total.value,
            hits,
        };

        debug!(query = %query.query, total = results.total, "Search complete");
        Ok(results)
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .send(Method::GET, self.url(&[self.index_name.as_str(), "_count"])?, None)
            .await?;
        let count: CountResponse = Self::expect_success(response, "Count")
            .await?
            .json()
            .await?;
        Ok(count.count)
    }

    async fn health_check(&self) -> Result<String> {
        let response = self
            .send(Method::GET, self.url(&["_cluster", "health"])?, None)
            .await?;
        let health: ClusterHealth = Self::expect_success(response, "Cluster health")
            .await?
            .json()
            .await?;

        match health.status.as_str() {
            "green" | "yellow" => Ok(health.status),
            other => Err(AppError::ServiceUnavailable {
                message: format!("OpenSearch cluster status is {}", other),
            }),
        }
    }

    fn name(&self) -> &str {
        "opensearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenSearchClient {
        OpenSearchClient::new(&OpenSearchConfig {
            host: server.uri(),
            timeout_secs: 5,
            ..OpenSearchConfig::default()
        })
        .unwrap()
    }

    fn document(arxiv_id: &str) -> PaperDocument {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        PaperDocument {
            arxiv_id: arxiv_id.into(),
            title: "Sparse attention".into(),
            authors: "A. Author, B. Author".into(),
            abstract_text: "Abstract".into(),
            categories: vec!["cs.AI".into()],
            raw_text: Some("body".into()),
            pdf_url: "https://arxiv.org/pdf/x".into(),
            published_date: date,
            created_at: date,
            updated_at: date,
        }
    }

    #[tokio::test]
    async fn test_ensure_index_creates_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/arxiv-papers"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/arxiv-papers"))
            .and(body_partial_json(json!({ "mappings": { "dynamic": "strict" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client_for(&server).ensure_index(false).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_index_keeps_existing_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/arxiv-papers"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert!(!client_for(&server).ensure_index(false).await.unwrap());
    }

    #[tokio::test]
    async fn test_index_paper_uses_arxiv_id_and_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/arxiv-papers/_doc/2401.00001"))
            .and(query_param("refresh", "true"))
            .and(body_partial_json(json!({ "authors": "A. Author, B. Author" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .index_paper(&document("2401.00001"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_index_paper_encodes_old_style_ids() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/arxiv-papers/_doc/hep-th%2F9901001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "updated" })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .index_paper(&document("hep-th/9901001"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_maps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/arxiv-papers/_search"))
            .and(body_partial_json(json!({ "size": 5 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {
                    "total": { "value": 1, "relation": "eq" },
                    "hits": [{
                        "_id": "2401.00001",
                        "_score": 4.2,
                        "_source": {
                            "arxiv_id": "2401.00001",
                            "title": "Sparse attention",
                            "authors": "A. Author",
                            "abstract": "Abstract",
                            "categories": ["cs.AI"],
                            "published_date": "2024-01-02T03:04:05Z",
                            "pdf_url": "https://arxiv.org/pdf/2401.00001"
                        },
                        "highlight": { "title": ["Sparse <em>attention</em>"] }
                    }]
                }
            })))
            .mount(&server)
            .await;

        let results = client_for(&server)
            .search(&SearchQuery {
                query: "attention".into(),
                size: 5,
                ..SearchQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].arxiv_id, "2401.00001");
        assert_eq!(results.hits[0].score, Some(4.2));
        assert!(results.hits[0].highlights.is_some());
    }

    #[tokio::test]
    async fn test_search_error_status_is_search_engine_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/arxiv-papers/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("parse_exception"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search(&SearchQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SearchEngine { .. }));
    }

    #[tokio::test]
    async fn test_health_check_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "red" })))
            .mount(&server)
            .await;

        let err = client_for(&server).health_check().await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let client = OpenSearchClient::new(&OpenSearchConfig {
            host: "http://127.0.0.1:1".into(),
            timeout_secs: 1,
            ..OpenSearchConfig::default()
        })
        .unwrap();

        let err = client.health_check().await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
    }
}
