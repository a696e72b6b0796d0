//! Shared fixtures for handler tests

use crate::AppState;
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use paper_curator_common::{
    config::{AppConfig, DatabaseConfig},
    db::DbPool,
    errors::{AppError, Result},
    llm::{Generation, LlmClient},
    search::MemorySearchEngine,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// LLM double that echoes the prompt back
pub struct StubLlm {
    pub available: AtomicBool,
}

impl StubLlm {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::ServiceUnavailable {
                message: "Ollama unreachable: connection refused".to_string(),
            })
        }
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn health_check(&self) -> Result<String> {
        self.check()?;
        Ok("0.0.0-test".to_string())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(vec!["llama3.2:1b".to_string()])
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<Generation> {
        self.check()?;
        Ok(Generation {
            model: model.to_string(),
            response: format!("echo: {}", prompt),
            done: true,
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub search: Arc<MemorySearchEngine>,
    pub llm: Arc<StubLlm>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(mut config: AppConfig) -> Self {
        config.database = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..DatabaseConfig::default()
        };

        let db = DbPool::new(&config.database).await.unwrap();
        db.init_schema().await.unwrap();

        let search = Arc::new(MemorySearchEngine::new());
        let llm = Arc::new(StubLlm::new(true));

        let state = AppState {
            config: Arc::new(config),
            db,
            search: search.clone(),
            llm: llm.clone(),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        };

        Self { state, search, llm }
    }

    pub fn router(&self) -> Router {
        crate::create_router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
