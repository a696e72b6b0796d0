//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

use crate::AppState;
use paper_curator_common::errors::Result;

#[derive(Serialize)]
pub struct PingResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every dependency answered, `degraded` otherwise
    pub status: String,
    pub version: String,
    pub environment: String,
    pub service_name: String,
    pub services: ServiceChecks,
}

#[derive(Serialize)]
pub struct ServiceChecks {
    pub database: ServiceStatus,
    pub opensearch: ServiceStatus,
    pub ollama: ServiceStatus,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub message: String,
    pub latency_ms: u64,
}

impl ServiceStatus {
    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Liveness check
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
        message: "pong".to_string(),
    })
}

async fn check<F, T>(dependency: F, describe: impl FnOnce(T) -> String) -> ServiceStatus
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let outcome = dependency.await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(value) => ServiceStatus {
            status: "healthy".to_string(),
            message: describe(value),
            latency_ms,
        },
        Err(e) => ServiceStatus {
            status: "unhealthy".to_string(),
            message: e.to_string(),
            latency_ms,
        },
    }
}

/// Dependency health. Always 200; outages show up as `degraded`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (database, opensearch, ollama) = tokio::join!(
        check(state.db.ping(), |_| "Connected successfully".to_string()),
        check(state.search.health_check(), |status| format!(
            "Cluster status {}",
            status
        )),
        check(state.llm.health_check(), |version| format!(
            "Ollama {} is running",
            version
        )),
    );

    let degraded = [&database, &opensearch, &ollama]
        .iter()
        .any(|s| !s.is_healthy());

    if degraded {
        tracing::warn!(
            database = %database.status,
            opensearch = %opensearch.status,
            ollama = %ollama.status,
            "Health check degraded"
        );
    }

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        version: state.config.app.version.clone(),
        environment: state.config.app.environment.clone(),
        service_name: state.config.app.service_name.clone(),
        services: ServiceChecks {
            database,
            opensearch,
            ollama,
        },
    })
}

/// Prometheus scrape endpoint
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
