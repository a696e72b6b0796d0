//! Paper Curator API Gateway
//!
//! REST surface over the paper store, the keyword index and the LLM:
//! - Paper listing, lookup and creation
//! - Keyword search
//! - Question answering (placeholder answer unless the LLM is enabled)
//! - Health and Prometheus metrics

mod handlers;
mod middleware;
#[cfg(test)]
mod test_support;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use paper_curator_common::{
    config::AppConfig,
    db::DbPool,
    llm::{LlmClient, OllamaClient},
    metrics::{self, LATENCY_BUCKETS, LLM_BUCKETS, METRICS_PREFIX},
    search::{create_search_engine, SearchEngine},
    telemetry,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub search: Arc<dyn SearchEngine>,
    pub llm: Arc<dyn LlmClient>,
    pub metrics: PrometheusHandle,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Tracing needs the config, so a load failure can only go to stderr
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let _telemetry = telemetry::init_tracing(&config.observability, &config.app.service_name)?;

    info!(
        version = %config.app.version,
        environment = %config.app.environment,
        "Starting Paper Curator API Gateway"
    );

    let config = Arc::new(config);

    // Initialize metrics
    let prometheus = install_prometheus()?;
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    db.init_schema().await?;

    // Outbound clients
    let search = create_search_engine(&config.opensearch)?;
    match search.ensure_index(false).await {
        Ok(true) => info!(index = %config.opensearch.index_name, "Search index created"),
        Ok(false) => info!(index = %config.opensearch.index_name, "Search index present"),
        Err(e) => warn!(error = %e, "Search index not ready, /search will fail until it is"),
    }
    let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(&config.llm)?);

    let state = AppState {
        config: config.clone(),
        db: db.clone(),
        search,
        llm,
        metrics: prometheus,
    };

    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await?;
    info!("Server shutdown complete");
    Ok(())
}

fn install_prometheus() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_llm_duration_seconds", METRICS_PREFIX)),
            LLM_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("_duration_seconds".to_string()), LATENCY_BUCKETS)?
        .install_recorder()?;
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/ping", get(handlers::health::ping))
        .route("/health", get(handlers::health::health))
        .route(
            "/papers",
            get(handlers::papers::list_papers).post(handlers::papers::create_paper),
        )
        // Old-style ids contain a slash (hep-th/9901001)
        .route("/papers/{*arxiv_id}", get(handlers::papers::get_paper))
        .route("/search", post(handlers::search::search))
        .route("/ask", post(handlers::ask::ask))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_metrics));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::health::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
