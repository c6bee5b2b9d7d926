//! HTTP server for site evaluation.
//!
//! One pipeline per process; requests are serialized through a mutex so the
//! route cache and loaded datasets are shared by every caller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roadscout::error::PipelineError;
use roadscout::models::{Facility, Site, SiteLog};
use roadscout::pip::DatasetSummary;
use roadscout::progress::TracingObserver;
use roadscout::routing::CacheStats;
use roadscout::{BatchPipeline, Config, ResultSchema, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "serve")]
#[command(about = "Site evaluation server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Application state shared across handlers
struct AppState {
    pipeline: Mutex<BatchPipeline>,
    defaults: RunOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;

    info!("roadscout server");
    info!("Routing via {} ({})", config.routing.url, config.routing.profile);

    let pipeline = config.build_pipeline(Arc::new(TracingObserver))?;
    let state = Arc::new(AppState {
        pipeline: Mutex::new(pipeline),
        defaults: config.run.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/evaluate", post(evaluate_handler))
        .route("/v1/datasets", get(datasets_handler))
        .route("/v1/datasets/reload", post(reload_handler))
        .route("/v1/cache", delete(clear_cache_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// An evaluation currently holds the pipeline
    busy: bool,
    /// Absent while busy
    cache: Option<CacheStats>,
}

/// Health check endpoint; never waits for a running evaluation
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cache = state
        .pipeline
        .try_lock()
        .ok()
        .map(|pipeline| pipeline.cache_stats());
    Json(HealthResponse {
        status: "ok",
        busy: cache.is_none(),
        cache,
    })
}

#[derive(Deserialize)]
struct EvaluateRequest {
    sites: Vec<Site>,
    #[serde(default)]
    airports: Vec<Facility>,
    #[serde(default)]
    seaports: Vec<Facility>,
    /// Falls back to the configured run defaults
    options: Option<RunOptions>,
}

#[derive(Serialize)]
struct EvaluateResponse {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
    logs: Vec<SiteLog>,
    call_count: u64,
    cache: CacheStats,
}

/// Run the pipeline over a JSON batch
async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, (StatusCode, String)> {
    let options = request.options.unwrap_or_else(|| state.defaults.clone());
    let mut pipeline = state.pipeline.lock().await;

    let output = pipeline
        .run(&request.sites, &request.airports, &request.seaports, &options)
        .await
        .map_err(|e| match e {
            PipelineError::Validation(_) => {
                warn!("Rejected evaluation request: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
        })?;

    let schema = ResultSchema::for_options(&options);
    Ok(Json(EvaluateResponse {
        columns: schema.headers(),
        rows: output.records.iter().map(|r| schema.row_json(r)).collect(),
        logs: output.logs,
        call_count: output.call_count,
        cache: output.cache,
    }))
}

/// Load state of every region dataset touched so far
async fn datasets_handler(State(state): State<Arc<AppState>>) -> Json<Vec<DatasetSummary>> {
    let pipeline = state.pipeline.lock().await;
    Json(pipeline.dataset_status())
}

/// Drop and reload all configured region datasets
async fn reload_handler(State(state): State<Arc<AppState>>) -> Json<Vec<DatasetSummary>> {
    let mut pipeline = state.pipeline.lock().await;
    Json(pipeline.reload_datasets().await)
}

async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let mut pipeline = state.pipeline.lock().await;
    pipeline.clear_cache();
    StatusCode::NO_CONTENT
}
