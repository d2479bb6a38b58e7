// Main entry point: loads the pages, starts the pipeline and serves the
// render-side view over HTTP

use manga_translator::{
    core::Config,
    middleware::CircuitBreaker,
    orchestration::{PageLoader, PagePipeline, RedrawSignal},
    services::{ApiClient, DeepLTranslator, GoogleTranslator, GoogleVisionDetector, ResultCache, TextAdapter},
    utils::{open_page_image, Metrics},
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use clap::Parser;
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Longest a redraw long-poll waits before answering with the current generation
const REDRAW_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Translate manga pages and serve the results to a renderer
#[derive(Parser, Debug)]
#[command(name = "manga-translator", version, about)]
struct Args {
    /// Image files or http(s) URLs, in reading order
    #[arg(required = true)]
    images: Vec<String>,

    /// Pages after the current one to load in the background
    #[arg(long)]
    preload: Option<usize>,

    /// HTTP port for the renderer surface
    #[arg(long)]
    port: Option<u16>,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<PagePipeline>,
    cache: Arc<ResultCache>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::new().context("Failed to load configuration")?;
    if let Some(preload) = args.preload {
        config.pipeline.preload_pages = preload;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    init_tracing(&config)?;

    info!("=== MANGA TRANSLATOR ===");
    info!(
        "Settings: {} | service='{}' {}->{} | preload={} | load timeout={:?}",
        config.settings_dir().display(),
        config.translation.selected_service,
        config.translation.source_language,
        config.translation.target_language,
        config.preload_pages(),
        config.load_timeout()
    );
    if let Err(e) = config.translation.validate() {
        warn!("Translation config is unusable, every page will report it: {}", e);
    }

    let metrics = Metrics::new();
    let circuit_breaker = CircuitBreaker::new(Some(metrics.clone()));
    let api_client = ApiClient::new(&config, Some(circuit_breaker), Some(metrics.clone()))
        .context("Failed to build HTTP client")?;

    let cache = Arc::new(
        ResultCache::open(config.settings_dir(), Some(metrics.clone()))
            .await
            .context("Failed to open result cache")?,
    );

    let detector = Arc::new(GoogleVisionDetector::new(
        api_client.clone(),
        config.translation.vision_api_key.clone(),
    ));
    let adapter = TextAdapter::new(detector, Some(metrics.clone()))
        .with_translator(Arc::new(GoogleTranslator::new(api_client.clone())))
        .with_translator(Arc::new(DeepLTranslator::new(api_client.clone())));

    let opened = join_all(
        args.images
            .iter()
            .map(|source| open_page_image(source, api_client.http())),
    )
    .await;
    let mut images = Vec::with_capacity(opened.len());
    for (source, result) in args.images.iter().zip(opened) {
        match result {
            Ok(image) => images.push(image),
            Err(e) => error!("Skipping {}: {:#}", source, e),
        }
    }

    let loader = Arc::new(PageLoader {
        config: config.translation.clone(),
        cache: cache.clone(),
        adapter: Arc::new(adapter),
        metrics: Some(metrics.clone()),
        redraw: RedrawSignal::new(),
        load_timeout: config.load_timeout(),
    });
    let pipeline = Arc::new(PagePipeline::new(images, loader, config.preload_pages())?);
    pipeline.open();

    let state = AppState {
        pipeline,
        cache,
        metrics,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/pages", get(pages))
        .route("/pages/current", get(current_page))
        .route("/pages/:index", get(page_by_index))
        .route("/navigate/next", post(navigate_next))
        .route("/navigate/prev", post(navigate_prev))
        .route("/selection", get(selection))
        .route("/selection/:block", post(select_block))
        .route("/redraw", get(redraw))
        .with_state(state)
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                   - Root endpoint");
    info!("  GET  /health             - Health check");
    info!("  GET  /metrics            - Prometheus metrics");
    info!("  GET  /stats              - Detailed statistics");
    info!("  GET  /pages              - Pipeline view");
    info!("  GET  /pages/current      - Current page");
    info!("  GET  /pages/:index       - Page by index");
    info!("  POST /navigate/next      - Next page");
    info!("  POST /navigate/prev      - Previous page");
    info!("  GET  /selection          - Selected block text");
    info!("  POST /selection/:block   - Select a block");
    info!("  GET  /redraw?after=<gen> - Wait for a redraw");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Stderr logging, or a plain-text log file when LOG_FILE is set
fn init_tracing(config: &Config) -> Result<()> {
    let level = config.log_level().to_string().to_lowercase();
    let filter = EnvFilter::new(format!("manga_translator={}", level));

    match config.log_file() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

async fn root() -> &'static str {
    "Manga Translator - page pipeline"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("/health");
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "pages": state.pipeline.page_count(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("/stats");
    let (records, size_bytes) = state.cache.stats().await.map_err(|e| {
        error!("Cache stats failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(serde_json::json!({
        "metrics": state.metrics.snapshot(),
        "cache": {
            "path": state.cache.path().await,
            "records": records,
            "size_bytes": size_bytes,
        },
    })))
}

async fn pages(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("/pages");
    Json(state.pipeline.view())
}

async fn current_page(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("/pages/current");
    Json(state.pipeline.current_snapshot())
}

async fn page_by_index(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.metrics.record_endpoint_request("/pages/:index");
    state
        .pipeline
        .page(index)
        .map(|page| Json(page.snapshot()))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No page {}", index)))
}

async fn navigate_next(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("/navigate/next");
    let moved = state.pipeline.next();
    Json(serde_json::json!({ "moved": moved, "view": state.pipeline.view() }))
}

async fn navigate_prev(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("/navigate/prev");
    let moved = state.pipeline.prev();
    Json(serde_json::json!({ "moved": moved, "view": state.pipeline.view() }))
}

async fn selection(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.record_endpoint_request("/selection");
    Json(state.pipeline.selected_text())
}

async fn select_block(
    State(state): State<AppState>,
    Path(block): Path<usize>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.metrics.record_endpoint_request("/selection/:block");
    if state.pipeline.select_block(block) {
        Ok(Json(state.pipeline.selected_text()))
    } else {
        Err((
            StatusCode::CONFLICT,
            format!("Block {} is not selectable on the current page", block),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RedrawQuery {
    after: Option<u64>,
}

/// Long-poll until the redraw generation moves past `after`
async fn redraw(
    State(state): State<AppState>,
    Query(query): Query<RedrawQuery>,
) -> impl IntoResponse {
    let mut rx = state.pipeline.loader().redraw.subscribe();
    let current = *rx.borrow_and_update();

    if let Some(after) = query.after {
        if current == after {
            let _ = tokio::time::timeout(REDRAW_POLL_TIMEOUT, rx.changed()).await;
        }
    }

    let generation = *rx.borrow();
    Json(serde_json::json!({ "generation": generation }))
}
