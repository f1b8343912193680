use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use anyhow::Context;
use gridcast_server::config::Config;
use gridcast_server::protocol::{AdapterConfig, select_adapter};
use gridcast_server::server::{AppState, ConnectionRegistry, visual_routes, ws_handler};
use gridcast_server::session::{
    RenderingMode, ReopenCallback, VisualizationTable, spawn_worker, visualizer_channel,
};
use gridcast_server::texture::TextureStore;
use gridcast_server::world::OpenWorld;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    protocol: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        protocol: state.adapter.version(),
        uptime_seconds: uptime,
    })
}

#[derive(Serialize)]
struct MetricsResponse {
    /// Server uptime in seconds
    uptime_seconds: u64,
    /// Server version
    version: &'static str,
    /// Currently connected clients
    connections: usize,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let uptime = START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0);
    Json(MetricsResponse {
        uptime_seconds: uptime,
        version: env!("CARGO_PKG_VERSION"),
        connections: state.connections.len(),
    })
}

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus handle not initialized");
    handle.render()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    START_TIME.set(Instant::now()).ok();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics();
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    config
        .ids
        .validate()
        .context("invalid handle id range configuration")?;
    info!(
        "Loaded configuration: host={}, port={}, protocol={}, rendering={:?}",
        config.host, config.port, config.protocol_version, config.rendering
    );

    let connections = Arc::new(ConnectionRegistry::new());

    // The event channel exists before the adapter so the adapter can carry
    // the click callback from day one
    let (visualizer, events) = visualizer_channel();

    // Select the protocol adapter; unknown versions are fatal here
    let adapter = select_adapter(
        &config.protocol_version,
        connections.clone(),
        AdapterConfig {
            entity_ids: config.ids.entity_range(),
            canvas_ids: config.ids.canvas_range(),
            force_hitbox_top: config.force_hitbox_top,
        },
        visualizer.click_callback(),
    )
    .context("failed to select protocol adapter")?;

    // Texture cache loads in the background; lookups before it lands
    // simply render blank cells
    let textures = TextureStore::new();
    if config.rendering == RenderingMode::Canvas {
        let _load = textures.load_in_background(config.texture_cache_path.clone());
    }

    // Bridge point for the host UI: a clicked frame asks the host to
    // reopen the session interface at that location
    let reopen: ReopenCallback = Arc::new(|connection, pos| {
        info!(
            %connection,
            x = pos.x,
            y = pos.y,
            z = pos.z,
            "reopen session UI requested"
        );
    });

    // Build the session table; a rendering mode the adapter cannot express
    // is fatal here, never at runtime
    let table = VisualizationTable::new(
        config.rendering,
        adapter.clone(),
        Arc::new(OpenWorld),
        textures,
        reopen,
    )
    .context("rendering mode not supported by the selected protocol version")?;
    let _worker = spawn_worker(table, events);

    let app_state = AppState {
        connections,
        adapter,
        visualizer,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .route("/ws", get(ws_handler))
        .nest("/api/visual", visual_routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Gridcast server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
