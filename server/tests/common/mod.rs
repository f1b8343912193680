//! Common Test Utilities for Integration Tests
//!
//! Builds a fully wired server (real adapter, real registry, live worker)
//! around scripted collaborators, plus helpers for binding it to a port.

use axum::{Router, routing::get};
use bytes::Bytes;
use gridcast_server::config::IdConfig;
use gridcast_server::protocol::{AdapterConfig, Payload, ProtocolAdapter, select_adapter};
use gridcast_server::server::{AppState, ConnectionRegistry, visual_routes, ws_handler};
use gridcast_server::session::{
    GridContents, RenderingMode, VisualizationTable, VisualizerHandle, spawn_worker,
    visualizer_channel,
};
use gridcast_server::texture::{Texture, TextureCache, TextureStore};
use gridcast_server::world::{BlockPos, OpenWorld};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestServer {
    pub state: AppState,
    pub visualizer: VisualizerHandle,
    pub connections: Arc<ConnectionRegistry>,
    pub adapter: Arc<dyn ProtocolAdapter>,
    /// Receives (connection, position) pairs from the reopen callback
    pub reopen_rx: mpsc::UnboundedReceiver<(Uuid, BlockPos)>,
}

/// Wire the whole engine for one protocol version and rendering mode.
pub fn build_server(version: &str, mode: RenderingMode) -> TestServer {
    let connections = Arc::new(ConnectionRegistry::new());
    let (visualizer, events) = visualizer_channel();

    let ids = IdConfig::default();
    let adapter = select_adapter(
        version,
        connections.clone(),
        AdapterConfig {
            entity_ids: ids.entity_range(),
            canvas_ids: ids.canvas_range(),
            force_hitbox_top: false,
        },
        visualizer.click_callback(),
    )
    .expect("adapter selection");

    let (reopen_tx, reopen_rx) = mpsc::unbounded_channel();
    let reopen = Arc::new(move |connection, pos| {
        let _ = reopen_tx.send((connection, pos));
    });

    let table = VisualizationTable::new(
        mode,
        adapter.clone(),
        Arc::new(OpenWorld),
        test_textures(),
        reopen,
    )
    .expect("table construction");
    let _worker = spawn_worker(table, events);

    let state = AppState {
        connections: connections.clone(),
        adapter: adapter.clone(),
        visualizer: visualizer.clone(),
    };

    TestServer {
        state,
        visualizer,
        connections,
        adapter,
        reopen_rx,
    }
}

/// A texture store preloaded with a recognizable "stone" icon
pub fn test_textures() -> Arc<TextureStore> {
    let store = TextureStore::new();
    let mut cache = TextureCache::new();
    let mut texture = Texture::default();
    for y in 0..16 {
        for x in 0..16 {
            texture.set(x, y, 31);
        }
    }
    cache.insert("block", "stone", texture);
    store.replace(cache);
    store
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .nest("/api/visual", visual_routes())
        .with_state(state)
}

/// Bind the router on an ephemeral port and serve it in the background.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Register a raw packet sink directly on the connection registry,
/// bypassing the websocket layer. The adapter's interceptor is attached
/// the same way the websocket handler would.
pub fn attach_sink(server: &TestServer) -> (Uuid, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(64);
    let id = Uuid::new_v4();
    let connection = server.connections.register(id, tx);
    server.adapter.attach(&connection);
    (id, rx)
}

/// A 3x3 grid holding stone in the first cell with a stone result
pub fn stone_contents() -> GridContents {
    let mut contents = GridContents::empty();
    contents.cells[0] = Payload::Item("stone".to_string());
    contents.result = Payload::Item("stone".to_string());
    contents
}

/// Drain packets until the queue goes quiet for a moment.
pub async fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
    let mut packets = Vec::new();
    loop {
        match tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await {
            Ok(Some(packet)) => packets.push(packet),
            _ => break,
        }
    }
    packets
}
