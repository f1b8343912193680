//! End-to-end tests over the wired engine
//!
//! These drive the real protocol adapters through the connection registry
//! and the live visualization worker: host events go in through the
//! library surface or the HTTP ingress, wire packets come out over a real
//! websocket or a raw registered sink.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{
    attach_sink, build_router, build_server, drain, spawn_server, stone_contents,
};
use futures_util::{SinkExt, StreamExt};
use gridcast_server::session::RenderingMode;
use gridcast_server::world::BlockPos;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tower::util::ServiceExt;
use uuid::Uuid;

// Generation 2 packet type ids, per the documented v2 layout
const V2_SPAWN: u8 = 0x01;
const V2_METADATA: u8 = 0x4D;
const V2_DESTROY: u8 = 0x3B;
const V2_CANVAS: u8 = 0x27;
const V2_USE_ENTITY: u8 = 0x10;

// Generation 3 packet type ids
const V3_SPAWN: u8 = 0x02;
const V3_METADATA: u8 = 0x56;
const V3_DESTROY: u8 = 0x3E;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_binary(ws: &mut WsClient) -> Vec<u8> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a packet")
            .expect("socket closed")
            .expect("socket error");
        if let WsMessage::Binary(data) = msg {
            return data.as_ref().to_vec();
        }
    }
}

fn be_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes(bytes.try_into().expect("4 bytes"))
}

#[tokio::test]
async fn test_canvas_session_over_websocket() {
    let mut server = build_server("v2", RenderingMode::Canvas);
    let addr = spawn_server(build_router(server.state.clone())).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    // Give the handler a beat to register the connection
    tokio::time::sleep(Duration::from_millis(50)).await;

    let pos = BlockPos::new(4, 64, -2);
    server
        .visualizer
        .content_changed(pos, Uuid::new_v4(), stone_contents(), common_facing())
        .await;

    // Spawn, full canvas paint, then the frame metadata update
    let spawn = next_binary(&mut ws).await;
    assert_eq!(spawn[0], V2_SPAWN);
    let frame_handle = be_i32(&spawn[1..5]);

    let canvas = next_binary(&mut ws).await;
    assert_eq!(canvas[0], V2_CANVAS);
    assert_eq!(canvas.len(), 19 + 128 * 128);

    let metadata = next_binary(&mut ws).await;
    assert_eq!(metadata[0], V2_METADATA);
    assert_eq!(be_i32(&metadata[1..5]), frame_handle);

    // Clicking the frame reaches the reopen callback with the location
    ws.send(WsMessage::Binary(
        use_entity_packet(V2_USE_ENTITY, frame_handle).into(),
    ))
    .await
    .expect("send click");

    let (_connection, clicked_pos) =
        tokio::time::timeout(Duration::from_secs(5), server.reopen_rx.recv())
            .await
            .expect("timed out waiting for reopen")
            .expect("reopen channel closed");
    assert_eq!(clicked_pos, pos);
}

#[tokio::test]
async fn test_session_end_broadcasts_destroy() {
    let server = build_server("v2", RenderingMode::Canvas);
    let (_, mut rx) = attach_sink(&server);

    let pos = BlockPos::new(0, 64, 0);
    let actor = Uuid::new_v4();
    server
        .visualizer
        .content_changed(pos, actor, stone_contents(), common_facing())
        .await;
    let created = drain(&mut rx).await;
    assert_eq!(created.len(), 3); // spawn + canvas + metadata
    let frame_handle = be_i32(&created[0][1..5]);

    server.visualizer.session_ended(pos, actor).await;
    let ended = drain(&mut rx).await;
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0][0], V2_DESTROY);
    assert_eq!(be_i32(&ended[0][2..6]), frame_handle);
}

#[tokio::test]
async fn test_foreign_actor_produces_no_packets() {
    let server = build_server("v2", RenderingMode::Canvas);
    let (_, mut rx) = attach_sink(&server);

    let pos = BlockPos::new(7, 64, 7);
    server
        .visualizer
        .content_changed(pos, Uuid::new_v4(), stone_contents(), common_facing())
        .await;
    assert!(!drain(&mut rx).await.is_empty());

    // A different actor poking the same location is silently ignored
    server
        .visualizer
        .content_changed(pos, Uuid::new_v4(), stone_contents(), common_facing())
        .await;
    assert!(drain(&mut rx).await.is_empty());

    server.visualizer.session_ended(pos, Uuid::new_v4()).await;
    assert!(drain(&mut rx).await.is_empty());
}

#[tokio::test]
async fn test_grid_session_spawns_ten_displays() {
    let server = build_server("v3", RenderingMode::GridEntity);
    let (_, mut rx) = attach_sink(&server);

    let pos = BlockPos::new(-3, 70, 12);
    let actor = Uuid::new_v4();
    server
        .visualizer
        .content_changed(pos, actor, stone_contents(), common_facing())
        .await;

    let packets = drain(&mut rx).await;
    let spawns: Vec<&bytes::Bytes> = packets.iter().filter(|p| p[0] == V3_SPAWN).collect();
    let updates: Vec<&bytes::Bytes> = packets.iter().filter(|p| p[0] == V3_METADATA).collect();
    assert_eq!(spawns.len(), 10);
    assert_eq!(updates.len(), 10);

    server.visualizer.session_ended(pos, actor).await;
    let destroys = drain(&mut rx).await;
    assert_eq!(destroys.len(), 10);
    assert!(destroys.iter().all(|p| p[0] == V3_DESTROY));
}

#[tokio::test]
async fn test_http_ingress_drives_the_engine() {
    let server = build_server("v2", RenderingMode::Canvas);
    let (_, mut rx) = attach_sink(&server);
    let router = build_router(server.state.clone());

    let actor = Uuid::new_v4();
    let select = serde_json::json!({
        "x": 1, "y": 64, "z": 2,
        "actor": actor,
        "yaw": 0.0,
        "grid": ["stone"],
        "result": "stone",
    });
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/visual/select")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(select.to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(drain(&mut rx).await.len(), 3);

    let close = serde_json::json!({"x": 1, "y": 64, "z": 2, "actor": actor});
    let response = router
        .oneshot(
            Request::post("/api/visual/close")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(close.to_string()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(drain(&mut rx).await.len(), 1);
}

#[tokio::test]
async fn test_click_on_foreign_entity_passes_through() {
    let mut server = build_server("v2", RenderingMode::Canvas);
    let addr = spawn_server(build_router(server.state.clone())).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // An interaction with an id outside the configured entity ring must
    // not reach the session table
    ws.send(WsMessage::Binary(use_entity_packet(V2_USE_ENTITY, 12).into()))
        .await
        .expect("send");

    assert!(
        tokio::time::timeout(Duration::from_millis(300), server.reopen_rx.recv())
            .await
            .is_err()
    );
}

fn common_facing() -> gridcast_server::geometry::Facing {
    gridcast_server::geometry::facing_from_yaw(0.0).opposite()
}

fn use_entity_packet(packet_type: u8, handle: i32) -> Vec<u8> {
    let mut packet = vec![packet_type];
    packet.extend_from_slice(&handle.to_be_bytes());
    packet.push(0); // interact action
    packet
}
