//! Host event ingress
//!
//! The host game server reports "actor selected content at a location" and
//! "actor closed its session" here. Handlers only enqueue onto the
//! visualization worker; precondition and ownership checks happen there,
//! and failing them is not an HTTP error by design.

use crate::geometry::facing_from_yaw;
use crate::protocol::Payload;
use crate::server::AppState;
use crate::session::GridContents;
use crate::world::BlockPos;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use uuid::Uuid;

/// Body of a content-selected event
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub actor: Uuid,
    /// Actor heading in degrees; the overlay faces back toward the actor
    pub yaw: f32,
    /// Up to nine cell item names, row-major; absent or null cells are empty
    #[serde(default)]
    pub grid: Vec<Option<String>>,
    #[serde(default)]
    pub result: Option<String>,
}

/// Body of a session-closed event
#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub actor: Uuid,
}

pub fn visual_routes() -> Router<AppState> {
    Router::new()
        .route("/select", post(select))
        .route("/close", post(close))
}

async fn select(State(state): State<AppState>, Json(req): Json<SelectRequest>) -> StatusCode {
    let facing = facing_from_yaw(req.yaw).opposite();
    let contents = GridContents {
        cells: std::array::from_fn(|idx| payload_from(req.grid.get(idx))),
        result: req.result.map_or(Payload::Empty, Payload::Item),
    };
    state
        .visualizer
        .content_changed(BlockPos::new(req.x, req.y, req.z), req.actor, contents, facing)
        .await;
    StatusCode::ACCEPTED
}

async fn close(State(state): State<AppState>, Json(req): Json<CloseRequest>) -> StatusCode {
    state
        .visualizer
        .session_ended(BlockPos::new(req.x, req.y, req.z), req.actor)
        .await;
    StatusCode::ACCEPTED
}

fn payload_from(cell: Option<&Option<String>>) -> Payload {
    match cell {
        Some(Some(name)) => Payload::Item(name.clone()),
        _ => Payload::Empty,
    }
}
