//! Generation 2 wire encoder (canvas rendering only)
//!
//! Relative to generation 1: packet ids renumbered, the spawn packet grew a
//! head-yaw angle, the frame metadata indices moved up by one (payload 8,
//! rotation 9) and the canvas packet dropped the tracking flags in favour
//! of 16-bit dimensions and an explicit pixel length prefix.
//!
//! ```text
//! spawn entity   0x01: [eid:i32][uuid:16][kind:u8][x:f64][y:f64][z:f64]
//!                      [pitch:angle][yaw:angle][head_yaw:angle][data:i32]
//!                      [vel:3 x i16]
//! metadata       0x4D: [eid:i32] then entries [index:u8][type:u8][value],
//!                      terminated by 0xFF
//! destroy        0x3B: [count:u8][eid:i32 x count]
//! canvas data    0x27: [canvas:i32][scale:u8][locked:u8][cols:u16]
//!                      [rows:u16][x:u16][y:u16][len:u32][pixels]
//! use entity (in) 0x10: [eid:i32][action:u8]
//! ```

use crate::geometry::{Facing, Mat4};
use crate::ident::IdAllocator;
use crate::server::{Connection, ConnectionRegistry};
use crate::world::BlockPos;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::registry::AdapterConfig;
use super::wire::{PacketReader, PacketWriter};
use super::{
    AdapterError, Canvas, Capability, CapabilitySet, ClickCallback, ClickInterceptor,
    DisplayTransformMode, Payload, ProtocolAdapter, next_id,
};

const SPAWN_ENTITY: u8 = 0x01;
const ENTITY_METADATA: u8 = 0x4D;
const DESTROY_ENTITY: u8 = 0x3B;
const CANVAS_DATA: u8 = 0x27;
const USE_ENTITY: u8 = 0x10;

const FRAME_KIND: u8 = 0x58;
const ORIENT_TOP: i32 = 1;

const META_STATUS: u8 = 0;
const META_PAYLOAD: u8 = 8;
const META_ROTATION: u8 = 9;
const META_END: u8 = 0xFF;

const FIELD_BYTE: u8 = 0x00;
const FIELD_INT: u8 = 0x01;
const FIELD_ITEM: u8 = 0x06;

const STATUS_INVISIBLE: u8 = 0x20;

pub struct AdapterV2 {
    connections: Arc<ConnectionRegistry>,
    entities: Mutex<IdAllocator>,
    canvases: Mutex<IdAllocator>,
    interceptor: Arc<ClickInterceptor>,
    force_hitbox_top: bool,
}

impl AdapterV2 {
    pub const VERSION: &'static str = "v2";

    pub fn new(
        connections: Arc<ConnectionRegistry>,
        config: &AdapterConfig,
        on_click: ClickCallback,
    ) -> Self {
        Self {
            connections,
            entities: Mutex::new(IdAllocator::new(config.entity_ids)),
            canvases: Mutex::new(IdAllocator::new(config.canvas_ids)),
            interceptor: Arc::new(ClickInterceptor::new(
                decode_use_entity,
                config.entity_ids,
                on_click,
            )),
            force_hitbox_top: config.force_hitbox_top,
        }
    }
}

fn decode_use_entity(frame: &[u8]) -> Option<i32> {
    let mut r = PacketReader::new(frame);
    if r.read_u8()? != USE_ENTITY {
        return None;
    }
    r.read_i32()
}

fn yaw_for(facing: Facing) -> f32 {
    match facing {
        Facing::North => -180.0,
        Facing::East => -90.0,
        Facing::West => 90.0,
        Facing::South => 0.0,
    }
}

impl ProtocolAdapter for AdapterV2 {
    fn version(&self) -> &'static str {
        Self::VERSION
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty().with(Capability::RasterCanvas)
    }

    fn attach(&self, connection: &Connection) {
        connection.install_interceptor(self.interceptor.clone());
    }

    fn spawn_frame_entity(&self, pos: BlockPos, facing: Facing) -> i32 {
        let handle = next_id(&self.entities);
        let yaw = yaw_for(facing);
        let mut w = PacketWriter::new(SPAWN_ENTITY);
        w.put_i32(handle)
            .put_uuid(Uuid::new_v4())
            .put_u8(FRAME_KIND)
            .put_f64(pos.x as f64)
            .put_f64(pos.y as f64)
            .put_f64(pos.z as f64)
            .put_angle(-90.0)
            .put_angle(yaw)
            .put_angle(yaw) // head yaw tracks body yaw for frames
            .put_i32(if self.force_hitbox_top { 0 } else { ORIENT_TOP })
            .put_i16(0)
            .put_i16(0)
            .put_i16(0);
        self.connections.broadcast(w.finish());
        debug!(handle, x = pos.x, y = pos.y, z = pos.z, "v2 spawn frame");
        handle
    }

    fn update_frame_entity(&self, handle: i32, payload: &Payload, rotation: u8, hidden: bool) {
        let mut w = PacketWriter::new(ENTITY_METADATA);
        w.put_i32(handle);
        w.put_u8(META_PAYLOAD).put_u8(FIELD_ITEM).put_payload(payload);
        w.put_u8(META_ROTATION)
            .put_u8(FIELD_INT)
            .put_u32(u32::from(rotation));
        w.put_u8(META_STATUS)
            .put_u8(FIELD_BYTE)
            .put_u8(if hidden { STATUS_INVISIBLE } else { 0 });
        w.put_u8(META_END);
        self.connections.broadcast(w.finish());
    }

    fn spawn_grid_entity(&self, _placement: &Mat4) -> Result<i32, AdapterError> {
        Err(AdapterError::Unsupported {
            version: Self::VERSION,
            capability: Capability::GridEntityDisplay,
        })
    }

    fn update_grid_entity(
        &self,
        _handle: i32,
        _placement: &Mat4,
        _payload: &Payload,
        _mode: DisplayTransformMode,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported {
            version: Self::VERSION,
            capability: Capability::GridEntityDisplay,
        })
    }

    fn destroy_entity(&self, handle: i32) {
        let mut w = PacketWriter::new(DESTROY_ENTITY);
        w.put_u8(1).put_i32(handle);
        self.connections.broadcast(w.finish());
        debug!(handle, "v2 destroy entity");
    }

    fn allocate_canvas(&self) -> Canvas {
        Canvas::new(next_id(&self.canvases))
    }

    fn paint_canvas(&self, canvas: &Canvas) {
        let dim = super::CANVAS_DIM as u16;
        let mut w = PacketWriter::new(CANVAS_DATA);
        w.put_i32(canvas.handle())
            .put_u8(0) // scale
            .put_u8(0) // locked
            .put_u16(dim)
            .put_u16(dim)
            .put_u16(0) // origin x
            .put_u16(0) // origin y
            .put_u32(super::CANVAS_PIXELS as u32)
            .put_bytes(canvas.data());
        self.connections.broadcast(w.finish());
    }
}
