//! Generation 1 wire encoder (canvas rendering only)
//!
//! Packet layouts, all integers big-endian:
//!
//! ```text
//! spawn entity   0x00: [eid:i32][uuid:16][kind:u8][x:f64][y:f64][z:f64]
//!                      [pitch:angle][yaw:angle][data:i32][vel:3 x i16]
//! metadata       0x44: [eid:i32] then entries [index:u8][type:u8][value],
//!                      terminated by 0xFF
//! destroy        0x36: [count:u8][eid:i32]
//! canvas data    0x26: [canvas:i32][scale:u8][tracking:u8][x:u8][y:u8]
//!                      [cols:u8][rows:u8][pixels:16384]
//! use entity (in) 0x0D: [eid:i32][action:u8]
//! ```
//!
//! Metadata indices of this generation: status 0, frame payload 7, frame
//! rotation 8. Field type codes: byte 0x00, int 0x01, item 0x06.

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

const SPAWN_ENTITY: u8 = 0x00;
const ENTITY_METADATA: u8 = 0x44;
const DESTROY_ENTITY: u8 = 0x36;
const CANVAS_DATA: u8 = 0x26;
const USE_ENTITY: u8 = 0x0D;

/// Entity kind tag of the invisible frame entity in this generation
const FRAME_KIND: u8 = 0x47;
/// Orientation data value for a top-mounted frame
const ORIENT_TOP: i32 = 1;

const META_STATUS: u8 = 0;
const META_PAYLOAD: u8 = 7;
const META_ROTATION: u8 = 8;
const META_END: u8 = 0xFF;

const FIELD_BYTE: u8 = 0x00;
const FIELD_INT: u8 = 0x01;
const FIELD_ITEM: u8 = 0x06;

const STATUS_INVISIBLE: u8 = 0x20;

pub struct AdapterV1 {
    connections: Arc<ConnectionRegistry>,
    entities: Mutex<IdAllocator>,
    canvases: Mutex<IdAllocator>,
    interceptor: Arc<ClickInterceptor>,
    force_hitbox_top: bool,
}

impl AdapterV1 {
    pub const VERSION: &'static str = "v1";

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

impl ProtocolAdapter for AdapterV1 {
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
        let mut w = PacketWriter::new(SPAWN_ENTITY);
        w.put_i32(handle)
            .put_uuid(Uuid::new_v4())
            .put_u8(FRAME_KIND)
            .put_f64(pos.x as f64)
            .put_f64(pos.y as f64)
            .put_f64(pos.z as f64)
            .put_angle(-90.0) // top-mounted frame looks straight up
            .put_angle(yaw_for(facing))
            .put_i32(if self.force_hitbox_top { 0 } else { ORIENT_TOP })
            .put_i16(0)
            .put_i16(0)
            .put_i16(0);
        self.connections.broadcast(w.finish());
        debug!(handle, x = pos.x, y = pos.y, z = pos.z, "v1 spawn frame");
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
        debug!(handle, "v1 destroy entity");
    }

    fn allocate_canvas(&self) -> Canvas {
        Canvas::new(next_id(&self.canvases))
    }

    fn paint_canvas(&self, canvas: &Canvas) {
        let mut w = PacketWriter::new(CANVAS_DATA);
        w.put_i32(canvas.handle())
            .put_u8(0) // scale
            .put_u8(0) // tracking flags
            .put_u8(0) // origin x
            .put_u8(0) // origin y
            .put_u8(super::CANVAS_DIM as u8)
            .put_u8(super::CANVAS_DIM as u8)
            .put_bytes(canvas.data());
        self.connections.broadcast(w.finish());
    }
}
