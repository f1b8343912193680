//! Generation 3 wire encoder (canvas + grid entity displays)
//!
//! Carries the generation 2 frame/canvas layouts forward under renumbered
//! packet ids and adds flat display entities whose placement travels as
//! decomposed vector fields.
//!
//! ```text
//! spawn entity   0x02: [eid:i32][uuid:16][kind:u8][x:f64][y:f64][z:f64]
//!                      [pitch:angle][yaw:angle][head_yaw:angle][data:i32]
//!                      [vel:3 x i16]
//! metadata       0x56: [eid:i32] then entries [index:u8][type:u8][value],
//!                      terminated by 0xFF
//! destroy        0x3E: [count:u8][eid:i32 x count]
//! canvas data    0x2A: [canvas:i32][scale:u8][locked:u8][cols:u16]
//!                      [rows:u16][x:u16][y:u16][len:u32][pixels]
//! use entity (in) 0x13: [eid:i32][action:u8][hand:u8]
//! ```
//!
//! Frame metadata indices: status 0, payload 8, rotation 9. Display
//! metadata indices: translation 11, scale 12, rotation-left 13,
//! rotation-right 14, item 23, transform mode 24. Field type codes:
//! byte 0x00, int 0x01, item 0x06, vec3 0x0F, quaternion 0x10.

use crate::geometry::{self, Facing, Mat4};
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

const SPAWN_ENTITY: u8 = 0x02;
const ENTITY_METADATA: u8 = 0x56;
const DESTROY_ENTITY: u8 = 0x3E;
const CANVAS_DATA: u8 = 0x2A;
const USE_ENTITY: u8 = 0x13;

const FRAME_KIND: u8 = 0x5A;
const DISPLAY_KIND: u8 = 0x69;
const ORIENT_TOP: i32 = 1;

const META_STATUS: u8 = 0;
const META_PAYLOAD: u8 = 8;
const META_ROTATION: u8 = 9;
const META_TRANSLATION: u8 = 11;
const META_SCALE: u8 = 12;
const META_ROT_LEFT: u8 = 13;
const META_ROT_RIGHT: u8 = 14;
const META_ITEM: u8 = 23;
const META_TRANSFORM_MODE: u8 = 24;
const META_END: u8 = 0xFF;

const FIELD_BYTE: u8 = 0x00;
const FIELD_INT: u8 = 0x01;
const FIELD_ITEM: u8 = 0x06;
const FIELD_VEC3: u8 = 0x0F;
const FIELD_QUAT: u8 = 0x10;

const STATUS_INVISIBLE: u8 = 0x20;

pub struct AdapterV3 {
    connections: Arc<ConnectionRegistry>,
    entities: Mutex<IdAllocator>,
    canvases: Mutex<IdAllocator>,
    interceptor: Arc<ClickInterceptor>,
    force_hitbox_top: bool,
}

impl AdapterV3 {
    pub const VERSION: &'static str = "v3";

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

    fn spawn_entity(&self, kind: u8, pos: BlockPos, pitch: f32, yaw: f32, data: i32) -> i32 {
        let handle = next_id(&self.entities);
        let mut w = PacketWriter::new(SPAWN_ENTITY);
        w.put_i32(handle)
            .put_uuid(Uuid::new_v4())
            .put_u8(kind)
            .put_f64(pos.x as f64)
            .put_f64(pos.y as f64)
            .put_f64(pos.z as f64)
            .put_angle(pitch)
            .put_angle(yaw)
            .put_angle(yaw)
            .put_i32(data)
            .put_i16(0)
            .put_i16(0)
            .put_i16(0);
        self.connections.broadcast(w.finish());
        handle
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

impl ProtocolAdapter for AdapterV3 {
    fn version(&self) -> &'static str {
        Self::VERSION
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty()
            .with(Capability::RasterCanvas)
            .with(Capability::GridEntityDisplay)
    }

    fn attach(&self, connection: &Connection) {
        connection.install_interceptor(self.interceptor.clone());
    }

    fn spawn_frame_entity(&self, pos: BlockPos, facing: Facing) -> i32 {
        let data = if self.force_hitbox_top { 0 } else { ORIENT_TOP };
        let handle = self.spawn_entity(FRAME_KIND, pos, -90.0, yaw_for(facing), data);
        debug!(handle, x = pos.x, y = pos.y, z = pos.z, "v3 spawn frame");
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

    fn spawn_grid_entity(&self, placement: &Mat4) -> Result<i32, AdapterError> {
        // Displays spawn at their anchor block; the fine placement lives in
        // the transform metadata sent right after
        let t = geometry::decompose(placement).translation;
        let pos = BlockPos::new(t.x.floor() as i32, t.y.floor() as i32, t.z.floor() as i32);
        let handle = self.spawn_entity(DISPLAY_KIND, pos, 0.0, 0.0, 0);
        debug!(handle, "v3 spawn grid display");
        Ok(handle)
    }

    fn update_grid_entity(
        &self,
        handle: i32,
        placement: &Mat4,
        payload: &Payload,
        mode: DisplayTransformMode,
    ) -> Result<(), AdapterError> {
        let parts = geometry::decompose(placement);
        let mut w = PacketWriter::new(ENTITY_METADATA);
        w.put_i32(handle);
        w.put_u8(META_TRANSLATION)
            .put_u8(FIELD_VEC3)
            .put_vec3(parts.translation);
        w.put_u8(META_SCALE).put_u8(FIELD_VEC3).put_vec3(parts.scale);
        w.put_u8(META_ROT_LEFT)
            .put_u8(FIELD_QUAT)
            .put_quat(parts.rotation_left);
        w.put_u8(META_ROT_RIGHT)
            .put_u8(FIELD_QUAT)
            .put_quat(parts.rotation_right);
        w.put_u8(META_ITEM).put_u8(FIELD_ITEM).put_payload(payload);
        w.put_u8(META_TRANSFORM_MODE)
            .put_u8(FIELD_BYTE)
            .put_u8(mode as u8);
        w.put_u8(META_END);
        self.connections.broadcast(w.finish());
        Ok(())
    }

    fn destroy_entity(&self, handle: i32) {
        let mut w = PacketWriter::new(DESTROY_ENTITY);
        w.put_u8(1).put_i32(handle);
        self.connections.broadcast(w.finish());
        debug!(handle, "v3 destroy entity");
    }

    fn allocate_canvas(&self) -> Canvas {
        Canvas::new(next_id(&self.canvases))
    }

    fn paint_canvas(&self, canvas: &Canvas) {
        let dim = super::CANVAS_DIM as u16;
        let mut w = PacketWriter::new(CANVAS_DATA);
        w.put_i32(canvas.handle())
            .put_u8(0)
            .put_u8(0)
            .put_u16(dim)
            .put_u16(dim)
            .put_u16(0)
            .put_u16(0)
            .put_u32(super::CANVAS_PIXELS as u32)
            .put_bytes(canvas.data());
        self.connections.broadcast(w.finish());
    }
}
