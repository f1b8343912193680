//! Byte-level packet building and parsing
//!
//! All multi-byte integers are big-endian. Angles travel as signed bytes in
//! 1/256-turn steps. Strings are u16-length-prefixed UTF-8. Each protocol
//! generation defines its own packet type ids and field layout on top of
//! these primitives.

use crate::geometry::{Quat, Vec3};
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::Payload;

/// Payload tag bytes shared by every generation
const PAYLOAD_EMPTY: u8 = 0x00;
const PAYLOAD_ITEM: u8 = 0x01;
const PAYLOAD_CANVAS: u8 = 0x02;

/// Builder for one outbound wire packet.
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    /// Start a packet with the given type id.
    pub fn new(packet_type: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(packet_type);
        Self { buf }
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_i8(&mut self, v: i8) -> &mut Self {
        self.buf.put_i8(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.put_i16(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    pub fn put_f32(&mut self, v: f32) -> &mut Self {
        self.buf.put_f32(v);
        self
    }

    pub fn put_f64(&mut self, v: f64) -> &mut Self {
        self.buf.put_f64(v);
        self
    }

    /// Quantize an angle in degrees to a signed 1/256-turn byte.
    pub fn put_angle(&mut self, degrees: f32) -> &mut Self {
        self.buf.put_i8((degrees * 256.0 / 360.0) as i8);
        self
    }

    pub fn put_uuid(&mut self, v: Uuid) -> &mut Self {
        self.buf.put_u128(v.as_u128());
        self
    }

    pub fn put_str(&mut self, v: &str) -> &mut Self {
        debug_assert!(v.len() <= u16::MAX as usize);
        self.buf.put_u16(v.len() as u16);
        self.buf.put_slice(v.as_bytes());
        self
    }

    pub fn put_vec3(&mut self, v: Vec3) -> &mut Self {
        self.buf.put_f32(v.x);
        self.buf.put_f32(v.y);
        self.buf.put_f32(v.z);
        self
    }

    pub fn put_quat(&mut self, q: Quat) -> &mut Self {
        self.buf.put_f32(q.x);
        self.buf.put_f32(q.y);
        self.buf.put_f32(q.z);
        self.buf.put_f32(q.w);
        self
    }

    /// Tagged payload field: empty sentinel, named item, or canvas handle.
    pub fn put_payload(&mut self, payload: &Payload) -> &mut Self {
        match payload {
            Payload::Empty => {
                self.buf.put_u8(PAYLOAD_EMPTY);
            }
            Payload::Item(name) => {
                self.buf.put_u8(PAYLOAD_ITEM);
                self.put_str(name);
            }
            Payload::Canvas(handle) => {
                self.buf.put_u8(PAYLOAD_CANVAS);
                self.buf.put_i32(*handle);
            }
        }
        self
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over one inbound frame. All reads are bounds-checked; `None`
/// means the frame is not the packet the caller hoped for.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let v = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        let end = self.pos.checked_add(4)?;
        let bytes: [u8; 4] = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(i32::from_be_bytes(bytes))
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
