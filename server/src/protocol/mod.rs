//! Protocol adapter abstraction
//!
//! One adapter per wire-protocol generation. Every adapter encodes the same
//! high-level overlay operations (spawn, update, destroy, canvas paint)
//! into its generation's packet layout and broadcasts through the
//! connection registry. Selection happens once at startup; a rendering mode
//! the selected generation cannot express is a fatal configuration error.

pub mod canvas;
pub mod registry;
pub mod v1;
pub mod v2;
pub mod v3;
pub mod wire;

pub use canvas::{CANVAS_DIM, CANVAS_PIXELS, Canvas};
pub use registry::{AdapterConfig, RegistryError, select_adapter};

use crate::geometry::{Facing, Mat4};
use crate::ident::IdRange;
use crate::server::PacketInterceptor;
use crate::world::BlockPos;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A protocol feature an adapter generation may implement.
///
/// Every generation implements `RasterCanvas`; `GridEntityDisplay` arrived
/// with generation 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    RasterCanvas,
    GridEntityDisplay,
}

const fn capability_bit(capability: Capability) -> u8 {
    match capability {
        Capability::RasterCanvas => 0b01,
        Capability::GridEntityDisplay => 0b10,
    }
}

/// Small set of [`Capability`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability_bit(capability))
    }

    pub const fn contains(&self, capability: Capability) -> bool {
        self.0 & capability_bit(capability) != 0
    }
}

/// What an overlay entity displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Nothing; the cell stays blank
    Empty,
    /// A named item icon
    Item(String),
    /// A reference to a canvas handle (frame entities only)
    Canvas(i32),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// How a display entity is posed relative to its transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisplayTransformMode {
    None = 0,
    Gui = 1,
    Ground = 2,
    Fixed = 3,
}

/// Invoked from a connection task when a client interacts with a handle
/// issued by the adapter. Must not block; enqueue and return.
pub type ClickCallback = Arc<dyn Fn(Uuid, i32) + Send + Sync>;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("protocol {version} does not implement {capability:?}")]
    Unsupported {
        version: &'static str,
        capability: Capability,
    },
}

/// The shared contract every protocol generation implements.
///
/// Broadcast operations are best-effort: per-connection delivery failures
/// are handled (and logged) by the connection registry and never surface
/// here. Destroying an already-destroyed handle still sends the despawn
/// packet; this layer keeps no liveness state.
pub trait ProtocolAdapter: Send + Sync {
    /// Wire-protocol generation string this adapter speaks
    fn version(&self) -> &'static str;

    /// Features this generation implements
    fn capabilities(&self) -> CapabilitySet;

    /// Install the inbound click interceptor on a connection. Idempotent
    /// per connection; unrelated traffic passes through untouched.
    fn attach(&self, connection: &crate::server::Connection);

    /// Spawn the invisible top-mounted frame entity that holds a canvas.
    /// Returns the issued entity handle.
    fn spawn_frame_entity(&self, pos: BlockPos, facing: Facing) -> i32;

    /// Update a frame's payload, discrete rotation (0-7) and visibility.
    fn update_frame_entity(&self, handle: i32, payload: &Payload, rotation: u8, hidden: bool);

    /// Spawn a flat grid display entity with the given placement.
    fn spawn_grid_entity(&self, placement: &Mat4) -> Result<i32, AdapterError>;

    /// Update a grid display entity's placement and payload.
    fn update_grid_entity(
        &self,
        handle: i32,
        placement: &Mat4,
        payload: &Payload,
        mode: DisplayTransformMode,
    ) -> Result<(), AdapterError>;

    /// Broadcast a despawn for the handle. Safe to repeat.
    fn destroy_entity(&self, handle: i32);

    /// Allocate a fresh canvas with a handle from the canvas ring.
    fn allocate_canvas(&self) -> Canvas;

    /// Broadcast the full canvas buffer in one packet.
    fn paint_canvas(&self, canvas: &Canvas);
}

/// Draw the next handle from a shared allocator ring, recovering the ring
/// state if a holder panicked mid-allocation.
pub(crate) fn next_id(allocator: &std::sync::Mutex<crate::ident::IdAllocator>) -> i32 {
    allocator
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .allocate()
}

/// Shared interceptor: each generation supplies the decoder for its
/// inbound interaction packet; handle ownership is a range-membership test
/// on the configured entity ring (this layer tracks no liveness).
pub(crate) struct ClickInterceptor {
    decode: fn(&[u8]) -> Option<i32>,
    entity_range: IdRange,
    on_click: ClickCallback,
}

impl ClickInterceptor {
    pub(crate) fn new(
        decode: fn(&[u8]) -> Option<i32>,
        entity_range: IdRange,
        on_click: ClickCallback,
    ) -> Self {
        Self {
            decode,
            entity_range,
            on_click,
        }
    }
}

impl PacketInterceptor for ClickInterceptor {
    fn intercept(&self, connection_id: Uuid, frame: &[u8]) -> bool {
        let Some(handle) = (self.decode)(frame) else {
            return false;
        };
        if !self.entity_range.contains(handle) {
            // Interaction with an entity we did not issue: pass through
            return false;
        }
        (self.on_click)(connection_id, handle);
        true
    }
}
