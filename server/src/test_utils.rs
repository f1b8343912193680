//! Test Utilities Module
//!
//! Collaborator doubles for exercising the visualization session table
//! without a live connection registry. Only compiled for tests.

#![cfg(test)]

use crate::geometry::{Facing, Mat4};
use crate::ident::{IdAllocator, IdRange};
use crate::protocol::{
    AdapterError, Canvas, Capability, CapabilitySet, DisplayTransformMode, Payload,
    ProtocolAdapter, next_id,
};
use crate::server::Connection;
use crate::world::{BlockPos, WorldQuery};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// One recorded adapter operation
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOp {
    SpawnFrame {
        handle: i32,
        pos: BlockPos,
        facing: Facing,
    },
    UpdateFrame {
        handle: i32,
        payload: Payload,
        rotation: u8,
        hidden: bool,
    },
    SpawnGrid {
        handle: i32,
    },
    UpdateGrid {
        handle: i32,
        payload: Payload,
    },
    Destroy {
        handle: i32,
    },
    Paint {
        handle: i32,
        pixels: Vec<u8>,
    },
}

/// Adapter double that records every operation instead of broadcasting
pub struct RecordingAdapter {
    capabilities: CapabilitySet,
    entities: Mutex<IdAllocator>,
    canvases: Mutex<IdAllocator>,
    ops: Mutex<Vec<AdapterOp>>,
}

impl RecordingAdapter {
    pub fn with_capabilities(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            entities: Mutex::new(IdAllocator::new(IdRange::new(1000, 1999))),
            canvases: Mutex::new(IdAllocator::new(IdRange::new(0, 99))),
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn canvas_only() -> Self {
        Self::with_capabilities(CapabilitySet::empty().with(Capability::RasterCanvas))
    }

    pub fn full() -> Self {
        Self::with_capabilities(
            CapabilitySet::empty()
                .with(Capability::RasterCanvas)
                .with(Capability::GridEntityDisplay),
        )
    }

    pub fn ops(&self) -> Vec<AdapterOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn record(&self, op: AdapterOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl ProtocolAdapter for RecordingAdapter {
    fn version(&self) -> &'static str {
        "test"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn attach(&self, _connection: &Connection) {}

    fn spawn_frame_entity(&self, pos: BlockPos, facing: Facing) -> i32 {
        let handle = next_id(&self.entities);
        self.record(AdapterOp::SpawnFrame {
            handle,
            pos,
            facing,
        });
        handle
    }

    fn update_frame_entity(&self, handle: i32, payload: &Payload, rotation: u8, hidden: bool) {
        self.record(AdapterOp::UpdateFrame {
            handle,
            payload: payload.clone(),
            rotation,
            hidden,
        });
    }

    fn spawn_grid_entity(&self, _placement: &Mat4) -> Result<i32, AdapterError> {
        if !self.capabilities.contains(Capability::GridEntityDisplay) {
            return Err(AdapterError::Unsupported {
                version: "test",
                capability: Capability::GridEntityDisplay,
            });
        }
        let handle = next_id(&self.entities);
        self.record(AdapterOp::SpawnGrid { handle });
        Ok(handle)
    }

    fn update_grid_entity(
        &self,
        handle: i32,
        _placement: &Mat4,
        payload: &Payload,
        _mode: DisplayTransformMode,
    ) -> Result<(), AdapterError> {
        self.record(AdapterOp::UpdateGrid {
            handle,
            payload: payload.clone(),
        });
        Ok(())
    }

    fn destroy_entity(&self, handle: i32) {
        self.record(AdapterOp::Destroy { handle });
    }

    fn allocate_canvas(&self) -> Canvas {
        Canvas::new(next_id(&self.canvases))
    }

    fn paint_canvas(&self, canvas: &Canvas) {
        self.record(AdapterOp::Paint {
            handle: canvas.handle(),
            pixels: canvas.data().to_vec(),
        });
    }
}

/// World double whose answer can be flipped mid-test
#[derive(Default)]
pub struct ScriptedWorld {
    blocked: AtomicBool,
}

impl ScriptedWorld {
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }
}

impl WorldQuery for ScriptedWorld {
    fn is_space_clear(&self, _pos: BlockPos) -> bool {
        !self.blocked.load(Ordering::SeqCst)
    }
}
