//! The visualization session table: one overlay session per location
//!
//! State machine per packed location key (absent -> active -> absent). All
//! transitions run on a single worker task, which is what enforces the
//! single-owner-per-location invariant under concurrent host events and
//! connection callbacks. Content is either a canvas held by an invisible
//! frame entity or a 3x3+1 set of grid display entities, depending on the
//! configured rendering mode.

use crate::geometry::{
    Facing, Mat4, frame_rotation, grid_cell_placement, item_display_transform,
    result_slot_placement, translation,
};
use crate::protocol::{
    Canvas, DisplayTransformMode, Payload, ProtocolAdapter, registry::RegistryError,
    registry::ensure_capability,
};
use crate::texture::TextureStore;
use crate::world::{BlockPos, WorldQuery};
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Canvas layout: left edge of the 3x3 grid
const GRID_MIN_X: usize = 32;
/// Canvas layout: top edge of the 3x3 grid
const GRID_MIN_Y: usize = 32;
/// Canvas layout: gap between cells
const CELL_SPACE: usize = 8;
/// Canvas layout: icon edge length
const CELL_SIZE: usize = 16;

/// Which presentation the table drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingMode {
    /// One canvas broadcast through an invisible frame entity
    Canvas,
    /// Ten flat display entities laid out over the block
    GridEntity,
}

impl RenderingMode {
    pub fn required_capability(&self) -> crate::protocol::Capability {
        match self {
            RenderingMode::Canvas => crate::protocol::Capability::RasterCanvas,
            RenderingMode::GridEntity => crate::protocol::Capability::GridEntityDisplay,
        }
    }
}

/// The 3x3 grid plus its result slot
#[derive(Debug, Clone, PartialEq)]
pub struct GridContents {
    pub cells: [Payload; 9],
    pub result: Payload,
}

impl GridContents {
    pub fn empty() -> Self {
        Self {
            cells: std::array::from_fn(|_| Payload::Empty),
            result: Payload::Empty,
        }
    }
}

/// Events the worker serializes
#[derive(Debug)]
pub enum VisEvent {
    ContentChanged {
        pos: BlockPos,
        actor: Uuid,
        contents: GridContents,
        facing: Facing,
    },
    SessionEnded {
        pos: BlockPos,
        actor: Uuid,
    },
    EntityClicked {
        connection: Uuid,
        handle: i32,
    },
}

/// Invoked when a client clicks a session's frame entity (canvas mode):
/// the host reopens its session UI at the given location.
pub type ReopenCallback = Arc<dyn Fn(Uuid, BlockPos) + Send + Sync>;

enum SessionContent {
    Canvas { canvas: Canvas, frame: i32 },
    Grid { cells: [i32; 9], result: i32 },
}

struct Visualization {
    origin: BlockPos,
    owner: Uuid,
    content: SessionContent,
}

pub struct VisualizationTable {
    mode: RenderingMode,
    adapter: Arc<dyn ProtocolAdapter>,
    world: Arc<dyn WorldQuery>,
    textures: Arc<TextureStore>,
    reopen: ReopenCallback,
    sessions: HashMap<u64, Visualization>,
}

impl VisualizationTable {
    /// Build the table, verifying once that the adapter can express the
    /// configured rendering mode. This is the only place the capability
    /// check can fail; runtime operations assume it passed.
    pub fn new(
        mode: RenderingMode,
        adapter: Arc<dyn ProtocolAdapter>,
        world: Arc<dyn WorldQuery>,
        textures: Arc<TextureStore>,
        reopen: ReopenCallback,
    ) -> Result<Self, RegistryError> {
        ensure_capability(adapter.as_ref(), mode.required_capability())?;
        Ok(Self {
            mode,
            adapter,
            world,
            textures,
            reopen,
            sessions: HashMap::new(),
        })
    }

    pub fn handle(&mut self, event: VisEvent) {
        match event {
            VisEvent::ContentChanged {
                pos,
                actor,
                contents,
                facing,
            } => self.content_changed(pos, actor, &contents, facing),
            VisEvent::SessionEnded { pos, actor } => self.session_ended(pos, actor),
            VisEvent::EntityClicked { connection, handle } => {
                self.entity_clicked(connection, handle)
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// A host actor selected content for a location.
    pub fn content_changed(
        &mut self,
        pos: BlockPos,
        actor: Uuid,
        contents: &GridContents,
        facing: Facing,
    ) {
        if !self.world.is_space_clear(pos.above()) {
            counter!("gridcast_events_ignored_total", "reason" => "space_occupied").increment(1);
            debug!(x = pos.x, y = pos.y, z = pos.z, "space above occupied, ignoring");
            return;
        }

        let key = pos.packed_key();
        if let Some(visualization) = self.sessions.get_mut(&key) {
            if visualization.owner == actor {
                Self::update_session(
                    &*self.adapter,
                    &self.textures,
                    visualization,
                    contents,
                    facing,
                );
            } else {
                // Someone else is using this location
                counter!("gridcast_events_ignored_total", "reason" => "foreign_owner")
                    .increment(1);
                debug!(x = pos.x, y = pos.y, z = pos.z, %actor, "location owned by another actor");
            }
            return;
        }

        if let Some(visualization) = self.create_session(pos, actor, contents, facing) {
            self.sessions.insert(key, visualization);
            counter!("gridcast_sessions_started_total").increment(1);
            gauge!("gridcast_sessions_active").set(self.sessions.len() as f64);
            info!(x = pos.x, y = pos.y, z = pos.z, %actor, "session started");
        }
    }

    /// The owning actor closed its session at a location.
    pub fn session_ended(&mut self, pos: BlockPos, actor: Uuid) {
        let key = pos.packed_key();
        let owned = matches!(self.sessions.get(&key), Some(v) if v.owner == actor);
        if !owned {
            counter!("gridcast_events_ignored_total", "reason" => "no_owned_session").increment(1);
            return;
        }

        if let Some(visualization) = self.sessions.remove(&key) {
            match visualization.content {
                SessionContent::Canvas { frame, .. } => self.adapter.destroy_entity(frame),
                SessionContent::Grid { cells, result } => {
                    for handle in cells {
                        self.adapter.destroy_entity(handle);
                    }
                    self.adapter.destroy_entity(result);
                }
            }
            counter!("gridcast_sessions_ended_total").increment(1);
            gauge!("gridcast_sessions_active").set(self.sessions.len() as f64);
            info!(x = pos.x, y = pos.y, z = pos.z, %actor, "session ended");
        }
    }

    /// A connected client interacted with one of our entity handles.
    pub fn entity_clicked(&mut self, connection: Uuid, handle: i32) {
        if self.mode != RenderingMode::Canvas {
            // Grid display entities are not individually clickable
            return;
        }
        let clicked = self.sessions.values().find(
            |v| matches!(v.content, SessionContent::Canvas { frame, .. } if frame == handle),
        );
        if let Some(visualization) = clicked {
            counter!("gridcast_frame_clicks_total").increment(1);
            debug!(%connection, handle, "frame clicked, reopening session UI");
            (self.reopen)(connection, visualization.origin);
        }
    }

    fn create_session(
        &self,
        pos: BlockPos,
        actor: Uuid,
        contents: &GridContents,
        facing: Facing,
    ) -> Option<Visualization> {
        let content = match self.mode {
            RenderingMode::Canvas => {
                let frame = self.adapter.spawn_frame_entity(pos.above(), facing);
                let mut canvas = self.adapter.allocate_canvas();
                compose_canvas(&mut canvas, contents, &self.textures);
                self.adapter.paint_canvas(&canvas);
                self.adapter.update_frame_entity(
                    frame,
                    &Payload::Canvas(canvas.handle()),
                    frame_rotation(facing),
                    true,
                );
                SessionContent::Canvas { canvas, frame }
            }
            RenderingMode::GridEntity => {
                let mut cells = [0i32; 9];
                for (idx, cell) in cells.iter_mut().enumerate() {
                    let placement = cell_transform(pos, idx / 3, idx % 3, facing);
                    *cell = match self.adapter.spawn_grid_entity(&placement) {
                        Ok(handle) => handle,
                        Err(e) => {
                            warn!("grid spawn failed: {e}");
                            return None;
                        }
                    };
                }
                let result = match self
                    .adapter
                    .spawn_grid_entity(&result_transform(pos, facing))
                {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!("grid spawn failed: {e}");
                        return None;
                    }
                };
                push_grid(self.adapter.as_ref(), pos, &cells, result, contents, facing);
                SessionContent::Grid { cells, result }
            }
        };

        Some(Visualization {
            origin: pos,
            owner: actor,
            content,
        })
    }

    fn update_session(
        adapter: &dyn ProtocolAdapter,
        textures: &TextureStore,
        visualization: &mut Visualization,
        contents: &GridContents,
        facing: Facing,
    ) {
        let origin = visualization.origin;
        match &mut visualization.content {
            SessionContent::Canvas { canvas, frame } => {
                compose_canvas(canvas, contents, textures);
                adapter.paint_canvas(canvas);
                adapter.update_frame_entity(
                    *frame,
                    &Payload::Canvas(canvas.handle()),
                    frame_rotation(facing),
                    true,
                );
            }
            SessionContent::Grid { cells, result } => {
                push_grid(adapter, origin, cells, *result, contents, facing);
            }
        }
    }
}

/// Send current placements and payloads to all ten grid entities.
fn push_grid(
    adapter: &dyn ProtocolAdapter,
    pos: BlockPos,
    cells: &[i32; 9],
    result: i32,
    contents: &GridContents,
    facing: Facing,
) {
    for (idx, handle) in cells.iter().enumerate() {
        let placement = cell_transform(pos, idx / 3, idx % 3, facing);
        if let Err(e) = adapter.update_grid_entity(
            *handle,
            &placement,
            &contents.cells[idx],
            DisplayTransformMode::Gui,
        ) {
            warn!("grid update failed: {e}");
        }
    }
    if let Err(e) = adapter.update_grid_entity(
        result,
        &result_transform(pos, facing),
        &contents.result,
        DisplayTransformMode::Gui,
    ) {
        warn!("grid update failed: {e}");
    }
}

/// World-absolute placement for one grid cell above the anchor block
fn cell_transform(pos: BlockPos, row: usize, col: usize, facing: Facing) -> Mat4 {
    let (x, z) = grid_cell_placement(row, col, facing);
    anchor(pos).mul(&item_display_transform(x, z, facing))
}

/// World-absolute placement for the result slot
fn result_transform(pos: BlockPos, facing: Facing) -> Mat4 {
    let (x, z) = result_slot_placement(facing);
    anchor(pos).mul(&item_display_transform(x, z, facing))
}

fn anchor(pos: BlockPos) -> Mat4 {
    let above = pos.above();
    translation(above.x as f32, above.y as f32, above.z as f32)
}

/// Draw the grid contents onto the canvas: result icon top-centre, the
/// 3x3 grid below it. Cells whose raster is unavailable stay blank.
fn compose_canvas(canvas: &mut Canvas, contents: &GridContents, textures: &TextureStore) {
    canvas.clear();

    if let Payload::Item(name) = &contents.result
        && let Some(texture) = textures.lookup_icon(name)
    {
        blit(canvas, &texture, GRID_MIN_X + CELL_SIZE + CELL_SPACE, CELL_SPACE);
    }

    for row in 0..3 {
        for col in 0..3 {
            if let Payload::Item(name) = &contents.cells[row * 3 + col]
                && let Some(texture) = textures.lookup_icon(name)
            {
                blit(
                    canvas,
                    &texture,
                    GRID_MIN_X + col * (CELL_SIZE + CELL_SPACE),
                    GRID_MIN_Y + row * (CELL_SIZE + CELL_SPACE),
                );
            }
        }
    }
}

fn blit(canvas: &mut Canvas, texture: &crate::texture::Texture, base_x: usize, base_y: usize) {
    for y in 0..CELL_SIZE {
        for x in 0..CELL_SIZE {
            canvas.set_pixel(base_x + x, base_y + y, texture.get(x, y));
        }
    }
}

/// Depth of the event queue feeding the worker
const EVENT_QUEUE_DEPTH: usize = 256;

/// Cloneable ingress handle for the visualization worker
#[derive(Clone)]
pub struct VisualizerHandle {
    tx: mpsc::Sender<VisEvent>,
}

impl VisualizerHandle {
    pub async fn content_changed(
        &self,
        pos: BlockPos,
        actor: Uuid,
        contents: GridContents,
        facing: Facing,
    ) {
        self.send(VisEvent::ContentChanged {
            pos,
            actor,
            contents,
            facing,
        })
        .await;
    }

    pub async fn session_ended(&self, pos: BlockPos, actor: Uuid) {
        self.send(VisEvent::SessionEnded { pos, actor }).await;
    }

    async fn send(&self, event: VisEvent) {
        if self.tx.send(event).await.is_err() {
            warn!("visualization worker is gone, dropping event");
        }
    }

    /// Non-blocking enqueue for connection tasks; drops on backpressure
    /// rather than stalling the connection.
    pub fn enqueue_click(&self, connection: Uuid, handle: i32) {
        if self
            .tx
            .try_send(VisEvent::EntityClicked { connection, handle })
            .is_err()
        {
            counter!("gridcast_events_ignored_total", "reason" => "queue_full").increment(1);
        }
    }

    /// The click callback handed to the protocol adapter at startup.
    pub fn click_callback(&self) -> crate::protocol::ClickCallback {
        let handle = self.clone();
        Arc::new(move |connection, entity| handle.enqueue_click(connection, entity))
    }
}

/// Create the event channel ahead of adapter construction (the adapter
/// needs the click callback before the table can exist).
pub fn visualizer_channel() -> (VisualizerHandle, mpsc::Receiver<VisEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    (VisualizerHandle { tx }, rx)
}

/// Run the single-writer worker that owns the session table.
pub fn spawn_worker(
    mut table: VisualizationTable,
    mut rx: mpsc::Receiver<VisEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            table.handle(event);
        }
        debug!("visualization worker stopped");
    })
}
