//! Placement math for grid-aligned overlay entities
//!
//! Pure functions: facing resolution from a continuous heading, per-cell
//! translation offsets for the 3x3 grid and its result slot, and the
//! composed display transform shipped to clients. No state, no I/O.

mod matrix;

pub use matrix::{
    Mat3, Mat4, Quat, TransformParts, Vec3, compose, compose_and_lift, decompose, rotation_x,
    rotation_y, rotation_z, scale, translation,
};

/// One world pixel: overlay layouts are specified on a 16-pixel block grid
const PIXEL: f32 = 1.0 / 16.0;
/// Offset of the first cell from the block edge
const FIRST_CELL: f32 = PIXEL * 5.0;
/// Spacing between adjacent cells
const CELL_STEP: f32 = PIXEL * 3.0;
/// Outward bias keeping the result slot past the grid's trailing edge.
/// Tuned against the reference renderer; verify before changing.
const RESULT_BIAS: f32 = -0.21;
/// Lift applied to grid entities so they do not z-fight the block top
pub const Y_LIFT: f32 = 0.005;
/// Uniform cell scale for grid display entities
pub const CELL_SCALE: f32 = 0.18;
/// Near-zero depth flattens a displayed item into a decal
pub const FLAT_DEPTH: f32 = 0.0001;

/// Cardinal facing. The discriminant order doubles as the tie-break order
/// for [`facing_from_yaw`]: South (0 degrees) wins over West (90) and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    South,
    West,
    North,
    East,
}

impl Facing {
    pub const ALL: [Facing; 4] = [Facing::South, Facing::West, Facing::North, Facing::East];

    /// Heading angle of this facing in degrees
    pub fn yaw_degrees(&self) -> f32 {
        match self {
            Facing::South => 0.0,
            Facing::West => 90.0,
            Facing::North => 180.0,
            Facing::East => 270.0,
        }
    }

    pub fn opposite(&self) -> Facing {
        match self {
            Facing::South => Facing::North,
            Facing::West => Facing::East,
            Facing::North => Facing::South,
            Facing::East => Facing::West,
        }
    }
}

/// Map a continuous heading to the nearest cardinal facing.
///
/// Distance is shortest angular distance; exact ties resolve to the facing
/// that comes first in `{South, West, North, East}` order (yaw 45 is South).
pub fn facing_from_yaw(yaw: f32) -> Facing {
    let yaw = yaw.rem_euclid(360.0);
    let mut best = Facing::South;
    let mut best_dist = f32::MAX;
    for facing in Facing::ALL {
        let diff = (yaw - facing.yaw_degrees()).abs();
        let dist = diff.min(360.0 - diff);
        if dist < best_dist {
            best = facing;
            best_dist = dist;
        }
    }
    best
}

/// Per-facing layout: first-cell offset plus per-row / per-col deltas on
/// both horizontal axes. A right-hand layout rotated 90 degrees per step.
struct GridLayout {
    start_x: f32,
    add_x_row: f32,
    add_x_col: f32,
    start_z: f32,
    add_z_row: f32,
    add_z_col: f32,
}

fn layout(facing: Facing) -> GridLayout {
    let (f, p) = (FIRST_CELL, CELL_STEP);
    match facing {
        Facing::North => GridLayout {
            start_x: 1.0 - f,
            add_x_row: 0.0,
            add_x_col: -p,
            start_z: 1.0 - f,
            add_z_row: -p,
            add_z_col: 0.0,
        },
        Facing::East => GridLayout {
            start_x: f,
            add_x_row: p,
            add_x_col: 0.0,
            start_z: 1.0 - f,
            add_z_row: 0.0,
            add_z_col: -p,
        },
        Facing::South => GridLayout {
            start_x: f,
            add_x_row: 0.0,
            add_x_col: p,
            start_z: f,
            add_z_row: p,
            add_z_col: 0.0,
        },
        Facing::West => GridLayout {
            start_x: 1.0 - f,
            add_x_row: -p,
            add_x_col: 0.0,
            start_z: f,
            add_z_row: 0.0,
            add_z_col: p,
        },
    }
}

/// Horizontal translation offset for one cell of the 3x3 grid.
pub fn grid_cell_placement(row: usize, col: usize, facing: Facing) -> (f32, f32) {
    debug_assert!(row < 3 && col < 3);
    let l = layout(facing);
    let (row, col) = (row as f32, col as f32);
    (
        l.start_x + row * l.add_x_row + col * l.add_x_col,
        l.start_z + row * l.add_z_row + col * l.add_z_col,
    )
}

/// Horizontal translation offset for the result slot, one cell past the
/// grid's trailing edge with an outward bias.
pub fn result_slot_placement(facing: Facing) -> (f32, f32) {
    let l = layout(facing);
    (
        l.start_x + l.add_x_col + ceil_away(l.add_x_row) * RESULT_BIAS,
        l.start_z + l.add_z_col + ceil_away(l.add_z_row) * RESULT_BIAS,
    )
}

/// Rounds away from zero: ceiling toward +inf for positive values, floor
/// toward -inf for negative. The bias must always push outward, never in.
fn ceil_away(f: f32) -> f32 {
    if f < 0.0 { -(-f).ceil() } else { f.ceil() }
}

/// Z rotation aligning a flat display entity with the given facing
pub fn facing_roll(facing: Facing) -> Mat3 {
    let degrees = match facing {
        Facing::North => 0.0f32,
        Facing::East => 90.0,
        Facing::South => 180.0,
        Facing::West => 270.0,
    };
    rotation_z(degrees.to_radians())
}

/// The composed placement transform for one grid display entity: translate
/// to the cell, lay flat (90 degrees about X), roll to the facing, then
/// flatten to a decal.
pub fn item_display_transform(offset_x: f32, offset_z: f32, facing: Facing) -> Mat4 {
    let t = translation(offset_x, Y_LIFT, offset_z);
    let r = compose_and_lift(&[rotation_x(90.0f32.to_radians()), facing_roll(facing)])
        .unwrap_or(Mat4::IDENTITY);
    let s = scale(CELL_SCALE, CELL_SCALE, FLAT_DEPTH);
    compose(&[t, r, s]).unwrap_or(Mat4::IDENTITY)
}

/// Discrete 0-7 frame rotation index presenting the canvas upright to a
/// viewer approaching from `facing`.
pub fn frame_rotation(facing: Facing) -> u8 {
    match facing {
        Facing::West => 1,
        Facing::North => 2,
        Facing::East => 3,
        Facing::South => 0,
    }
}
