//! Visualization session management
//!
//! One session per spatial location, driven by a single worker task so the
//! single-owner invariant holds under concurrent host events.

pub mod table;

pub use table::{
    GridContents, RenderingMode, ReopenCallback, VisEvent, VisualizationTable, VisualizerHandle,
    spawn_worker, visualizer_channel,
};
