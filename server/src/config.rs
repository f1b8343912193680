//! Server configuration
//!
//! Configuration is loaded from environment variables. Anything invalid
//! enough to make the overlay engine unsound (bad id ranges, a rendering
//! mode the selected protocol cannot express) is rejected at startup.

use crate::ident::IdRange;
use crate::session::RenderingMode;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Wire protocol generation every client speaks
    pub protocol_version: String,
    /// Overlay presentation style
    pub rendering: RenderingMode,
    /// Handle ring configuration
    pub ids: IdConfig,
    /// Force the frame hitbox to the block top
    pub force_hitbox_top: bool,
    /// Persisted texture cache location (canvas rendering)
    pub texture_cache_path: PathBuf,
}

/// Handle ring bounds, inclusive. The entity and canvas rings must not
/// overlap with each other or with ids the host server issues.
#[derive(Debug, Clone, Copy)]
pub struct IdConfig {
    pub entity_id_min: i32,
    pub entity_id_max: i32,
    pub canvas_id_min: i32,
    pub canvas_id_max: i32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entity id range is empty: {0}..={1}")]
    EmptyEntityRange(i32, i32),

    #[error("canvas id range is empty: {0}..={1}")]
    EmptyCanvasRange(i32, i32),

    #[error("entity and canvas id ranges overlap")]
    OverlappingRanges,
}

impl IdConfig {
    pub fn entity_range(&self) -> IdRange {
        IdRange::new(self.entity_id_min, self.entity_id_max)
    }

    pub fn canvas_range(&self) -> IdRange {
        IdRange::new(self.canvas_id_min, self.canvas_id_max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_id_min >= self.entity_id_max {
            return Err(ConfigError::EmptyEntityRange(
                self.entity_id_min,
                self.entity_id_max,
            ));
        }
        if self.canvas_id_min >= self.canvas_id_max {
            return Err(ConfigError::EmptyCanvasRange(
                self.canvas_id_min,
                self.canvas_id_max,
            ));
        }
        let disjoint =
            self.entity_id_max < self.canvas_id_min || self.canvas_id_max < self.entity_id_min;
        if !disjoint {
            return Err(ConfigError::OverlappingRanges);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            protocol_version: "v3".to_string(),
            rendering: RenderingMode::Canvas,
            ids: IdConfig::default(),
            force_hitbox_top: false,
            texture_cache_path: PathBuf::from("/var/lib/gridcast/textures.bin"),
        }
    }
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            entity_id_min: 1_000_000_000,
            entity_id_max: 1_000_999_999,
            canvas_id_min: 1_000_000,
            canvas_id_max: 1_999_999,
        }
    }
}

fn parse_rendering_mode(value: &str) -> Option<RenderingMode> {
    match value.to_ascii_uppercase().as_str() {
        "CANVAS" => Some(RenderingMode::Canvas),
        "GRID_ENTITY" => Some(RenderingMode::GridEntity),
        _ => None,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(version) = env::var("PROTOCOL_VERSION")
            && !version.is_empty()
        {
            config.protocol_version = version;
        }
        if let Ok(val) = env::var("RENDERING_MODE")
            && let Some(mode) = parse_rendering_mode(&val)
        {
            config.rendering = mode;
        }
        if let Ok(val) = env::var("ENTITY_ID_MIN")
            && let Ok(v) = val.parse()
        {
            config.ids.entity_id_min = v;
        }
        if let Ok(val) = env::var("ENTITY_ID_MAX")
            && let Ok(v) = val.parse()
        {
            config.ids.entity_id_max = v;
        }
        if let Ok(val) = env::var("CANVAS_ID_MIN")
            && let Ok(v) = val.parse()
        {
            config.ids.canvas_id_min = v;
        }
        if let Ok(val) = env::var("CANVAS_ID_MAX")
            && let Ok(v) = val.parse()
        {
            config.ids.canvas_id_max = v;
        }
        if let Ok(val) = env::var("FORCE_HITBOX_TOP") {
            config.force_hitbox_top = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(path) = env::var("TEXTURE_CACHE_PATH")
            && !path.is_empty()
        {
            config.texture_cache_path = PathBuf::from(path);
        }

        config
    }
}
