//! Asset collaborator: 16x16 indexed icon rasters
//!
//! The download/conversion pipeline lives outside this server; what we own
//! is the persisted cache file and a non-blocking lookup surface. The cache
//! file format is compatibility-binding:
//!
//! ```text
//! repeated until EOF:
//!   [u32 BE category length][UTF-8 category][u32 BE texture count]
//!   count x ([u32 BE name length][UTF-8 name][256 raw index bytes, row-major])
//! ```

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Icon edge length in pixels
pub const TEXTURE_DIM: usize = 16;

const TEXTURE_BYTES: usize = TEXTURE_DIM * TEXTURE_DIM;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed cache file: {0}")]
    Malformed(String),
}

/// One 16x16 indexed-color icon raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    data: [u8; TEXTURE_BYTES],
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            data: [0; TEXTURE_BYTES],
        }
    }
}

impl Texture {
    pub fn set(&mut self, x: usize, y: usize, color: u8) {
        debug_assert!(x < TEXTURE_DIM && y < TEXTURE_DIM);
        self.data[y * TEXTURE_DIM + x] = color;
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        debug_assert!(x < TEXTURE_DIM && y < TEXTURE_DIM);
        self.data[y * TEXTURE_DIM + x]
    }
}

/// In-memory texture table grouped by category ("block", "item")
#[derive(Debug, Default)]
pub struct TextureCache {
    groups: HashMap<String, HashMap<String, Texture>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: &str, name: &str, texture: Texture) {
        self.groups
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string(), texture);
    }

    pub fn get(&self, category: &str, name: &str) -> Option<&Texture> {
        self.groups.get(category)?.get(name)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a cache file. A clean EOF at a record boundary ends the
    /// stream; truncation inside a record is an error.
    pub fn read_from(mut reader: impl Read) -> Result<Self, TextureError> {
        let mut cache = Self::new();
        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let category = read_string(&mut reader, u32::from_be_bytes(len_buf))?;

            let count = read_u32(&mut reader)?;
            for _ in 0..count {
                let name_len = read_u32(&mut reader)?;
                let name = read_string(&mut reader, name_len)?;

                let mut texture = Texture::default();
                reader.read_exact(&mut texture.data)?;
                cache.insert(&category, &name, texture);
            }
        }
        Ok(cache)
    }

    pub fn write_to(&self, mut writer: impl Write) -> Result<(), TextureError> {
        for (category, textures) in &self.groups {
            writer.write_all(&(category.len() as u32).to_be_bytes())?;
            writer.write_all(category.as_bytes())?;
            writer.write_all(&(textures.len() as u32).to_be_bytes())?;
            for (name, texture) in textures {
                writer.write_all(&(name.len() as u32).to_be_bytes())?;
                writer.write_all(name.as_bytes())?;
                writer.write_all(&texture.data)?;
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, TextureError> {
        let file = std::fs::File::open(path)?;
        Self::read_from(io::BufReader::new(file))
    }

    pub fn save(&self, path: &Path) -> Result<(), TextureError> {
        let file = std::fs::File::create(path)?;
        self.write_to(io::BufWriter::new(file))
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32, TextureError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_string(reader: &mut impl Read, len: u32) -> Result<String, TextureError> {
    // Category/name lengths in real cache files are tens of bytes; a huge
    // length means a corrupt file, not a huge name
    if len > 4096 {
        return Err(TextureError::Malformed(format!(
            "string length {len} exceeds limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| TextureError::Malformed(e.to_string()))
}

/// Shared lookup surface over the texture cache.
///
/// The cache file loads in a background task; lookups never wait for it. A
/// raster that has not loaded yet is simply unavailable and the caller
/// leaves that cell blank.
#[derive(Default)]
pub struct TextureStore {
    cache: RwLock<TextureCache>,
}

impl TextureStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Load the cache file off the async runtime and swap it in when done.
    pub fn load_in_background(self: &Arc<Self>, path: PathBuf) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let loaded =
                tokio::task::spawn_blocking(move || TextureCache::load(&path).map(|c| (c, path)))
                    .await;
            match loaded {
                Ok(Ok((cache, path))) => {
                    info!(textures = cache.len(), path = %path.display(), "texture cache loaded");
                    if let Ok(mut slot) = store.cache.write() {
                        *slot = cache;
                    }
                }
                Ok(Err(e)) => {
                    warn!("texture cache unavailable: {e}");
                }
                Err(e) => {
                    warn!("texture load task failed: {e}");
                }
            }
        })
    }

    /// Non-blocking raster lookup in one category.
    pub fn lookup_raster(&self, category: &str, name: &str) -> Option<Texture> {
        let cache = self.cache.read().ok()?;
        cache.get(category, name).copied()
    }

    /// Icon lookup with the block-then-item category fallback.
    pub fn lookup_icon(&self, name: &str) -> Option<Texture> {
        self.lookup_raster("block", name)
            .or_else(|| self.lookup_raster("item", name))
    }

    /// Replace the cache contents directly (tests, preloaded hosts).
    pub fn replace(&self, cache: TextureCache) {
        if let Ok(mut slot) = self.cache.write() {
            *slot = cache;
        }
    }
}
