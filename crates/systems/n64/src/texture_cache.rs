//! Decoded-texture cache.
//!
//! Entries are keyed by TMEM content, so a stale texture is never returned for
//! new texels. The map is a bounded LRU; evicted textures are released on the
//! backend.

use crate::backend::{RenderBackend, TextureId};
use crate::gbi::{format, size};
use crate::stubs::StubLog;
use crate::texture::decode_tile;
use crate::tmem::TextureMemory;
use emu_core::logging::{log, LogCategory, LogLevel};
use rustc_hash::FxBuildHasher;
use schnellru::{ByLength, LruMap};

pub const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub hash: u32,
    pub lrs: u32,
    pub lrt: u32,
    pub format: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedTexture {
    pub texture: TextureId,
    /// Logical size in texels
    pub width: u32,
    pub height: u32,
    /// Uploaded (power-of-two) size
    pub native_width: u32,
    pub native_height: u32,
    /// Tile origin in texels
    pub left: f32,
    pub top: f32,
}

pub struct TextureCache {
    entries: LruMap<TextureKey, CachedTexture, ByLength, FxBuildHasher>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl TextureCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: LruMap::with_hasher(
                ByLength::new(u32::try_from(capacity).unwrap_or(u32::MAX)),
                FxBuildHasher,
            ),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Texture for `tile`, decoding and uploading it on a miss.
    ///
    /// Returns `None` when the tile has no row pitch or its format has no
    /// decoder; the caller draws untextured.
    pub fn lookup(
        &mut self,
        tmem: &mut TextureMemory,
        tile: usize,
        tlut_type: u32,
        backend: &mut dyn RenderBackend,
        stubs: &mut StubLog,
    ) -> Option<CachedTexture> {
        if tmem.tiles[tile].line == 0 {
            return None;
        }
        let hash = tmem.tile_hash(tile);
        let descriptor = tmem.tiles[tile];
        let key = TextureKey {
            hash,
            lrs: descriptor.lrs,
            lrt: descriptor.lrt,
            format: descriptor.format,
            size: descriptor.size,
        };

        if let Some(entry) = self.entries.get(&key) {
            self.hits += 1;
            return Some(*entry);
        }
        self.misses += 1;

        let Some(decoded) = decode_tile(tmem.bytes(), &descriptor, tlut_type) else {
            stubs.report(&format!(
                "texture format {}{}",
                format::name(descriptor.format),
                size::bits(descriptor.size)
            ));
            return None;
        };

        if self.entries.len() >= self.capacity {
            if let Some((_, evicted)) = self.entries.pop_oldest() {
                log(LogCategory::Texture, LogLevel::Trace, || {
                    format!("Texture cache: evicting {:?}", evicted.texture)
                });
                backend.release_texture(evicted.texture);
            }
        }

        let texture = backend.create_texture(&decoded.upload);
        let entry = CachedTexture {
            texture,
            width: decoded.width,
            height: decoded.height,
            native_width: decoded.upload.width,
            native_height: decoded.upload.height,
            left: descriptor.left(),
            top: descriptor.top(),
        };
        log(LogCategory::Texture, LogLevel::Debug, || {
            format!(
                "Texture cache: {}{} {}x{} hash={:08X} -> {:?}",
                format::name(descriptor.format),
                size::bits(descriptor.size),
                entry.width,
                entry.height,
                hash,
                texture
            )
        });
        self.entries.insert(key, entry);
        Some(entry)
    }

    /// Drop every entry and release its backend texture
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        while let Some((_, entry)) = self.entries.pop_oldest() {
            backend.release_texture(entry.texture);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::tmem::TileDescriptor;

    fn tmem_with_tile(fmt: u32) -> TextureMemory {
        let mut tmem = TextureMemory::new();
        tmem.tiles[0] = TileDescriptor {
            format: fmt,
            size: size::BITS_16,
            line: 1,
            lrs: 3 << 2,
            lrt: 0,
            ..Default::default()
        };
        tmem
    }

    fn store(tmem: &mut TextureMemory, byte: u8) {
        let ram = vec![byte; 64];
        let image = crate::state::ImageDescriptor {
            format: format::RGBA,
            size: size::BITS_16,
            width: 4,
            address: 0,
        };
        tmem.load_block(&ram, &image, 1, 0, 0, 3, 0);
    }

    #[test]
    fn test_hit_after_miss() {
        let mut cache = TextureCache::new(4);
        let mut backend = RecordingBackend::new();
        let mut stubs = StubLog::new();
        let mut tmem = tmem_with_tile(format::RGBA);

        let a = cache.lookup(&mut tmem, 0, 0, &mut backend, &mut stubs).unwrap();
        let b = cache.lookup(&mut tmem, 0, 0, &mut backend, &mut stubs).unwrap();
        assert_eq!(a, b);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        assert_eq!(backend.live_textures(), 1);
        assert_eq!((a.width, a.native_width), (4, 4));
    }

    #[test]
    fn test_zero_line_is_skipped() {
        let mut cache = TextureCache::default();
        let mut backend = RecordingBackend::new();
        let mut stubs = StubLog::new();
        let mut tmem = tmem_with_tile(format::RGBA);
        tmem.tiles[0].line = 0;
        assert!(cache.lookup(&mut tmem, 0, 0, &mut backend, &mut stubs).is_none());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_unsupported_format_reported_once() {
        let mut cache = TextureCache::default();
        let mut backend = RecordingBackend::new();
        let mut stubs = StubLog::new();
        let mut tmem = tmem_with_tile(format::YUV);
        assert!(cache.lookup(&mut tmem, 0, 0, &mut backend, &mut stubs).is_none());
        assert!(stubs.was_reported("texture format YUV16"));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_eviction_releases_oldest() {
        let mut cache = TextureCache::new(2);
        let mut backend = RecordingBackend::new();
        let mut stubs = StubLog::new();
        let mut tmem = tmem_with_tile(format::RGBA);

        let mut ids = Vec::new();
        for byte in [1u8, 2, 3] {
            store(&mut tmem, byte);
            ids.push(cache.lookup(&mut tmem, 0, 0, &mut backend, &mut stubs).unwrap().texture);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(backend.live_textures(), 2);
        assert!(backend.texture(ids[0]).is_none());
        assert!(backend
            .calls()
            .contains(&BackendCall::ReleaseTexture { texture: ids[0] }));

        cache.clear(&mut backend);
        assert!(cache.is_empty());
        assert_eq!(backend.live_textures(), 0);
    }
}
