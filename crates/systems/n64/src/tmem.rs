//! Texture memory (TMEM) and tile descriptors.
//!
//! TMEM is 4 KiB of on-chip RDP memory. Texels arrive through three load
//! commands and are addressed through eight tile descriptors:
//!
//! - **LoadBlock**: copies a linear run of 64-bit words. With a non-zero `dxt`,
//!   every other row (as counted by `dxt`) has its 32-bit word pairs swapped.
//! - **LoadTile**: copies a rectangle row by row, padding each row to the
//!   tile's line pitch. Odd rows are stored with their 32-bit halves swapped.
//! - **LoadTLUT**: copies palette entries verbatim.
//!
//! The odd-row swizzle is undone in [`crate::texture`] when texels are decoded.
//! Every load clears the cached content hash of all eight tiles.

use crate::gbi::{format, size};
use crate::rdram;
use crate::state::ImageDescriptor;
use crate::ErrorClass;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

pub const TMEM_BYTES: usize = 4096;
pub const TILE_COUNT: usize = 8;

/// RDP tile descriptor (SetTile + SetTileSize)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileDescriptor {
    pub format: u32,
    pub size: u32,
    /// Row pitch in 64-bit words
    pub line: u32,
    /// TMEM address in 64-bit words
    pub tmem: u32,
    pub palette: u32,
    pub cm_s: u32,
    pub mask_s: u32,
    pub shift_s: u32,
    pub cm_t: u32,
    pub mask_t: u32,
    pub shift_t: u32,
    /// Upper-left / lower-right corner in 10.2 fixed point
    pub uls: u32,
    pub ult: u32,
    pub lrs: u32,
    pub lrt: u32,
    /// Content hash, cleared whenever TMEM or this descriptor changes
    pub hash: Option<u32>,
}

impl TileDescriptor {
    /// Width in texels, limited by the wrap mask
    pub fn width(&self) -> u32 {
        masked_extent(self.uls, self.lrs, self.mask_s)
    }

    /// Height in texels, limited by the wrap mask
    pub fn height(&self) -> u32 {
        masked_extent(self.ult, self.lrt, self.mask_t)
    }

    pub fn left(&self) -> f32 {
        self.uls as f32 / 4.0
    }

    pub fn top(&self) -> f32 {
        self.ult as f32 / 4.0
    }

    /// Bytes per TMEM row; 32-bit RGBA occupies both TMEM halves
    pub fn row_bytes(&self) -> usize {
        let bytes = (self.line as usize) << 3;
        if self.format == format::RGBA && self.size == size::BITS_32 {
            bytes * 2
        } else {
            bytes
        }
    }
}

fn masked_extent(ul: u32, lr: u32, mask: u32) -> u32 {
    let extent = (lr.wrapping_sub(ul) >> 2).wrapping_add(1) & 0x3FF;
    if mask != 0 {
        extent.min(1 << mask)
    } else {
        extent
    }
}

/// Address of texel (`uls`, `ult`) within a texture image in RDRAM
pub fn texture_address(image: &ImageDescriptor, uls: u32, ult: u32, texel_size: u32) -> u32 {
    let pitch = (image.width << texel_size) >> 1;
    image
        .address
        .wrapping_add(ult.wrapping_mul(pitch))
        .wrapping_add((uls << texel_size) >> 1)
}

pub struct TextureMemory {
    bytes: Box<[u8; TMEM_BYTES]>,
    pub tiles: [TileDescriptor; TILE_COUNT],
}

impl TextureMemory {
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; TMEM_BYTES]),
            tiles: [TileDescriptor::default(); TILE_COUNT],
        }
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
        self.tiles = [TileDescriptor::default(); TILE_COUNT];
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// Big-endian 32-bit word at word index `index` (wrapping)
    pub fn word(&self, index: usize) -> u32 {
        let o = (index * 4) & (TMEM_BYTES - 1);
        rdram::be_u32(&self.bytes[..], o)
    }

    pub fn invalidate_hashes(&mut self) {
        for tile in &mut self.tiles {
            tile.hash = None;
        }
    }

    /// LoadBlock. Returns the number of bytes written to TMEM.
    #[allow(clippy::too_many_arguments)]
    pub fn load_block(
        &mut self,
        ram: &[u8],
        image: &ImageDescriptor,
        tile: usize,
        uls: u32,
        ult: u32,
        lrs: u32,
        dxt: u32,
    ) -> usize {
        if uls != 0 || ult != 0 {
            log(LogCategory::Texture, LogLevel::Debug, || {
                format!("TMEM: LoadBlock with non-zero origin ({}, {})", uls, ult)
            });
        }

        let ram_address = texture_address(image, uls, ult, image.size);
        let bytes = ((lrs as usize + 1) << image.size) >> 1;
        let qwords = (bytes + 7) >> 3;
        let tmem_start = (self.tiles[tile].tmem as usize) << 3;

        let mut written = 0;
        let mut short_source = false;
        if dxt == 0 {
            written += self.copy_qwords(ram, ram_address, tmem_start, qwords, false, &mut short_source);
        } else {
            let qwords_per_line = (2048 + dxt as usize - 1) / dxt as usize;
            let mut done = 0;
            let mut swap = false;
            while done < qwords {
                let count = (qwords - done).min(qwords_per_line);
                written += self.copy_qwords(
                    ram,
                    ram_address.wrapping_add((done * 8) as u32),
                    tmem_start + done * 8,
                    count,
                    swap,
                    &mut short_source,
                );
                done += count;
                swap = !swap;
            }
        }

        if short_source {
            log(LogCategory::Texture, LogLevel::Warn, || {
                format!(
                    "{} TMEM: LoadBlock source {:08X}+{} runs past RDRAM",
                    ErrorClass::Anomaly.prefix(),
                    ram_address,
                    bytes
                )
            });
        }
        self.invalidate_hashes();
        written
    }

    /// Copy `count` 64-bit words, optionally swapping each pair of 32-bit words.
    fn copy_qwords(
        &mut self,
        ram: &[u8],
        ram_address: u32,
        tmem_offset: usize,
        count: usize,
        swap: bool,
        short_source: &mut bool,
    ) -> usize {
        let mut written = 0;
        for q in 0..count {
            let dst = tmem_offset + q * 8;
            if dst + 8 > TMEM_BYTES {
                break;
            }
            let Some(src) = rdram::slice(ram, ram_address.wrapping_add((q * 8) as u32), 8) else {
                *short_source = true;
                break;
            };
            if swap {
                self.bytes[dst..dst + 4].copy_from_slice(&src[4..8]);
                self.bytes[dst + 4..dst + 8].copy_from_slice(&src[0..4]);
            } else {
                self.bytes[dst..dst + 8].copy_from_slice(src);
            }
            written += 8;
        }
        written
    }

    /// LoadTile. Returns the number of bytes written to TMEM.
    #[allow(clippy::too_many_arguments)]
    pub fn load_tile(
        &mut self,
        ram: &[u8],
        image: &ImageDescriptor,
        tile: usize,
        uls: u32,
        ult: u32,
        lrs: u32,
        lrt: u32,
    ) -> usize {
        if lrs < uls || lrt < ult {
            log(LogCategory::Texture, LogLevel::Warn, || {
                format!(
                    "{} TMEM: LoadTile with inverted rectangle ({},{})-({},{})",
                    ErrorClass::Anomaly.prefix(),
                    uls,
                    ult,
                    lrs,
                    lrt
                )
            });
            self.invalidate_hashes();
            return 0;
        }

        let descriptor = self.tiles[tile];
        let pitch = ((image.width << image.size) >> 1) as usize;
        let h = (((lrt - ult) >> 2) + 1) as usize;
        let w = (((lrs - uls) >> 2) + 1) as usize;
        let bytes_per_line = (w << image.size) >> 1;
        let mut tmem_line = (descriptor.line as usize) << 3;
        if image.size == size::BITS_32 {
            tmem_line *= 2;
        }

        let mut ram_offset = texture_address(image, uls >> 2, ult >> 2, image.size) as usize;
        let mut tmem_offset = (descriptor.tmem as usize) << 3;
        let mut written = 0;
        let mut short_source = false;

        for y in 0..h {
            if tmem_offset >= TMEM_BYTES || tmem_line == 0 {
                break;
            }
            let swizzle = if y & 1 == 1 { 4 } else { 0 };
            for x in 0..tmem_line {
                let dst = tmem_offset + (x ^ swizzle);
                if dst >= TMEM_BYTES {
                    continue;
                }
                let value = if x < bytes_per_line {
                    match ram.get(ram_offset + x) {
                        Some(&b) => b,
                        None => {
                            short_source = true;
                            0
                        }
                    }
                } else {
                    0
                };
                self.bytes[dst] = value;
                written += 1;
            }
            tmem_offset += tmem_line;
            ram_offset += pitch;
        }

        if short_source {
            log(LogCategory::Texture, LogLevel::Warn, || {
                format!(
                    "{} TMEM: LoadTile source at {:08X} runs past RDRAM",
                    ErrorClass::Anomaly.prefix(),
                    image.address
                )
            });
        }
        self.invalidate_hashes();
        written
    }

    /// LoadTLUT. Palette entries are always 16 bits wide.
    pub fn load_tlut(
        &mut self,
        ram: &[u8],
        image: &ImageDescriptor,
        tile: usize,
        uls: u32,
        ult: u32,
        lrs: u32,
    ) -> usize {
        let ram_address = texture_address(image, uls >> 2, ult >> 2, size::BITS_16);
        let texels = ((lrs.wrapping_sub(uls) >> 2) as usize + 1) & 0x3FF;
        let tmem_offset = (self.tiles[tile].tmem as usize) << 3;
        let len = (texels * 2).min(TMEM_BYTES.saturating_sub(tmem_offset));

        let written = match rdram::slice(ram, ram_address, len) {
            Some(src) => {
                self.bytes[tmem_offset..tmem_offset + len].copy_from_slice(src);
                len
            }
            None => {
                log(LogCategory::Texture, LogLevel::Warn, || {
                    format!(
                        "{} TMEM: LoadTLUT source {:08X}+{} runs past RDRAM",
                        ErrorClass::Anomaly.prefix(),
                        ram_address,
                        len
                    )
                });
                0
            }
        };
        self.invalidate_hashes();
        written
    }

    /// Content hash of the texels (and palette, for palettized formats)
    /// addressed by `tile`. Cached on the descriptor until the next load.
    pub fn tile_hash(&mut self, tile: usize) -> u32 {
        if let Some(hash) = self.tiles[tile].hash {
            return hash;
        }
        let descriptor = self.tiles[tile];
        let start = (descriptor.tmem as usize) << 3;
        let len = descriptor.height() as usize * descriptor.row_bytes();
        let mut hash = self.hash_range(start, len, 0);

        if descriptor.format == format::CI || descriptor.format == format::RGBA {
            let palette = crate::gbi::TLUT_TMEM_OFFSET;
            if descriptor.size == size::BITS_8 {
                hash = self.hash_range(palette, 256 * 2, hash);
            } else if descriptor.size == size::BITS_4 {
                let offset = palette + descriptor.palette as usize * 16 * 2;
                hash = self.hash_range(offset, 16 * 2, hash);
            }
        }

        self.tiles[tile].hash = Some(hash);
        hash
    }

    fn hash_range(&self, offset: usize, len: usize, seed: u32) -> u32 {
        let begin = offset.min(TMEM_BYTES) / 4;
        let end = offset.saturating_add(len).min(TMEM_BYTES) / 4;
        (begin..end).fold(seed, |h, i| h.wrapping_mul(17).wrapping_add(self.word(i)))
    }
}

impl Default for TextureMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(address: u32, width: u32, size: u32) -> ImageDescriptor {
        ImageDescriptor {
            format: format::RGBA,
            size,
            width,
            address,
        }
    }

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn test_load_block_straight_copy() {
        let ram = ramp(256);
        let mut tmem = TextureMemory::new();
        // 32 16-bit texels = 64 bytes
        let written = tmem.load_block(&ram, &image(0, 32, size::BITS_16), 0, 0, 0, 31, 0);
        assert_eq!(written, 64);
        assert_eq!(&tmem.bytes()[..64], &ram[..64]);
    }

    #[test]
    fn test_load_block_swaps_odd_rows() {
        let ram = ramp(256);
        let mut tmem = TextureMemory::new();
        // dxt = 1024 -> two qwords per row
        let written = tmem.load_block(&ram, &image(0, 32, size::BITS_16), 0, 0, 0, 31, 1024);
        assert_eq!(written, 64);
        // Row 0 (qwords 0..2) straight
        assert_eq!(&tmem.bytes()[0..16], &ram[0..16]);
        // Row 1 (qwords 2..4) has word pairs swapped
        assert_eq!(&tmem.bytes()[16..20], &ram[20..24]);
        assert_eq!(&tmem.bytes()[20..24], &ram[16..20]);
        assert_eq!(&tmem.bytes()[24..28], &ram[28..32]);
        // Row 2 straight again
        assert_eq!(&tmem.bytes()[32..48], &ram[32..48]);
    }

    #[test]
    fn test_load_block_clamps_to_tmem() {
        let ram = ramp(0x2000);
        let mut tmem = TextureMemory::new();
        tmem.tiles[0].tmem = 0x1F0; // 128 bytes from the end
        let written = tmem.load_block(&ram, &image(0, 1024, size::BITS_16), 0, 0, 0, 1023, 0);
        assert_eq!(written, 128);
    }

    #[test]
    fn test_load_block_short_source_copies_what_exists() {
        let ram = ramp(24);
        let mut tmem = TextureMemory::new();
        let written = tmem.load_block(&ram, &image(0, 32, size::BITS_16), 0, 0, 0, 31, 0);
        assert_eq!(written, 24);
    }

    #[test]
    fn test_load_tile_pads_and_swizzles() {
        // 4x2 texels of 16 bits from an 8-texel wide image
        let ram = ramp(64);
        let mut tmem = TextureMemory::new();
        tmem.tiles[0].line = 2; // 16 bytes per row
        let written = tmem.load_tile(&ram, &image(0, 8, size::BITS_16), 0, 0, 0, 3 << 2, 1 << 2);
        assert_eq!(written, 32);

        let t = tmem.bytes();
        // Row 0: 8 texel bytes then zero padding
        assert_eq!(&t[0..8], &ram[0..8]);
        assert!(t[8..16].iter().all(|&b| b == 0));
        // Row 1 starts at RDRAM pitch 16, stored with 32-bit halves swapped
        assert_eq!(&t[16..20], &ram[20..24]);
        assert_eq!(&t[20..24], &ram[16..20]);
        assert!(t[24..32].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_load_tlut_copies_palette() {
        let ram = ramp(0x400);
        let mut tmem = TextureMemory::new();
        tmem.tiles[7].tmem = 0x100;
        let written = tmem.load_tlut(&ram, &image(0x100, 16, size::BITS_16), 7, 0, 0, 15 << 2);
        assert_eq!(written, 32);
        assert_eq!(&tmem.bytes()[0x800..0x820], &ram[0x100..0x120]);
    }

    #[test]
    fn test_hash_is_cached_until_load() {
        let ram = ramp(256);
        let mut tmem = TextureMemory::new();
        tmem.tiles[0] = TileDescriptor {
            format: format::RGBA,
            size: size::BITS_16,
            line: 2,
            lrs: 7 << 2,
            lrt: 3 << 2,
            ..Default::default()
        };
        tmem.load_block(&ram, &image(0, 8, size::BITS_16), 1, 0, 0, 31, 0);

        let first = tmem.tile_hash(0);
        assert_eq!(tmem.tiles[0].hash, Some(first));
        assert_eq!(tmem.tile_hash(0), first);

        // Loading different data invalidates and changes the hash
        let other: Vec<u8> = ram.iter().map(|b| b ^ 0xFF).collect();
        tmem.load_block(&other, &image(0, 8, size::BITS_16), 1, 0, 0, 31, 0);
        assert_eq!(tmem.tiles[0].hash, None);
        assert_ne!(tmem.tile_hash(0), first);

        // Reloading the original bytes restores the original hash
        tmem.load_block(&ram, &image(0, 8, size::BITS_16), 1, 0, 0, 31, 0);
        assert_eq!(tmem.tile_hash(0), first);
    }

    #[test]
    fn test_ci4_hash_includes_palette() {
        let mut tmem = TextureMemory::new();
        tmem.tiles[0] = TileDescriptor {
            format: format::CI,
            size: size::BITS_4,
            line: 1,
            palette: 2,
            lrs: 15 << 2,
            lrt: 0,
            ..Default::default()
        };
        let before = tmem.tile_hash(0);

        let mut ram = vec![0u8; 64];
        ram[0] = 0xAB;
        tmem.tiles[1].tmem = (0x800 + 2 * 32) / 8;
        tmem.load_tlut(&ram, &image(0, 16, size::BITS_16), 1, 0, 0, 15 << 2);
        assert_ne!(tmem.tile_hash(0), before);
    }

    #[test]
    fn test_tile_dimensions() {
        let tile = TileDescriptor {
            uls: 4,
            ult: 8,
            lrs: 4 + (63 << 2),
            lrt: 8 + (31 << 2),
            mask_s: 5,
            ..Default::default()
        };
        assert_eq!(tile.width(), 32);
        assert_eq!(tile.height(), 32);
        assert_eq!(tile.left(), 1.0);
        assert_eq!(tile.top(), 2.0);
    }
}
