//! TMEM texel decoding.
//!
//! Converts the texels addressed by a tile descriptor into RGBA8, padded to
//! power-of-two dimensions by repeating the last column and row so that
//! bilinear filtering at the edge of a clamped texture stays correct.
//!
//! | Format | Sizes             |
//! |--------|-------------------|
//! | RGBA   | 16, 32 (4/8 as CI)|
//! | CI     | 4, 8              |
//! | IA     | 4, 8, 16          |
//! | I      | 4, 8              |

use crate::backend::TextureUpload;
use crate::gbi::{format, other_mode_h, size, TLUT_TMEM_OFFSET};
use crate::tmem::{TileDescriptor, TMEM_BYTES};

/// Decoded texture with its logical and padded sizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub upload: TextureUpload,
}

/// Decode `tile` from `tmem`. Returns `None` for formats without a decoder.
pub fn decode_tile(tmem: &[u8], tile: &TileDescriptor, tlut_type: u32) -> Option<DecodedTexture> {
    let decode = texel_decoder(tile.format, tile.size)?;
    let width = tile.width().max(1);
    let height = tile.height().max(1);
    let native_width = width.next_power_of_two();
    let native_height = height.next_power_of_two();

    let reader = TexelReader {
        tmem,
        base: (tile.tmem as usize) << 3,
        pitch: tile.row_bytes(),
        palette: tile.palette as usize,
        tlut_type,
    };

    let mut pixels = vec![0u8; (native_width * native_height * 4) as usize];
    for y in 0..native_height {
        let sy = y.min(height - 1);
        for x in 0..native_width {
            let sx = x.min(width - 1);
            let rgba = decode(&reader, sx as usize, sy as usize);
            let o = ((y * native_width + x) * 4) as usize;
            pixels[o..o + 4].copy_from_slice(&rgba);
        }
    }

    Some(DecodedTexture {
        width,
        height,
        upload: TextureUpload {
            width: native_width,
            height: native_height,
            pixels,
        },
    })
}

type TexelFn = fn(&TexelReader<'_>, usize, usize) -> [u8; 4];

fn texel_decoder(fmt: u32, siz: u32) -> Option<TexelFn> {
    Some(match (fmt, siz) {
        (format::RGBA, size::BITS_16) => rgba16,
        (format::RGBA, size::BITS_32) => rgba32,
        (format::RGBA, size::BITS_4) | (format::CI, size::BITS_4) => ci4,
        (format::RGBA, size::BITS_8) | (format::CI, size::BITS_8) => ci8,
        (format::IA, size::BITS_4) => ia4,
        (format::IA, size::BITS_8) => ia8,
        (format::IA, size::BITS_16) => ia16,
        (format::I, size::BITS_4) => i4,
        (format::I, size::BITS_8) => i8,
        _ => return None,
    })
}

struct TexelReader<'a> {
    tmem: &'a [u8],
    base: usize,
    pitch: usize,
    palette: usize,
    tlut_type: u32,
}

impl TexelReader<'_> {
    /// Byte at `offset` within row `y`, undoing the odd-row swizzle
    #[inline]
    fn byte(&self, y: usize, offset: usize) -> u8 {
        let swizzle = if y & 1 == 1 { 4 } else { 0 };
        let addr = (self.base + y * self.pitch + offset) ^ swizzle;
        self.tmem.get(addr & (TMEM_BYTES - 1)).copied().unwrap_or(0)
    }

    #[inline]
    fn u16(&self, y: usize, offset: usize) -> u16 {
        u16::from_be_bytes([self.byte(y, offset), self.byte(y, offset + 1)])
    }

    fn palette_entry(&self, index: usize) -> [u8; 4] {
        let addr = TLUT_TMEM_OFFSET + index * 2;
        let hi = self.tmem.get(addr & (TMEM_BYTES - 1)).copied().unwrap_or(0);
        let lo = self.tmem.get((addr + 1) & (TMEM_BYTES - 1)).copied().unwrap_or(0);
        let entry = u16::from_be_bytes([hi, lo]);
        if self.tlut_type == other_mode_h::TT_IA16 {
            ia16_color(entry)
        } else {
            rgba5551(entry)
        }
    }
}

#[inline]
fn expand5(v: u16) -> u8 {
    let v = (v & 0x1F) as u8;
    (v << 3) | (v >> 2)
}

fn rgba5551(c: u16) -> [u8; 4] {
    [
        expand5(c >> 11),
        expand5(c >> 6),
        expand5(c >> 1),
        if c & 1 != 0 { 0xFF } else { 0 },
    ]
}

fn ia16_color(c: u16) -> [u8; 4] {
    let i = (c >> 8) as u8;
    [i, i, i, c as u8]
}

fn rgba16(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    rgba5551(r.u16(y, x * 2))
}

fn rgba32(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    let o = x * 4;
    [r.byte(y, o), r.byte(y, o + 1), r.byte(y, o + 2), r.byte(y, o + 3)]
}

fn nibble(r: &TexelReader<'_>, x: usize, y: usize) -> u8 {
    let b = r.byte(y, x / 2);
    if x & 1 == 0 {
        b >> 4
    } else {
        b & 0xF
    }
}

fn ci4(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    r.palette_entry(r.palette * 16 + nibble(r, x, y) as usize)
}

fn ci8(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    r.palette_entry(r.byte(y, x) as usize)
}

fn ia4(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    let n = nibble(r, x, y);
    let i3 = n >> 1;
    let i = (i3 << 5) | (i3 << 2) | (i3 >> 1);
    [i, i, i, if n & 1 != 0 { 0xFF } else { 0 }]
}

fn ia8(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    let b = r.byte(y, x);
    let i = (b >> 4) * 0x11;
    let a = (b & 0xF) * 0x11;
    [i, i, i, a]
}

fn ia16(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    ia16_color(r.u16(y, x * 2))
}

fn i4(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    let i = nibble(r, x, y) * 0x11;
    [i, i, i, i]
}

fn i8(r: &TexelReader<'_>, x: usize, y: usize) -> [u8; 4] {
    let i = r.byte(y, x);
    [i, i, i, i]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(fmt: u32, siz: u32, line: u32, width: u32, height: u32) -> TileDescriptor {
        TileDescriptor {
            format: fmt,
            size: siz,
            line,
            lrs: (width - 1) << 2,
            lrt: (height - 1) << 2,
            ..Default::default()
        }
    }

    fn pixel(t: &DecodedTexture, x: u32, y: u32) -> [u8; 4] {
        let o = ((y * t.upload.width + x) * 4) as usize;
        [
            t.upload.pixels[o],
            t.upload.pixels[o + 1],
            t.upload.pixels[o + 2],
            t.upload.pixels[o + 3],
        ]
    }

    #[test]
    fn test_rgba16_decoding() {
        let mut tmem = vec![0u8; TMEM_BYTES];
        // Opaque red, transparent blue
        tmem[0..2].copy_from_slice(&0xF801u16.to_be_bytes());
        tmem[2..4].copy_from_slice(&0x003Eu16.to_be_bytes());
        let t = decode_tile(&tmem, &tile(format::RGBA, size::BITS_16, 1, 2, 1), 0).unwrap();
        assert_eq!(pixel(&t, 0, 0), [0xFF, 0, 0, 0xFF]);
        assert_eq!(pixel(&t, 1, 0), [0, 0, 0xFF, 0]);
    }

    #[test]
    fn test_rgba32_decoding() {
        let mut tmem = vec![0u8; TMEM_BYTES];
        tmem[0..4].copy_from_slice(&[1, 2, 3, 4]);
        let t = decode_tile(&tmem, &tile(format::RGBA, size::BITS_32, 1, 1, 1), 0).unwrap();
        assert_eq!(pixel(&t, 0, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn test_i4_and_ia8() {
        let mut tmem = vec![0u8; TMEM_BYTES];
        tmem[0] = 0xF0;
        let t = decode_tile(&tmem, &tile(format::I, size::BITS_4, 1, 2, 1), 0).unwrap();
        assert_eq!(pixel(&t, 0, 0), [0xFF; 4]);
        assert_eq!(pixel(&t, 1, 0), [0; 4]);

        tmem[0] = 0x8F;
        let t = decode_tile(&tmem, &tile(format::IA, size::BITS_8, 1, 1, 1), 0).unwrap();
        assert_eq!(pixel(&t, 0, 0), [0x88, 0x88, 0x88, 0xFF]);
    }

    #[test]
    fn test_ci4_uses_palette() {
        let mut tmem = vec![0u8; TMEM_BYTES];
        tmem[0] = 0x12;
        // Palette 1, entries 1 and 2
        let pal = TLUT_TMEM_OFFSET + 16 * 2;
        tmem[pal + 2..pal + 4].copy_from_slice(&0x07C1u16.to_be_bytes()); // green
        tmem[pal + 4..pal + 6].copy_from_slice(&0x80FFu16.to_be_bytes()); // IA: 0x80, 0xFF
        let mut t = tile(format::CI, size::BITS_4, 1, 2, 1);
        t.palette = 1;

        let decoded = decode_tile(&tmem, &t, other_mode_h::TT_RGBA16).unwrap();
        assert_eq!(pixel(&decoded, 0, 0), [0, 0xFF, 0, 0xFF]);

        let decoded = decode_tile(&tmem, &t, other_mode_h::TT_IA16).unwrap();
        assert_eq!(pixel(&decoded, 1, 0), [0x80, 0x80, 0x80, 0xFF]);
    }

    #[test]
    fn test_odd_rows_are_unswizzled() {
        let mut tmem = vec![0u8; TMEM_BYTES];
        // 8-bit intensity, 8 texels per row; row 1 stored with halves swapped
        tmem[8 + 4] = 0xAA; // texel (0, 1)
        tmem[8] = 0xBB; // texel (4, 1)
        let t = decode_tile(&tmem, &tile(format::I, size::BITS_8, 1, 8, 2), 0).unwrap();
        assert_eq!(pixel(&t, 0, 1), [0xAA; 4]);
        assert_eq!(pixel(&t, 4, 1), [0xBB; 4]);
    }

    #[test]
    fn test_padding_repeats_edges() {
        let mut tmem = vec![0u8; TMEM_BYTES];
        tmem[0..3].copy_from_slice(&[10, 20, 30]);
        let t = decode_tile(&tmem, &tile(format::I, size::BITS_8, 1, 3, 1), 0).unwrap();
        assert_eq!((t.width, t.height), (3, 1));
        assert_eq!((t.upload.width, t.upload.height), (4, 1));
        assert_eq!(pixel(&t, 3, 0), [30; 4]);
    }

    #[test]
    fn test_unsupported_formats() {
        let tmem = vec![0u8; TMEM_BYTES];
        assert!(decode_tile(&tmem, &tile(format::YUV, size::BITS_16, 1, 4, 4), 0).is_none());
        assert!(decode_tile(&tmem, &tile(format::I, size::BITS_32, 1, 4, 4), 0).is_none());
    }
}
