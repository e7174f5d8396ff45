//! Segmented address resolution.
//!
//! Display lists refer to memory through 32-bit segmented addresses: bits
//! 24-27 select one of 16 base registers (set with `MoveWord(SEGMENT)`) and the
//! low 24 bits are an offset from that base.

use serde::Serialize;

pub const SEGMENT_COUNT: usize = 16;

/// The 16 segment base registers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentTable {
    bases: [u32; SEGMENT_COUNT],
}

impl SegmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a segment base; only the low 4 bits of `index` are significant
    pub fn set(&mut self, index: u32, base: u32) {
        self.bases[(index & 0xF) as usize] = base;
    }

    pub fn get(&self, index: u32) -> u32 {
        self.bases[(index & 0xF) as usize]
    }

    /// Translate a segmented address into a physical RDRAM offset.
    ///
    /// Unset segments have a zero base, so their addresses resolve to the
    /// offset alone.
    #[inline]
    pub fn resolve(&self, address: u32) -> u32 {
        let base = self.bases[((address >> 24) & 0xF) as usize] & 0x00FF_FFFF;
        base + (address & 0x00FF_FFFF)
    }

    pub fn reset(&mut self) {
        self.bases = [0; SEGMENT_COUNT];
    }
}
