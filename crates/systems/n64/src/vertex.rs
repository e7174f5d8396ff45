//! Vertex cache, transform and lighting.
//!
//! Each vertex record is 16 bytes:
//!
//! ```text
//! 0..6    x, y, z      (i16)
//! 6..8    flag
//! 8..12   s, t         (i16, 10.5 fixed point)
//! 12..16  r, g, b, a   or   nx, ny, nz (i8), a
//! ```

use crate::math::{dot, normalize};
use crate::rdram;
use crate::state::GraphicsState;
use crate::{ErrorClass, HleError, HleResult};
use emu_core::logging::{log, LogCategory, LogLevel};
use std::f32::consts::PI;

pub const VERTEX_CACHE_SIZE: usize = 64;
pub const VERTEX_RECORD_BYTES: usize = 16;

/// A transformed vertex in the cache
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectedVertex {
    /// Clip-space position
    pub position: [f32; 4],
    /// Packed `0xAABBGGRR`
    pub color: u32,
    pub uv: [f32; 2],
    /// Written by a vertex load or ModifyVtx since the last reset
    pub set: bool,
}

/// Pack 8-bit channels as `0xAABBGGRR`
#[inline]
pub fn pack_abgr(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((g as u32) << 8) | r as u32
}

pub struct VertexCache {
    slots: [ProjectedVertex; VERTEX_CACHE_SIZE],
}

impl VertexCache {
    pub fn new() -> Self {
        Self {
            slots: [ProjectedVertex::default(); VERTEX_CACHE_SIZE],
        }
    }

    pub fn reset(&mut self) {
        self.slots = [ProjectedVertex::default(); VERTEX_CACHE_SIZE];
    }

    pub fn get(&self, index: usize) -> Option<&ProjectedVertex> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ProjectedVertex> {
        self.slots.get_mut(index)
    }

    /// Slots written since the last reset, with their indices
    pub fn loaded(&self) -> impl Iterator<Item = (usize, &ProjectedVertex)> {
        self.slots.iter().enumerate().filter(|(_, vertex)| vertex.set)
    }

    /// Load and transform `count` vertices into slots `v0..v0 + count`.
    ///
    /// Overflowing the cache is fatal and writes nothing. A source range outside
    /// RDRAM is logged and skipped; `Ok(false)` reports the skip.
    pub fn load(
        &mut self,
        ram: &[u8],
        address: u32,
        v0: u32,
        count: u32,
        state: &GraphicsState,
    ) -> HleResult<bool> {
        if v0 as usize + count as usize > VERTEX_CACHE_SIZE {
            return Err(HleError::VertexCacheOverflow { v0, count });
        }
        let len = count as usize * VERTEX_RECORD_BYTES;
        let Some(records) = rdram::slice(ram, address, len) else {
            log(LogCategory::Geometry, LogLevel::Warn, || {
                format!(
                    "{} Vertex: {} vertices at {:08X} run past RDRAM",
                    ErrorClass::Anomaly.prefix(),
                    count,
                    address
                )
            });
            return Ok(false);
        };

        let modelview = state.modelview_top();
        let wvp = modelview.mul(state.projection_top());
        let geometry = state.geometry();
        let scale_s = state.texture.scale_s / 32.0;
        let scale_t = state.texture.scale_t / 32.0;

        for (i, record) in records.chunks_exact(VERTEX_RECORD_BYTES).enumerate() {
            let x = rdram::be_i16(record, 0) as f32;
            let y = rdram::be_i16(record, 2) as f32;
            let z = rdram::be_i16(record, 4) as f32;
            let s = rdram::be_i16(record, 8) as f32;
            let t = rdram::be_i16(record, 10) as f32;

            let mut vertex = ProjectedVertex {
                position: wvp.transform_point([x, y, z]),
                set: true,
                ..Default::default()
            };

            if geometry.lighting {
                let raw = [
                    record[12] as i8 as f32,
                    record[13] as i8 as f32,
                    record[14] as i8 as f32,
                ];
                let normal = normalize(modelview.transform_normal(raw));
                vertex.color = shade(state, normal);

                vertex.uv = if geometry.texture_gen {
                    if geometry.texture_gen_linear {
                        [0.5 * (1.0 + normal[0]), 0.5 * (1.0 + normal[1])]
                    } else {
                        [
                            normal[0].clamp(-1.0, 1.0).acos() / PI,
                            normal[1].clamp(-1.0, 1.0).acos() / PI,
                        ]
                    }
                } else {
                    [s * scale_s, t * scale_t]
                };
            } else {
                vertex.color = pack_abgr(record[12], record[13], record[14], record[15]);
                vertex.uv = [s * scale_s, t * scale_t];
            }

            self.slots[v0 as usize + i] = vertex;
        }

        log(LogCategory::Geometry, LogLevel::Trace, || {
            format!("Vertex: loaded {} at {:08X} into {}..", count, address, v0)
        });
        Ok(true)
    }
}

impl Default for VertexCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Ambient plus Lambertian term of every active light
fn shade(state: &GraphicsState, normal: [f32; 3]) -> u32 {
    let active = state.num_lights.min(state.lights.len() - 1);
    let mut color = state.lights[active].color;
    for light in &state.lights[..active] {
        let d = dot(normal, light.direction);
        if d > 0.0 {
            for c in 0..3 {
                color[c] += light.color[c] * d;
            }
        }
    }
    let channel = |v: f32| (v.min(1.0) * 255.0) as u8;
    pack_abgr(channel(color[0]), channel(color[1]), channel(color[2]), 0xFF)
}
