//! Emulated RSP/RDP register state for one display-list run.

use crate::gbi::geometry::GeometryLayout;
use crate::gbi::{other_mode_h, other_mode_l, CycleType};
use crate::math::Matrix4;
use crate::tmem::TextureMemory;
use serde::Serialize;

pub const LIGHT_COUNT: usize = 8;

/// Decoded geometry-mode flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeometryMode {
    pub zbuffer: bool,
    pub texture: bool,
    pub shade: bool,
    pub shade_smooth: bool,
    pub cull_front: bool,
    pub cull_back: bool,
    pub fog: bool,
    pub lighting: bool,
    pub texture_gen: bool,
    pub texture_gen_linear: bool,
    pub lod: bool,
}

impl GeometryMode {
    pub fn decode(bits: u32, layout: &GeometryLayout) -> Self {
        let has = |flag: u32| bits & flag != 0;
        Self {
            zbuffer: has(layout.zbuffer),
            texture: has(layout.texture_enable),
            shade: has(layout.shade),
            shade_smooth: has(layout.shading_smooth),
            cull_front: has(layout.cull_front),
            cull_back: has(layout.cull_back),
            fog: has(layout.fog),
            lighting: has(layout.lighting),
            texture_gen: has(layout.texture_gen),
            texture_gen_linear: has(layout.texture_gen_linear),
            lod: has(layout.lod),
        }
    }
}

/// Color, depth or texture image descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    pub format: u32,
    pub size: u32,
    /// Width in texels
    pub width: u32,
    /// Physical RDRAM address
    pub address: u32,
}

/// Directional light. The entry after the last active light is the ambient color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Light {
    /// RGB in 0..1
    pub color: [f32; 3],
    /// Unit direction
    pub direction: [f32; 3],
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: [0.0; 3],
            direction: [1.0, 0.0, 0.0],
        }
    }
}

/// N64 viewport in screen pixels: the visible range is `trans ± scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub scale: [f32; 2],
    pub trans: [f32; 2],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: [160.0, 120.0],
            trans: [160.0, 120.0],
        }
    }
}

/// Scissor rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scissor {
    pub mode: u32,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Default for Scissor {
    fn default() -> Self {
        Self {
            mode: 0,
            x0: 0.0,
            y0: 0.0,
            x1: 320.0,
            y1: 240.0,
        }
    }
}

/// Color combiner words as written by SetCombine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Combiner {
    /// 24 significant bits
    pub hi: u32,
    pub lo: u32,
}

/// State written by the Texture command
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextureSettings {
    pub tile: usize,
    pub level: u32,
    pub enabled: bool,
    pub scale_s: f32,
    pub scale_t: f32,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            tile: 0,
            level: 0,
            enabled: false,
            scale_s: 1.0,
            scale_t: 1.0,
        }
    }
}

pub struct GraphicsState {
    layout: &'static GeometryLayout,
    geometry_bits: u32,
    geometry: GeometryMode,

    pub other_mode_l: u32,
    pub other_mode_h: u32,

    /// Never empty; the last entry is the active matrix
    pub projection: Vec<Matrix4>,
    /// Never empty; the last entry is the active matrix
    pub modelview: Vec<Matrix4>,

    pub viewport: Viewport,
    pub scissor: Scissor,
    pub combiner: Combiner,
    pub fill_color: u32,
    pub fog_color: u32,
    pub blend_color: u32,
    pub prim_color: u32,
    pub env_color: u32,
    /// Normalized 0..1
    pub prim_depth: f32,

    pub color_image: ImageDescriptor,
    pub depth_image: ImageDescriptor,
    pub texture_image: ImageDescriptor,

    pub tmem: TextureMemory,

    pub lights: [Light; LIGHT_COUNT],
    pub num_lights: usize,
    pub texture: TextureSettings,

    pub rdp_half_1: u32,
    pub rdp_half_2: u32,
}

impl GraphicsState {
    pub fn new(layout: &'static GeometryLayout) -> Self {
        Self {
            layout,
            geometry_bits: 0,
            geometry: GeometryMode::default(),
            other_mode_l: other_mode_l::RESET,
            other_mode_h: 0,
            projection: vec![Matrix4::IDENTITY],
            modelview: vec![Matrix4::IDENTITY],
            viewport: Viewport::default(),
            scissor: Scissor::default(),
            combiner: Combiner::default(),
            fill_color: 0,
            fog_color: 0,
            blend_color: 0,
            prim_color: 0,
            env_color: 0,
            prim_depth: 0.0,
            color_image: ImageDescriptor::default(),
            depth_image: ImageDescriptor::default(),
            texture_image: ImageDescriptor::default(),
            tmem: TextureMemory::new(),
            lights: [Light::default(); LIGHT_COUNT],
            num_lights: 0,
            texture: TextureSettings::default(),
            rdp_half_1: 0,
            rdp_half_2: 0,
        }
    }

    pub fn geometry_bits(&self) -> u32 {
        self.geometry_bits
    }

    pub fn geometry(&self) -> &GeometryMode {
        &self.geometry
    }

    pub fn layout(&self) -> &'static GeometryLayout {
        self.layout
    }

    /// Replace the raw geometry-mode word and re-decode the flags
    pub fn set_geometry_bits(&mut self, bits: u32) {
        self.geometry_bits = bits;
        self.geometry = GeometryMode::decode(bits, self.layout);
    }

    pub fn projection_top(&self) -> &Matrix4 {
        self.projection.last().unwrap_or(&Matrix4::IDENTITY)
    }

    pub fn modelview_top(&self) -> &Matrix4 {
        self.modelview.last().unwrap_or(&Matrix4::IDENTITY)
    }

    pub fn cycle_type(&self) -> CycleType {
        CycleType::from_other_mode_h(self.other_mode_h)
    }

    pub fn tlut_type(&self) -> u32 {
        self.other_mode_h & other_mode_h::TEXT_LUT_MASK
    }

    /// Lights and texture generation only apply together
    pub fn texture_gen_active(&self) -> bool {
        self.geometry.lighting && self.geometry.texture_gen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbi::geometry::{F3D, F3DEX2};

    #[test]
    fn test_power_on_state() {
        let state = GraphicsState::new(&F3D);
        assert_eq!(state.other_mode_l, 0x0050_0001);
        assert_eq!(state.other_mode_h, 0);
        assert_eq!(state.projection, vec![Matrix4::IDENTITY]);
        assert_eq!(state.modelview, vec![Matrix4::IDENTITY]);
        assert_eq!(state.viewport.scale, [160.0, 120.0]);
        assert_eq!(state.scissor.x1, 320.0);
        assert_eq!(state.texture.scale_s, 1.0);
        assert_eq!(state.lights[3].direction, [1.0, 0.0, 0.0]);
        assert_eq!(state.cycle_type(), CycleType::OneCycle);
    }

    #[test]
    fn test_geometry_decoding_per_layout() {
        let mut state = GraphicsState::new(&F3D);
        state.set_geometry_bits(0x0000_2000 | 0x0002_0000);
        assert!(state.geometry().cull_back);
        assert!(state.geometry().lighting);
        assert!(!state.geometry().cull_front);

        let mut state = GraphicsState::new(&F3DEX2);
        state.set_geometry_bits(0x0000_0400 | 0x0020_0000);
        assert!(state.geometry().cull_back);
        assert!(state.geometry().shade_smooth);
        assert_eq!(state.geometry_bits(), 0x0020_0400);
    }
}
