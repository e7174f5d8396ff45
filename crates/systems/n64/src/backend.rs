//! Render backend abstraction.
//!
//! The interpreter never touches a graphics API directly. Every draw, clear,
//! texture upload and presentation goes through [`RenderBackend`], so the same
//! display-list run can drive an OpenGL context or simply be recorded.
//!
//! # Architecture
//!
//! ```text
//! Interpreter -> TriangleBatch / rect commands -> RenderBackend -> {Recording, OpenGL}
//! ```
//!
//! Coordinates passed to rectangle calls are N64 screen pixels (before VI
//! scaling). Triangle positions are clip-space `[x, y, z, w]`; the backend maps
//! them through the current [`Viewport`].

use crate::gbi::CycleType;
use crate::render_mode::{RenderMode, WrapMode};
use crate::state::{Combiner, Scissor, Viewport};
use emu_core::types::Frame;
use serde::Serialize;

/// Backend-assigned texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TextureId(pub u32);

/// RGBA8 texels ready for upload; dimensions are powers of two
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextureUpload {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Texture plus the state needed to map vertex UVs onto it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextureBinding {
    pub texture: TextureId,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    /// Sampled UV = (uv - offset) * scale
    pub uv_scale: [f32; 2],
    pub uv_offset: [f32; 2],
}

/// One triangle-list vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawVertex {
    /// Clip-space position
    pub position: [f32; 4],
    /// Packed `0xAABBGGRR`
    pub color: u32,
    pub uv: [f32; 2],
}

/// Color-combiner inputs shared by triangle and texture-rect draws
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadingInputs {
    pub combiner: Combiner,
    /// `0xRRGGBBAA`
    pub prim_color: u32,
    /// `0xRRGGBBAA`
    pub env_color: u32,
    pub cycle: CycleType,
}

#[derive(Debug, Clone, Copy)]
pub struct TriangleDraw<'a> {
    /// Three vertices per triangle
    pub vertices: &'a [DrawVertex],
    pub mode: RenderMode,
    pub texture: Option<TextureBinding>,
    pub shading: ShadingInputs,
}

/// Axis-aligned rectangle in N64 screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillRect {
    pub rect: ScreenRect,
    /// RGBA in 0..1
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextureRect {
    pub rect: ScreenRect,
    /// Normalized depth
    pub depth: f32,
    /// Texel coordinates at the four corners, in strip order
    /// (x0,y0), (x1,y0), (x0,y1), (x1,y1)
    pub uvs: [[f32; 2]; 4],
    pub mode: RenderMode,
    pub texture: Option<TextureBinding>,
    pub shading: ShadingInputs,
}

/// Trait for host rendering backends
pub trait RenderBackend: Send {
    /// Name of this backend (for logs)
    fn name(&self) -> &str;

    fn create_texture(&mut self, upload: &TextureUpload) -> TextureId;

    fn release_texture(&mut self, texture: TextureId);

    fn set_viewport(&mut self, viewport: &Viewport);

    fn set_scissor(&mut self, scissor: &Scissor);

    /// Draw a batch of triangles sharing one render state
    fn draw_triangles(&mut self, draw: &TriangleDraw<'_>);

    fn fill_rect(&mut self, fill: &FillRect);

    fn texture_rect(&mut self, rect: &TextureRect);

    /// Clear the back buffer; RGBA in 0..1
    fn clear_color(&mut self, color: [f32; 4]);

    /// Reset the depth buffer to the far plane
    fn clear_depth(&mut self);

    /// Show what display lists rendered since the last present
    fn present_back_buffer(&mut self);

    /// Show a framebuffer the CPU wrote directly to RDRAM
    fn present_framebuffer(&mut self, frame: &Frame);

    fn is_hardware_accelerated(&self) -> bool {
        false
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call")]
pub enum BackendCall {
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    ReleaseTexture {
        texture: TextureId,
    },
    SetViewport(Viewport),
    SetScissor(Scissor),
    DrawTriangles {
        vertices: Vec<DrawVertex>,
        mode: RenderMode,
        texture: Option<TextureBinding>,
        shading: ShadingInputs,
    },
    FillRect(FillRect),
    TextureRect(TextureRect),
    ClearColor {
        color: [f32; 4],
    },
    ClearDepth,
    PresentBackBuffer,
    PresentFramebuffer {
        width: u32,
        height: u32,
        pixels: Vec<u32>,
    },
}

/// Backend that records every call, for tests and offline tracing
#[derive(Debug, Default, Serialize)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    next_texture: u32,
    #[serde(skip)]
    uploads: Vec<(TextureId, TextureUpload)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Triangle batches in call order
    pub fn triangle_draws(&self) -> impl Iterator<Item = &[DrawVertex]> {
        self.calls.iter().filter_map(|call| match call {
            BackendCall::DrawTriangles { vertices, .. } => Some(vertices.as_slice()),
            _ => None,
        })
    }

    /// Number of calls that put pixels in the back buffer
    pub fn draw_call_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    BackendCall::DrawTriangles { .. }
                        | BackendCall::FillRect(_)
                        | BackendCall::TextureRect(_)
                )
            })
            .count()
    }

    /// Texels of a live texture
    pub fn texture(&self, texture: TextureId) -> Option<&TextureUpload> {
        self.uploads
            .iter()
            .find(|(id, _)| *id == texture)
            .map(|(_, upload)| upload)
    }

    pub fn live_textures(&self) -> usize {
        self.uploads.len()
    }

    /// The call log as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.calls)
    }
}

impl RenderBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn create_texture(&mut self, upload: &TextureUpload) -> TextureId {
        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        self.uploads.push((texture, upload.clone()));
        self.calls.push(BackendCall::CreateTexture {
            texture,
            width: upload.width,
            height: upload.height,
        });
        texture
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.uploads.retain(|(id, _)| *id != texture);
        self.calls.push(BackendCall::ReleaseTexture { texture });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.calls.push(BackendCall::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, scissor: &Scissor) {
        self.calls.push(BackendCall::SetScissor(*scissor));
    }

    fn draw_triangles(&mut self, draw: &TriangleDraw<'_>) {
        self.calls.push(BackendCall::DrawTriangles {
            vertices: draw.vertices.to_vec(),
            mode: draw.mode,
            texture: draw.texture,
            shading: draw.shading,
        });
    }

    fn fill_rect(&mut self, fill: &FillRect) {
        self.calls.push(BackendCall::FillRect(*fill));
    }

    fn texture_rect(&mut self, rect: &TextureRect) {
        self.calls.push(BackendCall::TextureRect(*rect));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.calls.push(BackendCall::ClearColor { color });
    }

    fn clear_depth(&mut self) {
        self.calls.push(BackendCall::ClearDepth);
    }

    fn present_back_buffer(&mut self) {
        self.calls.push(BackendCall::PresentBackBuffer);
    }

    fn present_framebuffer(&mut self, frame: &Frame) {
        self.calls.push(BackendCall::PresentFramebuffer {
            width: frame.width,
            height: frame.height,
            pixels: frame.pixels.clone(),
        });
    }
}
