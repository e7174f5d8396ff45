//! OpenGL render backend.
//!
//! Implements [`RenderBackend`] on top of `glow`:
//! - OpenGL 3.3 Core Profile
//! - Draws into an offscreen FBO; presenting blits it to the default framebuffer
//! - One program for triangles and texture rectangles (shade color times
//!   texel), one for flat fills
//! - The color combiner is reduced to that single modulate; prim and env colors
//!   are not applied
//!
//! The GL context comes from the frontend. Rectangle coordinates are N64
//! screen pixels on the configured VI grid, scaled to the FBO size.

use crate::backend::{
    FillRect, RenderBackend, ScreenRect, TextureBinding, TextureId, TextureRect, TextureUpload,
    TriangleDraw,
};
use crate::config::HleConfig;
use crate::render_mode::{BlendMode, CullMode, RenderMode, TextureFilter, WrapMode};
use crate::state::{Scissor, Viewport};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::types::Frame;
use glow::HasContext;
use rustc_hash::FxHashMap;

/// position (4 x f32), color (4 x u8), uv (2 x f32)
const VERTEX_STRIDE: i32 = 28;

/// Wrapper for glow::Context that implements Send.
/// The backend is only ever used from the thread that owns the context.
struct SendContext(glow::Context);

unsafe impl Send for SendContext {}

impl std::ops::Deref for SendContext {
    type Target = glow::Context;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Maps N64 screen pixels onto the render target
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScreenSpace {
    /// N64 screen size in pixels
    screen: [f32; 2],
    /// Render target size in pixels
    target: [u32; 2],
}

impl ScreenSpace {
    fn new(screen_width: u32, screen_height: u32, width: u32, height: u32) -> Self {
        Self {
            screen: [screen_width.max(1) as f32, screen_height.max(1) as f32],
            target: [width, height],
        }
    }

    fn scale(&self) -> (f32, f32) {
        (
            self.target[0] as f32 / self.screen[0],
            self.target[1] as f32 / self.screen[1],
        )
    }

    /// N64 screen pixels to normalized device coordinates
    fn to_ndc(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x / self.screen[0] * 2.0 - 1.0,
            1.0 - y / self.screen[1] * 2.0,
        )
    }

    /// GL viewport `(x, y, w, h)` covering the N64 viewport rectangle
    fn viewport_rect(&self, vp: &Viewport) -> [i32; 4] {
        let (sx, sy) = self.scale();
        let w = vp.scale[0].abs() * 2.0;
        let h = vp.scale[1].abs() * 2.0;
        let x = vp.trans[0] - vp.scale[0].abs();
        let bottom = self.screen[1] - (vp.trans[1] + vp.scale[1].abs());
        [
            (x * sx) as i32,
            (bottom * sy) as i32,
            (w * sx) as i32,
            (h * sy) as i32,
        ]
    }

    /// GL scissor box `(x, y, w, h)`; GL rows run bottom to top
    fn scissor_rect(&self, scissor: &Scissor) -> [i32; 4] {
        let (sx, sy) = self.scale();
        [
            (scissor.x0 * sx) as i32,
            ((self.screen[1] - scissor.y1) * sy) as i32,
            ((scissor.x1 - scissor.x0).max(0.0) * sx) as i32,
            ((scissor.y1 - scissor.y0).max(0.0) * sy) as i32,
        ]
    }
}

pub struct GlowBackend {
    gl: SendContext,
    width: u32,
    height: u32,
    space: ScreenSpace,

    // Render target
    fbo: glow::Framebuffer,
    color_texture: glow::Texture,
    depth_renderbuffer: glow::Renderbuffer,

    // CPU-drawn frames
    frame_fbo: glow::Framebuffer,
    frame_texture: glow::Texture,

    triangle_program: glow::Program,
    fill_program: glow::Program,
    vao: glow::VertexArray,
    vbo: glow::Buffer,

    textures: FxHashMap<u32, glow::Texture>,
    next_texture: u32,
    viewport: Viewport,
}

impl GlowBackend {
    /// Create a backend rendering at `width` x `height` with the given GL context.
    ///
    /// The N64 screen grid comes from `config.vi_width` x `config.vi_height`.
    pub fn new(
        gl: glow::Context,
        width: u32,
        height: u32,
        config: &HleConfig,
    ) -> Result<Self, String> {
        let gl = SendContext(gl);
        let space = ScreenSpace::new(config.vi_width, config.vi_height, width, height);
        unsafe {
            let fbo = gl
                .create_framebuffer()
                .map_err(|e| format!("Failed to create framebuffer: {}", e))?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));

            let color_texture = create_target_texture(&gl, width, height)?;
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(color_texture),
                0,
            );

            let depth_renderbuffer = gl
                .create_renderbuffer()
                .map_err(|e| format!("Failed to create renderbuffer: {}", e))?;
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth_renderbuffer));
            gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH_COMPONENT24,
                width as i32,
                height as i32,
            );
            gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(depth_renderbuffer),
            );

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(format!("Framebuffer incomplete: status = 0x{:X}", status));
            }

            let frame_fbo = gl
                .create_framebuffer()
                .map_err(|e| format!("Failed to create framebuffer: {}", e))?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(frame_fbo));
            // Resized to each presented frame
            let frame_texture = create_target_texture(&gl, config.vi_width, config.vi_height)?;
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(frame_texture),
                0,
            );

            let triangle_program = create_program(
                &gl,
                include_str!("shaders/triangle.vert.glsl"),
                include_str!("shaders/triangle.frag.glsl"),
            )?;
            let fill_program = create_program(
                &gl,
                include_str!("shaders/fill.vert.glsl"),
                include_str!("shaders/fill.frag.glsl"),
            )?;

            let vao = gl
                .create_vertex_array()
                .map_err(|e| format!("Failed to create VAO: {}", e))?;
            let vbo = gl
                .create_buffer()
                .map_err(|e| format!("Failed to create VBO: {}", e))?;

            gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            log(LogCategory::Backend, LogLevel::Info, || {
                format!(
                    "OpenGL: render target {}x{} for a {}x{} screen",
                    width, height, space.screen[0], space.screen[1]
                )
            });

            Ok(Self {
                gl,
                width,
                height,
                space,
                fbo,
                color_texture,
                depth_renderbuffer,
                frame_fbo,
                frame_texture,
                triangle_program,
                fill_program,
                vao,
                vbo,
                textures: FxHashMap::default(),
                next_texture: 0,
                viewport: Viewport::default(),
            })
        }
    }

    unsafe fn apply_viewport(&self) {
        let [x, y, w, h] = self.space.viewport_rect(&self.viewport);
        self.gl.viewport(x, y, w, h);
    }

    unsafe fn apply_full_viewport(&self) {
        self.gl.viewport(0, 0, self.width as i32, self.height as i32);
    }

    unsafe fn apply_mode(&self, mode: &RenderMode) {
        let gl = &self.gl;
        match mode.blend {
            BlendMode::Opaque => gl.disable(glow::BLEND),
            BlendMode::AlphaBlend => {
                gl.enable(glow::BLEND);
                gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            }
            BlendMode::Fade => {
                gl.enable(glow::BLEND);
                gl.blend_func(glow::ZERO, glow::ONE_MINUS_SRC_ALPHA);
            }
        }

        if mode.depth.test {
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);
        } else {
            gl.disable(glow::DEPTH_TEST);
        }
        gl.depth_mask(mode.depth.write);

        match mode.cull {
            CullMode::None => gl.disable(glow::CULL_FACE),
            CullMode::Front => {
                gl.enable(glow::CULL_FACE);
                gl.cull_face(glow::FRONT);
            }
            CullMode::Back => {
                gl.enable(glow::CULL_FACE);
                gl.cull_face(glow::BACK);
            }
        }
    }

    /// Bind the program uniforms for an optional texture
    unsafe fn bind_texture(&self, binding: Option<&TextureBinding>, mode: &RenderMode) {
        let gl = &self.gl;
        let program = self.triangle_program;
        let texture = binding.and_then(|b| self.textures.get(&b.texture.0).map(|t| (b, *t)));

        let textured = gl.get_uniform_location(program, "uTextured");
        gl.uniform_1_i32(textured.as_ref(), texture.is_some() as i32);
        let threshold = gl.get_uniform_location(program, "uAlphaThreshold");
        gl.uniform_1_f32(threshold.as_ref(), mode.alpha_threshold.unwrap_or(0.0));

        let Some((binding, texture)) = texture else {
            return;
        };
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        let filter = match mode.filter {
            TextureFilter::Point => glow::NEAREST,
            TextureFilter::Linear => glow::LINEAR,
        } as i32;
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, gl_wrap(binding.wrap_s));
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, gl_wrap(binding.wrap_t));

        let sampler = gl.get_uniform_location(program, "uTexture");
        gl.uniform_1_i32(sampler.as_ref(), 0);
        let scale = gl.get_uniform_location(program, "uUVScale");
        gl.uniform_2_f32(scale.as_ref(), binding.uv_scale[0], binding.uv_scale[1]);
        let offset = gl.get_uniform_location(program, "uUVOffset");
        gl.uniform_2_f32(offset.as_ref(), binding.uv_offset[0], binding.uv_offset[1]);
    }

    /// Upload interleaved triangle vertices and set up the attributes
    unsafe fn upload_vertices(&self, bytes: &[u8]) {
        let gl = &self.gl;
        gl.bind_vertex_array(Some(self.vao));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
        gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytes, glow::STREAM_DRAW);

        gl.vertex_attrib_pointer_f32(0, 4, glow::FLOAT, false, VERTEX_STRIDE, 0);
        gl.enable_vertex_attrib_array(0);
        gl.vertex_attrib_pointer_f32(1, 4, glow::UNSIGNED_BYTE, true, VERTEX_STRIDE, 16);
        gl.enable_vertex_attrib_array(1);
        gl.vertex_attrib_pointer_f32(2, 2, glow::FLOAT, false, VERTEX_STRIDE, 20);
        gl.enable_vertex_attrib_array(2);
    }

    unsafe fn begin_draw(&self) {
        self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
    }

    /// Four N64-screen corners as an NDC triangle strip
    fn strip(rect: &ScreenRect, depth: f32) -> [[f32; 4]; 4] {
        let (x0, y0) = self.space.to_ndc(rect.x0, rect.y0);
        let (x1, y1) = self.space.to_ndc(rect.x1, rect.y1);
        let z = depth * 2.0 - 1.0;
        [
            [x0, y0, z, 1.0],
            [x1, y0, z, 1.0],
            [x0, y1, z, 1.0],
            [x1, y1, z, 1.0],
        ]
    }

    unsafe fn blit_to_screen(&self, source: glow::Framebuffer, width: u32, height: u32, flip: bool) {
        let gl = &self.gl;
        gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(source));
        gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, None);
        let (y0, y1) = if flip {
            (height as i32, 0)
        } else {
            (0, height as i32)
        };
        gl.blit_framebuffer(
            0,
            y0,
            width as i32,
            y1,
            0,
            0,
            self.width as i32,
            self.height as i32,
            glow::COLOR_BUFFER_BIT,
            glow::NEAREST,
        );
        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
    }
}

fn gl_wrap(mode: WrapMode) -> i32 {
    (match mode {
        WrapMode::Repeat => glow::REPEAT,
        WrapMode::Mirror => glow::MIRRORED_REPEAT,
        WrapMode::Clamp => glow::CLAMP_TO_EDGE,
    }) as i32
}

fn push_vertex(bytes: &mut Vec<u8>, position: [f32; 4], color: u32, uv: [f32; 2]) {
    bytes.extend_from_slice(bytemuck::cast_slice(&position));
    bytes.extend_from_slice(&color.to_le_bytes());
    bytes.extend_from_slice(bytemuck::cast_slice(&uv));
}

impl RenderBackend for GlowBackend {
    fn name(&self) -> &str {
        "OpenGL"
    }

    fn create_texture(&mut self, upload: &TextureUpload) -> TextureId {
        let id = self.next_texture;
        self.next_texture = self.next_texture.wrapping_add(1);
        unsafe {
            match self.gl.create_texture() {
                Ok(texture) => {
                    self.gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                    self.gl.tex_image_2d(
                        glow::TEXTURE_2D,
                        0,
                        glow::RGBA as i32,
                        upload.width as i32,
                        upload.height as i32,
                        0,
                        glow::RGBA,
                        glow::UNSIGNED_BYTE,
                        Some(&upload.pixels),
                    );
                    self.textures.insert(id, texture);
                }
                Err(e) => log(LogCategory::Backend, LogLevel::Error, || {
                    format!("OpenGL: failed to create texture: {}", e)
                }),
            }
        }
        TextureId(id)
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture.0) {
            unsafe { self.gl.delete_texture(t) };
        }
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.viewport = *viewport;
    }

    fn set_scissor(&mut self, scissor: &Scissor) {
        let [x, y, w, h] = self.space.scissor_rect(scissor);
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(self.fbo));
            self.gl.enable(glow::SCISSOR_TEST);
            self.gl.scissor(x, y, w, h);
        }
    }

    fn draw_triangles(&mut self, draw: &TriangleDraw<'_>) {
        let mut bytes = Vec::with_capacity(draw.vertices.len() * VERTEX_STRIDE as usize);
        for v in draw.vertices {
            push_vertex(&mut bytes, v.position, v.color, v.uv);
        }
        unsafe {
            self.begin_draw();
            self.apply_viewport();
            self.apply_mode(&draw.mode);
            self.gl.use_program(Some(self.triangle_program));
            self.bind_texture(draw.texture.as_ref(), &draw.mode);
            self.upload_vertices(&bytes);
            self.gl
                .draw_arrays(glow::TRIANGLES, 0, draw.vertices.len() as i32);
        }
    }

    fn fill_rect(&mut self, fill: &FillRect) {
        let corners = Self::strip(&fill.rect, 0.0);
        unsafe {
            self.begin_draw();
            self.apply_full_viewport();
            self.apply_mode(&RenderMode::fill());
            self.gl.use_program(Some(self.fill_program));
            let color = self.gl.get_uniform_location(self.fill_program, "uColor");
            let [r, g, b, a] = fill.color;
            self.gl.uniform_4_f32(color.as_ref(), r, g, b, a);

            self.gl.bind_vertex_array(Some(self.vao));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&corners),
                glow::STREAM_DRAW,
            );
            self.gl.vertex_attrib_pointer_f32(0, 4, glow::FLOAT, false, 16, 0);
            self.gl.enable_vertex_attrib_array(0);
            self.gl.disable_vertex_attrib_array(1);
            self.gl.disable_vertex_attrib_array(2);
            self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
    }

    fn texture_rect(&mut self, rect: &TextureRect) {
        let corners = Self::strip(&rect.rect, rect.depth);
        let mut bytes = Vec::with_capacity(4 * VERTEX_STRIDE as usize);
        for (corner, uv) in corners.iter().zip(rect.uvs.iter()) {
            push_vertex(&mut bytes, *corner, 0xFFFF_FFFF, *uv);
        }
        unsafe {
            self.begin_draw();
            self.apply_full_viewport();
            self.apply_mode(&rect.mode);
            self.gl.use_program(Some(self.triangle_program));
            self.bind_texture(rect.texture.as_ref(), &rect.mode);
            self.upload_vertices(&bytes);
            self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        unsafe {
            self.begin_draw();
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn clear_depth(&mut self) {
        unsafe {
            self.begin_draw();
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.depth_mask(true);
            self.gl.clear_depth_f32(1.0);
            self.gl.clear(glow::DEPTH_BUFFER_BIT);
        }
    }

    fn present_back_buffer(&mut self) {
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.blit_to_screen(self.fbo, self.width, self.height, false);
        }
    }

    fn present_framebuffer(&mut self, frame: &Frame) {
        let mut pixels = Vec::with_capacity(frame.pixels.len() * 4);
        for &argb in &frame.pixels {
            let [a, r, g, b] = argb.to_be_bytes();
            pixels.extend_from_slice(&[r, g, b, a]);
        }
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.bind_texture(glow::TEXTURE_2D, Some(self.frame_texture));
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                frame.width as i32,
                frame.height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(&pixels),
            );
            // Frame rows run top to bottom, GL rows bottom to top
            self.blit_to_screen(self.frame_fbo, frame.width, frame.height, true);
        }
    }

    fn is_hardware_accelerated(&self) -> bool {
        true
    }
}

unsafe fn create_target_texture(
    gl: &SendContext,
    width: u32,
    height: u32,
) -> Result<glow::Texture, String> {
    let texture = gl
        .create_texture()
        .map_err(|e| format!("Failed to create texture: {}", e))?;
    gl.bind_texture(glow::TEXTURE_2D, Some(texture));
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA as i32,
        width as i32,
        height as i32,
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        None,
    );
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
    Ok(texture)
}

unsafe fn compile_shader(
    gl: &SendContext,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, String> {
    let shader = gl
        .create_shader(shader_type)
        .map_err(|e| format!("Failed to create shader: {}", e))?;

    gl.shader_source(shader, source);
    gl.compile_shader(shader);

    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(format!("Shader compilation failed: {}", log));
    }

    Ok(shader)
}

unsafe fn create_program(
    gl: &SendContext,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<glow::Program, String> {
    let vertex_shader = compile_shader(gl, glow::VERTEX_SHADER, vertex_source)?;
    let fragment_shader = compile_shader(gl, glow::FRAGMENT_SHADER, fragment_source)?;

    let program = gl
        .create_program()
        .map_err(|e| format!("Failed to create program: {}", e))?;

    gl.attach_shader(program, vertex_shader);
    gl.attach_shader(program, fragment_shader);
    gl.link_program(program);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(format!("Program linking failed: {}", log));
    }

    gl.delete_shader(vertex_shader);
    gl.delete_shader(fragment_shader);

    Ok(program)
}

impl Drop for GlowBackend {
    fn drop(&mut self) {
        unsafe {
            for (_, texture) in self.textures.drain() {
                self.gl.delete_texture(texture);
            }
            self.gl.delete_framebuffer(self.fbo);
            self.gl.delete_framebuffer(self.frame_fbo);
            self.gl.delete_texture(self.color_texture);
            self.gl.delete_texture(self.frame_texture);
            self.gl.delete_renderbuffer(self.depth_renderbuffer);
            self.gl.delete_program(self.triangle_program);
            self.gl.delete_program(self.fill_program);
            self.gl.delete_vertex_array(self.vao);
            self.gl.delete_buffer(self.vbo);
        }
    }
}
