//! RDP commands passed through the display list.
//!
//! These share opcodes 0xE4..=0xFF across every GBI revision. Most of them only
//! latch register state; rectangles go straight to the backend and texture
//! loads copy RDRAM into TMEM.

use crate::backend::{FillRect, ScreenRect, TextureRect};
use crate::dispatch::{op, CommandEntry};
use crate::gbi::{other_mode_l, size, CycleType};
use crate::interpreter::Interpreter;
use crate::render_mode::{CullMode, DepthState, RenderMode};
use crate::state::{GeometryMode, ImageDescriptor};
use crate::tmem::TileDescriptor;
use crate::HleResult;
use emu_core::logging::{log, LogCategory, LogLevel};

pub(crate) static RDP_COMMANDS: &[CommandEntry] = &[
    op(0xE4, "TexRect", tex_rect),
    op(0xE5, "TexRectFlip", tex_rect_flip),
    op(0xE6, "LoadSync", load_sync),
    op(0xE7, "PipeSync", pipe_sync),
    op(0xE8, "TileSync", tile_sync),
    op(0xE9, "FullSync", full_sync),
    op(0xEA, "SetKeyGB", set_key_gb),
    op(0xEB, "SetKeyR", set_key_r),
    op(0xEC, "SetConvert", set_convert),
    op(0xED, "SetScissor", set_scissor),
    op(0xEE, "SetPrimDepth", set_prim_depth),
    op(0xEF, "SetOtherMode", set_other_mode),
    op(0xF0, "LoadTLut", load_tlut),
    op(0xF2, "SetTileSize", set_tile_size),
    op(0xF3, "LoadBlock", load_block),
    op(0xF4, "LoadTile", load_tile),
    op(0xF5, "SetTile", set_tile),
    op(0xF6, "FillRect", fill_rect),
    op(0xF7, "SetFillColor", set_fill_color),
    op(0xF8, "SetFogColor", set_fog_color),
    op(0xF9, "SetBlendColor", set_blend_color),
    op(0xFA, "SetPrimColor", set_prim_color),
    op(0xFB, "SetEnvColor", set_env_color),
    op(0xFC, "SetCombine", set_combine),
    op(0xFD, "SetTImg", set_texture_image),
    op(0xFE, "SetZImg", set_depth_image),
    op(0xFF, "SetCImg", set_color_image),
];

// Syncs and keying

fn load_sync(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsDPLoadSync()".to_string());
    Ok(())
}

fn pipe_sync(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsDPPipeSync()".to_string());
    Ok(())
}

fn tile_sync(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsDPTileSync()".to_string());
    Ok(())
}

fn full_sync(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsDPFullSync()".to_string());
    Ok(())
}

fn set_key_gb(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetKeyGB(0x{:06X}, 0x{:08X})", w0 & 0xFF_FFFF, w1));
    Ok(())
}

fn set_key_r(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetKeyR(0x{:08X})", w1));
    Ok(())
}

fn set_convert(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetConvert(0x{:06X}, 0x{:08X})", w0 & 0xFF_FFFF, w1));
    Ok(())
}

// Modes

fn set_scissor(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let scissor = &mut it.state.scissor;
    scissor.x0 = ((w0 >> 12) & 0xFFF) as f32 / 4.0;
    scissor.y0 = (w0 & 0xFFF) as f32 / 4.0;
    scissor.x1 = ((w1 >> 12) & 0xFFF) as f32 / 4.0;
    scissor.y1 = (w1 & 0xFFF) as f32 / 4.0;
    scissor.mode = (w1 >> 24) & 0x2;

    let s = it.state.scissor;
    it.describe(&|| {
        format!(
            "gsDPSetScissor({}, {}, {}, {}, {})",
            s.mode, s.x0, s.y0, s.x1, s.y1
        )
    });
    it.backend.set_scissor(&s);
    Ok(())
}

fn set_prim_depth(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    let z = (w1 >> 16) & 0x7FFF;
    it.describe(&|| format!("gsDPSetPrimDepth({}, {})", z, w1 & 0xFFFF));
    it.state.prim_depth = z as f32 / 32767.0;
    Ok(())
}

fn set_other_mode(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let h = w0 & 0xFF_FFFF;
    it.describe(&|| format!("gsDPSetOtherMode(0x{:08X}, 0x{:08X})", h, w1));
    it.state.other_mode_h = h;
    it.state.other_mode_l = w1;
    Ok(())
}

// Tiles and texture loads

fn set_tile(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let index = ((w1 >> 24) & 7) as usize;
    let tile = &mut it.state.tmem.tiles[index];
    *tile = TileDescriptor {
        format: (w0 >> 21) & 7,
        size: (w0 >> 19) & 3,
        line: (w0 >> 9) & 0x1FF,
        tmem: w0 & 0x1FF,
        palette: (w1 >> 20) & 0xF,
        cm_t: (w1 >> 18) & 3,
        mask_t: (w1 >> 14) & 0xF,
        shift_t: (w1 >> 10) & 0xF,
        cm_s: (w1 >> 8) & 3,
        mask_s: (w1 >> 4) & 0xF,
        shift_s: w1 & 0xF,
        hash: None,
        ..*tile
    };

    let t = *tile;
    it.describe(&|| {
        format!(
            "gsDPSetTile({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            t.format, t.size, t.line, t.tmem, index, t.palette, t.cm_t, t.mask_t, t.shift_t,
            t.cm_s, t.mask_s, t.shift_s
        )
    });
    Ok(())
}

fn set_tile_size(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let index = ((w1 >> 24) & 7) as usize;
    let uls = (w0 >> 12) & 0xFFF;
    let ult = w0 & 0xFFF;
    let lrs = (w1 >> 12) & 0xFFF;
    let lrt = w1 & 0xFFF;
    it.describe(&|| format!("gsDPSetTileSize({}, {}, {}, {}, {})", index, uls, ult, lrs, lrt));

    let tile = &mut it.state.tmem.tiles[index];
    tile.uls = uls;
    tile.ult = ult;
    tile.lrs = lrs;
    tile.lrt = lrt;
    tile.hash = None;
    Ok(())
}

fn load_block(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let index = ((w1 >> 24) & 7) as usize;
    let uls = (w0 >> 12) & 0xFFF;
    let ult = w0 & 0xFFF;
    let lrs = (w1 >> 12) & 0xFFF;
    let dxt = w1 & 0xFFF;
    it.describe(&|| format!("gsDPLoadBlock({}, {}, {}, {}, {})", index, uls, ult, lrs, dxt));

    let image = it.state.texture_image;
    let written = it
        .state
        .tmem
        .load_block(it.ram, &image, index, uls, ult, lrs, dxt);
    log_load("LoadBlock", &image, written);
    Ok(())
}

fn load_tile(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let index = ((w1 >> 24) & 7) as usize;
    let uls = (w0 >> 12) & 0xFFF;
    let ult = w0 & 0xFFF;
    let lrs = (w1 >> 12) & 0xFFF;
    let lrt = w1 & 0xFFF;
    it.describe(&|| {
        format!(
            "gsDPLoadTile({}, {}, {}, {}, {})",
            index,
            uls as f32 / 4.0,
            ult as f32 / 4.0,
            lrs as f32 / 4.0,
            lrt as f32 / 4.0
        )
    });

    let image = it.state.texture_image;
    let written = it
        .state
        .tmem
        .load_tile(it.ram, &image, index, uls, ult, lrs, lrt);
    log_load("LoadTile", &image, written);
    Ok(())
}

fn load_tlut(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let index = ((w1 >> 24) & 7) as usize;
    let uls = (w0 >> 12) & 0xFFF;
    let ult = w0 & 0xFFF;
    let lrs = (w1 >> 12) & 0xFFF;
    let count = (w1 >> 14) & 0x3FF;
    it.describe(&|| format!("gsDPLoadTLUTCmd({}, {})", index, count));

    let image = it.state.texture_image;
    let written = it
        .state
        .tmem
        .load_tlut(it.ram, &image, index, uls, ult, lrs);
    log_load("LoadTLut", &image, written);
    Ok(())
}

fn log_load(name: &str, image: &ImageDescriptor, written: usize) {
    log(LogCategory::Texture, LogLevel::Trace, || {
        format!(
            "TMEM: {} copied {} bytes from {:08X}",
            name, written, image.address
        )
    });
}

// Rectangles

/// RGBA5551 or RGBA8888 fill color to 0..1 RGB
fn fill_rgb(fill_color: u32, image_size: u32) -> [f32; 3] {
    if image_size == size::BITS_16 {
        let c = fill_color & 0xFFFF;
        [
            ((c >> 11) & 0x1F) as f32 / 31.0,
            ((c >> 6) & 0x1F) as f32 / 31.0,
            ((c >> 1) & 0x1F) as f32 / 31.0,
        ]
    } else {
        [
            (fill_color >> 24) as f32 / 255.0,
            ((fill_color >> 16) & 0xFF) as f32 / 255.0,
            ((fill_color >> 8) & 0xFF) as f32 / 255.0,
        ]
    }
}

fn fill_rect(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let x0 = ((w1 >> 12) & 0xFFF) >> 2;
    let y0 = (w1 & 0xFFF) >> 2;
    let mut x1 = ((w0 >> 12) & 0xFFF) >> 2;
    let mut y1 = (w0 & 0xFFF) >> 2;
    it.describe(&|| format!("gsDPFillRectangle({}, {}, {}, {})", x0, y0, x1, y1));

    if it.state.depth_image.address == it.state.color_image.address {
        it.backend.clear_depth();
        return Ok(());
    }

    let mut rgb = [0.0; 3];
    match it.state.cycle_type() {
        CycleType::Fill => {
            x1 += 1;
            y1 += 1;
            rgb = fill_rgb(it.state.fill_color, it.state.color_image.size);
            if x1.wrapping_sub(x0) == it.limits.vi_width
                && y1.wrapping_sub(y0) == it.limits.vi_height
            {
                it.backend.clear_color([rgb[0], rgb[1], rgb[2], 1.0]);
                return Ok(());
            }
        }
        CycleType::Copy => {
            x1 += 1;
            y1 += 1;
        }
        _ => {}
    }

    it.backend.fill_rect(&FillRect {
        rect: ScreenRect {
            x0: x0 as f32,
            y0: y0 as f32,
            x1: x1 as f32,
            y1: y1 as f32,
        },
        color: [rgb[0], rgb[1], rgb[2], 1.0],
    });
    Ok(())
}

fn tex_rect(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    texture_rectangle(it, w0, w1, false)
}

fn tex_rect_flip(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    texture_rectangle(it, w0, w1, true)
}

/// The texture coordinates follow in the second words of the next two
/// commands, which are consumed here.
fn texture_rectangle(it: &mut Interpreter<'_>, w0: u32, w1: u32, flip: bool) -> HleResult<()> {
    let extra = it.pc;
    let (w2, w3) = match (it.read_command(extra), it.read_command(extra.wrapping_add(8))) {
        (Some((_, w2)), Some((_, w3))) => (w2, w3),
        _ => {
            it.anomaly(LogCategory::Rdp, || {
                format!("TexRect parameters at {:08X} are outside RDRAM", extra)
            });
            (0, 0)
        }
    };
    it.pc = extra.wrapping_add(16);

    let mut xh = ((w0 >> 12) & 0xFFF) as f32 / 4.0;
    let mut yh = (w0 & 0xFFF) as f32 / 4.0;
    let tile = ((w1 >> 24) & 7) as usize;
    let xl = ((w1 >> 12) & 0xFFF) as f32 / 4.0;
    let yl = (w1 & 0xFFF) as f32 / 4.0;
    let s0 = (w2 >> 16) as f32 / 32.0;
    let t0 = (w2 & 0xFFFF) as f32 / 32.0;
    let mut dsdx = (w3 >> 16) as u16 as i16 as f32 / 1024.0;
    let dtdy = w3 as u16 as i16 as f32 / 1024.0;

    it.describe(&|| {
        format!(
            "gsSPTextureRectangle{}({}, {}, {}, {}, {}, {}, {}, {}, {})",
            if flip { "Flip" } else { "" },
            xl,
            yl,
            xh,
            yh,
            tile,
            s0,
            t0,
            dsdx,
            dtdy
        )
    });

    let cycle = it.state.cycle_type();
    if cycle == CycleType::Copy {
        // Four texels per pixel clock
        dsdx *= 0.25;
    }
    if matches!(cycle, CycleType::Copy | CycleType::Fill) {
        xh += 1.0;
        yh += 1.0;
    }

    let (s1, t1, uvs) = if flip {
        let s1 = s0 + dsdx * (yh - yl);
        let t1 = t0 + dtdy * (xh - xl);
        (s1, t1, [[s0, t0], [s0, t1], [s1, t0], [s1, t1]])
    } else {
        let s1 = s0 + dsdx * (xh - xl);
        let t1 = t0 + dtdy * (yh - yl);
        (s1, t1, [[s0, t0], [s1, t0], [s0, t1], [s1, t1]])
    };
    log(LogCategory::Rdp, LogLevel::Trace, || {
        format!("TexRect: tile {} st ({}, {})-({}, {})", tile, s0, t0, s1, t1)
    });

    let depth_from_prim = it.state.other_mode_l & other_mode_l::ZS_PRIM != 0;
    let geometry = GeometryMode {
        cull_front: false,
        cull_back: false,
        ..*it.state.geometry()
    };
    let mut mode = RenderMode::derive(
        it.state.other_mode_l,
        it.state.other_mode_h,
        &geometry,
        it.state.blend_color,
    );
    mode.cull = CullMode::None;
    if !depth_from_prim {
        mode.depth = DepthState {
            test: false,
            write: false,
        };
    }

    let texture = it.bind_texture(tile, false);
    let shading = it.shading();
    it.backend.texture_rect(&TextureRect {
        rect: ScreenRect {
            x0: xl,
            y0: yl,
            x1: xh,
            y1: yh,
        },
        depth: if depth_from_prim { it.state.prim_depth } else { 0.0 },
        uvs,
        mode,
        texture,
        shading,
    });
    Ok(())
}

// Colors

fn set_fill_color(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetFillColor(0x{:08X})", w1));
    it.state.fill_color = w1;
    Ok(())
}

fn set_fog_color(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetFogColor(0x{:08X})", w1));
    it.state.fog_color = w1;
    Ok(())
}

fn set_blend_color(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetBlendColor(0x{:08X})", w1));
    it.state.blend_color = w1;
    Ok(())
}

fn set_prim_color(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| {
        format!(
            "gsDPSetPrimColor({}, {}, 0x{:08X})",
            (w0 >> 8) & 0xFF,
            w0 & 0xFF,
            w1
        )
    });
    it.state.prim_color = w1;
    Ok(())
}

fn set_env_color(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPSetEnvColor(0x{:08X})", w1));
    it.state.env_color = w1;
    Ok(())
}

fn set_combine(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let hi = w0 & 0xFF_FFFF;
    it.describe(&|| format!("gsDPSetCombine(0x{:06X}, 0x{:08X})", hi, w1));
    it.state.combiner.hi = hi;
    it.state.combiner.lo = w1;
    Ok(())
}

// Images

fn image_descriptor(it: &Interpreter<'_>, w0: u32, w1: u32) -> ImageDescriptor {
    ImageDescriptor {
        format: (w0 >> 21) & 7,
        size: (w0 >> 19) & 3,
        width: (w0 & 0xFFF) + 1,
        address: it.resolve(w1),
    }
}

fn set_texture_image(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let image = image_descriptor(it, w0, w1);
    it.describe(&|| {
        format!(
            "gsDPSetTextureImage({}, {}, {}, 0x{:08X})",
            image.format, image.size, image.width, image.address
        )
    });
    it.state.texture_image = image;
    Ok(())
}

fn set_color_image(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let image = image_descriptor(it, w0, w1);
    it.describe(&|| {
        format!(
            "gsDPSetColorImage({}, {}, {}, 0x{:08X})",
            image.format, image.size, image.width, image.address
        )
    });
    it.state.color_image = image;
    Ok(())
}

fn set_depth_image(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    let address = it.resolve(w1);
    it.describe(&|| format!("gsDPSetDepthImage(0x{:08X})", address));
    it.state.depth_image.address = address;
    Ok(())
}
