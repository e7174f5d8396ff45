//! RSP geometry commands for the GBI0, GBI1 and GBI2 microcode families.

use crate::dispatch::{op, tri, CommandEntry};
use crate::gbi::{matrix_flags, modify_vertex, movemem, moveword, DL_PUSH};
use crate::interpreter::Interpreter;
use crate::math::{normalize, Matrix4, MATRIX_BYTES};
use crate::rdram;
use crate::state::{Light, LIGHT_COUNT};
use crate::triangles::TriangleList;
use crate::vertex::{pack_abgr, VERTEX_CACHE_SIZE};
use crate::{HleError, HleResult};
use emu_core::logging::LogCategory;

pub(crate) static GBI0_COMMANDS: &[CommandEntry] = &[
    op(0x00, "SpNoop", sp_noop),
    op(0x01, "Matrix", gbi1_matrix),
    op(0x03, "MoveMem", gbi1_move_mem),
    op(0x04, "Vertex", gbi0_vertex),
    op(0x06, "DL", gbi1_dl),
    op(0x09, "Sprite2DBase", sprite_2d_base),
    op(0xB0, "BranchZ", branch_z),
    tri(0xB1, "Tri2", gbi1_tri2),
    op(0xB2, "RDPHalf_Cont", rdp_half_cont),
    op(0xB3, "RDPHalf2", rdp_half_2),
    op(0xB4, "RDPHalf1", rdp_half_1),
    tri(0xB5, "Line3D", gbi1_line3d),
    op(0xB6, "ClearGeometryMode", gbi1_clear_geometry_mode),
    op(0xB7, "SetGeometryMode", gbi1_set_geometry_mode),
    op(0xB8, "EndDL", end_dl),
    op(0xB9, "SetOtherModeL", gbi1_set_other_mode_l),
    op(0xBA, "SetOtherModeH", gbi1_set_other_mode_h),
    op(0xBB, "Texture", gbi1_texture),
    op(0xBC, "MoveWord", gbi1_move_word),
    op(0xBD, "PopMatrix", gbi1_pop_matrix),
    op(0xBE, "CullDL", cull_dl),
    tri(0xBF, "Tri1", gbi1_tri1),
    op(0xC0, "Noop", noop),
];

pub(crate) static GBI1_COMMANDS: &[CommandEntry] = &[
    op(0x00, "SpNoop", sp_noop),
    op(0x01, "Matrix", gbi1_matrix),
    op(0x03, "MoveMem", gbi1_move_mem),
    op(0x04, "Vertex", gbi1_vertex),
    op(0x06, "DL", gbi1_dl),
    op(0x09, "Sprite2DBase", sprite_2d_base),
    op(0xB0, "BranchZ", branch_z),
    tri(0xB1, "Tri2", gbi1_tri2),
    op(0xB2, "ModifyVtx", gbi1_modify_vertex),
    op(0xB3, "RDPHalf2", rdp_half_2),
    op(0xB4, "RDPHalf1", rdp_half_1),
    tri(0xB5, "Line3D", gbi1_line3d),
    op(0xB6, "ClearGeometryMode", gbi1_clear_geometry_mode),
    op(0xB7, "SetGeometryMode", gbi1_set_geometry_mode),
    op(0xB8, "EndDL", end_dl),
    op(0xB9, "SetOtherModeL", gbi1_set_other_mode_l),
    op(0xBA, "SetOtherModeH", gbi1_set_other_mode_h),
    op(0xBB, "Texture", gbi1_texture),
    op(0xBC, "MoveWord", gbi1_move_word),
    op(0xBD, "PopMatrix", gbi1_pop_matrix),
    op(0xBE, "CullDL", cull_dl),
    tri(0xBF, "Tri1", gbi1_tri1),
    op(0xC0, "Noop", noop),
];

pub(crate) static GBI2_COMMANDS: &[CommandEntry] = &[
    op(0x00, "Noop", noop),
    op(0x01, "Vertex", gbi2_vertex),
    op(0x02, "ModifyVtx", gbi2_modify_vertex),
    op(0x03, "CullDL", cull_dl),
    op(0x04, "BranchZ", branch_z),
    tri(0x05, "Tri1", gbi2_tri1),
    tri(0x06, "Tri2", gbi2_tri2),
    tri(0x07, "Quad", gbi2_quad),
    op(0x08, "Line3D", gbi2_line3d),
    op(0xD6, "DmaIo", gbi2_dma_io),
    op(0xD7, "Texture", gbi2_texture),
    op(0xD8, "PopMatrix", gbi2_pop_matrix),
    op(0xD9, "GeometryMode", gbi2_geometry_mode),
    op(0xDA, "Matrix", gbi2_matrix),
    op(0xDB, "MoveWord", gbi2_move_word),
    op(0xDC, "MoveMem", gbi2_move_mem),
    op(0xDD, "LoadUcode", gbi2_load_ucode),
    op(0xDE, "DL", gbi1_dl),
    op(0xDF, "EndDL", end_dl),
    op(0xE0, "SpNoop", sp_noop),
    op(0xE1, "RDPHalf1", rdp_half_1),
    op(0xE2, "SetOtherModeL", gbi2_set_other_mode_l),
    op(0xE3, "SetOtherModeH", gbi2_set_other_mode_h),
    op(0xF1, "RDPHalf2", rdp_half_2),
];

pub(crate) static WAVE_RACE_PATCHES: &[CommandEntry] = &[op(0x04, "Vertex_WR", wave_race_vertex)];

pub(crate) static GOLDENEYE_PATCHES: &[CommandEntry] = &[
    tri(0xB1, "Tri4", goldeneye_tri4),
    op(0xB2, "Noop", noop),
    op(0xB4, "Noop", noop),
];

// Flow control

fn sp_noop(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsSPNoOp()".to_string());
    Ok(())
}

fn noop(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsDPNoOp()".to_string());
    Ok(())
}

fn cull_dl(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsSPCullDisplayList()".to_string());
    Ok(())
}

fn gbi1_dl(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let push = (w0 >> 16) & 0xFF == DL_PUSH;
    let address = it.resolve(w1);
    it.describe(&|| {
        let name = if push { "gsSPDisplayList" } else { "gsSPBranchList" };
        format!("{}(0x{:08X})", name, address)
    });
    if push {
        it.call_display_list(address)
    } else {
        it.branch_display_list(address);
        Ok(())
    }
}

fn end_dl(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsSPEndDisplayList()".to_string());
    it.end_display_list();
    Ok(())
}

/// Always taken; the depth comparison is not modelled
fn branch_z(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    let address = it.resolve(it.state.rdp_half_1);
    it.stubs.report("BranchZ depth compare");
    it.describe(&|| format!("gsSPBranchLessZ(0x{:08X})", address));
    it.branch_display_list(address);
    Ok(())
}

fn rdp_half_1(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPWord(0x{:08X}) // RDPHalf1", w1));
    it.state.rdp_half_1 = w1;
    Ok(())
}

fn rdp_half_2(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsDPWord(0x{:08X}) // RDPHalf2", w1));
    it.state.rdp_half_2 = w1;
    Ok(())
}

fn rdp_half_cont(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.unimplemented("RDPHalf_Cont");
    Ok(())
}

fn sprite_2d_base(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.unimplemented("Sprite2DBase");
    Ok(())
}

fn gbi1_modify_vertex(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.unimplemented("GBI1 ModifyVtx");
    Ok(())
}

fn gbi2_line3d(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.unimplemented("GBI2 Line3D");
    Ok(())
}

fn gbi2_dma_io(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.unimplemented("DmaIo");
    Ok(())
}

fn gbi2_load_ucode(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.unimplemented("LoadUcode");
    Ok(())
}

// Matrices

fn gbi1_matrix(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let flags = (w0 >> 16) & 0xFF;
    let address = it.resolve(w1);
    apply_matrix(
        it,
        address,
        flags & matrix_flags::PROJECTION != 0,
        flags & matrix_flags::LOAD != 0,
        flags & matrix_flags::PUSH != 0,
    );
    Ok(())
}

fn gbi2_matrix(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let address = it.resolve(w1);
    apply_matrix(it, address, w0 & 4 != 0, w0 & 2 != 0, w0 & 1 == 0);
    Ok(())
}

fn apply_matrix(it: &mut Interpreter<'_>, address: u32, projection: bool, load: bool, push: bool) {
    it.describe(&|| {
        format!(
            "gsSPMatrix(0x{:08X}, {}{}{})",
            address,
            if projection { "G_MTX_PROJECTION" } else { "G_MTX_MODELVIEW" },
            if load { "|G_MTX_LOAD" } else { "|G_MTX_MUL" },
            if push { "|G_MTX_PUSH" } else { "" }
        )
    });

    let Some(loaded) =
        rdram::slice(it.ram, address, MATRIX_BYTES).and_then(Matrix4::from_fixed_bytes)
    else {
        it.anomaly(LogCategory::Geometry, || {
            format!("matrix at {:08X} is outside RDRAM", address)
        });
        return;
    };

    let stack = if projection {
        &mut it.state.projection
    } else {
        &mut it.state.modelview
    };
    let top = stack.last().copied().unwrap_or(Matrix4::IDENTITY);
    let matrix = if load { loaded } else { loaded.mul(&top) };
    if push {
        stack.push(matrix);
    } else if let Some(slot) = stack.last_mut() {
        *slot = matrix;
    }
}

fn gbi1_pop_matrix(it: &mut Interpreter<'_>, _w0: u32, _w1: u32) -> HleResult<()> {
    it.describe(&|| "gsSPPopMatrix(G_MTX_MODELVIEW)".to_string());
    pop_modelview(it, 1);
    Ok(())
}

fn gbi2_pop_matrix(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    let count = (w1 / 64).max(1) as usize;
    it.describe(&|| format!("gsSPPopMatrixN(G_MTX_MODELVIEW, {})", count));
    pop_modelview(it, count);
    Ok(())
}

/// Pop up to `count` modelview matrices, always keeping the bottom one
fn pop_modelview(it: &mut Interpreter<'_>, count: usize) {
    let depth = it.state.modelview.len();
    if depth <= 1 {
        it.anomaly(LogCategory::Geometry, || {
            "PopMatrix on an empty modelview stack".to_string()
        });
        return;
    }
    it.state.modelview.truncate(depth - count.min(depth - 1));
}

// Vertices

fn gbi0_vertex(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let count = ((w0 >> 20) & 0xF) + 1;
    let v0 = (w0 >> 16) & 0xF;
    let address = it.resolve(w1);
    load_vertices(it, address, v0, count)
}

fn gbi1_vertex(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let v0 = ((w0 >> 16) & 0xFF) / it.stride();
    let count = (w0 >> 10) & 0x3F;
    let address = it.resolve(w1);
    load_vertices(it, address, v0, count)
}

fn wave_race_vertex(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let count = (w0 >> 9) & 0x7F;
    let v0 = ((w0 >> 16) & 0xFF) / 5;
    let address = it.resolve(w1);
    load_vertices(it, address, v0, count)
}

fn gbi2_vertex(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let end = (w0 & 0xFF) >> 1;
    let count = (w0 >> 12) & 0xFF;
    let Some(v0) = end.checked_sub(count) else {
        return Err(HleError::VertexCacheOverflow { v0: end, count });
    };
    let address = it.resolve(w1);
    load_vertices(it, address, v0, count)
}

fn load_vertices(it: &mut Interpreter<'_>, address: u32, v0: u32, count: u32) -> HleResult<()> {
    it.describe(&|| format!("gsSPVertex(0x{:08X}, {}, {})", address, count, v0));
    it.vertices.load(it.ram, address, v0, count, &it.state)?;
    Ok(())
}

fn gbi2_modify_vertex(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let index = (w0 >> 1) & 0x7FFF;
    let offset = (w0 >> 16) & 0xFF;
    it.describe(&|| format!("gsSPModifyVertex({}, 0x{:02X}, 0x{:08X})", index, offset, w1));

    if !matches!(
        offset,
        modify_vertex::RGBA | modify_vertex::ST | modify_vertex::XYSCREEN | modify_vertex::ZSCREEN
    ) {
        return Err(HleError::UnknownModifyVertex { offset });
    }
    if index as usize >= VERTEX_CACHE_SIZE {
        return Err(HleError::VertexIndexOutOfRange { index });
    }

    let scale_s = it.state.texture.scale_s / 32.0;
    let scale_t = it.state.texture.scale_t / 32.0;
    match offset {
        modify_vertex::ST => {
            if let Some(vertex) = it.vertices.get_mut(index as usize) {
                let s = (w1 >> 16) as u16 as i16 as f32;
                let t = w1 as u16 as i16 as f32;
                vertex.uv = [s * scale_s, t * scale_t];
                vertex.set = true;
            }
        }
        modify_vertex::RGBA => {
            if let Some(vertex) = it.vertices.get_mut(index as usize) {
                let [r, g, b, a] = w1.to_be_bytes();
                vertex.color = pack_abgr(r, g, b, a);
                vertex.set = true;
            }
        }
        _ => it.unimplemented("ModifyVtx screen coordinates"),
    }
    Ok(())
}

// Triangles

fn gbi1_tri1(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSP1Triangle", w0, w1, |it, _w0, w1| {
        let s = it.stride();
        let mut list = TriangleList::new();
        list.push(
            ((w1 >> 16) & 0xFF) / s,
            ((w1 >> 8) & 0xFF) / s,
            (w1 & 0xFF) / s,
        );
        list
    })
}

fn gbi1_tri2(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSP2Triangles", w0, w1, |it, w0, w1| {
        let s = it.stride();
        let mut list = TriangleList::new();
        for w in [w0, w1] {
            list.push(((w >> 16) & 0xFF) / s, ((w >> 8) & 0xFF) / s, (w & 0xFF) / s);
        }
        list
    })
}

fn gbi1_line3d(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSPLine3D", w0, w1, |it, _w0, w1| {
        let s = it.stride();
        let v0 = ((w1 >> 16) & 0xFF) / s;
        let v1 = ((w1 >> 8) & 0xFF) / s;
        let v2 = (w1 & 0xFF) / s;
        let v3 = (w1 >> 24) / s;
        let mut list = TriangleList::new();
        list.push(v0, v1, v2);
        list.push(v2, v3, v0);
        list
    })
}

fn goldeneye_tri4(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSP4Triangles", w0, w1, |_it, w0, w1| {
        let mut list = TriangleList::new();
        for k in 0..4 {
            let v0 = (w1 >> (4 * k)) & 0xF;
            let v1 = (w0 >> (4 * k)) & 0xF;
            let v2 = (w1 >> (4 * k + 16)) & 0xF;
            // Equal first indices mark an absent triangle
            if v0 != v1 {
                list.push(v0, v1, v2);
            }
        }
        list
    })
}

fn gbi2_indices(w: u32) -> (u32, u32, u32) {
    ((w >> 17) & 0x7F, (w >> 9) & 0x7F, (w >> 1) & 0x7F)
}

fn gbi2_tri1(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSP1Triangle", w0, w1, |_it, w0, _w1| {
        let (a, b, c) = gbi2_indices(w0);
        let mut list = TriangleList::new();
        list.push(a, b, c);
        list
    })
}

fn gbi2_pair(_it: &Interpreter<'_>, w0: u32, w1: u32) -> TriangleList {
    let mut list = TriangleList::new();
    for w in [w0, w1] {
        let (a, b, c) = gbi2_indices(w);
        list.push(a, b, c);
    }
    list
}

fn gbi2_tri2(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSP2Triangles", w0, w1, gbi2_pair)
}

fn gbi2_quad(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    it.emit_triangles("gsSPQuadrangle", w0, w1, gbi2_pair)
}

// Modes

fn gbi1_texture(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    set_texture(it, w0, w1, w0 & 0xFF != 0);
    Ok(())
}

fn gbi2_texture(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    set_texture(it, w0, w1, (w0 >> 1) & 1 != 0);
    Ok(())
}

fn texture_scale(raw: u32) -> f32 {
    if raw == 0 || raw == 0xFFFF {
        1.0
    } else {
        raw as f32 / 65536.0
    }
}

fn set_texture(it: &mut Interpreter<'_>, w0: u32, w1: u32, enabled: bool) {
    let level = (w0 >> 11) & 3;
    let tile = ((w0 >> 8) & 7) as usize;
    let scale_s = texture_scale(w1 >> 16);
    let scale_t = texture_scale(w1 & 0xFFFF);
    it.describe(&|| {
        format!(
            "gsSPTexture({}, {}, {}, {}, {})",
            scale_s,
            scale_t,
            level,
            tile,
            if enabled { "G_ON" } else { "G_OFF" }
        )
    });

    let texture = &mut it.state.texture;
    texture.level = level;
    texture.tile = tile;
    texture.enabled = enabled;
    texture.scale_s = scale_s;
    texture.scale_t = scale_t;

    let flag = it.state.layout().texture_enable;
    let bits = it.state.geometry_bits();
    it.state
        .set_geometry_bits(if enabled { bits | flag } else { bits & !flag });
}

fn gbi1_set_geometry_mode(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsSPSetGeometryMode(0x{:08X})", w1));
    let bits = it.state.geometry_bits() | w1;
    it.state.set_geometry_bits(bits);
    Ok(())
}

fn gbi1_clear_geometry_mode(it: &mut Interpreter<'_>, _w0: u32, w1: u32) -> HleResult<()> {
    it.describe(&|| format!("gsSPClearGeometryMode(0x{:08X})", w1));
    let bits = it.state.geometry_bits() & !w1;
    it.state.set_geometry_bits(bits);
    Ok(())
}

fn gbi2_geometry_mode(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let keep = w0 & 0x00FF_FFFF;
    it.describe(&|| format!("gsSPGeometryMode(~0x{:06X}, 0x{:08X})", !keep & 0x00FF_FFFF, w1));
    let bits = (it.state.geometry_bits() & keep) | w1;
    it.state.set_geometry_bits(bits);
    Ok(())
}

/// `len` bits starting at `shift`; bits beyond 32 are dropped
fn field_mask(shift: u32, len: u32) -> u32 {
    let ones = if len >= 32 {
        u64::from(u32::MAX)
    } else {
        (1u64 << len) - 1
    };
    ones.checked_shl(shift).unwrap_or(0) as u32
}

fn gbi1_set_other_mode_l(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let mask = field_mask((w0 >> 8) & 0xFF, w0 & 0xFF);
    it.describe(&|| format!("gsSPSetOtherModeL(mask 0x{:08X}, 0x{:08X})", mask, w1));
    it.state.other_mode_l = (it.state.other_mode_l & !mask) | (w1 & mask);
    Ok(())
}

fn gbi1_set_other_mode_h(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let mask = field_mask((w0 >> 8) & 0xFF, w0 & 0xFF);
    it.describe(&|| format!("gsSPSetOtherModeH(mask 0x{:08X}, 0x{:08X})", mask, w1));
    it.state.other_mode_h = (it.state.other_mode_h & !mask) | (w1 & mask);
    Ok(())
}

fn gbi2_other_mode_mask(w0: u32) -> u32 {
    let len = (w0 & 0xFF) + 1;
    let shift = 32i32 - ((w0 >> 8) & 0xFF) as i32 - len as i32;
    field_mask(shift.max(0) as u32, len)
}

fn gbi2_set_other_mode_l(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let mask = gbi2_other_mode_mask(w0);
    it.describe(&|| format!("gsSPSetOtherModeL(mask 0x{:08X}, 0x{:08X})", mask, w1));
    it.state.other_mode_l = (it.state.other_mode_l & !mask) | (w1 & mask);
    Ok(())
}

fn gbi2_set_other_mode_h(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let mask = gbi2_other_mode_mask(w0);
    it.describe(&|| format!("gsSPSetOtherModeH(mask 0x{:08X}, 0x{:08X})", mask, w1));
    it.state.other_mode_h = (it.state.other_mode_h & !mask) | (w1 & mask);
    Ok(())
}

// MoveWord / MoveMem

fn gbi1_move_word(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let kind = w0 & 0xFF;
    let offset = (w0 >> 8) & 0xFFFF;
    let num_lights = (w1.wrapping_sub(0x8000_0000) >> 5).saturating_sub(1);
    move_word(it, kind, offset, w1, num_lights);
    Ok(())
}

fn gbi2_move_word(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let kind = (w0 >> 16) & 0xFF;
    let offset = w0 & 0xFFFF;
    move_word(it, kind, offset, w1, w1 / 24);
    Ok(())
}

fn move_word(it: &mut Interpreter<'_>, kind: u32, offset: u32, value: u32, num_lights: u32) {
    match kind {
        moveword::NUMLIGHT => {
            let n = num_lights.min(LIGHT_COUNT as u32 - 1) as usize;
            it.describe(&|| format!("gsSPNumLights({})", n));
            it.state.num_lights = n;
        }
        moveword::SEGMENT => {
            let segment = (offset >> 2) & 0xF;
            it.describe(&|| format!("gsSPSegment({}, 0x{:08X})", segment, value));
            it.segments.set(segment, value);
        }
        moveword::CLIP => it.describe(&|| format!("gsSPClipRatio(0x{:08X})", value)),
        moveword::FOG => it.describe(&|| format!("gsSPFogFactor(0x{:08X})", value)),
        moveword::PERSPNORM => it.describe(&|| format!("gsSPPerspNormalize(0x{:04X})", value)),
        moveword::MATRIX => it.unimplemented("MoveWord MATRIX"),
        moveword::LIGHTCOL => it.unimplemented("MoveWord LIGHTCOL"),
        moveword::POINTS => it.unimplemented("MoveWord POINTS"),
        _ => it.unimplemented(&format!("MoveWord {:02X}", kind)),
    }
}

fn gbi1_move_mem(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let kind = (w0 >> 16) & 0xFF;
    let address = it.resolve(w1);
    match kind {
        movemem::GBI1_VIEWPORT => move_viewport(it, address),
        movemem::GBI1_L0..=movemem::GBI1_L7 if (kind - movemem::GBI1_L0) % 2 == 0 => {
            move_light(it, ((kind - movemem::GBI1_L0) / 2) as usize, address)
        }
        movemem::GBI1_LOOKATX | movemem::GBI1_LOOKATY => it.unimplemented("MoveMem LookAt"),
        _ => it.unimplemented(&format!("MoveMem {:02X}", kind)),
    }
    Ok(())
}

fn gbi2_move_mem(it: &mut Interpreter<'_>, w0: u32, w1: u32) -> HleResult<()> {
    let kind = w0 & 0xFE;
    let offset = ((w0 >> 8) & 0xFF) * 8;
    let address = it.resolve(w1);
    match kind {
        movemem::GBI2_VIEWPORT => move_viewport(it, address),
        movemem::GBI2_LIGHT => match offset {
            movemem::GBI2_LOOKATX_OFFSET | movemem::GBI2_LOOKATY_OFFSET => {
                it.describe(&|| format!("gsSPLookAt(0x{:08X})", address));
            }
            _ => match offset.checked_sub(movemem::GBI2_L0_OFFSET) {
                Some(rel) => move_light(it, (rel / movemem::GBI2_LIGHT_STRIDE) as usize, address),
                None => it.anomaly(LogCategory::Geometry, || {
                    format!("MoveMem light offset {:02X}", offset)
                }),
            },
        },
        _ => return Err(HleError::UnknownMoveMem { kind }),
    }
    Ok(())
}

fn move_viewport(it: &mut Interpreter<'_>, address: u32) {
    it.describe(&|| format!("gsSPViewport(0x{:08X})", address));
    let Some(vp) = rdram::slice(it.ram, address, 16) else {
        it.anomaly(LogCategory::Geometry, || {
            format!("viewport at {:08X} is outside RDRAM", address)
        });
        return;
    };
    let viewport = &mut it.state.viewport;
    viewport.scale = [
        rdram::be_i16(vp, 0) as f32 / 4.0,
        rdram::be_i16(vp, 2) as f32 / 4.0,
    ];
    viewport.trans = [
        rdram::be_i16(vp, 8) as f32 / 4.0,
        rdram::be_i16(vp, 10) as f32 / 4.0,
    ];
    it.backend.set_viewport(&it.state.viewport);
}

fn move_light(it: &mut Interpreter<'_>, index: usize, address: u32) {
    it.describe(&|| format!("gsSPLight(0x{:08X}, {})", address, index + 1));
    if index >= LIGHT_COUNT {
        it.anomaly(LogCategory::Geometry, || format!("light index {} out of range", index));
        return;
    }
    let Some(record) = rdram::slice(it.ram, address, 12) else {
        it.anomaly(LogCategory::Geometry, || {
            format!("light at {:08X} is outside RDRAM", address)
        });
        return;
    };
    let channel = |i: usize| record[i] as f32 / 255.0;
    it.state.lights[index] = Light {
        color: [channel(0), channel(1), channel(2)],
        direction: normalize([
            record[8] as i8 as f32,
            record[9] as i8 as f32,
            record[10] as i8 as f32,
        ]),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Harness;
    use crate::microcode::GbiRevision;

    #[test]
    fn test_field_mask() {
        assert_eq!(field_mask(0, 1), 0x1);
        assert_eq!(field_mask(20, 2), 0x0030_0000);
        assert_eq!(field_mask(0, 32), 0xFFFF_FFFF);
        assert_eq!(field_mask(16, 32), 0xFFFF_0000);
        assert_eq!(field_mask(64, 4), 0);
    }

    #[test]
    fn test_gbi2_other_mode_mask() {
        // G_SETOTHERMODE_H(G_MDSFT_CYCLETYPE = 20, 2 bits): shift field = 32 - 20 - 2
        let w0 = 0xE300_0000 | (10 << 8) | 1;
        assert_eq!(gbi2_other_mode_mask(w0), 0x0030_0000);
    }

    #[test]
    fn test_texture_scale() {
        assert_eq!(texture_scale(0), 1.0);
        assert_eq!(texture_scale(0xFFFF), 1.0);
        assert_eq!(texture_scale(0x8000), 0.5);
    }

    #[test]
    fn test_pop_matrix_keeps_bottom_entry() {
        let mut h = Harness::new(GbiRevision::Gbi2);
        h.with(|it| {
            it.state.modelview = vec![Matrix4::IDENTITY; 4];
            // GBI2 pops w1 / 64 matrices
            gbi2_pop_matrix(it, 0xD838_0002, 128).unwrap();
            assert_eq!(it.state.modelview.len(), 2);
            gbi2_pop_matrix(it, 0xD838_0002, 64 * 5).unwrap();
            assert_eq!(it.state.modelview.len(), 1);
            gbi1_pop_matrix(it, 0xBD00_0000, 0).unwrap();
            assert_eq!(it.state.modelview.len(), 1);

            it.state.modelview = vec![Matrix4::IDENTITY; 3];
            gbi2_pop_matrix(it, 0xD838_0002, 0).unwrap();
            assert_eq!(it.state.modelview.len(), 2);
            gbi1_pop_matrix(it, 0xBD00_0000, 0).unwrap();
            assert_eq!(it.state.modelview.len(), 1);
        });
    }

    #[test]
    fn test_gbi1_move_word() {
        let mut h = Harness::new(GbiRevision::Gbi1);
        h.with(|it| {
            // (0x80000060 - 0x80000000) >> 5 = 3 lights including ambient
            gbi1_move_word(it, 0xBC00_0000 | moveword::NUMLIGHT, 0x8000_0060).unwrap();
            assert_eq!(it.state.num_lights, 2);
            gbi1_move_word(it, 0xBC00_0000 | moveword::NUMLIGHT, 0x8000_0200).unwrap();
            assert_eq!(it.state.num_lights, 7);

            let w0 = 0xBC00_0000 | ((6 * 4) << 8) | moveword::SEGMENT;
            gbi1_move_word(it, w0, 0x0012_3400).unwrap();
            assert_eq!(it.segments.get(6), 0x0012_3400);
            assert_eq!(it.resolve(0x0600_0010), 0x0012_3410);
        });
    }

    #[test]
    fn test_gbi2_move_word() {
        let mut h = Harness::new(GbiRevision::Gbi2);
        h.with(|it| {
            gbi2_move_word(it, 0xDB00_0000 | (moveword::NUMLIGHT << 16), 48).unwrap();
            assert_eq!(it.state.num_lights, 2);
            gbi2_move_word(it, 0xDB00_0000 | (moveword::NUMLIGHT << 16), 240).unwrap();
            assert_eq!(it.state.num_lights, 7);

            gbi2_move_word(it, 0xDB06_0018, 0x0004_0000).unwrap();
            assert_eq!(it.segments.get(6), 0x0004_0000);
            assert_eq!(it.resolve(0x0600_0100), 0x0004_0100);
        });
    }

    #[test]
    fn test_gbi2_geometry_mode_merges_masks() {
        let mut h = Harness::new(GbiRevision::Gbi2);
        h.with(|it| {
            it.state.set_geometry_bits(0xFF);
            // Clear the low nibble, set bit 8
            gbi2_geometry_mode(it, 0xD9FF_FFF0, 0x100).unwrap();
            assert_eq!(it.state.geometry_bits(), 0x1F0);

            gbi2_geometry_mode(it, 0xD900_0000, 0x4).unwrap();
            assert_eq!(it.state.geometry_bits(), 0x4);
        });
    }

    #[test]
    fn test_branch_z_always_branches() {
        let mut h = Harness::new(GbiRevision::Gbi2);
        h.with(|it| {
            it.state.rdp_half_1 = 0x300;
            branch_z(it, 0x0400_0000, 0).unwrap();
            assert_eq!(it.pc, 0x300);

            it.pc = 0x80;
            branch_z(it, 0x0400_0000, 0).unwrap();
            assert_eq!(it.pc, 0x300);
        });
        assert!(h.stubs.was_reported("BranchZ depth compare"));
        assert_eq!(h.stubs.reported().count(), 1);
    }

    #[test]
    fn test_modify_vertex_st_and_rgba() {
        let mut h = Harness::new(GbiRevision::Gbi2);
        h.with(|it| {
            assert!(!it.vertices.get(3).unwrap().set);

            // s = 64, t = -32 in 10.5 fixed point at texture scale 1.0
            let st = 0x0200_0000 | (modify_vertex::ST << 16) | (3 << 1);
            gbi2_modify_vertex(it, st, (64 << 16) | 0xFFE0).unwrap();
            let vertex = it.vertices.get(3).unwrap();
            assert_eq!(vertex.uv, [2.0, -1.0]);
            assert!(vertex.set);

            let rgba = 0x0200_0000 | (modify_vertex::RGBA << 16) | (3 << 1);
            gbi2_modify_vertex(it, rgba, 0x1122_3344).unwrap();
            assert_eq!(it.vertices.get(3).unwrap().color, 0x4433_2211);
            assert!(!it.vertices.get(4).unwrap().set);

            let err = gbi2_modify_vertex(it, 0x0200_0000 | (0x20 << 16), 0).unwrap_err();
            assert!(matches!(err, HleError::UnknownModifyVertex { offset: 0x20 }));
            let err = gbi2_modify_vertex(it, st | (64 << 1), 0).unwrap_err();
            assert!(matches!(err, HleError::VertexIndexOutOfRange { index: 67 }));
        });
    }
}
