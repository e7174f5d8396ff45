//! Graphics Binary Interface constants shared by the command handlers.

/// Geometry-mode bit layouts
pub mod geometry {
    /// Flag values for one geometry-mode layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeometryLayout {
        pub zbuffer: u32,
        pub texture_enable: u32,
        pub shade: u32,
        pub shading_smooth: u32,
        pub cull_front: u32,
        pub cull_back: u32,
        pub fog: u32,
        pub lighting: u32,
        pub texture_gen: u32,
        pub texture_gen_linear: u32,
        pub lod: u32,
    }

    /// Fast3D / F3DEX (GBI0 and GBI1)
    pub const F3D: GeometryLayout = GeometryLayout {
        zbuffer: 0x0000_0001,
        texture_enable: 0x0000_0002,
        shade: 0x0000_0004,
        shading_smooth: 0x0000_0200,
        cull_front: 0x0000_1000,
        cull_back: 0x0000_2000,
        fog: 0x0001_0000,
        lighting: 0x0002_0000,
        texture_gen: 0x0004_0000,
        texture_gen_linear: 0x0008_0000,
        lod: 0x0010_0000,
    };

    /// F3DEX2 (GBI2). `texture_enable` is not a hardware bit in this layout;
    /// the Texture command toggles it.
    pub const F3DEX2: GeometryLayout = GeometryLayout {
        zbuffer: 0x0000_0001,
        texture_enable: 0x0000_0002,
        shade: 0x0000_0004,
        shading_smooth: 0x0020_0000,
        cull_front: 0x0000_0200,
        cull_back: 0x0000_0400,
        fog: 0x0001_0000,
        lighting: 0x0002_0000,
        texture_gen: 0x0004_0000,
        texture_gen_linear: 0x0008_0000,
        lod: 0x0010_0000,
    };
}

/// Other-mode low word
pub mod other_mode_l {
    pub const ALPHA_COMPARE_MASK: u32 = 0x3;
    pub const AC_THRESHOLD: u32 = 0x1;
    pub const ZS_PRIM: u32 = 0x4;
    pub const Z_CMP: u32 = 0x10;
    pub const Z_UPD: u32 = 0x20;
    pub const CVG_X_ALPHA: u32 = 0x1000;
    pub const ALPHA_CVG_SEL: u32 = 0x2000;
    pub const BLENDER_SHIFT: u32 = 16;
    /// Power-on value set at the start of every run
    pub const RESET: u32 = 0x0050_0001;
}

/// Other-mode high word
pub mod other_mode_h {
    pub const CYCLE_SHIFT: u32 = 20;
    pub const CYCLE_MASK: u32 = 3 << CYCLE_SHIFT;
    pub const TEXT_FILT_MASK: u32 = 3 << 12;
    pub const TF_POINT: u32 = 0;
    pub const TEXT_LUT_MASK: u32 = 3 << 14;
    pub const TT_NONE: u32 = 0;
    pub const TT_RGBA16: u32 = 2 << 14;
    pub const TT_IA16: u32 = 3 << 14;
}

/// RDP cycle type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum CycleType {
    OneCycle = 0,
    TwoCycle = 1,
    Copy = 2,
    Fill = 3,
}

impl CycleType {
    pub fn from_other_mode_h(h: u32) -> Self {
        match (h & other_mode_h::CYCLE_MASK) >> other_mode_h::CYCLE_SHIFT {
            0 => CycleType::OneCycle,
            1 => CycleType::TwoCycle,
            2 => CycleType::Copy,
            _ => CycleType::Fill,
        }
    }
}

/// Texel formats
pub mod format {
    pub const RGBA: u32 = 0;
    pub const YUV: u32 = 1;
    pub const CI: u32 = 2;
    pub const IA: u32 = 3;
    pub const I: u32 = 4;

    pub fn name(format: u32) -> &'static str {
        match format {
            RGBA => "RGBA",
            YUV => "YUV",
            CI => "CI",
            IA => "IA",
            I => "I",
            _ => "?",
        }
    }
}

/// Texel sizes
pub mod size {
    pub const BITS_4: u32 = 0;
    pub const BITS_8: u32 = 1;
    pub const BITS_16: u32 = 2;
    pub const BITS_32: u32 = 3;

    pub fn bits(size: u32) -> u32 {
        4 << (size & 3)
    }
}

/// Tile clamp/mirror flags (`cm_s`, `cm_t`)
pub mod tile_mode {
    pub const MIRROR: u32 = 0x1;
    pub const CLAMP: u32 = 0x2;
}

/// MoveWord indices
pub mod moveword {
    pub const MATRIX: u32 = 0x0;
    pub const NUMLIGHT: u32 = 0x2;
    pub const CLIP: u32 = 0x4;
    pub const SEGMENT: u32 = 0x6;
    pub const FOG: u32 = 0x8;
    pub const LIGHTCOL: u32 = 0xA;
    pub const POINTS: u32 = 0xC;
    pub const PERSPNORM: u32 = 0xE;
}

/// MoveMem types
pub mod movemem {
    pub const GBI1_VIEWPORT: u32 = 0x80;
    pub const GBI1_LOOKATY: u32 = 0x82;
    pub const GBI1_LOOKATX: u32 = 0x84;
    pub const GBI1_L0: u32 = 0x86;
    pub const GBI1_L7: u32 = 0x94;

    pub const GBI2_VIEWPORT: u32 = 0x08;
    pub const GBI2_LIGHT: u32 = 0x0A;
    pub const GBI2_LOOKATX_OFFSET: u32 = 0x00;
    pub const GBI2_LOOKATY_OFFSET: u32 = 0x18;
    pub const GBI2_L0_OFFSET: u32 = 0x30;
    pub const GBI2_LIGHT_STRIDE: u32 = 0x18;
}

/// ModifyVtx offsets
pub mod modify_vertex {
    pub const RGBA: u32 = 0x10;
    pub const ST: u32 = 0x14;
    pub const XYSCREEN: u32 = 0x18;
    pub const ZSCREEN: u32 = 0x1C;
}

/// GBI1 matrix parameter flags
pub mod matrix_flags {
    pub const PROJECTION: u32 = 0x1;
    pub const LOAD: u32 = 0x2;
    pub const PUSH: u32 = 0x4;
}

/// `G_DL` parameter: push the return address
pub const DL_PUSH: u32 = 0x00;

/// Byte offset of the palette area (upper half of TMEM)
pub const TLUT_TMEM_OFFSET: usize = 0x800;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_type_decoding() {
        assert_eq!(CycleType::from_other_mode_h(0), CycleType::OneCycle);
        assert_eq!(CycleType::from_other_mode_h(1 << 20), CycleType::TwoCycle);
        assert_eq!(CycleType::from_other_mode_h(2 << 20), CycleType::Copy);
        assert_eq!(CycleType::from_other_mode_h(0xFFFF_FFFF), CycleType::Fill);
        assert!(CycleType::TwoCycle < CycleType::Copy);
    }

    #[test]
    fn test_layouts_differ_in_cull_bits() {
        assert_eq!(geometry::F3D.cull_back, 0x2000);
        assert_eq!(geometry::F3DEX2.cull_back, 0x400);
        assert_eq!(size::bits(size::BITS_16), 16);
    }
}
