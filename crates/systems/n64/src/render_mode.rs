//! Derivation of host render state from the other-mode registers.
//!
//! The RDP blender is programmed with four 2-bit selectors per cycle. Only the
//! handful of combinations games actually use are mapped to host blend modes;
//! everything else is drawn opaque.

use crate::gbi::{other_mode_h, other_mode_l, CycleType};
use crate::state::GeometryMode;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlendMode {
    Opaque,
    /// `src * a + dst * (1 - a)`
    AlphaBlend,
    /// `dst * (1 - a)`
    Fade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextureFilter {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WrapMode {
    Repeat,
    Mirror,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderMode {
    pub blend: BlendMode,
    /// Fragments with alpha below this are discarded
    pub alpha_threshold: Option<f32>,
    pub depth: DepthState,
    pub cull: CullMode,
    pub filter: TextureFilter,
}

impl RenderMode {
    /// Render state for triangles. Total over every register combination.
    pub fn derive(
        other_mode_l: u32,
        other_mode_h: u32,
        geometry: &GeometryMode,
        blend_color: u32,
    ) -> Self {
        let cycle = CycleType::from_other_mode_h(other_mode_h);
        let alpha_cvg_sel = other_mode_l & other_mode_l::ALPHA_CVG_SEL != 0;
        let cvg_x_alpha = other_mode_l & other_mode_l::CVG_X_ALPHA != 0;

        let blend = if cycle < CycleType::Copy {
            let blender = other_mode_l >> other_mode_l::BLENDER_SHIFT;
            let selectors = if cycle == CycleType::TwoCycle {
                blender
            } else {
                blender >> 2
            };
            let active = selectors & 0x3333;
            blend_mode(active, alpha_cvg_sel, cvg_x_alpha)
        } else {
            BlendMode::Opaque
        };

        let alpha_threshold = if other_mode_l & other_mode_l::ALPHA_COMPARE_MASK
            == other_mode_l::AC_THRESHOLD
            && !alpha_cvg_sel
        {
            Some((blend_color & 0xFF) as f32 / 255.0)
        } else {
            None
        };

        let z_cmp = other_mode_l & other_mode_l::Z_CMP != 0;
        let z_upd = other_mode_l & other_mode_l::Z_UPD != 0;
        let depth = DepthState {
            test: (geometry.zbuffer && z_cmp) || z_upd,
            write: z_upd,
        };

        let cull = if geometry.cull_front {
            CullMode::Front
        } else if geometry.cull_back {
            CullMode::Back
        } else {
            CullMode::None
        };

        Self {
            blend,
            alpha_threshold,
            depth,
            cull,
            filter: texture_filter(other_mode_h),
        }
    }

    /// Render state for fills: no blending, depth or culling
    pub fn fill() -> Self {
        Self {
            blend: BlendMode::Opaque,
            alpha_threshold: None,
            depth: DepthState {
                test: false,
                write: false,
            },
            cull: CullMode::None,
            filter: TextureFilter::Point,
        }
    }
}

pub fn texture_filter(other_mode_h: u32) -> TextureFilter {
    if other_mode_h & other_mode_h::TEXT_FILT_MASK == other_mode_h::TF_POINT {
        TextureFilter::Point
    } else {
        TextureFilter::Linear
    }
}

/// Map the active blender selectors to a host blend mode
pub fn blend_mode(active: u32, alpha_cvg_sel: bool, cvg_x_alpha: bool) -> BlendMode {
    match active {
        // CLR_IN * A_IN + CLR_IN * 1MA
        0x0000 => BlendMode::Opaque,
        // CLR_IN * A_IN + CLR_MEM * (1MA | A_MEM)
        0x0010 | 0x0011 => {
            if !alpha_cvg_sel || cvg_x_alpha {
                BlendMode::AlphaBlend
            } else {
                BlendMode::Opaque
            }
        }
        // CLR_IN * A_FOG + CLR_MEM * 1MA; fog alpha is not modelled
        0x0110 => BlendMode::Opaque,
        // CLR_IN * 0 + CLR_IN * 1
        0x0302 => BlendMode::Opaque,
        // CLR_IN * 0 + CLR_MEM * 1MA
        0x0310 => BlendMode::Fade,
        _ => {
            log(LogCategory::Rdp, LogLevel::Debug, || {
                format!(
                    "RDP: unhandled blend mode {:04X} (alpha_cvg_sel={}, cvg_x_alpha={}), drawing opaque",
                    active, alpha_cvg_sel, cvg_x_alpha
                )
            });
            BlendMode::Opaque
        }
    }
}

/// Wrap mode for one texture axis
pub fn wrap_mode(cm: u32, mask: u32) -> WrapMode {
    use crate::gbi::tile_mode::{CLAMP, MIRROR};
    if cm == CLAMP || mask == 0 {
        WrapMode::Clamp
    } else if cm == MIRROR {
        WrapMode::Mirror
    } else {
        WrapMode::Repeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GeometryMode {
        GeometryMode::default()
    }

    #[test]
    fn test_alpha_blend_in_one_cycle() {
        // 1-cycle uses the second cycle's selectors: 0x0040 >> 2 = 0x0010
        let l = 0x0040 << 16;
        let mode = RenderMode::derive(l, 0, &geometry(), 0);
        assert_eq!(mode.blend, BlendMode::AlphaBlend);

        // Coverage-as-alpha without cvg_x_alpha has nothing to blend with
        let l = (0x0040 << 16) | other_mode_l::ALPHA_CVG_SEL;
        let mode = RenderMode::derive(l, 0, &geometry(), 0);
        assert_eq!(mode.blend, BlendMode::Opaque);
    }

    #[test]
    fn test_two_cycle_uses_unshifted_selectors() {
        let l = 0x0310 << 16;
        let mode = RenderMode::derive(l, 1 << 20, &geometry(), 0);
        assert_eq!(mode.blend, BlendMode::Fade);
    }

    #[test]
    fn test_copy_and_fill_are_opaque() {
        let l = 0x0040 << 16;
        for h in [2 << 20, 3 << 20] {
            assert_eq!(
                RenderMode::derive(l, h, &geometry(), 0).blend,
                BlendMode::Opaque
            );
        }
    }

    #[test]
    fn test_blend_mode_is_total() {
        for active in 0..=0xFFFFu32 {
            let _ = blend_mode(active, active & 1 == 0, active & 2 == 0);
        }
        assert_eq!(blend_mode(0x0302, false, false), BlendMode::Opaque);
        assert_eq!(blend_mode(0x1234, false, false), BlendMode::Opaque);
    }

    #[test]
    fn test_alpha_threshold() {
        let mode = RenderMode::derive(other_mode_l::AC_THRESHOLD, 0, &geometry(), 0x0000_0080);
        let threshold = mode.alpha_threshold.unwrap();
        assert!((threshold - 128.0 / 255.0).abs() < 1e-6);

        let l = other_mode_l::AC_THRESHOLD | other_mode_l::ALPHA_CVG_SEL;
        assert_eq!(RenderMode::derive(l, 0, &geometry(), 0x80).alpha_threshold, None);
    }

    #[test]
    fn test_depth_and_cull() {
        let mut g = geometry();
        let mode = RenderMode::derive(other_mode_l::Z_CMP, 0, &g, 0);
        assert!(!mode.depth.test);

        g.zbuffer = true;
        let mode = RenderMode::derive(other_mode_l::Z_CMP, 0, &g, 0);
        assert!(mode.depth.test && !mode.depth.write);

        let mode = RenderMode::derive(other_mode_l::Z_UPD, 0, &geometry(), 0);
        assert!(mode.depth.test && mode.depth.write);

        g.cull_back = true;
        assert_eq!(RenderMode::derive(0, 0, &g, 0).cull, CullMode::Back);
        g.cull_front = true;
        assert_eq!(RenderMode::derive(0, 0, &g, 0).cull, CullMode::Front);
    }

    #[test]
    fn test_wrap_modes() {
        assert_eq!(wrap_mode(0, 0), WrapMode::Clamp);
        assert_eq!(wrap_mode(2, 5), WrapMode::Clamp);
        assert_eq!(wrap_mode(1, 5), WrapMode::Mirror);
        assert_eq!(wrap_mode(0, 5), WrapMode::Repeat);
        assert_eq!(texture_filter(0), TextureFilter::Point);
        assert_eq!(texture_filter(2 << 12), TextureFilter::Linear);
    }
}
