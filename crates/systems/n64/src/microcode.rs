//! Microcode identification.
//!
//! Games ship their own build of the graphics microcode, and the command
//! encodings differ between families. The family is recognized first from the
//! version string embedded in the ucode data segment; microcodes without a
//! recognizable string are identified by a hash of their code segment.
//!
//! | Revision        | Vertex stride | Geometry layout |
//! |-----------------|---------------|-----------------|
//! | `Gbi0`          | 10            | F3D             |
//! | `Gbi0WaveRace`  | 5             | F3D             |
//! | `Gbi0GoldenEye` | 10            | F3D             |
//! | `Gbi1`          | 2             | F3D             |
//! | `Gbi2`          | 2             | F3DEX2          |

use crate::gbi::geometry::{GeometryLayout, F3D, F3DEX2};
use crate::{HleError, HleResult};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

/// GBI revision selecting the opcode table and packed-index stride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GbiRevision {
    /// Fast3D (Super Mario 64, PilotWings, ...)
    Gbi0,
    /// Fast3D variant with a different vertex command
    Gbi0WaveRace,
    /// Fast3D variant with the Tri4 command
    Gbi0GoldenEye,
    /// F3DEX 1.x / F3DLP / F3DLX
    Gbi1,
    /// F3DEX 2.x
    Gbi2,
}

impl GbiRevision {
    pub const ALL: [GbiRevision; 5] = [
        GbiRevision::Gbi0,
        GbiRevision::Gbi0WaveRace,
        GbiRevision::Gbi0GoldenEye,
        GbiRevision::Gbi1,
        GbiRevision::Gbi2,
    ];

    /// Divisor applied to packed vertex indices
    pub fn stride(self) -> u32 {
        match self {
            GbiRevision::Gbi0 | GbiRevision::Gbi0GoldenEye => 10,
            GbiRevision::Gbi0WaveRace => 5,
            GbiRevision::Gbi1 | GbiRevision::Gbi2 => 2,
        }
    }

    pub fn geometry_layout(self) -> &'static GeometryLayout {
        match self {
            GbiRevision::Gbi2 => &F3DEX2,
            _ => &F3D,
        }
    }

    /// Index into per-revision arrays
    pub(crate) fn index(self) -> usize {
        match self {
            GbiRevision::Gbi0 => 0,
            GbiRevision::Gbi0WaveRace => 1,
            GbiRevision::Gbi0GoldenEye => 2,
            GbiRevision::Gbi1 => 3,
            GbiRevision::Gbi2 => 4,
        }
    }
}

/// Result of identifying the loaded microcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MicrocodeInfo {
    pub revision: GbiRevision,
    /// Embedded version string, empty if none was found
    pub version: String,
    /// Code hash, computed only when the version string was inconclusive
    pub hash: Option<u32>,
}

/// Extract the `"RSP ..."` version string from the ucode data segment
pub fn version_string(data: &[u8]) -> String {
    let Some(start) = data.windows(3).position(|w| w == b"RSP") else {
        return String::new();
    };
    let tail = &data[start..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

/// Rolling hash of the code segment: `h = h * 17 + byte`
pub fn code_hash(code: &[u8]) -> u32 {
    code.iter()
        .fold(0u32, |h, &b| h.wrapping_mul(17).wrapping_add(b as u32))
}

/// Identify the GBI revision from the code and data segments of a task.
pub fn identify(code: &[u8], data: &[u8]) -> HleResult<MicrocodeInfo> {
    let version = version_string(data);

    if ["F3DEX", "F3DLP", "F3DLX"]
        .iter()
        .any(|tag| version.contains(tag))
    {
        let revision = if version.contains("2.") {
            GbiRevision::Gbi2
        } else {
            GbiRevision::Gbi1
        };
        return Ok(MicrocodeInfo {
            revision,
            version,
            hash: None,
        });
    }

    let hash = code_hash(code);
    let revision = match hash {
        0x0000_0000 => {
            log(LogCategory::Microcode, LogLevel::Warn, || {
                "Microcode: ucode is empty, assuming GBI0".to_string()
            });
            GbiRevision::Gbi0
        }
        // Fish demo, Super Mario 64, PilotWings
        0xD73A_12C4 | 0xF4C3_491B | 0x313F_038B => GbiRevision::Gbi0,
        0x64CC_729D => GbiRevision::Gbi0WaveRace,
        0x23F9_2542 => GbiRevision::Gbi0GoldenEye,
        _ => return Err(HleError::UnknownMicrocode { hash }),
    };

    Ok(MicrocodeInfo {
        revision,
        version,
        hash: Some(hash),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Code bytes hashing to `target`: its base-17 digits, most significant first
    fn code_for_hash(target: u32) -> Vec<u8> {
        let mut digits = Vec::new();
        let mut t = target as u64;
        while t > 0 {
            digits.push((t % 17) as u8);
            t /= 17;
        }
        digits.reverse();
        digits
    }

    #[test]
    fn test_version_string_extraction() {
        let mut data = vec![0u8; 64];
        let s = b"RSP Gfx ucode F3DEX       fifo 1.23 Yoshitaka Yasumoto 1996";
        data[3..3 + s.len()].copy_from_slice(s);
        assert_eq!(version_string(&data), std::str::from_utf8(s).unwrap());
        assert_eq!(version_string(&[0u8; 16]), "");
    }

    #[test]
    fn test_version_string_runs_to_end_without_nul() {
        assert_eq!(version_string(b"xxRSP SW"), "RSP SW");
    }

    #[test]
    fn test_identify_by_version_string() {
        let info = identify(&[], b"RSP Gfx ucode F3DEX       fifo 1.23\0").unwrap();
        assert_eq!(info.revision, GbiRevision::Gbi1);
        assert_eq!(info.hash, None);

        let info = identify(&[], b"RSP Gfx ucode F3DEX.NoN   fifo 2.08\0").unwrap();
        assert_eq!(info.revision, GbiRevision::Gbi2);

        let info = identify(&[], b"RSP Gfx ucode F3DLX.Rej   fifo 1.21\0").unwrap();
        assert_eq!(info.revision, GbiRevision::Gbi1);
    }

    #[test]
    fn test_code_hash_wraps() {
        assert_eq!(code_hash(&[]), 0);
        assert_eq!(code_hash(&[1, 2]), 19);
        assert_eq!(code_hash(&[0xFF; 16]), {
            let mut h = 0u32;
            for _ in 0..16 {
                h = h.wrapping_mul(17).wrapping_add(0xFF);
            }
            h
        });
    }

    #[test]
    fn test_identify_by_hash() {
        for (hash, revision) in [
            (0xF4C3_491Bu32, GbiRevision::Gbi0),
            (0x64CC_729D, GbiRevision::Gbi0WaveRace),
            (0x23F9_2542, GbiRevision::Gbi0GoldenEye),
        ] {
            let code = code_for_hash(hash);
            assert_eq!(code_hash(&code), hash);
            let info = identify(&code, &[]).unwrap();
            assert_eq!(info.revision, revision);
            assert_eq!(info.hash, Some(hash));
        }
        assert_eq!(identify(&[], &[]).unwrap().revision, GbiRevision::Gbi0);
    }

    #[test]
    fn test_unknown_hash_is_fatal() {
        match identify(&[1, 2, 3], b"RSP SW Version: 2.0D\0") {
            Err(HleError::UnknownMicrocode { hash }) => assert_eq!(hash, code_hash(&[1, 2, 3])),
            other => panic!("expected UnknownMicrocode, got {:?}", other),
        }
    }

    #[test]
    fn test_strides() {
        assert_eq!(GbiRevision::Gbi0.stride(), 10);
        assert_eq!(GbiRevision::Gbi0WaveRace.stride(), 5);
        assert_eq!(GbiRevision::Gbi0GoldenEye.stride(), 10);
        assert_eq!(GbiRevision::Gbi1.stride(), 2);
        assert_eq!(GbiRevision::Gbi2.stride(), 2);
        for (i, r) in GbiRevision::ALL.iter().enumerate() {
            assert_eq!(r.index(), i);
        }
    }
}
