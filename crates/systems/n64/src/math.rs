//! Fixed-point matrix decoding and the small amount of linear algebra the
//! vertex pipeline needs.
//!
//! Matrices use the row-vector convention: a point is transformed as
//! `[x y z 1] * M`, so the combined transform of "apply A, then B" is `A * B`.

use serde::Serialize;

/// Size of a packed matrix in RDRAM
pub const MATRIX_BYTES: usize = 64;

/// 4x4 matrix, `m[row][col]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Matrix4 {
    pub m: [[f32; 4]; 4],
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_rows(m: [[f32; 4]; 4]) -> Self {
        Self { m }
    }

    /// Decode the split 16.16 layout: sixteen big-endian `i16` integer parts
    /// followed by sixteen `u16` fractions, both row-major.
    ///
    /// Returns `None` if fewer than 64 bytes are supplied.
    pub fn from_fixed_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..MATRIX_BYTES)?;
        let mut m = [[0.0f32; 4]; 4];
        for (row, cells) in m.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                let offset = row * 8 + col * 2;
                let hi = i16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as i32;
                let lo = u16::from_be_bytes([bytes[offset + 32], bytes[offset + 33]]) as i32;
                *cell = (((hi << 16) | lo) as f64 / 65536.0) as f32;
            }
        }
        Some(Self { m })
    }

    /// Encode into the layout read by [`Matrix4::from_fixed_bytes`].
    ///
    /// Values are rounded to the nearest 1/65536 and saturate at the 16.16 range.
    pub fn to_fixed_bytes(&self) -> [u8; MATRIX_BYTES] {
        let mut out = [0u8; MATRIX_BYTES];
        for (row, cells) in self.m.iter().enumerate() {
            for (col, &cell) in cells.iter().enumerate() {
                let fixed = (cell as f64 * 65536.0)
                    .round()
                    .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                let offset = row * 8 + col * 2;
                out[offset..offset + 2].copy_from_slice(&((fixed >> 16) as i16).to_be_bytes());
                out[offset + 32..offset + 34].copy_from_slice(&(fixed as u16).to_be_bytes());
            }
        }
        out
    }

    /// `self * rhs`
    pub fn mul(&self, rhs: &Matrix4) -> Matrix4 {
        let mut out = [[0.0f32; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.m[i][0] * rhs.m[0][j]
                    + self.m[i][1] * rhs.m[1][j]
                    + self.m[i][2] * rhs.m[2][j]
                    + self.m[i][3] * rhs.m[3][j];
            }
        }
        Matrix4 { m: out }
    }

    /// `[x y z 1] * self`
    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 4] {
        let mut out = [0.0f32; 4];
        for (c, o) in out.iter_mut().enumerate() {
            *o = p[0] * self.m[0][c] + p[1] * self.m[1][c] + p[2] * self.m[2][c] + self.m[3][c];
        }
        out
    }

    /// Transform a direction by the upper 3x3 (no translation)
    pub fn transform_normal(&self, n: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (c, o) in out.iter_mut().enumerate() {
            *o = n[0] * self.m[0][c] + n[1] * self.m[1][c] + n[2] * self.m[2][c];
        }
        out
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[inline]
pub fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit vector in the direction of `v`; the zero vector maps to itself.
pub fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0; 3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Matrix4, b: &Matrix4, eps: f32) {
        for r in 0..4 {
            for c in 0..4 {
                assert!(
                    (a.m[r][c] - b.m[r][c]).abs() <= eps,
                    "m[{}][{}]: {} vs {}",
                    r,
                    c,
                    a.m[r][c],
                    b.m[r][c]
                );
            }
        }
    }

    #[test]
    fn test_identity_decodes_from_fixed_point() {
        let bytes = Matrix4::IDENTITY.to_fixed_bytes();
        // Integer part of m[0][0] is 1, fraction is 0
        assert_eq!(&bytes[0..2], &[0x00, 0x01]);
        assert_eq!(&bytes[32..34], &[0x00, 0x00]);
        assert_eq!(Matrix4::from_fixed_bytes(&bytes), Some(Matrix4::IDENTITY));
    }

    #[test]
    fn test_negative_fraction_decoding() {
        let mut bytes = [0u8; 64];
        // m[1][2] = -1.5 -> 0xFFFE_8000
        bytes[8 + 4..8 + 6].copy_from_slice(&0xFFFEu16.to_be_bytes());
        bytes[40 + 4..40 + 6].copy_from_slice(&0x8000u16.to_be_bytes());
        let m = Matrix4::from_fixed_bytes(&bytes).unwrap();
        assert_eq!(m.m[1][2], -1.5);
    }

    #[test]
    fn test_fixed_point_round_trip() {
        let m = Matrix4::from_rows([
            [1.5, -2.25, 0.0001, 100.125],
            [-0.5, 3.0, 7.75, -32768.0],
            [0.333, -0.667, 12345.678, 1.0],
            [-1.0, 0.0, 2.0, 32767.99],
        ]);
        let decoded = Matrix4::from_fixed_bytes(&m.to_fixed_bytes()).unwrap();
        assert_close(&decoded, &m, 1.0 / 65536.0 + f32::EPSILON * 32768.0);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        assert!(Matrix4::from_fixed_bytes(&[0u8; 63]).is_none());
    }

    #[test]
    fn test_mul_applies_left_first() {
        let mut translate = Matrix4::IDENTITY;
        translate.m[3] = [10.0, 0.0, 0.0, 1.0];
        let mut scale = Matrix4::IDENTITY;
        scale.m[0][0] = 2.0;

        // Translate then scale: (1 + 10) * 2
        let p = translate.mul(&scale).transform_point([1.0, 0.0, 0.0]);
        assert_eq!(p, [22.0, 0.0, 0.0, 1.0]);
        // Scale then translate: 1 * 2 + 10
        let p = scale.mul(&translate).transform_point([1.0, 0.0, 0.0]);
        assert_eq!(p, [12.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_transform_normal_ignores_translation() {
        let mut m = Matrix4::IDENTITY;
        m.m[3] = [5.0, 6.0, 7.0, 1.0];
        assert_eq!(m.transform_normal([0.0, 1.0, 0.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
        let n = normalize([3.0, 0.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6 && (n[2] - 0.8).abs() < 1e-6);
    }
}
