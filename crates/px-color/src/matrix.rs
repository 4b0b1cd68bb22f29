//! Linear colorspaces: forward matrices and chroma offsets.
//!
//! Each space is `out = M * rgb + offset` in map units (`0..=MAX_MAP`).
//! Chroma channels are centered on `(MAX_MAP + 1) / 2`.

use glam::{DMat3, DVec3};
use px_core::{ColorspaceType, MAX_MAP, scale_char_to_quantum, scale_quantum_to_map};

/// D65 reference white in XYZ.
pub const D65_WHITE: DVec3 = DVec3::new(0.950_47, 1.0, 1.088_83);

/// Rec.601 luma weights.
pub const REC601_LUMA: [f64; 3] = [0.298_839, 0.586_811, 0.114_350];

/// Rec.709 luma weights.
pub const REC709_LUMA: [f64; 3] = [0.212_6, 0.715_2, 0.072_2];

const HALF: f64 = (MAX_MAP + 1) as f64 / 2.0;

/// A matrix colorspace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixSpace {
    /// RGB to alternate
    pub forward: DMat3,
    /// Added after the matrix, in map units
    pub offset: DVec3,
    /// Single-channel space; the inverse copies the first channel
    pub luma: bool,
}

/// Builds a matrix from rows.
#[inline]
fn rows(r0: [f64; 3], r1: [f64; 3], r2: [f64; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(&[r0, r1, r2]).transpose()
}

/// Linear RGB to XYZ under D65.
pub fn rgb_to_xyz_matrix() -> DMat3 {
    rows(
        [0.412_456_4, 0.357_576_1, 0.180_437_5],
        [0.212_672_9, 0.715_152_2, 0.072_175_0],
        [0.019_333_9, 0.119_192_0, 0.950_304_1],
    )
}

fn ycc_offset(value: u8) -> f64 {
    scale_quantum_to_map(scale_char_to_quantum(value)) as f64
}

/// Matrix definition of `colorspace`, or `None` for non-linear spaces.
pub fn matrix_space(colorspace: ColorspaceType) -> Option<MatrixSpace> {
    use ColorspaceType as C;

    let luma = |w: [f64; 3]| MatrixSpace {
        forward: rows(w, w, w),
        offset: DVec3::ZERO,
        luma: true,
    };
    let chroma = |forward: DMat3| MatrixSpace {
        forward,
        offset: DVec3::new(0.0, HALF, HALF),
        luma: false,
    };

    let space = match colorspace {
        C::Gray | C::Rec601Luma => luma(REC601_LUMA),
        C::Rec709Luma => luma(REC709_LUMA),
        C::Rec601YCbCr | C::YPbPr => chroma(rows(
            REC601_LUMA,
            [-0.168_736, -0.331_264, 0.5],
            [0.5, -0.418_688, -0.081_312],
        )),
        C::Rec709YCbCr => chroma(rows(
            REC709_LUMA,
            [-0.114_572, -0.385_428, 0.5],
            [0.5, -0.454_153, -0.045_847],
        )),
        C::Ohta => chroma(rows(
            [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            [0.5, 0.0, -0.5],
            [-0.25, 0.5, -0.25],
        )),
        C::Yiq => chroma(rows(
            REC601_LUMA,
            [0.595_716, -0.274_453, -0.321_263],
            [0.211_456, -0.522_591, 0.311_135],
        )),
        C::Yuv => chroma(rows(
            REC601_LUMA,
            [-0.147_13, -0.288_86, 0.436],
            [0.615, -0.514_99, -0.100_01],
        )),
        C::Xyz => MatrixSpace {
            forward: rgb_to_xyz_matrix(),
            offset: DVec3::ZERO,
            luma: false,
        },
        // Kodak PhotoYCC
        C::Ycc => MatrixSpace {
            forward: rows(
                REC601_LUMA.map(|w| w / 1.3584),
                [-0.298_839 / 2.2179, -0.586_811 / 2.2179, 0.885_650 / 2.2179],
                [0.701_161 / 1.8215, -0.586_811 / 1.8215, -0.114_350 / 1.8215],
            ),
            offset: DVec3::new(0.0, ycc_offset(156), ycc_offset(137)),
            luma: false,
        },
        _ => return None,
    };
    Some(space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_chroma_spaces_invertible() {
        for cs in ColorspaceType::ALL {
            let Some(space) = matrix_space(cs) else {
                continue;
            };
            if space.luma {
                continue;
            }
            let identity = space.forward.inverse() * space.forward;
            for (a, b) in identity
                .to_cols_array()
                .iter()
                .zip(DMat3::IDENTITY.to_cols_array().iter())
            {
                assert_relative_eq!(a, b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_gray_is_neutral() {
        let white = DVec3::splat(MAX_MAP as f64);
        for cs in [ColorspaceType::Rec601YCbCr, ColorspaceType::Rec709YCbCr, ColorspaceType::Yiq] {
            let space = matrix_space(cs).unwrap();
            let out = space.forward * white + space.offset;
            assert_relative_eq!(out.x, MAX_MAP as f64, epsilon = 1.0);
            assert_relative_eq!(out.y, HALF, epsilon = 1.0);
            assert_relative_eq!(out.z, HALF, epsilon = 1.0);
        }
    }

    #[test]
    fn test_non_linear_spaces_have_no_matrix() {
        for cs in [ColorspaceType::Lab, ColorspaceType::Hsl, ColorspaceType::Cmyk, ColorspaceType::Srgb] {
            assert!(matrix_space(cs).is_none());
        }
    }
}
