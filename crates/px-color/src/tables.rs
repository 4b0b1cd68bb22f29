//! Lookup tables for matrix colorspaces.
//!
//! A 3x3 matrix plus offset is folded into three tables of `MAX_MAP + 1`
//! entries, one per input channel, so a pixel costs three lookups and two
//! vector adds:
//!
//! ```text
//! out = x[red] + y[green] + z[blue] + offset
//! ```
//!
//! Tables are built in parallel once per transform and are read-only after.

use glam::{DMat3, DVec3};
use px_core::{
    Error, MAX_MAP, PixelPacket, Result, scale_map_to_quantum, scale_quantum_to_map,
};
use rayon::prelude::*;

use crate::matrix::MatrixSpace;

/// Per-channel lookup tables of a linear transform.
#[derive(Debug, Clone)]
pub struct LookupTables {
    x: Vec<[f64; 3]>,
    y: Vec<[f64; 3]>,
    z: Vec<[f64; 3]>,
    offset: [f64; 3],
}

impl LookupTables {
    /// Tables for RGB to `space`.
    pub fn forward(space: &MatrixSpace) -> Result<Self> {
        let m = space.forward;
        Ok(Self {
            x: build(m.x_axis, 0.0)?,
            y: build(m.y_axis, 0.0)?,
            z: build(m.z_axis, 0.0)?,
            offset: space.offset.to_array(),
        })
    }

    /// Tables for `space` back to RGB, from the exact matrix inverse.
    ///
    /// Fails for single-channel spaces, whose matrix is singular.
    pub fn inverse(space: &MatrixSpace) -> Result<Self> {
        if space.luma || space.forward.determinant().abs() < f64::EPSILON {
            return Err(Error::invalid_argument("singular colorspace matrix has no inverse"));
        }
        let m: DMat3 = space.forward.inverse();
        let offset = space.offset;
        Ok(Self {
            x: build(m.x_axis, offset.x)?,
            y: build(m.y_axis, offset.y)?,
            z: build(m.z_axis, offset.z)?,
            offset: [0.0; 3],
        })
    }

    /// Transforms one pixel; opacity is kept.
    #[inline]
    pub fn apply(&self, px: &PixelPacket) -> PixelPacket {
        let x = &self.x[scale_quantum_to_map(px.red)];
        let y = &self.y[scale_quantum_to_map(px.green)];
        let z = &self.z[scale_quantum_to_map(px.blue)];
        let channel = |i: usize| scale_map_to_quantum(x[i] + y[i] + z[i] + self.offset[i]);
        PixelPacket {
            red: channel(0),
            green: channel(1),
            blue: channel(2),
            opacity: px.opacity,
        }
    }

    /// Bytes held by the tables.
    pub fn size_bytes(&self) -> usize {
        (self.x.len() + self.y.len() + self.z.len()) * std::mem::size_of::<[f64; 3]>()
    }
}

/// One table: `entry[i] = column * (i - bias)`.
fn build(column: DVec3, bias: f64) -> Result<Vec<[f64; 3]>> {
    let len = MAX_MAP + 1;
    let mut table = Vec::new();
    table
        .try_reserve_exact(len)
        .map_err(|e| Error::fatal_allocation(len * std::mem::size_of::<[f64; 3]>(), e.to_string()))?;
    table.par_extend(
        (0..len)
            .into_par_iter()
            .map(|i| (column * (i as f64 - bias)).to_array()),
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::matrix_space;
    use px_core::ColorspaceType;

    #[test]
    fn test_gray_table_rec601() {
        let space = matrix_space(ColorspaceType::Gray).unwrap();
        let tables = LookupTables::forward(&space).unwrap();
        let out = tables.apply(&PixelPacket::from_rgb8(128, 64, 32));
        assert_eq!(out.red, out.green);
        assert_eq!(out.green, out.blue);
        assert_eq!(px_core::scale_quantum_to_char(out.red), 79);
        assert_eq!(tables.size_bytes(), 3 * 65536 * 24);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let px = PixelPacket::new(1000, 40000, 50000, 7);
        for cs in [
            ColorspaceType::Rec601YCbCr,
            ColorspaceType::Rec709YCbCr,
            ColorspaceType::Ohta,
            ColorspaceType::Xyz,
            ColorspaceType::Ycc,
            ColorspaceType::Yiq,
            ColorspaceType::YPbPr,
            ColorspaceType::Yuv,
        ] {
            let space = matrix_space(cs).unwrap();
            let forward = LookupTables::forward(&space).unwrap();
            let inverse = LookupTables::inverse(&space).unwrap();
            let back = inverse.apply(&forward.apply(&px));
            assert_eq!(back.opacity, 7);
            for (a, b) in [(back.red, px.red), (back.green, px.green), (back.blue, px.blue)] {
                assert!(a.abs_diff(b) <= 4, "{cs}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_luma_has_no_inverse_table() {
        let space = matrix_space(ColorspaceType::Rec709Luma).unwrap();
        assert!(LookupTables::inverse(&space).is_err());
    }
}
