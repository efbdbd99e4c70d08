//! World-to-voxel mapping for landmark positions.
//!
//! Landmarks are recorded in LPS world coordinates. Before they can be
//! rasterized they go through three steps, in this order:
//!
//!  1. LPS to RAS flip (negate the first two components)
//!  2. axis permutation into the stored volume's axis order
//!  3. offset-origin subtraction and division by spacing, per axis
//!
//! No rounding happens here; fractional voxel positions are kept until
//! rasterization.

use crate::error::{ConversionError, Result};

/// Convert an LPS position to RAS. The flip is its own inverse.
#[inline]
pub fn lps_to_ras(position: [f64; 3]) -> [f64; 3] {
    [-position[0], -position[1], position[2]]
}

/// A permutation of the three coordinate components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPermutation([usize; 3]);

impl AxisPermutation {
    /// Leaves components in place.
    pub const IDENTITY: Self = Self([0, 1, 2]);

    /// `(x, y, z)` to `(z, y, x)`, the order volumes are stored in.
    pub const REVERSED: Self = Self([2, 1, 0]);

    pub fn new(order: [usize; 3]) -> Result<Self> {
        let mut seen = [false; 3];
        for &axis in &order {
            if axis > 2 || seen[axis] {
                return Err(ConversionError::failed(format!(
                    "{order:?} is not a permutation of the three axes"
                )));
            }
            seen[axis] = true;
        }
        Ok(Self(order))
    }

    pub fn order(&self) -> [usize; 3] {
        self.0
    }

    /// Component `n` of the result is component `order[n]` of the input.
    #[inline]
    pub fn apply(&self, coords: [f64; 3]) -> [f64; 3] {
        [coords[self.0[0]], coords[self.0[1]], coords[self.0[2]]]
    }
}

impl Default for AxisPermutation {
    fn default() -> Self {
        Self::REVERSED
    }
}

/// Maps permuted world coordinates onto a reference volume's voxel grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldToVoxel {
    offset_origin: [f64; 3],
    spacing: [f64; 3],
}

impl WorldToVoxel {
    /// `origin` is the reference record's origin in (x, y, z) order and
    /// `spacing` its spacing in stored-array order.
    pub fn new(origin: [f64; 3], spacing: [f64; 3]) -> Result<Self> {
        if let Some(bad) = spacing.iter().find(|s| !(**s > 0.0 && s.is_finite())) {
            return Err(ConversionError::failed(format!(
                "reference spacing {spacing:?} contains non-positive value {bad}"
            )));
        }
        // the origin is reversed to line up with the stored axis order
        let offset_origin = [-origin[2].abs(), -origin[1].abs(), -origin[0].abs()];
        Ok(Self {
            offset_origin,
            spacing,
        })
    }

    pub fn offset_origin(&self) -> [f64; 3] {
        self.offset_origin
    }

    #[inline]
    pub fn to_voxel(&self, world: [f64; 3]) -> [f64; 3] {
        [
            (world[0] - self.offset_origin[0]) / self.spacing[0],
            (world[1] - self.offset_origin[1]) / self.spacing[1],
            (world[2] - self.offset_origin[2]) / self.spacing[2],
        ]
    }
}

/// The full LPS-world to voxel pipeline for one reference volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    permutation: AxisPermutation,
    world_to_voxel: WorldToVoxel,
}

impl CoordinateTransform {
    pub fn new(permutation: AxisPermutation, world_to_voxel: WorldToVoxel) -> Self {
        Self {
            permutation,
            world_to_voxel,
        }
    }

    /// Fractional voxel position of a recorded LPS position.
    pub fn lps_to_voxel(&self, lps: [f64; 3]) -> [f64; 3] {
        let ras = lps_to_ras(lps);
        let permuted = self.permutation.apply(ras);
        self.world_to_voxel.to_voxel(permuted)
    }
}
