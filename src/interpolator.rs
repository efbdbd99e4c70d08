use crate::enums::Interpolation;
use ndarray::{Array3, ArrayView3, Axis};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Extent of an axis after scaling, never below one voxel.
    #[inline]
    pub(crate) fn scaled_extent(extent: usize, scale: f64) -> usize {
        ((extent as f64 * scale).round() as usize).max(1)
    }

    /// Input coordinate sampled by output index `index`. The first and last
    /// samples of both grids line up.
    #[inline]
    fn source_coordinate(index: usize, in_extent: usize, out_extent: usize) -> f64 {
        if in_extent <= 1 || out_extent <= 1 {
            return 0.0;
        }
        index as f64 * (in_extent - 1) as f64 / (out_extent - 1) as f64
    }

    /// Resample `volume` onto a uniform grid of `shape` voxels.
    pub(crate) fn resample(
        volume: &ArrayView3<'_, u8>,
        shape: (usize, usize, usize),
        interpolation: Interpolation,
    ) -> Array3<u8> {
        let (in_d, in_h, in_w) = volume.dim();
        let (out_d, out_h, out_w) = shape;
        let mut output = Array3::<u8>::zeros(shape);
        if volume.is_empty() {
            return output;
        }

        // per-axis lookups, shared by every output slice
        let zs: Vec<f64> = (0..out_d)
            .map(|z| Self::source_coordinate(z, in_d, out_d))
            .collect();
        let ys: Vec<f64> = (0..out_h)
            .map(|y| Self::source_coordinate(y, in_h, out_h))
            .collect();
        let xs: Vec<f64> = (0..out_w)
            .map(|x| Self::source_coordinate(x, in_w, out_w))
            .collect();

        let fill = |z: usize, mut plane: ndarray::ArrayViewMut2<'_, u8>| {
            for (y, mut row) in plane.axis_iter_mut(Axis(0)).enumerate() {
                for (x, voxel) in row.iter_mut().enumerate() {
                    *voxel = match interpolation {
                        Interpolation::Nearest => Self::nearest(volume, zs[z], ys[y], xs[x]),
                        Interpolation::Linear => {
                            let value = Self::trilinear_interpolate(volume, zs[z], ys[y], xs[x]);
                            value.round().clamp(0.0, 255.0) as u8
                        }
                    };
                }
            }
        };

        #[cfg(feature = "parallel")]
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(z, plane)| fill(z, plane));

        #[cfg(not(feature = "parallel"))]
        output
            .axis_iter_mut(Axis(0))
            .enumerate()
            .for_each(|(z, plane)| fill(z, plane));

        output
    }

    #[inline]
    fn nearest(volume: &ArrayView3<'_, u8>, z: f64, y: f64, x: f64) -> u8 {
        let (depth, height, width) = volume.dim();
        let z = (z.round() as usize).min(depth - 1);
        let y = (y.round() as usize).min(height - 1);
        let x = (x.round() as usize).min(width - 1);
        volume[[z, y, x]]
    }

    #[inline]
    pub(crate) fn trilinear_interpolate(
        volume: &ArrayView3<'_, u8>,
        z: f64,
        y: f64,
        x: f64,
    ) -> f64 {
        let (depth, height, width) = volume.dim();

        let z0 = (z.floor() as usize).min(depth - 1);
        let y0 = (y.floor() as usize).min(height - 1);
        let x0 = (x.floor() as usize).min(width - 1);
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f64;
        let dy = y - y0 as f64;
        let dx = x - x0 as f64;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let v = |z: usize, y: usize, x: usize| f64::from(volume[[z, y, x]]);

        // interpolate along x, then y, then z
        let v00 = v(z0, y0, x0).mul_add(one_minus_dx, v(z0, y0, x1) * dx);
        let v01 = v(z0, y1, x0).mul_add(one_minus_dx, v(z0, y1, x1) * dx);
        let v10 = v(z1, y0, x0).mul_add(one_minus_dx, v(z1, y0, x1) * dx);
        let v11 = v(z1, y1, x0).mul_add(one_minus_dx, v(z1, y1, x1) * dx);

        let v0 = v00.mul_add(one_minus_dy, v01 * dy);
        let v1 = v10.mul_add(one_minus_dy, v11 * dy);

        v0.mul_add(one_minus_dz, v1 * dz)
    }
}
