use crate::enums::Interpolation;
use crate::error::{ConversionError, Result};
use crate::interpolator::Interpolator;
use crate::metadata::{OutputPaths, VolumeMetadata, write_atomically};

use ndarray::Array3;
use std::borrow::Cow;
use tracing::{debug, info};

/// Whether a write may replace an existing metadata record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataPolicy {
    /// Always write the record.
    #[default]
    Overwrite,
    /// The record is a study's reference grid: keep an existing one.
    KeepExisting,
}

/// A finished 8-bit voxel volume with its physical geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    /// Voxels in (slice, row, column) order.
    pub data: Array3<u8>,
    /// Spacing per array axis.
    pub spacing: [f64; 3],
    pub origin: Option<[f64; 3]>,
}

impl Volume {
    pub fn new(data: Array3<u8>, spacing: [f64; 3], origin: Option<[f64; 3]>) -> Self {
        Self {
            data,
            spacing,
            origin,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn metadata(&self) -> VolumeMetadata {
        VolumeMetadata::for_shape(self.dim(), self.spacing, self.origin)
    }

    /// Row-major bytes of the volume, borrowed when the array is already
    /// in standard layout.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self.data.as_slice() {
            Some(bytes) => Cow::Borrowed(bytes),
            None => Cow::Owned(self.data.iter().copied().collect()),
        }
    }

    /// Write the binary file, then the metadata record.
    ///
    /// The binary is always (re)written. With [`MetadataPolicy::KeepExisting`]
    /// an existing record at `paths.meta` is left untouched.
    ///
    /// Returns the metadata describing the written binary.
    pub fn write(&self, paths: &OutputPaths, policy: MetadataPolicy) -> Result<VolumeMetadata> {
        let metadata = self.metadata();
        let bytes = self.to_bytes();
        if bytes.len() != metadata.voxel_count() {
            return Err(ConversionError::failed(format!(
                "buffer holds {} bytes but dims {:?} need {}",
                bytes.len(),
                metadata.dims,
                metadata.voxel_count()
            )));
        }
        write_atomically(&paths.bin, &bytes)?;
        debug!(path = %paths.bin.display(), bytes = bytes.len(), "wrote voxel buffer");

        if policy == MetadataPolicy::KeepExisting && paths.meta.exists() {
            info!(
                path = %paths.meta.display(),
                "reference metadata already exists, skipping overwrite"
            );
            return Ok(metadata);
        }
        metadata.write(&paths.meta)?;
        Ok(metadata)
    }

    /// Downsampled copy of this volume. Spacing grows by `1 / scale` so the
    /// preview covers the same physical extent; the origin is kept.
    pub fn preview(&self, scale: f64, interpolation: Interpolation) -> Result<Volume> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(ConversionError::failed(format!(
                "preview scale {scale} must be positive"
            )));
        }
        let (depth, height, width) = self.dim();
        let shape = (
            Interpolator::scaled_extent(depth, scale),
            Interpolator::scaled_extent(height, scale),
            Interpolator::scaled_extent(width, scale),
        );
        let data = Interpolator::resample(&self.data.view(), shape, interpolation);
        let spacing = self.spacing.map(|s| s / scale);
        Ok(Volume::new(data, spacing, self.origin))
    }

    /// Resample onto an explicit (slice, row, column) shape, keeping the
    /// geometry untouched. Callers set spacing and origin themselves.
    pub fn resampled_to(&self, shape: (usize, usize, usize), interpolation: Interpolation) -> Self {
        if shape == self.dim() {
            return self.clone();
        }
        let data = Interpolator::resample(&self.data.view(), shape, interpolation);
        Volume::new(data, self.spacing, self.origin)
    }

    /// Write a preview pair next to `paths` and return where it went.
    pub fn write_preview(
        &self,
        paths: &OutputPaths,
        scale: f64,
        interpolation: Interpolation,
    ) -> Result<OutputPaths> {
        let preview = self.preview(scale, interpolation)?;
        let preview_paths = paths.preview();
        preview.write(&preview_paths, MetadataPolicy::Overwrite)?;
        info!(
            path = %preview_paths.bin.display(),
            dims = ?preview.metadata().dims,
            "wrote preview volume"
        );
        Ok(preview_paths)
    }
}
