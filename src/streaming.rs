//! Batched conversion of a volumetric source into an 8-bit volume.

use crate::error::{ConversionError, Result};
use crate::source::VolumeSource;
use crate::volume::Volume;
use crate::window::VoxelMap;
use ndarray::{Array3, s};
use std::ops::Range;
use tracing::debug;

/// Default number of through-plane slices realized per batch.
pub const DEFAULT_BATCH_DEPTH: usize = 20;

/// Converts a source batch by batch so only one batch of raw samples is
/// held in memory next to the 8-bit output.
///
/// Each batch is mapped independently and copied into the matching region of
/// a pre-allocated output, so the result is byte-identical for every batch
/// depth.
#[derive(Debug, Clone, Copy)]
pub struct StreamingConverter<M> {
    map: M,
    batch_depth: usize,
}

impl<M: VoxelMap> StreamingConverter<M> {
    pub fn new(map: M) -> Self {
        Self {
            map,
            batch_depth: DEFAULT_BATCH_DEPTH,
        }
    }

    pub fn with_batch_depth(mut self, batch_depth: usize) -> Self {
        self.batch_depth = batch_depth;
        self
    }

    /// Slice ranges covering `depth`; the last one holds the remainder.
    pub fn batches(&self, depth: usize) -> Vec<Range<usize>> {
        let step = self.batch_depth.max(1);
        (0..depth)
            .step_by(step)
            .map(|start| start..(start + step).min(depth))
            .collect()
    }

    /// Read, map and place every batch of `source`.
    ///
    /// Any read failure aborts the whole conversion; nothing is written here,
    /// so callers never see a partially converted volume.
    pub fn convert<S: VolumeSource + ?Sized>(&self, source: &mut S) -> Result<Volume> {
        if self.batch_depth == 0 {
            return Err(ConversionError::failed("batch depth must be at least 1"));
        }
        let shape = source.shape();
        let mut output = Array3::<u8>::zeros(shape);

        for range in self.batches(shape.0) {
            let raw = source.read_slices(range.clone())?;
            if raw.dim() != (range.len(), shape.1, shape.2) {
                return Err(ConversionError::failed(format!(
                    "source returned {:?} for slices {range:?} of a {shape:?} volume",
                    raw.dim()
                )));
            }
            debug!(start = range.start, end = range.end, "converting batch");
            output
                .slice_mut(s![range, .., ..])
                .assign(&self.map.map_volume(&raw.view()));
        }

        Ok(Volume::new(output, source.spacing(), source.origin()))
    }
}
