//! Label masks aligned to a study's reference grid.

use crate::enums::VolumeKind;
use crate::error::Result;
use crate::metadata::ReferenceGrid;
use crate::source::VolumeSource;
use crate::streaming::StreamingConverter;
use crate::volume::Volume;
use crate::window::LabelThreshold;
use tracing::{debug, warn};

/// Thresholds a label volume into a {0, 255} mask and moves it onto the
/// reference grid when one is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationAligner {
    threshold: LabelThreshold,
}

impl SegmentationAligner {
    pub fn new(label: f32) -> Self {
        Self {
            threshold: LabelThreshold::new(label),
        }
    }

    /// Threshold `source` in batches of `batch_depth`, then align it.
    pub fn convert<S: VolumeSource + ?Sized>(
        &self,
        source: &mut S,
        batch_depth: usize,
        reference: Option<&ReferenceGrid>,
    ) -> Result<Volume> {
        let mask = StreamingConverter::new(self.threshold)
            .with_batch_depth(batch_depth)
            .convert(source)?;
        Ok(self.align(mask, reference))
    }

    /// Resample a mask to the reference dims with nearest neighbour and take
    /// over the reference spacing and origin. A reference without an origin
    /// leaves the mask's own origin in place. Without a reference the mask
    /// keeps its own geometry.
    pub fn align(&self, mask: Volume, reference: Option<&ReferenceGrid>) -> Volume {
        let Some(reference) = reference else {
            warn!("no reference grid, segmentation keeps its own geometry");
            return mask;
        };
        let shape = reference.array_shape();
        debug!(
            from = ?mask.dim(),
            to = ?shape,
            reference = %reference.path().display(),
            "aligning segmentation to reference grid"
        );
        let resampled = mask.resampled_to(shape, VolumeKind::Segmentation.interpolation());
        let origin = reference.origin().or(mask.origin);
        Volume::new(resampled.data, reference.spacing(), origin)
    }
}

impl Default for SegmentationAligner {
    fn default() -> Self {
        Self::new(1.0)
    }
}
