//! Tunable conversion settings.

use crate::error::{ConversionError, Result};
use crate::transform::AxisPermutation;
use crate::window::IntensityWindow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Options shared by all conversion entry points.
///
/// Every field has a default, so a JSON config file only needs to name
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Number of through-plane slices realized per streaming batch.
    pub batch_depth: usize,

    /// Whether a downsampled preview pair is written next to each output.
    pub generate_preview: bool,

    /// Linear scale factor of the preview (0.25 = 4x reduction per axis).
    pub preview_scale: f64,

    /// Window for sliced (DICOM) anatomy studies.
    pub anatomy_window: IntensityWindow,

    /// Window for volumetric (NIfTI) anatomy scans.
    pub scan_window: IntensityWindow,

    /// Physical radius of a rasterized landmark sphere, in mm.
    pub landmark_radius_mm: f64,

    /// Label value turned into 255 in segmentation masks.
    pub segmentation_label: f32,

    /// Permutation aligning landmark axes with the stored volume axes.
    pub landmark_axis_order: [usize; 3],
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            batch_depth: 20,
            generate_preview: true,
            preview_scale: 0.25,
            anatomy_window: IntensityWindow::ANATOMY,
            scan_window: IntensityWindow::SCAN,
            landmark_radius_mm: 3.0,
            segmentation_label: 1.0,
            landmark_axis_order: AxisPermutation::REVERSED.order(),
        }
    }
}

impl ConversionOptions {
    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let options: Self = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_batch_depth(mut self, batch_depth: usize) -> Self {
        self.batch_depth = batch_depth;
        self
    }

    pub fn with_preview(mut self, generate_preview: bool) -> Self {
        self.generate_preview = generate_preview;
        self
    }

    pub fn with_preview_scale(mut self, scale: f64) -> Self {
        self.preview_scale = scale;
        self
    }

    pub fn with_anatomy_window(mut self, window: IntensityWindow) -> Self {
        self.anatomy_window = window;
        self
    }

    pub fn with_scan_window(mut self, window: IntensityWindow) -> Self {
        self.scan_window = window;
        self
    }

    pub fn with_landmark_radius(mut self, radius_mm: f64) -> Self {
        self.landmark_radius_mm = radius_mm;
        self
    }

    pub fn with_segmentation_label(mut self, label: f32) -> Self {
        self.segmentation_label = label;
        self
    }

    pub fn with_landmark_axis_order(mut self, order: [usize; 3]) -> Self {
        self.landmark_axis_order = order;
        self
    }

    /// Reject settings no conversion could run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_depth == 0 {
            return Err(ConversionError::failed("batch depth must be at least 1"));
        }
        if !(self.preview_scale > 0.0 && self.preview_scale <= 1.0) {
            return Err(ConversionError::failed(format!(
                "preview scale {} must be in (0, 1]",
                self.preview_scale
            )));
        }
        if !(self.landmark_radius_mm > 0.0 && self.landmark_radius_mm.is_finite()) {
            return Err(ConversionError::failed(format!(
                "landmark radius {} must be positive",
                self.landmark_radius_mm
            )));
        }
        self.anatomy_window.validate()?;
        self.scan_window.validate()?;
        AxisPermutation::new(self.landmark_axis_order)?;
        Ok(())
    }
}
