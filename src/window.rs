//! Mapping of raw intensities to 8-bit voxel values.

use crate::error::{ConversionError, Result};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

/// Per-voxel mapping from a raw sample to a stored byte.
///
/// Implementations must be pure: the streaming converter relies on mapping
/// a batch giving the same bytes as mapping the whole volume.
pub trait VoxelMap {
    fn map_value(&self, value: f32) -> u8;

    fn map_volume(&self, raw: &ArrayView3<'_, f32>) -> Array3<u8> {
        raw.mapv(|v| self.map_value(v))
    }
}

/// Display window applied to intensity volumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityWindow {
    /// `clip((v - lo) / (hi - lo) * 255, 0, 255)`
    Linear { lo: f32, hi: f32 },
    /// `clip(v * factor, 0, 255)`
    Contrast { factor: f32 },
}

impl IntensityWindow {
    /// Window used for sliced (CT) studies.
    pub const ANATOMY: Self = IntensityWindow::Linear {
        lo: -300.0,
        hi: 600.0,
    };

    /// Contrast factor used for volumetric scans.
    pub const SCAN: Self = IntensityWindow::Contrast { factor: 0.3 };

    pub fn validate(&self) -> Result<()> {
        match *self {
            IntensityWindow::Linear { lo, hi } if !(hi > lo) => Err(ConversionError::failed(
                format!("window upper bound {hi} must exceed lower bound {lo}"),
            )),
            IntensityWindow::Contrast { factor } if !factor.is_finite() => Err(
                ConversionError::failed(format!("contrast factor {factor} is not finite")),
            ),
            _ => Ok(()),
        }
    }
}

impl VoxelMap for IntensityWindow {
    #[inline]
    fn map_value(&self, value: f32) -> u8 {
        let scaled = match *self {
            IntensityWindow::Linear { lo, hi } => (value - lo) / (hi - lo) * 255.0,
            IntensityWindow::Contrast { factor } => value * factor,
        };
        // NaN casts to 0
        scaled.clamp(0.0, 255.0) as u8
    }
}

/// Binary mask from a label volume: the selected label becomes 255,
/// everything else 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelThreshold {
    pub label: f32,
}

impl LabelThreshold {
    pub fn new(label: f32) -> Self {
        Self { label }
    }
}

impl VoxelMap for LabelThreshold {
    #[inline]
    fn map_value(&self, value: f32) -> u8 {
        if value == self.label { 255 } else { 0 }
    }
}
