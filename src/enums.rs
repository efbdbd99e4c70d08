use serde::{Deserialize, Serialize};

/// Resampling order used when a volume changes grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Keeps label values intact; used for masks and landmark spheres.
    Nearest,
    /// Trilinear; used for continuous intensity volumes.
    #[default]
    Linear,
}

/// Which tag a slice was ordered by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliceOrderKey {
    /// Position along the through-plane axis (ImagePositionPatient z).
    Position(f64),
    /// Monotonic sequence index (InstanceNumber).
    InstanceNumber(i64),
}

impl SliceOrderKey {
    pub fn value(&self) -> f64 {
        match self {
            SliceOrderKey::Position(z) => *z,
            SliceOrderKey::InstanceNumber(n) => *n as f64,
        }
    }
}

/// The role a converted volume plays in a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    Anatomy,
    Segmentation,
    Landmarks,
}

impl VolumeKind {
    /// Interpolation used when this kind of volume is resampled.
    pub fn interpolation(&self) -> Interpolation {
        match self {
            VolumeKind::Anatomy => Interpolation::Linear,
            VolumeKind::Segmentation | VolumeKind::Landmarks => Interpolation::Nearest,
        }
    }
}
