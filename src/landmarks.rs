//! Landmark markup ingestion and sphere rasterization.
//!
//! Markup files follow the 3D Slicer layout:
//!
//! ```json
//! {"markups": [{"controlPoints": [{"id": "1", "label": "L-1", "position": [12.0, -4.5, 30.0]}]}]}
//! ```
//!
//! Positions are LPS world coordinates. They are mapped to fractional voxel
//! positions with a [`CoordinateTransform`] and only rounded when a sphere
//! is drawn.

use crate::error::{ConversionError, Result};
use crate::transform::CoordinateTransform;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Voxel value of a rasterized landmark.
pub const LANDMARK_VALUE: u8 = 255;

/// One annotated point in LPS world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: Option<String>,
    pub label: Option<String>,
    pub position: [f64; 3],
}

#[derive(Debug, Deserialize)]
struct MarkupFile {
    #[serde(default)]
    markups: Vec<Markup>,
}

#[derive(Debug, Deserialize)]
struct Markup {
    #[serde(default, rename = "controlPoints")]
    control_points: Vec<ControlPoint>,
}

#[derive(Debug, Deserialize)]
struct ControlPoint {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    position: Option<[f64; 3]>,
}

impl From<ControlPoint> for Landmark {
    fn from(point: ControlPoint) -> Self {
        Landmark {
            id: point.id,
            label: point.label,
            position: point.position.unwrap_or([0.0; 3]),
        }
    }
}

/// Result of reading one markup file.
#[derive(Debug, Clone, PartialEq)]
pub enum LandmarkOutcome {
    Parsed(Vec<Landmark>),
    Failed(String),
}

/// Landmarks gathered from several markup files.
#[derive(Debug, Clone, Default)]
pub struct LandmarkSet {
    /// Outcome per input file.
    pub outcomes: BTreeMap<String, LandmarkOutcome>,
}

impl LandmarkSet {
    /// Every parsed landmark, in file name order.
    pub fn landmarks(&self) -> Vec<Landmark> {
        self.outcomes
            .values()
            .filter_map(|outcome| match outcome {
                LandmarkOutcome::Parsed(landmarks) => Some(landmarks.iter().cloned()),
                LandmarkOutcome::Failed(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            LandmarkOutcome::Failed(reason) => Some((id.as_str(), reason.as_str())),
            LandmarkOutcome::Parsed(_) => None,
        })
    }

    /// Map every landmark onto a reference grid.
    pub fn to_voxels(&self, transform: &CoordinateTransform) -> Vec<VoxelLandmark> {
        self.landmarks()
            .into_iter()
            .map(|landmark| VoxelLandmark::new(landmark, transform))
            .collect()
    }
}

pub struct LandmarkReader;

impl LandmarkReader {
    /// Parse a markup document.
    pub fn parse(json: &str) -> serde_json::Result<Vec<Landmark>> {
        let file: MarkupFile = serde_json::from_str(json)?;
        Ok(file
            .markups
            .into_iter()
            .flat_map(|markup| markup.control_points)
            .map(Landmark::from)
            .collect())
    }

    /// Read a single markup file.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Landmark>> {
        let path = path.as_ref();
        let id = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|err| ConversionError::unreadable(&id, err))?;
        Self::parse(&text).map_err(|err| ConversionError::unreadable(&id, err))
    }

    /// Expand directories into the `*.json` files they contain.
    pub fn collect_files(inputs: &[impl AsRef<Path>]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            let input = input.as_ref();
            if input.is_dir() {
                let mut found: Vec<PathBuf> = fs::read_dir(input)?
                    .filter_map(std::result::Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.is_file()
                            && path
                                .extension()
                                .and_then(|ext| ext.to_str())
                                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
                    })
                    .collect();
                found.sort();
                files.extend(found);
            } else {
                files.push(input.to_path_buf());
            }
        }
        Ok(files)
    }

    /// Read every markup file under `inputs`, skipping the ones that fail.
    ///
    /// # Errors
    ///
    /// Returns `UnreadableSource` when no file could be read at all.
    pub fn read_all(inputs: &[impl AsRef<Path>]) -> Result<LandmarkSet> {
        let files = Self::collect_files(inputs)?;
        if files.is_empty() {
            return Err(ConversionError::unreadable(
                "landmarks",
                "no landmark files found",
            ));
        }

        let mut set = LandmarkSet::default();
        for file in &files {
            let id = file.display().to_string();
            let outcome = match Self::read_file(file) {
                Ok(landmarks) => {
                    debug!(file = %id, count = landmarks.len(), "read landmark file");
                    LandmarkOutcome::Parsed(landmarks)
                }
                Err(err) => {
                    warn!(file = %id, error = %err, "skipping unreadable landmark file");
                    LandmarkOutcome::Failed(err.to_string())
                }
            };
            set.outcomes.insert(id, outcome);
        }

        if set.failures().count() == set.outcomes.len() {
            let (id, reason) = set
                .failures()
                .next()
                .map(|(id, reason)| (id.to_string(), reason.to_string()))
                .unwrap_or_default();
            return Err(ConversionError::UnreadableSource { id, reason });
        }
        Ok(set)
    }
}

/// A landmark together with its fractional voxel position.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelLandmark {
    pub landmark: Landmark,
    /// Position in (slice, row, column) voxel units, unrounded.
    pub voxel: [f64; 3],
}

impl VoxelLandmark {
    pub fn new(landmark: Landmark, transform: &CoordinateTransform) -> Self {
        let voxel = transform.lps_to_voxel(landmark.position);
        Self { landmark, voxel }
    }

    /// Place a landmark directly at a voxel position.
    pub fn at(voxel: [f64; 3]) -> Self {
        Self {
            landmark: Landmark {
                id: None,
                label: None,
                position: [0.0; 3],
            },
            voxel,
        }
    }
}

/// Draws each landmark as a filled sphere of a physical radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereRasterizer {
    radius_mm: f64,
}

impl SphereRasterizer {
    pub fn new(radius_mm: f64) -> Self {
        Self { radius_mm }
    }

    /// Per-axis radius in whole voxels.
    pub fn voxel_radii(&self, spacing: [f64; 3]) -> [i64; 3] {
        spacing.map(|s| (self.radius_mm / s).round() as i64)
    }

    /// Rasterize `landmarks` into a zeroed volume of `shape`.
    ///
    /// Voxel axes map onto array axes in order. Parts of a sphere outside
    /// the volume are clipped; a landmark entirely outside leaves no trace.
    pub fn rasterize(
        &self,
        landmarks: &[VoxelLandmark],
        shape: (usize, usize, usize),
        spacing: [f64; 3],
    ) -> Array3<u8> {
        let mut volume = Array3::<u8>::zeros(shape);
        let [rz, ry, rx] = self.voxel_radii(spacing);
        let extent = [shape.0 as i64, shape.1 as i64, shape.2 as i64];
        let radius_sq = self.radius_mm * self.radius_mm;

        for landmark in landmarks {
            if landmark.voxel.iter().any(|v| !v.is_finite()) {
                warn!(
                    landmark = ?landmark.landmark.id,
                    "landmark position is not finite, skipping"
                );
                continue;
            }
            let [cz, cy, cx] = landmark.voxel.map(|v| v.round() as i64);
            let mut drawn = 0usize;
            for dz in -rz..=rz {
                let z = cz.saturating_add(dz);
                if !(0..extent[0]).contains(&z) {
                    continue;
                }
                for dy in -ry..=ry {
                    let y = cy.saturating_add(dy);
                    if !(0..extent[1]).contains(&y) {
                        continue;
                    }
                    for dx in -rx..=rx {
                        let x = cx.saturating_add(dx);
                        if !(0..extent[2]).contains(&x) {
                            continue;
                        }
                        let dist_sq = (dz as f64 * spacing[0]).powi(2)
                            + (dy as f64 * spacing[1]).powi(2)
                            + (dx as f64 * spacing[2]).powi(2);
                        if dist_sq <= radius_sq {
                            volume[[z as usize, y as usize, x as usize]] = LANDMARK_VALUE;
                            drawn += 1;
                        }
                    }
                }
            }
            if drawn == 0 {
                debug!(
                    landmark = ?landmark.landmark.id,
                    voxel = ?landmark.voxel,
                    "landmark outside volume"
                );
            }
        }

        info!(
            landmarks = landmarks.len(),
            radius_mm = self.radius_mm,
            "rasterized landmark spheres"
        );
        volume
    }
}
