//! Sidecar metadata records and output path naming.
//!
//! Every binary voxel file is paired with a small JSON record:
//!
//! ```json
//! {"spacing": [2.0, 0.8, 0.8], "dims": [512, 512, 120], "origin": [-120.5, -98.0, 40.0]}
//! ```
//!
//! `dims` lists the voxel counts fastest axis first, i.e. the in-memory
//! shape reversed (column, row, slice). `spacing` is stored in array order
//! (slice, row, column). The two orders differ on purpose; viewers built
//! against the existing files depend on it.

use crate::error::{ConversionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const PREVIEW_MARKER: &str = "_preview";

/// The record written next to every binary voxel file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// Physical size of a voxel step per axis, in array order.
    pub spacing: [f64; 3],

    /// Voxel counts, array shape reversed.
    pub dims: [usize; 3],

    /// World position of voxel (0, 0, 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<[f64; 3]>,
}

impl VolumeMetadata {
    /// Build a record for an array of the given (slice, row, column) shape.
    pub fn for_shape(
        shape: (usize, usize, usize),
        spacing: [f64; 3],
        origin: Option<[f64; 3]>,
    ) -> Self {
        Self {
            spacing,
            dims: [shape.2, shape.1, shape.0],
            origin,
        }
    }

    /// The in-memory (slice, row, column) shape these dims describe.
    pub fn array_shape(&self) -> (usize, usize, usize) {
        (self.dims[2], self.dims[1], self.dims[0])
    }

    /// Byte length of the paired binary file.
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        write_atomically(path.as_ref(), &json)
    }
}

/// Read-only handle on the reference grid of a study.
///
/// Loaded once from the anatomy's metadata record and passed explicitly to
/// segmentation and landmark conversions.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    path: PathBuf,
    metadata: VolumeMetadata,
}

impl ReferenceGrid {
    /// Load the reference record, failing with `MissingReference` when no
    /// anatomy conversion has written it yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConversionError::MissingReference(path.to_path_buf()));
        }
        let metadata = VolumeMetadata::read(path)?;
        debug!(path = %path.display(), dims = ?metadata.dims, "loaded reference grid");
        Ok(Self {
            path: path.to_path_buf(),
            metadata,
        })
    }

    /// Like [`ReferenceGrid::load`], but treats a missing record as `None`.
    pub fn load_optional(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::load(path) {
            Ok(grid) => Ok(Some(grid)),
            Err(ConversionError::MissingReference(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn from_metadata(path: impl Into<PathBuf>, metadata: VolumeMetadata) -> Self {
        Self {
            path: path.into(),
            metadata,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    pub fn dims(&self) -> [usize; 3] {
        self.metadata.dims
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.metadata.spacing
    }

    pub fn origin(&self) -> Option<[f64; 3]> {
        self.metadata.origin
    }

    pub fn array_shape(&self) -> (usize, usize, usize) {
        self.metadata.array_shape()
    }
}

/// Destination of one binary/metadata pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub bin: PathBuf,
    pub meta: PathBuf,
}

impl OutputPaths {
    pub fn new(bin: impl Into<PathBuf>, meta: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            meta: meta.into(),
        }
    }

    /// Companion pair for the downsampled preview: same stems with a
    /// `_preview` marker before the final extension.
    ///
    /// `volume.bin` / `volume.meta.json` become `volume_preview.bin` /
    /// `volume.meta_preview.json`.
    pub fn preview(&self) -> Self {
        Self {
            bin: preview_path(&self.bin),
            meta: preview_path(&self.meta),
        }
    }
}

fn preview_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{PREVIEW_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}{PREVIEW_MARKER}"),
    };
    path.with_file_name(name)
}

/// Write `data` to a temporary file next to `path`, then rename it into
/// place. Readers never observe a half-written file.
pub(crate) fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
