//! Entry points that turn one input into a binary volume plus metadata.
//!
//! The anatomy conversion of a study writes the reference metadata record.
//! Segmentation and landmark conversions read it back as a
//! [`ReferenceGrid`] and land on the same voxel grid.

use crate::config::ConversionOptions;
use crate::enums::VolumeKind;
use crate::error::Result;
use crate::landmarks::{LandmarkReader, SphereRasterizer};
use crate::metadata::{OutputPaths, ReferenceGrid, VolumeMetadata};
use crate::segmentation::SegmentationAligner;
use crate::slice_loader::{SliceLoader, SliceOutcome};
use crate::source::{NiftiSource, VolumeSource};
use crate::streaming::StreamingConverter;
use crate::transform::{AxisPermutation, CoordinateTransform, WorldToVoxel};
use crate::volume::{MetadataPolicy, Volume};
use crate::window::IntensityWindow;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where an anatomy volume comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnatomySource {
    /// Every non-hidden file in a directory, read as DICOM slices.
    DicomDirectory(PathBuf),
    /// An explicit list of DICOM slice files.
    DicomFiles(Vec<PathBuf>),
    /// A `.nii` or `.nii.gz` volume.
    Nifti(PathBuf),
}

/// What a conversion wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutput {
    pub paths: OutputPaths,
    pub preview: Option<OutputPaths>,
    /// Metadata describing the written binary.
    pub metadata: VolumeMetadata,
    /// Inputs left out, with the reason.
    pub skipped: BTreeMap<String, String>,
}

/// Runs conversions with one set of options.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConversionOptions,
}

impl Converter {
    pub fn new(options: ConversionOptions) -> Self {
        Self { options }
    }

    /// Convert an anatomy study and write the reference metadata record.
    ///
    /// An existing record at `paths.meta` is kept, so the first anatomy
    /// conversion of a study fixes its reference grid. The binary is always
    /// rewritten.
    pub fn convert_anatomy(
        &self,
        source: &AnatomySource,
        paths: &OutputPaths,
    ) -> Result<ConversionOutput> {
        self.options.validate()?;
        info!(?source, out = %paths.bin.display(), "converting anatomy");

        let (volume, skipped) = match source {
            AnatomySource::DicomDirectory(dir) => {
                let stack = SliceLoader::load_from_directory(dir)?;
                let skipped = skipped_slices(&stack.outcomes);
                (self.window(stack.into_source(), self.options.anatomy_window)?, skipped)
            }
            AnatomySource::DicomFiles(files) => {
                let stack = SliceLoader::load_from_file_paths(files)?;
                let skipped = skipped_slices(&stack.outcomes);
                (self.window(stack.into_source(), self.options.anatomy_window)?, skipped)
            }
            AnatomySource::Nifti(path) => {
                let source = NiftiSource::open(path)?;
                (self.window(source, self.options.scan_window)?, BTreeMap::new())
            }
        };

        self.finish(
            &volume,
            VolumeKind::Anatomy,
            paths,
            MetadataPolicy::KeepExisting,
            skipped,
        )
    }

    /// Convert a label volume into a mask, aligned to `reference` when given.
    pub fn convert_segmentation(
        &self,
        source: impl AsRef<Path>,
        reference: Option<&ReferenceGrid>,
        paths: &OutputPaths,
    ) -> Result<ConversionOutput> {
        self.options.validate()?;
        let source = source.as_ref();
        info!(
            source = %source.display(),
            reference = ?reference.map(ReferenceGrid::path),
            out = %paths.bin.display(),
            "converting segmentation"
        );

        let mut nifti = NiftiSource::open(source)?;
        let volume = SegmentationAligner::new(self.options.segmentation_label).convert(
            &mut nifti,
            self.options.batch_depth,
            reference,
        )?;

        self.finish(
            &volume,
            VolumeKind::Segmentation,
            paths,
            MetadataPolicy::Overwrite,
            BTreeMap::new(),
        )
    }

    /// Rasterize the landmarks found in `inputs` (files or directories of
    /// `*.json` markups) onto the reference grid.
    pub fn convert_landmarks(
        &self,
        inputs: &[impl AsRef<Path>],
        reference: &ReferenceGrid,
        paths: &OutputPaths,
    ) -> Result<ConversionOutput> {
        self.options.validate()?;
        info!(
            inputs = inputs.len(),
            reference = %reference.path().display(),
            out = %paths.bin.display(),
            "converting landmarks"
        );

        let set = LandmarkReader::read_all(inputs)?;
        let skipped = set
            .failures()
            .map(|(id, reason)| (id.to_string(), reason.to_string()))
            .collect();

        let origin = reference.origin().unwrap_or_else(|| {
            warn!("reference has no origin, using [0, 0, 0]");
            [0.0; 3]
        });
        let transform = CoordinateTransform::new(
            AxisPermutation::new(self.options.landmark_axis_order)?,
            WorldToVoxel::new(origin, reference.spacing())?,
        );
        let voxels = set.to_voxels(&transform);
        let data = SphereRasterizer::new(self.options.landmark_radius_mm).rasterize(
            &voxels,
            reference.array_shape(),
            reference.spacing(),
        );
        let volume = Volume::new(data, reference.spacing(), reference.origin());

        self.finish(
            &volume,
            VolumeKind::Landmarks,
            paths,
            MetadataPolicy::Overwrite,
            skipped,
        )
    }

    fn window<S: VolumeSource>(&self, mut source: S, window: IntensityWindow) -> Result<Volume> {
        StreamingConverter::new(window)
            .with_batch_depth(self.options.batch_depth)
            .convert(&mut source)
    }

    fn finish(
        &self,
        volume: &Volume,
        kind: VolumeKind,
        paths: &OutputPaths,
        policy: MetadataPolicy,
        skipped: BTreeMap<String, String>,
    ) -> Result<ConversionOutput> {
        let metadata = volume.write(paths, policy)?;
        let preview = if self.options.generate_preview {
            Some(volume.write_preview(paths, self.options.preview_scale, kind.interpolation())?)
        } else {
            None
        };
        info!(
            ?kind,
            dims = ?metadata.dims,
            spacing = ?metadata.spacing,
            bin = %paths.bin.display(),
            meta = %paths.meta.display(),
            skipped = skipped.len(),
            "conversion finished"
        );
        Ok(ConversionOutput {
            paths: paths.clone(),
            preview,
            metadata,
            skipped,
        })
    }
}

fn skipped_slices(outcomes: &BTreeMap<String, SliceOutcome>) -> BTreeMap<String, String> {
    outcomes
        .iter()
        .filter_map(|(id, outcome)| match outcome {
            SliceOutcome::Stacked { .. } => None,
            SliceOutcome::Rejected(reason) | SliceOutcome::Unreadable(reason) => {
                Some((id.clone(), reason.clone()))
            }
        })
        .collect()
}
