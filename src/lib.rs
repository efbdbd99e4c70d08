//! # voxel-export
//!
//! This crate converts the inputs of a medical imaging study into raw 8-bit
//! voxel buffers that a browser-side 3D viewer can upload directly. Every
//! output is a pair of files:
//!  - a header-less binary with one byte per voxel, row-major
//!  - a JSON metadata record with `spacing`, `dims` and an optional `origin`
//!
//! Supported inputs:
//!  - DICOM series (one slice per file), sorted by ImagePositionPatient or
//!    InstanceNumber
//!  - NIfTI volumes (`.nii`, `.nii.gz`), read in batches of slices so large
//!    scans never sit in memory as floats all at once
//!  - NIfTI label masks, thresholded and aligned to the anatomy grid
//!  - landmark markups in the 3D Slicer JSON layout, drawn as spheres
//!
//! The anatomy conversion of a study writes the *reference* metadata
//! record. Later segmentation and landmark conversions load it as a
//! [`ReferenceGrid`] so their voxels line up with the anatomy.
//! Each output can be accompanied by a downsampled preview pair.
//!
//! With the `parallel` feature resampling runs on the rayon thread pool.
//!
//! # Examples
//!
//! ## Converting a study
//!
//! ```no_run
//! # use voxel_export::{AnatomySource, ConversionOptions, Converter, OutputPaths, ReferenceGrid};
//! # fn main() -> voxel_export::Result<()> {
//! let converter = Converter::new(ConversionOptions::default());
//! let base = OutputPaths::new("media/volume_nifti.bin", "media/volume_base.meta.json");
//! converter.convert_anatomy(&AnatomySource::Nifti("scan.nii.gz".into()), &base)?;
//!
//! let reference = ReferenceGrid::load(&base.meta)?;
//! converter.convert_segmentation(
//!     "mask.nii.gz",
//!     Some(&reference),
//!     &OutputPaths::new("media/segmentation.bin", "media/segmentation.meta.json"),
//! )?;
//! converter.convert_landmarks(
//!     &["landmarks/"],
//!     &reference,
//!     &OutputPaths::new("media/landmarks.bin", "media/landmarks.meta.json"),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod converter;
pub mod enums;
pub mod error;
mod interpolator;
pub mod landmarks;
pub mod metadata;
pub mod segmentation;
pub mod slice_loader;
pub mod source;
pub mod streaming;
pub mod transform;
pub mod volume;
pub mod window;

pub use config::ConversionOptions;
pub use converter::{AnatomySource, ConversionOutput, Converter};
pub use enums::{Interpolation, SliceOrderKey, VolumeKind};
pub use error::{ConversionError, Result};
pub use metadata::{OutputPaths, ReferenceGrid, VolumeMetadata};
pub use volume::{MetadataPolicy, Volume};
