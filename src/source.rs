//! Volumetric sources with ranged, on-demand reads.
//!
//! A source exposes its geometry up front and realizes voxel data only for
//! the through-plane range a caller asks for. Every source reports data in
//! (slice, row, column) order, where the slice axis is the through-plane
//! axis that batches are cut along.

use crate::error::{ConversionError, Result};
use ndarray::{Array3, s};
use nifti::error::NiftiError;
use nifti::{InMemNiftiVolume, IntoNdArray, NiftiHeader, NiftiObject, ReaderStreamedOptions};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lazily indexable volumetric data.
pub trait VolumeSource {
    /// Shape in (slice, row, column) order.
    fn shape(&self) -> (usize, usize, usize);

    /// Physical spacing per array axis.
    fn spacing(&self) -> [f64; 3];

    /// World position of voxel (0, 0, 0), in (x, y, z) order.
    fn origin(&self) -> Option<[f64; 3]>;

    /// Realize the slices in `range` as a `(range.len(), rows, columns)` array.
    fn read_slices(&mut self, range: Range<usize>) -> Result<Array3<f32>>;

    fn depth(&self) -> usize {
        self.shape().0
    }
}

fn check_range(range: &Range<usize>, depth: usize) -> Result<()> {
    if range.start > range.end || range.end > depth {
        return Err(ConversionError::failed(format!(
            "slice range {range:?} outside volume depth {depth}"
        )));
    }
    Ok(())
}

/// A fully materialized source, used for assembled slice stacks.
#[derive(Debug, Clone)]
pub struct ArraySource {
    data: Array3<f32>,
    spacing: [f64; 3],
    origin: Option<[f64; 3]>,
    reads: Vec<Range<usize>>,
}

impl ArraySource {
    pub fn new(data: Array3<f32>, spacing: [f64; 3], origin: Option<[f64; 3]>) -> Self {
        Self {
            data,
            spacing,
            origin,
            reads: Vec::new(),
        }
    }

    /// Ranges requested so far, in call order.
    pub fn reads(&self) -> &[Range<usize>] {
        &self.reads
    }
}

impl VolumeSource for ArraySource {
    fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    fn origin(&self) -> Option<[f64; 3]> {
        self.origin
    }

    fn read_slices(&mut self, range: Range<usize>) -> Result<Array3<f32>> {
        check_range(&range, self.depth())?;
        self.reads.push(range.clone());
        Ok(self.data.slice(s![range, .., ..]).to_owned())
    }
}

type SliceStream = Box<dyn Iterator<Item = std::result::Result<InMemNiftiVolume, NiftiError>>>;

/// A `.nii` / `.nii.gz` file streamed one 2-D slice at a time.
///
/// NIfTI stores voxels with the first index varying fastest, so slices
/// arrive along the third axis `k`. Each realized range is laid out as
/// `(k, j, i)`. Reads are sequential; asking for an earlier range reopens
/// the file.
pub struct NiftiSource {
    path: PathBuf,
    header: NiftiHeader,
    // (k, j, i)
    shape: (usize, usize, usize),
    slices: SliceStream,
    next_slice: usize,
}

impl fmt::Debug for NiftiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NiftiSource")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("next_slice", &self.next_slice)
            .finish()
    }
}

impl NiftiSource {
    /// Open a file and read its header. No voxel data is read yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (header, slices) = Self::stream(&path)?;
        let shape = Self::volume_shape(&header)
            .map_err(|reason| ConversionError::unreadable(path.display().to_string(), reason))?;
        debug!(path = %path.display(), ?shape, "opened NIfTI source");
        Ok(Self {
            path,
            header,
            shape,
            slices,
            next_slice: 0,
        })
    }

    fn stream(path: &Path) -> Result<(NiftiHeader, SliceStream)> {
        let object = ReaderStreamedOptions::new()
            .read_file_rank(path, 2)
            .map_err(|err| ConversionError::unreadable(path.display().to_string(), err))?;
        let header = object.header().clone();
        let slices: SliceStream = Box::new(object.into_volume());
        Ok((header, slices))
    }

    fn volume_shape(header: &NiftiHeader) -> std::result::Result<(usize, usize, usize), String> {
        let rank = header.dim[0] as usize;
        if !(3..=7).contains(&rank) {
            return Err(format!("expected a 3-D volume, header declares {rank} dimensions"));
        }
        if header.dim[4..=rank].iter().any(|&d| d > 1) {
            return Err(format!(
                "expected a single 3-D volume, got dims {:?}",
                &header.dim[1..=rank]
            ));
        }
        let (ni, nj, nk) = (
            header.dim[1] as usize,
            header.dim[2] as usize,
            header.dim[3] as usize,
        );
        if ni == 0 || nj == 0 || nk == 0 {
            return Err(format!("empty volume {ni}x{nj}x{nk}"));
        }
        Ok((nk, nj, ni))
    }

    /// Rewind to the first slice by reopening the file.
    fn rewind(&mut self) -> Result<()> {
        let (_, slices) = Self::stream(&self.path)?;
        self.slices = slices;
        self.next_slice = 0;
        Ok(())
    }

    fn advance(&mut self) -> Result<InMemNiftiVolume> {
        let slice = self
            .slices
            .next()
            .ok_or_else(|| {
                ConversionError::failed(format!(
                    "{}: data ended before slice {}",
                    self.path.display(),
                    self.next_slice
                ))
            })?
            .map_err(|err| {
                ConversionError::failed(format!(
                    "{}: failed to read slice {}: {err}",
                    self.path.display(),
                    self.next_slice
                ))
            })?;
        self.next_slice += 1;
        Ok(slice)
    }
}

impl VolumeSource for NiftiSource {
    fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// `[pixdim3, pixdim2, pixdim1]`; zero pixdims are read as 1 mm.
    fn spacing(&self) -> [f64; 3] {
        let zoom = |axis: usize| {
            let value = f64::from(self.header.pixdim[axis]).abs();
            if value > 0.0 {
                value
            } else {
                warn!(path = %self.path.display(), axis, "pixdim is zero, assuming 1 mm");
                1.0
            }
        };
        [zoom(3), zoom(2), zoom(1)]
    }

    /// Translation column of the sform, or the qform offsets when no sform
    /// is set.
    fn origin(&self) -> Option<[f64; 3]> {
        let h = &self.header;
        let origin = if h.sform_code > 0 {
            [h.srow_x[3], h.srow_y[3], h.srow_z[3]]
        } else {
            [h.quatern_x, h.quatern_y, h.quatern_z]
        };
        Some(origin.map(f64::from))
    }

    fn read_slices(&mut self, range: Range<usize>) -> Result<Array3<f32>> {
        check_range(&range, self.depth())?;
        if range.start < self.next_slice {
            self.rewind()?;
        }
        while self.next_slice < range.start {
            self.advance()?;
        }

        let (_, rows, columns) = self.shape;
        let mut out = Array3::<f32>::zeros((range.len(), rows, columns));
        for k in 0..range.len() {
            let slice = self.advance()?;
            let values = slice.into_ndarray::<f32>().map_err(|err| {
                ConversionError::failed(format!("{}: {err}", self.path.display()))
            })?;
            if values.shape() != [columns, rows] {
                return Err(ConversionError::failed(format!(
                    "{}: slice shape {:?} does not match header",
                    self.path.display(),
                    values.shape()
                )));
            }
            // logical order of an (i, j) slice: i outer, j inner
            let mut plane = out.slice_mut(s![k, .., ..]);
            for (position, &value) in values.iter().enumerate() {
                let (i, j) = (position / rows, position % rows);
                plane[[j, i]] = value;
            }
        }
        Ok(out)
    }
}
