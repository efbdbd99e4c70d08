use crate::{
    enums::SliceOrderKey,
    error::{ConversionError, Result},
    source::ArraySource,
    transform::lps_to_ras,
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// One readable 2-D slice plus the tags used to place it in a stack.
pub trait SliceSource {
    /// Decoded intensities in (row, column) order.
    fn pixels(&self) -> std::result::Result<Array2<f32>, String>;

    /// Coordinate along the through-plane axis.
    fn position(&self) -> Option<f64>;

    fn instance_number(&self) -> Option<i64>;

    /// `(column spacing, row spacing, slice thickness)`.
    fn spacing(&self) -> Option<[f64; 3]>;

    /// Patient-space position of the first pixel, in LPS.
    fn image_position(&self) -> Option<[f64; 3]> {
        None
    }
}

/// A single DICOM file held in memory.
pub struct DicomSlice {
    object: FileDicomObject<InMemDicomObject>,
}

impl DicomSlice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let object = open_file(path)
            .map_err(|err| ConversionError::unreadable(path.display().to_string(), err))?;
        Ok(Self { object })
    }

    pub fn from_object(object: FileDicomObject<InMemDicomObject>) -> Self {
        Self { object }
    }

    fn floats(&self, tag: dicom::core::Tag) -> Option<Vec<f64>> {
        self.object.element(tag).ok()?.to_multi_float64().ok()
    }
}

impl SliceSource for DicomSlice {
    /// Modality-rescaled values (HU for CT); no VOI window is applied.
    fn pixels(&self) -> std::result::Result<Array2<f32>, String> {
        let pixel_data = self
            .object
            .decode_pixel_data()
            .map_err(|err| err.to_string())?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|err| err.to_string())
    }

    fn position(&self) -> Option<f64> {
        self.floats(tags::IMAGE_POSITION_PATIENT)?.get(2).copied()
    }

    fn instance_number(&self) -> Option<i64> {
        self.object
            .element(tags::INSTANCE_NUMBER)
            .ok()?
            .to_int::<i64>()
            .ok()
    }

    fn spacing(&self) -> Option<[f64; 3]> {
        let pixel_spacing = self.floats(tags::PIXEL_SPACING)?;
        let thickness = self
            .object
            .element(tags::SLICE_THICKNESS)
            .ok()?
            .to_float64()
            .ok()?;
        match pixel_spacing.as_slice() {
            [row, column, ..] => Some([*column, *row, thickness]),
            _ => None,
        }
    }

    fn image_position(&self) -> Option<[f64; 3]> {
        match self.floats(tags::IMAGE_POSITION_PATIENT)?.as_slice() {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }
}

/// What happened to one input of a slice stack.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceOutcome {
    /// Placed at `index` along the slice axis.
    Stacked { index: usize, key: SliceOrderKey },
    /// Readable, but left out of the stack.
    Rejected(String),
    /// Could not be opened or decoded.
    Unreadable(String),
}

/// A sorted slice stack ready for windowing.
#[derive(Debug, Clone)]
pub struct AssembledSlices {
    /// Raw intensities in (slice, row, column) order.
    pub data: Array3<f32>,
    /// Spacing in array order: (thickness, row, column).
    pub spacing: [f64; 3],
    /// RAS position of the first pixel of the first slice.
    pub origin: Option<[f64; 3]>,
    /// Outcome per input identifier.
    pub outcomes: BTreeMap<String, SliceOutcome>,
}

impl AssembledSlices {
    pub fn stacked_count(&self) -> usize {
        self.data.dim().0
    }

    /// Inputs that did not make it into the stack.
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| !matches!(outcome, SliceOutcome::Stacked { .. }))
            .count()
    }

    pub fn into_source(self) -> ArraySource {
        ArraySource::new(self.data, self.spacing, self.origin)
    }
}

struct SortedSlice {
    id: String,
    key: SliceOrderKey,
    pixels: Array2<f32>,
    image_position: Option<[f64; 3]>,
}

pub struct SliceLoader;

impl SliceLoader {
    /// Order `slices` into a 3-D stack.
    ///
    /// Each slice is keyed by its through-plane position, else by its
    /// instance number; slices with neither are rejected. Ties keep input
    /// order. Individual failures are recorded in the outcome map rather
    /// than failing the stack.
    ///
    /// # Errors
    ///
    /// Returns `NoValidSlices` when nothing is left to stack.
    pub fn assemble<S: SliceSource>(slices: Vec<(String, S)>) -> Result<AssembledSlices> {
        Self::assemble_with_outcomes(slices, BTreeMap::new())
    }

    /// Load a stack from file paths. Files that fail to open are recorded
    /// as unreadable; a path given twice is only read once.
    pub fn load_from_file_paths(paths: &[impl AsRef<Path>]) -> Result<AssembledSlices> {
        let mut outcomes = BTreeMap::new();
        let mut seen = BTreeSet::new();
        let mut slices = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let id = path.display().to_string();
            if !seen.insert(id.clone()) {
                Self::record_duplicate(&mut outcomes, &id);
                continue;
            }
            match DicomSlice::open(path) {
                Ok(slice) => slices.push((id, slice)),
                Err(err) => {
                    warn!(file = %id, error = %err, "skipping unreadable slice file");
                    outcomes.insert(id, SliceOutcome::Unreadable(err.to_string()));
                }
            }
        }
        Self::assemble_with_outcomes(slices, outcomes)
    }

    /// Load a stack from every non-hidden file in a directory.
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<AssembledSlices> {
        let mut paths: Vec<PathBuf> = fs::read_dir(path.as_ref())?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| !name.starts_with('.'))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(ConversionError::NoValidSlices);
        }

        Self::load_from_file_paths(&paths)
    }

    fn assemble_with_outcomes<S: SliceSource>(
        slices: Vec<(String, S)>,
        mut outcomes: BTreeMap<String, SliceOutcome>,
    ) -> Result<AssembledSlices> {
        // first-found in input order, among every slice that could be read
        let mut spacing = None;
        let mut sorted = Vec::with_capacity(slices.len());
        let mut seen: BTreeSet<String> = outcomes.keys().cloned().collect();

        for (id, slice) in slices {
            if !seen.insert(id.clone()) {
                Self::record_duplicate(&mut outcomes, &id);
                continue;
            }
            let pixels = match slice.pixels() {
                Ok(pixels) => pixels,
                Err(reason) => {
                    warn!(slice = %id, %reason, "skipping slice with undecodable pixels");
                    outcomes.insert(id, SliceOutcome::Unreadable(reason));
                    continue;
                }
            };
            if spacing.is_none() {
                spacing = slice.spacing();
            }
            let Some(key) = Self::sort_key(&slice) else {
                warn!(slice = %id, "skipping slice without position or instance number");
                outcomes.insert(
                    id,
                    SliceOutcome::Rejected("no position or instance number".to_string()),
                );
                continue;
            };
            sorted.push(SortedSlice {
                id,
                key,
                pixels,
                image_position: slice.image_position(),
            });
        }

        sorted.sort_by(|a, b| a.key.value().total_cmp(&b.key.value()));

        let Some(first_dim) = sorted.first().map(|slice| slice.pixels.dim()) else {
            return Err(ConversionError::NoValidSlices);
        };
        let (stacked, mismatched): (Vec<_>, Vec<_>) = sorted
            .into_iter()
            .partition(|slice| slice.pixels.dim() == first_dim);
        for slice in mismatched {
            warn!(
                slice = %slice.id,
                shape = ?slice.pixels.dim(),
                expected = ?first_dim,
                "skipping slice with mismatched dimensions"
            );
            outcomes.insert(
                slice.id,
                SliceOutcome::Rejected(format!(
                    "shape {:?} differs from {:?}",
                    slice.pixels.dim(),
                    first_dim
                )),
            );
        }

        let spacing = match spacing {
            Some([column, row, thickness]) => [thickness, row, column],
            None => {
                warn!("no slice carries spacing information, assuming 1 mm");
                [1.0; 3]
            }
        };
        let origin = stacked
            .first()
            .and_then(|slice| slice.image_position)
            .map(lps_to_ras);
        let data = Self::build_volume_array(&stacked, first_dim);

        for (index, slice) in stacked.into_iter().enumerate() {
            outcomes.insert(slice.id, SliceOutcome::Stacked { index, key: slice.key });
        }
        let stack = AssembledSlices {
            data,
            spacing,
            origin,
            outcomes,
        };
        info!(
            slices = stack.stacked_count(),
            skipped = stack.skipped_count(),
            ?spacing,
            "assembled slice stack"
        );
        Ok(stack)
    }

    /// Repeats keep the first input's entry and get one of their own,
    /// `"<id> (duplicate N)"`, so every input still has an outcome.
    fn record_duplicate(outcomes: &mut BTreeMap<String, SliceOutcome>, id: &str) {
        warn!(slice = %id, "skipping repeated input");
        let key = (2..)
            .map(|n| format!("{id} (duplicate {n})"))
            .find(|key| !outcomes.contains_key(key))
            .unwrap_or_else(|| id.to_string());
        outcomes.insert(key, SliceOutcome::Rejected("duplicate input".to_string()));
    }

    fn sort_key<S: SliceSource>(slice: &S) -> Option<SliceOrderKey> {
        match (slice.position(), slice.instance_number()) {
            (Some(z), _) => Some(SliceOrderKey::Position(z)),
            (None, Some(n)) => Some(SliceOrderKey::InstanceNumber(n)),
            (None, None) => None,
        }
    }

    fn build_volume_array(slices: &[SortedSlice], (height, width): (usize, usize)) -> Array3<f32> {
        let mut volume = Array3::<f32>::zeros((slices.len(), height, width));
        for (i, slice) in slices.iter().enumerate() {
            debug!(index = i, slice = %slice.id, key = slice.key.value(), "stacking slice");
            volume.slice_mut(s![i, .., ..]).assign(&slice.pixels);
        }
        volume
    }
}
