#![allow(dead_code)]

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};
use ndarray::Array3;
use std::fs;
use std::path::Path;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;
const DT_FLOAT32: i16 = 16;

/// Write a single-file NIfTI-1 volume of `f32` samples.
///
/// `data` is laid out as (k, j, i), so its row-major order is the on-disk
/// order with `i` varying fastest. `pixdim` is (i, j, k) spacing.
pub fn write_nifti(
    path: &Path,
    data: &Array3<f32>,
    pixdim: [f32; 3],
    sform_origin: Option<[f32; 3]>,
) {
    let (nk, nj, ni) = data.dim();
    let mut bytes = vec![0u8; VOX_OFFSET];

    let mut put = |offset: usize, value: &[u8]| {
        bytes[offset..offset + value.len()].copy_from_slice(value);
    };
    put(0, &(HEADER_SIZE as i32).to_le_bytes());
    put(38, b"r");
    let dims = [3, ni as i16, nj as i16, nk as i16, 1, 1, 1, 1];
    for (n, d) in dims.iter().enumerate() {
        put(40 + 2 * n, &d.to_le_bytes());
    }
    put(70, &DT_FLOAT32.to_le_bytes());
    put(72, &32i16.to_le_bytes());
    let pixdims = [1.0, pixdim[0], pixdim[1], pixdim[2], 0.0, 0.0, 0.0, 0.0];
    for (n, p) in pixdims.iter().enumerate() {
        put(76 + 4 * n, &f32::to_le_bytes(*p));
    }
    put(108, &(VOX_OFFSET as f32).to_le_bytes());
    put(112, &1.0f32.to_le_bytes());

    match sform_origin {
        Some(origin) => {
            put(254, &1i16.to_le_bytes());
            let rows = [
                [pixdim[0], 0.0, 0.0, origin[0]],
                [0.0, pixdim[1], 0.0, origin[1]],
                [0.0, 0.0, pixdim[2], origin[2]],
            ];
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    put(280 + 16 * r + 4 * c, &value.to_le_bytes());
                }
            }
        }
        None => {
            put(252, &1i16.to_le_bytes());
        }
    }
    put(344, b"n+1\0");

    for value in data.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, bytes).unwrap();
}

/// Volume whose value encodes its (k, j, i) index.
pub fn indexed_volume(shape: (usize, usize, usize)) -> Array3<f32> {
    Array3::from_shape_fn(shape, |(k, j, i)| (k * 100 + j * 10 + i) as f32)
}

/// A 2x3 CT slice with stored value `stored` everywhere.
///
/// Pixel spacing is 0.5 (row) by 0.7 (column), thickness 3 mm, and the
/// modality rescale is `2 * stored - 1024`. The slice sits at LPS (1, 2, z).
pub fn write_ct_slice(path: &Path, z: f64, instance: i32, stored: u16) {
    let strs = |values: &[&str]| {
        PrimitiveValue::Strs(values.iter().map(|v| v.to_string()).collect())
    };
    let sop_instance = format!("1.2.826.0.1.3680043.2.1125.{instance}");

    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(sop_instance.as_str()),
    ));
    obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")));
    obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(2_u16)));
    obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(3_u16)));
    obj.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)));
    obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)));
    obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)));
    obj.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));
    obj.put(DataElement::new(tags::PIXEL_SPACING, VR::DS, strs(&["0.5", "0.7"])));
    obj.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, strs(&["3"])));
    let z = z.to_string();
    obj.put(DataElement::new(
        tags::IMAGE_POSITION_PATIENT,
        VR::DS,
        strs(&["1", "2", z.as_str()]),
    ));
    obj.put(DataElement::new(
        tags::INSTANCE_NUMBER,
        VR::IS,
        strs(&[instance.to_string().as_str()]),
    ));
    obj.put(DataElement::new(tags::RESCALE_SLOPE, VR::DS, strs(&["2"])));
    obj.put(DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, strs(&["-1024"])));
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::U16(std::iter::repeat_n(stored, 6).collect()),
    ));

    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance.as_str()),
        )
        .unwrap();
    file.write_to_file(path).unwrap();
}
