mod common;

use approx::assert_relative_eq;
use common::{indexed_volume, write_ct_slice, write_nifti};
use ndarray::Array3;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use voxel_export::slice_loader::SliceLoader;
use voxel_export::window::{IntensityWindow, VoxelMap};
use voxel_export::{
    AnatomySource, ConversionError, ConversionOptions, Converter, OutputPaths, ReferenceGrid,
    VolumeMetadata,
};

fn outputs(dir: &Path, stem: &str) -> OutputPaths {
    OutputPaths::new(
        dir.join(format!("{stem}.bin")),
        dir.join(format!("{stem}.meta.json")),
    )
}

fn assert_dims_match_binary(paths: &OutputPaths) -> VolumeMetadata {
    let meta = VolumeMetadata::read(&paths.meta).unwrap();
    let bytes = fs::read(&paths.bin).unwrap();
    assert_eq!(bytes.len(), meta.dims.iter().product::<usize>());
    meta
}

#[test]
fn test_nifti_anatomy_end_to_end() {
    let dir = TempDir::new().unwrap();
    let scan = dir.path().join("scan.nii");
    let data = indexed_volume((6, 5, 4));
    write_nifti(&scan, &data, [0.5, 0.75, 2.0], Some([10.0, -20.0, 5.0]));

    let paths = outputs(dir.path(), "volume_base");
    let output = Converter::new(ConversionOptions::default())
        .convert_anatomy(&AnatomySource::Nifti(scan), &paths)
        .unwrap();

    let meta = assert_dims_match_binary(&paths);
    assert_eq!(meta, output.metadata);
    assert_eq!(meta.dims, [4, 5, 6]);
    assert_eq!(meta.spacing, [2.0, 0.75, 0.5]);
    assert_eq!(meta.origin, Some([10.0, -20.0, 5.0]));

    let expected: Vec<u8> = data
        .iter()
        .map(|&v| IntensityWindow::SCAN.map_value(v))
        .collect();
    assert_eq!(fs::read(&paths.bin).unwrap(), expected);

    let preview = output.preview.unwrap();
    assert_eq!(preview, paths.preview());
    let preview_meta = assert_dims_match_binary(&preview);
    assert_eq!(preview_meta.dims, [1, 1, 2]);
    for (p, s) in preview_meta.spacing.iter().zip(meta.spacing.iter()) {
        assert_relative_eq!(*p, s / 0.25);
    }
}

#[test]
fn test_batch_depth_does_not_change_output() {
    let dir = TempDir::new().unwrap();
    let scan = dir.path().join("scan.nii");
    let data = Array3::from_shape_fn((21, 6, 7), |(k, j, i)| {
        (k as f32 * 37.0 + j as f32 * 11.0 - i as f32 * 5.0) % 900.0
    });
    write_nifti(&scan, &data, [1.0, 1.0, 1.0], None);

    let mut results = Vec::new();
    for depth in [1, 4, 20, 21] {
        let paths = outputs(dir.path(), &format!("depth_{depth}"));
        Converter::new(
            ConversionOptions::default()
                .with_batch_depth(depth)
                .with_preview(false),
        )
        .convert_anatomy(&AnatomySource::Nifti(scan.clone()), &paths)
        .unwrap();
        results.push(fs::read(&paths.bin).unwrap());
    }
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(results[0].len(), 21 * 6 * 7);
}

#[test]
fn test_reference_metadata_is_written_once() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.nii");
    let second = dir.path().join("second.nii");
    write_nifti(&first, &indexed_volume((4, 4, 4)), [1.0; 3], None);
    write_nifti(
        &second,
        &Array3::from_elem((2, 3, 5), 500.0),
        [2.0; 3],
        None,
    );

    let paths = outputs(dir.path(), "volume_base");
    let converter = Converter::new(ConversionOptions::default().with_preview(false));
    converter
        .convert_anatomy(&AnatomySource::Nifti(first), &paths)
        .unwrap();
    let original = VolumeMetadata::read(&paths.meta).unwrap();

    converter
        .convert_anatomy(&AnatomySource::Nifti(second), &paths)
        .unwrap();
    assert_eq!(VolumeMetadata::read(&paths.meta).unwrap(), original);
    assert_eq!(fs::read(&paths.bin).unwrap(), vec![150u8; 30]);
}

#[test]
fn test_segmentation_aligns_to_reference() {
    let dir = TempDir::new().unwrap();
    let reference_path = dir.path().join("volume_base.meta.json");
    VolumeMetadata {
        spacing: [2.0, 1.0, 1.0],
        dims: [100, 100, 50],
        origin: Some([-50.0, -50.0, 0.0]),
    }
    .write(&reference_path)
    .unwrap();
    let reference = ReferenceGrid::load(&reference_path).unwrap();

    for (n, shape) in [(25, 50, 50), (100, 200, 200)].into_iter().enumerate() {
        let mask = dir.path().join(format!("mask_{n}.nii"));
        let data = Array3::from_shape_fn(shape, |(k, _, _)| {
            if k < shape.0 / 2 { 1.0 } else { 0.0 }
        });
        write_nifti(&mask, &data, [0.5, 0.5, 1.0], None);

        let paths = outputs(dir.path(), &format!("segmentation_{n}"));
        let output = Converter::default()
            .convert_segmentation(&mask, Some(&reference), &paths)
            .unwrap();

        let meta = assert_dims_match_binary(&paths);
        assert_eq!(meta.dims, [100, 100, 50]);
        assert_eq!(meta.spacing, [2.0, 1.0, 1.0]);
        assert_eq!(meta.origin, Some([-50.0, -50.0, 0.0]));

        let bytes = fs::read(&paths.bin).unwrap();
        assert!(bytes.iter().all(|&v| v == 0 || v == 255));
        assert_eq!(bytes[0], 255);
        assert_eq!(*bytes.last().unwrap(), 0);

        let preview = assert_dims_match_binary(&output.preview.unwrap());
        assert_eq!(preview.dims, [25, 25, 13]);
        let preview_bytes = fs::read(&paths.preview().bin).unwrap();
        assert!(preview_bytes.iter().all(|&v| v == 0 || v == 255));
    }
}

#[test]
fn test_segmentation_without_reference() {
    let dir = TempDir::new().unwrap();
    let mask = dir.path().join("mask.nii");
    write_nifti(
        &mask,
        &Array3::from_elem((3, 4, 5), 1.0),
        [0.5, 0.6, 3.0],
        Some([1.0, 2.0, 3.0]),
    );
    let reference =
        ReferenceGrid::load_optional(dir.path().join("volume_base.meta.json")).unwrap();
    assert!(reference.is_none());

    let paths = outputs(dir.path(), "segmentation");
    Converter::new(ConversionOptions::default().with_preview(false))
        .convert_segmentation(&mask, reference.as_ref(), &paths)
        .unwrap();

    let meta = assert_dims_match_binary(&paths);
    assert_eq!(meta.dims, [5, 4, 3]);
    assert_relative_eq!(meta.spacing[0], 3.0);
    assert_relative_eq!(meta.spacing[1], 0.6, epsilon = 1e-6);
    assert_relative_eq!(meta.spacing[2], 0.5);
    assert_eq!(meta.origin, Some([1.0, 2.0, 3.0]));
    assert!(!paths.preview().bin.exists());
}

#[test]
fn test_landmarks_hit_hand_computed_voxel() {
    let dir = TempDir::new().unwrap();
    let reference_path = dir.path().join("volume_base.meta.json");
    VolumeMetadata {
        spacing: [1.0, 1.0, 2.0],
        dims: [8, 8, 8],
        origin: Some([10.0, -20.0, 5.0]),
    }
    .write(&reference_path)
    .unwrap();

    let markups = dir.path().join("landmarks");
    fs::create_dir(&markups).unwrap();
    fs::write(
        markups.join("a.json"),
        r#"{"markups":[{"controlPoints":[{"id":"1","label":"tip","position":[8.0,16.0,-2.0]}]}]}"#,
    )
    .unwrap();
    fs::write(markups.join("b.json"), "{ truncated").unwrap();

    let reference = ReferenceGrid::load(&reference_path).unwrap();
    let paths = outputs(dir.path(), "landmarks");
    let output = Converter::new(ConversionOptions::default().with_landmark_radius(0.5))
        .convert_landmarks(&[&markups], &reference, &paths)
        .unwrap();

    assert_eq!(output.skipped.len(), 1);
    assert!(output.skipped.keys().all(|id| id.ends_with("b.json")));

    let meta = assert_dims_match_binary(&paths);
    assert_eq!(meta, *reference.metadata());

    let bytes = fs::read(&paths.bin).unwrap();
    let lit: Vec<usize> = (0..bytes.len()).filter(|&i| bytes[i] == 255).collect();
    assert_eq!(lit, vec![3 * 64 + 4 * 8 + 1]);

    let preview = assert_dims_match_binary(&output.preview.unwrap());
    assert_eq!(preview.dims, [2, 2, 2]);
}

#[test]
fn test_landmarks_need_reference() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("volume_base.meta.json");
    assert!(matches!(
        ReferenceGrid::load(&missing),
        Err(ConversionError::MissingReference(path)) if path == missing
    ));
}

#[test]
fn test_unreadable_landmarks_are_fatal_when_alone() {
    let dir = TempDir::new().unwrap();
    let reference = ReferenceGrid::from_metadata(
        dir.path().join("base.json"),
        VolumeMetadata {
            spacing: [1.0; 3],
            dims: [4, 4, 4],
            origin: None,
        },
    );
    let broken = dir.path().join("broken.json");
    fs::write(&broken, "not json").unwrap();
    let paths = outputs(dir.path(), "landmarks");
    let result = Converter::default().convert_landmarks(&[&broken], &reference, &paths);
    assert!(matches!(result, Err(ConversionError::UnreadableSource { .. })));
    assert!(!paths.bin.exists());
}

#[test]
fn test_dicom_directory_without_slices() {
    let dir = TempDir::new().unwrap();
    let series = dir.path().join("series");
    fs::create_dir(&series).unwrap();
    fs::write(series.join("IM0001"), b"garbage").unwrap();

    let result = Converter::default().convert_anatomy(
        &AnatomySource::DicomDirectory(series),
        &outputs(dir.path(), "volume_base"),
    );
    assert!(matches!(result, Err(ConversionError::NoValidSlices)));
}

fn ct_series(dir: &Path) -> std::path::PathBuf {
    let series = dir.join("series");
    fs::create_dir(&series).unwrap();
    // file order is the reverse of the through-plane order
    write_ct_slice(&series.join("IM0001"), 10.0, 1, 600);
    write_ct_slice(&series.join("IM0002"), -5.0, 2, 500);
    series
}

#[test]
fn test_dicom_series_is_sorted_and_rescaled() {
    let dir = TempDir::new().unwrap();
    let series = ct_series(dir.path());

    let stack = SliceLoader::load_from_directory(&series).unwrap();
    assert_eq!(stack.data.dim(), (2, 2, 3));
    assert_eq!(stack.skipped_count(), 0);
    assert_eq!(stack.spacing, [3.0, 0.5, 0.7]);
    assert_eq!(stack.origin, Some([-1.0, -2.0, -5.0]));
    assert!(stack.data.slice(ndarray::s![0, .., ..]).iter().all(|&v| v == -24.0));
    assert!(stack.data.slice(ndarray::s![1, .., ..]).iter().all(|&v| v == 176.0));
}

#[test]
fn test_dicom_anatomy_end_to_end() {
    let dir = TempDir::new().unwrap();
    let series = ct_series(dir.path());

    let paths = outputs(dir.path(), "volume_base");
    let output = Converter::new(ConversionOptions::default().with_preview(false))
        .convert_anatomy(&AnatomySource::DicomDirectory(series), &paths)
        .unwrap();
    assert!(output.skipped.is_empty());

    let meta = assert_dims_match_binary(&paths);
    assert_eq!(meta.dims, [3, 2, 2]);
    assert_eq!(meta.spacing, [3.0, 0.5, 0.7]);
    assert_eq!(meta.origin, Some([-1.0, -2.0, -5.0]));

    let window = IntensityWindow::ANATOMY;
    let mut expected = vec![window.map_value(-24.0); 6];
    expected.extend(vec![window.map_value(176.0); 6]);
    assert_eq!(fs::read(&paths.bin).unwrap(), expected);
}

#[test]
fn test_repeated_dicom_file_is_stacked_once() {
    let dir = TempDir::new().unwrap();
    let slice = dir.path().join("IM0001");
    write_ct_slice(&slice, 4.0, 1, 700);

    let paths = outputs(dir.path(), "volume_base");
    let output = Converter::new(ConversionOptions::default().with_preview(false))
        .convert_anatomy(&AnatomySource::DicomFiles(vec![slice.clone(), slice]), &paths)
        .unwrap();

    assert_eq!(output.metadata.dims, [3, 2, 1]);
    assert_eq!(output.skipped.len(), 1);
    assert!(output.skipped.keys().all(|id| id.ends_with("(duplicate 2)")));
    assert!(output.skipped.values().all(|reason| reason == "duplicate input"));
}
