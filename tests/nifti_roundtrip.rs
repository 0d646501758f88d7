//! NIfTI and sidecar round-trips through the file-backed I/O layer

mod common;

use std::fs;
use std::path::Path;

use ndarray::{Array4, ShapeBuilder};
use nifti::writer::WriterOptions;

use common::*;
use fmri_qa_core::config::QaConfig;
use fmri_qa_core::nifti_io::{
    load_nifti, read_mask, read_sidecar_tr, read_volume, sidecar_path, write_map, write_mask,
};
use fmri_qa_core::pipeline::run_qa;
use fmri_qa_core::volume::Volume4D;

/// Write a volume as a 4D float32 image with the nifti crate's defaults
fn write_volume(path: &Path, volume: &Volume4D) {
    let values: Vec<f32> = volume.data().iter().map(|&v| v as f32).collect();
    let array = Array4::from_shape_vec(volume.dims().f(), values).unwrap();
    WriterOptions::new(path).write_nifti(&array).unwrap();
}

#[test]
fn test_volume_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let dims = (6, 5, 4, 7);
    let volume = phantom_volume(dims);

    for name in ["bold.nii", "bold.nii.gz"] {
        let path = dir.path().join(name);
        write_volume(&path, &volume);
        let loaded = read_volume(&path).unwrap();

        assert_eq!(loaded.dims(), dims, "{}", name);
        assert!(max_abs_diff(loaded.data(), volume.data()) < 1e-3, "{}", name);
        assert_eq!(loaded.get(3, 2, 1, 4) as f32, volume.get(3, 2, 1, 4) as f32);
    }
}

#[test]
fn test_single_frame_file_is_degenerate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("single.nii");
    let array = Array4::from_shape_vec((2, 2, 2, 1).f(), vec![1.0f32; 8]).unwrap();
    WriterOptions::new(&path).write_nifti(&array).unwrap();

    let result = read_volume(&path);
    assert!(matches!(result, Err(fmri_qa_core::QaError::DegenerateVolume(_))));
}

#[test]
fn test_maps_keep_grid_and_affine() {
    let dir = tempfile::tempdir().unwrap();
    let dims = (8, 8, 5, 9);
    let affine = [
        2.0, 0.0, 0.0, -8.0,
        0.0, 2.0, 0.0, -8.0,
        0.0, 0.0, 3.0, -7.5,
        0.0, 0.0, 0.0, 1.0,
    ];
    let base = phantom_volume(dims);
    let volume = Volume4D::new(base.data().to_vec(), dims, (2.0, 2.0, 3.0), affine).unwrap();
    let outcome = run_qa("acq", &volume, None, Some(2.0), &QaConfig::default()).unwrap();

    let tsnr_path = dir.path().join("tsnr.nii.gz");
    write_map(&tsnr_path, &outcome.maps.tsnr, volume.voxel_size()).unwrap();
    let loaded = load_nifti(&fs::read(&tsnr_path).unwrap()).unwrap();

    assert_eq!(loaded.dims, (8, 8, 5, 1));
    assert_eq!(loaded.affine, affine);
    assert!((loaded.voxel_size.2 - 3.0).abs() < 1e-6);
    for (a, b) in loaded.data.iter().zip(outcome.maps.tsnr.data.iter()) {
        assert!((a - b).abs() <= b.abs() * 1e-6 + 1e-9);
    }

    let mask_path = dir.path().join("brain_mask.nii.gz");
    write_mask(&mask_path, &outcome.maps.brain_mask, volume.voxel_size(), &affine).unwrap();
    assert_eq!(read_mask(&mask_path).unwrap(), outcome.maps.brain_mask);
}

#[test]
fn test_sidecar_next_to_image() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("sub-01_task-rest_bold.nii.gz");

    let sidecar = sidecar_path(&image);
    assert_eq!(read_sidecar_tr(&sidecar).unwrap(), None);

    fs::write(&sidecar, r#"{"RepetitionTime": 1.5, "EchoTime": 0.03}"#).unwrap();
    assert_eq!(read_sidecar_tr(&sidecar).unwrap(), Some(1.5));

    fs::write(&sidecar, "{ truncated").unwrap();
    assert!(matches!(read_sidecar_tr(&sidecar), Err(fmri_qa_core::QaError::Sidecar(_))));
}
