//! Common test utilities for fMRI-QA-core integration tests

#![allow(dead_code)]

use fmri_qa_core::volume::{voxel_index, Volume4D};

/// Deterministic noise in [-0.5, 0.5) for voxel `i` at frame `t`
pub fn pseudo_noise(i: usize, t: usize) -> f64 {
    let h = (i as u64)
        .wrapping_mul(2_654_435_761)
        .wrapping_add((t as u64).wrapping_mul(40_503))
        .wrapping_add(12_345);
    ((h >> 7) % 1000) as f64 / 1000.0 - 0.5
}

/// Every sample equal to `value`
pub fn constant_volume(dims: (usize, usize, usize, usize), value: f64) -> Volume4D {
    let n = dims.0 * dims.1 * dims.2 * dims.3;
    Volume4D::from_data(vec![value; n], dims).unwrap()
}

/// Frames 0..nt-1 hold `10 + voxel_index`, the final frame is all zeros
pub fn zero_calibration_volume(dims: (usize, usize, usize, usize)) -> Volume4D {
    let n_vox = dims.0 * dims.1 * dims.2;
    let nt = dims.3;
    let mut data = Vec::with_capacity(n_vox * nt);
    for t in 0..nt {
        for i in 0..n_vox {
            data.push(if t + 1 < nt { 10.0 + i as f64 } else { 0.0 });
        }
    }
    Volume4D::from_data(data, dims).unwrap()
}

/// Whether (x, y) lies in the central "brain" block of the phantom
pub fn in_brain(x: usize, y: usize, nx: usize, ny: usize) -> bool {
    x >= nx / 4 && x < nx - nx / 4 && y >= ny / 4 && y < ny - ny / 4
}

/// Phantom with a bright fluctuating block, near-zero background noise
/// (some voxels with negative mean) and a few constant voxels
///
/// The final frame is independent noise, usable as a calibration scan.
pub fn phantom_volume(dims: (usize, usize, usize, usize)) -> Volume4D {
    let (nx, ny, nz, nt) = dims;
    let n_vox = nx * ny * nz;
    let mut data = vec![0.0; n_vox * nt];
    for t in 0..nt {
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let i = voxel_index(x, y, z, nx, ny);
                    let value = if t + 1 == nt {
                        3.0 + pseudo_noise(i, t)
                    } else if x == nx / 2 && y == ny / 2 {
                        // constant voxel inside the brain
                        80.0
                    } else if x == 0 && y == 0 {
                        // background corner with negative mean
                        pseudo_noise(i, t) - 1.0
                    } else if in_brain(x, y, nx, ny) {
                        100.0 + 10.0 * z as f64 + 4.0 * pseudo_noise(i, t)
                    } else {
                        pseudo_noise(i, t) - 0.05
                    };
                    data[i + t * n_vox] = value;
                }
            }
        }
    }
    Volume4D::from_data(data, dims).unwrap()
}

/// Mask selecting the phantom's brain block
pub fn phantom_brain_mask(dims: (usize, usize, usize)) -> Vec<u8> {
    let (nx, ny, nz) = dims;
    let mut mask = vec![0u8; nx * ny * nz];
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if in_brain(x, y, nx, ny) {
                    mask[voxel_index(x, y, z, nx, ny)] = 1;
                }
            }
        }
    }
    mask
}

/// Largest absolute elementwise difference
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
