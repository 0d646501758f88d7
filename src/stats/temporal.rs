//! Voxel-wise temporal mean and standard deviation
//!
//! Both statistics are computed per voxel over a range of frames. The
//! standard deviation is the population form (denominator T). The chunked
//! path copies one z-slab of the selected frames into a scratch buffer,
//! reduces it, and releases it before the next slab, so peak scratch memory
//! is bounded by nx * ny * chunk * T. Every voxel is reduced with the same
//! sequence of operations in both paths, so results are bit-identical.

use std::ops::Range;

use tracing::debug;

use crate::error::{QaError, QaResult};
use crate::volume::Volume4D;

/// Temporal statistics of a volume over a frame range
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalStats {
    /// Temporal mean (nx * ny * nz)
    pub mean: Vec<f64>,
    /// Population temporal standard deviation (nx * ny * nz)
    pub std: Vec<f64>,
    /// Spatial dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Number of frames reduced
    pub n_frames: usize,
}

/// Mean and population std of one voxel's samples, in frame order
#[inline]
fn reduce_series(samples: impl Iterator<Item = f64> + Clone, n: usize) -> (f64, f64) {
    let inv_n = 1.0 / n as f64;
    let sum: f64 = samples.clone().fold(0.0, |acc, v| acc + v);
    let mean = sum * inv_n;
    let ss: f64 = samples.fold(0.0, |acc, v| {
        let d = v - mean;
        acc + d * d
    });
    (mean, (ss * inv_n).sqrt())
}

/// Temporal mean and std over `frames`, reading the volume directly
///
/// # Arguments
/// * `volume` - Source volume
/// * `frames` - Frame range to reduce (at least 2 frames)
///
/// # Returns
/// TemporalStats over the spatial grid
pub fn temporal_stats(volume: &Volume4D, frames: Range<usize>) -> QaResult<TemporalStats> {
    volume.check_frames(&frames)?;
    let (nx, ny, nz) = volume.spatial_dims();
    let n_vox = volume.n_voxels();
    let data = volume.data();
    let nt = frames.len();

    let mut mean = vec![0.0; n_vox];
    let mut std = vec![0.0; n_vox];

    for i in 0..n_vox {
        let series = frames.clone().map(|t| data[i + t * n_vox]);
        let (m, s) = reduce_series(series, nt);
        mean[i] = m;
        std[i] = s;
    }

    Ok(TemporalStats { mean, std, dims: (nx, ny, nz), n_frames: nt })
}

/// Temporal mean and std computed slab-by-slab along z
///
/// # Arguments
/// * `volume` - Source volume
/// * `frames` - Frame range to reduce (at least 2 frames)
/// * `chunk_size` - Number of z-slices per slab (>= 1)
pub fn temporal_stats_chunked(
    volume: &Volume4D,
    frames: Range<usize>,
    chunk_size: usize,
) -> QaResult<TemporalStats> {
    temporal_stats_with_progress(volume, frames, chunk_size, |_, _| {})
}

/// Chunked temporal statistics with a progress callback
///
/// The callback receives (slices done, total slices) after every slab.
pub fn temporal_stats_with_progress<F>(
    volume: &Volume4D,
    frames: Range<usize>,
    chunk_size: usize,
    mut progress_callback: F,
) -> QaResult<TemporalStats>
where
    F: FnMut(usize, usize),
{
    volume.check_frames(&frames)?;
    if chunk_size == 0 {
        return Err(QaError::InvalidInput("chunk size must be >= 1".into()));
    }

    let (nx, ny, nz) = volume.spatial_dims();
    let n_vox = volume.n_voxels();
    let slice_len = nx * ny;
    let data = volume.data();
    let nt = frames.len();

    let mut mean = vec![0.0; n_vox];
    let mut std = vec![0.0; n_vox];

    let mut z_start = 0;
    while z_start < nz {
        let z_end = (z_start + chunk_size).min(nz);
        let slab_len = (z_end - z_start) * slice_len;
        let slab_offset = z_start * slice_len;

        // Scratch layout: [frame][slab voxel]
        let mut scratch = Vec::with_capacity(slab_len * nt);
        for t in frames.clone() {
            let frame_start = t * n_vox + slab_offset;
            scratch.extend_from_slice(&data[frame_start..frame_start + slab_len]);
        }

        for j in 0..slab_len {
            let series = (0..nt).map(|f| scratch[j + f * slab_len]);
            let (m, s) = reduce_series(series, nt);
            mean[slab_offset + j] = m;
            std[slab_offset + j] = s;
        }

        debug!(z_start, z_end, nz, "reduced temporal slab");
        drop(scratch);
        progress_callback(z_end, nz);
        z_start = z_end;
    }

    Ok(TemporalStats { mean, std, dims: (nx, ny, nz), n_frames: nt })
}

/// Dispatch to the chunked or direct path
pub fn compute_temporal_stats(
    volume: &Volume4D,
    frames: Range<usize>,
    chunk_size: Option<usize>,
) -> QaResult<TemporalStats> {
    match chunk_size {
        Some(chunk) => temporal_stats_chunked(volume, frames, chunk),
        None => temporal_stats(volume, frames),
    }
}
