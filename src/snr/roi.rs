//! Rectangular patch ROI on a single slice
//!
//! The patch spans `x_start..x_start + width` along x and
//! `y_start..y_start + height` along y on slice `z`, clipped to the volume.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{QaError, QaResult};
use crate::utils::detrend::detrend_linear;
use crate::volume::{voxel_index, Volume4D};

/// Patch ROI parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiPatch {
    /// Slice index along z
    pub slice: usize,
    pub x_start: usize,
    pub y_start: usize,
    pub width: usize,
    pub height: usize,
}

/// Per-frame statistics of the patch
#[derive(Debug, Clone, PartialEq)]
pub struct RoiTimecourse {
    /// Spatial mean of the patch at each frame
    pub mean: Vec<f64>,
    /// Spatial population std of the patch at each frame
    pub std: Vec<f64>,
    /// `mean` with its linear trend removed
    pub detrended_mean: Vec<f64>,
    /// `std` with its linear trend removed
    pub detrended_std: Vec<f64>,
}

impl RoiPatch {
    /// Flat voxel indices covered by the patch, clipped to `dims`
    ///
    /// # Errors
    /// `NoValidVoxels` when the patch lies outside the volume or is empty.
    pub fn indices(&self, dims: (usize, usize, usize)) -> QaResult<Vec<usize>> {
        let (nx, ny, nz) = dims;
        let xs = clip(self.x_start, self.width, nx);
        let ys = clip(self.y_start, self.height, ny);
        if self.slice >= nz || xs.is_empty() || ys.is_empty() {
            return Err(QaError::NoValidVoxels(format!(
                "ROI {:?} does not overlap volume {:?}",
                self, dims
            )));
        }
        let mut indices = Vec::with_capacity(xs.len() * ys.len());
        for j in ys {
            for i in xs.clone() {
                indices.push(voxel_index(i, j, self.slice, nx, ny));
            }
        }
        Ok(indices)
    }
}

fn clip(start: usize, len: usize, n: usize) -> Range<usize> {
    let start = start.min(n);
    let end = start.saturating_add(len).min(n);
    start..end
}

/// Mean of a 3D map over the patch (zeros included)
pub fn roi_mean(map: &[f64], dims: (usize, usize, usize), roi: &RoiPatch) -> QaResult<f64> {
    if map.len() != dims.0 * dims.1 * dims.2 {
        return Err(QaError::InvalidInput(format!(
            "map holds {} voxels, dims {:?}",
            map.len(),
            dims
        )));
    }
    let indices = roi.indices(dims)?;
    Ok(indices.iter().map(|&i| map[i]).sum::<f64>() / indices.len() as f64)
}

/// Spatial mean and std of the patch at every frame in `frames`
pub fn roi_timecourse(
    volume: &Volume4D,
    frames: Range<usize>,
    roi: &RoiPatch,
) -> QaResult<RoiTimecourse> {
    volume.check_frames(&frames)?;
    let indices = roi.indices(volume.spatial_dims())?;
    let n = indices.len() as f64;

    let mut mean = Vec::with_capacity(frames.len());
    let mut std = Vec::with_capacity(frames.len());
    for t in frames {
        let frame = volume.frame(t);
        let m = indices.iter().map(|&i| frame[i]).sum::<f64>() / n;
        let var = indices.iter().map(|&i| (frame[i] - m) * (frame[i] - m)).sum::<f64>() / n;
        mean.push(m);
        std.push(var.sqrt());
    }

    let detrended_mean = detrend_linear(&mean);
    let detrended_std = detrend_linear(&std);
    Ok(RoiTimecourse { mean, std, detrended_mean, detrended_std })
}
