//! Temporal SNR
//!
//! tsnr = temporal_mean / temporal_std per voxel, 0 where the std is 0 or
//! either statistic is not finite. Negative means are kept and give negative
//! tSNR. The scalar summary is the
//! average of the voxel ratios over nonzero entries, never a pooled ratio.
//!
//! Reference: Triantafyllou, C. et al. (2005). "Comparison of physiological
//! noise at 1.5 T, 3 T and 7 T and optimization of fMRI acquisition
//! parameters." NeuroImage 26(1):243-250.
//! https://doi.org/10.1016/j.neuroimage.2005.01.007

use crate::error::{QaError, QaResult};
use crate::stats::{mean_nonzero, TemporalStats};

use super::SnrMap;

/// Voxel-wise temporal SNR
///
/// # Arguments
/// * `temporal_mean` - Temporal mean (nx * ny * nz)
/// * `temporal_std` - Population temporal std (nx * ny * nz)
///
/// # Returns
/// Ratio map with exact zeros wherever the std is zero or a statistic is
/// NaN/infinite
pub fn tsnr_map(temporal_mean: &[f64], temporal_std: &[f64]) -> QaResult<Vec<f64>> {
    if temporal_mean.len() != temporal_std.len() {
        return Err(QaError::InvalidInput(format!(
            "mean has {} voxels, std has {}",
            temporal_mean.len(),
            temporal_std.len()
        )));
    }
    Ok(temporal_mean
        .iter()
        .zip(temporal_std.iter())
        .map(|(&m, &s)| {
            if s != 0.0 && s.is_finite() && m.is_finite() {
                m / s
            } else {
                0.0
            }
        })
        .collect())
}

/// tSNR map from temporal statistics, tagged with the source affine
pub fn compute_tsnr(stats: &TemporalStats, affine: &[f64; 16]) -> QaResult<SnrMap> {
    let data = tsnr_map(&stats.mean, &stats.std)?;
    Ok(SnrMap::new(data, stats.dims, *affine))
}

/// Mean tSNR over nonzero entries, restricted to `mask` when given
///
/// # Errors
/// `NoValidVoxels` when the mask selects nothing.
pub fn mean_tsnr(tsnr: &[f64], mask: Option<&[u8]>) -> QaResult<f64> {
    mean_nonzero(tsnr, mask, "tSNR")
}
