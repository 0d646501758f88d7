//! Image (instantaneous) SNR
//!
//! isnr = temporal_mean / noise per voxel where the mean is positive and a
//! positive noise level exists at that voxel; 0 elsewhere. A missing noise
//! reference as a whole is an error raised by the noise estimator, so the
//! zero-guard here only covers isolated voxels.

use crate::error::{QaError, QaResult};
use crate::noise::NoiseReference;
use crate::stats::mean_nonzero;

use super::SnrMap;

/// Voxel-wise iSNR
///
/// # Arguments
/// * `temporal_mean` - Temporal mean (nx * ny * nz)
/// * `noise` - Noise reference covering the same grid
///
/// # Errors
/// `UndefinedNoiseLevel` for a uniform reference that is not positive,
/// `InvalidInput` for a reference whose levels do not cover its own grid or
/// the mean.
pub fn isnr_map(temporal_mean: &[f64], noise: &NoiseReference) -> QaResult<Vec<f64>> {
    let covered = match noise {
        NoiseReference::Uniform(level) => {
            if !(level.is_finite() && *level > 0.0) {
                return Err(QaError::UndefinedNoiseLevel(format!(
                    "uniform noise level {} cannot be used as a denominator",
                    level
                )));
            }
            temporal_mean.len()
        }
        NoiseReference::PerVoxel { dims, .. } | NoiseReference::Slabs { dims, .. } => {
            noise.check_dims(*dims)?;
            dims.0 * dims.1 * dims.2
        }
    };
    if covered != temporal_mean.len() {
        return Err(QaError::InvalidInput(format!(
            "noise reference covers {} voxels, mean has {}",
            covered,
            temporal_mean.len()
        )));
    }

    Ok(temporal_mean
        .iter()
        .enumerate()
        .map(|(i, &m)| {
            let level = noise.level_at(i);
            if m > 0.0 && level > 0.0 { m / level } else { 0.0 }
        })
        .collect())
}

/// iSNR map tagged with the source affine
pub fn compute_isnr(
    temporal_mean: &[f64],
    dims: (usize, usize, usize),
    noise: &NoiseReference,
    affine: &[f64; 16],
) -> QaResult<SnrMap> {
    noise.check_dims(dims)?;
    let data = isnr_map(temporal_mean, noise)?;
    Ok(SnrMap::new(data, dims, *affine))
}

/// Mean iSNR over positive entries, restricted to `mask` when given
pub fn mean_isnr(isnr: &[f64], mask: Option<&[u8]>) -> QaResult<f64> {
    mean_nonzero(isnr, mask, "iSNR")
}
