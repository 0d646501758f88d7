//! Spatial summaries of the temporal mean image and the static spatial
//! noise image

use std::ops::Range;

use crate::error::QaResult;
use crate::mask::BrainMask;
use crate::stats::{masked_mean_std, mean};
use crate::volume::Volume4D;

use super::SnrMap;

/// Spatial SNR: mean / population std of the temporal mean inside the mask
///
/// Returns 0 when the in-mask intensities have zero spread.
///
/// # Errors
/// `NoValidVoxels` for an empty mask.
pub fn spatial_snr(temporal_mean: &[f64], mask: &BrainMask) -> QaResult<f64> {
    let (m, s) = masked_mean_std(temporal_mean, mask.data(), "spatial SNR")?;
    Ok(if s > 0.0 { m / s } else { 0.0 })
}

/// Mean intensity of the temporal mean image over its finite voxels
pub fn mean_intensity(temporal_mean: &[f64]) -> Option<f64> {
    mean(temporal_mean)
}

/// Static spatial noise image over `frames`
///
/// Sum of the even-offset frames minus the sum of the odd-offset frames,
/// offsets counted from `frames.start`. Drift that is stable across
/// neighbouring frames cancels and leaves the frame-to-frame noise pattern.
///
/// # Errors
/// `InvalidInput` or `DegenerateVolume` when the frame range is unusable.
pub fn static_spatial_noise(volume: &Volume4D, frames: Range<usize>) -> QaResult<SnrMap> {
    volume.check_frames(&frames)?;
    let mut image = vec![0.0; volume.n_voxels()];
    for (offset, t) in frames.enumerate() {
        let sign = if offset % 2 == 0 { 1.0 } else { -1.0 };
        for (acc, &v) in image.iter_mut().zip(volume.frame(t).iter()) {
            *acc += sign * v;
        }
    }
    Ok(SnrMap::new(image, volume.spatial_dims(), *volume.affine()))
}
