//! Noise level estimation for iSNR
//!
//! Two policies are supported:
//! - Last volume: the final frame is a dedicated noise-calibration scan. The
//!   noise level of each brain voxel is `|noise[x,y,z]|` (non-finite samples
//!   set to 0). The pooled variant reduces these to their mean.
//! - Background region: voxels whose temporal mean is below a fraction of the
//!   maximum are background; the noise level is the median temporal std over
//!   those voxels. Without usable background voxels the level falls back to
//!   `0.1 * median(std)` over the region. The estimate can be made per z-slab
//!   with a slab-local maximum.
//!
//! An estimate from which no positive noise level can be derived is an
//! `UndefinedNoiseLevel` error, never a silent zero denominator.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QaError, QaResult};
use crate::mask::BrainMask;
use crate::stats::{median, TemporalStats};
use crate::utils::threshold::mask_below_fraction;
use crate::volume::Volume4D;

/// Default fraction of the maximum mean below which voxels are background
pub const DEFAULT_BACKGROUND_THRESHOLD: f64 = 0.05;

/// Scale applied to the whole-region median std when no background exists
pub const BACKGROUND_FALLBACK_SCALE: f64 = 0.1;

/// Noise estimation policy
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoisePolicy {
    /// Final frame is a noise scan; per-voxel noise level inside the brain mask
    #[default]
    LastVolume,
    /// Final frame is a noise scan; one pooled level (mean of masked |noise|)
    LastVolumePooled,
    /// Median temporal std of background voxels
    BackgroundRegion {
        /// Fraction of the (local) maximum mean defining background
        #[serde(default = "default_background_threshold")]
        threshold_fraction: f64,
        /// Estimate per slab of this many z-slices instead of globally
        #[serde(default)]
        slab_size: Option<usize>,
    },
}

fn default_background_threshold() -> f64 {
    DEFAULT_BACKGROUND_THRESHOLD
}

impl NoisePolicy {
    /// Background-region policy with default threshold, estimated globally
    pub fn background() -> Self {
        NoisePolicy::BackgroundRegion {
            threshold_fraction: DEFAULT_BACKGROUND_THRESHOLD,
            slab_size: None,
        }
    }

    /// True when the final frame is reserved for noise calibration
    pub fn uses_noise_frame(&self) -> bool {
        matches!(self, NoisePolicy::LastVolume | NoisePolicy::LastVolumePooled)
    }

    /// Short label for summaries and logs
    pub fn label(&self) -> &'static str {
        match self {
            NoisePolicy::LastVolume => "last_volume",
            NoisePolicy::LastVolumePooled => "last_volume_pooled",
            NoisePolicy::BackgroundRegion { .. } => "background_region",
        }
    }
}

/// Noise level used as iSNR denominator
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseReference {
    /// One level for every voxel
    Uniform(f64),
    /// One level per voxel (nx * ny * nz); zero marks voxels with no noise signal
    PerVoxel {
        levels: Vec<f64>,
        dims: (usize, usize, usize),
    },
    /// One level per z-slab; zero marks slabs with no usable estimate
    Slabs {
        levels: Vec<f64>,
        slab_size: usize,
        dims: (usize, usize, usize),
    },
}

impl NoiseReference {
    /// Noise level at a flat voxel index
    #[inline]
    pub fn level_at(&self, index: usize) -> f64 {
        match self {
            NoiseReference::Uniform(level) => *level,
            NoiseReference::PerVoxel { levels, .. } => levels[index],
            NoiseReference::Slabs { levels, slab_size, dims } => {
                let z = index / (dims.0 * dims.1);
                levels[z / slab_size]
            }
        }
    }

    /// Representative scalar: the level itself, or the mean of the positive levels
    pub fn summary_level(&self) -> f64 {
        let levels = match self {
            NoiseReference::Uniform(level) => return *level,
            NoiseReference::PerVoxel { levels, .. } => levels,
            NoiseReference::Slabs { levels, .. } => levels,
        };
        let positive: Vec<f64> = levels.iter().copied().filter(|&v| v > 0.0).collect();
        if positive.is_empty() {
            0.0
        } else {
            positive.iter().sum::<f64>() / positive.len() as f64
        }
    }

    /// Fail with `ShapeMismatch` unless the reference covers `dims`
    pub fn check_dims(&self, dims: (usize, usize, usize)) -> QaResult<()> {
        let actual = match self {
            NoiseReference::Uniform(_) => return Ok(()),
            NoiseReference::PerVoxel { dims: own, levels } => {
                if levels.len() != own.0 * own.1 * own.2 {
                    return Err(QaError::InvalidInput(format!(
                        "noise reference holds {} levels for dims {:?}",
                        levels.len(),
                        own
                    )));
                }
                *own
            }
            NoiseReference::Slabs { dims: own, levels, slab_size } => {
                if *slab_size == 0 || levels.len() != own.2.div_ceil(*slab_size) {
                    return Err(QaError::InvalidInput(format!(
                        "noise reference holds {} slab levels for nz={} and slab size {}",
                        levels.len(),
                        own.2,
                        slab_size
                    )));
                }
                *own
            }
        };
        if actual != dims {
            return Err(QaError::ShapeMismatch {
                what: "noise reference",
                expected: dims,
                actual,
            });
        }
        Ok(())
    }
}

/// Estimate the noise reference for one acquisition
///
/// # Arguments
/// * `volume` - Source volume (the final frame is read for last-volume policies)
/// * `stats` - Temporal statistics over the signal frames
/// * `brain_mask` - Brain mask matching the volume's spatial dims
/// * `policy` - Estimation policy
///
/// # Errors
/// `UndefinedNoiseLevel` when no positive level can be derived,
/// `ShapeMismatch` when the mask or statistics do not match the volume.
pub fn estimate_noise(
    volume: &Volume4D,
    stats: &TemporalStats,
    brain_mask: &BrainMask,
    policy: &NoisePolicy,
) -> QaResult<NoiseReference> {
    let dims = volume.spatial_dims();
    brain_mask.check_dims(dims)?;
    if stats.dims != dims {
        return Err(QaError::ShapeMismatch {
            what: "temporal statistics",
            expected: dims,
            actual: stats.dims,
        });
    }

    match *policy {
        NoisePolicy::LastVolume => last_volume_noise(volume, brain_mask),
        NoisePolicy::LastVolumePooled => {
            let reference = last_volume_noise(volume, brain_mask)?;
            Ok(NoiseReference::Uniform(reference.summary_level()))
        }
        NoisePolicy::BackgroundRegion { threshold_fraction, slab_size } => match slab_size {
            None => background_noise(&stats.mean, &stats.std, threshold_fraction)
                .map(NoiseReference::Uniform)
                .ok_or_else(|| {
                    QaError::UndefinedNoiseLevel(
                        "no background voxels and temporal std is degenerate".into(),
                    )
                }),
            Some(slab) => background_noise_slabs(stats, threshold_fraction, slab),
        },
    }
}

/// Per-voxel |noise| from the final frame, zero outside the brain mask
fn last_volume_noise(volume: &Volume4D, brain_mask: &BrainMask) -> QaResult<NoiseReference> {
    let noise_frame = volume.frame(volume.n_frames() - 1);
    let levels: Vec<f64> = noise_frame
        .iter()
        .zip(brain_mask.data().iter())
        .map(|(&v, &m)| if m != 0 && v.is_finite() { v.abs() } else { 0.0 })
        .collect();

    let informative = levels.iter().filter(|&&v| v > 0.0).count();
    if informative == 0 {
        return Err(QaError::UndefinedNoiseLevel(format!(
            "noise frame is zero across all {} brain voxels",
            brain_mask.count()
        )));
    }
    debug!(informative, brain_voxels = brain_mask.count(), "last-volume noise estimated");

    Ok(NoiseReference::PerVoxel { levels, dims: volume.spatial_dims() })
}

/// Background median std over one region, with the whole-region fallback
///
/// Returns None when no positive level can be derived.
fn background_noise(mean: &[f64], std: &[f64], threshold_fraction: f64) -> Option<f64> {
    let background = mask_below_fraction(mean, threshold_fraction);
    let background_std: Vec<f64> = std
        .iter()
        .zip(background.iter())
        .filter(|(_, m)| **m != 0)
        .map(|(&s, _)| s)
        .collect();

    if let Some(level) = median(&background_std).filter(|&v| v > 0.0) {
        return Some(level);
    }

    // No background, or a background with zero temporal variation
    let fallback = median(std).map(|m| BACKGROUND_FALLBACK_SCALE * m)?;
    if fallback > 0.0 {
        debug!(background_voxels = background_std.len(), fallback, "background noise fallback");
        Some(fallback)
    } else {
        None
    }
}

fn background_noise_slabs(
    stats: &TemporalStats,
    threshold_fraction: f64,
    slab_size: usize,
) -> QaResult<NoiseReference> {
    if slab_size == 0 {
        return Err(QaError::InvalidInput("noise slab size must be >= 1".into()));
    }
    let (nx, ny, nz) = stats.dims;
    let slice_len = nx * ny;

    let mut levels = Vec::with_capacity(nz.div_ceil(slab_size));
    let mut z_start = 0;
    while z_start < nz {
        let z_end = (z_start + slab_size).min(nz);
        let range = z_start * slice_len..z_end * slice_len;
        let level = background_noise(&stats.mean[range.clone()], &stats.std[range], threshold_fraction);
        if level.is_none() {
            warn!(z_start, z_end, "no usable noise estimate for slab");
        }
        levels.push(level.unwrap_or(0.0));
        z_start = z_end;
    }

    if levels.iter().all(|&v| v <= 0.0) {
        return Err(QaError::UndefinedNoiseLevel(
            "no slab has background voxels or non-degenerate temporal std".into(),
        ));
    }

    Ok(NoiseReference::Slabs { levels, slab_size, dims: stats.dims })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::temporal_stats;

    fn full_mask(dims: (usize, usize, usize)) -> BrainMask {
        BrainMask::new(vec![1; dims.0 * dims.1 * dims.2], dims).unwrap()
    }

    #[test]
    fn test_last_volume_abs_and_masked() {
        // 2x1x1, 3 frames; noise frame [-3, 4]
        let data = vec![10.0, 20.0, 12.0, 22.0, -3.0, 4.0];
        let vol = Volume4D::from_data(data, (2, 1, 1, 3)).unwrap();
        let stats = temporal_stats(&vol, 0..2).unwrap();
        let mask = BrainMask::new(vec![1, 0], (2, 1, 1)).unwrap();

        let noise = estimate_noise(&vol, &stats, &mask, &NoisePolicy::LastVolume).unwrap();
        assert_eq!(noise.level_at(0), 3.0);
        assert_eq!(noise.level_at(1), 0.0);
        assert_eq!(noise.summary_level(), 3.0);
    }

    #[test]
    fn test_last_volume_nan_is_zero() {
        let data = vec![10.0, 20.0, 12.0, 22.0, f64::NAN, 2.0];
        let vol = Volume4D::from_data(data, (2, 1, 1, 3)).unwrap();
        let stats = temporal_stats(&vol, 0..2).unwrap();
        let noise =
            estimate_noise(&vol, &stats, &full_mask((2, 1, 1)), &NoisePolicy::LastVolume).unwrap();
        assert_eq!(noise.level_at(0), 0.0);
        assert_eq!(noise.level_at(1), 2.0);
    }

    #[test]
    fn test_last_volume_all_zero_is_undefined() {
        let data = vec![10.0, 20.0, 12.0, 22.0, 0.0, 0.0];
        let vol = Volume4D::from_data(data, (2, 1, 1, 3)).unwrap();
        let stats = temporal_stats(&vol, 0..2).unwrap();
        let result = estimate_noise(&vol, &stats, &full_mask((2, 1, 1)), &NoisePolicy::LastVolume);
        assert!(matches!(result, Err(QaError::UndefinedNoiseLevel(_))));
    }

    #[test]
    fn test_last_volume_pooled() {
        let data = vec![10.0, 20.0, 12.0, 22.0, 2.0, -4.0];
        let vol = Volume4D::from_data(data, (2, 1, 1, 3)).unwrap();
        let stats = temporal_stats(&vol, 0..2).unwrap();
        let noise = estimate_noise(
            &vol, &stats, &full_mask((2, 1, 1)), &NoisePolicy::LastVolumePooled,
        ).unwrap();
        assert_eq!(noise, NoiseReference::Uniform(3.0));
    }

    #[test]
    fn test_background_median_std() {
        let mean = [0.0, 0.0, 0.0, 100.0];
        let std = [1.0, 2.0, 3.0, 50.0];
        assert_eq!(background_noise(&mean, &std, 0.05), Some(2.0));
    }

    #[test]
    fn test_background_fallback_without_background() {
        let mean = [100.0, 100.0, 100.0, 100.0];
        let std = [1.0, 2.0, 3.0, 4.0];
        let level = background_noise(&mean, &std, 0.05).unwrap();
        assert!((level - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_background_degenerate_is_none() {
        let mean = [100.0; 4];
        let std = [0.0; 4];
        assert_eq!(background_noise(&mean, &std, 0.05), None);
    }

    #[test]
    fn test_background_policy_constant_volume_is_undefined() {
        let vol = Volume4D::from_data(vec![10.0; 8 * 3], (2, 2, 2, 3)).unwrap();
        let stats = temporal_stats(&vol, 0..3).unwrap();
        let result = estimate_noise(&vol, &stats, &full_mask((2, 2, 2)), &NoisePolicy::background());
        assert!(matches!(result, Err(QaError::UndefinedNoiseLevel(_))));
    }

    #[test]
    fn test_background_slabs() {
        // 2x1x3 grid; slab 0 = z 0..2, slab 1 = z 2
        let stats = TemporalStats {
            mean: vec![0.0, 100.0, 0.0, 100.0, 50.0, 50.0],
            std: vec![2.0, 9.0, 4.0, 9.0, 5.0, 5.0],
            dims: (2, 1, 3),
            n_frames: 4,
        };
        let noise = background_noise_slabs(&stats, 0.05, 2).unwrap();
        match &noise {
            NoiseReference::Slabs { levels, slab_size, .. } => {
                assert_eq!(*slab_size, 2);
                assert_eq!(levels.len(), 2);
                assert_eq!(levels[0], 3.0);
                // Slab 1 has no background: 0.1 * median(5, 5)
                assert!((levels[1] - 0.5).abs() < 1e-12);
            }
            other => panic!("unexpected reference {:?}", other),
        }
        assert_eq!(noise.level_at(1), 3.0);
        assert!((noise.level_at(4) - 0.5).abs() < 1e-12);
        assert!(noise.check_dims((2, 1, 3)).is_ok());
    }

    #[test]
    fn test_reference_shape_mismatch() {
        let noise = NoiseReference::PerVoxel { levels: vec![1.0; 8], dims: (2, 2, 2) };
        assert!(matches!(
            noise.check_dims((2, 2, 3)),
            Err(QaError::ShapeMismatch { .. })
        ));
        assert!(NoiseReference::Uniform(1.0).check_dims((9, 9, 9)).is_ok());
    }

    #[test]
    fn test_policy_labels() {
        assert!(NoisePolicy::LastVolume.uses_noise_frame());
        assert!(!NoisePolicy::background().uses_noise_frame());
        assert_eq!(NoisePolicy::LastVolumePooled.label(), "last_volume_pooled");
    }
}
