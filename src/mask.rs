//! Brain mask estimation
//!
//! A foreground mask is either supplied by the caller or derived from the
//! temporal mean image as `mean > fraction * max(mean)`. Masks use the same
//! Fortran ordering as volumes: index = x + y*nx + z*nx*ny.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QaError, QaResult};
use crate::utils::threshold::mask_above_fraction;

/// Default fraction of the maximum mean intensity for the brain mask
pub const DEFAULT_MASK_THRESHOLD: f64 = 0.05;

/// Binary (x, y, z) mask, 1 = inside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrainMask {
    data: Vec<u8>,
    dims: (usize, usize, usize),
}

/// Where the mask used for a computation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSource {
    /// Supplied by the caller and used verbatim
    External,
    /// Derived from the temporal mean by fraction-of-max thresholding
    Heuristic,
}

impl BrainMask {
    /// Build a mask from a binary buffer
    ///
    /// Any nonzero entry counts as inside.
    pub fn new(data: Vec<u8>, dims: (usize, usize, usize)) -> QaResult<Self> {
        let expected = dims.0 * dims.1 * dims.2;
        if data.len() != expected {
            return Err(QaError::InvalidInput(format!(
                "mask buffer holds {} voxels, dims {:?} need {}",
                data.len(),
                dims,
                expected
            )));
        }
        let data = data.into_iter().map(|v| u8::from(v != 0)).collect();
        Ok(Self { data, dims })
    }

    /// Build a mask from real-valued voxels, inside where `value > 0`
    pub fn from_values(values: &[f64], dims: (usize, usize, usize)) -> QaResult<Self> {
        Self::new(values.iter().map(|&v| u8::from(v > 0.0)).collect(), dims)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    /// Number of voxels inside the mask
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Fail with `ShapeMismatch` unless the mask matches `dims`
    pub fn check_dims(&self, dims: (usize, usize, usize)) -> QaResult<()> {
        if self.dims != dims {
            return Err(QaError::ShapeMismatch {
                what: "brain mask",
                expected: dims,
                actual: self.dims,
            });
        }
        Ok(())
    }

    /// Mask as 0.0 / 1.0 values, for map export
    pub fn to_f64(&self) -> Vec<f64> {
        self.data.iter().map(|&m| m as f64).collect()
    }
}

/// Estimate a brain mask from the temporal mean image
///
/// # Arguments
/// * `temporal_mean` - Temporal mean image (nx * ny * nz)
/// * `dims` - Spatial dimensions
/// * `threshold_fraction` - Fraction of the maximum mean (default 0.05)
///
/// # Returns
/// Mask of voxels with `mean > threshold_fraction * max(mean)`. An image
/// whose maximum is zero yields an all-false mask.
pub fn estimate_brain_mask(
    temporal_mean: &[f64],
    dims: (usize, usize, usize),
    threshold_fraction: f64,
) -> QaResult<BrainMask> {
    let mask = BrainMask::new(mask_above_fraction(temporal_mean, threshold_fraction), dims)?;
    debug!(voxels = mask.count(), threshold_fraction, "estimated brain mask");
    Ok(mask)
}

/// Use the caller's mask when given, otherwise estimate one
///
/// # Errors
/// `ShapeMismatch` if the supplied mask does not match `dims`. The supplied
/// mask is never cropped or broadcast.
pub fn resolve_brain_mask(
    temporal_mean: &[f64],
    dims: (usize, usize, usize),
    external: Option<&BrainMask>,
    threshold_fraction: f64,
) -> QaResult<(BrainMask, MaskSource)> {
    match external {
        Some(mask) => {
            mask.check_dims(dims)?;
            Ok((mask.clone(), MaskSource::External))
        }
        None => Ok((
            estimate_brain_mask(temporal_mean, dims, threshold_fraction)?,
            MaskSource::Heuristic,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_threshold() {
        // max 100 -> threshold 5
        let mean = [0.0, 4.0, 5.0, 6.0, 100.0, 50.0, 1.0, 0.0];
        let mask = estimate_brain_mask(&mean, (2, 2, 2), 0.05).unwrap();
        assert_eq!(mask.data(), &[0, 0, 0, 1, 1, 1, 0, 0]);
        assert_eq!(mask.count(), 3);
    }

    #[test]
    fn test_estimate_all_zero_is_empty() {
        let mask = estimate_brain_mask(&[0.0; 8], (2, 2, 2), 0.05).unwrap();
        assert!(mask.is_empty());
    }

    #[test]
    fn test_resolve_prefers_external() {
        let mean = [10.0; 8];
        let external = BrainMask::new(vec![1, 0, 0, 0, 0, 0, 0, 0], (2, 2, 2)).unwrap();
        let (mask, source) = resolve_brain_mask(&mean, (2, 2, 2), Some(&external), 0.05).unwrap();
        assert_eq!(source, MaskSource::External);
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn test_resolve_shape_mismatch() {
        let mean = [10.0; 8];
        let external = BrainMask::new(vec![1; 12], (2, 2, 3)).unwrap();
        let result = resolve_brain_mask(&mean, (2, 2, 2), Some(&external), 0.05);
        assert!(matches!(result, Err(QaError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_resolve_heuristic() {
        let mean = [10.0; 8];
        let (mask, source) = resolve_brain_mask(&mean, (2, 2, 2), None, 0.05).unwrap();
        assert_eq!(source, MaskSource::Heuristic);
        assert_eq!(mask.count(), 8);
    }

    #[test]
    fn test_new_binarizes() {
        let mask = BrainMask::new(vec![0, 2, 255, 1], (2, 2, 1)).unwrap();
        assert_eq!(mask.data(), &[0, 1, 1, 1]);
        let mask = BrainMask::from_values(&[0.0, 0.5, -1.0, 3.0], (2, 2, 1)).unwrap();
        assert_eq!(mask.data(), &[0, 1, 0, 1]);
    }

    #[test]
    fn test_new_length_mismatch() {
        assert!(matches!(
            BrainMask::new(vec![1; 3], (2, 2, 1)),
            Err(QaError::InvalidInput(_))
        ));
    }
}
