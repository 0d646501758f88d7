//! Fraction-of-maximum thresholding
//!
//! Foreground/background partitions used by the brain mask and the
//! background-noise estimator are both defined relative to the maximum of
//! the temporal mean image.

use crate::stats::max_finite;

/// Binary mask of voxels strictly above `fraction * max(data)`
///
/// A non-positive maximum (for example an all-zero image) yields an
/// all-zero mask rather than selecting everything.
///
/// # Arguments
/// * `data` - Input image (e.g. flattened temporal mean)
/// * `fraction` - Fraction of the maximum, typically 0.05
///
/// # Returns
/// Flattened binary mask (1 = above threshold)
pub fn mask_above_fraction(data: &[f64], fraction: f64) -> Vec<u8> {
    match max_finite(data) {
        Some(max) if max > 0.0 => {
            let threshold = fraction * max;
            data.iter().map(|&v| u8::from(v > threshold)).collect()
        }
        _ => vec![0u8; data.len()],
    }
}

/// Binary mask of voxels strictly below `fraction * max(data)`
///
/// Used to select background (air) voxels. With a non-positive or missing
/// maximum no voxel is treated as background.
pub fn mask_below_fraction(data: &[f64], fraction: f64) -> Vec<u8> {
    match max_finite(data) {
        Some(max) if max > 0.0 => {
            let threshold = fraction * max;
            data.iter().map(|&v| u8::from(v < threshold)).collect()
        }
        _ => vec![0u8; data.len()],
    }
}
