//! Scalar reductions over maps
//!
//! The SNR reductions average ratios over the nonzero entries of a map,
//! restricted to a mask when one is given. A mask that selects no voxels is
//! reported as `NoValidVoxels`; a domain whose entries are all zero reduces
//! to exactly 0.

use crate::error::{QaError, QaResult};

/// Mean of the finite nonzero entries of `map`, optionally restricted to `mask`
///
/// # Arguments
/// * `map` - Voxel values
/// * `mask` - Optional binary mask of the same length (nonzero = include)
/// * `what` - Label used in the error message
///
/// # Returns
/// Mean over nonzero in-mask entries, or 0.0 if every in-mask entry is zero
///
/// # Errors
/// `NoValidVoxels` if the mask selects nothing, `InvalidInput` if the
/// mask length differs from the map.
pub fn mean_nonzero(map: &[f64], mask: Option<&[u8]>, what: &str) -> QaResult<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    match mask {
        Some(mask) => {
            check_len(map, mask)?;
            let mut selected = 0usize;
            for (&v, &m) in map.iter().zip(mask.iter()) {
                if m == 0 {
                    continue;
                }
                selected += 1;
                if v != 0.0 && v.is_finite() {
                    sum += v;
                    count += 1;
                }
            }
            if selected == 0 {
                return Err(QaError::NoValidVoxels(format!("{}: mask selects no voxels", what)));
            }
        }
        None => {
            if map.is_empty() {
                return Err(QaError::NoValidVoxels(format!("{}: empty map", what)));
            }
            for &v in map {
                if v != 0.0 && v.is_finite() {
                    sum += v;
                    count += 1;
                }
            }
        }
    }
    if count == 0 {
        return Ok(0.0);
    }
    Ok(sum / count as f64)
}

/// Mean and population standard deviation of the finite entries selected by `mask`
///
/// # Errors
/// `NoValidVoxels` if the mask selects no finite entry.
pub fn masked_mean_std(values: &[f64], mask: &[u8], what: &str) -> QaResult<(f64, f64)> {
    check_len(values, mask)?;
    let selected: Vec<f64> = values
        .iter()
        .zip(mask.iter())
        .filter(|(v, m)| **m != 0 && v.is_finite())
        .map(|(&v, _)| v)
        .collect();
    if selected.is_empty() {
        return Err(QaError::NoValidVoxels(format!("{}: mask selects no voxels", what)));
    }
    let n = selected.len() as f64;
    let mean = selected.iter().sum::<f64>() / n;
    let var = selected.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Ok((mean, var.sqrt()))
}

/// Mean of the finite entries, None if there are none
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), &v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    Some(sum / count as f64)
}

/// Median of a set of values (average of the two middle values for even counts)
///
/// Non-finite values are ignored. Returns None if nothing finite remains.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Maximum finite value, None if there is none
pub fn max_finite(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

fn check_len(values: &[f64], mask: &[u8]) -> QaResult<()> {
    if values.len() != mask.len() {
        return Err(QaError::InvalidInput(format!(
            "mask length {} does not match map length {}",
            mask.len(),
            values.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_nonzero_skips_zeros() {
        let map = [0.0, 2.0, 4.0, 0.0];
        assert_eq!(mean_nonzero(&map, None, "t").unwrap(), 3.0);
    }

    #[test]
    fn test_mean_nonzero_average_of_ratios_with_negatives() {
        let map = [-2.0, 4.0, 1.0];
        assert!((mean_nonzero(&map, None, "t").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_nonzero_masked() {
        let map = [1.0, 2.0, 3.0, 4.0];
        let mask = [1u8, 0, 1, 0];
        assert_eq!(mean_nonzero(&map, Some(&mask), "t").unwrap(), 2.0);
    }

    #[test]
    fn test_mean_nonzero_all_false_mask() {
        let map = [1.0, 2.0];
        let mask = [0u8, 0];
        let result = mean_nonzero(&map, Some(&mask), "tsnr");
        assert!(matches!(result, Err(QaError::NoValidVoxels(_))));
    }

    #[test]
    fn test_mean_nonzero_all_zero_map_is_zero() {
        let map = [0.0; 8];
        assert_eq!(mean_nonzero(&map, None, "t").unwrap(), 0.0);
        let mask = [1u8; 8];
        assert_eq!(mean_nonzero(&map, Some(&mask), "t").unwrap(), 0.0);
    }

    #[test]
    fn test_mean_nonzero_skips_non_finite() {
        let map = [f64::NAN, 2.0, f64::INFINITY, 4.0];
        assert_eq!(mean_nonzero(&map, None, "t").unwrap(), 3.0);
        let mask = [1u8, 1, 1, 0];
        assert_eq!(mean_nonzero(&map, Some(&mask), "t").unwrap(), 2.0);
        // Only non-finite entries selected
        let mask = [1u8, 0, 1, 0];
        assert_eq!(mean_nonzero(&map, Some(&mask), "t").unwrap(), 0.0);
    }

    #[test]
    fn test_mean_finite_only() {
        assert_eq!(mean(&[1.0, f64::NAN, 5.0]), Some(3.0));
        assert_eq!(mean(&[f64::NAN]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_mean_nonzero_length_mismatch() {
        let result = mean_nonzero(&[1.0, 2.0], Some(&[1u8]), "t");
        assert!(matches!(result, Err(QaError::InvalidInput(_))));
    }

    #[test]
    fn test_masked_mean_std() {
        let values = [2.0, 4.0, 100.0, 6.0];
        let mask = [1u8, 1, 0, 1];
        let (m, s) = masked_mean_std(&values, &mask, "ssn").unwrap();
        assert!((m - 4.0).abs() < 1e-12);
        assert!((s - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, 5.0]), Some(5.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_max_finite() {
        assert_eq!(max_finite(&[1.0, f64::INFINITY, 3.0, f64::NAN]), Some(3.0));
        assert_eq!(max_finite(&[f64::NAN]), None);
        assert_eq!(max_finite(&[-2.0, -1.0]), Some(-1.0));
    }
}
