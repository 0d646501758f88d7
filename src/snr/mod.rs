//! SNR maps and their reductions
//!
//! - `tsnr`: temporal SNR (mean / std)
//! - `isnr`: image SNR (mean / noise level)
//! - `spatial`: spatial SNR, intensity summaries and static spatial noise
//! - `roi`: patch ROI tSNR and time courses

pub mod tsnr;
pub mod isnr;
pub mod spatial;
pub mod roi;

pub use tsnr::*;
pub use isnr::*;
pub use spatial::*;
pub use roi::*;

/// A 3D ratio map with the affine of the volume it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct SnrMap {
    /// Voxel values (nx * ny * nz), Fortran order
    pub data: Vec<f64>,
    /// Spatial dimensions
    pub dims: (usize, usize, usize),
    /// Affine of the source volume (4x4, row-major)
    pub affine: [f64; 16],
}

impl SnrMap {
    pub fn new(data: Vec<f64>, dims: (usize, usize, usize), affine: [f64; 16]) -> Self {
        Self { data, dims, affine }
    }

    /// Copy of the map with every voxel multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> SnrMap {
        SnrMap {
            data: self.data.iter().map(|&v| v * factor).collect(),
            dims: self.dims,
            affine: self.affine,
        }
    }

    /// True when every entry is finite
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::IDENTITY_AFFINE;

    #[test]
    fn test_scaled_keeps_zeros() {
        let map = SnrMap::new(vec![0.0, 2.0, -4.0], (3, 1, 1), IDENTITY_AFFINE);
        let scaled = map.scaled(0.5);
        assert_eq!(scaled.data, vec![0.0, 1.0, -2.0]);
        assert_eq!(scaled.dims, map.dims);
        assert!(scaled.is_finite());
    }
}
