//! 4D acquisition container
//!
//! Data is stored as a flat buffer in NIfTI (Fortran) order so that
//! `index = x + y*nx + z*nx*ny + t*nx*ny*nz`, matching the layout the
//! NIfTI loader produces.

use std::ops::Range;

use crate::error::{QaError, QaResult};

/// Identity affine with unit voxel scaling (row-major 4x4)
pub const IDENTITY_AFFINE: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Immutable 4D intensity volume with its spatial metadata
#[derive(Debug, Clone)]
pub struct Volume4D {
    data: Vec<f64>,
    dims: (usize, usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: [f64; 16],
}

impl Volume4D {
    /// Build a volume, validating the buffer length and dimensions
    ///
    /// # Arguments
    /// * `data` - Flattened intensities (nx * ny * nz * nt), Fortran order
    /// * `dims` - (nx, ny, nz, nt)
    /// * `voxel_size` - Voxel sizes in mm
    /// * `affine` - Spatial affine (4x4, row-major)
    ///
    /// # Errors
    /// `InvalidInput` for a zero dimension or wrong buffer length,
    /// `DegenerateVolume` when fewer than two time points are present.
    pub fn new(
        data: Vec<f64>,
        dims: (usize, usize, usize, usize),
        voxel_size: (f64, f64, f64),
        affine: [f64; 16],
    ) -> QaResult<Self> {
        let (nx, ny, nz, nt) = dims;
        if nx == 0 || ny == 0 || nz == 0 || nt == 0 {
            return Err(QaError::InvalidInput(format!(
                "all dimensions must be >= 1, got {:?}",
                dims
            )));
        }
        let expected = nx * ny * nz * nt;
        if data.len() != expected {
            return Err(QaError::InvalidInput(format!(
                "buffer holds {} samples, dims {:?} need {}",
                data.len(),
                dims,
                expected
            )));
        }
        if nt < 2 {
            return Err(QaError::DegenerateVolume(format!(
                "temporal statistics need at least 2 time points, got {}",
                nt
            )));
        }
        Ok(Self { data, dims, voxel_size, affine })
    }

    /// Volume with an identity affine and 1 mm isotropic voxels
    pub fn from_data(data: Vec<f64>, dims: (usize, usize, usize, usize)) -> QaResult<Self> {
        Self::new(data, dims, (1.0, 1.0, 1.0), IDENTITY_AFFINE)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn dims(&self) -> (usize, usize, usize, usize) {
        self.dims
    }

    /// Spatial dimensions (nx, ny, nz)
    pub fn spatial_dims(&self) -> (usize, usize, usize) {
        (self.dims.0, self.dims.1, self.dims.2)
    }

    /// Voxels per frame
    pub fn n_voxels(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    pub fn n_frames(&self) -> usize {
        self.dims.3
    }

    pub fn voxel_size(&self) -> (f64, f64, f64) {
        self.voxel_size
    }

    pub fn affine(&self) -> &[f64; 16] {
        &self.affine
    }

    /// Borrow one 3D frame
    pub fn frame(&self, t: usize) -> &[f64] {
        let n = self.n_voxels();
        &self.data[t * n..(t + 1) * n]
    }

    /// Sample at (x, y, z, t)
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize, t: usize) -> f64 {
        let (nx, ny, nz, _) = self.dims;
        self.data[x + y * nx + z * nx * ny + t * nx * ny * nz]
    }

    /// True when every sample is exactly zero
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Check that a frame range lies inside the volume and holds at least two frames
    pub fn check_frames(&self, frames: &Range<usize>) -> QaResult<()> {
        if frames.end > self.n_frames() || frames.start >= frames.end {
            return Err(QaError::InvalidInput(format!(
                "frame range {:?} outside 0..{}",
                frames,
                self.n_frames()
            )));
        }
        if frames.len() < 2 {
            return Err(QaError::DegenerateVolume(format!(
                "frame range {:?} leaves {} time point(s), need at least 2",
                frames,
                frames.len()
            )));
        }
        Ok(())
    }
}

/// Flat index of (x, y, z) in a 3D volume
#[inline]
pub fn voxel_index(x: usize, y: usize, z: usize, nx: usize, ny: usize) -> usize {
    x + y * nx + z * nx * ny
}
