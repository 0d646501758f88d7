//! Voxel statistics
//!
//! - `temporal`: temporal mean / std, direct and z-chunked
//! - `reduce`: masked scalar reductions (mean of nonzero entries, median)

pub mod temporal;
pub mod reduce;

pub use temporal::*;
pub use reduce::*;
