//! Utility functions for QA processing
//!
//! - Fraction-of-maximum thresholding
//! - Linear detrending of time courses

pub mod threshold;
pub mod detrend;

pub use threshold::*;
pub use detrend::*;
