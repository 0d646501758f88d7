//! Acquisition timing corrections
//!
//! Maps the repetition time to a coarse Ernst-angle scaling factor and
//! normalizes tSNR by the square root of TR.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::snr::SnrMap;

/// Ernst factor used when no TR correction is applied
pub const NO_TR_FACTOR: f64 = 1.0;

/// (upper TR bound in seconds, factor), checked in order
const ERNST_BREAKPOINTS: [(f64, f64); 3] = [(0.7, 0.5745), (1.0, 0.7071), (1.5, 0.8155)];

/// Ernst scaling factor for a known TR in seconds
///
/// Step function: `<= 0.7 -> 0.5745`, `<= 1.0 -> 0.7071`, `<= 1.5 -> 0.8155`,
/// otherwise `1.0`.
pub fn ernst_factor(tr: f64) -> f64 {
    ERNST_BREAKPOINTS
        .iter()
        .find(|(bound, _)| tr <= *bound)
        .map(|&(_, factor)| factor)
        .unwrap_or(NO_TR_FACTOR)
}

/// Timing metadata for one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    /// Repetition time in seconds; `None` when unknown
    pub tr: Option<f64>,
    /// Voxel size in mm
    pub voxel_size: (f64, f64, f64),
}

/// Scaling derived from the repetition time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionScaling {
    /// TR actually used (finite and positive), if any
    pub tr: Option<f64>,
    pub ernst_factor: f64,
    /// False when TR was unknown and the factor defaulted to 1.0
    pub tr_correction_applied: bool,
}

impl AcquisitionScaling {
    /// Resolve scaling from an optional TR
    ///
    /// A TR that is not finite or not positive is treated as unknown.
    pub fn from_tr(tr: Option<f64>) -> Self {
        let tr = match tr {
            Some(value) if value.is_finite() && value > 0.0 => Some(value),
            Some(value) => {
                warn!(tr = value, "ignoring invalid repetition time");
                None
            }
            None => None,
        };
        match tr {
            Some(value) => Self {
                tr: Some(value),
                ernst_factor: ernst_factor(value),
                tr_correction_applied: true,
            },
            None => Self {
                tr: None,
                ernst_factor: NO_TR_FACTOR,
                tr_correction_applied: false,
            },
        }
    }

    /// `value * ernst_factor`; `None` when no TR correction is applied
    pub fn ernst_scaled(&self, value: f64) -> Option<f64> {
        self.tr_correction_applied.then(|| value * self.ernst_factor)
    }

    /// Mean tSNR divided by sqrt(TR); `None` without a usable TR
    pub fn tsnr_per_unit_time(&self, mean_tsnr: f64) -> Option<f64> {
        self.tr.map(|tr| tsnr_per_unit_time(mean_tsnr, tr))
    }

    /// tsnr / sqrt(TR) * ernst_factor per voxel; `None` without a usable TR
    pub fn tsnr_per_unit_time_map(&self, tsnr: &SnrMap) -> Option<SnrMap> {
        self.tr.map(|tr| tsnr.scaled(self.ernst_factor / tr.sqrt()))
    }
}

impl AcquisitionMetadata {
    pub fn new(tr: Option<f64>, voxel_size: (f64, f64, f64)) -> Self {
        Self { tr, voxel_size }
    }

    pub fn scaling(&self) -> AcquisitionScaling {
        AcquisitionScaling::from_tr(self.tr)
    }
}

/// mean_tsnr / sqrt(tr) for a positive TR
pub fn tsnr_per_unit_time(mean_tsnr: f64, tr: f64) -> f64 {
    mean_tsnr / tr.sqrt()
}
