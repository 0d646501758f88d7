//! Per-acquisition result record

use serde::{Deserialize, Serialize};

use crate::error::{QaError, QaErrorKind};
use crate::noise::NoisePolicy;

/// Terminal QA record for one acquisition
///
/// Optional fields serialize as `null` when a metric was not computed, which
/// keeps "undefined" distinct from a computed `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSummary {
    /// Opaque acquisition identifier supplied by the caller
    pub filename: String,
    pub tr: Option<f64>,
    pub ernst_factor: f64,
    pub tr_correction_applied: bool,
    /// (nx, ny, nz, nt)
    pub shape: Option<(usize, usize, usize, usize)>,
    pub voxel_size: Option<(f64, f64, f64)>,
    pub noise_policy: String,
    /// Mean iSNR over the brain mask
    pub isnr: Option<f64>,
    /// Representative noise level used for iSNR
    pub noise_value: Option<f64>,
    /// Mean tSNR over all nonzero voxels
    pub tsnr: Option<f64>,
    /// Mean tSNR over the supplied mask; `None` without one
    pub masked_tsnr: Option<f64>,
    pub tsnr_per_unit_time: Option<f64>,
    /// `tsnr * ernst_factor`; `None` when no TR correction is applied
    pub ernst_scaled_tsnr: Option<f64>,
    /// `isnr * ernst_factor`; `None` when no TR correction is applied
    pub ernst_scaled_isnr: Option<f64>,
    pub brain_voxels: Option<usize>,
    pub mean_intensity: Option<f64>,
    /// Spatial SNR of the temporal mean over the brain mask
    pub ssn: Option<f64>,
    /// Mean of the static spatial noise image (even minus odd frame sums)
    pub mean_static_spatial_noise: Option<f64>,
    pub roi_tsnr: Option<f64>,
    pub processing_successful: bool,
    pub error: Option<String>,
    pub error_kind: Option<QaErrorKind>,
}

impl QaSummary {
    /// Empty successful record for `filename`; metric fields start undefined
    pub fn new(filename: impl Into<String>, policy: &NoisePolicy) -> Self {
        Self {
            filename: filename.into(),
            tr: None,
            ernst_factor: 1.0,
            tr_correction_applied: false,
            shape: None,
            voxel_size: None,
            noise_policy: policy.label().to_string(),
            isnr: None,
            noise_value: None,
            tsnr: None,
            masked_tsnr: None,
            tsnr_per_unit_time: None,
            ernst_scaled_tsnr: None,
            ernst_scaled_isnr: None,
            brain_voxels: None,
            mean_intensity: None,
            ssn: None,
            mean_static_spatial_noise: None,
            roi_tsnr: None,
            processing_successful: true,
            error: None,
            error_kind: None,
        }
    }

    /// Record for an acquisition whose processing failed
    pub fn failed(filename: impl Into<String>, policy: &NoisePolicy, err: &QaError) -> Self {
        let mut summary = Self::new(filename, policy);
        summary.mark_failed(err);
        summary
    }

    /// Flag the record as failed, keeping metadata already filled in
    ///
    /// Metrics are cleared so that a failed record never carries a partial result.
    pub fn mark_failed(&mut self, err: &QaError) {
        self.isnr = None;
        self.noise_value = None;
        self.tsnr = None;
        self.masked_tsnr = None;
        self.tsnr_per_unit_time = None;
        self.ernst_scaled_tsnr = None;
        self.ernst_scaled_isnr = None;
        self.brain_voxels = None;
        self.mean_intensity = None;
        self.ssn = None;
        self.mean_static_spatial_noise = None;
        self.roi_tsnr = None;
        self.processing_successful = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_record() {
        let err = QaError::NoValidVoxels("brain mask selects nothing".into());
        let summary = QaSummary::failed("sub-01_bold", &NoisePolicy::LastVolume, &err);
        assert!(!summary.processing_successful);
        assert_eq!(summary.error_kind, Some(QaErrorKind::NoValidVoxels));
        assert!(summary.error.unwrap().contains("brain mask"));
        assert_eq!(summary.tsnr, None);
    }

    #[test]
    fn test_undefined_serializes_as_null() {
        let mut summary = QaSummary::new("acq", &NoisePolicy::LastVolume);
        summary.tsnr = Some(0.0);
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert!(value["tsnr_per_unit_time"].is_null());
        assert_eq!(value["tsnr"], serde_json::json!(0.0));
        assert_eq!(value["noise_policy"], "last_volume");
        for key in [
            "filename", "tr", "ernst_factor", "shape", "voxel_size", "isnr", "noise_value",
            "tsnr", "masked_tsnr", "tsnr_per_unit_time", "ernst_scaled_tsnr",
            "ernst_scaled_isnr", "mean_static_spatial_noise", "processing_successful", "error",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_mark_failed_keeps_metadata() {
        let mut summary = QaSummary::new("acq", &NoisePolicy::background());
        summary.shape = Some((4, 4, 2, 6));
        summary.tsnr = Some(12.0);
        summary.ernst_scaled_tsnr = Some(8.5);
        summary.mean_static_spatial_noise = Some(40.0);
        summary.mark_failed(&QaError::UndefinedNoiseLevel("zero".into()));
        assert_eq!(summary.shape, Some((4, 4, 2, 6)));
        assert_eq!(summary.tsnr, None);
        assert_eq!(summary.ernst_scaled_tsnr, None);
        assert_eq!(summary.mean_static_spatial_noise, None);
        assert_eq!(summary.noise_policy, "background_region");
    }
}
