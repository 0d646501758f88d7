//! Per-acquisition QA pipeline
//!
//! statistics -> brain mask -> noise -> {tSNR, iSNR} -> scaling -> summary
//!
//! Every stage is a pure function of the previous stage's outputs. The
//! pipeline is invoked once per acquisition; batching belongs to the caller.

use std::ops::Range;

use tracing::{debug, info, warn};

use crate::config::QaConfig;
use crate::error::{QaError, QaResult};
use crate::mask::{resolve_brain_mask, BrainMask, MaskSource};
use crate::noise::{estimate_noise, NoiseReference};
use crate::scaling::{AcquisitionMetadata, AcquisitionScaling};
use crate::snr::{
    compute_isnr, compute_tsnr, mean_intensity, mean_isnr, mean_tsnr, roi_mean, roi_timecourse,
    spatial_snr, static_spatial_noise, RoiTimecourse, SnrMap,
};
use crate::stats::{compute_temporal_stats, TemporalStats};
use crate::summary::QaSummary;
use crate::volume::Volume4D;

/// Maps produced for one acquisition, all on the source grid and affine
#[derive(Debug, Clone)]
pub struct QaMaps {
    pub tsnr: SnrMap,
    pub isnr: SnrMap,
    /// Temporal mean over the signal frames
    pub mean: SnrMap,
    /// tsnr / sqrt(TR) * ernst_factor, when TR is known
    pub tsnr_unit_time: Option<SnrMap>,
    /// Even minus odd frame sums over the signal frames
    pub static_spatial_noise: SnrMap,
    pub brain_mask: BrainMask,
    pub mask_source: MaskSource,
    pub noise: NoiseReference,
}

/// Everything computed for one successful acquisition
#[derive(Debug, Clone)]
pub struct QaOutcome {
    pub summary: QaSummary,
    pub maps: QaMaps,
    pub scaling: AcquisitionScaling,
    pub roi_timecourse: Option<RoiTimecourse>,
}

/// Frames entering the temporal statistics
///
/// The final frame is excluded when the noise policy reserves it.
pub fn signal_frames(volume: &Volume4D, config: &QaConfig) -> Range<usize> {
    let nt = volume.n_frames();
    if config.noise_policy.uses_noise_frame() {
        0..nt - 1
    } else {
        0..nt
    }
}

/// Run the full metric computation for one acquisition
///
/// # Arguments
/// * `id` - Opaque acquisition identifier copied into the summary
/// * `volume` - Source 4D volume
/// * `mask` - Optional external brain mask; estimated when absent
/// * `tr` - Repetition time in seconds, if known (`config.tr_override` wins)
/// * `config` - Pipeline parameters
///
/// # Errors
/// `DegenerateVolume`, `ShapeMismatch`, `NoValidVoxels` and
/// `UndefinedNoiseLevel` are returned to the caller unchanged.
pub fn run_qa(
    id: &str,
    volume: &Volume4D,
    mask: Option<&BrainMask>,
    tr: Option<f64>,
    config: &QaConfig,
) -> QaResult<QaOutcome> {
    let dims = volume.spatial_dims();
    let affine = volume.affine();
    info!(acquisition = id, dims = ?volume.dims(), policy = config.noise_policy.label(), "running QA");

    if volume.is_all_zero() {
        return Err(QaError::DegenerateVolume("every sample is zero".into()));
    }
    if let Some(mask) = mask {
        mask.check_dims(dims)?;
    }

    let frames = signal_frames(volume, config);
    let stats = compute_temporal_stats(volume, frames.clone(), config.chunk_size)?;
    debug!(acquisition = id, frames = ?frames, "temporal statistics done");

    let (brain_mask, mask_source) =
        resolve_brain_mask(&stats.mean, dims, mask, config.mask_threshold)?;
    if brain_mask.is_empty() {
        return Err(QaError::NoValidVoxels(format!(
            "{:?} brain mask selects no voxels",
            mask_source
        )));
    }
    debug!(acquisition = id, voxels = brain_mask.count(), source = ?mask_source, "brain mask");

    let noise = estimate_noise(volume, &stats, &brain_mask, &config.noise_policy)?;

    let (tsnr, isnr) = if config.parallel_maps {
        rayon::join(
            || compute_tsnr(&stats, affine),
            || compute_isnr(&stats.mean, dims, &noise, affine),
        )
    } else {
        (compute_tsnr(&stats, affine), compute_isnr(&stats.mean, dims, &noise, affine))
    };
    let (tsnr, isnr) = (tsnr?, isnr?);

    let scaling = metadata(volume, tr, config).scaling();
    if !scaling.tr_correction_applied {
        warn!(acquisition = id, "repetition time unknown; no TR correction applied");
    }

    let summary_tsnr = mean_tsnr(&tsnr.data, None)?;
    let masked_tsnr = match (mask_source, mask) {
        (MaskSource::External, Some(external)) => Some(mean_tsnr(&tsnr.data, Some(external.data()))?),
        _ => None,
    };
    let summary_isnr = mean_isnr(&isnr.data, Some(brain_mask.data()))?;
    let ssn = spatial_snr(&stats.mean, &brain_mask)?;
    let ssn_image = static_spatial_noise(volume, frames.clone())?;

    let (roi_tsnr, roi_course) = match &config.roi {
        Some(roi) => (
            Some(roi_mean(&tsnr.data, dims, roi)?),
            Some(roi_timecourse(volume, frames, roi)?),
        ),
        None => (None, None),
    };

    let mut summary = QaSummary::new(id, &config.noise_policy);
    fill_metadata(&mut summary, volume, &scaling);
    summary.isnr = Some(summary_isnr);
    summary.noise_value = Some(noise.summary_level());
    summary.tsnr = Some(summary_tsnr);
    summary.masked_tsnr = masked_tsnr;
    summary.tsnr_per_unit_time = scaling.tsnr_per_unit_time(summary_tsnr);
    summary.ernst_scaled_tsnr = scaling.ernst_scaled(summary_tsnr);
    summary.ernst_scaled_isnr = scaling.ernst_scaled(summary_isnr);
    summary.brain_voxels = Some(brain_mask.count());
    summary.mean_intensity = mean_intensity(&stats.mean);
    summary.ssn = Some(ssn);
    summary.mean_static_spatial_noise = mean_intensity(&ssn_image.data);
    summary.roi_tsnr = roi_tsnr;

    info!(
        acquisition = id,
        tsnr = summary_tsnr,
        isnr = summary_isnr,
        ernst_factor = scaling.ernst_factor,
        "QA complete"
    );

    let tsnr_unit_time = scaling.tsnr_per_unit_time_map(&tsnr);
    let mean = mean_map(&stats, affine);
    Ok(QaOutcome {
        summary,
        maps: QaMaps {
            tsnr,
            isnr,
            mean,
            tsnr_unit_time,
            static_spatial_noise: ssn_image,
            brain_mask,
            mask_source,
            noise,
        },
        scaling,
        roi_timecourse: roi_course,
    })
}

/// Run one acquisition and always return a summary
///
/// Errors are recorded in the summary (`processing_successful = false`)
/// instead of being returned; maps are only available on success.
pub fn run_acquisition(
    id: &str,
    volume: &Volume4D,
    mask: Option<&BrainMask>,
    tr: Option<f64>,
    config: &QaConfig,
) -> (QaSummary, Option<QaOutcome>) {
    match run_qa(id, volume, mask, tr, config) {
        Ok(outcome) => (outcome.summary.clone(), Some(outcome)),
        Err(err) => {
            warn!(acquisition = id, error = %err, "QA failed");
            let mut summary = QaSummary::new(id, &config.noise_policy);
            fill_metadata(&mut summary, volume, &metadata(volume, tr, config).scaling());
            summary.mark_failed(&err);
            (summary, None)
        }
    }
}

/// Acquisition metadata with the configured TR override applied
fn metadata(volume: &Volume4D, tr: Option<f64>, config: &QaConfig) -> AcquisitionMetadata {
    AcquisitionMetadata::new(config.tr_override.or(tr), volume.voxel_size())
}

fn fill_metadata(summary: &mut QaSummary, volume: &Volume4D, scaling: &AcquisitionScaling) {
    summary.tr = scaling.tr;
    summary.ernst_factor = scaling.ernst_factor;
    summary.tr_correction_applied = scaling.tr_correction_applied;
    summary.shape = Some(volume.dims());
    summary.voxel_size = Some(volume.voxel_size());
}

fn mean_map(stats: &TemporalStats, affine: &[f64; 16]) -> SnrMap {
    SnrMap::new(stats.mean.clone(), stats.dims, *affine)
}
