use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fmri_qa_core::config::{load_config, QaConfig};
use fmri_qa_core::error::QaResult;
use fmri_qa_core::mask::BrainMask;
use fmri_qa_core::nifti_io::{
    image_stem, read_mask, read_sidecar_tr, read_volume, sidecar_path, write_map, write_mask,
};
use fmri_qa_core::noise::NoisePolicy;
use fmri_qa_core::pipeline::{run_acquisition, QaOutcome};
use fmri_qa_core::summary::QaSummary;

#[derive(Parser)]
#[command(name = "fmri-qa")]
#[command(version, about = "tSNR / iSNR quality metrics for fMRI acquisitions", long_about = None)]
struct Cli {
    /// 4D NIfTI acquisitions (.nii or .nii.gz)
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory; one subdirectory per acquisition
    #[arg(short, long, value_name = "DIR", default_value = "qa_output")]
    out: PathBuf,

    /// Brain mask applied to every input (must match its grid)
    #[arg(short, long, value_name = "FILE")]
    mask: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Repetition time in seconds, overriding sidecars and config
    #[arg(long, value_name = "SECONDS")]
    tr: Option<f64>,

    /// Noise estimation policy, overriding the config
    #[arg(long, value_enum)]
    noise: Option<NoiseArg>,

    /// Only write JSON summaries
    #[arg(long)]
    no_maps: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum NoiseArg {
    LastVolume,
    LastVolumePooled,
    Background,
}

impl NoiseArg {
    fn policy(self) -> NoisePolicy {
        match self {
            NoiseArg::LastVolume => NoisePolicy::LastVolume,
            NoiseArg::LastVolumePooled => NoisePolicy::LastVolumePooled,
            NoiseArg::Background => NoisePolicy::background(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(failed) => {
            if failed > 0 {
                warn!(failed, total = cli.inputs.len(), "some acquisitions failed");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "batch aborted");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> QaResult<usize> {
    let handle = load_config(cli.config.as_deref())?;
    for warning in &handle.warnings {
        warn!("{}", warning);
    }
    let mut config = handle.config;
    if let Some(noise) = cli.noise {
        config.noise_policy = noise.policy();
    }
    if cli.tr.is_some() {
        config.tr_override = cli.tr;
    }

    let mask = cli.mask.as_deref().map(read_mask).transpose()?;
    fs::create_dir_all(&cli.out)?;

    let mut summaries = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let summary = process_input(input, mask.as_ref(), &config, cli)?;
        summaries.push(summary);
    }

    let failed = summaries.iter().filter(|s| !s.processing_successful).count();
    let batch_path = cli.out.join("batch_summary.json");
    write_json(&batch_path, &summaries)?;
    info!(path = %batch_path.display(), total = summaries.len(), failed, "batch summary written");
    Ok(failed)
}

/// Run one input; acquisition failures are recorded, output I/O errors abort
fn process_input(
    input: &Path,
    mask: Option<&BrainMask>,
    config: &QaConfig,
    cli: &Cli,
) -> QaResult<QaSummary> {
    let id = image_stem(input);
    let out_dir = cli.out.join(&id);
    fs::create_dir_all(&out_dir)?;

    let loaded = read_volume(input).and_then(|volume| {
        let tr = match config.tr_override {
            Some(tr) => Some(tr),
            None => read_sidecar_tr(&sidecar_path(input))?,
        };
        Ok((volume, tr))
    });

    let summary = match loaded {
        Ok((volume, tr)) => {
            let (summary, outcome) = run_acquisition(&id, &volume, mask, tr, config);
            if let (Some(outcome), false) = (outcome, cli.no_maps) {
                write_outputs(&out_dir, &outcome, volume.voxel_size(), volume.affine())?;
            }
            summary
        }
        Err(err) => {
            warn!(input = %input.display(), error = %err, "could not load acquisition");
            QaSummary::failed(&id, &config.noise_policy, &err)
        }
    };

    write_json(&out_dir.join("qa_summary.json"), &summary)?;
    Ok(summary)
}

fn write_outputs(
    out_dir: &Path,
    outcome: &QaOutcome,
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> QaResult<()> {
    let maps = &outcome.maps;
    write_map(&out_dir.join("tsnr.nii.gz"), &maps.tsnr, voxel_size)?;
    write_map(&out_dir.join("isnr.nii.gz"), &maps.isnr, voxel_size)?;
    write_map(&out_dir.join("mean.nii.gz"), &maps.mean, voxel_size)?;
    write_map(&out_dir.join("static_spatial_noise.nii.gz"), &maps.static_spatial_noise, voxel_size)?;
    write_mask(&out_dir.join("brain_mask.nii.gz"), &maps.brain_mask, voxel_size, affine)?;
    if let Some(unit_time) = &maps.tsnr_unit_time {
        write_map(&out_dir.join("tsnr_unit_time.nii.gz"), unit_time, voxel_size)?;
    }
    if let Some(course) = &outcome.roi_timecourse {
        let value = serde_json::json!({
            "mean": course.mean,
            "std": course.std,
            "detrended_mean": course.detrended_mean,
            "detrended_std": course.detrended_std,
        });
        write_json(&out_dir.join("roi_timecourse.json"), &value)?;
    }
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> QaResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, text)?;
    Ok(())
}
