//! fMRI-QA-Core: image quality metrics for 4D fMRI acquisitions
//!
//! This crate computes temporal SNR, image SNR and derived summaries from a
//! decoded 4D intensity array.
//!
//! # Modules
//! - `volume`: 4D volume container (Fortran-ordered flat buffer)
//! - `stats`: Voxel-wise temporal mean/std (direct and z-chunked) and reductions
//! - `mask`: Brain mask estimation and external mask validation
//! - `noise`: Noise reference estimation (last volume, background region)
//! - `snr`: tSNR, iSNR, spatial SNR and patch ROI analysis
//! - `scaling`: Ernst factor lookup and tSNR per unit time
//! - `summary`: Per-acquisition result record
//! - `pipeline`: Per-acquisition orchestration
//! - `config`: Pipeline configuration (YAML)
//! - `nifti_io`: NIfTI and JSON sidecar I/O

// Core modules
pub mod error;
pub mod volume;
pub mod stats;
pub mod utils;

// Metric modules
pub mod mask;
pub mod noise;
pub mod snr;
pub mod scaling;

// Orchestration
pub mod config;
pub mod summary;
pub mod pipeline;

// I/O modules
pub mod nifti_io;

pub use config::QaConfig;
pub use error::{QaError, QaErrorKind, QaResult};
pub use pipeline::{run_acquisition, run_qa, QaOutcome};
pub use summary::QaSummary;
pub use volume::Volume4D;
