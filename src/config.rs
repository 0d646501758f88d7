//! Pipeline configuration
//!
//! `QaConfig` is passed explicitly into the pipeline entry point. It can be
//! loaded from a YAML file; values out of range are reset and reported as
//! warnings on the returned handle.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QaError, QaResult};
use crate::mask::DEFAULT_MASK_THRESHOLD;
use crate::noise::{NoisePolicy, DEFAULT_BACKGROUND_THRESHOLD};
use crate::snr::RoiPatch;

/// Candidate file names searched in the working directory
const CONFIG_FILENAMES: &[&str] = &["fmri_qa.yml", "fmri_qa.yaml"];

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "FMRI_QA_CONFIG";

/// Default number of z-slices per statistics chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Parameters for one QA run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Brain mask threshold as a fraction of the maximum mean
    pub mask_threshold: f64,
    pub noise_policy: NoisePolicy,
    /// z-slices per chunk for temporal statistics; `None` computes in one pass
    pub chunk_size: Option<usize>,
    /// Evaluate the tSNR and iSNR maps on separate threads
    pub parallel_maps: bool,
    /// Optional patch ROI for tSNR and time courses
    pub roi: Option<RoiPatch>,
    /// TR in seconds overriding any sidecar value
    pub tr_override: Option<f64>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            mask_threshold: DEFAULT_MASK_THRESHOLD,
            noise_policy: NoisePolicy::default(),
            chunk_size: Some(DEFAULT_CHUNK_SIZE),
            parallel_maps: true,
            roi: None,
            tr_override: None,
        }
    }
}

/// Loaded configuration, where it came from, and what was corrected
#[derive(Debug, Clone)]
pub struct QaConfigHandle {
    pub config: QaConfig,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

fn valid_fraction(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value < 1.0
}

impl QaConfig {
    /// Parse YAML text and sanitize the result
    pub fn from_yaml_str(contents: &str) -> QaResult<(QaConfig, Vec<String>)> {
        let config: QaConfig = serde_yaml::from_str(contents)
            .map_err(|e| QaError::Config(format!("failed to parse config: {}", e)))?;
        Ok(config.sanitize())
    }

    /// Reset out-of-range values to their defaults, collecting warnings
    pub fn sanitize(mut self) -> (QaConfig, Vec<String>) {
        let mut warnings = Vec::new();

        if !valid_fraction(self.mask_threshold) {
            warnings.push(format!(
                "mask_threshold {} outside (0, 1); using {}",
                self.mask_threshold, DEFAULT_MASK_THRESHOLD
            ));
            self.mask_threshold = DEFAULT_MASK_THRESHOLD;
        }

        if let NoisePolicy::BackgroundRegion { threshold_fraction, slab_size } =
            &mut self.noise_policy
        {
            if !valid_fraction(*threshold_fraction) {
                warnings.push(format!(
                    "background threshold_fraction {} outside (0, 1); using {}",
                    threshold_fraction, DEFAULT_BACKGROUND_THRESHOLD
                ));
                *threshold_fraction = DEFAULT_BACKGROUND_THRESHOLD;
            }
            if *slab_size == Some(0) {
                warnings.push("slab_size 0 disables slab-local noise".to_string());
                *slab_size = None;
            }
        }

        if self.chunk_size == Some(0) {
            warnings.push("chunk_size 0 disables chunking".to_string());
            self.chunk_size = None;
        }

        if let Some(roi) = self.roi {
            if roi.width == 0 || roi.height == 0 {
                warnings.push(format!("ROI {:?} is empty; ignoring it", roi));
                self.roi = None;
            }
        }

        if let Some(tr) = self.tr_override {
            if !(tr.is_finite() && tr > 0.0) {
                warnings.push(format!("tr_override {} is not a positive time; ignoring it", tr));
                self.tr_override = None;
            }
        }

        (self, warnings)
    }
}

/// Load configuration from an explicit path, `$FMRI_QA_CONFIG`, or the
/// working directory, falling back to defaults
///
/// # Errors
/// An explicitly requested file that cannot be read or parsed is an error.
/// Discovered files that fail to parse are skipped with a warning.
pub fn load_config(custom_path: Option<&Path>) -> QaResult<QaConfigHandle> {
    if let Some(path) = custom_path {
        let contents = fs::read_to_string(path)
            .map_err(|e| QaError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let (config, warnings) = QaConfig::from_yaml_str(&contents)?;
        return Ok(QaConfigHandle {
            config,
            source: Some(path.to_path_buf()),
            warnings,
        });
    }

    let mut warnings = Vec::new();
    for candidate in config_candidates() {
        if !candidate.is_file() {
            continue;
        }
        match fs::read_to_string(&candidate) {
            Ok(contents) => match QaConfig::from_yaml_str(&contents) {
                Ok((config, mut config_warnings)) => {
                    warnings.append(&mut config_warnings);
                    return Ok(QaConfigHandle {
                        config,
                        source: Some(candidate),
                        warnings,
                    });
                }
                Err(err) => warnings.push(format!("{}: {}", candidate.display(), err)),
            },
            Err(err) => warnings.push(format!(
                "failed to read config {}: {}",
                candidate.display(),
                err
            )),
        }
    }

    warnings.push("no config file found; using built-in defaults".to_string());
    Ok(QaConfigHandle {
        config: QaConfig::default(),
        source: None,
        warnings,
    })
}

fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        candidates.push(PathBuf::from(env_path));
    }
    if let Ok(cwd) = std::env::current_dir() {
        for name in CONFIG_FILENAMES {
            candidates.push(cwd.join(name));
        }
    }
    candidates
}
