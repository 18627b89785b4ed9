//! The `nvnmd` block of a training input.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Path value meaning "no file".
pub const NO_FILE: &str = "none";

pub fn is_no_file(path: &Path) -> bool {
    path == Path::new(NO_FILE)
}

/// User-facing switches. Every field is required when read from a training
/// input; `Default` mirrors the built-in training-input template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvnmdSettings {
    pub net_size: usize,
    pub map_file: PathBuf,
    pub config_file: PathBuf,
    pub weight_file: PathBuf,
    pub enable: bool,
    pub restore_descriptor: bool,
    pub restore_fitting_net: bool,
    pub quantize_descriptor: bool,
    pub quantize_fitting_net: bool,
}

impl Default for NvnmdSettings {
    fn default() -> Self {
        Self {
            net_size: 128,
            map_file: PathBuf::from(NO_FILE),
            config_file: PathBuf::from(NO_FILE),
            weight_file: PathBuf::from(NO_FILE),
            enable: false,
            restore_descriptor: false,
            restore_fitting_net: false,
            quantize_descriptor: false,
            quantize_fitting_net: false,
        }
    }
}

impl NvnmdSettings {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).context("incomplete nvnmd settings")
    }

    pub fn apply_train_mode(&mut self, mode: TrainMode) {
        let quantized = matches!(mode, TrainMode::Qnn);
        self.restore_descriptor = quantized;
        self.restore_fitting_net = quantized;
        self.quantize_descriptor = quantized;
        self.quantize_fitting_net = quantized;
    }
}

/// `cnn` trains the continuous network, `qnn` the quantized one restored
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainMode {
    Cnn,
    Qnn,
}

impl FromStr for TrainMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cnn" => Ok(TrainMode::Cnn),
            "qnn" => Ok(TrainMode::Qnn),
            other => bail!("unknown train mode: {other}"),
        }
    }
}
