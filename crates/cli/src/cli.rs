//! CLI wiring for the NVNMD configuration and multi-task tools.

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array2;
use nvforge_multitask::MultiTaskMerger;
use nvforge_nvnmd::{NvnmdConfig, NvnmdSettings, TrainMode, DEFAULT_SAVE_PATH};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nvforge", about = "NVNMD configuration and multi-task toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Cnn,
    Qnn,
}

impl From<ModeArg> for TrainMode {
    fn from(value: ModeArg) -> TrainMode {
        match value {
            ModeArg::Cnn => TrainMode::Cnn,
            ModeArg::Qnn => TrainMode::Qnn,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build an NVNMD configuration from the `nvnmd` block of a training input.
    Init {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_SAVE_PATH)]
        output: PathBuf,
        /// Override the restore/quantize flags for a training stage.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Print or write the conventional training input for a saved configuration.
    Export {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compute the switched-feature range from descriptor statistics.
    ScaleRange {
        #[arg(long)]
        config: PathBuf,
        /// JSON file with `mean` and `stdev` matrices, one row per type.
        #[arg(long)]
        stats: PathBuf,
    },
    /// Reconcile a multi-task training input with a pretrained united model.
    Merge {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        pretrained: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Let pretrained sub-configurations override local `trainable` flags.
        #[arg(long, default_value_t = false)]
        ignore_local_trainable: bool,
    },
}

#[derive(Debug, Deserialize)]
struct DescriptorStats {
    mean: Vec<Vec<f64>>,
    stdev: Vec<Vec<f64>>,
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    execute(cli.command)
}

/// Run one subcommand without touching the global subscriber.
pub fn execute(command: Command) -> Result<()> {
    match command {
        Command::Init {
            input,
            output,
            mode,
        } => {
            let config = init_config(&input, &output, mode.map(TrainMode::from))?;
            for warning in config.warnings() {
                println!("warning: {warning}");
            }
            println!("NVNMD configuration saved to {}", output.display());
        }
        Command::Export { config, output } => {
            let script = export_config(&config)?;
            emit(&script, output.as_deref())?;
        }
        Command::ScaleRange { config, stats } => {
            let mut nvnmd = restore_config(&config)?;
            let (mean, stdev) = read_stats(&stats)?;
            let range = nvnmd.compute_scale_range(mean.view(), stdev.view())?;
            println!("smin = {:.6}, smax = {:.6}", range.smin, range.smax);
        }
        Command::Merge {
            input,
            pretrained,
            output,
            ignore_local_trainable,
        } => {
            let jdata = read_json(&input)?;
            let merger = MultiTaskMerger::with_options(nvforge_multitask::MergeOptions {
                keep_local_trainable: !ignore_local_trainable,
            });
            let outcome = merger
                .merge_file(jdata, &pretrained)
                .with_context(|| format!("failed to merge with {}", pretrained.display()))?;
            info!(
                reused = ?outcome.report.reused,
                newly_added = ?outcome.report.newly_added,
                type_map_changed = outcome.report.type_map_changed,
                "merge finished"
            );
            emit(&outcome.config, output.as_deref())?;
        }
    }
    Ok(())
}

pub fn init_config(input: &Path, output: &Path, mode: Option<TrainMode>) -> Result<NvnmdConfig> {
    let jdata = read_json(input)?;
    let block = jdata
        .get("nvnmd")
        .with_context(|| format!("{} has no nvnmd block", input.display()))?;
    let mut settings = NvnmdSettings::from_value(block)?;
    if let Some(mode) = mode {
        settings.apply_train_mode(mode);
    }

    let mut config = NvnmdConfig::default().with_save_path(output);
    config.init_from_settings(settings)?;
    if let Some(model) = jdata.get("model") {
        config.init_from_deepmd_input(model)?;
    }
    config.display_message();
    config.save(None)?;
    Ok(config)
}

pub fn restore_config(path: &Path) -> Result<NvnmdConfig> {
    ensure!(path.exists(), "configuration {} does not exist", path.display());
    let mut config = NvnmdConfig::default();
    config.restore(path)?;
    Ok(config)
}

pub fn export_config(path: &Path) -> Result<Value> {
    restore_config(path)?.export_as_training_script()
}

fn read_json(path: &Path) -> Result<Value> {
    ensure!(path.exists(), "{} does not exist", path.display());
    nvforge_fio::load(path, json!({}))
}

fn read_stats(path: &Path) -> Result<(Array2<f64>, Array2<f64>)> {
    let raw = read_json(path)?;
    let stats: DescriptorStats = serde_json::from_value(raw)
        .with_context(|| format!("{} is not a mean/stdev statistics file", path.display()))?;
    Ok((to_matrix(stats.mean, "mean")?, to_matrix(stats.stdev, "stdev")?))
}

fn to_matrix(rows: Vec<Vec<f64>>, name: &str) -> Result<Array2<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    ensure!(
        rows.iter().all(|row| row.len() == ncols),
        "{name} rows have different lengths"
    );
    let nrows = rows.len();
    let data: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), data).with_context(|| format!("{name} is not a matrix"))
}

fn emit(data: &Value, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            nvforge_fio::save(path, data)?;
            println!("wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}
