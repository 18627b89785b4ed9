//! The NVNMD configuration object.
//!
//! One `NvnmdConfig` is built per process during setup and handed to
//! whatever needs it; there is no ambient global instance.

use crate::archive::{load_table, NvnmdArchive, WeightTable};
use crate::presets::PresetRegistry;
use crate::range::{scale_range, ScaleRange};
use crate::settings::{is_no_file, NvnmdSettings, TrainMode};
use crate::template::{deepmd_input_template, NVNMD_CITATION, NVNMD_WELCOME};
use crate::tree::{derive_tree, NvnmdTree};
use crate::warning::ConfigWarning;
use anyhow::{Context, Result};
use ndarray::ArrayView2;
use nvforge_fio::{get_or, update};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const DEFAULT_SAVE_PATH: &str = "nvnmd/config.json";

#[derive(Debug, Clone)]
pub struct NvnmdConfig {
    settings: NvnmdSettings,
    tree: NvnmdTree,
    map: WeightTable,
    weight: WeightTable,
    save_path: PathBuf,
    presets: PresetRegistry,
    warnings: Vec<ConfigWarning>,
}

impl Default for NvnmdConfig {
    fn default() -> Self {
        Self {
            settings: NvnmdSettings::default(),
            tree: NvnmdTree::default(),
            map: WeightTable::new(),
            weight: WeightTable::new(),
            save_path: PathBuf::from(DEFAULT_SAVE_PATH),
            presets: PresetRegistry::with_default_presets(),
            warnings: Vec::new(),
        }
    }
}

impl NvnmdConfig {
    pub fn new(settings: NvnmdSettings) -> Result<Self> {
        let mut config = Self::default();
        config.init_from_settings(settings)?;
        Ok(config)
    }

    pub fn with_presets(mut self, presets: PresetRegistry) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = path.into();
        self
    }

    pub fn settings(&self) -> &NvnmdSettings {
        &self.settings
    }

    pub fn tree(&self) -> &NvnmdTree {
        &self.tree
    }

    pub fn map(&self) -> &WeightTable {
        &self.map
    }

    pub fn weight(&self) -> &WeightTable {
        &self.weight
    }

    pub fn set_weight(&mut self, weight: WeightTable) {
        self.weight = weight;
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn net_size(&self) -> usize {
        self.settings.net_size
    }

    /// Non-fatal conditions raised so far, oldest first.
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Record the settings and, when enabled, load tables and configuration.
    ///
    /// The configuration file is overlaid on the template whose first fitting
    /// layer has been set to `net_size`, derived, then matched to a preset.
    pub fn init_from_settings(&mut self, settings: NvnmdSettings) -> Result<()> {
        self.settings = settings;
        if !self.settings.enable {
            debug!("NVNMD disabled; keeping default configuration");
            return Ok(());
        }

        self.map = load_table(&self.settings.map_file)
            .with_context(|| format!("failed to load map table {}", self.settings.map_file.display()))?;
        self.weight = load_table(&self.settings.weight_file).with_context(|| {
            format!("failed to load weight table {}", self.settings.weight_file.display())
        })?;

        let mut template = NvnmdTree::template();
        if let Some(first) = template.fitn.neuron.first_mut() {
            *first = self.settings.net_size;
        }
        let loaded = read_config_file(&self.settings.config_file, &template)?;
        self.init_from_config(&loaded)?;
        self.resolve_net_size()
    }

    /// Overlay `overrides` on the current tree and re-derive everything.
    pub fn init_from_config(&mut self, overrides: &Value) -> Result<()> {
        let base = serde_json::to_value(&self.tree)?;
        let merged = update(overrides, base);
        let raw: NvnmdTree =
            serde_json::from_value(merged).context("configuration does not match the NVNMD layout")?;
        self.tree = derive_tree(raw)?;
        // diagnostics of the replaced tree no longer apply
        self.warnings
            .retain(|w| !matches!(w, ConfigWarning::InvalidDivisibility { .. }));
        for warning in self.tree.diagnostics() {
            self.record(warning);
        }
        Ok(())
    }

    /// Re-derive from the preset matching the loaded fitting-layer width.
    pub fn resolve_net_size(&mut self) -> Result<()> {
        let Some(net_size) = self.tree.fitn.net_size() else {
            return Ok(());
        };
        self.settings.net_size = net_size;
        if !self.settings.enable {
            return Ok(());
        }

        let preset = self
            .presets
            .find(net_size)
            .map(serde_json::to_value)
            .transpose()?;
        match preset {
            Some(mut preset) => {
                debug!(net_size, "applying preset configuration");
                // presets describe the hardware layout, not the user's type map
                if let Some(sections) = preset.as_object_mut() {
                    sections.remove("dpin");
                }
                self.init_from_config(&preset)
            }
            None => {
                self.record(ConfigWarning::MissingPreset { net_size });
                Ok(())
            }
        }
    }

    /// Overlay the `model` block of a conventional training input.
    pub fn init_from_deepmd_input(&mut self, model: &Value) -> Result<()> {
        let overrides = json!({
            "dscp": get_or(model, "descriptor", json!({})),
            "fitn": get_or(model, "fitting_net", json!({})),
            "dpin": {"type_map": get_or(model, "type_map", json!([]))},
        });
        self.init_from_config(&overrides)?;
        self.resolve_net_size()
    }

    pub fn init_train_mode(&mut self, mode: TrainMode) {
        self.settings.apply_train_mode(mode);
    }

    /// Compute and store `smin`/`smax`, then save the configuration.
    pub fn compute_scale_range(
        &mut self,
        mean: ArrayView2<'_, f64>,
        stdev: ArrayView2<'_, f64>,
    ) -> Result<ScaleRange> {
        let range = scale_range(&self.tree.dscp, mean, stdev)?;
        self.tree.dscp.smin = range.smin;
        self.tree.dscp.smax = range.smax;
        self.save(None)?;

        info!(smin = range.smin, smax = range.smax, "range of s");
        if range.exceeds_limit() {
            self.record(ConfigWarning::RangeOverflow {
                smin: range.smin,
                smax: range.smax,
            });
        }
        Ok(range)
    }

    pub fn archive(&self) -> NvnmdArchive {
        NvnmdArchive::new(self.tree.clone(), self.weight.clone())
    }

    /// Persist to `path`, or to the remembered save path.
    pub fn save(&mut self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            self.save_path = path.to_path_buf();
        }
        self.archive().persist(&self.save_path)
    }

    /// Replace tree and weights with the contents of `path`, verbatim.
    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let archive = NvnmdArchive::restore(path, &self.archive())?;
        self.tree = archive.config;
        self.weight = archive.weight;
        self.save_path = path.to_path_buf();
        Ok(())
    }

    /// Conventional (non-quantized) training input equivalent to this state.
    pub fn export_as_training_script(&self) -> Result<Value> {
        let template = deepmd_input_template();
        let dscp = &self.tree.dscp;

        let mut descriptor = get_or(&template, "model/descriptor", json!({}));
        descriptor["sel"] = json!(dscp.sel);
        descriptor["rcut"] = json!(dscp.rcut);
        descriptor["rcut_smth"] = json!(dscp.rcut_smth);
        descriptor["neuron"] = json!(dscp.neuron);
        descriptor["type_one_side"] = json!(dscp.type_one_side);
        descriptor["axis_neuron"] = json!(dscp.axis_neuron);

        let mut fitting_net = get_or(&template, "model/fitting_net", json!({}));
        fitting_net["neuron"] = json!(self.tree.fitn.neuron);

        let mut model = Map::new();
        model.insert("descriptor".into(), descriptor);
        model.insert("fitting_net".into(), fitting_net);
        if !self.tree.dpin.type_map.is_empty() {
            model.insert("type_map".into(), json!(self.tree.dpin.type_map));
        }

        Ok(json!({
            "model": model,
            "nvnmd": serde_json::to_value(&self.settings)?,
            "learning_rate": get_or(&template, "learning_rate", json!({})),
            "loss": get_or(&template, "loss", json!({})),
            "training": get_or(&template, "training", json!({})),
        }))
    }

    /// Log the banner, citation and settings.
    pub fn display_message(&self) {
        for line in NVNMD_WELCOME.iter().chain(NVNMD_CITATION) {
            info!("{line}");
        }
        let s = &self.settings;
        info!(
            enable = s.enable,
            net_size = s.net_size,
            map_file = %s.map_file.display(),
            config_file = %s.config_file.display(),
            weight_file = %s.weight_file.display(),
            restore_descriptor = s.restore_descriptor,
            restore_fitting_net = s.restore_fitting_net,
            quantize_descriptor = s.quantize_descriptor,
            quantize_fitting_net = s.quantize_fitting_net,
            "NVNMD settings"
        );
    }

    fn record(&mut self, warning: ConfigWarning) {
        match &warning {
            ConfigWarning::MissingPreset { net_size } => {
                error!(net_size, "NVNMD: {warning}")
            }
            _ => warn!("NVNMD: {warning}"),
        }
        self.warnings.push(warning);
    }
}

/// Read a configuration file written either as a bare tree or as an archive,
/// overlaid on `template`. `none` or a missing file yields the template.
fn read_config_file(path: &Path, template: &NvnmdTree) -> Result<Value> {
    let base = serde_json::to_value(template)?;
    if is_no_file(path) {
        return Ok(base);
    }
    let raw = nvforge_fio::load(path, json!({}))
        .with_context(|| format!("failed to load configuration {}", path.display()))?;
    let section = match raw.get("config") {
        Some(config) => config.clone(),
        None => raw,
    };
    Ok(update(&section, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn enabled(net_size: usize) -> NvnmdSettings {
        NvnmdSettings {
            enable: true,
            net_size,
            ..NvnmdSettings::default()
        }
    }

    #[test]
    fn disabled_settings_keep_defaults() -> Result<()> {
        let config = NvnmdConfig::new(NvnmdSettings {
            net_size: 256,
            ..NvnmdSettings::default()
        })?;
        assert_eq!(config.tree(), &NvnmdTree::default());
        assert_eq!(config.net_size(), 256);
        assert!(config.warnings().is_empty());
        Ok(())
    }

    #[test]
    fn enabled_settings_resolve_preset() -> Result<()> {
        let config = NvnmdConfig::new(enabled(256))?;
        assert_eq!(config.tree().fitn.neuron, vec![256, 256, 256]);
        assert_eq!(config.tree().dscp.sel, vec![128, 128, 128, 128]);
        assert_eq!(config.tree().fitn.nnode_fits, vec![128, 256, 256, 256, 1]);
        assert_eq!(config.net_size(), 256);
        assert!(config.warnings().is_empty());
        Ok(())
    }

    #[test]
    fn unknown_net_size_keeps_loaded_state() -> Result<()> {
        let config = NvnmdConfig::new(enabled(96))?;
        assert_eq!(config.tree().fitn.neuron, vec![96, 128, 128]);
        assert_eq!(config.tree().fitn.nnode_fits, vec![128, 96, 128, 128, 1]);
        assert_eq!(
            config.warnings(),
            &[ConfigWarning::MissingPreset { net_size: 96 }]
        );
        Ok(())
    }

    #[test]
    fn config_file_is_overlaid_on_template() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        nvforge_fio::save(&path, &json!({"ctrl": {"NSTDM_M1X": 3}}))?;

        let mut presets = PresetRegistry::new();
        presets.register(64, {
            let mut tree = NvnmdTree::template();
            tree.fitn.neuron = vec![64, 64];
            tree.ctrl.nstdm_m1x = 3;
            tree
        });

        let mut config = NvnmdConfig::default().with_presets(presets);
        config.init_from_settings(NvnmdSettings {
            config_file: path,
            ..enabled(64)
        })?;

        assert_eq!(config.tree().ctrl.nstdm_m1x, 3);
        assert_eq!(config.tree().fitn.neuron, vec![64, 64]);
        assert!(config
            .warnings()
            .contains(&ConfigWarning::InvalidDivisibility { nstdm_m1x: 3 }));
        Ok(())
    }

    #[test]
    fn preset_clears_superseded_diagnostics() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        nvforge_fio::save(&path, &json!({"ctrl": {"NSTDM_M1X": 3}}))?;

        let config = NvnmdConfig::new(NvnmdSettings {
            config_file: path,
            ..enabled(128)
        })?;
        assert_eq!(config.tree().ctrl.nstdm_m1x, 8);
        assert!(config.tree().diagnostics().is_empty());
        assert!(config.warnings().is_empty());
        Ok(())
    }

    #[test]
    fn archive_file_is_accepted_as_config_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("saved.json");
        let mut source = NvnmdConfig::default();
        source.init_from_config(&json!({"dpin": {"type_map": ["O", "H"]}}))?;
        source.save(Some(&path))?;

        let config = NvnmdConfig::new(NvnmdSettings {
            config_file: path,
            ..enabled(128)
        })?;
        assert_eq!(config.tree().dpin.type_map, vec!["O", "H"]);
        Ok(())
    }

    #[test]
    fn deepmd_input_overrides_descriptor() -> Result<()> {
        let mut config = NvnmdConfig::default();
        config.init_from_deepmd_input(&json!({
            "type_map": ["H", "C"],
            "descriptor": {"sel": [46, 92], "axis_neuron": 4, "neuron": [25, 50], "type": "se_a"},
            "fitting_net": {"neuron": [32, 32]}
        }))?;

        let tree = config.tree();
        assert_eq!(tree.dscp.nidp, 138);
        assert_eq!(tree.dscp.m1, 50);
        assert_eq!(tree.dscp.m2, 4);
        assert_eq!(tree.dscp.ntype, 2);
        assert_eq!(tree.fitn.nnode_fits, vec![200, 32, 32, 1]);
        assert_eq!(tree.dpin.type_map, vec!["H", "C"]);
        assert_eq!(config.net_size(), 32);
        Ok(())
    }

    #[test]
    fn scale_range_is_stored_and_saved() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nvnmd/config.json");
        let mut config = NvnmdConfig::default().with_save_path(&path);
        config.init_from_config(&json!({"dscp": {"sel": [20, 20], "dmin": 1.0, "rcut_smth": 2.0}}))?;

        let mean = array![[0.0], [0.5]];
        let stdev = array![[0.05], [1.0]];
        let range = config.compute_scale_range(mean.view(), stdev.view())?;

        assert_abs_diff_eq!(range.smin, -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(range.smax, 20.0, epsilon = 1e-9);
        assert_eq!(config.tree().dscp.smax, range.smax);
        assert!(matches!(
            config.warnings().last(),
            Some(ConfigWarning::RangeOverflow { .. })
        ));

        let saved = NvnmdArchive::restore(&path, &NvnmdArchive::default())?;
        assert_eq!(saved.config.dscp.smin, range.smin);
        Ok(())
    }

    #[test]
    fn restore_replaces_state_verbatim() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");

        let mut source = NvnmdConfig::default();
        let mut weight = WeightTable::new();
        weight.insert("w".into(), array![1.0, 2.0].into_dyn());
        source.set_weight(weight);
        source.init_from_config(&json!({"fitn": {"neuron": [16]}}))?;
        source.save(Some(&path))?;

        let mut target = NvnmdConfig::default();
        target.restore(&path)?;
        assert_eq!(target.tree(), source.tree());
        assert_eq!(target.weight(), source.weight());
        assert_eq!(target.save_path(), path.as_path());
        Ok(())
    }

    #[test]
    fn exported_script_reflects_state() -> Result<()> {
        let mut config = NvnmdConfig::default();
        config.init_from_config(&json!({
            "dscp": {"sel": [46, 92], "neuron": [25, 50], "type_one_side": false},
            "dpin": {"type_map": ["H", "C"]}
        }))?;
        config.init_train_mode(TrainMode::Qnn);

        let script = config.export_as_training_script()?;
        assert_eq!(script["model"]["descriptor"]["sel"], json!([46, 92]));
        assert_eq!(script["model"]["descriptor"]["neuron"], json!([25, 50]));
        assert_eq!(script["model"]["descriptor"]["type"], json!("se_a"));
        assert_eq!(script["model"]["fitting_net"]["neuron"], json!([128, 128, 128]));
        assert_eq!(script["model"]["type_map"], json!(["H", "C"]));
        assert_eq!(script["nvnmd"]["quantize_fitting_net"], json!(true));
        assert_eq!(script["nvnmd"]["config_file"], json!("none"));
        assert!(script["training"]["training_data"].is_object());
        assert!(script["learning_rate"]["start_lr"].is_number());
        Ok(())
    }

    #[test]
    fn empty_type_map_is_not_exported() -> Result<()> {
        let script = NvnmdConfig::default().export_as_training_script()?;
        assert!(script["model"].get("type_map").is_none());
        Ok(())
    }
}
