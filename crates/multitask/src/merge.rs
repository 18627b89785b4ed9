//! Reconcile a new multi-task training input with a pretrained united model.
//!
//! Heads present in both keep the pretrained sub-configuration so their
//! weights load unchanged; heads only in the new input train from scratch.
//! Pretrained values win everywhere except a locally set `trainable` flag.

use crate::checkpoint::{FrozenModel, SafetensorsModel};
use crate::error::{MergeError, Result};
use nvforge_fio::{ensure_object, get};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

const TYPE_EMBEDDING: &str = "type_embedding";
const DESCRIPTOR: &str = "descriptor";
const FITTING_NET_DICT: &str = "fitting_net_dict";

/// Per-task sections outside `model`.
const TASK_SECTIONS: [&str; 2] = ["loss_dict", "training/data_dict"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Keep the new input's `trainable` flag on sub-configurations replaced
    /// by pretrained ones. Lets a user freeze or unfreeze an inherited
    /// sub-network.
    pub keep_local_trainable: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            keep_local_trainable: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Heads present in both configurations.
    pub reused: BTreeSet<String>,
    /// Heads only in the new configuration.
    pub newly_added: BTreeSet<String>,
    pub type_map_changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub config: Value,
    pub report: MergeReport,
}

#[derive(Debug, Clone, Default)]
pub struct MultiTaskMerger {
    options: MergeOptions,
}

impl MultiTaskMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge against the safetensors model at `path`.
    pub fn merge_file(&self, new_config: Value, path: impl AsRef<Path>) -> Result<MergeOutcome> {
        let model = SafetensorsModel::open(path)?;
        self.merge(new_config, &model)
    }

    pub fn merge(&self, new_config: Value, pretrained: &dyn FrozenModel) -> Result<MergeOutcome> {
        let script = pretrained.training_script()?;
        self.merge_configs(new_config, &script)
    }

    /// Merge against an already extracted pretrained training script.
    pub fn merge_configs(&self, mut jdata: Value, pretrained: &Value) -> Result<MergeOutcome> {
        let pre_model = get(pretrained, "model")
            .and_then(Value::as_object)
            .filter(|model| model.contains_key(FITTING_NET_DICT))
            .ok_or(MergeError::NotMultiTaskModel)?;
        let pre_fittings = pre_model[FITTING_NET_DICT].as_object().ok_or_else(|| {
            MergeError::MalformedConfig("pretrained fitting_net_dict is not a mapping".into())
        })?;

        let model = jdata
            .get_mut("model")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| MergeError::MalformedConfig("input has no model section".into()))?;

        let mut report = MergeReport {
            type_map_changed: reconcile_type_map(model, pre_model)?,
            ..MergeReport::default()
        };

        let pre_keys: BTreeSet<String> = pre_fittings.keys().cloned().collect();
        let cur_keys: BTreeSet<String> = match model.get(FITTING_NET_DICT) {
            Some(Value::Object(fittings)) => fittings.keys().cloned().collect(),
            Some(_) => {
                return Err(MergeError::MalformedConfig(
                    "fitting_net_dict is not a mapping".into(),
                ))
            }
            // every pretrained head is inherited below
            None => pre_keys.clone(),
        };
        report.newly_added = cur_keys.difference(&pre_keys).cloned().collect();
        report.reused = cur_keys.intersection(&pre_keys).cloned().collect();

        info!("changing the model configurations according to the pretrained one");
        for key in [TYPE_EMBEDDING, DESCRIPTOR, FITTING_NET_DICT] {
            self.reconcile_model_key(model, pre_model, key, &report)?;
        }

        info!("changing the training configurations according to the pretrained one");
        for section in TASK_SECTIONS {
            copy_missing_tasks(&mut jdata, pretrained, section, &report.reused)?;
        }

        Ok(MergeOutcome {
            config: jdata,
            report,
        })
    }

    fn reconcile_model_key(
        &self,
        model: &mut Map<String, Value>,
        pre_model: &Map<String, Value>,
        key: &str,
        report: &MergeReport,
    ) -> Result<()> {
        let in_cur = model.contains_key(key);
        let in_pre = pre_model.contains_key(key);

        if !in_cur && in_pre {
            info!(key, value = %pre_model[key], "adding configuration from pretrained model");
            model.insert(key.to_string(), pre_model[key].clone());
        } else if key == TYPE_EMBEDDING && in_cur && !in_pre {
            // descriptors that embed types themselves omit this block; a frozen
            // request still needs a compatible no-op placeholder
            let local = model.remove(key);
            let frozen = local
                .as_ref()
                .and_then(|value| value.get("trainable"))
                .and_then(Value::as_bool)
                == Some(false);
            if frozen {
                model.insert(
                    key.to_string(),
                    json!({"trainable": false, "activation_function": "None"}),
                );
                info!("the type embedding from the pretrained model will be frozen");
            } else {
                debug!("dropping type_embedding absent from the pretrained model");
            }
        } else if key == FITTING_NET_DICT {
            if !report.reused.is_empty() {
                info!(heads = ?report.reused, "fitting nets will use the pretrained configurations");
                let fittings = model
                    .get_mut(key)
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| {
                        MergeError::MalformedConfig("fitting_net_dict is not a mapping".into())
                    })?;
                let pre_fittings = pre_model[key].as_object().ok_or_else(|| {
                    MergeError::MalformedConfig("pretrained fitting_net_dict is not a mapping".into())
                })?;
                for head in &report.reused {
                    self.change_sub_config(fittings, pre_fittings, head);
                }
            }
            if !report.newly_added.is_empty() {
                info!(heads = ?report.newly_added, "fitting nets will be initialized from scratch");
            }
        } else if in_cur && in_pre && model[key] != pre_model[key] {
            self.change_sub_config(model, pre_model, key);
        }
        Ok(())
    }

    /// Replace `local[key]` with `pretrained[key]`, keeping a local
    /// `trainable` flag when the options say so.
    fn change_sub_config(
        &self,
        local: &mut Map<String, Value>,
        pretrained: &Map<String, Value>,
        key: &str,
    ) {
        let Some(target) = pretrained.get(key) else {
            return;
        };
        let mut target = target.clone();
        let current = local.get(key).cloned().unwrap_or(Value::Null);

        if self.options.keep_local_trainable {
            if let (Some(trainable), Some(fields)) =
                (current.get("trainable"), target.as_object_mut())
            {
                fields.insert("trainable".into(), trainable.clone());
            }
        }

        info!(key, from = %current, to = %target, "changing sub-configuration");
        local.insert(key.to_string(), target);
    }
}

/// Every local type must exist in the pretrained type map; a differing list
/// is replaced by the pretrained one so type-indexed tensors line up.
fn reconcile_type_map(
    model: &mut Map<String, Value>,
    pre_model: &Map<String, Value>,
) -> Result<bool> {
    let pre_types = string_list(pre_model.get("type_map"), "pretrained model.type_map")?
        .ok_or_else(|| MergeError::MalformedConfig("pretrained model has no type_map".into()))?;
    let cur_types = string_list(model.get("type_map"), "model.type_map")?.unwrap_or_default();

    let unsupported: Vec<String> = cur_types
        .iter()
        .filter(|t| !pre_types.contains(t))
        .cloned()
        .collect();
    if !unsupported.is_empty() {
        return Err(MergeError::UnsupportedTypeMap { types: unsupported });
    }

    if cur_types == pre_types {
        return Ok(false);
    }
    info!(from = ?cur_types, to = ?pre_types, "changing the type_map");
    model.insert("type_map".into(), json!(pre_types));
    Ok(true)
}

fn string_list(value: Option<&Value>, what: &str) -> Result<Option<Vec<String>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| MergeError::MalformedConfig(format!("{what} is not a list")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| MergeError::MalformedConfig(format!("{what} holds a non-string entry")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Copy pretrained entries of `section` for reused heads the new input lacks.
fn copy_missing_tasks(
    jdata: &mut Value,
    pretrained: &Value,
    section: &str,
    reused: &BTreeSet<String>,
) -> Result<()> {
    let Some(source) = get(pretrained, section).and_then(Value::as_object) else {
        debug!(section, "pretrained model has no such section; nothing to copy");
        return Ok(());
    };
    let missing: Vec<&String> = reused
        .iter()
        .filter(|head| {
            get(jdata, section)
                .and_then(|entries| entries.get(head.as_str()))
                .is_none()
        })
        .filter(|head| source.contains_key(head.as_str()))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let target = ensure_object(jdata, section)
        .ok_or_else(|| MergeError::MalformedConfig(format!("{section} is not a mapping")))?;
    for head in missing {
        info!(section, head = %head, "adding configuration from the pretrained model");
        target.insert(head.clone(), source[head.as_str()].clone());
    }
    Ok(())
}
