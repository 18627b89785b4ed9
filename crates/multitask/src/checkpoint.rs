//! Named-tensor lookup on frozen models.

use crate::error::{MergeError, Result};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tensor holding the JSON training input a model was trained with.
pub const TRAINING_SCRIPT: &str = "train_attr/training_script";

pub trait FrozenModel {
    /// Where the model came from, for error messages.
    fn source(&self) -> String;

    /// Raw bytes of a byte tensor, or `None` when the model has no such entry.
    fn get_tensor_by_name(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// The embedded training script parsed as JSON.
    fn training_script(&self) -> Result<Value> {
        let bytes = self
            .get_tensor_by_name(TRAINING_SCRIPT)?
            .ok_or_else(|| MergeError::MissingTrainingScript {
                path: self.source(),
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// A frozen model stored as a safetensors file. Text entries are `U8`
/// tensors holding UTF-8 bytes.
pub struct SafetensorsModel {
    path: PathBuf,
    data: Vec<u8>,
}

impl SafetensorsModel {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;
        SafeTensors::deserialize(&data).map_err(|e| {
            MergeError::Checkpoint(format!("failed to parse {}: {e:?}", path.display()))
        })?;
        debug!(path = %path.display(), bytes = data.len(), "opened frozen model");
        Ok(Self { path, data })
    }

    pub fn tensor_names(&self) -> Result<Vec<String>> {
        let tensors = self.tensors()?;
        let mut names: Vec<String> = tensors.names().into_iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Write byte tensors to a new safetensors file.
    pub fn write(path: impl AsRef<Path>, entries: &[(&str, &[u8])]) -> Result<()> {
        let mut views = Vec::with_capacity(entries.len());
        for (name, bytes) in entries {
            let view = TensorView::new(Dtype::U8, vec![bytes.len()], bytes)
                .map_err(|e| MergeError::Checkpoint(format!("tensor '{name}': {e:?}")))?;
            views.push((name.to_string(), view));
        }
        let blob = safetensors::serialize(views, &None)
            .map_err(|e| MergeError::Checkpoint(format!("failed to serialize: {e:?}")))?;
        fs::write(path, blob)?;
        Ok(())
    }

    fn tensors(&self) -> Result<SafeTensors<'_>> {
        SafeTensors::deserialize(&self.data).map_err(|e| {
            MergeError::Checkpoint(format!("failed to parse {}: {e:?}", self.path.display()))
        })
    }
}

impl FrozenModel for SafetensorsModel {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn get_tensor_by_name(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let tensors = self.tensors()?;
        if !tensors.names().iter().any(|n| n.as_str() == name) {
            return Ok(None);
        }
        let view = tensors
            .tensor(name)
            .map_err(|e| MergeError::Checkpoint(format!("tensor '{name}': {e:?}")))?;
        if view.dtype() != Dtype::U8 {
            return Err(MergeError::Checkpoint(format!(
                "tensor '{name}' has dtype {:?}, expected U8",
                view.dtype()
            )));
        }
        Ok(Some(view.data().to_vec()))
    }
}

/// In-memory frozen model.
#[derive(Debug, Clone, Default)]
pub struct MemoryModel {
    tensors: HashMap<String, Vec<u8>>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_training_script(script: &Value) -> Result<Self> {
        let mut model = Self::new();
        model.insert(TRAINING_SCRIPT, serde_json::to_vec(script)?);
        Ok(model)
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.tensors.insert(name.into(), bytes);
    }
}

impl FrozenModel for MemoryModel {
    fn source(&self) -> String {
        "<memory>".to_string()
    }

    fn get_tensor_by_name(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tensors.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safetensors_script_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frozen.safetensors");
        let script = json!({"model": {"type_map": ["H", "C"]}});
        let bytes = serde_json::to_vec(&script)?;
        SafetensorsModel::write(
            &path,
            &[(TRAINING_SCRIPT, bytes.as_slice()), ("other", b"xyz".as_slice())],
        )?;

        let model = SafetensorsModel::open(&path)?;
        assert_eq!(model.tensor_names()?, vec!["other", TRAINING_SCRIPT]);
        assert_eq!(model.training_script()?, script);
        Ok(())
    }

    #[test]
    fn missing_script_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("old.safetensors");
        SafetensorsModel::write(&path, &[("other", b"xyz".as_slice())])?;

        let model = SafetensorsModel::open(&path)?;
        match model.training_script() {
            Err(MergeError::MissingTrainingScript { path: source }) => {
                assert!(source.ends_with("old.safetensors"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn garbage_file_is_a_checkpoint_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.safetensors");
        fs::write(&path, b"not a safetensors file")?;
        assert!(matches!(
            SafetensorsModel::open(&path),
            Err(MergeError::Checkpoint(_))
        ));
        Ok(())
    }

    #[test]
    fn memory_model_lookup() -> Result<()> {
        let model = MemoryModel::with_training_script(&json!({"a": 1}))?;
        assert_eq!(model.training_script()?, json!({"a": 1}));
        assert!(model.get_tensor_by_name("missing")?.is_none());
        assert!(matches!(
            MemoryModel::new().training_script(),
            Err(MergeError::MissingTrainingScript { .. })
        ));
        Ok(())
    }
}
