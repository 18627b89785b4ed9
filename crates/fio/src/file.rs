//! Load and save JSON dictionaries.

use crate::dict::update;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load a dictionary from `path`, overlaid onto `default`.
///
/// A missing file is not an error: the defaults are returned unchanged.
pub fn load(path: &Path, default: Value) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "file not found; using defaults");
        return Ok(default);
    }
    let blob = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let loaded: Value = serde_json::from_slice(&blob)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    debug!(path = %path.display(), "loaded dictionary");
    Ok(update(&loaded, default))
}

/// Write a dictionary as pretty JSON, creating parent directories.
pub fn save(path: &Path, data: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let blob = serde_json::to_vec_pretty(data)?;
    fs::write(path, blob).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "saved dictionary");
    Ok(())
}

/// Typed variant of [`load`]: the file is overlaid onto the serialized
/// defaults before deserializing.
pub fn load_typed<T>(path: &Path, default: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let base = serde_json::to_value(default)?;
    let merged = load(path, base)?;
    serde_json::from_value(merged)
        .with_context(|| format!("unexpected layout in {}", path.display()))
}

pub fn save_typed<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    save(path, &serde_json::to_value(data)?)
}
