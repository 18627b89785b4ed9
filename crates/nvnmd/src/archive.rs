//! On-disk form of a configuration: `{ "config": <tree>, "weight": <mapping> }`.

use crate::settings::is_no_file;
use crate::tree::NvnmdTree;
use anyhow::Result;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Named parameter tensors (weights, lookup tables).
pub type WeightTable = BTreeMap<String, ArrayD<f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NvnmdArchive {
    pub config: NvnmdTree,
    #[serde(default)]
    pub weight: WeightTable,
}

impl NvnmdArchive {
    pub fn new(config: NvnmdTree, weight: WeightTable) -> Self {
        Self { config, weight }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        nvforge_fio::save_typed(path, self)?;
        info!(path = %path.display(), tensors = self.weight.len(), "saved NVNMD configuration");
        Ok(())
    }

    /// Fields absent from the file, or the whole file when missing, come from
    /// `defaults`. Nothing is re-derived.
    pub fn restore(path: &Path, defaults: &NvnmdArchive) -> Result<Self> {
        nvforge_fio::load_typed(path, defaults)
    }
}

/// Load a standalone weight or map table; `none` or a missing file yields an
/// empty one.
pub fn load_table(path: &Path) -> Result<WeightTable> {
    if is_no_file(path) {
        return Ok(WeightTable::new());
    }
    nvforge_fio::load_typed(path, &WeightTable::new())
}
