//! NVNMD configuration: fixed-point layout derived from network sizes.
//!
//! The quantized (non-von Neumann) variant of the potential runs on hardware
//! whose bit widths, neighbor-list sizes and node counts all follow from a
//! handful of network hyperparameters. This crate holds those parameters as a
//! typed tree and derives the hardware layout from them:
//!
//! - [`tree::NvnmdTree`]: the six configuration sections and `derive_tree`
//! - [`config::NvnmdConfig`]: settings, tables, presets and persistence
//! - [`range`]: range of the switched radial feature for the fixed-point format
//! - [`presets::PresetRegistry`]: reference layouts keyed by fitting width

pub mod archive;
pub mod config;
pub mod presets;
pub mod range;
pub mod sections;
pub mod settings;
pub mod template;
pub mod tree;
pub mod warning;

pub use archive::{NvnmdArchive, WeightTable};
pub use config::{NvnmdConfig, DEFAULT_SAVE_PATH};
pub use presets::PresetRegistry;
pub use range::{r2s, ScaleRange};
pub use settings::{NvnmdSettings, TrainMode};
pub use tree::{derive_tree, NvnmdTree};
pub use warning::ConfigWarning;
