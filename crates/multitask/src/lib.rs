//! Multi-task fine-tuning support: reconcile a new multi-task training input
//! with the configuration embedded in a frozen, pretrained united model.

pub mod checkpoint;
pub mod error;
pub mod merge;

pub use checkpoint::{FrozenModel, MemoryModel, SafetensorsModel, TRAINING_SCRIPT};
pub use error::{MergeError, Result};
pub use merge::{MergeOptions, MergeOutcome, MergeReport, MultiTaskMerger};
