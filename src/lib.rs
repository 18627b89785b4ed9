//! nvforge: NVNMD configuration derivation and multi-task configuration
//! migration for fine-tuning from pretrained united models.

pub use nvforge_fio as fio;
pub use nvforge_multitask as multitask;
pub use nvforge_nvnmd as nvnmd;
