//! Structured-file helpers shared by the nvforge crates.
//!
//! Configuration files are plain JSON dictionaries. These helpers load them on
//! top of a set of defaults, deep-overlay one dictionary onto another, read
//! nested keys by `/`-separated path and write dictionaries back to disk.

pub mod dict;
pub mod file;

pub use dict::*;
pub use file::*;
