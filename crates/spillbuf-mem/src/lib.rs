#![forbid(unsafe_code)]
//! spillbuf-mem: the memory-or-temp-file scratch buffer.
//!
//! A [`SpillBuffer`] keeps written bytes in memory until a configured
//! threshold is exceeded, then moves them into an unlinked temp file and keeps
//! appending there. Readers see one logical stream either way.
//!
//! Temp-file creation goes through the [`TempFileFactory`] seam; the default
//! [`FsTempFiles`] is backed by the `tempfile` crate.

pub mod error;
pub mod spill;
pub mod tracking;

pub use error::{Error, Result};
pub use spill::{FsTempFiles, SpillBuffer, TempFileFactory};
pub use tracking::{SpillStats, SpillTracker};
