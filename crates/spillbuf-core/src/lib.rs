#![forbid(unsafe_code)]
//! spillbuf-core: configuration and error types shared by the spillbuf crates.
//!
//! No I/O happens here. The buffer itself and the temp-file machinery live in
//! `spillbuf-mem`.

pub mod config;
pub mod error;

pub use config::{NamePattern, SpillConfig};
pub use error::{Error, Result};
