#![forbid(unsafe_code)]
//! spillbuf: write a stream once, read it back as often as needed, without
//! deciding up front whether it fits in memory.
//!
//! ```no_run
//! use std::io::Read;
//! use spillbuf::SpillBuffer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut body = SpillBuffer::new(64 * 1024);
//! body.read_from(std::io::stdin())?;
//!
//! let mut reader = body.try_clone()?;
//! let mut text = String::new();
//! reader.read_to_string(&mut text)?;
//! body.close()?;
//! # Ok(())
//! # }
//! ```

pub use spillbuf_core::{config, NamePattern, SpillConfig};
pub use spillbuf_mem::{
    Error, FsTempFiles, Result, SpillBuffer, SpillStats, SpillTracker, TempFileFactory,
};
