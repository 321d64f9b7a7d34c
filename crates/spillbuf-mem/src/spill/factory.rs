//! Temp-file creation seam.
//!
//! The buffer only needs "give me a fresh, uniquely named file in this
//! directory". It removes the name itself right after creation so the disk
//! space lives exactly as long as the open handles.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use spillbuf_core::{NamePattern, SpillConfig};

use super::backing::SpillFile;
use crate::error::{Error, Result};

/// Abstract temp-file provider.
///
/// Implemented by [`FsTempFiles`] on top of the `tempfile` crate. Tests and
/// callers with special placement rules can plug in their own.
pub trait TempFileFactory: Send + Sync {
    /// Create a new file in `dir` whose name follows `pattern`. Returns the
    /// open handle and the path it was created at.
    fn create(&self, dir: &Path, pattern: NamePattern<'_>) -> io::Result<(File, PathBuf)>;
}

/// Default factory: uniquely named files via `tempfile::Builder`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTempFiles;

impl TempFileFactory for FsTempFiles {
    fn create(&self, dir: &Path, pattern: NamePattern<'_>) -> io::Result<(File, PathBuf)> {
        let mut builder = tempfile::Builder::new();
        if !pattern.prefix.is_empty() {
            builder.prefix(pattern.prefix);
        }
        builder.suffix(pattern.suffix);
        let named = builder.tempfile_in(dir)?;
        named.keep().map_err(|e| e.error)
    }
}

/// Create a temp file through `factory` and unlink it immediately.
pub(crate) fn create_detached(
    factory: &dyn TempFileFactory,
    config: &SpillConfig,
) -> Result<SpillFile> {
    let pattern = config.name_pattern()?;
    let dir = config.resolved_temp_dir();
    let (file, path) = factory
        .create(&dir, pattern)
        .map_err(|source| Error::TempFileCreate {
            dir,
            transferred: 0,
            source,
        })?;

    let linked = match fs::remove_file(&path) {
        Ok(()) => false,
        Err(_source) if config.ignore_delete_errors => {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), error = %_source, "temp file left on disk");
            true
        }
        Err(source) => {
            return Err(Error::TempFileDelete {
                path,
                transferred: 0,
                source,
            })
        }
    };

    Ok(SpillFile::new(file, path, linked))
}

/// Second attempt at removing a name that survived creation.
pub(crate) fn unlink_leftover(file: &SpillFile) {
    if !file.is_linked() {
        return;
    }
    match fs::remove_file(file.path()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %file.path().display(), error = %_e, "cannot remove temp file");
        }
    }
}
