//! Buffer configuration that callers can serialize/deserialize.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Maximum bytes kept in memory before the buffer moves to a temp file.
    /// Zero means the buffer never spills.
    pub threshold_bytes: usize,

    /// Directory for temp files. `None` uses the platform temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Name pattern for temp files. The last `*` is replaced by a random
    /// string; without a `*` the random string is appended.
    pub temp_pattern: String,

    /// Tolerate failures to unlink the temp file after creating it.
    ///
    /// Ignoring the error leaves a named file behind on disk.
    pub ignore_delete_errors: bool,
}

impl SpillConfig {
    /// Config that spills once more than `threshold_bytes` have been written.
    pub fn with_threshold(threshold_bytes: usize) -> Self {
        Self {
            threshold_bytes,
            ..Self::default()
        }
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SPILLBUF_THRESHOLD_BYTES`: spill threshold in bytes
    /// - `SPILLBUF_TEMP_DIR`: directory for temp files
    /// - `SPILLBUF_TEMP_PATTERN`: temp file name pattern
    /// - `SPILLBUF_IGNORE_DELETE_ERRORS`: `1`/`true`/`yes` to ignore unlink failures
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SPILLBUF_THRESHOLD_BYTES") {
            if let Ok(v) = s.trim().parse::<usize>() {
                cfg.threshold_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("SPILLBUF_TEMP_DIR") {
            if !s.is_empty() {
                cfg.temp_dir = Some(PathBuf::from(s));
            }
        }

        if let Ok(s) = std::env::var("SPILLBUF_TEMP_PATTERN") {
            cfg.temp_pattern = s;
        }

        if let Ok(s) = std::env::var("SPILLBUF_IGNORE_DELETE_ERRORS") {
            if let Some(v) = parse_flag(&s) {
                cfg.ignore_delete_errors = v;
            }
        }

        cfg
    }

    /// Memory-only buffers never touch the filesystem.
    pub fn is_unbounded(&self) -> bool {
        self.threshold_bytes == 0
    }

    /// Directory temp files are created in.
    pub fn resolved_temp_dir(&self) -> PathBuf {
        match self.temp_dir.as_deref() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::temp_dir(),
        }
    }

    /// Split `temp_pattern` into the parts placed around the random string.
    pub fn name_pattern(&self) -> Result<NamePattern<'_>> {
        NamePattern::parse(&self.temp_pattern)
    }

    pub fn validate(&self) -> Result<()> {
        self.name_pattern().map(|_| ())
    }
}

/// Prefix/suffix pair a temp file name is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamePattern<'a> {
    pub prefix: &'a str,
    pub suffix: &'a str,
}

impl<'a> NamePattern<'a> {
    pub fn parse(pattern: &'a str) -> Result<Self> {
        if pattern.contains(['/', std::path::MAIN_SEPARATOR]) {
            return Err(Error::Config(format!(
                "temp_pattern {pattern:?} contains a path separator"
            )));
        }
        let (prefix, suffix) = match pattern.rfind('*') {
            Some(pos) => (&pattern[..pos], &pattern[pos + 1..]),
            None => (pattern, ""),
        };
        Ok(Self { prefix, suffix })
    }

    /// Whether a file name could have been produced by this pattern.
    pub fn matches(&self, name: &Path) -> bool {
        name.file_name()
            .and_then(|n| n.to_str())
            .map(|n| {
                n.len() > self.prefix.len() + self.suffix.len()
                    && n.starts_with(self.prefix)
                    && n.ends_with(self.suffix)
            })
            .unwrap_or(false)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
