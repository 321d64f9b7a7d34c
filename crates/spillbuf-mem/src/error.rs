use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type local to spillbuf-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open backing temporary file in '{}': {source}", .dir.display())]
    TempFileCreate {
        dir: PathBuf,
        transferred: u64,
        source: io::Error,
    },

    #[error("cannot delete backing temporary file '{}': {source}", .path.display())]
    TempFileDelete {
        path: PathBuf,
        transferred: u64,
        source: io::Error,
    },

    #[error("cannot copy {bytes} buffered bytes to backing temporary file: {source}")]
    TempFileCopy {
        bytes: usize,
        transferred: u64,
        source: io::Error,
    },

    #[error("{op} failed after {transferred} bytes: {source}")]
    Io {
        op: &'static str,
        transferred: u64,
        source: io::Error,
    },

    #[error("cannot duplicate handle to backing file: {0}")]
    HandleDuplication(#[source] io::Error),

    #[error("invalid seek to position {offset}")]
    Seek { offset: i128 },

    #[error(transparent)]
    Config(#[from] spillbuf_core::Error),
}

impl Error {
    pub(crate) fn io(op: &'static str, transferred: u64, source: io::Error) -> Self {
        Error::Io {
            op,
            transferred,
            source,
        }
    }

    /// Bytes the failing call stored before the error. Zero when nothing was
    /// stored or the error is not about a transfer.
    pub fn transferred(&self) -> u64 {
        match self {
            Error::Io { transferred, .. }
            | Error::TempFileCreate { transferred, .. }
            | Error::TempFileDelete { transferred, .. }
            | Error::TempFileCopy { transferred, .. } => *transferred,
            _ => 0,
        }
    }

    /// Same error, crediting `stored` bytes to the failing call.
    pub(crate) fn after(mut self, stored: u64) -> Self {
        match &mut self {
            Error::Io { transferred, .. }
            | Error::TempFileCreate { transferred, .. }
            | Error::TempFileDelete { transferred, .. }
            | Error::TempFileCopy { transferred, .. } => *transferred = stored,
            _ => {}
        }
        self
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            Error::TempFileCreate { source, .. }
            | Error::TempFileDelete { source, .. }
            | Error::TempFileCopy { source, .. }
            | Error::Io { source, .. }
            | Error::HandleDuplication(source) => source.kind(),
            Error::Seek { .. } | Error::Config(_) => io::ErrorKind::InvalidInput,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(e.kind(), e)
    }
}
