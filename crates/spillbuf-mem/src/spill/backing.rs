//! Storage behind a `SpillBuffer`: nothing yet, a shared memory region, or an
//! unlinked temp file.
//!
//! File access is positioned (`pread`/`pwrite` on unix, `seek_read`/`seek_write`
//! on windows). Duplicated handles may share one OS offset, so no read or
//! write here depends on it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) enum Backing {
    Empty,
    Memory(Arc<Vec<u8>>),
    Disk(SpillFile),
}

/// Mutable view used by the append paths. `Empty` is materialized as memory.
pub(crate) enum BackingMut<'a> {
    Memory(&'a mut Vec<u8>),
    Disk(&'a mut SpillFile),
}

impl Backing {
    pub(crate) fn len(&self) -> u64 {
        match self {
            Backing::Empty => 0,
            Backing::Memory(region) => region.len() as u64,
            Backing::Disk(file) => file.len(),
        }
    }

    pub(crate) fn is_disk(&self) -> bool {
        matches!(self, Backing::Disk(_))
    }

    /// In-memory bytes, empty once spilled.
    pub(crate) fn region(&self) -> &[u8] {
        match self {
            Backing::Memory(region) => region,
            _ => &[],
        }
    }

    /// Writable access. A region shared with a clone is copied first.
    pub(crate) fn as_mut(&mut self) -> BackingMut<'_> {
        match self {
            Backing::Disk(file) => BackingMut::Disk(file),
            Backing::Memory(region) => BackingMut::Memory(Arc::make_mut(region)),
            Backing::Empty => {
                *self = Backing::Memory(Arc::default());
                self.as_mut()
            }
        }
    }

    pub(crate) fn read_at(&self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        match self {
            Backing::Empty => Ok(0),
            Backing::Memory(region) => Ok(copy_region(region, buf, pos)),
            Backing::Disk(file) => file.read_at(buf, pos),
        }
    }
}

fn copy_region(region: &[u8], buf: &mut [u8], pos: u64) -> usize {
    let start = match usize::try_from(pos) {
        Ok(start) if start < region.len() => start,
        _ => return 0,
    };
    let n = buf.len().min(region.len() - start);
    buf[..n].copy_from_slice(&region[start..start + n]);
    n
}

/// Handle to a temp file whose name has (normally) been removed already.
pub(crate) struct SpillFile {
    file: File,
    path: PathBuf,
    /// Set when unlinking failed and the policy allowed carrying on.
    linked: bool,
    len: u64,
}

impl SpillFile {
    pub(crate) fn new(file: File, path: PathBuf, linked: bool) -> Self {
        Self {
            file,
            path,
            linked,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn append(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer to backing file",
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub(crate) fn read_at(&self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        if pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let avail = usize::try_from(self.len - pos).unwrap_or(usize::MAX);
        let want = buf.len().min(avail);
        loop {
            match os::read_at(&self.file, &mut buf[..want], pos) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    /// Independent reader over the same file content.
    ///
    /// Only the handle that created the file owns a leftover name; the
    /// duplicate never tries to remove it.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            path: self.path.clone(),
            linked: false,
            len: self.len,
        })
    }

    pub(crate) fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Sequential reader starting at `pos`, borrowing the handle.
    pub(crate) fn reader_at(&self, pos: u64) -> FileReader<'_> {
        FileReader { file: self, pos }
    }
}

impl Write for SpillFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = os::write_at(&self.file, buf, self.len)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

pub(crate) struct FileReader<'a> {
    file: &'a SpillFile,
    pos: u64,
}

impl Read for FileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(unix)]
mod os {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub(super) fn read_at(file: &File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        file.read_at(buf, pos)
    }

    pub(super) fn write_at(file: &File, buf: &[u8], pos: u64) -> io::Result<usize> {
        file.write_at(buf, pos)
    }
}

#[cfg(windows)]
mod os {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub(super) fn read_at(file: &File, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        file.seek_read(buf, pos)
    }

    pub(super) fn write_at(file: &File, buf: &[u8], pos: u64) -> io::Result<usize> {
        file.seek_write(buf, pos)
    }
}
