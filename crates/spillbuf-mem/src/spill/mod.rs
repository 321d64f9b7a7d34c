//! Scratch buffer that keeps small payloads in memory and spills large ones
//! to an unlinked temp file.
//!
//! Intended usage is one writer phase followed by one or more reader phases.
//! Use [`SpillBuffer::try_clone`] to hand each concurrent reader its own
//! instance; a single instance is never shared across threads.

mod backing;
pub mod factory;
mod transfer;

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use spillbuf_core::SpillConfig;

use crate::error::{Error, Result};
use crate::tracking::SpillTracker;
use backing::{Backing, BackingMut, SpillFile};
use transfer::{pump, read_retrying, write_all_counted};

pub use factory::{FsTempFiles, TempFileFactory};

/// Memory-or-file scratch space.
///
/// Writes append to the logical stream. Once more than `threshold_bytes`
/// would be held in memory the buffer moves everything to a temp file and
/// keeps appending there. Reads go through a cursor that is independent of
/// any OS file position.
///
/// Writing after reading has started, or writing to a buffer that has been
/// cloned, is not supported.
pub struct SpillBuffer {
    config: SpillConfig,
    factory: Arc<dyn TempFileFactory>,
    tracker: Option<Arc<SpillTracker>>,
    backing: Backing,
    cursor: u64,
}

impl SpillBuffer {
    /// Buffer that switches to a temp file after `threshold_bytes` bytes.
    /// Zero keeps everything in memory.
    pub fn new(threshold_bytes: usize) -> Self {
        Self::from_parts(SpillConfig::with_threshold(threshold_bytes))
    }

    pub fn with_config(config: SpillConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config))
    }

    fn from_parts(config: SpillConfig) -> Self {
        Self {
            config,
            factory: Arc::new(FsTempFiles),
            tracker: None,
            backing: Backing::Empty,
            cursor: 0,
        }
    }

    /// Use `factory` instead of the filesystem default to create temp files.
    pub fn with_temp_factory(mut self, factory: Arc<dyn TempFileFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Report memory peaks and promotions to `tracker`.
    pub fn with_tracker(mut self, tracker: Arc<SpillTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn config(&self) -> &SpillConfig {
        &self.config
    }

    pub fn threshold(&self) -> usize {
        self.config.threshold_bytes
    }

    /// Total bytes written.
    pub fn len(&self) -> u64 {
        self.backing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current read cursor.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Bytes between the cursor and the end of the stream.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.cursor)
    }

    /// Whether the data lives in a temp file.
    pub fn is_spilled(&self) -> bool {
        self.backing.is_disk()
    }

    /// Path the temp file was created at. The name is normally gone already.
    pub fn spill_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Disk(file) => Some(file.path()),
            _ => None,
        }
    }

    fn exceeds_threshold(&self, additional: usize) -> bool {
        let max = self.config.threshold_bytes;
        max > 0
            && !self.backing.is_disk()
            && self.backing.region().len().saturating_add(additional) > max
    }

    /// Move the memory region into a fresh temp file.
    ///
    /// The file is fully prepared before the switch, so on error the buffer
    /// is still in memory and intact.
    fn promote(&mut self) -> Result<()> {
        let file = self.prepare_spill()?;
        self.install(file);
        Ok(())
    }

    /// Create and unlink a temp file holding a copy of the memory region.
    fn prepare_spill(&self) -> Result<SpillFile> {
        let mut file = factory::create_detached(self.factory.as_ref(), &self.config)?;
        let region = self.backing.region();
        file.append(region).map_err(|source| Error::TempFileCopy {
            bytes: region.len(),
            transferred: 0,
            source,
        })?;
        Ok(file)
    }

    fn install(&mut self, file: SpillFile) {
        let copied = self.backing.region().len();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            copied,
            threshold = self.config.threshold_bytes,
            path = %file.path().display(),
            "spilling buffer to temp file"
        );
        if let Some(t) = &self.tracker {
            t.record_promotion(copied);
        }
        self.backing = Backing::Disk(file);
    }

    fn note_memory(&self, len: usize) {
        if let Some(t) = &self.tracker {
            t.record_memory(len);
        }
    }

    fn note_spilled(&self, bytes: u64) {
        if let Some(t) = &self.tracker {
            t.record_spilled(bytes);
        }
    }

    /// Append `buf` and return the number of bytes accepted.
    ///
    /// A promotion error leaves the buffer in memory; any other error means
    /// the buffer should be discarded.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.exceeds_threshold(buf.len()) {
            self.promote()?;
        }
        let max = self.config.threshold_bytes;
        match self.backing.as_mut() {
            BackingMut::Memory(region) => {
                if max > 0 {
                    region.reserve_exact(max.saturating_sub(region.len()));
                }
                region.extend_from_slice(buf);
                let len = region.len();
                self.note_memory(len);
            }
            BackingMut::Disk(file) => {
                let before = file.len();
                let res = file.append(buf);
                let appended = file.len() - before;
                self.note_spilled(appended);
                res.map_err(|e| Error::io("write", appended, e))?;
            }
        }
        Ok(buf.len())
    }

    /// Read at the cursor and advance it. `Ok(0)` means end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(buf, self.cursor)?;
        self.cursor += n as u64;
        Ok(n)
    }

    /// Read at an absolute position without moving the cursor.
    pub fn read_at(&self, buf: &mut [u8], pos: u64) -> Result<usize> {
        self.backing
            .read_at(buf, pos)
            .map_err(|e| Error::io("read", 0, e))
    }

    /// Ingest `src` until end of stream and return the number of bytes read.
    ///
    /// Memory is filled straight from the source up to the threshold. If the
    /// source still has data at that point the buffer spills and streams the
    /// rest into the file. On error, [`Error::transferred`] tells how many
    /// bytes this call stored.
    ///
    /// The check for more data consumes up to one chunk from `src`. If the
    /// spill then fails, those bytes are neither stored nor given back.
    pub fn read_from<R: Read>(&mut self, mut src: R) -> Result<u64> {
        let max = self.config.threshold_bytes;
        let region = match self.backing.as_mut() {
            BackingMut::Disk(file) => {
                let n = pump(&mut src, file, "read_from", 0)?;
                self.note_spilled(n);
                return Ok(n);
            }
            BackingMut::Memory(region) => region,
        };

        let before = region.len();
        if max > 0 {
            region.reserve_exact(max.saturating_sub(before));
        }
        let res = if max == 0 {
            src.read_to_end(region)
        } else {
            let room = max.saturating_sub(before) as u64;
            (&mut src).take(room).read_to_end(region)
        };
        let len = region.len();
        let filled = (len - before) as u64;
        self.note_memory(len);
        res.map_err(|e| Error::io("read_from", filled, e))?;

        if max == 0 || len < max {
            return Ok(filled);
        }

        // Memory is full; only spill if the source has more to give.
        let mut probe = vec![0u8; transfer::COPY_CHUNK];
        let m = read_retrying(&mut src, &mut probe)
            .map_err(|e| Error::io("read_from", filled, e))?;
        if m == 0 {
            return Ok(filled);
        }

        let mut file = self.prepare_spill().map_err(|e| e.after(filled))?;
        let res = write_all_counted(&mut file, &probe[..m], "read_from", filled)
            .and_then(|()| pump(&mut src, &mut file, "read_from", filled + m as u64));
        self.install(file);
        let rest = res?;
        self.note_spilled(m as u64 + rest);
        Ok(filled + m as u64 + rest)
    }

    /// Write every unread byte to `sink` and return the count.
    ///
    /// The cursor ends up at the end of the stream, or after the last byte
    /// the sink accepted if it fails.
    pub fn write_to<W: Write>(&mut self, mut sink: W) -> Result<u64> {
        let start = self.cursor;
        let res = match &self.backing {
            Backing::Empty => Ok(0),
            Backing::Memory(region) => {
                let from = usize::try_from(start).unwrap_or(usize::MAX).min(region.len());
                let tail = &region[from..];
                write_all_counted(&mut sink, tail, "write_to", 0).map(|_| tail.len() as u64)
            }
            Backing::Disk(file) => pump(&mut file.reader_at(start), &mut sink, "write_to", 0),
        };
        match &res {
            Ok(n) => self.cursor = start + n,
            Err(e) => self.cursor = start + e.transferred(),
        }
        res
    }

    /// Reset the cursor to the start. For a spilled buffer the file is also
    /// repositioned at its start.
    pub fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        if let Backing::Disk(file) = &mut self.backing {
            file.rewind().map_err(|e| Error::io("rewind", 0, e))?;
        }
        Ok(())
    }

    /// Move the cursor. Positions past the end are allowed and read as end of
    /// stream.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(d) => i128::from(self.cursor) + i128::from(d),
            SeekFrom::End(d) => i128::from(self.len()) + i128::from(d),
        };
        self.cursor = u64::try_from(target).map_err(|_| Error::Seek { offset: target })?;
        Ok(self.cursor)
    }

    /// Second buffer over the same data for an independent reader.
    ///
    /// Memory is shared; a temp file gets a duplicated OS handle. The clone
    /// starts at the same cursor. Every clone must be closed (or dropped) by
    /// its owner, and neither side may write afterwards.
    pub fn try_clone(&self) -> Result<Self> {
        let backing = match &self.backing {
            Backing::Empty => Backing::Empty,
            Backing::Memory(region) => Backing::Memory(Arc::clone(region)),
            Backing::Disk(file) => {
                let dup = file.try_clone().map_err(Error::HandleDuplication)?;
                if let Some(t) = &self.tracker {
                    t.file_opened();
                }
                Backing::Disk(dup)
            }
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(spilled = backing.is_disk(), len = backing.len(), "cloned buffer");
        Ok(Self {
            config: self.config.clone(),
            factory: Arc::clone(&self.factory),
            tracker: self.tracker.clone(),
            backing,
            cursor: self.cursor,
        })
    }

    /// Release the file handle or memory region.
    ///
    /// Disk space for a spilled buffer is reclaimed once every clone has been
    /// closed too.
    pub fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if let Backing::Disk(file) = std::mem::replace(&mut self.backing, Backing::Empty) {
            factory::unlink_leftover(&file);
            if let Some(t) = &self.tracker {
                t.file_closed();
            }
            #[cfg(feature = "tracing")]
            tracing::trace!(len = file.len(), "closed spilled buffer");
        }
        self.cursor = 0;
    }
}

impl Drop for SpillBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SpillBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillBuffer")
            .field("threshold", &self.config.threshold_bytes)
            .field("len", &self.len())
            .field("cursor", &self.cursor)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}

impl Read for SpillBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SpillBuffer::read(self, buf).map_err(Into::into)
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SpillBuffer::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Disk(file) => file.flush(),
            _ => Ok(()),
        }
    }
}

impl Seek for SpillBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        SpillBuffer::seek(self, pos).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests;
