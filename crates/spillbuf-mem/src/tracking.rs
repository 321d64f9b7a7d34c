//! Lightweight peak/spill tracking hooks.
//!
//! Keep this optional and cheap. One tracker is usually shared by every buffer
//! a server creates so it can report how much traffic ended up on disk.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SpillTracker {
    peak_memory_bytes: AtomicUsize,
    promotions: AtomicU64,
    spilled_bytes: AtomicU64,
    open_files: AtomicUsize,
}

/// Point-in-time copy of a tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpillStats {
    pub peak_memory_bytes: usize,
    pub promotions: u64,
    pub spilled_bytes: u64,
    pub open_files: usize,
}

impl SpillTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the in-memory size of one buffer; updates peak if higher.
    pub fn record_memory(&self, bytes: usize) {
        let mut cur = self.peak_memory_bytes.load(Ordering::Relaxed);
        while bytes > cur {
            match self.peak_memory_bytes.compare_exchange(
                cur,
                bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(bytes, "new peak in-memory buffer size");
                    break;
                }
                Err(observed) => cur = observed,
            }
        }
    }

    /// A buffer moved to a temp file, taking `copied` in-memory bytes with it.
    pub fn record_promotion(&self, copied: usize) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
        self.spilled_bytes.fetch_add(copied as u64, Ordering::Relaxed);
        self.open_files.fetch_add(1, Ordering::AcqRel);
    }

    /// Bytes written straight to an already spilled buffer.
    pub fn record_spilled(&self, bytes: u64) {
        self.spilled_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn file_opened(&self) {
        self.open_files.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn file_closed(&self) {
        self.open_files.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn peak_memory_bytes(&self) -> usize {
        self.peak_memory_bytes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> SpillStats {
        SpillStats {
            peak_memory_bytes: self.peak_memory_bytes.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            spilled_bytes: self.spilled_bytes.load(Ordering::Relaxed),
            open_files: self.open_files.load(Ordering::Acquire),
        }
    }
}
