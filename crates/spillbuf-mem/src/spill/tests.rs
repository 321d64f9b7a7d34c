use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use spillbuf_core::{NamePattern, SpillConfig};

use super::*;
use crate::tracking::SpillTracker;

fn random_bytes(n: usize) -> Vec<u8> {
    let mut data = vec![0u8; n];
    rand::thread_rng().fill(&mut data[..]);
    data
}

fn read_all(buf: &mut SpillBuffer) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 100];
    loop {
        let n = buf.read(&mut chunk).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Factory that always fails, like a full or read-only temp dir.
struct NoSpace;

impl TempFileFactory for NoSpace {
    fn create(&self, _dir: &Path, _pattern: NamePattern<'_>) -> io::Result<(File, PathBuf)> {
        Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
    }
}

/// Factory whose reported path cannot be removed.
struct StalePath;

impl TempFileFactory for StalePath {
    fn create(&self, dir: &Path, _pattern: NamePattern<'_>) -> io::Result<(File, PathBuf)> {
        let file = tempfile::tempfile_in(dir)?;
        Ok((file, dir.join("spillbuf-already-gone")))
    }
}

/// Factory handing out a handle that cannot be written.
struct ReadOnly;

impl TempFileFactory for ReadOnly {
    fn create(&self, dir: &Path, _pattern: NamePattern<'_>) -> io::Result<(File, PathBuf)> {
        let (_, path) = tempfile::Builder::new()
            .prefix("spillbuf-read-only")
            .tempfile_in(dir)?
            .keep()
            .map_err(|e| e.error)?;
        let file = File::open(&path)?;
        Ok((file, path))
    }
}

fn memory_capacity(buf: &SpillBuffer) -> usize {
    match &buf.backing {
        Backing::Memory(region) => region.capacity(),
        _ => 0,
    }
}

/// Source yielding `data` in small pieces, then failing at `fail_at`.
struct Flaky {
    data: Vec<u8>,
    pos: usize,
    fail_at: usize,
}

impl Read for Flaky {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.fail_at {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
        }
        let end = self.fail_at.min(self.data.len()).min(self.pos + 100);
        let n = buf.len().min(end - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn test_write_exactly_threshold_stays_in_memory() {
    let mut buf = SpillBuffer::new(256);
    buf.write(&[7u8; 200]).unwrap();
    buf.write(&[7u8; 56]).unwrap();
    assert!(!buf.is_spilled());
    assert_eq!(buf.len(), 256);

    buf.write(&[7u8; 1]).unwrap();
    assert!(buf.is_spilled());
    assert_eq!(buf.len(), 257);
    assert!(buf.spill_path().is_some());
}

#[test]
fn test_zero_threshold_never_spills() {
    let data = random_bytes(1 << 16);
    let mut buf = SpillBuffer::new(0);
    buf.write(&data).unwrap();
    assert_eq!(buf.read_from(&data[..]).unwrap(), data.len() as u64);
    assert!(!buf.is_spilled());
    assert_eq!(buf.len(), 2 * data.len() as u64);
}

#[test]
fn test_read_from_exactly_threshold_stays_in_memory() {
    let data = random_bytes(256);
    let mut buf = SpillBuffer::new(256);
    assert_eq!(buf.read_from(&data[..]).unwrap(), 256);
    assert!(!buf.is_spilled());

    let mut buf = SpillBuffer::new(256);
    let more = random_bytes(257);
    assert_eq!(buf.read_from(&more[..]).unwrap(), 257);
    assert!(buf.is_spilled());
    assert_eq!(read_all(&mut buf), more);
}

#[test]
fn test_read_from_tops_up_partial_memory() {
    let head = random_bytes(100);
    let tail = random_bytes(1000);
    let mut buf = SpillBuffer::new(256);
    buf.write(&head).unwrap();
    assert_eq!(buf.read_from(&tail[..]).unwrap(), 1000);
    assert!(buf.is_spilled());

    let mut expected = head.clone();
    expected.extend_from_slice(&tail);
    assert_eq!(read_all(&mut buf), expected);
}

#[test]
fn test_read_past_end_is_eof() {
    let mut buf = SpillBuffer::new(16);
    buf.write(b"abc").unwrap();
    let mut out = [0u8; 8];
    assert_eq!(buf.read(&mut out).unwrap(), 3);
    assert_eq!(buf.read(&mut out).unwrap(), 0);
    assert_eq!(buf.read(&mut out).unwrap(), 0);

    let mut empty = SpillBuffer::new(16);
    assert_eq!(empty.read(&mut out).unwrap(), 0);
}

#[test]
fn test_read_at_leaves_cursor_alone() {
    for threshold in [0usize, 4] {
        let mut buf = SpillBuffer::new(threshold);
        buf.write(b"0123456789").unwrap();
        assert_eq!(buf.is_spilled(), threshold != 0);

        let mut two = [0u8; 2];
        buf.read(&mut two).unwrap();
        assert_eq!(&two, b"01");

        let mut four = [0u8; 4];
        assert_eq!(buf.read_at(&mut four, 6).unwrap(), 4);
        assert_eq!(&four, b"6789");
        assert_eq!(buf.read_at(&mut four, 10).unwrap(), 0);
        assert_eq!(buf.position(), 2);

        buf.read(&mut two).unwrap();
        assert_eq!(&two, b"23");
    }
}

#[test]
fn test_write_to_drains_from_cursor() {
    for threshold in [0usize, 8] {
        let mut buf = SpillBuffer::new(threshold);
        buf.write(b"hello spilled world").unwrap();
        buf.seek(SeekFrom::Start(6)).unwrap();

        let mut out = Vec::new();
        assert_eq!(buf.write_to(&mut out).unwrap(), 13);
        assert_eq!(out, b"spilled world");
        assert_eq!(buf.remaining(), 0);

        let mut again = Vec::new();
        assert_eq!(buf.write_to(&mut again).unwrap(), 0);
        assert!(again.is_empty());
    }
}

#[test]
fn test_seek_variants() {
    let mut buf = SpillBuffer::new(0);
    buf.write(b"abcdef").unwrap();
    assert_eq!(buf.seek(SeekFrom::End(-2)).unwrap(), 4);
    assert_eq!(buf.seek(SeekFrom::Current(-3)).unwrap(), 1);
    assert_eq!(buf.seek(SeekFrom::Start(100)).unwrap(), 100);
    let mut out = [0u8; 4];
    assert_eq!(buf.read(&mut out).unwrap(), 0);

    let err = buf.seek(SeekFrom::End(-7)).unwrap_err();
    assert!(matches!(err, Error::Seek { offset: -1 }));
    assert_eq!(buf.position(), 100);
}

#[test]
fn test_rewind_is_idempotent() {
    let data = random_bytes(1000);
    let mut buf = SpillBuffer::new(100);
    buf.write(&data).unwrap();
    buf.rewind().unwrap();
    buf.rewind().unwrap();
    assert_eq!(read_all(&mut buf), data);
    buf.rewind().unwrap();
    assert_eq!(read_all(&mut buf), data);
}

#[test]
fn test_failed_promotion_keeps_memory() {
    let mut buf = SpillBuffer::new(8).with_temp_factory(Arc::new(NoSpace));
    buf.write(b"12345678").unwrap();

    let err = buf.write(b"9").unwrap_err();
    assert!(matches!(err, Error::TempFileCreate { .. }));
    assert!(err.to_string().contains("no space left"));
    assert!(!buf.is_spilled());
    assert_eq!(buf.len(), 8);
    assert_eq!(read_all(&mut buf), b"12345678");
}

#[test]
fn test_failed_promotion_in_read_from() {
    let mut buf = SpillBuffer::new(8).with_temp_factory(Arc::new(NoSpace));
    let mut src = &b"0123456789ABCDEF"[..];
    let err = buf.read_from(&mut src).unwrap_err();
    assert!(matches!(err, Error::TempFileCreate { .. }));
    assert_eq!(err.transferred(), 8);
    assert!(!buf.is_spilled());
    assert_eq!(buf.len(), 8);
    assert_eq!(read_all(&mut buf), b"01234567");
}

#[test]
fn test_failed_copy_keeps_memory() {
    let mut buf = SpillBuffer::new(4).with_temp_factory(Arc::new(ReadOnly));
    buf.write(b"abcd").unwrap();

    let err = buf.write(b"e").unwrap_err();
    assert!(matches!(err, Error::TempFileCopy { bytes: 4, .. }));
    assert_eq!(err.transferred(), 0);
    assert!(!buf.is_spilled());
    assert_eq!(buf.len(), 4);
    assert_eq!(read_all(&mut buf), b"abcd");
}

#[test]
fn test_failed_spilled_write_reports_appended_bytes() {
    // Promotion of an empty region succeeds; the first real append fails.
    let mut buf = SpillBuffer::new(4).with_temp_factory(Arc::new(ReadOnly));
    let err = buf.write(b"too long").unwrap_err();
    assert!(buf.is_spilled());
    assert!(matches!(err, Error::Io { op: "write", .. }));
    assert_eq!(err.transferred(), buf.len());
}

#[test]
fn test_memory_capacity_bounded_by_threshold() {
    let max = 65_537;
    let data = random_bytes(max);

    let mut buf = SpillBuffer::new(max);
    buf.read_from(&data[..]).unwrap();
    assert!(!buf.is_spilled());
    assert_eq!(buf.len(), max as u64);
    assert!(memory_capacity(&buf) <= max);

    let mut buf = SpillBuffer::new(max);
    for piece in data.chunks(1000) {
        buf.write(piece).unwrap();
        assert!(memory_capacity(&buf) <= max);
    }
    assert!(!buf.is_spilled());

    let mut buf = SpillBuffer::new(max);
    buf.write(&data[..100]).unwrap();
    buf.read_from(&data[100..]).unwrap();
    assert!(memory_capacity(&buf) <= max);
    assert_eq!(read_all(&mut buf), data);
}

#[test]
fn test_delete_error_is_fatal_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = SpillConfig {
        temp_dir: Some(dir.path().to_path_buf()),
        ..SpillConfig::with_threshold(4)
    };
    let mut buf = SpillBuffer::with_config(cfg)
        .unwrap()
        .with_temp_factory(Arc::new(StalePath));
    let err = buf.write(b"too long").unwrap_err();
    assert!(matches!(err, Error::TempFileDelete { .. }));
    assert!(!buf.is_spilled());
}

#[test]
fn test_delete_error_ignored_by_policy() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = SpillConfig {
        temp_dir: Some(dir.path().to_path_buf()),
        ignore_delete_errors: true,
        ..SpillConfig::with_threshold(4)
    };
    let mut buf = SpillBuffer::with_config(cfg)
        .unwrap()
        .with_temp_factory(Arc::new(StalePath));
    buf.write(b"too long").unwrap();
    assert!(buf.is_spilled());
    assert_eq!(read_all(&mut buf), b"too long");
    buf.close().unwrap();
}

#[test]
fn test_read_from_error_reports_stored_bytes() {
    let data = random_bytes(1000);
    for threshold in [0usize, 256, 2048] {
        let mut buf = SpillBuffer::new(threshold);
        let src = Flaky {
            data: data.clone(),
            pos: 0,
            fail_at: 700,
        };
        let err = buf.read_from(src).unwrap_err();
        assert_eq!(err.transferred(), 700, "threshold {threshold}");
        assert_eq!(buf.len(), 700);
        assert_eq!(read_all(&mut buf), &data[..700]);

        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
    }
}

#[test]
fn test_write_to_error_moves_cursor_by_accepted_bytes() {
    struct Full(usize);
    impl Write for Full {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink full"));
            }
            let n = buf.len().min(self.0);
            self.0 -= n;
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut buf = SpillBuffer::new(16);
    buf.write(&random_bytes(100)).unwrap();
    let err = buf.write_to(Full(30)).unwrap_err();
    assert_eq!(err.transferred(), 30);
    assert_eq!(buf.position(), 30);
}

#[test]
fn test_clone_of_memory_shares_snapshot() {
    let mut buf = SpillBuffer::new(1024);
    buf.write(b"shared").unwrap();
    let mut clone = buf.try_clone().unwrap();

    buf.write(b" and more").unwrap();
    assert_eq!(read_all(&mut clone), b"shared");
    assert_eq!(read_all(&mut buf), b"shared and more");
}

#[test]
fn test_clone_starts_at_original_cursor() {
    let mut buf = SpillBuffer::new(4);
    buf.write(b"0123456789").unwrap();
    let mut skip = [0u8; 3];
    buf.read(&mut skip).unwrap();

    let mut clone = buf.try_clone().unwrap();
    assert_eq!(read_all(&mut clone), b"3456789");
    clone.rewind().unwrap();
    assert_eq!(read_all(&mut clone), b"0123456789");
    assert_eq!(read_all(&mut buf), b"3456789");
}

#[test]
fn test_tracker_counts_promotions_and_handles() {
    let tracker = Arc::new(SpillTracker::new());
    let mut small = SpillBuffer::new(64).with_tracker(Arc::clone(&tracker));
    small.write(&[1u8; 40]).unwrap();

    let mut big = SpillBuffer::new(64).with_tracker(Arc::clone(&tracker));
    big.write(&[2u8; 60]).unwrap();
    big.write(&[2u8; 60]).unwrap();
    let clone = big.try_clone().unwrap();

    let stats = tracker.stats();
    assert_eq!(stats.peak_memory_bytes, 60);
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.spilled_bytes, 120);
    assert_eq!(stats.open_files, 2);

    big.close().unwrap();
    drop(clone);
    small.close().unwrap();
    assert_eq!(tracker.stats().open_files, 0);
}

#[test]
fn test_std_io_traits() {
    let data = random_bytes(5000);
    let mut buf = SpillBuffer::new(1024);
    io::copy(&mut &data[..], &mut buf).unwrap();
    Write::flush(&mut buf).unwrap();
    assert!(buf.is_spilled());

    Seek::seek(&mut buf, SeekFrom::Start(0)).unwrap();
    let mut out = Vec::new();
    Read::read_to_end(&mut buf, &mut out).unwrap();
    assert_eq!(out, data);

    let err = Seek::seek(&mut buf, SeekFrom::Current(-6000)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn test_invalid_pattern_rejected() {
    let cfg = SpillConfig {
        temp_pattern: "nested/dir-*".into(),
        ..SpillConfig::with_threshold(4)
    };
    let err = SpillBuffer::with_config(cfg).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_buffer_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<SpillBuffer>();
}
