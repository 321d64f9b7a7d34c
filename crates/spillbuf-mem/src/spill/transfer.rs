//! Counted copy loops for the bulk paths.
//!
//! `io::copy` drops the byte count when it fails; these keep it so the error
//! can say how far the transfer got.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub(crate) const COPY_CHUNK: usize = 64 * 1024;

/// Copy `src` into `dst` until end of stream. `base` is added to the count
/// reported in errors.
pub(crate) fn pump<R, W>(src: &mut R, dst: &mut W, op: &'static str, base: u64) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut chunk = vec![0u8; COPY_CHUNK];
    let mut moved = 0u64;
    loop {
        let n = match src.read(&mut chunk) {
            Ok(0) => return Ok(moved),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io(op, base + moved, e)),
        };
        write_all_counted(dst, &chunk[..n], op, base + moved)?;
        moved += n as u64;
    }
}

/// `write_all` that reports partial progress on failure.
pub(crate) fn write_all_counted<W>(dst: &mut W, mut buf: &[u8], op: &'static str, base: u64) -> Result<()>
where
    W: Write + ?Sized,
{
    let mut written = 0u64;
    while !buf.is_empty() {
        match dst.write(buf) {
            Ok(0) => {
                let e = io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes");
                return Err(Error::io(op, base + written, e));
            }
            Ok(n) => {
                buf = &buf[n..];
                written += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::io(op, base + written, e)),
        }
    }
    Ok(())
}

/// Read once, retrying interrupts.
pub(crate) fn read_retrying<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
