//! Frame codec: textual header, raw binary body
//!
//! The header is newline-terminated text so a human (or a packet dump) can
//! follow progress; the body that follows a file header is exactly `size`
//! raw bytes with no escaping and no terminator. Decoding only ever reads
//! the header; the body stays on the stream for the caller to copy or
//! discard.

use crate::error::{Result, TransferError};
use crate::protocol::{marker, MAX_HEADER_LINE, NEWLINE};
use crate::protocol_core::validate_relative_path;
use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

/// One unit of transfer as it appears in a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory { rel_path: String },
    File { rel_path: String, size: u64 },
}

impl Entry {
    pub fn rel_path(&self) -> &str {
        match self {
            Entry::Directory { rel_path } | Entry::File { rel_path, .. } => rel_path,
        }
    }

    /// Bytes that follow the header on the wire.
    pub fn body_len(&self) -> u64 {
        match self {
            Entry::Directory { .. } => 0,
            Entry::File { size, .. } => *size,
        }
    }

    /// The relative path, checked for traversal.
    pub fn safe_path(&self) -> Result<PathBuf> {
        validate_relative_path(self.rel_path())
    }

    /// Write this entry's header.
    pub fn write_header<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Entry::Directory { rel_path } => write_directory(w, rel_path),
            Entry::File { rel_path, size } => write_file_header(w, rel_path, *size),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Directory { rel_path } => write!(f, "Directory({})", rel_path),
            Entry::File { rel_path, size } => write!(f, "File({}, {})", rel_path, size),
        }
    }
}

fn check_frameable(rel: &str) -> io::Result<()> {
    if rel.contains(['\n', '\r']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path {:?} contains a line break and cannot be framed", rel),
        ));
    }
    Ok(())
}

/// `"D\n" <rel> "\n"`
pub fn write_directory<W: Write>(w: &mut W, rel: &str) -> io::Result<()> {
    check_frameable(rel)?;
    w.write_all(&[marker::DIRECTORY, NEWLINE])?;
    w.write_all(rel.as_bytes())?;
    w.write_all(&[NEWLINE])
}

/// `"F\n" <rel> "\n" <size> "\n"`; the caller streams the body.
pub fn write_file_header<W: Write>(w: &mut W, rel: &str, size: u64) -> io::Result<()> {
    check_frameable(rel)?;
    w.write_all(&[marker::FILE, NEWLINE])?;
    w.write_all(rel.as_bytes())?;
    w.write_all(&[NEWLINE])?;
    write!(w, "{}", size)?;
    w.write_all(&[NEWLINE])
}

/// Read one header line without its terminator.
///
/// `Ok(None)` only when the stream is already at its end.
fn read_line<R: BufRead>(r: &mut R) -> Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    let n = r
        .by_ref()
        .take(MAX_HEADER_LINE as u64)
        .read_until(NEWLINE, &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&NEWLINE) {
        if n >= MAX_HEADER_LINE {
            return Err(TransferError::Desync(format!(
                "header line exceeds {} bytes",
                MAX_HEADER_LINE
            )));
        }
        return Err(TransferError::Stream(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside a frame header",
        )));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// A header line that must be present: end of stream here is a truncation.
fn expect_line<R: BufRead>(r: &mut R, what: &str) -> Result<Vec<u8>> {
    read_line(r)?.ok_or_else(|| {
        TransferError::Stream(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("connection closed before {}", what),
        ))
    })
}

/// Decode the next entry header.
///
/// Returns `Ok(None)` on a clean end of stream before any marker byte: the
/// only way a session ends successfully. Blank marker lines are skipped.
///
/// A file header whose path is not UTF-8 has its body discarded here so
/// the stream stays aligned on the next frame. A size field that does not
/// parse leaves the body length unknown, which is a [`TransferError::Desync`].
pub fn read_entry<R: BufRead>(r: &mut R) -> Result<Option<Entry>> {
    loop {
        let line = match read_line(r)? {
            Some(line) => line,
            None => return Ok(None),
        };
        let marker_text = String::from_utf8_lossy(&line);
        let marker_text = marker_text.trim();
        match marker_text.as_bytes() {
            [] => continue,
            [marker::DIRECTORY] => {
                let raw = expect_line(r, "directory path")?;
                let rel_path = String::from_utf8(raw).map_err(|e| {
                    TransferError::entry(
                        &String::from_utf8_lossy(e.as_bytes()),
                        "path is not valid UTF-8",
                    )
                })?;
                return Ok(Some(Entry::Directory { rel_path }));
            }
            [marker::FILE] => {
                let raw = expect_line(r, "file path")?;
                let size_line = expect_line(r, "file size")?;
                let lossy = String::from_utf8_lossy(&raw).into_owned();
                let size = parse_size(&size_line).ok_or_else(|| {
                    TransferError::Desync(format!(
                        "malformed size field {:?} for {:?}",
                        String::from_utf8_lossy(&size_line),
                        lossy
                    ))
                })?;
                return match String::from_utf8(raw) {
                    Ok(rel_path) => Ok(Some(Entry::File { rel_path, size })),
                    Err(_) => {
                        let received = discard_body(r, size)?;
                        if received != size {
                            return Err(TransferError::SizeMismatch {
                                path: lossy,
                                expected: size,
                                received,
                            });
                        }
                        Err(TransferError::entry(&lossy, "path is not valid UTF-8"))
                    }
                };
            }
            _ => {
                return Err(TransferError::entry(
                    marker_text,
                    format!("unknown entry type {:?}", marker_text),
                ))
            }
        }
    }
}

fn parse_size(line: &[u8]) -> Option<u64> {
    std::str::from_utf8(line).ok()?.trim().parse::<u64>().ok()
}

/// Consume and drop up to `len` body bytes; returns how many were read.
///
/// A short count means the stream ended first.
pub fn discard_body<R: Read>(r: &mut R, len: u64) -> io::Result<u64> {
    io::copy(&mut r.by_ref().take(len), &mut io::sink())
}
