//! Path safety and directory helpers shared by the sender and the receiver
//!
//! Every relative path decoded from the wire goes through
//! [`validate_relative_path`] before the receiver touches the filesystem.

use crate::error::{Result, TransferError};
use crate::protocol::WIRE_SEPARATOR;
use std::fs;
use std::path::{Path, PathBuf};

fn is_separator(c: char) -> bool {
    #[cfg(windows)]
    if c == '\\' {
        return true;
    }
    c == WIRE_SEPARATOR
}

/// Validate a wire path and turn it into a relative `PathBuf`.
///
/// Rejects, segment by segment:
/// 1. A leading separator (absolute path)
/// 2. A drive or volume marker as the first segment (`C:`)
/// 3. Any `..` segment
/// 4. NUL bytes
/// 5. On Windows, ':' inside any segment (ADS defense)
///
/// Empty and `.` segments are dropped. A name like `a..b.txt` is fine.
pub fn validate_relative_path(rel: &str) -> Result<PathBuf> {
    if rel.contains('\0') {
        return Err(TransferError::unsafe_path(rel, "NUL byte"));
    }
    if rel.starts_with(is_separator) {
        return Err(TransferError::unsafe_path(rel, "absolute path"));
    }

    let mut safe = PathBuf::new();
    for (idx, segment) in rel.split(is_separator).enumerate() {
        match segment {
            "" | "." => {}
            ".." => return Err(TransferError::unsafe_path(rel, "parent directory segment")),
            s => {
                if idx == 0 && is_volume_marker(s) {
                    return Err(TransferError::unsafe_path(rel, "drive or volume prefix"));
                }
                #[cfg(windows)]
                if s.contains(':') {
                    return Err(TransferError::unsafe_path(rel, "colon in path segment"));
                }
                safe.push(s);
            }
        }
    }

    if safe.as_os_str().is_empty() {
        return Err(TransferError::unsafe_path(rel, "empty path"));
    }
    Ok(safe)
}

fn is_volume_marker(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve a wire path under `root`.
///
/// The join is checked lexically first. Then the nearest ancestor present
/// on disk (the leaf itself included, symlink or not) is canonicalized so
/// a symlink already under the root cannot redirect the write elsewhere.
/// A dangling symlink has no target to check and is rejected. `root` is
/// expected to be canonical.
pub fn resolve_under_root(root: &Path, rel: &str) -> Result<PathBuf> {
    let safe = validate_relative_path(rel)?;
    let joined = root.join(&safe);
    if !joined.starts_with(root) {
        return Err(TransferError::unsafe_path(rel, "escapes destination root"));
    }

    // symlink_metadata does not follow the link, so a broken one is found
    let mut existing = joined.as_path();
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => return Ok(joined),
        }
    }
    let canonical = match existing.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) if fs::metadata(existing).is_err() => {
            return Err(TransferError::unsafe_path(rel, "dangling symlink at destination"));
        }
        Err(e) => {
            return Err(TransferError::entry(
                rel,
                format!("canonicalize {:?}: {}", existing, e),
            ))
        }
    };
    if !canonical.starts_with(root) {
        return Err(TransferError::unsafe_path(rel, "resolves outside destination root"));
    }

    Ok(joined)
}

/// Convert a local relative path to its wire form ('/' separated).
pub fn to_wire_path(rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Create parent directory if needed
pub fn ensure_parent_exists(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    Ok(())
}
