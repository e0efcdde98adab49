//! Sender: walk a source path and stream it as entry frames
//!
//! One synchronous pass. A directory is sent relative to its parent so
//! the receiver recreates the directory itself, and every directory frame
//! precedes the frames of its descendants. Any error ends the run.

use crate::codec::{write_directory, write_file_header, Entry};
use crate::logger::Logger;
use crate::progress::TransferProgress;
use crate::protocol::CHUNK_SIZE;
use crate::protocol_core::to_wire_path;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A local filesystem node and the wire path it is sent under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub rel: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
}

/// Walk `src` in send order.
///
/// Depth-first, directories before their children. Within a directory the
/// files go first, then the subdirectories, each group sorted by name.
/// Symlinks and special files have no frame and are reported through
/// `on_skip`. A walk error aborts the whole plan.
pub fn walk_source(src: &Path, mut on_skip: impl FnMut(&Path)) -> Result<Vec<SourceEntry>> {
    // Names come from the path as given; `.` and `..` have none of their own
    let src = match src.file_name() {
        Some(_) => src.to_path_buf(),
        None => src
            .canonicalize()
            .with_context(|| format!("source not found: {}", src.display()))?,
    };
    let meta =
        std::fs::metadata(&src).with_context(|| format!("source not found: {}", src.display()))?;

    if meta.is_file() {
        let name = src
            .file_name()
            .ok_or_else(|| anyhow!("source has no file name: {}", src.display()))?;
        return Ok(vec![SourceEntry {
            rel: to_wire_path(Path::new(name)),
            path: src,
            is_dir: false,
        }]);
    }
    if !meta.is_dir() {
        bail!("source is neither a file nor a directory: {}", src.display());
    }

    let base = src
        .parent()
        .ok_or_else(|| anyhow!("cannot send a filesystem root: {}", src.display()))?
        .to_path_buf();

    let mut entries = Vec::new();
    let walker = WalkDir::new(&src).follow_links(false).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });
    for item in walker {
        let item = item.with_context(|| format!("walking {}", src.display()))?;
        let ft = item.file_type();
        if !ft.is_dir() && !ft.is_file() {
            on_skip(item.path());
            continue;
        }
        let rel = item
            .path()
            .strip_prefix(&base)
            .with_context(|| format!("{} is outside {}", item.path().display(), base.display()))?;
        entries.push(SourceEntry {
            rel: to_wire_path(rel),
            path: item.path().to_path_buf(),
            is_dir: ft.is_dir(),
        });
    }
    Ok(entries)
}

/// The entries a send of `src` would produce, sizes taken from metadata now.
pub fn plan_entries(src: &Path) -> Result<Vec<Entry>> {
    walk_source(src, |_| {})?
        .into_iter()
        .map(|e| {
            Ok(if e.is_dir {
                Entry::Directory { rel_path: e.rel }
            } else {
                let size = std::fs::metadata(&e.path)
                    .with_context(|| format!("stat {}", e.path.display()))?
                    .len();
                Entry::File {
                    rel_path: e.rel,
                    size,
                }
            })
        })
        .collect()
}

/// Stream `src` (file or directory tree) as frames into `w`.
pub fn send_path<W: Write>(
    w: &mut W,
    src: &Path,
    logger: &dyn Logger,
    progress: &mut TransferProgress,
) -> Result<SendSummary> {
    let entries = walk_source(src, |p| {
        logger.notice(&format!("Skipping non-regular file: {}", p.display()));
        progress.print_file_op("Skipping", &p.display().to_string());
    })?;

    let mut summary = SendSummary::default();
    for entry in entries {
        if entry.is_dir {
            write_directory(w, &entry.rel)
                .with_context(|| format!("sending directory {}", entry.rel))?;
            logger.sent('D', &entry.rel, 0);
            progress.print_file_op("Directory", &entry.rel);
            summary.dirs += 1;
        } else {
            let bytes = send_file(w, &entry.path, &entry.rel, logger, progress)?;
            summary.files += 1;
            summary.bytes += bytes;
        }
    }
    w.flush().context("flushing connection")?;
    Ok(summary)
}

/// Header then body in `CHUNK_SIZE` pieces. Returns the body length.
pub fn send_file<W: Write>(
    w: &mut W,
    path: &Path,
    rel: &str,
    logger: &dyn Logger,
    progress: &mut TransferProgress,
) -> Result<u64> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let size = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();

    write_file_header(w, rel, size).with_context(|| format!("sending header for {}", rel))?;
    logger.sent('F', rel, size);
    progress.print_file_op("File", rel);
    progress.begin_file(rel, size);

    let sent = stream_body(&mut file, w, rel, size, progress)
        .with_context(|| format!("sending {}", path.display()))?;
    progress.end_file();
    Ok(sent)
}

/// Copy exactly `size` bytes from `reader` to `w` in `CHUNK_SIZE` pieces.
///
/// The header already promised `size` bytes: running out first is an
/// error, and anything past `size` is left unread.
pub fn stream_body<R: Read, W: Write>(
    reader: &mut R,
    w: &mut W,
    rel: &str,
    size: u64,
    progress: &TransferProgress,
) -> Result<u64> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    while sent < size {
        let want = (size - sent).min(CHUNK_SIZE as u64) as usize;
        let n = match reader.read(&mut buffer[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).with_context(|| format!("read {}", rel)),
        };
        if n == 0 {
            bail!("{} shrank while sending: {} of {} bytes", rel, sent, size);
        }
        w.write_all(&buffer[..n])
            .with_context(|| format!("sending body of {}", rel))?;
        sent += n as u64;
        progress.advance(sent);
    }
    Ok(sent)
}

/// Connect, send one session, close the write side and wait for the
/// receiver to hang up.
pub fn push(
    host: &str,
    port: u16,
    src: &Path,
    logger: &dyn Logger,
    progress: &mut TransferProgress,
) -> Result<SendSummary> {
    let stream = TcpStream::connect((host, port))
        .with_context(|| format!("connect {}:{}", host, port))?;
    let _ = stream.set_nodelay(true);

    let mut writer = BufWriter::with_capacity(CHUNK_SIZE * 16, stream);
    let summary = send_path(&mut writer, src, logger, progress)?;
    let mut stream = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("flushing connection")?;

    stream
        .shutdown(Shutdown::Write)
        .context("closing write side")?;
    // The receiver closes once it has read end-of-stream
    let _ = io::copy(&mut stream, &mut io::sink());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_entry;
    use crate::logger::NoopLogger;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn make_photos(root: &Path) -> PathBuf {
        let photos = root.join("photos");
        std::fs::create_dir_all(photos.join("2020")).unwrap();
        std::fs::write(photos.join("a.jpg"), [1u8; 10]).unwrap();
        std::fs::write(photos.join("2020").join("b.jpg"), [2u8; 20]).unwrap();
        photos
    }

    #[test]
    fn test_plan_order_parent_before_children() {
        let tmp = TempDir::new().unwrap();
        let photos = make_photos(tmp.path());

        let plan = plan_entries(&photos).unwrap();
        assert_eq!(
            plan,
            vec![
                Entry::Directory {
                    rel_path: "photos".into()
                },
                Entry::File {
                    rel_path: "photos/a.jpg".into(),
                    size: 10
                },
                Entry::Directory {
                    rel_path: "photos/2020".into()
                },
                Entry::File {
                    rel_path: "photos/2020/b.jpg".into(),
                    size: 20
                },
            ]
        );
    }

    #[test]
    fn test_single_file_uses_its_name() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("report.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let plan = plan_entries(&file).unwrap();
        assert_eq!(
            plan,
            vec![Entry::File {
                rel_path: "report.pdf".into(),
                size: 4
            }]
        );
    }

    #[test]
    fn test_send_path_wire_bytes_decode_back() {
        let tmp = TempDir::new().unwrap();
        let photos = make_photos(tmp.path());

        let mut wire = Vec::new();
        let mut progress = TransferProgress::new(false);
        let summary = send_path(&mut wire, &photos, &NoopLogger, &mut progress).unwrap();
        assert_eq!(
            summary,
            SendSummary {
                files: 2,
                dirs: 2,
                bytes: 30
            }
        );

        let mut r = Cursor::new(wire);
        let mut seen = Vec::new();
        while let Some(entry) = read_entry(&mut r).unwrap() {
            let mut body = Vec::new();
            (&mut r).take(entry.body_len()).read_to_end(&mut body).unwrap();
            assert_eq!(body.len() as u64, entry.body_len());
            seen.push(entry.rel_path().to_string());
        }
        assert_eq!(
            seen,
            ["photos", "photos/a.jpg", "photos/2020", "photos/2020/b.jpg"]
        );
    }

    #[test]
    fn test_large_file_streams_in_chunks() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&file, &data).unwrap();

        let mut wire = Vec::new();
        let mut progress = TransferProgress::new(false);
        let sent = send_file(&mut wire, &file, "big.bin", &NoopLogger, &mut progress).unwrap();
        assert_eq!(sent, data.len() as u64);

        let header = format!("F\nbig.bin\n{}\n", data.len());
        assert_eq!(&wire[..header.len()], header.as_bytes());
        assert_eq!(&wire[header.len()..], &data[..]);
    }

    #[test]
    fn test_shrinking_file_fails_the_send() {
        let mut wire = Vec::new();
        let progress = TransferProgress::new(false);
        let err = stream_body(&mut Cursor::new(vec![5u8; 6]), &mut wire, "log.txt", 10, &progress)
            .unwrap_err();
        assert!(err.to_string().contains("shrank"), "{}", err);
        assert_eq!(wire, vec![5u8; 6]);
    }

    #[test]
    fn test_growing_file_sends_only_announced_bytes() {
        let data: Vec<u8> = (0..(CHUNK_SIZE + 300)).map(|i| (i % 199) as u8).collect();
        let mut reader = Cursor::new(data.clone());
        let mut wire = Vec::new();
        let progress = TransferProgress::new(false);
        let size = (CHUNK_SIZE + 10) as u64;

        let sent = stream_body(&mut reader, &mut wire, "log.txt", size, &progress).unwrap();
        assert_eq!(sent, size);
        assert_eq!(&wire[..], &data[..size as usize]);
        assert_eq!(reader.position(), size);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_source_keeps_its_own_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("real.bin"), b"abc").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real.bin"), tmp.path().join("report.bin"))
            .unwrap();

        let plan = plan_entries(&tmp.path().join("report.bin")).unwrap();
        assert_eq!(
            plan,
            vec![Entry::File {
                rel_path: "report.bin".into(),
                size: 3
            }]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_source_keeps_its_own_name() {
        let tmp = TempDir::new().unwrap();
        let photos = make_photos(tmp.path());
        std::os::unix::fs::symlink(&photos, tmp.path().join("album")).unwrap();

        let rels: Vec<String> = plan_entries(&tmp.path().join("album"))
            .unwrap()
            .into_iter()
            .map(|e| e.rel_path().to_string())
            .collect();
        assert_eq!(rels, ["album", "album/a.jpg", "album/2020", "album/2020/b.jpg"]);
    }

    #[test]
    fn test_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(plan_entries(&tmp.path().join("nope")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let photos = make_photos(tmp.path());
        std::os::unix::fs::symlink(photos.join("a.jpg"), photos.join("link.jpg")).unwrap();

        let mut skipped = Vec::new();
        let entries = walk_source(&photos, |p| skipped.push(p.to_path_buf())).unwrap();
        assert_eq!(skipped.len(), 1);
        assert!(entries.iter().all(|e| !e.rel.ends_with("link.jpg")));
    }
}
