//! Receiver: accept connections and materialize entry frames under a root
//!
//! Each connection runs one [`Session`]: read a frame, apply it, repeat
//! until the peer closes its write side. Failures scoped to one entry are
//! reported and the session moves on; failures that leave the stream
//! position unknown end the session.
//!
//! The body of a file frame is always consumed in full while the stream is
//! healthy, including when the path is rejected or the local write fails,
//! so the next header is read from the right offset.

use crate::codec::{discard_body, read_entry, Entry};
use crate::error::{Result, TransferError};
use crate::logger::Logger;
use crate::protocol::CHUNK_SIZE;
use crate::protocol_core::{ensure_dir_exists, ensure_parent_exists, resolve_under_root};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Per-connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    ReadingEntry,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Every entry processed, successful or not
    pub entries: u64,
    pub directories: u64,
    pub files: u64,
    pub failed: u64,
    pub bytes: u64,
    /// Why the session ended early, if it did
    pub aborted: Option<String>,
}

impl SessionSummary {
    pub fn completed(&self) -> bool {
        self.aborted.is_none()
    }
}

pub struct Session<'a, R> {
    reader: R,
    root: &'a Path,
    logger: &'a dyn Logger,
    state: SessionState,
    summary: SessionSummary,
}

impl<'a, R: BufRead> Session<'a, R> {
    /// `root` must already exist and be canonical.
    pub fn new(reader: R, root: &'a Path, logger: &'a dyn Logger) -> Self {
        Self {
            reader,
            root,
            logger,
            state: SessionState::ReadingEntry,
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process frames until end of stream or a session-fatal error.
    pub fn run(mut self) -> SessionSummary {
        while self.state == SessionState::ReadingEntry {
            self.step();
        }
        self.summary
    }

    /// Read and apply one frame.
    pub fn step(&mut self) -> SessionState {
        if self.state == SessionState::Closed {
            return self.state;
        }
        match read_entry(&mut self.reader) {
            Ok(None) => self.state = SessionState::Closed,
            Ok(Some(entry)) => {
                self.summary.entries += 1;
                let path = entry.rel_path().to_string();
                if let Err(e) = self.apply(entry) {
                    self.fail(&path, e);
                }
            }
            Err(e) => {
                self.summary.entries += 1;
                let path = e.path().unwrap_or("-").to_string();
                self.fail(&path, e);
            }
        }
        self.state
    }

    fn fail(&mut self, path: &str, e: TransferError) {
        self.summary.failed += 1;
        let context = match &e {
            TransferError::UnsafePath { .. } => "unsafe-path",
            TransferError::Entry { .. } => "entry",
            TransferError::SizeMismatch { .. } => "size-mismatch",
            TransferError::Stream(_) | TransferError::Desync(_) => "stream",
            TransferError::Startup(_) => "startup",
        };
        self.logger.error(context, path, &e.to_string());
        if e.is_session_fatal() {
            self.summary.aborted = Some(e.to_string());
            self.state = SessionState::Closed;
        }
    }

    fn apply(&mut self, entry: Entry) -> Result<()> {
        match entry {
            Entry::Directory { rel_path } => {
                let dst = resolve_under_root(self.root, &rel_path)?;
                ensure_dir_exists(&dst)
                    .map_err(|e| TransferError::entry(&rel_path, format!("create directory: {}", e)))?;
                self.logger.dir_created(&dst);
                self.summary.directories += 1;
            }
            Entry::File { rel_path, size } => {
                let bytes = self.receive_file(&rel_path, size)?;
                self.summary.files += 1;
                self.summary.bytes += bytes;
            }
        }
        Ok(())
    }

    fn receive_file(&mut self, rel: &str, size: u64) -> Result<u64> {
        let dst = match resolve_under_root(self.root, rel) {
            Ok(dst) => dst,
            Err(e) => return Err(self.skip_body(rel, size, e)),
        };
        // Parents are created even when no directory frame came first
        if let Err(e) = ensure_parent_exists(&dst) {
            let e = TransferError::entry(rel, format!("create parent directory: {}", e));
            return Err(self.skip_body(rel, size, e));
        }
        let mut file = match File::create(&dst) {
            Ok(f) => f,
            Err(e) => {
                let e = TransferError::entry(rel, format!("create {}: {}", dst.display(), e));
                return Err(self.skip_body(rel, size, e));
            }
        };

        match copy_body(&mut self.reader, &mut file, rel, size) {
            Ok(received) => {
                drop(file);
                self.logger.file_done(&dst, received);
                Ok(received)
            }
            Err(e) => {
                drop(file);
                remove_partial(&dst, self.logger);
                Err(e)
            }
        }
    }

    /// Drop the body of a rejected file frame and hand back `cause`, unless
    /// the stream itself fails first.
    fn skip_body(&mut self, rel: &str, size: u64, cause: TransferError) -> TransferError {
        match discard_body(&mut self.reader, size) {
            Ok(received) if received == size => cause,
            Ok(received) => TransferError::SizeMismatch {
                path: rel.to_string(),
                expected: size,
                received,
            },
            Err(e) => TransferError::Stream(e),
        }
    }
}

/// Remove a file left behind by a failed body copy.
fn remove_partial(dst: &Path, logger: &dyn Logger) {
    match fs::remove_file(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => logger.notice(&format!(
            "could not remove partial file {}: {}",
            dst.display(),
            e
        )),
    }
}

/// Copy exactly `size` body bytes from the stream into `out`.
///
/// A local write failure stops writing but keeps reading until the body is
/// consumed, then reports an entry error. The stream ending first is a
/// [`TransferError::SizeMismatch`].
pub fn copy_body<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    rel: &str,
    size: u64,
) -> Result<u64> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut received = 0u64;
    let mut write_error: Option<io::Error> = None;

    while received < size {
        let want = (size - received).min(CHUNK_SIZE as u64) as usize;
        let n = match reader.read(&mut buffer[..want]) {
            Ok(0) => {
                return Err(TransferError::SizeMismatch {
                    path: rel.to_string(),
                    expected: size,
                    received,
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Stream(e)),
        };
        if write_error.is_none() {
            if let Err(e) = out.write_all(&buffer[..n]) {
                write_error = Some(e);
            }
        }
        received += n as u64;
    }

    if write_error.is_none() {
        if let Err(e) = out.flush() {
            write_error = Some(e);
        }
    }
    match write_error {
        Some(e) => Err(TransferError::entry(rel, format!("write failed: {}", e))),
        None => Ok(received),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServeMode {
    /// One connection at a time; others queue in the listen backlog
    #[default]
    Sequential,
    /// One thread and one independent session per connection
    Concurrent,
}

/// Destination root and logger shared by every connection.
#[derive(Clone)]
pub struct Receiver {
    root: Arc<PathBuf>,
    logger: Arc<dyn Logger>,
    mode: ServeMode,
}

impl Receiver {
    /// Create the destination root if missing and canonicalize it.
    pub fn new(root: &Path, logger: Arc<dyn Logger>) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| {
            TransferError::Startup(format!("create destination root {}: {}", root.display(), e))
        })?;
        let root = root.canonicalize().map_err(|e| {
            TransferError::Startup(format!("resolve destination root {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root: Arc::new(root),
            logger,
            mode: ServeMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: ServeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one session over any buffered reader.
    pub fn receive<R: BufRead>(&self, reader: R, peer: &str) -> SessionSummary {
        let started = Instant::now();
        self.logger.start(peer, &self.root);
        let summary = Session::new(reader, &self.root, self.logger.as_ref()).run();
        self.logger.done(
            peer,
            summary.entries,
            summary.bytes,
            started.elapsed().as_secs_f64(),
        );
        summary
    }

    /// Run one session over an accepted connection, then close it.
    pub fn handle_connection(&self, stream: TcpStream) -> SessionSummary {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let reader = BufReader::with_capacity(CHUNK_SIZE * 16, &stream);
        self.receive(reader, &peer)
    }

    /// Accept loop. Only returns if the listener itself stops yielding.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => match self.mode {
                    ServeMode::Sequential => {
                        self.handle_connection(stream);
                    }
                    ServeMode::Concurrent => {
                        let receiver = self.clone();
                        thread::spawn(move || {
                            receiver.handle_connection(stream);
                        });
                    }
                },
                Err(e) => {
                    self.logger.error("accept", "", &e.to_string());
                }
            }
        }
        Ok(())
    }
}

/// Bind the listening socket; failure is a startup error.
pub fn bind<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<TcpListener> {
    TcpListener::bind(&addr).map_err(|e| TransferError::Startup(format!("bind {}: {}", addr, e)))
}
