use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn start(&self, _peer: &str, _root: &Path) {}
    fn sent(&self, _kind: char, _rel: &str, _bytes: u64) {}
    fn dir_created(&self, _path: &Path) {}
    fn file_done(&self, _path: &Path, _bytes: u64) {}
    fn notice(&self, _msg: &str) {}
    fn error(&self, _context: &str, _path: &str, _msg: &str) {}
    fn done(&self, _peer: &str, _entries: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Human readable progress on stdout.
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn start(&self, peer: &str, root: &Path) {
        println!("Session from {} -> {}", peer, root.display());
    }
    fn dir_created(&self, path: &Path) {
        println!("Created directory: {}", path.display());
    }
    fn file_done(&self, path: &Path, bytes: u64) {
        println!(
            "Received file: {} ({:.2} MB)",
            path.display(),
            bytes as f64 / 1_048_576.0
        );
    }
    fn notice(&self, msg: &str) {
        println!("{}", msg);
    }
    fn error(&self, context: &str, path: &str, msg: &str) {
        println!("Error [{}] {}: {}", context, path, msg);
    }
    fn done(&self, peer: &str, entries: u64, bytes: u64, seconds: f64) {
        println!(
            "Session from {} finished: {} entries, {:.2} MB in {:.1}s",
            peer,
            entries,
            bytes as f64 / 1_048_576.0,
            seconds
        );
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, peer: &str, root: &Path) {
        self.line(&format!("START peer={} root={}", peer, root.display()));
    }
    fn sent(&self, kind: char, rel: &str, bytes: u64) {
        self.line(&format!("SEND kind={} path={} bytes={}", kind, rel, bytes));
    }
    fn dir_created(&self, path: &Path) {
        self.line(&format!("MKDIR path={}", path.display()));
    }
    fn file_done(&self, path: &Path, bytes: u64) {
        self.line(&format!("FILE path={} bytes={}", path.display(), bytes));
    }
    fn notice(&self, msg: &str) {
        self.line(&format!("NOTE {}", msg));
    }
    fn error(&self, context: &str, path: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} path={} msg={}", context, path, msg));
    }
    fn done(&self, peer: &str, entries: u64, bytes: u64, seconds: f64) {
        self.line(&format!(
            "DONE peer={peer} entries={entries} bytes={bytes} seconds={seconds:.3}"
        ));
    }
}

/// Fan every event out to two loggers (console + log file).
pub struct Tee<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: Logger, B: Logger> Logger for Tee<A, B> {
    fn start(&self, peer: &str, root: &Path) {
        self.first.start(peer, root);
        self.second.start(peer, root);
    }
    fn sent(&self, kind: char, rel: &str, bytes: u64) {
        self.first.sent(kind, rel, bytes);
        self.second.sent(kind, rel, bytes);
    }
    fn dir_created(&self, path: &Path) {
        self.first.dir_created(path);
        self.second.dir_created(path);
    }
    fn file_done(&self, path: &Path, bytes: u64) {
        self.first.file_done(path, bytes);
        self.second.file_done(path, bytes);
    }
    fn notice(&self, msg: &str) {
        self.first.notice(msg);
        self.second.notice(msg);
    }
    fn error(&self, context: &str, path: &str, msg: &str) {
        self.first.error(context, path, msg);
        self.second.error(context, path, msg);
    }
    fn done(&self, peer: &str, entries: u64, bytes: u64, seconds: f64) {
        self.first.done(peer, entries, bytes, seconds);
        self.second.done(peer, entries, bytes, seconds);
    }
}

/// Console output, plus a timestamped log file when one is requested.
pub fn build_logger(log_file: Option<&Path>) -> Result<std::sync::Arc<dyn Logger>> {
    Ok(match log_file {
        Some(p) => std::sync::Arc::new(Tee {
            first: ConsoleLogger,
            second: TextLogger::new(p)?,
        }),
        None => std::sync::Arc::new(ConsoleLogger),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_logger_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("ftx.log");
        let logger = TextLogger::new(&log_path).unwrap();
        logger.dir_created(Path::new("/dst/photos"));
        logger.error("entry", "../x", "unsafe path");
        drop(logger);

        let text = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].contains("MKDIR path=/dst/photos"));
        assert!(lines[1].contains("ERROR ctx=entry path=../x"));
    }
}
