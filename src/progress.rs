//! Per-file progress display for the sender
//!
//! File operations scroll above, the byte bar for the file being streamed
//! stays on the bottom line.

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Instant;

pub struct TransferProgress {
    bar: Option<ProgressBar>,
    start_time: Instant,
    visible: bool,
}

impl TransferProgress {
    pub fn new(visible: bool) -> Self {
        Self {
            bar: None,
            start_time: Instant::now(),
            visible,
        }
    }

    /// Print an operation above the progress line
    pub fn print_file_op(&self, operation: &str, path: &str) {
        if !self.visible {
            return;
        }
        let line = || {
            println!(
                "  {} {}",
                operation.with(Color::Green).bold(),
                path.with(Color::Cyan)
            );
        };
        match &self.bar {
            Some(bar) => bar.suspend(line),
            None => line(),
        }
    }

    /// Start a fresh byte bar for the next file body
    pub fn begin_file(&mut self, rel: &str, size: u64) {
        let target = if self.visible {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(size), target);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {msg} [{bar:30.green}] {bytes}/{total_bytes} ({percent}%) {bytes_per_sec}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(rel.to_string());
        self.bar = Some(bar);
    }

    pub fn advance(&self, sent: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(sent);
        }
    }

    pub fn end_file(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    pub fn finish_success(&mut self, files: u64, dirs: u64, bytes: u64) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            bytes as f64 / elapsed / 1_048_576.0
        } else {
            0.0
        };
        self.end_file();
        if self.visible {
            println!(
                "{} {} files, {} directories ({:.1} MB) in {:.1}s ({:.1} MB/s)",
                "Completed".with(Color::Green).bold(),
                files,
                dirs,
                bytes as f64 / 1_048_576.0,
                elapsed,
                throughput
            );
        }
    }

    pub fn finish_error(&mut self, msg: &str) {
        self.end_file();
        println!("{} {}", "Failed".with(Color::Red).bold(), msg);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
