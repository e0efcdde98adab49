//! ftx - send a file or directory tree to an ftxd receiver
//!
//! One session per run: connect, stream every entry, close. Any local or
//! network failure ends the run; re-run from the beginning to retry.

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::sync::Arc;

use ftx::cli::SendOpts;
use ftx::codec::Entry;
use ftx::config::Config;
use ftx::logger::{Logger, NoopLogger, TextLogger};
use ftx::progress::TransferProgress;
use ftx::sender;

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = SendOpts::parse();
    let cfg = Config::load_or_default(&opts.config_path());
    let settings = opts.resolve(&cfg, &mut io::stdin().lock(), &mut io::stdout())?;

    if !settings.path.exists() {
        anyhow::bail!("Error: file or directory does not exist: {}", settings.path.display());
    }

    if opts.dry_run {
        let plan = sender::plan_entries(&settings.path)?;
        for entry in &plan {
            match entry {
                Entry::Directory { rel_path } => println!("D {}", rel_path),
                Entry::File { rel_path, size } => println!("F {} ({} bytes)", rel_path, size),
            }
        }
        println!("{} entries", plan.len());
        return Ok(());
    }

    // Per-entry lines and the summary come from the progress display
    let logger: Arc<dyn Logger> = match opts.log_file {
        Some(ref p) => Arc::new(TextLogger::new(p)?),
        None => Arc::new(NoopLogger),
    };
    let mut progress = TransferProgress::new(!opts.quiet);

    println!(
        "Connecting to {}:{}, sending {}",
        settings.host,
        settings.port,
        settings.path.display()
    );
    match sender::push(
        &settings.host,
        settings.port,
        &settings.path,
        logger.as_ref(),
        &mut progress,
    ) {
        Ok(summary) => {
            progress.finish_success(summary.files, summary.dirs, summary.bytes);
            logger.done(
                &format!("{}:{}", settings.host, settings.port),
                summary.files + summary.dirs,
                summary.bytes,
                progress.elapsed_secs(),
            );
            Ok(())
        }
        Err(e) => {
            progress.finish_error(&format!("{:#}", e));
            logger.error("send", &settings.path.to_string_lossy(), &format!("{:#}", e));
            Err(e)
        }
    }
}
