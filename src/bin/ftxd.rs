use anyhow::{Context, Result};
use clap::Parser;
use std::io;

use ftx::cli::RecvOpts;
use ftx::config::Config;
use ftx::logger::build_logger;
use ftx::receiver::{self, Receiver, ServeMode};

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = RecvOpts::parse();
    let cfg = Config::load_or_default(&opts.config_path());
    let settings = opts.resolve(&cfg, &mut io::stdin().lock(), &mut io::stdout())?;

    let logger = build_logger(opts.log_file.as_deref())?;
    let mode = if opts.concurrent {
        ServeMode::Concurrent
    } else {
        ServeMode::Sequential
    };

    // Startup failures end the process; everything after is per session
    let receiver = Receiver::new(&settings.root, logger)?.with_mode(mode);
    let listener = receiver::bind(settings.listen_addr())?;

    println!("Starting ftx receiver:");
    println!("  Root: {}", receiver.root().display());
    println!("  Listen: {}", settings.listen_addr());
    println!(
        "  Mode: {}",
        match mode {
            ServeMode::Sequential => "one connection at a time",
            ServeMode::Concurrent => "concurrent",
        }
    );

    if settings.bind.starts_with("0.0.0.0") {
        eprintln!("WARNING: listening on all interfaces; transfers are unencrypted and unauthenticated");
        eprintln!("   Only use on trusted networks (LAN)");
    }

    receiver.serve(listener)?;
    Ok(())
}
