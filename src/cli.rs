//! Command-line options for `ftx` and `ftxd`, plus the interactive prompts
//!
//! Precedence for every setting: flag, then interactive answer, then the
//! config file, then the built-in default.

use crate::config::{default_config_path, Config};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Send a file or a directory tree to an ftxd receiver
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "ftx", author, version)]
pub struct SendOpts {
    /// File or directory to send
    pub path: Option<PathBuf>,

    /// Receiver address (default from config, else 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Receiver port (default from config, else 9999)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Defaults file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ask for address, port and path on stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// List the frames that would be sent, without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// No progress bar or per-entry lines
    #[arg(short, long)]
    pub quiet: bool,

    /// Append timestamped events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Receive entry streams into a destination directory
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "ftxd", author, version)]
pub struct RecvOpts {
    /// Listening port (default from config, else 9999)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listening address
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Destination root (default from config, else .)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Defaults file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ask for port and destination root on stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// Serve each connection on its own thread
    #[arg(long)]
    pub concurrent: bool,

    /// Append timestamped events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendSettings {
    pub host: String,
    pub port: u16,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecvSettings {
    pub bind: String,
    pub port: u16,
    pub root: PathBuf,
}

impl RecvSettings {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Ask `label`, showing `default`; an empty answer keeps the default.
pub fn prompt_with_default<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: &str,
) -> io::Result<String> {
    if default.is_empty() {
        write!(output, "{}: ", label)?;
    } else {
        write!(output, "{} (default {}): ", label, default)?;
    }
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn parse_port(s: &str) -> Result<u16> {
    s.trim()
        .parse::<u16>()
        .with_context(|| format!("invalid port: {:?}", s))
}

impl SendOpts {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn resolve<R: BufRead, W: Write>(
        &self,
        cfg: &Config,
        input: &mut R,
        output: &mut W,
    ) -> Result<SendSettings> {
        let host = match (&self.host, self.interactive) {
            (Some(h), _) => h.clone(),
            (None, true) => prompt_with_default(input, output, "Receiver address", &cfg.default_ip)?,
            (None, false) => cfg.default_ip.clone(),
        };
        let port = match (self.port, self.interactive) {
            (Some(p), _) => p,
            (None, true) => parse_port(&prompt_with_default(
                input,
                output,
                "Receiver port",
                &cfg.default_port.to_string(),
            )?)?,
            (None, false) => cfg.default_port,
        };
        let path = match (&self.path, self.interactive) {
            (Some(p), _) => p.clone(),
            (None, true) => {
                let p = prompt_with_default(input, output, "File or directory to send", "")?;
                if p.is_empty() {
                    bail!("no path given");
                }
                PathBuf::from(p)
            }
            (None, false) => bail!("a path to send is required (or use --interactive)"),
        };
        Ok(SendSettings { host, port, path })
    }
}

impl RecvOpts {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    pub fn resolve<R: BufRead, W: Write>(
        &self,
        cfg: &Config,
        input: &mut R,
        output: &mut W,
    ) -> Result<RecvSettings> {
        let port = match (self.port, self.interactive) {
            (Some(p), _) => p,
            (None, true) => parse_port(&prompt_with_default(
                input,
                output,
                "Listening port",
                &cfg.default_port.to_string(),
            )?)?,
            (None, false) => cfg.default_port,
        };
        let root = match (&self.root, self.interactive) {
            (Some(r), _) => r.clone(),
            (None, true) => PathBuf::from(prompt_with_default(
                input,
                output,
                "Destination directory",
                &cfg.default_save_dir.to_string_lossy(),
            )?),
            (None, false) => cfg.default_save_dir.clone(),
        };
        Ok(RecvSettings {
            bind: self.bind.clone(),
            port,
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prompt_empty_answer_keeps_default() {
        let mut input = Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();
        let v = prompt_with_default(&mut input, &mut output, "Port", "9999").unwrap();
        assert_eq!(v, "9999");
        assert_eq!(String::from_utf8(output).unwrap(), "Port (default 9999): ");
    }

    #[test]
    fn test_send_flags_win_over_config() {
        let opts = SendOpts::parse_from(["ftx", "--host", "10.1.1.1", "-p", "7000", "photos"]);
        let cfg = Config {
            default_ip: "192.168.0.9".into(),
            default_port: 1234,
            ..Config::default()
        };
        let s = opts
            .resolve(&cfg, &mut io::empty(), &mut io::sink())
            .unwrap();
        assert_eq!(
            s,
            SendSettings {
                host: "10.1.1.1".into(),
                port: 7000,
                path: PathBuf::from("photos"),
            }
        );
    }

    #[test]
    fn test_send_falls_back_to_config() {
        let opts = SendOpts::parse_from(["ftx", "a.txt"]);
        let cfg = Config {
            default_ip: "192.168.0.9".into(),
            default_port: 1234,
            ..Config::default()
        };
        let s = opts
            .resolve(&cfg, &mut io::empty(), &mut io::sink())
            .unwrap();
        assert_eq!(s.host, "192.168.0.9");
        assert_eq!(s.port, 1234);
    }

    #[test]
    fn test_send_interactive_answers() {
        let opts = SendOpts::parse_from(["ftx", "-i"]);
        let mut input = Cursor::new(b"\n8080\n/tmp/photos\n".to_vec());
        let s = opts
            .resolve(&Config::default(), &mut input, &mut io::sink())
            .unwrap();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8080);
        assert_eq!(s.path, PathBuf::from("/tmp/photos"));
    }

    #[test]
    fn test_send_requires_path() {
        let opts = SendOpts::parse_from(["ftx"]);
        assert!(opts
            .resolve(&Config::default(), &mut io::empty(), &mut io::sink())
            .is_err());
    }

    #[test]
    fn test_recv_interactive_bad_port() {
        let opts = RecvOpts::parse_from(["ftxd", "-i"]);
        let mut input = Cursor::new(b"port\n".to_vec());
        assert!(opts
            .resolve(&Config::default(), &mut input, &mut io::sink())
            .is_err());
    }

    #[test]
    fn test_recv_defaults() {
        let opts = RecvOpts::parse_from(["ftxd"]);
        let s = opts
            .resolve(&Config::default(), &mut io::empty(), &mut io::sink())
            .unwrap();
        assert_eq!(s.listen_addr(), "0.0.0.0:9999");
        assert_eq!(s.root, PathBuf::from("."));
    }
}
