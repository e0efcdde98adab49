//! Defaults file shared by `ftx` and `ftxd`
//!
//! ```toml
//! default_ip = "192.168.1.20"
//! default_port = 9999
//! default_save_dir = "/srv/incoming"
//! ```
//!
//! A missing file means built-in defaults. A file that cannot be read or
//! parsed is reported and also falls back to defaults: the tools must work
//! with zero setup.

use crate::protocol::defaults;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_ip: String,
    pub default_port: u16,
    pub default_save_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ip: defaults::HOST.to_string(),
            default_port: defaults::PORT,
            default_save_dir: PathBuf::from(defaults::ROOT),
        }
    }
}

impl Config {
    /// Strict load: missing, unreadable or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))
    }

    /// Lenient load used at startup.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: {:#}; using built-in defaults", e);
                Self::default()
            }
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(defaults::CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::load_or_default(&tmp.path().join("ftx.toml"));
        assert_eq!(cfg.default_ip, "127.0.0.1");
        assert_eq!(cfg.default_port, 9999);
        assert_eq!(cfg.default_save_dir, PathBuf::from("."));
    }

    #[test]
    fn test_partial_file_fills_missing_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ftx.toml");
        std::fs::write(&path, "default_port = 7000\n").unwrap();

        let cfg = Config::load_or_default(&path);
        assert_eq!(cfg.default_port, 7000);
        assert_eq!(cfg.default_ip, "127.0.0.1");
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ftx.toml");
        std::fs::write(&path, "default_port = \"not a number\"\n").unwrap();

        assert!(Config::load(&path).is_err());
        assert_eq!(Config::load_or_default(&path), Config::default());
    }

    #[test]
    fn test_full_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ftx.toml");
        std::fs::write(
            &path,
            "default_ip = \"10.0.0.5\"\ndefault_port = 9031\ndefault_save_dir = \"/srv/in\"\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(
            cfg,
            Config {
                default_ip: "10.0.0.5".into(),
                default_port: 9031,
                default_save_dir: PathBuf::from("/srv/in"),
            }
        );
    }
}
