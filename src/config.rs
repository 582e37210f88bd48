use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::rejection::{self, Signature};

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_STREAM_POLL_MS: u16 = 100;

/// A user-supplied large-file rejection format, appended to the built-ins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignatureEntry {
    pub name: String,
    pub markers: Vec<String>,
    #[serde(default)]
    pub path_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub stream_poll_ms: Option<u16>,
    #[serde(default)]
    pub large_file_signatures: Vec<SignatureEntry>,
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml_ng::from_str(&data)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }
}

/// Resolved runtime settings shared by both tools.
#[derive(Debug, Clone)]
pub struct Settings {
    pub remote: String,
    pub poll_interval: Duration,
    pub signatures: Vec<Signature>,
}

impl Settings {
    /// Built-in defaults with no config file.
    pub fn defaults() -> Result<Settings> {
        Settings::from_config(&Config::default())
    }

    pub fn from_config(cfg: &Config) -> Result<Settings> {
        let mut signatures = rejection::builtin()?;
        for entry in &cfg.large_file_signatures {
            let markers: Vec<&str> = entry.markers.iter().map(String::as_str).collect();
            let patterns: Vec<&str> = entry.path_patterns.iter().map(String::as_str).collect();
            signatures.push(Signature::new(&entry.name, &markers, &patterns)?);
        }
        Ok(Settings {
            remote: cfg
                .remote
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            poll_interval: Duration::from_millis(u64::from(
                cfg.stream_poll_ms.unwrap_or(DEFAULT_STREAM_POLL_MS).max(1),
            )),
            signatures,
        })
    }

    /// Loads the config file from its resolved location. Called once at startup.
    pub fn load() -> Result<Settings> {
        let path = config_path()?;
        let cfg = Config::load_from(&path)?;
        Settings::from_config(&cfg).with_context(|| format!("invalid config {}", path.display()))
    }
}

/// Resolves the config file path. Accepts injectable overrides for testing.
pub fn config_path_with(
    explicit: Option<&str>,
    xdg_config_home: Option<&str>,
    home: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(p) = explicit.filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    if let Some(xdg) = xdg_config_home.filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(xdg).join("mygit").join("config.yaml"));
    }
    let home = home.context("cannot determine home directory")?;
    Ok(home.join(".config").join("mygit").join("config.yaml"))
}

fn config_path() -> Result<PathBuf> {
    config_path_with(
        std::env::var("MYGIT_CONFIG").ok().as_deref(),
        std::env::var("XDG_CONFIG_HOME").ok().as_deref(),
        dirs::home_dir().as_deref(),
    )
}
