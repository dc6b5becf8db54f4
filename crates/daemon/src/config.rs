// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a typed, validated merge of the repo-band/
//! concurrency TOML file (spec §4.5/§4.6) and the environment variables and
//! CLI flags enumerated in spec §6.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a home directory to derive default paths")]
    NoHomeDir,
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("invalid RALPH_OPENCODE_TRANSPORT value {0:?}, expected cli|sdk|sdk-preferred")]
    BadTransport(String),
}

/// Deployment profile, selected on the CLI (`--profile`). Only changes
/// default path roots; behavior is otherwise identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    Prod,
    Sandbox,
}

impl Profile {
    fn dir_name(self) -> &'static str {
        match self {
            Profile::Prod => "ralph",
            Profile::Sandbox => "ralph-sandbox",
        }
    }
}

/// `RALPH_OPENCODE_TRANSPORT`: which channel drives the coding-agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpencodeTransport {
    Cli,
    Sdk,
    /// Prefers the SDK transport, falling back to CLI on first failure and
    /// sticking with it for the rest of the process's life.
    SdkPreferred,
}

impl std::str::FromStr for OpencodeTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(Self::Cli),
            "sdk" => Ok(Self::Sdk),
            "sdk-preferred" => Ok(Self::SdkPreferred),
            other => Err(ConfigError::BadTransport(other.to_string())),
        }
    }
}

/// One priority band from the config file: repos drained round-robin while
/// the band has budget, higher-priority bands drained first (spec §4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct RepoBand {
    pub priority: u32,
    pub repos: Vec<String>,
}

/// The subset of the config file that isn't already covered by environment
/// variables or CLI flags: repo inventory, concurrency caps, the label the
/// scheduler watches for, and tick cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub bands: Vec<RepoBand>,
    pub issue_label: String,
    pub global_concurrency: usize,
    pub per_repo_concurrency: usize,
    pub tick_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub agent_binary: String,
    /// How long a claimed task's heartbeat may go stale before another
    /// daemon is allowed to steal its lease (spec §4.1 `claimTask`).
    pub heartbeat_ttl_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            issue_label: "ralph".to_string(),
            global_concurrency: 4,
            per_repo_concurrency: 2,
            tick_interval_ms: 10_000,
            shutdown_grace_ms: 5_000,
            agent_binary: "agent".to_string(),
            heartbeat_ttl_ms: 120_000,
        }
    }
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub profile: Profile,
    pub run_id: String,
    pub state_db_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub opencode_transport: OpencodeTransport,
    pub file: FileConfig,
}

fn default_state_dir(profile: Profile) -> Result<PathBuf, ConfigError> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join(profile.dir_name()));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".local/state").join(profile.dir_name()))
}

impl DaemonConfig {
    /// Resolve configuration for one daemon invocation.
    ///
    /// `config_path` overrides the default `<state_dir>/config.toml`
    /// location; a missing file falls back to [`FileConfig::default`].
    pub fn load(profile: Profile, run_id: String, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let state_dir = default_state_dir(profile)?;

        let state_db_path = std::env::var("RALPH_STATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join("store"));

        let sessions_dir = std::env::var("RALPH_SESSIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join("sessions"));

        let opencode_transport = match std::env::var("RALPH_OPENCODE_TRANSPORT") {
            Ok(raw) => raw.parse()?,
            Err(_) => OpencodeTransport::SdkPreferred,
        };

        let default_config_path = state_dir.join("config.toml");
        let config_path = config_path.map(Path::to_path_buf).unwrap_or(default_config_path);
        let file = match std::fs::read_to_string(&config_path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::Parse(config_path.clone(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => return Err(ConfigError::Read(config_path, e)),
        };

        Ok(Self { profile, run_id, state_db_path, sessions_dir, opencode_transport, file })
    }

    /// `(priority, repos)` pairs in the shape [`ralph_engine::Scheduler::new`] expects.
    pub fn scheduler_bands(&self) -> Vec<(u32, Vec<String>)> {
        self.file.bands.iter().map(|band| (band.priority, band.repos.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_parses_recognized_values() {
        assert_eq!("cli".parse::<OpencodeTransport>().unwrap(), OpencodeTransport::Cli);
        assert_eq!("sdk".parse::<OpencodeTransport>().unwrap(), OpencodeTransport::Sdk);
        assert_eq!("sdk-preferred".parse::<OpencodeTransport>().unwrap(), OpencodeTransport::SdkPreferred);
        assert!("bogus".parse::<OpencodeTransport>().is_err());
    }

    #[test]
    fn file_config_defaults_are_sane() {
        let file = FileConfig::default();
        assert!(file.global_concurrency > 0);
        assert!(file.per_repo_concurrency > 0);
        assert!(file.bands.is_empty());
    }
}
