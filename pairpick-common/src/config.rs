//! Configuration loading
//!
//! Settings are resolved once at process start, in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! There is no runtime reconfiguration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Filename of the append-only judgment log inside the data directory
pub const LOG_FILENAME: &str = "data.jsonl";

/// Marketplace external-submit endpoint (sandbox)
pub const DEFAULT_SUBMIT_URL: &str = "https://workersandbox.mturk.com/mturk/externalSubmit";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7860";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_PUSH_FREQUENCY_SECS: u64 = 60;

/// Judgments collected per HIT
pub const DEFAULT_TOTAL_CNT: usize = 10;

/// Environment variable naming an explicit TOML config path
pub const CONFIG_PATH_ENV: &str = "PAIRPICK_CONFIG";

/// Optional TOML configuration file contents
///
/// Every key is optional; a missing file behaves like an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub corpus_source: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub dataset_repo_url: Option<String>,
    pub hf_token: Option<String>,
    pub force_push: Option<bool>,
    pub push_frequency_secs: Option<u64>,
    pub total_cnt: Option<usize>,
    pub submit_url: Option<String>,
    pub bind_addr: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read TOML failed ({}): {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
    }

    /// Load the config file located by [`locate_config_file`], or defaults
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match locate_config_file(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            None => {
                debug!("No TOML config file found, using environment and defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Find the TOML config file
///
/// An explicit path (CLI, then `PAIRPICK_CONFIG`) is returned even if it does
/// not exist so that a typo surfaces as a read error. The platform default
/// (`<config_dir>/pairpick/config.toml`) is only used when present.
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|d| d.join("pairpick").join("config.toml"))
        .filter(|p| p.exists())
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub corpus_source: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub bind_addr: Option<String>,
}

/// Fully resolved process settings
#[derive(Clone)]
pub struct Settings {
    /// Corpus location: local JSON/JSONL path or http(s) URL
    pub corpus_source: String,
    /// Directory holding the judgment log (and the git work tree when syncing)
    pub data_dir: PathBuf,
    /// Remote dataset repository; sync is disabled when absent
    pub dataset_repo_url: Option<String>,
    /// Auth token for the corpus URL and the remote repository
    pub auth_token: Option<String>,
    pub force_push: bool,
    pub push_frequency: Duration,
    pub total_cnt: usize,
    pub submit_url: String,
    pub bind_addr: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("corpus_source", &self.corpus_source)
            .field("data_dir", &self.data_dir)
            .field("dataset_repo_url", &self.dataset_repo_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("force_push", &self.force_push)
            .field("push_frequency", &self.push_frequency)
            .field("total_cnt", &self.total_cnt)
            .field("submit_url", &self.submit_url)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Settings {
    /// Resolve settings from CLI > ENV > TOML > defaults
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let corpus_source = cli
            .corpus_source
            .clone()
            .or_else(|| env_var("PAIRPICK_CORPUS"))
            .or_else(|| toml.corpus_source.clone())
            .ok_or_else(|| {
                Error::Config(
                    "Corpus source not configured. Set one of:\n\
                     1. Command line: --corpus <path-or-url>\n\
                     2. Environment: PAIRPICK_CORPUS=<path-or-url>\n\
                     3. TOML config: corpus_source = \"<path-or-url>\""
                        .to_string(),
                )
            })?;

        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| env_var("PAIRPICK_DATA_DIR").map(PathBuf::from))
            .or_else(|| toml.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let dataset_repo_url = env_var("DATASET_REPO_URL").or_else(|| toml.dataset_repo_url.clone());
        let auth_token = env_var("HF_TOKEN").or_else(|| toml.hf_token.clone());

        let force_push = match env_var("FORCE_PUSH") {
            Some(value) => value == "yes",
            None => toml.force_push.unwrap_or(false),
        };

        let push_frequency_secs = match env_var("PAIRPICK_PUSH_FREQUENCY") {
            Some(value) => parse_number("PAIRPICK_PUSH_FREQUENCY", &value)?,
            None => toml
                .push_frequency_secs
                .unwrap_or(DEFAULT_PUSH_FREQUENCY_SECS),
        };
        if push_frequency_secs == 0 {
            return Err(Error::Config(
                "push frequency must be at least 1 second".to_string(),
            ));
        }

        let total_cnt = match env_var("PAIRPICK_TOTAL_CNT") {
            Some(value) => parse_number("PAIRPICK_TOTAL_CNT", &value)?,
            None => toml.total_cnt.unwrap_or(DEFAULT_TOTAL_CNT),
        };
        if total_cnt == 0 {
            return Err(Error::Config(
                "total_cnt must be at least 1".to_string(),
            ));
        }

        let submit_url = env_var("PAIRPICK_SUBMIT_URL")
            .or_else(|| toml.submit_url.clone())
            .unwrap_or_else(|| DEFAULT_SUBMIT_URL.to_string());

        let bind_addr = cli
            .bind_addr
            .clone()
            .or_else(|| env_var("PAIRPICK_BIND"))
            .or_else(|| toml.bind_addr.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            corpus_source,
            data_dir,
            dataset_repo_url,
            auth_token,
            force_push,
            push_frequency: Duration::from_secs(push_frequency_secs),
            total_cnt,
            submit_url,
            bind_addr,
        })
    }

    /// Path of the append-only judgment log
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILENAME)
    }
}

/// Read a non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a positive integer, got {:?}", name, value)))
}
