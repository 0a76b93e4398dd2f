use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Message group ids are 1..=128 printable ASCII characters (compiled once at first use)
static MESSAGE_GROUP_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\x21-\x7E]{1,128}$").expect("static regex is valid"));

/// Hard ceiling on entries per batch send imposed by the queue service.
pub const MAX_BATCH_ENTRIES_LIMIT: usize = 10;

pub const DEFAULT_MESSAGE_GROUP_ID: &str = "jobsqs";

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub queues: Option<QueuesSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
pub struct QueuesSection {
    #[serde(default)]
    pub default_message_group_id: Option<String>,
    #[serde(default)]
    pub max_batch_entries: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try each enabled format in turn.
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete adapter configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterConfig {
    pub queues: QueuesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuesConfig {
    /// Group id stamped on FIFO messages whose options carry none.
    pub default_message_group_id: String,
    /// Split each per-queue batch into sends of at most this many entries.
    /// `None` submits a whole queue group in one send.
    pub max_batch_entries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            queues: QueuesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            default_message_group_id: DEFAULT_MESSAGE_GROUP_ID.to_string(),
            max_batch_entries: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.as_bytes() {
        b"1" | b"true" | b"TRUE" | b"True" | b"yes" | b"YES" | b"Yes" | b"y" | b"Y" => Ok(true),
        b"0" | b"false" | b"FALSE" | b"False" | b"no" | b"NO" | b"No" | b"n" | b"N" => Ok(false),
        _ => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(true),
            "false" | "no" | "n" => Ok(false),
            _ => Err(()),
        },
    }
}

macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `AdapterConfig` from an optional file and environment variables.
/// Environment variables take precedence over file values and defaults, and
/// the merged result is validated before it is returned.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<AdapterConfig, ConfigError> {
    let mut cfg = AdapterConfig::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        if let Some(queues) = raw.queues {
            apply_opt!(
                cfg.queues.default_message_group_id,
                queues.default_message_group_id
            );
            apply_opt!(cfg.queues.max_batch_entries, queues.max_batch_entries, wrap);
        }
        if let Some(logging) = raw.logging {
            apply_opt!(cfg.logging.level, logging.level);
            apply_opt!(cfg.logging.json, logging.json);
        }
    }

    apply_env_overrides(&mut cfg)?;
    validate_config(&cfg)?;

    Ok(cfg)
}

#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(v.trim())
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn apply_env_overrides(cfg: &mut AdapterConfig) -> Result<(), ConfigError> {
    // Queues
    if let Some(v) = env_str("JOBSQS_DEFAULT_MESSAGE_GROUP_ID") {
        cfg.queues.default_message_group_id = v;
    }
    if let Some(v) = env_parse::<usize>("JOBSQS_MAX_BATCH_ENTRIES")? {
        cfg.queues.max_batch_entries = Some(v);
    }

    // Logging
    if let Some(v) = env_str("JOBSQS_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("JOBSQS_LOG_JSON")? {
        cfg.logging.json = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &AdapterConfig) -> Result<(), ConfigError> {
    if !MESSAGE_GROUP_ID_REGEX.is_match(&cfg.queues.default_message_group_id) {
        return Err(ConfigError::Validation(format!(
            "queues.default_message_group_id must be 1-128 printable ASCII characters: {:?}",
            cfg.queues.default_message_group_id
        )));
    }

    if let Some(n) = cfg.queues.max_batch_entries {
        if n == 0 || n > MAX_BATCH_ENTRIES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "queues.max_batch_entries must be between 1 and {}, got {}",
                MAX_BATCH_ENTRIES_LIMIT, n
            )));
        }
    }

    if cfg.logging.level.trim().is_empty() {
        return Err(ConfigError::Validation(
            "logging.level must not be empty".into(),
        ));
    }

    Ok(())
}
