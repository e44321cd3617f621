// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use url::Url;

pub const DEFAULT_SOURCE_URL: &str = "https://hebbkx1anhila5yf.public.blob.vercel-storage.com/AwareNet%20Responses%20-%20Sheet1-L6JiDlebdLHGIUjRF8FSgJ6EGxixll.csv";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// The survey columns looked up in every snapshot, in warning order.
pub const EXPECTED_FIELDS: [&str; 12] = [
    "Name",
    "Email",
    "Profession",
    "Q4",
    "Q5",
    "Q6",
    "Q7",
    "Q8",
    "Q9",
    "Q10",
    "Q11",
    "Timestamp",
];

/// Env var naming an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "SURVEYBOARD_CONFIG";

pub fn default_expected_fields() -> Vec<String> {
    EXPECTED_FIELDS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source_url: String,
    pub poll_interval_ms: u64,
    pub auto_refresh: bool,
    /// Discard results that complete after a newer fetch already committed.
    pub ordered_commits: bool,
    pub expected_fields: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            auto_refresh: true,
            ordered_commits: false,
            expected_fields: default_expected_fields(),
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `SURVEYBOARD_CONFIG` (if set),
    /// then `SURVEY_URL` / `POLL_INTERVAL_MS` / `AUTO_REFRESH` /
    /// `ORDERED_COMMITS` from the environment.
    pub fn load() -> Result<Self> {
        let base = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        let cfg = base.with_overrides(|key| env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply overrides from any key lookup (the process env in `load`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SURVEY_URL") {
            self.source_url = url;
        }
        if let Some(ms) = lookup("POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("POLL_INTERVAL_MS must be an integer, got {:?}", ms))?;
        }
        if let Some(flag) = lookup("AUTO_REFRESH") {
            self.auto_refresh = parse_flag("AUTO_REFRESH", &flag)?;
        }
        if let Some(flag) = lookup("ORDERED_COMMITS") {
            self.ordered_commits = parse_flag("ORDERED_COMMITS", &flag)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.source_url)
            .with_context(|| format!("invalid source_url {:?}", self.source_url))?;
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got {:?}", key, other),
    }
}
