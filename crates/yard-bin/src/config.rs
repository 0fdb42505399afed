//! Configuration loading and parsing (`switchyard.toml`).
//!
//! Unknown fields are ignored so the file can grow without breaking older
//! binaries; every known field has a default so the file is optional.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    /// Milliseconds between sensor publishes.
    #[serde(default = "PublishConfig::default_period_ms")]
    pub period_ms: u64,
    /// How many publish ticks to run before exiting.
    #[serde(default = "PublishConfig::default_ticks")]
    pub ticks: u32,
}

impl PublishConfig {
    fn default_period_ms() -> u64 {
        2000
    }

    fn default_ticks() -> u32 {
        5
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            period_ms: Self::default_period_ms(),
            ticks: Self::default_ticks(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// Capacity of each task's delivery queue.
    #[serde(default = "QueueConfig::default_capacity")]
    pub capacity: usize,
}

impl QueueConfig {
    fn default_capacity() -> usize {
        10
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Loads `switchyard.toml` from `path` (or the working directory when no
/// override is given), falling back to defaults when the file is absent.
pub fn load_from(path: Option<&Path>) -> Result<ConfigFile> {
    let candidate = path.unwrap_or_else(|| Path::new("switchyard.toml"));
    if !candidate.exists() {
        info!(
            target: "runtime.config",
            path = %candidate.display(),
            "no configuration file; using defaults"
        );
        return Ok(ConfigFile::default());
    }
    let raw = fs::read_to_string(candidate)
        .with_context(|| format!("reading {}", candidate.display()))?;
    let parsed: ConfigFile =
        toml::from_str(&raw).with_context(|| format!("parsing {}", candidate.display()))?;
    info!(
        target: "runtime.config",
        path = %candidate.display(),
        period_ms = parsed.publish.period_ms,
        ticks = parsed.publish.ticks,
        queue_capacity = parsed.queue.capacity,
        "configuration loaded"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.publish.period_ms, 2000);
        assert_eq!(config.publish.ticks, 5);
        assert_eq!(config.queue.capacity, 10);
    }

    #[test]
    fn partial_file_keeps_defaults_for_omitted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[publish]\nperiod_ms = 50").unwrap();
        let config = load_from(Some(&path)).unwrap();
        assert_eq!(config.publish.period_ms, 50);
        assert_eq!(config.publish.ticks, 5);
        assert_eq!(config.queue.capacity, 10);
    }

    #[test]
    fn full_file_overrides_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[publish]\nperiod_ms = 10\nticks = 3\n\n[queue]\ncapacity = 2"
        )
        .unwrap();
        let config = load_from(Some(&path)).unwrap();
        assert_eq!(config.publish.period_ms, 10);
        assert_eq!(config.publish.ticks, 3);
        assert_eq!(config.queue.capacity, 2);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[future]\nknob = true\n\n[publish]\nticks = 1").unwrap();
        let config = load_from(Some(&path)).unwrap();
        assert_eq!(config.publish.ticks, 1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[publish\nperiod_ms = ").unwrap();
        assert!(load_from(Some(&path)).is_err());
    }
}
