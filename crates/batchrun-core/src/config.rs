//! Configuration resolution for batchrun.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/batchrun/settings.json`)
//! 3. Project config (`.batchrun/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default concurrency ceiling.
pub const DEFAULT_CAPACITY: usize = 4;

/// Default delay between liveness checks (10ms).
pub const DEFAULT_POLL_INTERVAL_MICROS: u64 = 10_000;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Location of the target entry point every command is addressed to.
    pub base_path: PathBuf,
    /// Environment selector appended to every invocation as `--env=<tag>`.
    pub environment_tag: Option<String>,
    /// Initial concurrency ceiling.
    pub default_capacity: usize,
    /// Fixed delay between liveness checks, in microseconds.
    pub poll_interval_micros: u64,
    /// Interpreter/launcher placed in front of `base_path`, if any.
    pub binary_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("bin/console"),
            environment_tag: None,
            default_capacity: DEFAULT_CAPACITY,
            poll_interval_micros: DEFAULT_POLL_INTERVAL_MICROS,
            binary_path: None,
        }
    }
}

impl RunnerConfig {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_micros)
    }

    /// Set the concurrency ceiling.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval_micros(mut self, micros: u64) -> Self {
        self.poll_interval_micros = micros;
        self
    }

    /// Set the environment tag.
    #[must_use]
    pub fn with_environment_tag(mut self, tag: impl Into<String>) -> Self {
        self.environment_tag = Some(tag.into());
        self
    }

    /// Reject settings the runner cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.default_capacity == 0 {
            return Err(Error::InvalidCapacity(self.default_capacity));
        }
        if self.poll_interval_micros == 0 {
            return Err(Error::Config(
                "poll_interval_micros must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk config layer. Every field is optional so a file only overrides
/// what it names.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_path: Option<PathBuf>,
    environment_tag: Option<String>,
    default_capacity: Option<usize>,
    poll_interval_micros: Option<u64>,
    binary_path: Option<PathBuf>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<RunnerConfig> {
    let mut config = RunnerConfig::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut config, global);
    }

    if let Some(dir) = project_dir {
        let project_path = project_config_path(dir);
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("batchrun").join("settings.json"))
}

/// Project-local config file path under `dir`.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".batchrun").join("settings.json")
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut RunnerConfig, overlay: ConfigFile) {
    if let Some(base_path) = overlay.base_path {
        base.base_path = base_path;
    }
    if overlay.environment_tag.is_some() {
        base.environment_tag = overlay.environment_tag;
    }
    if let Some(capacity) = overlay.default_capacity {
        base.default_capacity = capacity;
    }
    if let Some(micros) = overlay.poll_interval_micros {
        base.poll_interval_micros = micros;
    }
    if overlay.binary_path.is_some() {
        base.binary_path = overlay.binary_path;
    }
}

/// Apply `BATCHRUN_*` overrides read through `lookup`.
///
/// Unparseable numeric values are ignored.
pub fn apply_env_overrides(config: &mut RunnerConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("BATCHRUN_BASE_PATH") {
        config.base_path = PathBuf::from(val);
    }
    if let Some(val) = lookup("BATCHRUN_ENV") {
        config.environment_tag = Some(val);
    }
    if let Some(n) = lookup("BATCHRUN_CAPACITY").and_then(|v| v.parse().ok()) {
        config.default_capacity = n;
    }
    if let Some(n) = lookup("BATCHRUN_POLL_INTERVAL_MICROS").and_then(|v| v.parse().ok()) {
        config.poll_interval_micros = n;
    }
    if let Some(val) = lookup("BATCHRUN_BINARY") {
        config.binary_path = Some(PathBuf::from(val));
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = RunnerConfig::default();
        assert_eq!(config.default_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        config.validate().unwrap();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = RunnerConfig::default().with_capacity(0);
        assert!(matches!(config.validate(), Err(Error::InvalidCapacity(0))));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = RunnerConfig::default().with_poll_interval_micros(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn project_file_overrides_only_named_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = project_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "default_capacity": 8, "environment_tag": "prod" }"#).unwrap();

        let mut config = RunnerConfig::default();
        merge_config(&mut config, load_config_file(&path).unwrap());

        assert_eq!(config.default_capacity, 8);
        assert_eq!(config.environment_tag.as_deref(), Some("prod"));
        assert_eq!(config.base_path, PathBuf::from("bin/console"));
        assert_eq!(config.poll_interval_micros, DEFAULT_POLL_INTERVAL_MICROS);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "capacity": 3 }"#).unwrap();
        assert!(load_config_file(&path).is_err());
    }

    #[test]
    fn env_overrides_apply_and_skip_garbage() {
        let vars: HashMap<&str, &str> = [
            ("BATCHRUN_ENV", "test"),
            ("BATCHRUN_CAPACITY", "not-a-number"),
            ("BATCHRUN_POLL_INTERVAL_MICROS", "500"),
            ("BATCHRUN_BINARY", "/usr/bin/php"),
        ]
        .into_iter()
        .collect();

        let mut config = RunnerConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.environment_tag.as_deref(), Some("test"));
        assert_eq!(config.default_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.poll_interval_micros, 500);
        assert_eq!(config.binary_path, Some(PathBuf::from("/usr/bin/php")));
    }
}
