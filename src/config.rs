//! TOML configuration
//!
//! ```toml
//! db_path = "docflow.db"
//!
//! [worker]
//! enabled = true
//! batch_size = 50
//! initial_delay_ms = 10000
//! submit_interval_ms = 5000
//! approve_interval_ms = 5000
//!
//! [harness]
//! call_timeout_ms = 10000
//! ```
//!
//! Every key is optional.
use super::batch::MAX_BATCH_SIZE;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub worker: WorkerConfig,
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub initial_delay_ms: u64,
    pub submit_interval_ms: u64,
    pub approve_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub call_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("docflow.db"),
            worker: WorkerConfig::default(),
            harness: HarnessConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 50,
            initial_delay_ms: 10_000,
            submit_interval_ms: 5_000,
            approve_interval_ms: 5_000,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(source).context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&source).with_context(|| format!("in {}", path.display()))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let size = self.worker.batch_size;
        if size == 0 || size > MAX_BATCH_SIZE {
            anyhow::bail!("worker.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {size}");
        }
        if self.harness.call_timeout_ms == 0 {
            anyhow::bail!("harness.call_timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

impl WorkerConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
    pub fn submit_interval(&self) -> Duration {
        Duration::from_millis(self.submit_interval_ms)
    }
    pub fn approve_interval(&self) -> Duration {
        Duration::from_millis(self.approve_interval_ms)
    }
}

impl HarnessConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_gives_defaults() {
        let config = ServiceConfig::from_toml("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.worker.batch_size, 50);
        assert_eq!(config.harness.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ServiceConfig::from_toml(
            r#"
            db_path = "/tmp/docs"
            [worker]
            batch_size = 200
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/docs"));
        assert_eq!(config.worker.batch_size, 200);
        assert!(!config.worker.enabled);
        assert_eq!(config.worker.approve_interval_ms, 5_000);
    }

    #[test]
    fn rejects_out_of_range_batch_size() {
        assert!(ServiceConfig::from_toml("[worker]\nbatch_size = 0").is_err());
        assert!(ServiceConfig::from_toml("[worker]\nbatch_size = 1001").is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(ServiceConfig::from_toml("[worker]\nbatchsize = 10").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = ServiceConfig::load(Path::new("/nonexistent/docflow.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }
}
