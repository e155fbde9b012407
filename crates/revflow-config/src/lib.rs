pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATH_ENV: &str = "REVFLOW_CONFIG_PATH";
const ENV_PREFIX: &str = "REVFLOW";

/// revflow の設定ディレクトリ (`<config dir>/revflow`) を取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("revflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 REVFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: revflow.local.yaml, revflow.yaml
/// 3. <config dir>/revflow/config.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "{} points to a missing file: {}",
            CONFIG_PATH_ENV,
            path.display()
        );
    }

    let current_dir = std::env::current_dir()?;
    for filename in ["revflow.local.yaml", "revflow.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("revflow").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Timeouts and intervals for the orchestration engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-job poll budget while creating a revision
    pub create_timeout_secs: u64,

    /// Per-job poll budget while updating (upserting into) a revision
    pub update_timeout_secs: u64,

    /// Budget for the de-finalize + delete sequence
    pub delete_timeout_secs: u64,

    /// Fixed interval between job status fetches
    pub poll_interval_secs: u64,

    /// Deadline for the pre-signed upload PUT
    pub upload_timeout_secs: u64,

    /// Directory holding the local state snapshot
    pub state_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_timeout_secs: 30 * 60,
            update_timeout_secs: 30 * 60,
            delete_timeout_secs: 10 * 60,
            poll_interval_secs: 5,
            upload_timeout_secs: 60,
            state_dir: PathBuf::from(".revflow"),
        }
    }
}

impl EngineConfig {
    /// Load defaults, the discovered config file (if any), then `REVFLOW_*` env vars
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Ok(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load_from(Some(&path))
            }
            Err(ConfigError::ConfigFileNotFound) => Self::load_from(None),
            Err(e) => Err(e),
        }
    }

    /// Load from an explicit file (format chosen by extension) plus env vars
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("create_timeout_secs", self.create_timeout_secs),
            ("update_timeout_secs", self.update_timeout_secs),
            ("delete_timeout_secs", self.delete_timeout_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("upload_timeout_secs", self.upload_timeout_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.poll_interval_secs > self.create_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_secs ({}) exceeds create_timeout_secs ({})",
                self.poll_interval_secs, self.create_timeout_secs
            )));
        }
        Ok(())
    }

    /// Write the default configuration as YAML, creating parent directories
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&EngineConfig::default())?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}
