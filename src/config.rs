use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_LOG_FILTER: &str = "info";

/// Injected at construction; nothing reads configuration globally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    pub pool_size: usize,
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("slots.db"),
            pool_size: DEFAULT_POOL_SIZE,
            log_dir: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("{}: {}", path.display(), err)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.pool_size == 0 {
            return Err(AppError::Config("poolSize must be at least 1".to_string()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(AppError::Config("databasePath cannot be empty".to_string()));
        }
        Ok(())
    }
}
