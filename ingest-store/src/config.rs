use serde::Deserialize;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("database path must not be empty")]
    EmptyPath,
}

/// Connection level settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// How long a writer waits for the database lock before giving up.
    pub busy_timeout_ms: u64,
    /// Use write-ahead logging so readers never block the single writer.
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            busy_timeout_ms: 5000,
            wal: true,
        }
    }
}

/// The `database` configuration section.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub path: PathBuf,
    #[serde(flatten)]
    pub store: StoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyPath);
        }
        Ok(())
    }
}
