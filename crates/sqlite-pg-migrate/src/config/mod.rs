//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

impl Config {
    /// Build a configuration with defaults for everything but the source path.
    pub fn for_source(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            source: SourceConfig::new(path),
            target: TargetConfig::default(),
            migration: MigrationConfig::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.target.apply_env_password();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Serialize to YAML. The password is never included.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl TargetConfig {
    /// Fill an empty password from `PGPASSWORD`.
    pub fn apply_env_password(&mut self) {
        if self.password.is_empty() {
            if let Ok(pw) = std::env::var(PASSWORD_ENV) {
                self.password = pw;
            }
        }
    }

    /// Human-readable endpoint, without credentials.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
