//! Configuration validation.

use tracing::warn;

use super::{Config, LARGE_BATCH_SIZE};
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }
    if config.source.cache_size_kib == 0 {
        return Err(MigrateError::Config(
            "source.cache_size_kib must not be 0".into(),
        ));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.port == 0 {
        return Err(MigrateError::Config("target.port must not be 0".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if let Err(MigrateError::Config(msg)) = validate_identifier(&config.target.schema) {
        return Err(MigrateError::Config(format!("target.schema: {}", msg)));
    }
    if config.target.connect_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "target.connect_timeout_secs must be at least 1".into(),
        ));
    }

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.batch_size > LARGE_BATCH_SIZE {
        warn!(
            "migration.batch_size {} is above {}; a rejected batch replays every row individually",
            config.migration.batch_size, LARGE_BATCH_SIZE
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig::new("webui.db"),
            target: TargetConfig {
                password: "password".to_string(),
                ..Default::default()
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_path() {
        let mut config = valid_config();
        config.source.path = "".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_large_batch_size_only_warns() {
        let mut config = valid_config();
        config.migration.batch_size = 50_000;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_schema_rejected() {
        let mut config = valid_config();
        config.target.schema = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
