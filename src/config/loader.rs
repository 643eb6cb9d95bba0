//! Configuration Loader
//!
//! Environment-aware loading: base file, optional per-environment overlay file,
//! then `ENGINE__SECTION__KEY` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "ENGINE";

/// Loaded and validated configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load from a base file with environment auto-detection
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_file(path, &Self::detect_environment())
    }

    /// Load from a base file with an explicit environment
    ///
    /// Both the base file and the `<stem>.<environment>.<ext>` overlay are optional;
    /// missing files fall back to defaults.
    pub fn load_from_file(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        let overlay = Self::overlay_path(path, environment);

        debug!(
            base = %path.display(),
            overlay = ?overlay.as_ref().map(|p| p.display().to_string()),
            environment = %environment,
            "Loading engine configuration"
        );

        let mut builder = Config::builder().add_source(File::from(path).required(false));
        if let Some(overlay) = &overlay {
            builder = builder.add_source(File::from(overlay.as_path()).required(false));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;
        config.validate()?;

        debug!(
            environment = %environment,
            max_attempts = config.retry.max_attempts,
            transactions_enabled = config.command.transactions_enabled,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_path: Some(path.to_path_buf()),
        }))
    }

    /// Wrap an in-memory configuration after validating it
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Current environment from `ENGINE_ENV`, then `APP_ENV`, defaulting to development
    pub fn detect_environment() -> String {
        env::var("ENGINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn overlay_path(path: &Path, environment: &str) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let file_name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{environment}.{ext}"),
            None => format!("{stem}.{environment}"),
        };
        Some(path.with_file_name(file_name))
    }
}
