//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers are merged with the
//! `config` crate in increasing precedence:
//!
//! 1. [`PipelineConfig::default`]
//! 2. `<dir>/tasker-pipeline.{toml,yaml,json}`
//! 3. `<dir>/tasker-pipeline-<environment>.{toml,yaml,json}`
//! 4. `TASKER_PIPELINE__<SECTION>__<KEY>` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::PipelineConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const CONFIG_FILE_STEM: &str = "tasker-pipeline";
const ENV_PREFIX: &str = "TASKER_PIPELINE";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        debug!(
            environment = environment,
            poll_interval_ms = config.execution.poll_interval_ms,
            max_wait_ms = config.execution.max_wait_ms,
            max_concurrent_steps = config.execution.max_concurrent_steps,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding hosts)
    pub fn from_config(config: PipelineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: crate::logging::get_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the environment this configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory the configuration files were searched in
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn default_config_directory() -> PathBuf {
        std::env::var("TASKER_PIPELINE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<PipelineConfig> {
        let base_path = config_directory.join(CONFIG_FILE_STEM);
        let env_path = config_directory.join(format!("{CONFIG_FILE_STEM}-{environment}"));

        let defaults = config::Config::try_from(&PipelineConfig::default())
            .map_err(|e| ConfigurationError::load_error("built-in defaults", e))?;

        let merged = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(&base_path.to_string_lossy()).required(false))
            .add_source(config::File::with_name(&env_path.to_string_lossy()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))?;

        merged
            .try_deserialize::<PipelineConfig>()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))
    }
}
