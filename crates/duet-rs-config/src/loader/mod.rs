//! Layered configuration loader.
//!
//! Reads the user layer, the working-directory layer and any runtime
//! overrides, validates each against the schema, merges them in precedence
//! order and produces a final `DuetConfig`.

mod layer_io;
mod merge;
mod schema;


use crate::{ConfigError, DuetConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename in every layer.
const DEFAULT_CONFIG_FILE: &str = "duet.json5";
/// Default config directory under the user's home.
const DEFAULT_CONFIG_DIR: &str = ".duet";

/// Effective config plus metadata about which layers were loaded.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: DuetConfig,
    pub layers: Vec<ConfigLayer>,
}

/// Origin for a single config layer in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// `~/.duet/duet.json5`.
    User,
    /// `./duet.json5` in the working directory.
    Cwd,
    /// Explicit `--config` paths (highest precedence).
    Runtime,
}

impl ConfigLayerSource {
    fn label(&self) -> &'static str {
        match self {
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

/// Metadata about a config layer that contributed to the effective config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Schema validation mode for layered configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaMode {
    /// Partial validation for individual layers.
    Partial,
    /// Full validation for the merged config.
    Full,
}

/// Options controlling layered config discovery and overrides.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory that holds the cwd layer.
    pub cwd: PathBuf,
    /// Optional user config path (defaults to `~/.duet/duet.json5`).
    pub user_config_path: Option<PathBuf>,
    /// Runtime override config paths applied last, in order.
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// Create options with default layer locations for the provided cwd.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    /// Add a runtime override config path that is applied last.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl DuetConfig {
    /// Load a single config from a path (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        let value: Value = json5::from_str(&contents)?;
        config_from_value(value, "config")
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        config_from_value(value, "config")
    }

    /// Load a layered config stack using the default layer locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load a layered config stack using explicit layer locations.
    ///
    /// Layer precedence (low -> high): user, cwd, runtime overrides. Missing
    /// user and cwd files are skipped; a missing runtime path is an error.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let mut layers = Vec::new();
        let mut merged = Value::Object(serde_json::Map::new());
        let mut seen_paths = HashSet::new();

        let mut candidates = Vec::new();
        if let Some(path) = options.user_config_path.clone() {
            candidates.push((ConfigLayerSource::User, path, false));
        }
        candidates.push((
            ConfigLayerSource::Cwd,
            options.cwd.join(DEFAULT_CONFIG_FILE),
            false,
        ));
        for path in &options.runtime_paths {
            candidates.push((ConfigLayerSource::Runtime, path.clone(), true));
        }

        for (source, path, required) in candidates {
            if !required && !path.exists() {
                debug!(
                    "skipping missing layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            if !seen_paths.insert(layer_io::unique_path(&path)) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            let value = layer_io::load_layer(source, &path)?;
            merge::merge_json_values(&mut merged, &value);
            layers.push(ConfigLayer { source, path });
        }

        let config = config_from_value(merged, "effective")?;
        info!(
            "layered config loaded (layers={}, mode={})",
            layers.len(),
            config.mode
        );
        Ok(LayeredConfig { config, layers })
    }

    /// Validate invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (path, value) in [
            ("remote.model", &self.remote.model),
            ("remote.base_url", &self.remote.base_url),
            ("remote.api_key_env", &self.remote.api_key_env),
            ("local.endpoint", &self.local.endpoint),
            ("local.model", &self.local.model),
            ("connectivity.probe_addr", &self.connectivity.probe_addr),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::field(path, "must not be empty"));
            }
        }

        let key = self.sessions.key.as_str();
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(ConfigError::field(
                "sessions.key",
                "must be a plain file stem without separators",
            ));
        }
        if self.generation.idle_timeout_secs == Some(0) {
            return Err(ConfigError::field(
                "generation.idle_timeout_secs",
                "must be greater than zero when set",
            ));
        }
        if self.connectivity.interval_secs == 0 {
            return Err(ConfigError::field(
                "connectivity.interval_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn config_from_value(value: Value, label: &str) -> Result<DuetConfig, ConfigError> {
    schema::validate_layer_schema(&value, SchemaMode::Full, label)?;
    let config: DuetConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
