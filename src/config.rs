//! Engine configuration and logging setup.
//!
//! Priority for every setting: env var > YAML > default.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "fieldnet.yaml";

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub engine: EngineYamlConfig,
    pub logging: LoggingConfig,
}

/// Engine section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineYamlConfig {
    pub max_process_steps: usize,
    pub default_tolerance: f64,
}

impl Default for EngineYamlConfig {
    fn default() -> Self {
        Self {
            max_process_steps: 100_000,
            default_tolerance: 0.0,
        }
    }
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ============================================================================
// Runtime config
// ============================================================================

/// Configuration consumed by [`crate::network::Model`] and its contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound on queue items handled by one `process()` drain.
    pub max_process_steps: usize,
    /// Tolerance applied to activation-function fields declared without one.
    pub default_tolerance: f64,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let yaml = YamlConfig::default();
        Self {
            max_process_steps: yaml.engine.max_process_steps,
            default_tolerance: yaml.engine.default_tolerance,
            logging: yaml.logging,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// If `yaml_path` is None, tries `fieldnet.yaml` in CWD. A `.env` file is
    /// loaded first when present.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let yaml = Self::load_yaml(yaml_path)?;

        let max_process_steps = match std::env::var("FIELDNET_MAX_PROCESS_STEPS") {
            Ok(s) => s
                .parse()
                .map_err(|_| Error::Config(format!("FIELDNET_MAX_PROCESS_STEPS={s}")))?,
            Err(_) => yaml.engine.max_process_steps,
        };
        let default_tolerance = match std::env::var("FIELDNET_DEFAULT_TOLERANCE") {
            Ok(s) => s
                .parse()
                .map_err(|_| Error::Config(format!("FIELDNET_DEFAULT_TOLERANCE={s}")))?,
            Err(_) => yaml.engine.default_tolerance,
        };

        Ok(Self {
            max_process_steps,
            default_tolerance,
            logging: LoggingConfig {
                level: std::env::var("FIELDNET_LOG_LEVEL").unwrap_or(yaml.logging.level),
                json: std::env::var("FIELDNET_LOG_JSON")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(yaml.logging.json),
            },
        })
    }

    /// Read the YAML layer. A missing file yields defaults. A broken file is
    /// an error when it was asked for by path, and is skipped with a warning
    /// when it is only the implicit `fieldnet.yaml`.
    fn load_yaml(yaml_path: Option<&Path>) -> Result<YamlConfig> {
        let path = yaml_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let Ok(contents) = std::fs::read_to_string(path) else {
            debug!("No config file at {}", path.display());
            return Ok(YamlConfig::default());
        };

        match serde_yaml::from_str(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if yaml_path.is_some() => Err(Error::Config(format!("{}: {e}", path.display()))),
            Err(e) => {
                warn!("Ignoring unparsable {}: {e}", path.display());
                Ok(YamlConfig::default())
            }
        }
    }
}

/// Install a global tracing subscriber. `RUST_LOG` takes precedence over
/// `config.level`. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,fieldnet={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if result.is_err() {
        debug!("Tracing subscriber already installed");
    }
}

// ============================================================================
// Tests
// ============================================================================
