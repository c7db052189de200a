//! Configuration System using Figment
//!
//! Strongly-typed configuration for the `doom` tool. Configuration is loaded from:
//! 1. `config/doom.toml` (optional; built-in defaults apply when it is missing)
//! 2. Environment variables prefixed with `DOOM_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! DOOM_APPLICATION__LOG_LEVEL=debug
//! DOOM_CONNECTION__TIMEOUT_MS=3000
//! DOOM_FILES__OUTPUT_DIR=logs
//! ```
//!
//! # Example
//!
//! ```no_run
//! use scpi_doom::config::DoomConfig;
//!
//! let config = DoomConfig::load()?;
//! println!("Log level: {}", config.application.log_level);
//! println!("Command list: {}", config.files.command_list.display());
//! # Ok::<(), scpi_doom::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/doom.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DoomConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Input and output file locations
    pub files: FilesConfig,
    /// Instrument connection settings
    pub connection: ConnectionConfig,
    /// Probing and discovery settings
    pub probe: ProbeConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit ANSI colors on console output
    pub color: bool,
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Known SCPI commands, one per line (required by list-driven modes)
    pub command_list: PathBuf,
    /// Optional command database, one command per line
    pub command_db: PathBuf,
    /// Optional tab-delimited index file
    pub index_file: PathBuf,
    /// Directory for logs and learned-command files
    pub output_dir: PathBuf,
    /// Also write a CSV next to every result log
    pub write_csv: bool,
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Per-query timeout in milliseconds
    pub timeout_ms: u64,
    /// Read chunk size in bytes
    pub chunk_size: usize,
    /// TCP port of the raw SCPI socket
    pub socket_port: u16,
    /// Delay before waveform readout in milliseconds
    pub settle_ms: u64,
    /// Timeout of the license HTTP request in milliseconds
    pub license_timeout_ms: u64,
}

/// Probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Commands containing any of these substrings are never sent
    pub skip_patterns: Vec<String>,
    /// Namespace roots sampled by `fuzz`
    pub fuzz_roots: Vec<String>,
    /// Subcommand suffixes sampled by `fuzz`
    pub fuzz_suffixes: Vec<String>,
    /// Namespace roots sampled by `learn`
    pub learn_roots: Vec<String>,
    /// Subcommand suffixes sampled by `learn` and `smart-learn`
    pub learn_suffixes: Vec<String>,
    /// Number of candidates drawn by `fuzz`
    pub fuzz_attempts: usize,
    /// Number of candidates drawn by `learn`
    pub learn_attempts: usize,
    /// Number of candidates drawn by `smart-learn`
    pub smart_attempts: usize,
    /// Deepest known prefix `smart-learn` branches from
    pub smart_depth: usize,
    /// Chance of a Pinky phrase after each learn probe (0.0 - 1.0)
    pub thinking_probability: f64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

const FUZZ_ROOTS: &[&str] = &["CHANnel1", "MATH1", "BUS1", "TRIGger", "DISPlay", "WAVeform"];
const FUZZ_SUFFIXES: &[&str] = &[
    "SCALe", "OFFSet", "COUPling", "STATus", "GRADing", "FORM", "SOURce",
];

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            color: true,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            command_list: PathBuf::from("scpi_command_list.txt"),
            command_db: PathBuf::from("Rigol_MSO5000_SCPI_Commands.txt"),
            index_file: PathBuf::from("Rigol_MSO5000_SCPI_Indexes.txt"),
            output_dir: PathBuf::from("."),
            write_csv: false,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            chunk_size: 102_400,
            socket_port: 5555,
            settle_ms: 200,
            license_timeout_ms: 3000,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let mut learn_roots = strings(FUZZ_ROOTS);
        learn_roots.extend(strings(&["MEASure", "TIMebase", "SYSTem"]));
        let mut learn_suffixes = strings(FUZZ_SUFFIXES);
        learn_suffixes.extend(strings(&["OPERator", "MODE", "TYPE"]));

        Self {
            skip_patterns: strings(&["WAV:DATA?", "DISPlay:DATA?"]),
            fuzz_roots: strings(FUZZ_ROOTS),
            fuzz_suffixes: strings(FUZZ_SUFFIXES),
            learn_roots,
            learn_suffixes,
            fuzz_attempts: 50,
            learn_attempts: 100,
            smart_attempts: 100,
            smart_depth: 2,
            thinking_probability: 0.5,
        }
    }
}

impl ConnectionConfig {
    /// Query timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Waveform settle delay as a `Duration`
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// License request timeout as a `Duration`
    pub fn license_timeout(&self) -> Duration {
        Duration::from_millis(self.license_timeout_ms)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl DoomConfig {
    /// Load configuration from `config/doom.toml` and environment variables
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (`DOOM_` prefix)
    /// 2. `config/doom.toml`
    /// 3. Built-in defaults
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::figment(path.as_ref())
            .merge(Env::prefixed("DOOM_").split("__"))
            .extract::<Self>()
            .map_err(ConfigError::LoadError)
            .and_then(|config| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Defaults layered with the TOML file, without the environment.
    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(DoomConfig::default())).merge(Toml::file(path))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Timeout and chunk size are non-zero
    /// - Thinking probability is within 0.0 - 1.0
    /// - Candidate pools are non-empty
    /// - Smart-learn depth is at least 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.connection.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connection.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.connection.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "connection.chunk_size must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.probe.thinking_probability) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid thinking_probability {}. Must be 0.0-1.0",
                self.probe.thinking_probability
            )));
        }

        let pools = [
            ("fuzz_roots", &self.probe.fuzz_roots),
            ("fuzz_suffixes", &self.probe.fuzz_suffixes),
            ("learn_roots", &self.probe.learn_roots),
            ("learn_suffixes", &self.probe.learn_suffixes),
        ];
        for (name, pool) in pools {
            if pool.iter().all(|s| s.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "probe.{} cannot be empty",
                    name
                )));
            }
        }

        if self.probe.smart_depth == 0 {
            return Err(ConfigError::ValidationError(
                "probe.smart_depth must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}
