//! Custom error types for the application.
//!
//! This module defines the primary error type, `DoomError`, for the whole tool.
//! Using the `thiserror` crate, it gives a single place for the conditions that
//! end a run. Per-command failures during probing are *not* errors at this level:
//! the prober records them as results and keeps going.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps [`ConfigError`] from loading or validating `config/doom.toml`.
//! - **`Io`**: Wraps `std::io::Error`, covering file and socket I/O outside probing.
//! - **`MissingCommandList`**: The required command list file does not exist.
//! - **`MissingTarget`** / **`NoUsbDevice`**: No usable instrument target was given
//!   or found.
//! - **`Connection`**: Opening the instrument or reading its identity failed.
//! - **`Instrument`**: A non-probing instrument operation failed (waveform, send).
//! - **`Storage`**: Writing a log, CSV export or learned-command file failed.
//! - **`FeatureNotEnabled`**: The operation needs a cargo feature that was not
//!   compiled in. The message tells the user how to enable it.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DoomError>;

/// Fatal conditions for a `doom` invocation.
#[derive(Error, Debug)]
pub enum DoomError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} not found", .0.display())]
    MissingCommandList(PathBuf),

    #[error("Wordlist {} not found", .0.display())]
    MissingWordlist(PathBuf),

    #[error("Specify --ip <addr> or --usb")]
    MissingTarget,

    #[error("No USB scopes found")]
    NoUsbDevice,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("License query failed: {0}")]
    License(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DoomError::Instrument("waveform read failed".to_string());
        assert_eq!(err.to_string(), "Instrument error: waveform read failed");
    }

    #[test]
    fn test_missing_command_list_names_file() {
        let err = DoomError::MissingCommandList(PathBuf::from("scpi_command_list.txt"));
        assert_eq!(err.to_string(), "scpi_command_list.txt not found");
    }

    #[test]
    fn test_feature_hint() {
        let err = DoomError::FeatureNotEnabled("instrument_visa".into());
        assert!(err.to_string().contains("--features instrument_visa"));
    }
}
