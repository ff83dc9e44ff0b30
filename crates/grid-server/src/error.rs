//! Error types for the server binary.
//!
//! [`AppError`] wraps every failure that can abort startup or shutdown so
//! `main` can propagate with `?`.

use grid_gateway::StartupError;

use crate::config::ConfigError;

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration could not be loaded or is unusable.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The gateway could not bind its listener.
    #[error("gateway error: {source}")]
    Gateway {
        /// The underlying startup error.
        #[from]
        source: StartupError,
    },

    /// A background task panicked or was cancelled.
    #[error("task error: {message}")]
    Task {
        /// Description of the task failure.
        message: String,
    },
}
