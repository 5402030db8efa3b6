//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and the tick loop
//! so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: conquest_core::ConfigError,
    },

    /// Connecting to, migrating, or reading the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: conquest_store::StoreError,
    },

    /// The tick loop could not start.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: conquest_core::RunnerError,
    },

    /// Installing the log subscriber failed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
