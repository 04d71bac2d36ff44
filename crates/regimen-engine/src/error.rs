//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and shutdown so
//! `main` can propagate with `?` and add context with `anyhow`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: regimen_core::ConfigError,
    },

    /// The script could not be loaded.
    #[error("script error: {source}")]
    Script {
        /// The underlying script error.
        #[from]
        source: regimen_types::ScriptError,
    },

    /// The session could not be saved.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: regimen_core::SessionError,
    },

    /// The simulated clock could not be advanced.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: regimen_core::TickError,
    },
}
