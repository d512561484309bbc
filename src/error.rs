use thiserror::Error;

use crate::adapter::init::AppInitializerError;

/// Start-up failures of the `serve` and `sweep` commands.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Invalid {key}: {reason}")]
    ConfigurationError { key: &'static str, reason: String },

    #[error(transparent)]
    InitializationError(#[from] AppInitializerError),

    #[error("Failed to listen on {bind}: {source}")]
    BindError {
        bind: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server stopped: {0}")]
    ServerError(#[source] std::io::Error),
}
