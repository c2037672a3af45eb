use thiserror::Error;

/// Shared error type used across all kye-bot crates.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Messaging error: {0}")]
    Messaging(String),

    /// The connected node serves a different network than the one configured.
    #[error("Chain id mismatch: expected {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Other(#[from] eyre::Error),
}

impl AppError {
    /// Whether the error is a rejected request rather than a server-side failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}
