//! Error types for the launch detection and decision pipeline

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Transport errors (WebSocket watcher)
    #[error("WebSocket connection failed: {0}")]
    WsConnection(String),

    #[error("WebSocket disconnected")]
    WsDisconnected,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    // Parsing / validation
    #[error("Log parse miss: {0}")]
    ParseMiss(String),

    #[error("Invalid mint: {0}")]
    InvalidMint(String),

    // Transaction introspection
    #[error("Transaction fetch failed: {0}")]
    TxFetch(String),

    #[error("Rate cap exceeded")]
    RateCap,

    // Persistence
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store conflict: {0}")]
    StoreConflict(String),

    // Serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O
    #[error("I/O error: {0}")]
    Io(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Transport-transient errors are retryable via reconnect/backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::RpcTimeout(_) | Error::WsConnection(_) | Error::WsDisconnected
        )
    }

    /// Errors that should be surfaced to the operator rather than silently counted.
    pub fn is_safety_violation(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingEnvVar(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}
