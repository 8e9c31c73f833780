use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist {path}: {message}")]
    Persistence { path: String, message: String },

    #[error("Set writer is no longer running")]
    WriterClosed,
}

pub type Result<T> = std::result::Result<T, LibraryError>;
