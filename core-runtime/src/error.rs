use thiserror::Error;

/// Errors raised while assembling the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value is out of range or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host bridge was not provided and has no default.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
