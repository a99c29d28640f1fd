//! Error types for Particle client operations

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Particle client operations
pub type Result<T> = std::result::Result<T, ParticleError>;

/// Errors that can occur during foreground SDK operations
///
/// Failures inside a subscription's delivery loop never surface here; see
/// [`DeliveryError`](crate::streaming::DeliveryError).
#[derive(Error, Debug)]
pub enum ParticleError {
    /// The device config file could not be read or decoded
    #[error("Failed to load config file {}: {message}", path.display())]
    ConfigLoad { path: PathBuf, message: String },

    /// An operation needed a device id but none is configured
    #[error("Device ID not found in config file")]
    MissingDeviceId,

    /// Product-scoped publishing was requested but no product id is configured
    #[error("Product ID not found in config file")]
    MissingProductId,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParticleError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn config_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this is a network or HTTP-level failure of a request
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Server { .. })
    }
}
