//! Error types for GhostScale

use thiserror::Error;

use crate::types::ImageFormat;

/// Result type alias for GhostScale operations
pub type Result<T> = std::result::Result<T, Error>;

/// GhostScale error type
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported conversion from {from} to {to}")]
    UnsupportedConversion { from: ImageFormat, to: ImageFormat },

    #[error("Configuration error: {0}")]
    Config(String),

    // Per-frame consistency errors
    #[error("Frame mismatch: {0}")]
    FrameMismatch(String),

    // Processing errors
    #[error("Scaling error: {0}")]
    Scaling(String),

    // General errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error was raised while resolving the stage configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidGeometry(_)
                | Error::UnsupportedFormat(_)
                | Error::UnsupportedConversion { .. }
                | Error::Config(_)
                | Error::Toml(_)
        )
    }

    /// Check if this error was raised by a frame that disagrees with the fixed geometry
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Error::FrameMismatch(_))
    }
}
