//! Error types for the avatar core
//!
//! Load failures travel through the event channel as [`AssetError`]; every
//! other failure is returned synchronously as an [`AvatarError`].

use thiserror::Error;

/// Failure to load or parse an avatar asset
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The asset lives behind a transport this core does not speak, or the fetch failed
    #[error("network error: {0}")]
    Network(String),

    /// The asset was read but its contents are invalid
    #[error("malformed asset: {0}")]
    Malformed(String),

    /// The asset reference points at a format we cannot decode
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Local file system failure while reading the asset
    #[error("io error: {0}")]
    Io(String),
}

impl AssetError {
    /// Human-readable cause, suitable for an error banner
    pub fn cause(&self) -> &str {
        match self {
            AssetError::Network(cause)
            | AssetError::Malformed(cause)
            | AssetError::UnsupportedFormat(cause)
            | AssetError::Io(cause) => cause,
        }
    }
}

impl From<std::io::Error> for AssetError {
    fn from(e: std::io::Error) -> Self {
        AssetError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(e: serde_json::Error) -> Self {
        AssetError::Malformed(e.to_string())
    }
}

/// Degraded-capability notices. These are never failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityWarning {
    /// The backend cannot time frames; quality is pinned to a fixed profile
    FrameTimingUnavailable,
}

impl std::fmt::Display for CapabilityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityWarning::FrameTimingUnavailable => {
                write!(f, "frame timing unavailable, adaptive quality disabled")
            }
        }
    }
}

/// Avatar core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AvatarError {
    /// Asset load/parse failure
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Unknown animation clip name
    #[error("Animation not found: {0}")]
    AnimationNotFound(String),

    /// A method was called after `dispose()`
    #[error("Avatar renderer already disposed (called {0})")]
    DisposedStateViolation(&'static str),

    /// Rejected viewport dimensions
    #[error("Invalid viewport: {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for AvatarError {
    fn from(e: std::io::Error) -> Self {
        AvatarError::IOError(e.to_string())
    }
}

impl AvatarError {
    /// Check if this error is recoverable
    ///
    /// Disposal violations are programming errors; nothing in the core will
    /// attempt to recover from them.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Retry with a new config
            AvatarError::Asset(_) => true,
            // No state change happened
            AvatarError::AnimationNotFound(_) => true,
            AvatarError::InvalidViewport { .. } => true,
            AvatarError::DisposedStateViolation(_) => false,
            AvatarError::ConfigError(_) => false,
            AvatarError::ChannelError(_) => false,
            AvatarError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description of the error
    pub fn user_message(&self) -> String {
        match self {
            AvatarError::Asset(e) => format!("Could not load avatar: {}", e.cause()),
            AvatarError::AnimationNotFound(name) => {
                format!("Animation \"{}\" is not available for this avatar.", name)
            }
            AvatarError::DisposedStateViolation(_) => {
                "The avatar view has been closed.".to_string()
            }
            AvatarError::InvalidViewport { .. } => "Invalid avatar view size.".to_string(),
            AvatarError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            AvatarError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            AvatarError::IOError(_) => "File system error occurred.".to_string(),
        }
    }
}

/// Result type alias for avatar operations
pub type Result<T> = std::result::Result<T, AvatarError>;
