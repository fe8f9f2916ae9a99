//! Error types for voxbridge.

use thiserror::Error;

/// Which of an endpoint's two flows raised a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// The flow that drains the outbound queue into external effects.
    Delivery,
    /// The flow that reads the external source onto the inbound queue.
    Production,
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowKind::Delivery => write!(f, "delivery"),
            FlowKind::Production => write!(f, "production"),
        }
    }
}

#[derive(Error, Debug)]
pub enum VoxbridgeError {
    // Session lifecycle errors
    #[error("Endpoint '{endpoint}' failed to initialize: {message}")]
    Initialization { endpoint: String, message: String },

    #[error("{flow} flow of endpoint '{endpoint}' failed: {message}")]
    FlowFailure {
        endpoint: String,
        flow: FlowKind,
        message: String,
    },

    // Adapter errors
    #[error("Audio device error: {message}")]
    Device { message: String },

    #[error("Conversation store error: {message}")]
    Store { message: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxbridgeError>;
