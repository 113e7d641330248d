//! Error types for the frame engine.

use thiserror::Error;

/// Main error type for the frame engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// A frame arena ran out of space.
    #[error("Frame arena exhausted: requested {requested} bytes, {remaining} remaining")]
    ArenaExhausted { requested: usize, remaining: usize },

    /// The render thread stopped abnormally
    #[error("Render thread error: {0}")]
    RenderThread(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
