//! Core utilities for the relay frame engine.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Compiled-in configuration
//! - The per-frame bump arena

pub mod arena;
pub mod config;
mod error;
mod logging;
mod timer;

pub use arena::{ArenaRef, ArenaSlice, FrameArena};
pub use config::FrameConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameTime, Timer};
