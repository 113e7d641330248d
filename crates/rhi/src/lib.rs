//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Swap target management and presentation
//! - Command buffer recording with dynamic rendering
//! - Pipeline creation
//! - Synchronization primitives and idle-gated teardown

mod error;

pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod teardown;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
