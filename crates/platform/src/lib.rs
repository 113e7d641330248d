//! Platform abstraction layer for the relay frame engine.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation and required instance extensions
//! - Translation of window events into [`PlatformEvent`]s

mod events;
mod window;

pub use events::PlatformEvent;
pub use window::{Surface, Window, drawable_size_of};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
