//! Frame pipelining and scheduling.
//!
//! This crate moves frames from the producer to the GPU:
//! - Frame contexts and the packets built into them
//! - Bounded handoff queues and the producer/consumer harness
//! - Frames-in-flight slots
//! - The frame scheduler that orders waits, acquires, submits and presents
//! - The Vulkan renderer that records each frame

mod error;

pub mod frame;
pub mod frame_manager;
pub mod handoff;
pub mod harness;
pub mod renderer;
pub mod scheduler;

pub use error::{RenderError, RenderResult};
pub use frame::{DrawCommand, FrameContext, FramePacket};
pub use harness::{FrameConsumer, FramePipeline, Produced, ShutdownReport, WaitStrategy};
pub use renderer::Renderer;
pub use scheduler::{FrameOutcome, FrameScheduler};
