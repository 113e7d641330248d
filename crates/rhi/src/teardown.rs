//! Device-idle gate for GPU resource destruction.
//!
//! GPU objects may not be destroyed while submitted work still references
//! them. A [`TeardownGuard`] waits for the device to drain when it is
//! dropped; owners declare it as their *first* field so Rust's declaration
//! order drop runs the wait before any other GPU object is released.
//!
//! ```ignore
//! struct Renderer {
//!     _teardown: TeardownGuard<Device>, // dropped first
//!     pipeline: Pipeline,
//!     swapchain: Swapchain<VulkanSurface>,
//! }
//! ```

use std::sync::Arc;

use crate::error::RhiResult;

/// Anything that can block until all GPU work it owns has finished.
pub trait WaitIdle {
    fn wait_idle(&self) -> RhiResult<()>;
}

/// Waits for device idle on drop.
pub struct TeardownGuard<D: WaitIdle> {
    device: Arc<D>,
}

impl<D: WaitIdle> TeardownGuard<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self { device }
    }
}

impl<D: WaitIdle> Drop for TeardownGuard<D> {
    fn drop(&mut self) {
        // Never panic in drop; a failed wait (e.g. device lost) is only reported.
        match self.device.wait_idle() {
            Ok(()) => tracing::debug!("Device idle, releasing GPU resources"),
            Err(e) => tracing::error!("Failed to wait for device idle during teardown: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RhiError;
    use ash::vk;
    use std::sync::Mutex;

    /// Records the order of idle waits and resource releases.
    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    impl WaitIdle for Journal {
        fn wait_idle(&self) -> RhiResult<()> {
            self.events.lock().unwrap().push("idle");
            if self.fail {
                Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
            } else {
                Ok(())
            }
        }
    }

    struct FakeResource(Arc<Journal>);

    impl Drop for FakeResource {
        fn drop(&mut self) {
            self.0.events.lock().unwrap().push("release");
        }
    }

    struct Owner {
        _teardown: TeardownGuard<Journal>,
        _resource: FakeResource,
    }

    #[test]
    fn test_guard_waits_before_later_fields_drop() {
        let journal = Arc::new(Journal::default());
        let owner = Owner {
            _teardown: TeardownGuard::new(journal.clone()),
            _resource: FakeResource(journal.clone()),
        };
        drop(owner);

        assert_eq!(*journal.events.lock().unwrap(), vec!["idle", "release"]);
    }

    #[test]
    fn test_failed_wait_does_not_panic() {
        let journal = Arc::new(Journal {
            fail: true,
            ..Default::default()
        });
        drop(TeardownGuard::new(journal.clone()));
        assert_eq!(journal.events.lock().unwrap().len(), 1);
    }
}
