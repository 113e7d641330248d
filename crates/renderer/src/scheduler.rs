//! Per-frame ordering of waits, acquires, submits and presents.
//!
//! [`FrameScheduler`] owns the swap target manager and the frame slots and
//! runs one logical frame at a time:
//!
//! ```text
//! 1. Wait on the slot fence (a timeout is fatal)
//! 2. Rebuild the swap images if they are stale or the drawable size changed
//! 3. Acquire a target; out of date means rebuild and skip
//! 4. Reset the fence, record, submit
//! 5. Present; out of date marks the images stale for the next frame
//! 6. Advance to the next slot
//! ```
//!
//! A skipped frame never touches the fence, so the next lap on that slot
//! finds it still signaled.

use std::time::Duration;

use glam::IVec2;
use tracing::{debug, warn};

use relay_core::FrameConfig;
use relay_rhi::swapchain::{
    AcquireOutcome, PresentOutcome, PresentSurface, RecreateOutcome, RenderTarget, SwapState,
    Swapchain,
};
use relay_rhi::{RhiError, vk};

use crate::error::RenderResult;
use crate::frame_manager::FrameSlots;

/// What happened to one logical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Nothing was drawn; the swap images were (or could not be) rebuilt.
    Skipped,
}

/// When to rebuild the swap images, and when to give up on them.
#[derive(Debug)]
struct SwapHealth {
    /// Set when the images are known not to match the surface.
    stale: bool,
    /// Size the images were last (re)built for.
    requested_size: IVec2,
    failures: u32,
    max_failures: u32,
}

impl SwapHealth {
    fn new(size: IVec2, max_failures: u32) -> Self {
        Self {
            stale: false,
            requested_size: size,
            failures: 0,
            max_failures,
        }
    }

    fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Whether the images must be rebuilt before drawing at `size`.
    fn needs_rebuild(&mut self, size: IVec2, state: SwapState) -> bool {
        if size != self.requested_size {
            debug!(
                "Drawable size changed to {}x{}, rebuilding swap images",
                size.x, size.y
            );
            self.stale = true;
        }
        self.stale || matches!(state, SwapState::Stale | SwapState::Uninitialized)
    }

    /// Folds in a recreation attempt at `size`. Returns true if new images
    /// are in place.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] once `max_failures` attempts in a row
    /// have failed.
    fn record(&mut self, size: IVec2, outcome: RecreateOutcome) -> RenderResult<bool> {
        self.requested_size = size;

        match outcome {
            RecreateOutcome::Rebuilt => {
                self.stale = false;
                self.failures = 0;
                Ok(true)
            }
            RecreateOutcome::ZeroArea => {
                // Keep retrying until the window has an area again
                self.stale = true;
                Ok(false)
            }
            RecreateOutcome::Failed(e) => {
                self.stale = true;
                self.failures += 1;
                if self.failures >= self.max_failures {
                    return Err(RhiError::SwapchainError(format!(
                        "giving up after {} consecutive recreation failures: {}",
                        self.failures, e
                    ))
                    .into());
                }
                warn!(
                    "Swap image recreation failed ({} of {}), retrying next frame",
                    self.failures, self.max_failures
                );
                Ok(false)
            }
        }
    }
}

/// Drives the swap images and frame slots through one frame at a time.
///
/// Field order is drop order: slots go before the swap images.
pub struct FrameScheduler<S: PresentSurface, F: FrameSlots> {
    slots: F,
    swapchain: Swapchain<S>,
    health: SwapHealth,
    queue: vk::Queue,
    fence_timeout: Duration,
}

impl<S: PresentSurface, F: FrameSlots> FrameScheduler<S, F> {
    /// `size` is the drawable size `swapchain` was built for.
    pub fn new(
        swapchain: Swapchain<S>,
        slots: F,
        queue: vk::Queue,
        size: IVec2,
        config: &FrameConfig,
    ) -> Self {
        Self {
            slots,
            swapchain,
            health: SwapHealth::new(size, config.max_recreate_failures),
            queue,
            fence_timeout: config.fence_timeout,
        }
    }

    /// Runs one logical frame at drawable size `size`.
    ///
    /// `record` fills the current slot's commands for the acquired target.
    /// It runs between [`FrameSlots::begin_frame`] and
    /// [`FrameSlots::end_frame`] and only when a target was acquired.
    ///
    /// # Errors
    ///
    /// Fence timeouts, submission failures, unexpected driver results and
    /// repeated recreation failures are fatal.
    pub fn run_frame<R>(&mut self, size: IVec2, record: R) -> RenderResult<FrameOutcome>
    where
        R: FnOnce(&F, &Swapchain<S>, &RenderTarget),
    {
        self.slots.wait_for_frame(self.fence_timeout)?;

        let outcome = match self.acquire(size)? {
            Some(target) => {
                self.render(&target, record)?;
                FrameOutcome::Presented
            }
            None => FrameOutcome::Skipped,
        };

        self.slots.next_frame();
        Ok(outcome)
    }

    /// Brings the swap images up to date and acquires one.
    fn acquire(&mut self, size: IVec2) -> RenderResult<Option<RenderTarget>> {
        if self.health.needs_rebuild(size, self.swapchain.state()) && !self.recreate(size)? {
            return Ok(None);
        }

        let signal = self.slots.image_acquired();
        match self.swapchain.acquire(signal)? {
            AcquireOutcome::Target(target) => Ok(Some(target)),
            AcquireOutcome::NeedsRecreation => {
                self.recreate(size)?;
                Ok(None)
            }
        }
    }

    fn render<R>(&mut self, target: &RenderTarget, record: R) -> RenderResult<()>
    where
        R: FnOnce(&F, &Swapchain<S>, &RenderTarget),
    {
        // The fence is reset only now that this frame will signal it again
        self.slots.begin_frame()?;
        record(&self.slots, &self.swapchain, target);
        self.slots.end_frame()?;

        self.slots.submit(self.swapchain.render_done_signal())?;

        if self.swapchain.present(self.queue)? == PresentOutcome::NeedsRecreation {
            debug!("Swap images out of date after present");
            self.health.mark_stale();
        }
        Ok(())
    }

    /// Rebuilds the swap images. Returns true if new images are in place.
    fn recreate(&mut self, size: IVec2) -> RenderResult<bool> {
        let outcome = self.swapchain.recreate_detailed(size);
        self.health.record(size, outcome)
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain<S> {
        &self.swapchain
    }

    #[inline]
    pub fn slots(&self) -> &F {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use ash::vk::Handle;
    use relay_rhi::RhiResult;
    use relay_rhi::swapchain::{ChainDesc, SwapImage, SwapchainConfig, SwapchainSupportDetails};
    use relay_rhi::teardown::WaitIdle;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    const SIZE: IVec2 = IVec2::new(800, 600);

    fn failure() -> RecreateOutcome {
        RecreateOutcome::Failed(RhiError::SwapchainError("surface lost".to_string()))
    }

    /// Presentation engine with scripted acquire and present results.
    #[derive(Default)]
    struct FakeSurface {
        acquire_results: VecDeque<Result<(u32, bool), vk::Result>>,
        present_results: VecDeque<Result<bool, vk::Result>>,
        builds: Vec<ChainDesc>,
        acquires: usize,
    }

    impl WaitIdle for FakeSurface {
        fn wait_idle(&self) -> RhiResult<()> {
            Ok(())
        }
    }

    impl PresentSurface for FakeSurface {
        fn queue_family(&self) -> u32 {
            0
        }

        fn query_support(&self) -> RhiResult<SwapchainSupportDetails> {
            Ok(SwapchainSupportDetails {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 4,
                    current_extent: vk::Extent2D {
                        width: u32::MAX,
                        height: u32::MAX,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 1,
                        height: 1,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                    ..Default::default()
                },
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            })
        }

        fn rebuild(&mut self, desc: &ChainDesc) -> RhiResult<Vec<SwapImage>> {
            self.builds.push(*desc);
            Ok((1..=desc.image_count as u64)
                .map(|i| SwapImage {
                    image: vk::Image::from_raw(i),
                    view: vk::ImageView::from_raw(i),
                    render_done: vk::Semaphore::from_raw(i),
                })
                .collect())
        }

        fn acquire_next_image(&mut self, _signal: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
            self.acquires += 1;
            self.acquire_results.pop_front().unwrap_or(Ok((0, false)))
        }

        fn queue_present(
            &mut self,
            _queue: vk::Queue,
            _index: u32,
            _wait: vk::Semaphore,
        ) -> Result<bool, vk::Result> {
            self.present_results.pop_front().unwrap_or(Ok(false))
        }
    }

    /// One frame slot whose fence behaves like a GPU that finishes every
    /// submission at once, or never when `hung` is set.
    struct FakeSlots {
        calls: RefCell<Vec<&'static str>>,
        fence_signaled: Cell<bool>,
        hung: bool,
        frames: u64,
    }

    impl FakeSlots {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fence_signaled: Cell::new(true),
                hung: false,
                frames: 0,
            }
        }

        fn take_calls(&self) -> Vec<&'static str> {
            self.calls.take()
        }

        fn log(&self, call: &'static str) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl FrameSlots for FakeSlots {
        fn wait_for_frame(&self, timeout: Duration) -> RhiResult<()> {
            self.log("wait");
            if self.fence_signaled.get() {
                Ok(())
            } else {
                Err(RhiError::FenceTimeout(timeout))
            }
        }

        fn image_acquired(&self) -> vk::Semaphore {
            vk::Semaphore::from_raw(0xacc)
        }

        fn begin_frame(&self) -> RhiResult<()> {
            self.log("begin");
            self.fence_signaled.set(false);
            Ok(())
        }

        fn end_frame(&self) -> RhiResult<()> {
            self.log("end");
            Ok(())
        }

        fn submit(&self, _render_done: vk::Semaphore) -> RhiResult<()> {
            self.log("submit");
            if !self.hung {
                self.fence_signaled.set(true);
            }
            Ok(())
        }

        fn next_frame(&mut self) {
            self.log("next");
            self.frames += 1;
        }
    }

    fn scheduler(surface: FakeSurface) -> FrameScheduler<FakeSurface, FakeSlots> {
        let swapchain = Swapchain::new(surface, SIZE, SwapchainConfig::default()).unwrap();
        FrameScheduler::new(
            swapchain,
            FakeSlots::new(),
            vk::Queue::null(),
            SIZE,
            &FrameConfig::default(),
        )
    }

    fn no_record(_: &FakeSlots, _: &Swapchain<FakeSurface>, _: &RenderTarget) {}

    #[test]
    fn test_presented_frame_resets_fence_after_acquire() {
        let mut scheduler = scheduler(FakeSurface::default());

        let mut recorded = None;
        let outcome = scheduler
            .run_frame(SIZE, |slots, _, target| {
                // Recording happens inside begin/end
                assert_eq!(*slots.calls.borrow(), vec!["wait", "begin"]);
                recorded = Some(target.index);
            })
            .unwrap();

        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(recorded, Some(0));
        assert_eq!(scheduler.swapchain().surface().acquires, 1);
        assert_eq!(
            scheduler.slots().take_calls(),
            vec!["wait", "begin", "end", "submit", "next"]
        );
        assert_eq!(scheduler.swapchain().state(), SwapState::Ready);
    }

    #[test]
    fn test_out_of_date_acquire_skips_without_touching_fence() {
        let mut surface = FakeSurface::default();
        surface
            .acquire_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut scheduler = scheduler(surface);
        // A fence reset by this frame would never signal again
        scheduler.slots.hung = true;

        let outcome = scheduler.run_frame(SIZE, no_record).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert_eq!(scheduler.slots().take_calls(), vec!["wait", "next"]);
        assert_eq!(scheduler.swapchain().surface().builds.len(), 2);

        // The next lap finds the fence still signaled
        let outcome = scheduler.run_frame(SIZE, no_record).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
    }

    #[test]
    fn test_zero_area_frames_skip_until_restored() {
        let mut scheduler = scheduler(FakeSurface::default());

        for _ in 0..3 {
            let outcome = scheduler.run_frame(IVec2::new(640, 0), no_record).unwrap();
            assert_eq!(outcome, FrameOutcome::Skipped);
        }
        assert_eq!(
            scheduler.slots().take_calls(),
            vec!["wait", "next", "wait", "next", "wait", "next"]
        );
        assert_eq!(scheduler.swapchain().surface().acquires, 0);
        assert_eq!(scheduler.health.failures, 0);

        let restored = IVec2::new(1024, 768);
        let outcome = scheduler.run_frame(restored, no_record).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(scheduler.swapchain().size(), restored);
    }

    #[test]
    fn test_fence_timeout_is_fatal() {
        let mut scheduler = scheduler(FakeSurface::default());
        scheduler.slots.fence_signaled.set(false);

        let err = scheduler.run_frame(SIZE, no_record).unwrap_err();
        assert!(matches!(err, RenderError::Rhi(RhiError::FenceTimeout(_))));
        assert_eq!(scheduler.slots().take_calls(), vec!["wait"]);
        assert_eq!(scheduler.swapchain().surface().acquires, 0);
        assert_eq!(scheduler.slots().frames, 0);
    }

    #[test]
    fn test_hung_gpu_times_out_on_next_lap() {
        let mut scheduler = scheduler(FakeSurface::default());
        scheduler.slots.hung = true;

        assert_eq!(
            scheduler.run_frame(SIZE, no_record).unwrap(),
            FrameOutcome::Presented
        );
        let err = scheduler.run_frame(SIZE, no_record).unwrap_err();
        assert!(matches!(err, RenderError::Rhi(RhiError::FenceTimeout(_))));
    }

    #[test]
    fn test_recreates_at_packet_size() {
        let mut scheduler = scheduler(FakeSurface::default());
        let resized = IVec2::new(1280, 720);

        let outcome = scheduler.run_frame(resized, no_record).unwrap();
        assert_eq!(outcome, FrameOutcome::Presented);

        let builds = &scheduler.swapchain().surface().builds;
        assert_eq!(builds.len(), 2);
        assert_eq!(
            builds[1].extent,
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn test_out_of_date_present_rebuilds_next_frame() {
        let mut surface = FakeSurface::default();
        surface
            .present_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut scheduler = scheduler(surface);

        assert_eq!(
            scheduler.run_frame(SIZE, no_record).unwrap(),
            FrameOutcome::Presented
        );
        assert_eq!(scheduler.swapchain().state(), SwapState::Stale);

        assert_eq!(
            scheduler.run_frame(SIZE, no_record).unwrap(),
            FrameOutcome::Presented
        );
        assert_eq!(scheduler.swapchain().surface().builds.len(), 2);
    }

    #[test]
    fn test_healthy_ready_images_are_kept() {
        let mut health = SwapHealth::new(SIZE, 8);
        assert!(!health.needs_rebuild(SIZE, SwapState::Ready));
    }

    #[test]
    fn test_stale_state_or_flag_forces_rebuild() {
        let mut health = SwapHealth::new(SIZE, 8);
        assert!(health.needs_rebuild(SIZE, SwapState::Stale));
        assert!(health.needs_rebuild(SIZE, SwapState::Uninitialized));

        health.mark_stale();
        assert!(health.needs_rebuild(SIZE, SwapState::Ready));
        assert!(health.record(SIZE, RecreateOutcome::Rebuilt).unwrap());
        assert!(!health.needs_rebuild(SIZE, SwapState::Ready));
    }

    #[test]
    fn test_size_change_forces_rebuild() {
        let mut health = SwapHealth::new(SIZE, 8);
        assert!(health.needs_rebuild(IVec2::new(1024, 768), SwapState::Ready));
    }

    #[test]
    fn test_zero_area_keeps_retrying_without_failing() {
        let mut health = SwapHealth::new(SIZE, 2);
        for _ in 0..5 {
            assert!(health.needs_rebuild(IVec2::ZERO, SwapState::Ready));
            assert!(!health.record(IVec2::ZERO, RecreateOutcome::ZeroArea).unwrap());
        }
        assert_eq!(health.failures, 0);

        // Restored: rebuilt at the new size
        assert!(health.needs_rebuild(SIZE, SwapState::Ready));
        assert!(health.record(SIZE, RecreateOutcome::Rebuilt).unwrap());
    }

    #[test]
    fn test_failures_give_up_after_limit() {
        let mut health = SwapHealth::new(SIZE, 3);
        assert!(!health.record(SIZE, failure()).unwrap());
        assert!(!health.record(SIZE, failure()).unwrap());

        let err = health.record(SIZE, failure()).unwrap_err();
        assert!(matches!(err, RenderError::Rhi(RhiError::SwapchainError(_))));
        assert!(err.to_string().contains("3 consecutive"));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut health = SwapHealth::new(SIZE, 3);
        assert!(!health.record(SIZE, failure()).unwrap());
        assert!(!health.record(SIZE, failure()).unwrap());
        assert!(health.record(SIZE, RecreateOutcome::Rebuilt).unwrap());
        assert!(!health.record(SIZE, failure()).unwrap());
        assert!(!health.record(SIZE, failure()).unwrap());
    }
}
