//! Producer/consumer pipelining of frames.
//!
//! A fixed pool of frame contexts circulates through two bounded queues:
//!
//! ```text
//!            +------- free <-------+
//!            v                     |
//!   producer (main thread)   consumer (render thread)
//!            |                     ^
//!            +------> ready -------+
//! ```
//!
//! The producer never blocks. With no free context it skips the frame, which
//! is how GPU back-pressure reaches the main thread. The consumer waits for
//! ready frames and hands each one back once it is done with it.
//!
//! # Example
//!
//! ```no_run
//! use relay_renderer::frame::FrameContext;
//! use relay_renderer::harness::{FramePipeline, Produced, WaitStrategy};
//! use relay_renderer::RenderResult;
//!
//! # fn example() -> RenderResult<()> {
//! let pool = FrameContext::pool(3, 1024 * 1024);
//! let consumer = |frame: &mut FrameContext| -> RenderResult<()> {
//!     let _ = frame.packet();
//!     Ok(())
//! };
//! let mut pipeline = FramePipeline::spawn(pool, 4, consumer, WaitStrategy::default())?;
//!
//! if let Produced::Queued = pipeline.produce(|_frame| Ok(()))? {
//!     // the render thread will pick it up
//! }
//!
//! let report = pipeline.join()?;
//! assert_eq!(report.released, 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use relay_core::config::RENDER_POLL_INTERVAL;
use tracing::{debug, error, info, warn};

use crate::error::RenderResult;
use crate::handoff::{self, HandoffRx, HandoffTx, PopError, PushError};

/// How the render thread waits for the next ready frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Busy-poll, yielding the time slice between attempts.
    Yield,
    /// Sleep until a frame is pushed, re-checking the running flag at least
    /// this often.
    Block(Duration),
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self::Block(RENDER_POLL_INTERVAL)
    }
}

/// Work done on the render thread for every ready frame.
pub trait FrameConsumer<T>: Send + 'static {
    /// Consumes one frame. An error stops the pipeline.
    fn consume(&mut self, frame: &mut T) -> RenderResult<()>;
}

impl<T, F> FrameConsumer<T> for F
where
    F: FnMut(&mut T) -> RenderResult<()> + Send + 'static,
{
    fn consume(&mut self, frame: &mut T) -> RenderResult<()> {
        self(frame)
    }
}

/// Result of one [`FramePipeline::produce`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produced {
    /// The frame was built and handed to the render thread.
    Queued,
    /// No context was available, or the ready queue was full.
    Skipped,
    /// The pipeline is shutting down.
    Stopped,
}

/// Summary returned by [`FramePipeline::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Contexts released during the final drain.
    pub released: usize,
    /// Frames the consumer processed over the pipeline's lifetime.
    pub frames_consumed: u64,
}

/// What the render thread leaves behind.
struct RenderExit<T> {
    ready_rx: HandoffRx<T>,
    stranded: Vec<T>,
    result: RenderResult<()>,
}

/// Owner of the frame pool, both queues and the render thread.
///
/// Dropping a pipeline that was not joined stops and joins it, logging any
/// error.
pub struct FramePipeline<T: Send + 'static> {
    running: Arc<AtomicBool>,
    consumed: Arc<AtomicU64>,
    ready_tx: HandoffTx<T>,
    free_rx: HandoffRx<T>,
    /// A built frame the ready queue rejected, reused by the next produce.
    held: Option<T>,
    thread: Option<JoinHandle<RenderExit<T>>>,
    pool_size: usize,
}

impl<T: Send + 'static> FramePipeline<T> {
    /// Fills the free queue with `pool` and starts the render thread.
    ///
    /// # Errors
    ///
    /// Returns [`relay_core::Error::Config`] if the pool is empty or larger
    /// than `capacity`, and [`relay_core::Error::RenderThread`] if the thread
    /// cannot be spawned.
    pub fn spawn<C>(
        pool: Vec<T>,
        capacity: usize,
        consumer: C,
        wait: WaitStrategy,
    ) -> RenderResult<Self>
    where
        C: FrameConsumer<T>,
    {
        let pool_size = pool.len();
        if pool_size == 0 || capacity < pool_size {
            return Err(relay_core::Error::Config(format!(
                "frame pool of {} does not fit queues of capacity {}",
                pool_size, capacity
            ))
            .into());
        }

        let (ready_tx, ready_rx) = handoff::bounded(capacity);
        let (free_tx, free_rx) = handoff::bounded(capacity);
        for frame in pool {
            if free_tx.try_push(frame).is_err() {
                // Unreachable: the capacity check above guarantees room
                return Err(relay_core::Error::Internal("free queue rejected pool".into()).into());
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let consumed = Arc::new(AtomicU64::new(0));

        let thread = {
            let running = Arc::clone(&running);
            let consumed = Arc::clone(&consumed);
            thread::Builder::new()
                .name("relay-render".into())
                .spawn(move || render_loop(running, consumed, ready_rx, free_tx, consumer, wait))
                .map_err(|e| {
                    relay_core::Error::RenderThread(format!("failed to spawn render thread: {}", e))
                })?
        };

        info!(
            "Frame pipeline started: {} contexts, queue capacity {}, {:?}",
            pool_size, capacity, wait
        );

        Ok(Self {
            running,
            consumed,
            ready_tx,
            free_rx,
            held: None,
            thread: Some(thread),
            pool_size,
        })
    }

    /// Claims a free context, builds a frame into it and queues it.
    ///
    /// Never blocks. If `build` fails the context is kept for the next call
    /// and the error is returned.
    pub fn produce<F>(&mut self, build: F) -> RenderResult<Produced>
    where
        F: FnOnce(&mut T) -> RenderResult<()>,
    {
        if !self.is_running() {
            return Ok(Produced::Stopped);
        }

        let mut frame = match self.held.take() {
            Some(frame) => frame,
            None => match self.free_rx.try_pop() {
                Ok(frame) => frame,
                Err(PopError::Empty) => return Ok(Produced::Skipped),
                Err(PopError::Closed) => return Ok(Produced::Stopped),
            },
        };

        if let Err(e) = build(&mut frame) {
            self.held = Some(frame);
            return Err(e);
        }

        match self.ready_tx.try_push(frame) {
            Ok(()) => Ok(Produced::Queued),
            Err(PushError::Full(frame)) => {
                debug!("Ready queue full, holding frame back");
                self.held = Some(frame);
                Ok(Produced::Skipped)
            }
            Err(PushError::Closed(frame)) => {
                self.held = Some(frame);
                Ok(Produced::Stopped)
            }
        }
    }

    /// Asks the render thread to finish. Does not wait.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Contexts currently waiting in the free queue.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free_rx.len()
    }

    /// Frames currently waiting in the ready queue.
    #[inline]
    pub fn ready_len(&self) -> usize {
        self.ready_tx.len()
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[inline]
    pub fn frames_consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Stops the render thread, waits for it and releases every context.
    ///
    /// # Errors
    ///
    /// Returns the consumer's error if it stopped the pipeline, or
    /// [`relay_core::Error::RenderThread`] if the render thread panicked.
    /// Contexts are released either way.
    pub fn join(mut self) -> RenderResult<ShutdownReport> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> RenderResult<ShutdownReport> {
        self.stop();

        let Some(thread) = self.thread.take() else {
            return Ok(ShutdownReport {
                released: 0,
                frames_consumed: self.frames_consumed(),
            });
        };

        let exit = thread.join();

        let mut released = usize::from(self.held.take().is_some());
        released += self.free_rx.drain().count();

        let result = match exit {
            Ok(exit) => {
                released += exit.stranded.len();
                released += exit.ready_rx.drain().count();
                exit.result
            }
            Err(panic) => Err(relay_core::Error::RenderThread(panic_message(panic.as_ref())).into()),
        };

        if released != self.pool_size {
            warn!(
                "Released {} of {} frame contexts at shutdown",
                released, self.pool_size
            );
        }

        let report = ShutdownReport {
            released,
            frames_consumed: self.frames_consumed(),
        };
        info!(
            "Frame pipeline stopped: {} frames consumed, {} contexts released",
            report.frames_consumed, report.released
        );

        result.map(|()| report)
    }
}

impl<T: Send + 'static> Drop for FramePipeline<T> {
    fn drop(&mut self) {
        if self.thread.is_some()
            && let Err(e) = self.shutdown()
        {
            error!("Render thread ended with an error: {}", e);
        }
    }
}

fn render_loop<T, C>(
    running: Arc<AtomicBool>,
    consumed: Arc<AtomicU64>,
    ready_rx: HandoffRx<T>,
    free_tx: HandoffTx<T>,
    mut consumer: C,
    wait: WaitStrategy,
) -> RenderExit<T>
where
    T: Send + 'static,
    C: FrameConsumer<T>,
{
    info!("Render thread started");
    let _unwind = StopOnUnwind(running.clone());

    let mut stranded = Vec::new();
    let recycle = |frame: T, stranded: &mut Vec<T>| {
        if let Err(e) = free_tx.try_push(frame) {
            stranded.push(e.into_inner());
        }
    };

    let result = loop {
        if !running.load(Ordering::Acquire) {
            break Ok(());
        }

        let popped = match wait {
            WaitStrategy::Yield => {
                let popped = ready_rx.try_pop();
                if popped.is_err() {
                    thread::yield_now();
                }
                popped
            }
            WaitStrategy::Block(poll) => ready_rx.pop_timeout(poll),
        };

        let mut frame = match popped {
            Ok(frame) => frame,
            Err(PopError::Empty) => continue,
            Err(PopError::Closed) => break Ok(()),
        };

        let outcome = consumer.consume(&mut frame);
        consumed.fetch_add(1, Ordering::Relaxed);
        recycle(frame, &mut stranded);

        if let Err(e) = outcome {
            error!("Render thread stopping: {}", e);
            running.store(false, Ordering::Release);
            break Err(e);
        }
    };

    for frame in ready_rx.drain() {
        recycle(frame, &mut stranded);
    }

    // The consumer (and any GPU state it owns) is released on this thread
    drop(consumer);
    info!("Render thread finished");

    RenderExit {
        ready_rx,
        stranded,
        result,
    }
}

/// Clears the running flag if the render thread unwinds, so the producer
/// sees the pipeline as stopped.
struct StopOnUnwind(Arc<AtomicBool>);

impl Drop for StopOnUnwind {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(false, Ordering::Release);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("render thread panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("render thread panicked: {}", msg)
    } else {
        "render thread panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use relay_rhi::RhiError;
    use std::time::Instant;

    fn idle_consumer() -> impl FnMut(&mut u32) -> RenderResult<()> + Send + 'static {
        |_| Ok(())
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_wait_strategy_default_blocks() {
        assert_eq!(
            WaitStrategy::default(),
            WaitStrategy::Block(RENDER_POLL_INTERVAL)
        );
    }

    #[test]
    fn test_spawn_rejects_oversized_pool() {
        let result = FramePipeline::spawn(
            vec![0u32; 5],
            4,
            idle_consumer(),
            WaitStrategy::default(),
        );
        assert!(matches!(
            result,
            Err(RenderError::Core(relay_core::Error::Config(_)))
        ));
    }

    #[test]
    fn test_build_error_keeps_context() {
        let mut pipeline = FramePipeline::spawn(
            vec![0u32],
            4,
            idle_consumer(),
            WaitStrategy::default(),
        )
        .unwrap();

        let err = pipeline
            .produce(|_| Err(relay_core::Error::Internal("boom".into()).into()))
            .unwrap_err();
        assert!(err.to_string().contains("boom"));

        // The only context was held back, not lost
        let report = pipeline.join().unwrap();
        assert_eq!(report.released, 1);
    }

    #[test]
    fn test_consumer_error_stops_pipeline() {
        let mut pipeline = FramePipeline::spawn(
            vec![0u32, 1, 2],
            4,
            |_: &mut u32| -> RenderResult<()> {
                Err(RhiError::FenceTimeout(Duration::from_secs(1)).into())
            },
            WaitStrategy::default(),
        )
        .unwrap();

        assert_eq!(pipeline.produce(|_| Ok(())).unwrap(), Produced::Queued);
        wait_until(|| !pipeline.is_running());
        assert_eq!(pipeline.produce(|_| Ok(())).unwrap(), Produced::Stopped);

        let err = pipeline.join().unwrap_err();
        assert!(matches!(
            err,
            RenderError::Rhi(RhiError::FenceTimeout(_))
        ));
    }

    #[test]
    fn test_consumer_panic_is_reported() {
        let mut pipeline = FramePipeline::spawn(
            vec![0u32],
            4,
            |_: &mut u32| -> RenderResult<()> { panic!("consumer exploded") },
            WaitStrategy::Yield,
        )
        .unwrap();

        assert_eq!(pipeline.produce(|_| Ok(())).unwrap(), Produced::Queued);
        wait_until(|| !pipeline.is_running());
        assert_eq!(pipeline.produce(|_| Ok(())).unwrap(), Produced::Stopped);

        let err = pipeline.join().unwrap_err();
        assert!(err.to_string().contains("consumer exploded"));
    }

    #[test]
    fn test_pipeline_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FramePipeline<crate::frame::FrameContext>>();
    }
}
