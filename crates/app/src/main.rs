//! relay - Main Entry Point
//!
//! Opens a window and pipelines frames to a dedicated render thread. The
//! winit main thread is the producer: it builds a frame packet whenever a
//! frame context is free. The render thread records, submits and presents.

use anyhow::Result;
use glam::IVec2;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use relay_core::config::{WINDOW_HEIGHT, WINDOW_TITLE, WINDOW_WIDTH};
use relay_core::{FrameConfig, Timer};
use relay_platform::{PlatformEvent, Window};
use relay_renderer::{FrameContext, FramePipeline, Produced, Renderer, WaitStrategy};

struct App {
    config: FrameConfig,
    pipeline: Option<FramePipeline<FrameContext>>,
    // Dropped after the pipeline: the render thread presents to it
    window: Option<Window>,
    timer: Timer,
    drawable_size: IVec2,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: FrameConfig) -> Self {
        Self {
            config,
            pipeline: None,
            window: None,
            timer: Timer::new(),
            drawable_size: IVec2::ZERO,
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE)?;
        let renderer = Renderer::new(&window, &self.config)?;
        let extent = renderer.extent();
        info!(
            "Rendering on {} ({}) at {}x{} {:?}, validation {}",
            renderer.gpu().device_name(),
            renderer.gpu().device_type_name(),
            extent.width,
            extent.height,
            renderer.format(),
            if renderer.has_validation() { "on" } else { "off" }
        );

        let pool = FrameContext::pool(self.config.pool_size, self.config.arena_size);
        let pipeline = FramePipeline::spawn(
            pool,
            self.config.handoff_capacity,
            renderer,
            WaitStrategy::Block(self.config.poll_interval),
        )?;

        self.drawable_size = window.drawable_size();
        self.timer.reset();
        self.pipeline = Some(pipeline);
        self.window = Some(window);

        info!("Initialization complete, entering main loop");
        Ok(())
    }

    /// Builds and queues one frame if a context is free.
    fn produce(&mut self) -> Result<Produced> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(Produced::Stopped);
        };

        let timer = &mut self.timer;
        let size = self.drawable_size;
        let produced = pipeline.produce(|frame| {
            frame.build_packet(timer.tick(), size, &[])?;
            Ok(())
        })?;
        Ok(produced)
    }

    /// Stops the render thread and releases every frame context.
    fn shutdown(&mut self) {
        let Some(pipeline) = self.pipeline.take() else {
            return;
        };

        match pipeline.join() {
            Ok(report) => info!(
                "Render thread joined: {} frames, {} contexts released",
                report.frames_consumed, report.released
            ),
            Err(e) => {
                error!("Render thread failed: {}", e);
                self.fail(e.into());
            }
        }
    }

    fn fail(&mut self, e: anyhow::Error) {
        if self.failure.is_none() {
            self.failure = Some(e);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.start(event_loop) {
            error!("Failed to initialize: {:#}", e);
            self.fail(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|window| window.id() != id) {
            return;
        }

        match PlatformEvent::from_window_event(&event) {
            Some(PlatformEvent::Quit) => {
                info!("Close requested, shutting down");
                self.shutdown();
                event_loop.exit();
            }
            Some(PlatformEvent::Resized(size)) => {
                debug!("Drawable size now {}x{}", size.x, size.y);
                self.drawable_size = size;
            }
            None => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match self.produce() {
            Ok(Produced::Queued | Produced::Skipped) => {}
            Ok(Produced::Stopped) => {
                if self.pipeline.is_some() {
                    warn!("Render thread stopped, shutting down");
                    self.shutdown();
                    event_loop.exit();
                }
            }
            Err(e) => {
                error!("Failed to build frame: {:#}", e);
                self.fail(e);
                self.shutdown();
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    relay_core::init_logging();
    info!("Starting relay");

    let config = FrameConfig::default();
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.shutdown();

    if let Some(e) = app.failure.take() {
        return Err(e);
    }

    println!("Exiting");
    Ok(())
}
