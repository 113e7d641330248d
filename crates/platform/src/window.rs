//! Window management using winit.
//!
//! This module provides window creation and Vulkan surface creation functionality.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use glam::IVec2;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use relay_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// The caller must ensure that the Vulkan instance outlives this surface,
/// and that every swapchain built on it is destroyed first.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Raw handle, valid only as long as this `Surface` exists.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface from the
        // same instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A resizable winit window plus the raw handles Vulkan needs.
///
/// The winit window is reference counted so it can be shared with the render
/// thread; winit windows are `Send + Sync`.
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Create a new window with the given dimensions and title.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    pub fn inner_arc(&self) -> Arc<WinitWindow> {
        self.window.clone()
    }

    #[inline]
    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    /// Current drawable size in pixels. Zero on either axis while minimized.
    pub fn drawable_size(&self) -> IVec2 {
        drawable_size_of(&self.window)
    }

    /// Instance extensions needed to present to this window.
    ///
    /// The pointers reference static strings owned by `ash-window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                Error::Vulkan(format!("Failed to enumerate required extensions: {}", e))
            })?;

        tracing::debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns valid, null-terminated static strings.
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    /// Create a Vulkan surface for this window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] for unavailable handles and [`Error::Vulkan`]
    /// if the driver refuses the surface.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are live; the handles come from a live
        // winit window. The surface is destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

/// Drawable size of any winit window, as a signed vector.
pub fn drawable_size_of(window: &WinitWindow) -> IVec2 {
    size_to_ivec(window.inner_size())
}

pub(crate) fn size_to_ivec(size: PhysicalSize<u32>) -> IVec2 {
    IVec2::new(
        size.width.min(i32::MAX as u32) as i32,
        size.height.min(i32::MAX as u32) as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_to_ivec() {
        assert_eq!(size_to_ivec(PhysicalSize::new(800, 600)), IVec2::new(800, 600));
        assert_eq!(size_to_ivec(PhysicalSize::new(0, 0)), IVec2::ZERO);
    }

    #[test]
    fn test_size_to_ivec_saturates() {
        let size = size_to_ivec(PhysicalSize::new(u32::MAX, 1));
        assert_eq!(size.x, i32::MAX);
        assert_eq!(size.y, 1);
    }
}
