//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator initialization.
//!
//! # Overview
//!
//! The [`Device`] struct provides a safe abstraction over the Vulkan logical device:
//! - Logical device creation with the swapchain extension, dynamic rendering
//!   and synchronization2
//! - A single queue from the family recorded in [`GpuInfo`], used for both
//!   graphics submission and presentation
//! - Memory allocation via gpu-allocator
//!
//! # Example
//!
//! ```no_run
//! use relay_rhi::instance::Instance;
//! use relay_rhi::physical_device::select_physical_device;
//! use relay_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(&[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let gpu = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &gpu).expect("Failed to create logical device");
//! let queue = device.queue();
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::GpuInfo;
use crate::teardown::WaitIdle;

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is designed to be shared across threads using `Arc`. The internal
/// allocator is protected by a `Mutex` for thread-safe memory allocation. The
/// queue is only submitted to from the render thread.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Description of the physical device this device was created on.
    gpu: GpuInfo,
    /// GPU memory allocator. Released before the device itself.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Graphics and present queue.
    queue: vk::Queue,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(instance: &Instance, gpu: &GpuInfo) -> Result<Arc<Self>, RhiError> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(gpu.queue_family)
            .queue_priorities(&queue_priorities)];

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_3);

        // SAFETY: `gpu.device` belongs to `instance`, and every pointer in
        // `create_info` refers to locals that outlive the call.
        let device = unsafe {
            instance
                .handle()
                .create_device(gpu.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        // SAFETY: one queue was requested from this family above.
        let queue = unsafe { device.get_device_queue(gpu.queue_family, 0) };
        debug!("Queue retrieved from family {}", gpu.queue_family);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: gpu.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing has been created from the device yet.
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            gpu: gpu.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.gpu.device
    }

    #[inline]
    pub fn gpu(&self) -> &GpuInfo {
        &self.gpu
    }

    /// Returns the graphics/present queue handle.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Returns the family index of [`Device::queue`].
    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.gpu.queue_family
    }

    /// Returns a reference to the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Waits for the device to become idle.
    ///
    /// Blocks until all outstanding work on the queue has completed.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        // SAFETY: the device handle is valid for the lifetime of `self`.
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits work to the queue using synchronization2.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Semaphores are in the states the submission expects
    /// - The fence (if not null) is unsignaled and not in use
    pub unsafe fn submit2(
        &self,
        submits: &[vk::SubmitInfo2<'_>],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device.queue_submit2(self.queue, submits, fence)?;
        }
        Ok(())
    }
}

impl WaitIdle for Device {
    fn wait_idle(&self) -> Result<(), RhiError> {
        Device::wait_idle(self)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: every object created from this device holds an `Arc` to it,
        // so they are all gone by now. The allocator is released first because
        // freeing its memory blocks needs a live device.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device is Send+Sync
// - vk::Queue and the GpuInfo handles are plain Copy handles
// - Allocator is protected by Mutex
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        // Compile-time check that Device is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
