//! Physical device (GPU) selection.
//!
//! This module enumerates the available GPUs and picks one that can drive the
//! frame engine: Vulkan 1.3 with dynamic rendering and synchronization2, the
//! swapchain extension, and a single queue family that does both graphics and
//! presentation to the window surface.
//!
//! # Example
//!
//! ```no_run
//! use relay_rhi::instance::Instance;
//! use relay_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(&[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let gpu = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", gpu.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Immutable description of the GPU chosen at startup.
///
/// Everything downstream (device creation, swapchain barriers, submission)
/// reads the queue family index from here.
#[derive(Clone)]
pub struct GpuInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported core features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Queue family supporting both graphics and presentation.
    pub queue_family: u32,
}

impl GpuInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        // SAFETY: the driver fills `device_name` with a null-terminated string.
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("GpuInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_family", &self.queue_family)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// Devices are filtered by the requirements listed in the module docs and
/// the remaining ones ranked by device type, discrete GPUs first.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<GpuInfo, RhiError> {
    // SAFETY: `instance` is a live instance handle.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device_type(info.properties.device_type);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((gpu, score)) = selected else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = gpu.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, queue family {}, Score: {}",
        gpu.device_name(),
        gpu.device_type_name(),
        major,
        minor,
        patch,
        gpu.queue_family,
        score
    );

    Ok(gpu)
}

/// Returns `Some(GpuInfo)` if the device meets every requirement.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<GpuInfo> {
    // SAFETY: `device` was enumerated from `instance`.
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };

    // SAFETY: the driver fills `device_name` with a null-terminated string.
    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    if !supports_api_1_3(properties.api_version) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return None;
    }

    let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features_1_3);
    // SAFETY: `features2` chains only structures that outlive the call.
    unsafe { instance.get_physical_device_features2(device, &mut features2) };
    if features_1_3.dynamic_rendering == vk::FALSE || features_1_3.synchronization2 == vk::FALSE {
        debug!(
            "GPU '{}' skipped: dynamic rendering or synchronization2 unsupported",
            device_name
        );
        return None;
    }

    if !supports_swapchain(instance, device) {
        debug!("GPU '{}' skipped: VK_KHR_swapchain unsupported", device_name);
        return None;
    }

    // SAFETY: `device` was enumerated from `instance`.
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_family = pick_queue_family(&families, |index| {
        // SAFETY: `index` is a valid family index of `device`, and `surface`
        // was created from the same instance.
        unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        }
    });

    let Some(queue_family) = queue_family else {
        debug!(
            "GPU '{}' skipped: no queue family supports both graphics and present",
            device_name
        );
        return None;
    };

    Some(GpuInfo {
        device,
        properties,
        features,
        queue_family,
    })
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    // SAFETY: `device` was enumerated from `instance`.
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };
    extensions.iter().any(|ext| {
        ext.extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::swapchain::NAME)
    })
}

/// Whether a packed API version is at least 1.3.
fn supports_api_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// First queue family with graphics support that `can_present` accepts.
fn pick_queue_family(
    families: &[vk::QueueFamilyProperties],
    can_present: impl Fn(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(index, _)| index as u32)
        .find(|&index| can_present(index))
}

fn rate_device_type(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    }
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}
