//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and debug messengers.
//!
//! # Overview
//!
//! The [`Instance`] struct provides a safe abstraction over the Vulkan instance.
//! Surface extensions are supplied by the caller (normally the window's
//! required list) so the instance matches whatever display server is in use.
//! Validation can be requested; when the layer is missing the instance is
//! created without it and a warning is logged.
//!
//! # Example
//!
//! ```no_run
//! use relay_rhi::instance::Instance;
//!
//! // Headless instance, validation in debug builds
//! let instance = Instance::new(&[], cfg!(debug_assertions)).expect("Failed to create Vulkan instance");
//!
//! // Access the underlying Vulkan handles
//! let vk_instance = instance.handle();
//! let entry = instance.entry();
//! ```

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{error, info, warn};

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
///
/// This struct manages the lifetime of the Vulkan instance and its associated
/// debug utilities. When dropped, it properly cleans up all Vulkan resources.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `surface_extensions` - Instance extensions the window needs for surface creation
    /// * `enable_validation` - If true, enables validation layers and debug messenger
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Required extensions are not available
    /// - Instance creation fails
    /// - Debug messenger setup fails (when validation is enabled)
    pub fn new(
        surface_extensions: &[*const c_char],
        enable_validation: bool,
    ) -> Result<Self, RhiError> {
        // SAFETY: loading the system Vulkan library has no preconditions
        // beyond it being a conforming loader.
        let entry = unsafe { Entry::load()? };

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;

        // Set up application info
        let app_info = vk::ApplicationInfo::default()
            .application_name(c"relay")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"relay")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = Self::merge_extensions(surface_extensions);
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        // Set up layers
        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        // Create instance
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(RhiError::from)?
        };

        info!("Vulkan instance created successfully (API version 1.3)");

        // Set up debug messenger if validation is enabled
        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            info!("Debug messenger created successfully");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        if validation_available {
            info!("Validation layers enabled");
        } else if enable_validation {
            warn!("Validation layers were requested but are not available");
        }

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Combines the caller's extensions with `VK_KHR_surface`, dropping duplicates.
    fn merge_extensions(surface_extensions: &[*const c_char]) -> Vec<*const c_char> {
        let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];
        for &ext in surface_extensions {
            // SAFETY: callers pass pointers to static null-terminated names.
            let name = unsafe { CStr::from_ptr(ext) };
            let present = extensions
                .iter()
                // SAFETY: as above, every entry is a static extension name.
                .any(|&existing| unsafe { CStr::from_ptr(existing) } == name);
            if !present {
                extensions.push(ext);
            }
        }
        extensions
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        // SAFETY: `entry` holds a loaded Vulkan library.
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let validation_layer_name = VALIDATION_LAYER_NAME.to_bytes_with_nul();

        let found = available_layers.iter().any(|layer| {
            let layer_name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            layer_name.to_bytes_with_nul() == validation_layer_name
        });

        Ok(found)
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(RhiError::from)?
        };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Debug callback function for validation layer messages.
///
/// This function is called by the Vulkan validation layer when it detects
/// issues with API usage. Messages are logged using the tracing crate.
///
/// # Safety
///
/// This function is called from the Vulkan driver and must follow the
/// Vulkan specification for debug callbacks.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            // VERBOSE level - use info for now
            info!("[Vulkan {} Verbose] {}", type_str, message);
        }
    }

    // Returning VK_FALSE indicates the call should not be aborted
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_creation_without_validation() {
        // Requires a Vulkan loader; skipped on machines without one
        match Instance::new(&[], false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) => eprintln!("Skipping test: Vulkan not available ({e})"),
        }
    }

    #[test]
    fn test_instance_creation_with_validation() {
        match Instance::new(&[], true) {
            Ok(instance) => {
                // Validation might or might not be available depending on the system
                if instance.has_validation() {
                    assert!(instance.debug_utils.is_some());
                }
            }
            Err(e) => eprintln!("Skipping test: Vulkan not available ({e})"),
        }
    }

    #[test]
    fn test_merge_extensions_dedups_surface() {
        let requested = [
            ash::khr::surface::NAME.as_ptr(),
            ash::khr::xlib_surface::NAME.as_ptr(),
            ash::khr::xlib_surface::NAME.as_ptr(),
        ];
        let merged = Instance::merge_extensions(&requested);
        assert_eq!(merged.len(), 2);
        // SAFETY: entries are static extension names.
        assert_eq!(unsafe { CStr::from_ptr(merged[0]) }, ash::khr::surface::NAME);
        assert_eq!(unsafe { CStr::from_ptr(merged[1]) }, ash::khr::xlib_surface::NAME);
    }

    #[test]
    fn test_merge_extensions_always_includes_surface() {
        let merged = Instance::merge_extensions(&[]);
        assert_eq!(merged.len(), 1);
    }
}
