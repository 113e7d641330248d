//! Swap target management.
//!
//! This module owns the set of presentable images and everything that has to
//! be rebuilt with it when the window changes size.
//!
//! # Overview
//!
//! [`Swapchain`] is a small state machine over a [`PresentSurface`] backend:
//!
//! ```text
//! Uninitialized --recreate--> Ready --acquire--> Acquired --present--> Ready
//!                               ^                    |
//!                               |    out-of-date     v
//!                               +-----recreate---- Stale
//! ```
//!
//! Staleness (out-of-date or zero-area surfaces) is not an error. It is
//! reported through [`AcquireOutcome`], [`PresentOutcome`] and
//! [`RecreateOutcome`] so the frame loop can rebuild and carry on. Only
//! unexpected driver results surface as [`RhiError`].
//!
//! [`VulkanSurface`] is the real backend. Tests drive the state machine with
//! an in-memory backend instead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use glam::IVec2;
//! use relay_rhi::device::Device;
//! use relay_rhi::instance::Instance;
//! use relay_rhi::swapchain::{AcquireOutcome, Swapchain, SwapchainConfig, VulkanSurface};
//! use ash::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #            image_acquired: vk::Semaphore) -> Result<(), relay_rhi::RhiError> {
//! let backend = VulkanSurface::new(instance, device.clone(), surface);
//! let mut swapchain = Swapchain::new(backend, IVec2::new(800, 600), SwapchainConfig::default())?;
//!
//! if let AcquireOutcome::Target(target) = swapchain.acquire(image_acquired)? {
//!     // ... record and submit work that signals swapchain.render_done_signal() ...
//!     swapchain.present(device.queue())?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use glam::IVec2;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::Semaphore;
use crate::teardown::WaitIdle;

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: the surface and physical device come from the same instance
        // as `surface_loader`.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Tunables for swap target creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Lower bound on the number of images requested.
    pub min_image_count: u32,
    /// Use MAILBOX when available instead of FIFO.
    pub prefer_mailbox: bool,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            min_image_count: relay_core::config::MIN_SWAP_IMAGES,
            prefer_mailbox: false,
        }
    }
}

/// Everything a backend needs to build one set of swap images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainDesc {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Handles belonging to one swap image. The backend owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Signaled by the frame's submission, waited on by present.
    pub render_done: vk::Semaphore,
}

/// The platform side of a swap target set.
///
/// Implementations own the presentation engine objects. [`Swapchain`] decides
/// *what* to build and *when*; the backend only executes.
pub trait PresentSurface: WaitIdle {
    /// Queue family used for rendering and presentation.
    fn queue_family(&self) -> u32;

    fn query_support(&self) -> RhiResult<SwapchainSupportDetails>;

    /// Replace the current image set with one matching `desc`.
    ///
    /// The previous set is handed to the driver for reuse and released. The
    /// caller has already waited for the device to go idle.
    fn rebuild(&mut self, desc: &ChainDesc) -> RhiResult<Vec<SwapImage>>;

    /// Returns `(index, suboptimal)` or the raw driver status.
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<(u32, bool), vk::Result>;

    /// Returns `suboptimal` or the raw driver status.
    fn queue_present(
        &mut self,
        queue: vk::Queue,
        index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result>;
}

/// Lifecycle of the swap target set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// No image set has been built yet.
    Uninitialized,
    /// Images exist and none is held.
    Ready,
    /// The image at this index was acquired and not yet presented.
    Acquired(u32),
    /// The surface no longer matches the image set; rebuild before use.
    Stale,
}

/// A presentable image handed out for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub index: u32,
}

#[derive(Debug)]
pub enum RecreateOutcome {
    /// A new image set is in place.
    Rebuilt,
    /// The requested or reported size has no area; nothing changed.
    ZeroArea,
    /// The platform refused; the set is stale and will be retried.
    Failed(RhiError),
}

impl RecreateOutcome {
    #[inline]
    pub fn is_rebuilt(&self) -> bool {
        matches!(self, Self::Rebuilt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Target(RenderTarget),
    NeedsRecreation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    NeedsRecreation,
}

/// Swap target manager.
///
/// # Thread Safety
///
/// Not shared between threads; it lives on the render thread.
pub struct Swapchain<S: PresentSurface> {
    surface: S,
    config: SwapchainConfig,
    images: Vec<SwapImage>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    state: SwapState,
}

impl<S: PresentSurface> Swapchain<S> {
    /// Builds the first image set for `size`.
    ///
    /// A zero-area `size` leaves the manager uninitialized; acquiring then
    /// reports [`AcquireOutcome::NeedsRecreation`] until a real size arrives.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the first set cannot be built.
    pub fn new(surface: S, size: IVec2, config: SwapchainConfig) -> RhiResult<Self> {
        let mut swapchain = Self {
            surface,
            config,
            images: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            state: SwapState::Uninitialized,
        };

        match swapchain.recreate_detailed(size) {
            RecreateOutcome::Rebuilt | RecreateOutcome::ZeroArea => Ok(swapchain),
            RecreateOutcome::Failed(e) => Err(e),
        }
    }

    /// Rebuilds the image set for `size`. Returns true if a new set is in place.
    pub fn recreate(&mut self, size: IVec2) -> bool {
        self.recreate_detailed(size).is_rebuilt()
    }

    /// Like [`Swapchain::recreate`], but says why nothing was rebuilt.
    ///
    /// Any image still held is abandoned: the device is drained first, so
    /// nothing can be using it.
    pub fn recreate_detailed(&mut self, size: IVec2) -> RecreateOutcome {
        if size.x <= 0 || size.y <= 0 {
            debug!("Skipping swapchain recreation for zero-area size {}x{}", size.x, size.y);
            return RecreateOutcome::ZeroArea;
        }

        if let Err(e) = self.surface.wait_idle() {
            return self.fail(e);
        }

        let support = match self.surface.query_support() {
            Ok(support) => support,
            Err(e) => return self.fail(e),
        };
        if !support.is_adequate() {
            return self.fail(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let capabilities = &support.capabilities;
        let extent = choose_extent(capabilities, size.x as u32, size.y as u32);
        if extent.width == 0 || extent.height == 0 {
            // Minimized windows on some platforms report a zero current extent
            debug!("Surface reports zero extent, skipping swapchain recreation");
            return RecreateOutcome::ZeroArea;
        }

        let desc = ChainDesc {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes, self.config.prefer_mailbox),
            extent,
            image_count: determine_image_count(capabilities, self.config.min_image_count),
            pre_transform: capabilities.current_transform,
            composite_alpha: choose_composite_alpha(capabilities.supported_composite_alpha),
        };

        let images = match self.surface.rebuild(&desc) {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => {
                return self.fail(RhiError::SwapchainError(
                    "Swapchain returned no images".to_string(),
                ));
            }
            Err(e) => return self.fail(e),
        };

        info!(
            "New swapchain is {}x{} ({} images, {:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            desc.format.format,
            desc.present_mode
        );

        self.images = images;
        self.format = desc.format;
        self.present_mode = desc.present_mode;
        self.extent = extent;
        self.state = SwapState::Ready;
        RecreateOutcome::Rebuilt
    }

    /// Acquires the next image, arming `signal` to fire once it may be written.
    ///
    /// # Panics
    ///
    /// Panics if an image is already held: every acquire must be followed by
    /// [`Swapchain::present`] before the next one.
    pub fn acquire(&mut self, signal: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        assert!(
            !matches!(self.state, SwapState::Acquired(_)),
            "swap image acquired twice without an intervening present"
        );

        if self.state == SwapState::Uninitialized {
            return Ok(AcquireOutcome::NeedsRecreation);
        }

        match self.surface.acquire_next_image(signal) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                let Some(image) = self.images.get(index as usize) else {
                    return Err(RhiError::SwapchainError(format!(
                        "Acquired image index {} out of range ({} images)",
                        index,
                        self.images.len()
                    )));
                };
                let target = RenderTarget {
                    image: image.image,
                    view: image.view,
                    extent: self.extent,
                    index,
                };
                self.state = SwapState::Acquired(index);
                Ok(AcquireOutcome::Target(target))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on acquire");
                self.state = SwapState::Stale;
                Ok(AcquireOutcome::NeedsRecreation)
            }
            Err(e) => Err(RhiError::SwapchainError(format!("Acquire failed: {:?}", e))),
        }
    }

    /// Presents the held image, waiting on its render-done signal.
    ///
    /// With nothing held this is a successful no-op. The held marker is
    /// cleared whatever the driver reports.
    pub fn present(&mut self, queue: vk::Queue) -> RhiResult<PresentOutcome> {
        let SwapState::Acquired(index) = self.state else {
            return Ok(PresentOutcome::Presented);
        };
        self.state = SwapState::Ready;

        let wait = self.images[index as usize].render_done;
        match self.surface.queue_present(queue, index, wait) {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("Presented to a suboptimal swapchain");
                }
                Ok(PresentOutcome::Presented)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on present");
                self.state = SwapState::Stale;
                Ok(PresentOutcome::NeedsRecreation)
            }
            Err(e) => Err(RhiError::SwapchainError(format!("Present failed: {:?}", e))),
        }
    }

    /// Barrier template naming the held image's color subresource, with the
    /// same queue family on both sides. Callers fill in stages, access masks
    /// and layouts.
    ///
    /// # Panics
    ///
    /// Panics if no image is held.
    pub fn base_barrier(&self) -> vk::ImageMemoryBarrier2<'static> {
        let index = self.held_index();
        let queue_family = self.surface.queue_family();
        vk::ImageMemoryBarrier2::default()
            .image(self.images[index].image)
            .subresource_range(color_subresource_range())
            .src_queue_family_index(queue_family)
            .dst_queue_family_index(queue_family)
    }

    /// Semaphore the frame's submission must signal for the held image.
    ///
    /// # Panics
    ///
    /// Panics if no image is held.
    pub fn render_done_signal(&self) -> vk::Semaphore {
        self.images[self.held_index()].render_done
    }

    /// Current extent as a signed size, matching window drawable sizes.
    pub fn size(&self) -> IVec2 {
        IVec2::new(self.extent.width as i32, self.extent.height as i32)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn state(&self) -> SwapState {
        self.state
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn held_index(&self) -> usize {
        match self.state {
            SwapState::Acquired(index) => index as usize,
            state => panic!("no swap image is held (state: {:?})", state),
        }
    }

    fn fail(&mut self, error: RhiError) -> RecreateOutcome {
        warn!("Swapchain recreation failed: {}", error);
        if self.state != SwapState::Uninitialized {
            self.state = SwapState::Stale;
        }
        RecreateOutcome::Failed(error)
    }
}

/// [`PresentSurface`] backed by `VK_KHR_swapchain`.
///
/// Owns the swapchain, one image view and one render-done semaphore per
/// image. The `vk::SurfaceKHR` itself belongs to the window layer and must
/// outlive this value.
pub struct VulkanSurface {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    views: Vec<vk::ImageView>,
    render_done: Vec<Semaphore>,
}

impl VulkanSurface {
    pub fn new(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        Self {
            device,
            surface,
            surface_loader,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            views: Vec::new(),
            render_done: Vec::new(),
        }
    }

    /// Returns the swapchain handle (null before the first rebuild).
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Destroys views and render-done semaphores.
    fn release_views(&mut self) {
        for &view in &self.views {
            // SAFETY: views were created from this device; the device is idle.
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
        self.views.clear();
        self.render_done.clear();
    }

    /// Destroys views, semaphores and the swapchain.
    fn release(&mut self) {
        self.release_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            // SAFETY: no image of this swapchain is in use once the device is idle.
            unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl WaitIdle for VulkanSurface {
    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl PresentSurface for VulkanSurface {
    fn queue_family(&self) -> u32 {
        self.device.queue_family()
    }

    fn query_support(&self) -> RhiResult<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )
    }

    fn rebuild(&mut self, desc: &ChainDesc) -> RhiResult<Vec<SwapImage>> {
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        // SAFETY: the surface outlives this backend and the old swapchain is
        // either null or owned by us.
        let created = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| RhiError::SwapchainError(format!("Failed to create swapchain: {:?}", e)));

        self.release_views();
        let loader = &self.swapchain_loader;
        // SAFETY: the device is idle and the old swapchain was retired by the
        // create call above.
        let swapchain = install_chain(&mut self.swapchain, created, |old| unsafe {
            loader.destroy_swapchain(old, None)
        })?;

        // SAFETY: `swapchain` was just created from this loader.
        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };

        for (i, &image) in images.iter().enumerate() {
            let view = create_image_view(&self.device, image, desc.format.format).map_err(|e| {
                RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
            })?;
            self.views.push(view);
            self.render_done.push(Semaphore::new(self.device.clone())?);
        }

        debug!("Created {} swap images with views", images.len());

        Ok(images
            .iter()
            .zip(&self.views)
            .zip(&self.render_done)
            .map(|((&image, &view), semaphore)| SwapImage {
                image,
                view,
                render_done: semaphore.handle(),
            })
            .collect())
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        // SAFETY: the swapchain is live and `signal` is an unsignaled binary
        // semaphore with no pending wait.
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        }
    }

    fn queue_present(
        &mut self,
        queue: vk::Queue,
        index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [index];
        let wait_semaphores = [wait];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: `index` was acquired from this swapchain and `wait` is
        // signaled by the submission that rendered it.
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        let count = self.views.len();
        self.release();
        info!("Swapchain destroyed ({} images)", count);
    }
}

/// Stores the result of a create call that was handed `slot` as its old
/// swapchain.
///
/// The old handle is retired by that call even when it fails, so it is
/// destroyed here either way. After a failure `slot` is null and the next
/// attempt starts from scratch.
fn install_chain<E>(
    slot: &mut vk::SwapchainKHR,
    created: Result<vk::SwapchainKHR, E>,
    destroy: impl FnOnce(vk::SwapchainKHR),
) -> Result<vk::SwapchainKHR, E> {
    let old = std::mem::replace(slot, vk::SwapchainKHR::null());
    if old != vk::SwapchainKHR::null() {
        destroy(old);
    }
    *slot = created?;
    Ok(*slot)
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Chooses the surface format.
///
/// Prefers R8G8B8A8_SRGB, then B8G8R8A8_SRGB, both with SRGB_NONLINEAR.
/// Falls back to the first available format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const PREFERRED: [vk::Format; 2] = [vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB];

    // A lone UNDEFINED entry means the surface takes any format
    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        return vk::SurfaceFormatKHR {
            format: PREFERRED[0],
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
    }

    for wanted in PREFERRED {
        if let Some(&format) = formats
            .iter()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        {
            return format;
        }
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// FIFO (vsync, always available) unless MAILBOX is requested and supported.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// A defined current extent wins. Otherwise (width is u32::MAX) the
/// requested size is clamped to the surface's min/max extents.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// At least `minimum` images and at least the surface minimum, capped by the
/// surface maximum when it has one (0 means unbounded).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, minimum: u32) -> u32 {
    let preferred = minimum.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&mode| supported.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, vk::Result> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(color_subresource_range());

    // SAFETY: `image` belongs to a live swapchain created from this device.
    unsafe { device.handle().create_image_view(&create_info, None) }
}
