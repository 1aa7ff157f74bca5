//! Vulkan surface and swap chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::common::{ObjectTag, PresentMode};
use crate::device::{
    BackBufferRing, Fence, RenderObject, Semaphore, SwapChain, SwapChainDescriptor, Texture,
    TextureView,
};
use crate::error::{GfxError, GfxResult};
use crate::format::TextureFormat;

use super::queue::{VulkanFence, VulkanQueue, VulkanSemaphore};
use super::texture::{wrap_swap_chain_image, VulkanTexture, VulkanTextureView};
use super::{convert, vk_err, DeviceShared};

fn create_surface(
    shared: &DeviceShared,
    window: RawWindowHandle,
    display: RawDisplayHandle,
) -> GfxResult<vk::SurfaceKHR> {
    let entry = &shared.instance.entry;
    let instance = &shared.instance.raw;
    match (window, display) {
        #[cfg(target_os = "windows")]
        (RawWindowHandle::Win32(window), _) => {
            let create_info = vk::Win32SurfaceCreateInfoKHR::default()
                .hwnd(window.hwnd.get())
                .hinstance(window.hinstance.map(|h| h.get()).unwrap_or(0));
            let loader = ash::khr::win32_surface::Instance::new(entry, instance);
            unsafe {
                loader
                    .create_win32_surface(&create_info, None)
                    .map_err(|e| vk_err(e, "vkCreateWin32SurfaceKHR"))
            }
        }
        #[cfg(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd"
        ))]
        (RawWindowHandle::Xlib(window), RawDisplayHandle::Xlib(display)) => {
            let create_info = vk::XlibSurfaceCreateInfoKHR::default()
                .window(window.window)
                .dpy(
                    display
                        .display
                        .map(|d| d.as_ptr())
                        .unwrap_or(std::ptr::null_mut()) as *mut _,
                );
            let loader = ash::khr::xlib_surface::Instance::new(entry, instance);
            unsafe {
                loader
                    .create_xlib_surface(&create_info, None)
                    .map_err(|e| vk_err(e, "vkCreateXlibSurfaceKHR"))
            }
        }
        #[cfg(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd"
        ))]
        (RawWindowHandle::Wayland(window), RawDisplayHandle::Wayland(display)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::default()
                .surface(window.surface.as_ptr() as *mut _)
                .display(display.display.as_ptr() as *mut _);
            let loader = ash::khr::wayland_surface::Instance::new(entry, instance);
            unsafe {
                loader
                    .create_wayland_surface(&create_info, None)
                    .map_err(|e| vk_err(e, "vkCreateWaylandSurfaceKHR"))
            }
        }
        _ => Err(GfxError::not_supported(
            "window handle kind is not supported on this platform",
        )),
    }
}

fn map_present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
    }
}

pub(crate) fn create_swap_chain(
    shared: &Arc<DeviceShared>,
    desc: &SwapChainDescriptor<'_>,
) -> GfxResult<Box<dyn SwapChain>> {
    if desc.back_buffer_count < 2 {
        return Err(GfxError::invalid_argument(
            "a swap chain needs at least two back buffers",
        ));
    }
    let queue = desc
        .present_queue
        .as_any()
        .downcast_ref::<VulkanQueue>()
        .ok_or_else(|| GfxError::invalid_argument("present queue is not a vulkan queue"))?;
    let surface = create_surface(shared, desc.window, desc.display)?;
    let surface_loader =
        ash::khr::surface::Instance::new(&shared.instance.entry, &shared.instance.raw);
    let destroy_surface = |surface| unsafe {
        surface_loader.destroy_surface(surface, None);
    };

    let supported = unsafe {
        surface_loader
            .get_physical_device_surface_support(
                shared.physical_device,
                queue.family_index(),
                surface,
            )
            .unwrap_or(false)
    };
    if !supported {
        destroy_surface(surface);
        return Err(GfxError::not_supported(
            "present queue family cannot present to this surface",
        ));
    }

    let capabilities = unsafe {
        surface_loader
            .get_physical_device_surface_capabilities(shared.physical_device, surface)
            .map_err(|e| {
                destroy_surface(surface);
                vk_err(e, "vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
            })?
    };
    let formats = unsafe {
        surface_loader
            .get_physical_device_surface_formats(shared.physical_device, surface)
            .map_err(|e| {
                destroy_surface(surface);
                vk_err(e, "vkGetPhysicalDeviceSurfaceFormatsKHR")
            })?
    };
    let wanted = convert::map_format(desc.format);
    let Some(surface_format) = formats.iter().find(|f| f.format == wanted).copied() else {
        destroy_surface(surface);
        return Err(GfxError::not_supported(format!(
            "surface does not support {:?}",
            desc.format
        )));
    };

    let present_modes = unsafe {
        surface_loader
            .get_physical_device_surface_present_modes(shared.physical_device, surface)
            .unwrap_or_default()
    };
    let wanted_mode = map_present_mode(desc.present_mode);
    let present_mode = if present_modes.contains(&wanted_mode) {
        wanted_mode
    } else {
        // FIFO is the only mode every driver must support.
        vk::PresentModeKHR::FIFO
    };

    let mut extent = capabilities.current_extent;
    if extent.width == u32::MAX {
        extent = vk::Extent2D {
            width: desc.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desc.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        };
    }
    let mut image_count = desc.back_buffer_count.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        image_count = image_count.min(capabilities.max_image_count);
    }

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);
    let loader = ash::khr::swapchain::Device::new(&shared.instance.raw, &shared.raw);
    let swapchain = unsafe {
        loader.create_swapchain(&create_info, None).map_err(|e| {
            destroy_surface(surface);
            vk_err(e, "vkCreateSwapchainKHR")
        })?
    };
    let images = unsafe {
        loader.get_swapchain_images(swapchain).map_err(|e| {
            loader.destroy_swapchain(swapchain, None);
            destroy_surface(surface);
            vk_err(e, "vkGetSwapchainImagesKHR")
        })?
    };

    let mut textures = Vec::with_capacity(images.len());
    let mut views = Vec::with_capacity(images.len());
    for image in &images {
        let texture = wrap_swap_chain_image(shared, *image, desc.format, (extent.width, extent.height));
        let view_info = vk::ImageViewCreateInfo::default()
            .image(*image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(surface_format.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let raw_view = unsafe {
            shared.raw.create_image_view(&view_info, None).map_err(|e| {
                loader.destroy_swapchain(swapchain, None);
                destroy_surface(surface);
                shared.backend_err(e, "vkCreateImageView")
            })?
        };
        views.push(VulkanTextureView::for_swap_chain(
            shared,
            raw_view,
            *image,
            texture.id(),
            desc.format,
            (extent.width, extent.height),
        ));
        textures.push(texture);
    }
    log::debug!(
        "swap chain of {} {}x{} back buffers ({:?})",
        textures.len(),
        extent.width,
        extent.height,
        present_mode
    );
    let count = textures.len() as u32;
    Ok(Box::new(VulkanSwapChain {
        shared: shared.clone(),
        surface,
        surface_loader,
        loader,
        swapchain,
        textures,
        views,
        ring: BackBufferRing::new(count),
        format: desc.format,
        extent: (extent.width, extent.height),
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanSwapChain {
    shared: Arc<DeviceShared>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    textures: Vec<VulkanTexture>,
    views: Vec<VulkanTextureView>,
    ring: BackBufferRing,
    format: TextureFormat,
    extent: (u32, u32),
    valid: AtomicBool,
}

impl VulkanSwapChain {
    /// Queue-side present; called by [`VulkanQueue::present`] under its
    /// submit lock.
    pub(crate) fn present(
        &mut self,
        queue: vk::Queue,
        wait_semaphores: &[vk::Semaphore],
    ) -> GfxResult<()> {
        let index = self.ring.present()?;
        let indices = [index];
        let swapchains = [self.swapchain];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(_suboptimal) => Ok(()),
            Err(e) => Err(self.shared.backend_err(e, "vkQueuePresentKHR")),
        }
    }
}

impl Drop for VulkanSwapChain {
    fn drop(&mut self) {
        unsafe {
            let _ = self.shared.raw.device_wait_idle();
            self.views.clear();
            self.textures.clear();
            self.loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl std::fmt::Debug for VulkanSwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapChain")
            .field("extent", &self.extent)
            .field("back_buffers", &self.textures.len())
            .finish()
    }
}

impl RenderObject for VulkanSwapChain {
    fn tag(&self) -> ObjectTag {
        ObjectTag::SwapChain
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl SwapChain for VulkanSwapChain {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn back_buffer_count(&self) -> u32 {
        self.textures.len() as u32
    }

    fn acquire_next(
        &mut self,
        signal_semaphore: Option<&dyn Semaphore>,
        wait_fence: Option<&dyn Fence>,
    ) -> GfxResult<u32> {
        let semaphore = signal_semaphore
            .and_then(|s| s.as_any().downcast_ref::<VulkanSemaphore>())
            .map(|s| s.raw)
            .unwrap_or(vk::Semaphore::null());
        let fence = match wait_fence {
            Some(fence) => {
                let vk_fence = fence
                    .as_any()
                    .downcast_ref::<VulkanFence>()
                    .ok_or_else(|| GfxError::invalid_argument("fence is not a vulkan object"))?;
                unsafe {
                    self.shared
                        .raw
                        .reset_fences(&[vk_fence.raw])
                        .map_err(|e| self.shared.backend_err(e, "vkResetFences"))?;
                }
                vk_fence.submitted.store(true, Ordering::Release);
                vk_fence.raw
            }
            None => vk::Fence::null(),
        };
        let (index, _suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, fence)
                .map_err(|e| self.shared.backend_err(e, "vkAcquireNextImageKHR"))?
        };
        self.ring.acquire(index)?;
        Ok(index)
    }

    fn back_buffer(&self, index: u32) -> &dyn Texture {
        &self.textures[index as usize]
    }

    fn back_buffer_view(&self, index: u32) -> &dyn TextureView {
        &self.views[index as usize]
    }

    fn current_index(&self) -> Option<u32> {
        self.ring.current()
    }

    fn current_back_buffer(&self) -> Option<&dyn Texture> {
        self.ring
            .current()
            .map(|index| &self.textures[index as usize] as &dyn Texture)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
