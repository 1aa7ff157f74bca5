//! Vulkan backend.
//!
//! Implements the RHI traits over `ash`. The instance is a process-wide
//! singleton (see [`global_init`]); each [`VulkanDevice`] owns its
//! `VkDevice`, queues, device-memory allocator and render-pass/framebuffer
//! caches. Backend objects hold an `Arc` of the shared device state, so
//! teardown order is driven by handle drops.

mod barrier;
mod buffer;
mod command;
mod convert;
mod descriptor;
mod memory;
mod pipeline;
mod queue;
mod root_signature;
mod sampler;
mod shader;
mod texture;

#[cfg(feature = "window")]
mod swapchain;

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk;
use smallvec::SmallVec;

use crate::common::{
    Backend, DeviceDetail, LoadAction, ObjectTag, QueueType, SamplerDescriptor, StoreAction,
    VulkanBackendInitDescriptor, VulkanDeviceDescriptor, MAX_QUEUES_PER_TYPE,
};
use crate::device::{
    Buffer, BufferView, CommandBuffer, CommandQueue, ComputePipelineState, DescriptorSet, Device,
    Fence, GraphicsPipelineState, RenderObject, RootSignature, Sampler, Semaphore, Shader,
    ShaderDescriptor, Texture, TextureView,
};
use crate::error::{GfxError, GfxResult};
use crate::pipeline::{ComputePipelineDescriptor, GraphicsPipelineDescriptor};
use crate::resource::{BufferDescriptor, BufferViewDescriptor, TextureDescriptor, TextureViewDescriptor};
use crate::root_signature::RootSignatureDescriptor;

pub use buffer::{VulkanBuffer, VulkanBufferView};
pub use command::VulkanCommandBuffer;
pub use descriptor::VulkanDescriptorSet;
pub use pipeline::{VulkanComputePipeline, VulkanGraphicsPipeline};
pub use queue::{VulkanFence, VulkanQueue, VulkanSemaphore};
pub use root_signature::VulkanRootSignature;
pub use sampler::VulkanSampler;
pub use shader::VulkanShader;
pub use texture::{VulkanTexture, VulkanTextureView};

#[cfg(feature = "window")]
pub use swapchain::VulkanSwapChain;

/// Translates a native result into a [`GfxError`].
pub(crate) fn vk_err(result: vk::Result, what: &str) -> GfxError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GfxError::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL => {
            GfxError::exhausted(format!("{what}: {result:?}"))
        }
        vk::Result::ERROR_FORMAT_NOT_SUPPORTED
        | vk::Result::ERROR_FEATURE_NOT_PRESENT
        | vk::Result::ERROR_EXTENSION_NOT_PRESENT
        | vk::Result::ERROR_LAYER_NOT_PRESENT => {
            GfxError::not_supported(format!("{what}: {result:?}"))
        }
        other => GfxError::backend(i64::from(other.as_raw()), what.to_string()),
    }
}

/// Process-wide instance state. Kept alive by every device created from it.
pub(crate) struct InstanceShared {
    #[cfg_attr(not(feature = "window"), allow(dead_code))]
    pub entry: ash::Entry,
    pub raw: ash::Instance,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            self.raw.destroy_instance(None);
        }
    }
}

static GLOBAL_INSTANCE: Mutex<Option<Arc<InstanceShared>>> = Mutex::new(None);

/// Returns validation layer names to enable if validation is requested
/// (feature, descriptor, or VELA_VALIDATION=1 env var).
fn validation_layer_names(entry: &ash::Entry, requested: bool) -> Vec<&'static CStr> {
    let env_enable = std::env::var("VELA_VALIDATION")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let enable = requested || env_enable || cfg!(feature = "validation");
    if !enable {
        return Vec::new();
    }
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return Vec::new(),
    };
    const KHRONOS: &CStr = c"VK_LAYER_KHRONOS_validation";
    for prop in &layers {
        let name = unsafe { CStr::from_ptr(prop.layer_name.as_ptr()) };
        if name == KHRONOS {
            return vec![KHRONOS];
        }
    }
    log::warn!("vulkan validation requested but VK_LAYER_KHRONOS_validation is not installed");
    Vec::new()
}

fn instance_extensions() -> Vec<&'static CStr> {
    let mut extensions: Vec<&'static CStr> = Vec::new();
    if cfg!(feature = "window") {
        extensions.push(ash::khr::surface::NAME);
        #[cfg(target_os = "windows")]
        extensions.push(ash::khr::win32_surface::NAME);
        #[cfg(any(
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd"
        ))]
        {
            extensions.push(ash::khr::xlib_surface::NAME);
            extensions.push(ash::khr::wayland_surface::NAME);
        }
        #[cfg(target_os = "macos")]
        extensions.push(ash::ext::metal_surface::NAME);
    }
    extensions
}

fn create_instance(desc: &VulkanBackendInitDescriptor) -> GfxResult<Arc<InstanceShared>> {
    let entry = unsafe {
        ash::Entry::load().map_err(|e| GfxError::not_supported(format!("vulkan loader: {e}")))?
    };
    let app_name = c"vela";
    let app_info = vk::ApplicationInfo::default()
        .api_version(vk::API_VERSION_1_1)
        .application_name(app_name)
        .engine_name(app_name);
    let layers = validation_layer_names(&entry, desc.enable_debug_layer);
    let layer_ptrs: Vec<*const i8> = layers.iter().map(|c| c.as_ptr()).collect();
    let extension_ptrs: Vec<*const i8> = instance_extensions().iter().map(|c| c.as_ptr()).collect();
    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&extension_ptrs);
    let raw = unsafe {
        entry
            .create_instance(&create_info, None)
            .map_err(|e| vk_err(e, "vkCreateInstance"))?
    };
    log::debug!(
        "vulkan instance created ({} layers, {} extensions)",
        layer_ptrs.len(),
        extension_ptrs.len()
    );
    Ok(Arc::new(InstanceShared { entry, raw }))
}

/// Creates the process-wide instance. Idempotent.
pub fn global_init(desc: &VulkanBackendInitDescriptor) -> GfxResult<()> {
    let mut guard = GLOBAL_INSTANCE.lock().unwrap();
    if guard.is_none() {
        *guard = Some(create_instance(desc)?);
    }
    Ok(())
}

/// Releases the process-wide instance reference. The instance itself goes
/// away once the last device holding it drops.
pub fn global_terminate() {
    GLOBAL_INSTANCE.lock().unwrap().take();
}

fn acquire_instance() -> GfxResult<Arc<InstanceShared>> {
    let mut guard = GLOBAL_INSTANCE.lock().unwrap();
    if let Some(instance) = guard.as_ref() {
        return Ok(instance.clone());
    }
    let instance = create_instance(&VulkanBackendInitDescriptor::default())?;
    *guard = Some(instance.clone());
    Ok(instance)
}

/// Render-pass compatibility + load/store identity.
#[derive(Hash, PartialEq, Eq, Clone)]
pub(crate) struct RenderPassKey {
    pub colors: SmallVec<[(vk::Format, LoadAction, StoreAction); 4]>,
    pub depth: Option<(vk::Format, LoadAction, StoreAction, LoadAction, StoreAction)>,
}

#[derive(Hash, PartialEq, Eq, Clone)]
pub(crate) struct FramebufferKey {
    pub render_pass: u64,
    pub attachments: SmallVec<[u64; 5]>,
    pub width: u32,
    pub height: u32,
}

/// Device state shared by every object the device creates.
pub(crate) struct DeviceShared {
    pub instance: Arc<InstanceShared>,
    pub physical_device: vk::PhysicalDevice,
    pub raw: ash::Device,
    pub memory: Mutex<memory::DeviceMemoryAllocator>,
    pub next_id: AtomicU64,
    pub lost: AtomicBool,
    pub render_pass_cache: Mutex<HashMap<RenderPassKey, vk::RenderPass>>,
    pub framebuffer_cache: Mutex<HashMap<FramebufferKey, vk::Framebuffer>>,
    /// Interned sampler handles, destroyed with the device.
    pub sampler_cache: Mutex<Vec<(SamplerDescriptor, vk::Sampler)>>,
}

impl DeviceShared {
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Fails fast once the backend signalled a device loss.
    pub fn check_alive(&self) -> GfxResult<()> {
        if self.lost.load(Ordering::Acquire) {
            return Err(GfxError::DeviceLost);
        }
        Ok(())
    }

    /// Wraps a native failure, latching device-lost.
    pub fn backend_err(&self, result: vk::Result, what: &str) -> GfxError {
        if result == vk::Result::ERROR_DEVICE_LOST {
            self.lost.store(true, Ordering::Release);
        }
        vk_err(result, what)
    }

    pub fn get_or_create_render_pass(&self, key: &RenderPassKey) -> GfxResult<vk::RenderPass> {
        if let Some(pass) = self.render_pass_cache.lock().unwrap().get(key) {
            return Ok(*pass);
        }
        let mut attachments = Vec::new();
        let mut color_refs = Vec::new();
        for (format, load, store) in &key.colors {
            let initial_layout = if *load == LoadAction::Load {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::UNDEFINED
            };
            color_refs.push(
                vk::AttachmentReference::default()
                    .attachment(attachments.len() as u32)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(*format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(convert::map_load_op(*load))
                    .store_op(convert::map_store_op(*store))
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(initial_layout)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            );
        }
        let mut depth_ref = None;
        if let Some((format, depth_load, depth_store, stencil_load, stencil_store)) = key.depth {
            let initial_layout =
                if depth_load == LoadAction::Load || stencil_load == LoadAction::Load {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::UNDEFINED
                };
            depth_ref = Some(
                vk::AttachmentReference::default()
                    .attachment(attachments.len() as u32)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(convert::map_load_op(depth_load))
                    .store_op(convert::map_store_op(depth_store))
                    .stencil_load_op(convert::map_load_op(stencil_load))
                    .stencil_store_op(convert::map_store_op(stencil_store))
                    .initial_layout(initial_layout)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        }
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(ref depth) = depth_ref {
            subpass = subpass.depth_stencil_attachment(depth);
        }
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass));
        let pass = unsafe {
            self.raw
                .create_render_pass(&create_info, None)
                .map_err(|e| self.backend_err(e, "vkCreateRenderPass"))?
        };
        self.render_pass_cache
            .lock()
            .unwrap()
            .insert(key.clone(), pass);
        Ok(pass)
    }

    pub fn get_or_create_framebuffer(
        &self,
        key: &FramebufferKey,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
    ) -> GfxResult<vk::Framebuffer> {
        if let Some(framebuffer) = self.framebuffer_cache.lock().unwrap().get(key) {
            return Ok(*framebuffer);
        }
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(views)
            .width(key.width)
            .height(key.height)
            .layers(1);
        let framebuffer = unsafe {
            self.raw
                .create_framebuffer(&create_info, None)
                .map_err(|e| self.backend_err(e, "vkCreateFramebuffer"))?
        };
        self.framebuffer_cache
            .lock()
            .unwrap()
            .insert(key.clone(), framebuffer);
        Ok(framebuffer)
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            let _ = self.raw.device_wait_idle();
            for (_, framebuffer) in self.framebuffer_cache.lock().unwrap().drain() {
                self.raw.destroy_framebuffer(framebuffer, None);
            }
            for (_, pass) in self.render_pass_cache.lock().unwrap().drain() {
                self.raw.destroy_render_pass(pass, None);
            }
            for (_, raw) in self.sampler_cache.lock().unwrap().drain(..) {
                self.raw.destroy_sampler(raw, None);
            }
            self.memory.lock().unwrap().release_all();
            self.raw.destroy_device(None);
        }
    }
}

/// A Vulkan device plus its queue set.
pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
    queues: [Vec<Arc<queue::VulkanQueue>>; QueueType::COUNT],
    detail: DeviceDetail,
    valid: AtomicBool,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("adapter", &self.detail.name)
            .finish_non_exhaustive()
    }
}

fn score_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        _ => 1,
    }
}

/// Enumerates physical devices and builds a [`VulkanDevice`] per the
/// descriptor's adapter index and queue requests.
pub fn create_device(desc: &VulkanDeviceDescriptor) -> GfxResult<Arc<VulkanDevice>> {
    let instance = acquire_instance()?;
    let physical_devices = unsafe {
        instance
            .raw
            .enumerate_physical_devices()
            .map_err(|e| vk_err(e, "vkEnumeratePhysicalDevices").trace("create_device"))?
    };
    if physical_devices.is_empty() {
        return Err(GfxError::not_supported("no vulkan physical device").trace("create_device"));
    }
    let physical_device = match desc.physical_device_index {
        Some(index) => *physical_devices.get(index as usize).ok_or_else(|| {
            GfxError::invalid_argument(format!(
                "physical device index {index} out of {} devices",
                physical_devices.len()
            ))
            .trace("create_device")
        })?,
        None => physical_devices
            .iter()
            .copied()
            .max_by_key(|pd| {
                let props = unsafe { instance.raw.get_physical_device_properties(*pd) };
                score_device(&props)
            })
            .unwrap(),
    };
    let properties = unsafe { instance.raw.get_physical_device_properties(physical_device) };
    if properties.api_version < vk::API_VERSION_1_1 {
        return Err(
            GfxError::not_supported("adapter does not support Vulkan 1.1").trace("create_device")
        );
    }
    let family_props = unsafe {
        instance
            .raw
            .get_physical_device_queue_family_properties(physical_device)
    };

    let direct_family = family_props
        .iter()
        .position(|p| {
            p.queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .ok_or_else(|| {
            GfxError::not_supported("no graphics+compute queue family").trace("create_device")
        })? as u32;
    // Prefer dedicated families for async compute and copies.
    let compute_family = family_props
        .iter()
        .position(|p| {
            p.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && !p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map_or(direct_family, |f| f as u32);
    let copy_family = family_props
        .iter()
        .position(|p| {
            p.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && !p.queue_flags.contains(vk::QueueFlags::COMPUTE)
        })
        .map_or(direct_family, |f| f as u32);
    let family_of = [direct_family, compute_family, copy_family];

    let mut requests = desc.queues.clone();
    if requests.is_empty() {
        requests.push(crate::common::QueueRequest {
            queue_type: QueueType::Direct,
            count: 1,
        });
    }
    let mut family_counts: HashMap<u32, u32> = HashMap::new();
    // (queue type, family, index within family)
    let mut plan: Vec<(QueueType, u32, u32)> = Vec::new();
    for request in &requests {
        let family = family_of[request.queue_type.index()];
        let capacity = family_props[family as usize].queue_count;
        let count = request.count.min(MAX_QUEUES_PER_TYPE as u32);
        for _ in 0..count {
            let used = family_counts.entry(family).or_insert(0);
            if *used >= capacity {
                log::warn!(
                    "queue family {family} exhausted; {:?} queue request truncated",
                    request.queue_type
                );
                break;
            }
            plan.push((request.queue_type, family, *used));
            *used += 1;
        }
    }
    if plan.is_empty() {
        return Err(GfxError::invalid_argument("no queues requested").trace("create_device"));
    }

    let family_list: Vec<(u32, u32)> = family_counts
        .iter()
        .map(|(&family, &count)| (family, count))
        .collect();
    let priority_storage: Vec<Vec<f32>> = family_list
        .iter()
        .map(|(_, count)| vec![1.0f32; *count as usize])
        .collect();
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = family_list
        .iter()
        .zip(&priority_storage)
        .map(|((family, _), priorities)| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(*family)
                .queue_priorities(priorities)
        })
        .collect();

    let extension_ptrs: Vec<*const i8> = if cfg!(feature = "window") {
        vec![ash::khr::swapchain::NAME.as_ptr()]
    } else {
        Vec::new()
    };

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_ptrs);
    let raw = unsafe {
        instance
            .raw
            .create_device(physical_device, &device_create_info, None)
            .map_err(|e| vk_err(e, "vkCreateDevice").trace("create_device"))?
    };

    let memory_props = unsafe {
        instance
            .raw
            .get_physical_device_memory_properties(physical_device)
    };
    let shared = Arc::new(DeviceShared {
        instance: instance.clone(),
        physical_device,
        memory: Mutex::new(memory::DeviceMemoryAllocator::new(raw.clone(), memory_props)),
        raw,
        next_id: AtomicU64::new(1),
        lost: AtomicBool::new(false),
        render_pass_cache: Mutex::new(HashMap::new()),
        framebuffer_cache: Mutex::new(HashMap::new()),
        sampler_cache: Mutex::new(Vec::new()),
    });

    let mut queues: [Vec<Arc<queue::VulkanQueue>>; QueueType::COUNT] =
        [Vec::new(), Vec::new(), Vec::new()];
    for (queue_type, family, index) in plan {
        let raw_queue = unsafe { shared.raw.get_device_queue(family, index) };
        queues[queue_type.index()].push(Arc::new(queue::VulkanQueue::new(
            shared.clone(),
            queue_type,
            family,
            raw_queue,
        )));
    }

    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let vram_bytes = memory_props
        .memory_heaps
        .iter()
        .take(memory_props.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum();
    let detail = DeviceDetail {
        name,
        vram_bytes,
        is_uma: properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU,
    };
    log::info!(
        "vulkan device '{}' ({} MiB vram, uma={})",
        detail.name,
        detail.vram_bytes / (1024 * 1024),
        detail.is_uma
    );

    Ok(Arc::new(VulkanDevice {
        shared,
        queues,
        detail,
        valid: AtomicBool::new(true),
    }))
}

impl RenderObject for VulkanDevice {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Device
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire) && !self.shared.lost.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Device for VulkanDevice {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }

    fn detail(&self) -> &DeviceDetail {
        &self.detail
    }

    fn queue(&self, queue_type: QueueType, slot: u32) -> Option<Arc<dyn CommandQueue>> {
        self.queues[queue_type.index()]
            .get(slot as usize)
            .map(|q| q.clone() as Arc<dyn CommandQueue>)
    }

    fn create_command_buffer(&self, queue: &dyn CommandQueue) -> GfxResult<Box<dyn CommandBuffer>> {
        self.shared.check_alive()?;
        let queue = queue
            .as_any()
            .downcast_ref::<queue::VulkanQueue>()
            .ok_or_else(|| GfxError::invalid_argument("queue is not a vulkan queue"))?;
        command::create_command_buffer(&self.shared, queue.family_index())
            .map_err(|e| e.trace("create_command_buffer"))
    }

    fn create_fence(&self) -> GfxResult<Box<dyn Fence>> {
        self.shared.check_alive()?;
        queue::create_fence(&self.shared).map_err(|e| e.trace("create_fence"))
    }

    fn create_semaphore(&self) -> GfxResult<Box<dyn Semaphore>> {
        self.shared.check_alive()?;
        queue::create_semaphore(&self.shared).map_err(|e| e.trace("create_semaphore"))
    }

    fn wait_fences(&self, fences: &[&dyn Fence]) -> GfxResult<()> {
        queue::wait_fences(&self.shared, fences)
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> GfxResult<Box<dyn Buffer>> {
        self.shared.check_alive()?;
        buffer::create_buffer(&self.shared, desc).map_err(|e| e.trace("create_buffer"))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> GfxResult<Box<dyn Texture>> {
        self.shared.check_alive()?;
        texture::create_texture(&self.shared, desc).map_err(|e| e.trace("create_texture"))
    }

    fn create_buffer_view(
        &self,
        buffer: &dyn Buffer,
        desc: &BufferViewDescriptor,
    ) -> GfxResult<Arc<dyn BufferView>> {
        buffer::create_buffer_view(&self.shared, buffer, desc)
            .map_err(|e| e.trace("create_buffer_view"))
    }

    fn create_texture_view(
        &self,
        texture: &dyn Texture,
        desc: &TextureViewDescriptor,
    ) -> GfxResult<Arc<dyn TextureView>> {
        texture::create_texture_view(&self.shared, texture, desc)
            .map_err(|e| e.trace("create_texture_view"))
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GfxResult<Arc<dyn Sampler>> {
        self.shared.check_alive()?;
        sampler::create_sampler(&self.shared, desc).map_err(|e| e.trace("create_sampler"))
    }

    fn create_shader(&self, desc: &ShaderDescriptor<'_>) -> GfxResult<Box<dyn Shader>> {
        self.shared.check_alive()?;
        shader::create_shader(&self.shared, desc).map_err(|e| e.trace("create_shader"))
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDescriptor,
    ) -> GfxResult<Box<dyn RootSignature>> {
        self.shared.check_alive()?;
        root_signature::create_root_signature(&self.shared, desc)
            .map_err(|e| e.trace("create_root_signature"))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor<'_>,
    ) -> GfxResult<Box<dyn GraphicsPipelineState>> {
        self.shared.check_alive()?;
        pipeline::create_graphics_pipeline(&self.shared, desc)
            .map_err(|e| e.trace("create_graphics_pipeline"))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor<'_>,
    ) -> GfxResult<Box<dyn ComputePipelineState>> {
        self.shared.check_alive()?;
        pipeline::create_compute_pipeline(&self.shared, desc)
            .map_err(|e| e.trace("create_compute_pipeline"))
    }

    fn create_descriptor_set(
        &self,
        root_signature: &dyn RootSignature,
        set_index: u32,
    ) -> GfxResult<Box<dyn DescriptorSet>> {
        self.shared.check_alive()?;
        descriptor::create_descriptor_set(&self.shared, root_signature, set_index)
            .map_err(|e| e.trace("create_descriptor_set"))
    }

    #[cfg(feature = "window")]
    fn create_swap_chain(
        &self,
        desc: &crate::device::SwapChainDescriptor<'_>,
    ) -> GfxResult<Box<dyn crate::device::SwapChain>> {
        self.shared.check_alive()?;
        swapchain::create_swap_chain(&self.shared, desc).map_err(|e| e.trace("create_swap_chain"))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
