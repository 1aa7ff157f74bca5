//! Vulkan textures and texture views.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::common::{ClearValue, ObjectTag, TextureUses};
use crate::device::{RenderObject, ResourceId, ResourceView, Texture, TextureView};
use crate::error::{GfxError, GfxResult};
use crate::format::TextureFormat;
use crate::resource::{
    ResourceHint, SubresourceRange, TextureDescriptor, TextureDimension, TextureViewDescriptor,
    TextureViewDimension, ViewUsage,
};

use super::memory::MemoryAllocation;
use super::{convert, DeviceShared};

pub(crate) fn map_texture_usage(usage: TextureUses) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUses::COPY_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUses::COPY_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUses::RESOURCE) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUses::RENDER_TARGET) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.intersects(TextureUses::DEPTH_READ | TextureUses::DEPTH_WRITE) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.intersects(TextureUses::STORAGE_RO | TextureUses::STORAGE_RW) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    flags
}

fn validate_clear_value(desc: &TextureDescriptor) -> GfxResult<()> {
    match desc.clear_value {
        None => Ok(()),
        Some(ClearValue::Color(_)) if !desc.format.is_depth_stencil() => Ok(()),
        Some(ClearValue::DepthStencil(_)) if desc.format.is_depth_stencil() => Ok(()),
        Some(_) => Err(GfxError::invalid_argument(format!(
            "clear value does not match format {:?}",
            desc.format
        ))),
    }
}

pub(crate) fn create_texture(
    shared: &Arc<DeviceShared>,
    desc: &TextureDescriptor,
) -> GfxResult<Box<dyn Texture>> {
    if desc.width == 0 || desc.height == 0 {
        return Err(GfxError::invalid_argument("texture extent must be non-zero"));
    }
    validate_clear_value(desc)?;
    let (image_type, extent, array_layers) = match desc.dimension {
        TextureDimension::D1 => (
            vk::ImageType::TYPE_1D,
            vk::Extent3D {
                width: desc.width,
                height: 1,
                depth: 1,
            },
            desc.array_layers.max(1),
        ),
        TextureDimension::D2 => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            },
            desc.array_layers.max(1),
        ),
        TextureDimension::D3 => (
            vk::ImageType::TYPE_3D,
            vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: desc.depth.max(1),
            },
            1,
        ),
    };
    let mut flags = vk::ImageCreateFlags::empty();
    if desc.dimension == TextureDimension::D2 && array_layers % 6 == 0 {
        flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }
    let mip_levels = desc.mip_levels.max(1);
    let create_info = vk::ImageCreateInfo::default()
        .image_type(image_type)
        .format(convert::map_format(desc.format))
        .extent(extent)
        .mip_levels(mip_levels)
        .array_layers(array_layers)
        .samples(vk::SampleCountFlags::from_raw(desc.sample_count.max(1)))
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(map_texture_usage(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .flags(flags);
    let raw = unsafe {
        shared
            .raw
            .create_image(&create_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateImage"))?
    };
    let requirements = unsafe { shared.raw.get_image_memory_requirements(raw) };
    let allocation = {
        let mut allocator = shared.memory.lock().unwrap();
        match allocator.allocate(
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            desc.hint == ResourceHint::Dedicated,
        ) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { shared.raw.destroy_image(raw, None) };
                return Err(err);
            }
        }
    };
    if let Err(e) = unsafe {
        shared
            .raw
            .bind_image_memory(raw, allocation.memory, allocation.offset)
    } {
        unsafe { shared.raw.destroy_image(raw, None) };
        shared.memory.lock().unwrap().free(allocation);
        return Err(shared.backend_err(e, "vkBindImageMemory"));
    }
    if let Some(label) = desc.label {
        log::trace!(
            "created texture '{label}' {}x{} {:?}",
            desc.width,
            desc.height,
            desc.format
        );
    }
    Ok(Box::new(VulkanTexture {
        shared: shared.clone(),
        raw,
        allocation: Some(allocation),
        format: desc.format,
        extent: (extent.width, extent.height, extent.depth),
        array_layers,
        mip_levels,
        sample_count: desc.sample_count.max(1),
        usage: desc.usage,
        id: shared.next_id(),
        swap_chain_owned: false,
        valid: AtomicBool::new(true),
    }))
}

/// Wraps a swap-chain image the chain owns; drop does not destroy it.
#[cfg(feature = "window")]
pub(crate) fn wrap_swap_chain_image(
    shared: &Arc<DeviceShared>,
    raw: vk::Image,
    format: TextureFormat,
    extent: (u32, u32),
) -> VulkanTexture {
    VulkanTexture {
        shared: shared.clone(),
        raw,
        allocation: None,
        format,
        extent: (extent.0, extent.1, 1),
        array_layers: 1,
        mip_levels: 1,
        sample_count: 1,
        usage: TextureUses::RENDER_TARGET | TextureUses::PRESENT | TextureUses::COPY_SRC,
        id: shared.next_id(),
        swap_chain_owned: true,
        valid: AtomicBool::new(true),
    }
}

pub struct VulkanTexture {
    pub(crate) shared: Arc<DeviceShared>,
    pub(crate) raw: vk::Image,
    allocation: Option<MemoryAllocation>,
    format: TextureFormat,
    extent: (u32, u32, u32),
    array_layers: u32,
    mip_levels: u32,
    sample_count: u32,
    usage: TextureUses,
    id: ResourceId,
    pub(crate) swap_chain_owned: bool,
    valid: AtomicBool,
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        if self.swap_chain_owned {
            return;
        }
        unsafe {
            self.shared.raw.destroy_image(self.raw, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.shared.memory.lock().unwrap().free(allocation);
        }
    }
}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture")
            .field("id", &self.id)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .finish()
    }
}

impl RenderObject for VulkanTexture {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Texture
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Texture for VulkanTexture {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn extent(&self) -> (u32, u32, u32) {
        self.extent
    }

    fn array_layers(&self) -> u32 {
        self.array_layers
    }

    fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn usage(&self) -> TextureUses {
        self.usage
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn view_usage_allowed(usage: ViewUsage, texture: TextureUses) -> bool {
    match usage {
        ViewUsage::Resource => texture.contains(TextureUses::RESOURCE),
        ViewUsage::StorageRo => texture.contains(TextureUses::STORAGE_RO),
        ViewUsage::StorageRw => texture.contains(TextureUses::STORAGE_RW),
        ViewUsage::RenderTarget => texture.contains(TextureUses::RENDER_TARGET),
        ViewUsage::DepthStencil => {
            texture.intersects(TextureUses::DEPTH_READ | TextureUses::DEPTH_WRITE)
        }
        ViewUsage::Vertex | ViewUsage::Index | ViewUsage::CBuffer => false,
    }
}

fn map_view_type(dimension: TextureViewDimension) -> vk::ImageViewType {
    match dimension {
        TextureViewDimension::D1 => vk::ImageViewType::TYPE_1D,
        TextureViewDimension::D2 => vk::ImageViewType::TYPE_2D,
        TextureViewDimension::D3 => vk::ImageViewType::TYPE_3D,
        TextureViewDimension::D1Array => vk::ImageViewType::TYPE_1D_ARRAY,
        TextureViewDimension::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureViewDimension::Cube => vk::ImageViewType::CUBE,
        TextureViewDimension::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

pub(crate) fn create_texture_view(
    shared: &Arc<DeviceShared>,
    texture: &dyn Texture,
    desc: &TextureViewDescriptor,
) -> GfxResult<Arc<dyn TextureView>> {
    let vk_texture = texture
        .as_any()
        .downcast_ref::<VulkanTexture>()
        .ok_or_else(|| GfxError::invalid_argument("texture is not a vulkan texture"))?;
    if !view_usage_allowed(desc.usage, texture.usage()) {
        return Err(GfxError::invalid_argument(format!(
            "view usage {:?} not in texture's allowed uses {:?}",
            desc.usage,
            texture.usage()
        )));
    }
    let (mips, layers) = desc
        .range
        .resolve(texture.mip_levels(), texture.array_layers());
    if mips == 0
        || layers == 0
        || desc.range.base_mip + mips > texture.mip_levels()
        || desc.range.base_layer + layers > texture.array_layers()
    {
        return Err(GfxError::invalid_argument(
            "view subresource range out of bounds",
        ));
    }
    let aspect = convert::format_aspect(desc.format);
    let create_info = vk::ImageViewCreateInfo::default()
        .image(vk_texture.raw)
        .view_type(map_view_type(desc.dimension))
        .format(convert::map_format(desc.format))
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(desc.range.base_mip)
                .level_count(mips)
                .base_array_layer(desc.range.base_layer)
                .layer_count(layers),
        );
    let raw = unsafe {
        shared
            .raw
            .create_image_view(&create_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateImageView"))?
    };
    let (width, height, _) = texture.extent();
    Ok(Arc::new(VulkanTextureView {
        shared: shared.clone(),
        raw,
        image: vk_texture.raw,
        resource: texture.id(),
        format: desc.format,
        usage: desc.usage,
        range: SubresourceRange {
            base_mip: desc.range.base_mip,
            mip_count: mips,
            base_layer: desc.range.base_layer,
            layer_count: layers,
        },
        extent: (
            (width >> desc.range.base_mip).max(1),
            (height >> desc.range.base_mip).max(1),
        ),
        swap_chain_owned: vk_texture.swap_chain_owned,
        valid: AtomicBool::new(true),
    }))
}

/// Non-owning view of a texture subresource range.
pub struct VulkanTextureView {
    shared: Arc<DeviceShared>,
    pub(crate) raw: vk::ImageView,
    #[allow(dead_code)]
    pub(crate) image: vk::Image,
    resource: ResourceId,
    format: TextureFormat,
    pub(crate) usage: ViewUsage,
    range: SubresourceRange,
    /// Mip-0-of-view extent, used for framebuffer sizing.
    pub(crate) extent: (u32, u32),
    pub(crate) swap_chain_owned: bool,
    valid: AtomicBool,
}

impl VulkanTextureView {
    #[cfg(feature = "window")]
    pub(crate) fn for_swap_chain(
        shared: &Arc<DeviceShared>,
        raw: vk::ImageView,
        image: vk::Image,
        resource: ResourceId,
        format: TextureFormat,
        extent: (u32, u32),
    ) -> Self {
        Self {
            shared: shared.clone(),
            raw,
            image,
            resource,
            format,
            usage: ViewUsage::RenderTarget,
            range: SubresourceRange {
                base_mip: 0,
                mip_count: 1,
                base_layer: 0,
                layer_count: 1,
            },
            extent,
            swap_chain_owned: true,
            valid: AtomicBool::new(true),
        }
    }
}

impl Drop for VulkanTextureView {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_image_view(self.raw, None);
        }
    }
}

impl std::fmt::Debug for VulkanTextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTextureView")
            .field("resource", &self.resource)
            .field("format", &self.format)
            .finish()
    }
}

impl RenderObject for VulkanTextureView {
    fn tag(&self) -> ObjectTag {
        ObjectTag::TextureView
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl ResourceView for VulkanTextureView {
    fn resource_id(&self) -> ResourceId {
        self.resource
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl TextureView for VulkanTextureView {
    fn format(&self) -> TextureFormat {
        self.format
    }

    fn range(&self) -> SubresourceRange {
        self.range
    }

    fn as_resource_view(&self) -> &dyn ResourceView {
        self
    }
}
