//! Vulkan buffers and buffer views.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::common::{BufferUses, ObjectTag};
use crate::device::{Buffer, BufferView, RenderObject, ResourceId, ResourceView};
use crate::error::{GfxError, GfxResult};
use crate::resource::{BufferDescriptor, BufferViewDescriptor, MemoryType, ResourceHint};

use super::memory::MemoryAllocation;
use super::{convert, DeviceShared};

fn map_usage(usage: BufferUses) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUses::COPY_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUses::COPY_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUses::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUses::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUses::CBUFFER) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.intersects(BufferUses::STORAGE_RO | BufferUses::STORAGE_RW) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUses::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    flags
}

fn memory_flags(memory: MemoryType) -> vk::MemoryPropertyFlags {
    match memory {
        MemoryType::Device => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryType::Upload | MemoryType::Readback => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
    }
}

pub(crate) fn create_buffer(
    shared: &Arc<DeviceShared>,
    desc: &BufferDescriptor,
) -> GfxResult<Box<dyn Buffer>> {
    if desc.size == 0 {
        return Err(GfxError::invalid_argument("buffer size must be non-zero"));
    }
    if desc.memory == MemoryType::Device
        && desc.usage.intersects(BufferUses::MAP_READ | BufferUses::MAP_WRITE)
    {
        return Err(GfxError::invalid_argument(
            "device-local buffers cannot be mappable",
        ));
    }
    let create_info = vk::BufferCreateInfo::default()
        .size(desc.size)
        .usage(map_usage(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let raw = unsafe {
        shared
            .raw
            .create_buffer(&create_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateBuffer"))?
    };
    let requirements = unsafe { shared.raw.get_buffer_memory_requirements(raw) };
    let allocation = {
        let mut allocator = shared.memory.lock().unwrap();
        match allocator.allocate(
            requirements,
            memory_flags(desc.memory),
            desc.hint == ResourceHint::Dedicated,
        ) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { shared.raw.destroy_buffer(raw, None) };
                return Err(err);
            }
        }
    };
    if let Err(e) = unsafe {
        shared
            .raw
            .bind_buffer_memory(raw, allocation.memory, allocation.offset)
    } {
        unsafe { shared.raw.destroy_buffer(raw, None) };
        shared.memory.lock().unwrap().free(allocation);
        return Err(shared.backend_err(e, "vkBindBufferMemory"));
    }
    if let Some(label) = desc.label {
        log::trace!("created buffer '{label}' ({} bytes)", desc.size);
    }
    Ok(Box::new(VulkanBuffer {
        shared: shared.clone(),
        raw,
        allocation: Some(allocation),
        size: desc.size,
        memory: desc.memory,
        usage: desc.usage,
        id: shared.next_id(),
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanBuffer {
    pub(crate) shared: Arc<DeviceShared>,
    pub(crate) raw: vk::Buffer,
    allocation: Option<MemoryAllocation>,
    size: u64,
    memory: MemoryType,
    usage: BufferUses,
    id: ResourceId,
    valid: AtomicBool,
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_buffer(self.raw, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.shared.memory.lock().unwrap().free(allocation);
        }
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("memory", &self.memory)
            .finish()
    }
}

impl RenderObject for VulkanBuffer {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Buffer
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Buffer for VulkanBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn memory_type(&self) -> MemoryType {
        self.memory
    }

    fn usage(&self) -> BufferUses {
        self.usage
    }

    fn map(&self, offset: u64, size: u64) -> GfxResult<*mut u8> {
        if self.memory == MemoryType::Device {
            return Err(GfxError::invalid_operation(
                "device-local buffers are not mappable".to_string(),
            ));
        }
        if offset + size > self.size {
            return Err(GfxError::invalid_argument(format!(
                "map range {offset}+{size} out of buffer of {}",
                self.size
            )));
        }
        let base = self
            .allocation
            .as_ref()
            .map(|a| a.mapped)
            .unwrap_or(std::ptr::null_mut());
        if base.is_null() {
            return Err(GfxError::invalid_operation(
                "buffer memory is not host visible".to_string(),
            ));
        }
        Ok(unsafe { base.add(offset as usize) })
    }

    fn unmap(&self, _offset: u64, _size: u64) {
        // Persistently mapped, host-coherent memory: nothing to flush.
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) fn create_buffer_view(
    shared: &Arc<DeviceShared>,
    buffer: &dyn Buffer,
    desc: &BufferViewDescriptor,
) -> GfxResult<Arc<dyn BufferView>> {
    let vk_buffer = buffer
        .as_any()
        .downcast_ref::<VulkanBuffer>()
        .ok_or_else(|| GfxError::invalid_argument("buffer is not a vulkan buffer"))?;
    let size = if desc.size == u64::MAX {
        buffer.size() - desc.offset
    } else {
        desc.size
    };
    if desc.offset + size > buffer.size() {
        return Err(GfxError::invalid_argument(format!(
            "view range {}+{size} out of buffer of {}",
            desc.offset,
            buffer.size()
        )));
    }
    // Typed views get a native VkBufferView; raw and structured views only
    // need the handle plus range.
    let typed = match desc.format {
        Some(format) => {
            let create_info = vk::BufferViewCreateInfo::default()
                .buffer(vk_buffer.raw)
                .format(convert::map_format(format))
                .offset(desc.offset)
                .range(size);
            Some(unsafe {
                shared
                    .raw
                    .create_buffer_view(&create_info, None)
                    .map_err(|e| shared.backend_err(e, "vkCreateBufferView"))?
            })
        }
        None => None,
    };
    Ok(Arc::new(VulkanBufferView {
        shared: shared.clone(),
        raw_buffer: vk_buffer.raw,
        typed,
        resource: buffer.id(),
        offset: desc.offset,
        size,
        usage: desc.usage,
        valid: AtomicBool::new(true),
    }))
}

/// Non-owning window into a buffer. Keeps raw handles only; the caller
/// guarantees the buffer outlives every use of the view.
pub struct VulkanBufferView {
    shared: Arc<DeviceShared>,
    pub(crate) raw_buffer: vk::Buffer,
    pub(crate) typed: Option<vk::BufferView>,
    resource: ResourceId,
    offset: u64,
    size: u64,
    pub(crate) usage: crate::resource::ViewUsage,
    valid: AtomicBool,
}

impl Drop for VulkanBufferView {
    fn drop(&mut self) {
        if let Some(view) = self.typed.take() {
            unsafe {
                self.shared.raw.destroy_buffer_view(view, None);
            }
        }
    }
}

impl std::fmt::Debug for VulkanBufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBufferView")
            .field("resource", &self.resource)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

impl RenderObject for VulkanBufferView {
    fn tag(&self) -> ObjectTag {
        ObjectTag::BufferView
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl ResourceView for VulkanBufferView {
    fn resource_id(&self) -> ResourceId {
        self.resource
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl BufferView for VulkanBufferView {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn len(&self) -> u64 {
        self.size
    }

    fn as_resource_view(&self) -> &dyn ResourceView {
        self
    }
}
