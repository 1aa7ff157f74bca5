//! Vulkan descriptor sets. Each set owns a pool sized exactly for itself;
//! writes happen immediately through `vkUpdateDescriptorSets`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::common::ObjectTag;
use crate::device::{BufferView, DescriptorSet, RenderObject, ResourceView, RootSignature};
use crate::error::{GfxError, GfxResult};

use super::buffer::VulkanBufferView;
use super::convert;
use super::sampler::VulkanSampler;
use super::texture::VulkanTextureView;
use super::root_signature::VulkanRootSignature;
use super::DeviceShared;

struct ElementState {
    descriptor_type: vk::DescriptorType,
    count: u32,
    bound: Vec<bool>,
}

pub(crate) fn create_descriptor_set(
    shared: &Arc<DeviceShared>,
    root_signature: &dyn RootSignature,
    set_index: u32,
) -> GfxResult<Box<dyn DescriptorSet>> {
    let vk_signature = root_signature
        .as_any()
        .downcast_ref::<VulkanRootSignature>()
        .ok_or_else(|| GfxError::invalid_argument("root signature is not a vulkan object"))?;
    let set_desc = root_signature
        .descriptor()
        .descriptor_sets
        .get(set_index as usize)
        .ok_or_else(|| {
            GfxError::invalid_argument(format!(
                "set index {set_index} out of {} descriptor sets",
                root_signature.descriptor().descriptor_sets.len()
            ))
        })?;
    let mut pool_sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    let mut elements = Vec::with_capacity(set_desc.elements.len());
    for element in &set_desc.elements {
        let descriptor_type = convert::map_descriptor_type(element.bind_type);
        match pool_sizes.iter_mut().find(|p| p.ty == descriptor_type) {
            Some(pool_size) => pool_size.descriptor_count += element.count,
            None => pool_sizes.push(
                vk::DescriptorPoolSize::default()
                    .ty(descriptor_type)
                    .descriptor_count(element.count),
            ),
        }
        // Elements backed by static samplers are complete from the start.
        let pre_bound = !element.static_samplers.is_empty();
        elements.push(ElementState {
            descriptor_type,
            count: element.count,
            bound: vec![pre_bound; element.count as usize],
        });
    }
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(1)
        .pool_sizes(&pool_sizes);
    let pool = unsafe {
        shared
            .raw
            .create_descriptor_pool(&pool_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateDescriptorPool"))?
    };
    let layout = vk_signature.set_layouts[set_index as usize];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(std::slice::from_ref(&layout));
    let raw = match unsafe { shared.raw.allocate_descriptor_sets(&alloc_info) } {
        Ok(sets) => sets[0],
        Err(e) => {
            unsafe { shared.raw.destroy_descriptor_pool(pool, None) };
            return Err(shared.backend_err(e, "vkAllocateDescriptorSets"));
        }
    };
    let slots: Vec<u32> = set_desc.elements.iter().map(|e| e.slot).collect();
    Ok(Box::new(VulkanDescriptorSet {
        shared: shared.clone(),
        pool,
        raw,
        slots,
        elements,
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanDescriptorSet {
    shared: Arc<DeviceShared>,
    pool: vk::DescriptorPool,
    pub(crate) raw: vk::DescriptorSet,
    /// Binding slot per element, parallel to `elements`.
    slots: Vec<u32>,
    elements: Vec<ElementState>,
    valid: AtomicBool,
}

impl Drop for VulkanDescriptorSet {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_descriptor_pool(self.pool, None);
        }
    }
}

impl std::fmt::Debug for VulkanDescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorSet")
            .field("elements", &self.elements.len())
            .finish()
    }
}

impl RenderObject for VulkanDescriptorSet {
    fn tag(&self) -> ObjectTag {
        ObjectTag::DescriptorSet
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl DescriptorSet for VulkanDescriptorSet {
    fn set_resource(
        &mut self,
        element: u32,
        array_index: u32,
        view: &dyn ResourceView,
    ) -> GfxResult<()> {
        let state = self.elements.get(element as usize).ok_or_else(|| {
            GfxError::invalid_argument(format!(
                "element {element} out of {} in descriptor set",
                self.elements.len()
            ))
        })?;
        if array_index >= state.count {
            return Err(GfxError::invalid_argument(format!(
                "array index {array_index} out of element of {}",
                state.count
            )));
        }
        let binding = self.slots[element as usize];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.raw)
            .dst_binding(binding)
            .dst_array_element(array_index)
            .descriptor_type(state.descriptor_type);
        let buffer_info;
        let image_info;
        let texel_view;
        let write = if let Some(buffer) = view.as_any().downcast_ref::<VulkanBufferView>() {
            if state.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER {
                debug_assert_eq!(
                    buffer.usage,
                    crate::resource::ViewUsage::CBuffer,
                    "binding a non-cbuffer view to a cbuffer slot"
                );
            }
            if let Some(typed) = buffer.typed {
                texel_view = [typed];
                write.texel_buffer_view(&texel_view)
            } else {
                buffer_info = [vk::DescriptorBufferInfo::default()
                    .buffer(buffer.raw_buffer)
                    .offset(buffer.offset())
                    .range(buffer.len())];
                write.buffer_info(&buffer_info)
            }
        } else if let Some(texture) = view.as_any().downcast_ref::<VulkanTextureView>() {
            let layout = if state.descriptor_type == vk::DescriptorType::STORAGE_IMAGE {
                vk::ImageLayout::GENERAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };
            image_info = [vk::DescriptorImageInfo::default()
                .image_view(texture.raw)
                .image_layout(layout)];
            write.image_info(&image_info)
        } else if let Some(sampler) = view.as_any().downcast_ref::<VulkanSampler>() {
            image_info = [vk::DescriptorImageInfo::default().sampler(sampler.raw)];
            write.image_info(&image_info)
        } else {
            return Err(GfxError::invalid_argument(
                "view is not a vulkan resource view",
            ));
        };
        unsafe {
            self.shared.raw.update_descriptor_sets(&[write], &[]);
        }
        self.elements[element as usize].bound[array_index as usize] = true;
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.elements
            .iter()
            .all(|element| element.bound.iter().all(|bound| *bound))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
