//! Translation of the neutral root signature into a `VkPipelineLayout`.
//!
//! Descriptor sets map one to one onto `VkDescriptorSetLayout`s and the root
//! constant becomes the push-constant range. Root descriptors, which Vulkan
//! has no direct equivalent for, become one extra set appended after the
//! reflected ones; encoders write it per draw from a transient pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::common::ObjectTag;
use crate::device::{RenderObject, RootSignature};
use crate::error::GfxResult;
use crate::root_signature::RootSignatureDescriptor;

use super::{convert, sampler, DeviceShared};

pub(crate) fn create_root_signature(
    shared: &Arc<DeviceShared>,
    desc: &RootSignatureDescriptor,
) -> GfxResult<Box<dyn RootSignature>> {
    let mut immutable_samplers: Vec<vk::Sampler> = Vec::new();
    let mut set_layouts = Vec::with_capacity(desc.descriptor_sets.len() + 1);
    let cleanup = |shared: &DeviceShared,
                       layouts: &[vk::DescriptorSetLayout],
                       samplers: &[vk::Sampler]| unsafe {
        for layout in layouts {
            shared.raw.destroy_descriptor_set_layout(*layout, None);
        }
        for sampler in samplers {
            shared.raw.destroy_sampler(*sampler, None);
        }
    };

    for set in &desc.descriptor_sets {
        // Immutable sampler arrays must stay alive until the layout call.
        let mut sampler_arrays: Vec<Vec<vk::Sampler>> = Vec::new();
        for element in &set.elements {
            if element.static_samplers.is_empty() {
                sampler_arrays.push(Vec::new());
                continue;
            }
            let mut handles = Vec::with_capacity(element.static_samplers.len());
            for sampler_desc in &element.static_samplers {
                let create_info = sampler::make_create_info(sampler_desc);
                let handle = unsafe {
                    match shared.raw.create_sampler(&create_info, None) {
                        Ok(handle) => handle,
                        Err(e) => {
                            cleanup(shared, &set_layouts, &immutable_samplers);
                            return Err(shared.backend_err(e, "vkCreateSampler"));
                        }
                    }
                };
                handles.push(handle);
            }
            sampler_arrays.push(handles);
        }
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = set
            .elements
            .iter()
            .zip(&sampler_arrays)
            .map(|(element, samplers)| {
                let mut binding = vk::DescriptorSetLayoutBinding::default()
                    .binding(element.slot)
                    .descriptor_type(convert::map_descriptor_type(element.bind_type))
                    .descriptor_count(element.count)
                    .stage_flags(convert::map_shader_stages(element.stages));
                if !samplers.is_empty() {
                    binding = binding.immutable_samplers(samplers);
                }
                binding
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            match shared.raw.create_descriptor_set_layout(&create_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    for handles in &sampler_arrays {
                        for handle in handles {
                            shared.raw.destroy_sampler(*handle, None);
                        }
                    }
                    cleanup(shared, &set_layouts, &immutable_samplers);
                    return Err(shared.backend_err(e, "vkCreateDescriptorSetLayout"));
                }
            }
        };
        set_layouts.push(layout);
        immutable_samplers.extend(sampler_arrays.into_iter().flatten());
    }

    // The root descriptor set, if any.
    let mut root_descriptor_types = Vec::with_capacity(desc.root_descriptors.len());
    let root_descriptor_layout = if desc.root_descriptors.is_empty() {
        None
    } else {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .root_descriptors
            .iter()
            .enumerate()
            .map(|(index, rd)| {
                let descriptor_type = convert::map_descriptor_type(rd.bind_type);
                root_descriptor_types.push(descriptor_type);
                vk::DescriptorSetLayoutBinding::default()
                    .binding(index as u32)
                    .descriptor_type(descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(convert::map_shader_stages(rd.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe {
            match shared.raw.create_descriptor_set_layout(&create_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    cleanup(shared, &set_layouts, &immutable_samplers);
                    return Err(shared.backend_err(e, "vkCreateDescriptorSetLayout"));
                }
            }
        };
        set_layouts.push(layout);
        Some(layout)
    };

    let mut push_constant_ranges = Vec::new();
    let mut push_stages = vk::ShaderStageFlags::empty();
    let mut push_size = 0;
    if let Some(constant) = &desc.constant {
        push_stages = convert::map_shader_stages(constant.stages);
        push_size = constant.size;
        push_constant_ranges.push(
            vk::PushConstantRange::default()
                .stage_flags(push_stages)
                .offset(0)
                .size(constant.size),
        );
    }

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);
    let pipeline_layout = unsafe {
        match shared.raw.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                cleanup(shared, &set_layouts, &immutable_samplers);
                return Err(shared.backend_err(e, "vkCreatePipelineLayout"));
            }
        }
    };

    Ok(Box::new(VulkanRootSignature {
        shared: shared.clone(),
        descriptor: desc.clone(),
        set_layouts,
        root_descriptor_layout,
        root_descriptor_types,
        pipeline_layout,
        push_stages,
        push_size,
        immutable_samplers,
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanRootSignature {
    shared: Arc<DeviceShared>,
    descriptor: RootSignatureDescriptor,
    /// Reflected set layouts, plus the trailing root descriptor layout.
    pub(crate) set_layouts: Vec<vk::DescriptorSetLayout>,
    pub(crate) root_descriptor_layout: Option<vk::DescriptorSetLayout>,
    pub(crate) root_descriptor_types: Vec<vk::DescriptorType>,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    pub(crate) push_stages: vk::ShaderStageFlags,
    pub(crate) push_size: u32,
    immutable_samplers: Vec<vk::Sampler>,
    valid: AtomicBool,
}

impl VulkanRootSignature {
    /// Set index the root descriptor table binds at.
    pub(crate) fn root_descriptor_set_index(&self) -> u32 {
        self.descriptor.descriptor_sets.len() as u32
    }
}

impl Drop for VulkanRootSignature {
    fn drop(&mut self) {
        unsafe {
            self.shared
                .raw
                .destroy_pipeline_layout(self.pipeline_layout, None);
            for layout in &self.set_layouts {
                self.shared.raw.destroy_descriptor_set_layout(*layout, None);
            }
            for sampler in &self.immutable_samplers {
                self.shared.raw.destroy_sampler(*sampler, None);
            }
        }
    }
}

impl std::fmt::Debug for VulkanRootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanRootSignature")
            .field("sets", &self.descriptor.descriptor_sets.len())
            .field("root_descriptors", &self.descriptor.root_descriptors.len())
            .field("push_size", &self.push_size)
            .finish()
    }
}

impl RenderObject for VulkanRootSignature {
    fn tag(&self) -> ObjectTag {
        ObjectTag::RootSignature
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl RootSignature for VulkanRootSignature {
    fn descriptor(&self) -> &RootSignatureDescriptor {
        &self.descriptor
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
