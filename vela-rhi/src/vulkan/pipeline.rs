//! Vulkan graphics and compute pipelines.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use smallvec::SmallVec;

use crate::common::{ColorWrites, LoadAction, ObjectTag, ShaderStage, ShaderStages, StoreAction};
use crate::device::{
    ComputePipelineState, GraphicsPipelineState, RenderObject, Shader as _, ShaderReflection,
};
use crate::error::{GfxError, GfxResult};
use crate::pipeline::{
    validate_graphics_pipeline, ComputePipelineDescriptor, GraphicsPipelineDescriptor,
};

use super::root_signature::VulkanRootSignature;
use super::shader::VulkanShader;
use super::{convert, DeviceShared, RenderPassKey};

fn expect_stage(shader: &VulkanShader, stage: ShaderStage) -> GfxResult<()> {
    if shader.stage() != stage {
        return Err(GfxError::invalid_argument(format!(
            "shader '{}' is a {:?} shader, expected {:?}",
            shader.entry_point(),
            shader.stage(),
            stage
        )));
    }
    Ok(())
}

pub(crate) fn create_graphics_pipeline(
    shared: &Arc<DeviceShared>,
    desc: &GraphicsPipelineDescriptor<'_>,
) -> GfxResult<Box<dyn GraphicsPipelineState>> {
    debug_assert!(
        desc.root_signature.is_valid() && desc.vertex_shader.is_valid(),
        "pipeline created from destroyed objects"
    );
    validate_graphics_pipeline(
        &desc.vertex_buffers,
        desc.depth_stencil.as_ref(),
        &desc.color_targets,
    )?;
    let signature = desc
        .root_signature
        .as_any()
        .downcast_ref::<VulkanRootSignature>()
        .ok_or_else(|| GfxError::invalid_argument("root signature is not a vulkan object"))?;
    let signature_stages = desc.root_signature.descriptor().stages();
    if signature_stages.contains(ShaderStages::COMPUTE) {
        return Err(GfxError::invalid_argument(
            "root signature binds compute stages in a graphics pipeline",
        ));
    }
    if signature_stages.contains(ShaderStages::PIXEL) && desc.pixel_shader.is_none() {
        return Err(GfxError::invalid_argument(
            "root signature binds the pixel stage but no pixel shader was given",
        ));
    }
    let vertex_shader = desc
        .vertex_shader
        .as_any()
        .downcast_ref::<VulkanShader>()
        .ok_or_else(|| GfxError::invalid_argument("vertex shader is not a vulkan object"))?;
    expect_stage(vertex_shader, ShaderStage::Vertex)?;
    let pixel_shader = match desc.pixel_shader {
        Some(shader) => {
            let pixel = shader
                .as_any()
                .downcast_ref::<VulkanShader>()
                .ok_or_else(|| GfxError::invalid_argument("pixel shader is not a vulkan object"))?;
            expect_stage(pixel, ShaderStage::Pixel)?;
            Some(pixel)
        }
        None => None,
    };

    // A compatibility render pass; the real pass at record time only has to
    // match formats and sample counts.
    let pass_key = RenderPassKey {
        colors: desc
            .color_targets
            .iter()
            .map(|t| {
                (
                    convert::map_format(t.format),
                    LoadAction::DontCare,
                    StoreAction::Store,
                )
            })
            .collect(),
        depth: desc.depth_stencil.as_ref().map(|ds| {
            (
                convert::map_format(ds.format),
                LoadAction::DontCare,
                StoreAction::Store,
                LoadAction::DontCare,
                StoreAction::Store,
            )
        }),
    };
    let render_pass = shared.get_or_create_render_pass(&pass_key)?;

    let vertex_entry = CString::new(vertex_shader.entry_point.as_str())
        .map_err(|_| GfxError::invalid_argument("entry point contains a NUL byte"))?;
    let pixel_entry;
    let mut stages: SmallVec<[vk::PipelineShaderStageCreateInfo; 2]> = SmallVec::new();
    stages.push(
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader.module)
            .name(&vertex_entry),
    );
    if let Some(pixel) = pixel_shader {
        pixel_entry = CString::new(pixel.entry_point.as_str())
            .map_err(|_| GfxError::invalid_argument("entry point contains a NUL byte"))?;
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(pixel.module)
                .name(&pixel_entry),
        );
    }

    let mut binding_descs = Vec::with_capacity(desc.vertex_buffers.len());
    let mut attribute_descs = Vec::new();
    for (slot, layout) in desc.vertex_buffers.iter().enumerate() {
        binding_descs.push(
            vk::VertexInputBindingDescription::default()
                .binding(slot as u32)
                .stride(layout.stride)
                .input_rate(convert::map_step_mode(layout.step_mode)),
        );
        for element in &layout.elements {
            attribute_descs.push(
                vk::VertexInputAttributeDescription::default()
                    .location(element.location)
                    .binding(slot as u32)
                    .format(convert::map_vertex_format(element.format))
                    .offset(element.offset),
            );
        }
    }
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descs)
        .vertex_attribute_descriptions(&attribute_descs);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert::map_topology(desc.primitive.topology))
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(desc.primitive.unclipped_depth)
        .rasterizer_discard_enable(false)
        .polygon_mode(convert::map_polygon_mode(desc.primitive.polygon_mode))
        .line_width(1.0)
        .cull_mode(convert::map_cull_mode(desc.primitive.cull_mode))
        .front_face(convert::map_front_face(desc.primitive.front_face));
    if let Some(bias) = desc.primitive.depth_bias {
        rasterization = rasterization
            .depth_bias_enable(true)
            .depth_bias_constant_factor(bias.constant as f32)
            .depth_bias_slope_factor(bias.slope_scale)
            .depth_bias_clamp(bias.clamp);
    }
    if desc.primitive.conservative_raster {
        return Err(GfxError::not_supported(
            "conservative rasterization is not enabled on this device",
        ));
    }

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::from_raw(desc.multisample.count.max(1)))
        .alpha_to_coverage_enable(desc.multisample.alpha_to_coverage);

    let depth_stencil = desc.depth_stencil.as_ref().map(|ds| {
        let front = vk::StencilOpState::default()
            .fail_op(convert::map_stencil_op(ds.stencil_front.fail_op))
            .pass_op(convert::map_stencil_op(ds.stencil_front.pass_op))
            .depth_fail_op(convert::map_stencil_op(ds.stencil_front.depth_fail_op))
            .compare_op(convert::map_compare(ds.stencil_front.compare))
            .compare_mask(ds.stencil_read_mask)
            .write_mask(ds.stencil_write_mask);
        let back = vk::StencilOpState::default()
            .fail_op(convert::map_stencil_op(ds.stencil_back.fail_op))
            .pass_op(convert::map_stencil_op(ds.stencil_back.pass_op))
            .depth_fail_op(convert::map_stencil_op(ds.stencil_back.depth_fail_op))
            .compare_op(convert::map_compare(ds.stencil_back.compare))
            .compare_mask(ds.stencil_read_mask)
            .write_mask(ds.stencil_write_mask);
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(ds.depth_write_enabled)
            .depth_compare_op(convert::map_compare(ds.depth_compare))
            .stencil_test_enable(ds.format.has_stencil())
            .front(front)
            .back(back)
    });

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
        .color_targets
        .iter()
        .map(|target| {
            let mut write_mask = vk::ColorComponentFlags::empty();
            if target.write_mask.contains(ColorWrites::RED) {
                write_mask |= vk::ColorComponentFlags::R;
            }
            if target.write_mask.contains(ColorWrites::GREEN) {
                write_mask |= vk::ColorComponentFlags::G;
            }
            if target.write_mask.contains(ColorWrites::BLUE) {
                write_mask |= vk::ColorComponentFlags::B;
            }
            if target.write_mask.contains(ColorWrites::ALPHA) {
                write_mask |= vk::ColorComponentFlags::A;
            }
            match &target.blend {
                None => vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(write_mask),
                Some(blend) => vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(true)
                    .src_color_blend_factor(convert::map_blend_factor(blend.color.src_factor))
                    .dst_color_blend_factor(convert::map_blend_factor(blend.color.dst_factor))
                    .color_blend_op(convert::map_blend_op(blend.color.operation))
                    .src_alpha_blend_factor(convert::map_blend_factor(blend.alpha.src_factor))
                    .dst_alpha_blend_factor(convert::map_blend_factor(blend.alpha.dst_factor))
                    .alpha_blend_op(convert::map_blend_op(blend.alpha.operation))
                    .color_write_mask(write_mask),
            }
        })
        .collect();
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(signature.pipeline_layout)
        .render_pass(render_pass)
        .subpass(0);
    if let Some(ref ds) = depth_stencil {
        create_info = create_info.depth_stencil_state(ds);
    }

    let pipelines = unsafe {
        shared
            .raw
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| shared.backend_err(e, "vkCreateGraphicsPipelines"))?
    };
    if let Some(label) = desc.label {
        log::trace!("created graphics pipeline '{label}'");
    }
    Ok(Box::new(VulkanGraphicsPipeline {
        shared: shared.clone(),
        raw: pipelines[0],
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanGraphicsPipeline {
    shared: Arc<DeviceShared>,
    pub(crate) raw: vk::Pipeline,
    valid: AtomicBool,
}

impl Drop for VulkanGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_pipeline(self.raw, None);
        }
    }
}

impl std::fmt::Debug for VulkanGraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanGraphicsPipeline").finish()
    }
}

impl RenderObject for VulkanGraphicsPipeline {
    fn tag(&self) -> ObjectTag {
        ObjectTag::GraphicsPipelineState
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl GraphicsPipelineState for VulkanGraphicsPipeline {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) fn create_compute_pipeline(
    shared: &Arc<DeviceShared>,
    desc: &ComputePipelineDescriptor<'_>,
) -> GfxResult<Box<dyn ComputePipelineState>> {
    debug_assert!(
        desc.root_signature.is_valid() && desc.shader.is_valid(),
        "pipeline created from destroyed objects"
    );
    let signature = desc
        .root_signature
        .as_any()
        .downcast_ref::<VulkanRootSignature>()
        .ok_or_else(|| GfxError::invalid_argument("root signature is not a vulkan object"))?;
    let shader = desc
        .shader
        .as_any()
        .downcast_ref::<VulkanShader>()
        .ok_or_else(|| GfxError::invalid_argument("compute shader is not a vulkan object"))?;
    expect_stage(shader, ShaderStage::Compute)?;
    let group_size = match shader.reflection() {
        ShaderReflection::Hlsl(hlsl) => hlsl.group_size,
        ShaderReflection::Spirv(spirv) => spirv.group_size,
    };
    let entry = CString::new(shader.entry_point.as_str())
        .map_err(|_| GfxError::invalid_argument("entry point contains a NUL byte"))?;
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader.module)
        .name(&entry);
    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(signature.pipeline_layout);
    let pipelines = unsafe {
        shared
            .raw
            .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| shared.backend_err(e, "vkCreateComputePipelines"))?
    };
    if let Some(label) = desc.label {
        log::trace!("created compute pipeline '{label}'");
    }
    Ok(Box::new(VulkanComputePipeline {
        shared: shared.clone(),
        raw: pipelines[0],
        group_size,
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanComputePipeline {
    shared: Arc<DeviceShared>,
    pub(crate) raw: vk::Pipeline,
    group_size: (u32, u32, u32),
    valid: AtomicBool,
}

impl VulkanComputePipeline {
    /// Thread-group shape the shader was compiled with.
    pub fn thread_group_size(&self) -> (u32, u32, u32) {
        self.group_size
    }
}

impl Drop for VulkanComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_pipeline(self.raw, None);
        }
    }
}

impl std::fmt::Debug for VulkanComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanComputePipeline").finish()
    }
}

impl RenderObject for VulkanComputePipeline {
    fn tag(&self) -> ObjectTag {
        ObjectTag::ComputePipelineState
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl ComputePipelineState for VulkanComputePipeline {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
