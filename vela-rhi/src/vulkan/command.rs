//! Vulkan command buffers and pass encoders.
//!
//! Each command buffer owns its pool plus a transient descriptor pool used to
//! realize root descriptors (written per draw, reset at `begin`). The
//! [`RecordState`] machine is enforced here; violations panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::common::ObjectTag;
use crate::device::{
    Buffer, BufferBarrier, BufferTextureCopyLayout, BufferView, CommandBuffer, CommandEncoder,
    ComputeCommandEncoder, ComputePipelineState, DescriptorSet, GraphicsCommandEncoder,
    GraphicsPipelineState, IndexBufferBinding, RecordState, RenderObject, RenderPassDescriptor,
    RootSignature, ScissorRect, TextureBarrier, TextureCopySlice, VertexBufferBinding, Viewport,
};
use crate::error::{GfxError, GfxResult};
use crate::resource::ViewUsage;

use super::barrier;
use super::buffer::{VulkanBuffer, VulkanBufferView};
use super::convert;
use super::descriptor::VulkanDescriptorSet;
use super::pipeline::{VulkanComputePipeline, VulkanGraphicsPipeline};
use super::queue::{SubmitTracker, VulkanQueue};
use super::root_signature::VulkanRootSignature;
use super::texture::{VulkanTexture, VulkanTextureView};
use super::{DeviceShared, FramebufferKey, RenderPassKey};

const TRANSIENT_POOL_SETS: u32 = 256;

pub(crate) fn create_command_buffer(
    shared: &Arc<DeviceShared>,
    queue_family: u32,
) -> GfxResult<Box<dyn CommandBuffer>> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
    let pool = unsafe {
        shared
            .raw
            .create_command_pool(&pool_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateCommandPool"))?
    };
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let raw = match unsafe { shared.raw.allocate_command_buffers(&alloc_info) } {
        Ok(buffers) => buffers[0],
        Err(e) => {
            unsafe { shared.raw.destroy_command_pool(pool, None) };
            return Err(shared.backend_err(e, "vkAllocateCommandBuffers"));
        }
    };
    Ok(Box::new(VulkanCommandBuffer {
        shared: shared.clone(),
        pool,
        raw,
        queue_family,
        state: RecordState::Initial,
        tracker: None,
        transient_pools: Vec::new(),
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanCommandBuffer {
    shared: Arc<DeviceShared>,
    pool: vk::CommandPool,
    raw: vk::CommandBuffer,
    queue_family: u32,
    state: RecordState,
    tracker: Option<Arc<SubmitTracker>>,
    /// Pools backing per-draw root descriptor sets; reset every `begin`.
    transient_pools: Vec<vk::DescriptorPool>,
    valid: AtomicBool,
}

impl VulkanCommandBuffer {
    pub(crate) fn raw_handle(&self) -> vk::CommandBuffer {
        self.raw
    }

    pub(crate) fn mark_submitted(&mut self, tracker: Arc<SubmitTracker>) {
        self.state = self.state.submit().unwrap_or_else(|err| panic!("{err}"));
        self.tracker = Some(tracker);
    }

    fn assert_recording(&self, what: &str) {
        assert!(
            self.state.accepts_commands(),
            "cannot {what} in state {:?}",
            self.state
        );
    }

    fn allocate_transient_set(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> GfxResult<vk::DescriptorSet> {
        if let Some(&pool) = self.transient_pools.last() {
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(std::slice::from_ref(&layout));
            match unsafe { self.shared.raw.allocate_descriptor_sets(&alloc_info) } {
                Ok(sets) => return Ok(sets[0]),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
                | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {}
                Err(e) => return Err(self.shared.backend_err(e, "vkAllocateDescriptorSets")),
            }
        }
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(TRANSIENT_POOL_SETS * 2),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(TRANSIENT_POOL_SETS * 2),
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(TRANSIENT_POOL_SETS)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            self.shared
                .raw
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| self.shared.backend_err(e, "vkCreateDescriptorPool"))?
        };
        self.transient_pools.push(pool);
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(std::slice::from_ref(&layout));
        let sets = unsafe {
            self.shared
                .raw
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| self.shared.backend_err(e, "vkAllocateDescriptorSets"))?
        };
        Ok(sets[0])
    }
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        // Drain an in-flight submission before the pools go away.
        if let Some(tracker) = self.tracker.take() {
            tracker.wait_done();
        }
        unsafe {
            for pool in self.transient_pools.drain(..) {
                self.shared.raw.destroy_descriptor_pool(pool, None);
            }
            self.shared.raw.destroy_command_pool(self.pool, None);
        }
    }
}

impl std::fmt::Debug for VulkanCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandBuffer")
            .field("state", &self.state)
            .field("queue_family", &self.queue_family)
            .finish()
    }
}

impl RenderObject for VulkanCommandBuffer {
    fn tag(&self) -> ObjectTag {
        ObjectTag::CmdBuffer
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

fn handoff_families(
    own_family: u32,
    handoff: &Option<crate::device::QueueHandoff<'_>>,
) -> (u32, u32) {
    match handoff {
        None => (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED),
        Some(handoff) => {
            let other = handoff
                .other
                .as_any()
                .downcast_ref::<VulkanQueue>()
                .map(|q| q.family_index())
                .unwrap_or(vk::QUEUE_FAMILY_IGNORED);
            match handoff.direction {
                crate::device::HandoffDirection::From => (other, own_family),
                crate::device::HandoffDirection::To => (own_family, other),
            }
        }
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn state(&self) -> RecordState {
        self.state
    }

    fn begin(&mut self) -> GfxResult<()> {
        if self.state == RecordState::Pending {
            let tracker = self.tracker.as_ref().expect("pending without a tracker");
            if tracker.is_complete()? {
                self.state = self.state.complete().unwrap();
                self.tracker = None;
            } else {
                panic!("begin on a command buffer whose submission has not completed");
            }
        }
        self.state = self.state.begin().unwrap_or_else(|err| panic!("{err}"));
        unsafe {
            for pool in &self.transient_pools {
                self.shared
                    .raw
                    .reset_descriptor_pool(*pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|e| self.shared.backend_err(e, "vkResetDescriptorPool"))?;
            }
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.shared
                .raw
                .begin_command_buffer(self.raw, &begin_info)
                .map_err(|e| self.shared.backend_err(e, "vkBeginCommandBuffer"))
        }
    }

    fn end(&mut self) -> GfxResult<()> {
        self.state = self.state.end().unwrap_or_else(|err| panic!("{err}"));
        unsafe {
            self.shared
                .raw
                .end_command_buffer(self.raw)
                .map_err(|e| self.shared.backend_err(e, "vkEndCommandBuffer"))
        }
    }

    fn resource_barrier(&mut self, buffers: &[BufferBarrier<'_>], textures: &[TextureBarrier<'_>]) {
        self.assert_recording("record a barrier");
        let mut src_stages = vk::PipelineStageFlags::empty();
        let mut dst_stages = vk::PipelineStageFlags::empty();
        let mut buffer_barriers: SmallVec<[vk::BufferMemoryBarrier; 4]> = SmallVec::new();
        for barrier in buffers {
            let vk_buffer = barrier
                .buffer
                .as_any()
                .downcast_ref::<VulkanBuffer>()
                .expect("buffer is not a vulkan buffer");
            let (src_access, src) = barrier::buffer_state(barrier.before);
            let (dst_access, dst) = barrier::buffer_state(barrier.after);
            let (src_family, dst_family) = handoff_families(self.queue_family, &barrier.handoff);
            src_stages |= src;
            dst_stages |= dst;
            buffer_barriers.push(
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .src_queue_family_index(src_family)
                    .dst_queue_family_index(dst_family)
                    .buffer(vk_buffer.raw)
                    .offset(0)
                    .size(vk::WHOLE_SIZE),
            );
        }
        let mut image_barriers: SmallVec<[vk::ImageMemoryBarrier; 4]> = SmallVec::new();
        for barrier in textures {
            let vk_texture = barrier
                .texture
                .as_any()
                .downcast_ref::<VulkanTexture>()
                .expect("texture is not a vulkan texture");
            let uses = barrier.before | barrier.after;
            assert!(
                !uses.contains(crate::common::TextureUses::PRESENT) || vk_texture.swap_chain_owned,
                "present transitions are only legal on swap chain textures"
            );
            let (src_access, src, old_layout) = barrier::texture_state(barrier.before);
            let (dst_access, dst, new_layout) = barrier::texture_state(barrier.after);
            let (src_family, dst_family) = handoff_families(self.queue_family, &barrier.handoff);
            src_stages |= src;
            dst_stages |= dst;
            let (base_mip, mips, base_layer, layers) = match barrier.range {
                None => (0, vk::REMAINING_MIP_LEVELS, 0, vk::REMAINING_ARRAY_LAYERS),
                Some(range) => {
                    let (mips, layers) = range.resolve(
                        barrier.texture.mip_levels(),
                        barrier.texture.array_layers(),
                    );
                    (range.base_mip, mips, range.base_layer, layers)
                }
            };
            image_barriers.push(
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .old_layout(old_layout)
                    .new_layout(new_layout)
                    .src_queue_family_index(src_family)
                    .dst_queue_family_index(dst_family)
                    .image(vk_texture.raw)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(convert::format_aspect(barrier.texture.format()))
                            .base_mip_level(base_mip)
                            .level_count(mips)
                            .base_array_layer(base_layer)
                            .layer_count(layers),
                    ),
            );
        }
        if buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        unsafe {
            self.shared.raw.cmd_pipeline_barrier(
                self.raw,
                src_stages,
                dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn copy_buffer_to_buffer(
        &mut self,
        src: &dyn Buffer,
        src_offset: u64,
        dst: &dyn Buffer,
        dst_offset: u64,
        size: u64,
    ) {
        self.assert_recording("record a copy");
        let src = src
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .expect("buffer is not a vulkan buffer");
        let dst = dst
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .expect("buffer is not a vulkan buffer");
        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe {
            self.shared
                .raw
                .cmd_copy_buffer(self.raw, src.raw, dst.raw, &[region]);
        }
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &dyn Buffer,
        src_layout: BufferTextureCopyLayout,
        dst: &dyn crate::device::Texture,
        dst_slice: TextureCopySlice,
        extent: (u32, u32, u32),
    ) {
        self.assert_recording("record a copy");
        let src = src
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .expect("buffer is not a vulkan buffer");
        let vk_dst = dst
            .as_any()
            .downcast_ref::<VulkanTexture>()
            .expect("texture is not a vulkan texture");
        // Vulkan counts the buffer row pitch in texels, not bytes.
        let row_length = if src_layout.bytes_per_row == 0 {
            0
        } else {
            src_layout.bytes_per_row / dst.format().bytes_per_pixel()
        };
        let region = vk::BufferImageCopy::default()
            .buffer_offset(src_layout.offset)
            .buffer_row_length(row_length)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(convert::format_aspect(dst.format()))
                    .mip_level(dst_slice.mip_level)
                    .base_array_layer(dst_slice.array_layer)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D {
                x: dst_slice.origin.0 as i32,
                y: dst_slice.origin.1 as i32,
                z: dst_slice.origin.2 as i32,
            })
            .image_extent(vk::Extent3D {
                width: extent.0,
                height: extent.1,
                depth: extent.2.max(1),
            });
        unsafe {
            self.shared.raw.cmd_copy_buffer_to_image(
                self.raw,
                src.raw,
                vk_dst.raw,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn begin_render_pass<'a>(
        &'a mut self,
        desc: &RenderPassDescriptor<'_>,
    ) -> Box<dyn GraphicsCommandEncoder + 'a> {
        self.state = self
            .state
            .begin_pass()
            .unwrap_or_else(|err| panic!("{err}"));
        let mut key_colors = SmallVec::new();
        let mut views: SmallVec<[vk::ImageView; 5]> = SmallVec::new();
        let mut clear_values: SmallVec<[vk::ClearValue; 5]> = SmallVec::new();
        let mut extent = (u32::MAX, u32::MAX);
        for attachment in desc.color_attachments {
            let view = attachment
                .view
                .as_any()
                .downcast_ref::<VulkanTextureView>()
                .expect("attachment view is not a vulkan texture view");
            debug_assert_eq!(view.usage, ViewUsage::RenderTarget);
            key_colors.push((
                super::convert::map_format(attachment.view.format()),
                attachment.load,
                attachment.store,
            ));
            views.push(view.raw);
            extent = (extent.0.min(view.extent.0), extent.1.min(view.extent.1));
            clear_values.push(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [
                        attachment.clear.r,
                        attachment.clear.g,
                        attachment.clear.b,
                        attachment.clear.a,
                    ],
                },
            });
        }
        let mut key_depth = None;
        if let Some(depth) = &desc.depth_stencil {
            let view = depth
                .view
                .as_any()
                .downcast_ref::<VulkanTextureView>()
                .expect("attachment view is not a vulkan texture view");
            debug_assert_eq!(view.usage, ViewUsage::DepthStencil);
            key_depth = Some((
                super::convert::map_format(depth.view.format()),
                depth.depth_load,
                depth.depth_store,
                depth.stencil_load,
                depth.stencil_store,
            ));
            views.push(view.raw);
            extent = (extent.0.min(view.extent.0), extent.1.min(view.extent.1));
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: depth.clear.depth,
                    stencil: depth.clear.stencil as u32,
                },
            });
        }
        assert!(
            !views.is_empty(),
            "a render pass needs at least one attachment"
        );
        let key = RenderPassKey {
            colors: key_colors,
            depth: key_depth,
        };
        let render_pass = self
            .shared
            .get_or_create_render_pass(&key)
            .unwrap_or_else(|err| panic!("render pass creation failed: {err}"));
        use ash::vk::Handle;
        let fb_key = FramebufferKey {
            render_pass: render_pass.as_raw(),
            attachments: views.iter().map(|v| v.as_raw()).collect(),
            width: extent.0,
            height: extent.1,
        };
        let framebuffer = self
            .shared
            .get_or_create_framebuffer(&fb_key, render_pass, &views)
            .unwrap_or_else(|err| panic!("framebuffer creation failed: {err}"));
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: extent.0,
                height: extent.1,
            },
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        unsafe {
            self.shared
                .raw
                .cmd_begin_render_pass(self.raw, &begin_info, vk::SubpassContents::INLINE);
            // Dynamic state defaults; pipelines use dynamic viewport/scissor.
            let viewport = vk::Viewport::default()
                .width(extent.0 as f32)
                .height(extent.1 as f32)
                .max_depth(1.0);
            self.shared.raw.cmd_set_viewport(self.raw, 0, &[viewport]);
            self.shared.raw.cmd_set_scissor(self.raw, 0, &[render_area]);
        }
        Box::new(VulkanGraphicsEncoder {
            binding: EncoderBindingState::new(self),
        })
    }

    fn begin_compute_pass<'a>(&'a mut self) -> Box<dyn ComputeCommandEncoder + 'a> {
        self.state = self
            .state
            .begin_pass()
            .unwrap_or_else(|err| panic!("{err}"));
        Box::new(VulkanComputeEncoder {
            binding: EncoderBindingState::new(self),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Root signature facts an encoder needs after binding.
struct RootSigState {
    layout: vk::PipelineLayout,
    push_stages: vk::ShaderStageFlags,
    push_size: u32,
    root_desc_layout: Option<vk::DescriptorSetLayout>,
    root_set_index: u32,
}

/// Binding state shared by the graphics and compute encoders.
struct EncoderBindingState<'a> {
    cb: &'a mut VulkanCommandBuffer,
    root: Option<RootSigState>,
    /// Pending root descriptor writes: `(buffer, offset, size)` per index.
    pending_root: Vec<Option<(vk::Buffer, u64, u64)>>,
    root_descriptor_types: Vec<vk::DescriptorType>,
    root_dirty: bool,
}

impl<'a> EncoderBindingState<'a> {
    fn new(cb: &'a mut VulkanCommandBuffer) -> Self {
        Self {
            cb,
            root: None,
            pending_root: Vec::new(),
            root_descriptor_types: Vec::new(),
            root_dirty: false,
        }
    }

    fn bind_root_signature(&mut self, root_signature: &dyn RootSignature) {
        let signature = root_signature
            .as_any()
            .downcast_ref::<VulkanRootSignature>()
            .expect("root signature is not a vulkan object");
        self.pending_root = vec![None; signature.root_descriptor_types.len()];
        self.root_descriptor_types = signature.root_descriptor_types.clone();
        self.root = Some(RootSigState {
            layout: signature.pipeline_layout,
            push_stages: signature.push_stages,
            push_size: signature.push_size,
            root_desc_layout: signature.root_descriptor_layout,
            root_set_index: signature.root_descriptor_set_index(),
        });
        self.root_dirty = true;
    }

    fn root(&self) -> &RootSigState {
        self.root
            .as_ref()
            .expect("no root signature bound on this encoder")
    }

    fn push_constant(&mut self, data: &[u8]) {
        let root = self.root();
        assert!(
            data.len() as u32 <= root.push_size,
            "push constant write of {} bytes exceeds the {}-byte block",
            data.len(),
            root.push_size
        );
        unsafe {
            self.cb.shared.raw.cmd_push_constants(
                self.cb.raw,
                root.layout,
                root.push_stages,
                0,
                data,
            );
        }
    }

    fn bind_root_descriptor(&mut self, root_index: u32, buffer: vk::Buffer, offset: u64, size: u64) {
        let slot = self
            .pending_root
            .get_mut(root_index as usize)
            .expect("root descriptor index out of the signature's range");
        *slot = Some((buffer, offset, size));
        self.root_dirty = true;
    }

    fn bind_descriptor_set(&mut self, bind_point: vk::PipelineBindPoint, set_index: u32, set: &dyn DescriptorSet) {
        let vk_set = set
            .as_any()
            .downcast_ref::<VulkanDescriptorSet>()
            .expect("descriptor set is not a vulkan object");
        let layout = self.root().layout;
        unsafe {
            self.cb.shared.raw.cmd_bind_descriptor_sets(
                self.cb.raw,
                bind_point,
                layout,
                set_index,
                &[vk_set.raw],
                &[],
            );
        }
    }

    /// Writes pending root descriptors into a transient set and binds it.
    /// Runs before every draw/dispatch that follows a binding change.
    fn flush_root_descriptors(&mut self, bind_point: vk::PipelineBindPoint) {
        if !self.root_dirty {
            return;
        }
        self.root_dirty = false;
        let Some(root) = self.root.as_ref() else { return };
        let Some(layout) = root.root_desc_layout else {
            return;
        };
        let root_set_index = root.root_set_index;
        let pipeline_layout = root.layout;
        let set = self
            .cb
            .allocate_transient_set(layout)
            .unwrap_or_else(|err| panic!("root descriptor allocation failed: {err}"));
        let mut buffer_infos: SmallVec<[vk::DescriptorBufferInfo; 8]> = SmallVec::new();
        for entry in &self.pending_root {
            let (buffer, offset, size) =
                entry.expect("root descriptor left unbound before a draw or dispatch");
            buffer_infos.push(
                vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(offset)
                    .range(size),
            );
        }
        let writes: SmallVec<[vk::WriteDescriptorSet; 8]> = buffer_infos
            .iter()
            .enumerate()
            .map(|(index, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(index as u32)
                    .descriptor_type(self.root_descriptor_types[index])
                    .buffer_info(std::slice::from_ref(info))
            })
            .collect();
        unsafe {
            self.cb.shared.raw.update_descriptor_sets(&writes, &[]);
            self.cb.shared.raw.cmd_bind_descriptor_sets(
                self.cb.raw,
                bind_point,
                pipeline_layout,
                root_set_index,
                &[set],
                &[],
            );
        }
    }

    fn end_pass(&mut self) {
        self.cb.state = self
            .cb
            .state
            .end_pass()
            .unwrap_or_else(|err| panic!("{err}"));
    }
}

pub struct VulkanGraphicsEncoder<'a> {
    binding: EncoderBindingState<'a>,
}

impl Drop for VulkanGraphicsEncoder<'_> {
    fn drop(&mut self) {
        unsafe {
            self.binding
                .cb
                .shared
                .raw
                .cmd_end_render_pass(self.binding.cb.raw);
        }
        self.binding.end_pass();
    }
}

impl CommandEncoder for VulkanGraphicsEncoder<'_> {
    fn bind_root_signature(&mut self, root_signature: &dyn RootSignature) {
        self.binding.bind_root_signature(root_signature);
    }

    fn push_constant(&mut self, data: &[u8]) {
        self.binding.push_constant(data);
    }

    fn bind_root_descriptor(&mut self, root_index: u32, buffer: &dyn Buffer, offset: u64, size: u64) {
        let vk_buffer = buffer
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .expect("buffer is not a vulkan buffer");
        self.binding
            .bind_root_descriptor(root_index, vk_buffer.raw, offset, size);
    }

    fn bind_root_descriptor_view(&mut self, root_index: u32, view: &dyn BufferView) {
        let vk_view = view
            .as_any()
            .downcast_ref::<VulkanBufferView>()
            .expect("view is not a vulkan buffer view");
        self.binding
            .bind_root_descriptor(root_index, vk_view.raw_buffer, view.offset(), view.len());
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet) {
        self.binding
            .bind_descriptor_set(vk::PipelineBindPoint::GRAPHICS, set_index, set);
    }
}

impl GraphicsCommandEncoder for VulkanGraphicsEncoder<'_> {
    fn set_viewport(&mut self, viewport: Viewport) {
        let vk_viewport = vk::Viewport::default()
            .x(viewport.x)
            .y(viewport.y)
            .width(viewport.width)
            .height(viewport.height)
            .min_depth(viewport.min_depth)
            .max_depth(viewport.max_depth);
        unsafe {
            self.binding
                .cb
                .shared
                .raw
                .cmd_set_viewport(self.binding.cb.raw, 0, &[vk_viewport]);
        }
    }

    fn set_scissor(&mut self, rect: ScissorRect) {
        let vk_rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: rect.x as i32,
                y: rect.y as i32,
            },
            extent: vk::Extent2D {
                width: rect.width,
                height: rect.height,
            },
        };
        unsafe {
            self.binding
                .cb
                .shared
                .raw
                .cmd_set_scissor(self.binding.cb.raw, 0, &[vk_rect]);
        }
    }

    fn bind_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBufferBinding<'_>]) {
        let buffers: SmallVec<[vk::Buffer; 4]> = bindings
            .iter()
            .map(|b| {
                b.buffer
                    .as_any()
                    .downcast_ref::<VulkanBuffer>()
                    .expect("buffer is not a vulkan buffer")
                    .raw
            })
            .collect();
        let offsets: SmallVec<[u64; 4]> = bindings.iter().map(|b| b.offset).collect();
        unsafe {
            self.binding.cb.shared.raw.cmd_bind_vertex_buffers(
                self.binding.cb.raw,
                first_slot,
                &buffers,
                &offsets,
            );
        }
    }

    fn bind_index_buffer(&mut self, binding: IndexBufferBinding<'_>) {
        let buffer = binding
            .buffer
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .expect("buffer is not a vulkan buffer");
        unsafe {
            self.binding.cb.shared.raw.cmd_bind_index_buffer(
                self.binding.cb.raw,
                buffer.raw,
                binding.offset,
                convert::map_index_format(binding.format),
            );
        }
    }

    fn bind_pipeline(&mut self, pipeline: &dyn GraphicsPipelineState) {
        let vk_pipeline = pipeline
            .as_any()
            .downcast_ref::<VulkanGraphicsPipeline>()
            .expect("pipeline is not a vulkan object");
        unsafe {
            self.binding.cb.shared.raw.cmd_bind_pipeline(
                self.binding.cb.raw,
                vk::PipelineBindPoint::GRAPHICS,
                vk_pipeline.raw,
            );
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.binding
            .flush_root_descriptors(vk::PipelineBindPoint::GRAPHICS);
        unsafe {
            self.binding.cb.shared.raw.cmd_draw(
                self.binding.cb.raw,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.binding
            .flush_root_descriptors(vk::PipelineBindPoint::GRAPHICS);
        unsafe {
            self.binding.cb.shared.raw.cmd_draw_indexed(
                self.binding.cb.raw,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }
}

pub struct VulkanComputeEncoder<'a> {
    binding: EncoderBindingState<'a>,
}

impl Drop for VulkanComputeEncoder<'_> {
    fn drop(&mut self) {
        self.binding.end_pass();
    }
}

impl CommandEncoder for VulkanComputeEncoder<'_> {
    fn bind_root_signature(&mut self, root_signature: &dyn RootSignature) {
        self.binding.bind_root_signature(root_signature);
    }

    fn push_constant(&mut self, data: &[u8]) {
        self.binding.push_constant(data);
    }

    fn bind_root_descriptor(&mut self, root_index: u32, buffer: &dyn Buffer, offset: u64, size: u64) {
        let vk_buffer = buffer
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .expect("buffer is not a vulkan buffer");
        self.binding
            .bind_root_descriptor(root_index, vk_buffer.raw, offset, size);
    }

    fn bind_root_descriptor_view(&mut self, root_index: u32, view: &dyn BufferView) {
        let vk_view = view
            .as_any()
            .downcast_ref::<VulkanBufferView>()
            .expect("view is not a vulkan buffer view");
        self.binding
            .bind_root_descriptor(root_index, vk_view.raw_buffer, view.offset(), view.len());
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet) {
        self.binding
            .bind_descriptor_set(vk::PipelineBindPoint::COMPUTE, set_index, set);
    }
}

impl ComputeCommandEncoder for VulkanComputeEncoder<'_> {
    fn bind_pipeline(&mut self, pipeline: &dyn ComputePipelineState) {
        let vk_pipeline = pipeline
            .as_any()
            .downcast_ref::<VulkanComputePipeline>()
            .expect("pipeline is not a vulkan object");
        unsafe {
            self.binding.cb.shared.raw.cmd_bind_pipeline(
                self.binding.cb.raw,
                vk::PipelineBindPoint::COMPUTE,
                vk_pipeline.raw,
            );
        }
    }

    fn set_thread_group_size(&mut self, _x: u32, _y: u32, _z: u32) {
        // The group size is baked into SPIR-V; Metal consumes it at encode
        // time. Nothing to record here.
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.binding
            .flush_root_descriptors(vk::PipelineBindPoint::COMPUTE);
        unsafe {
            self.binding
                .cb
                .shared
                .raw
                .cmd_dispatch(self.binding.cb.raw, x, y, z);
        }
    }
}
