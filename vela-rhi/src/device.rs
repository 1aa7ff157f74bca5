//! The object model of the RHI: device, queues, command recording, sync
//! primitives, resources and the swap chain, all as backend-implemented
//! traits. Backends are selected at device creation; callers only ever see
//! these traits.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::common::{
    Backend, ColorClearValue, DepthStencilClearValue, DeviceDetail, FenceState, IndexFormat,
    LoadAction, ObjectTag, QueueType, SamplerDescriptor, ShaderBlobCategory, ShaderStage,
    StoreAction,
};
#[cfg(feature = "window")]
use crate::common::PresentMode;
use crate::common::{BufferUses, TextureUses};
use crate::error::{GfxError, GfxResult};
use crate::format::TextureFormat;
use crate::pipeline::{ComputePipelineDescriptor, GraphicsPipelineDescriptor};
use crate::reflection::{HlslShaderDesc, SpirvShaderDesc};
use crate::resource::{
    BufferDescriptor, BufferViewDescriptor, MemoryType, SubresourceRange, TextureDescriptor,
    TextureViewDescriptor,
};
use crate::root_signature::RootSignatureDescriptor;

/// Monotonic per-device identity of a resource.
pub type ResourceId = u64;

/// Base contract of every GPU object: a kind tag, a validity bit, and an
/// idempotent `destroy`. A destroyed object is inert; native resources are
/// released when the owning handle drops.
pub trait RenderObject: Debug {
    fn tag(&self) -> ObjectTag;
    fn is_valid(&self) -> bool;
    fn destroy(&self);
}

/// Record-time lifecycle of a command buffer. Transitions are linear:
///
/// ```text
/// Initial → begin → Recording → begin_pass → RecordingPass
/// RecordingPass → end_pass → Recording → end → Executable
/// Executable → submit → Pending → (fence signals) → Executable
/// ```
///
/// Any other transition is a programmer error; backends panic on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Initial,
    Recording,
    RecordingPass,
    Executable,
    Pending,
}

impl RecordState {
    pub fn begin(self) -> GfxResult<Self> {
        match self {
            Self::Initial | Self::Executable => Ok(Self::Recording),
            _ => Err(self.bad_transition("begin")),
        }
    }

    pub fn begin_pass(self) -> GfxResult<Self> {
        match self {
            Self::Recording => Ok(Self::RecordingPass),
            _ => Err(self.bad_transition("begin a pass")),
        }
    }

    pub fn end_pass(self) -> GfxResult<Self> {
        match self {
            Self::RecordingPass => Ok(Self::Recording),
            _ => Err(self.bad_transition("end a pass")),
        }
    }

    pub fn end(self) -> GfxResult<Self> {
        match self {
            Self::Recording => Ok(Self::Executable),
            _ => Err(self.bad_transition("end")),
        }
    }

    pub fn submit(self) -> GfxResult<Self> {
        match self {
            Self::Executable => Ok(Self::Pending),
            _ => Err(self.bad_transition("submit")),
        }
    }

    pub fn complete(self) -> GfxResult<Self> {
        match self {
            Self::Pending => Ok(Self::Executable),
            _ => Err(self.bad_transition("complete")),
        }
    }

    /// True while plain (non-pass) commands are accepted.
    pub fn accepts_commands(self) -> bool {
        self == Self::Recording
    }

    fn bad_transition(self, what: &str) -> GfxError {
        GfxError::invalid_operation(format!(
            "cannot {what} a command buffer in state {self:?}"
        ))
    }
}

/// Shader blob plus the reflection record the external compiler produced.
#[derive(Debug, Clone)]
pub enum ShaderReflection {
    Hlsl(HlslShaderDesc),
    Spirv(SpirvShaderDesc),
}

#[derive(Debug)]
pub struct ShaderDescriptor<'a> {
    pub label: Option<&'static str>,
    pub blob: &'a [u8],
    pub category: ShaderBlobCategory,
    pub stage: ShaderStage,
    pub entry_point: &'a str,
    pub reflection: ShaderReflection,
}

pub trait Shader: RenderObject + Send + Sync {
    fn stage(&self) -> ShaderStage;
    fn category(&self) -> ShaderBlobCategory;
    fn entry_point(&self) -> &str;
    fn reflection(&self) -> &ShaderReflection;
    fn as_any(&self) -> &dyn Any;
}

pub trait RootSignature: RenderObject + Send + Sync {
    /// The backend-neutral descriptor this signature was built from.
    fn descriptor(&self) -> &RootSignatureDescriptor;
    fn as_any(&self) -> &dyn Any;
}

pub trait GraphicsPipelineState: RenderObject + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait ComputePipelineState: RenderObject + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait Buffer: RenderObject + Send + Sync {
    fn id(&self) -> ResourceId;
    fn size(&self) -> u64;
    fn memory_type(&self) -> MemoryType;
    fn usage(&self) -> BufferUses;

    /// Maps `size` bytes at `offset` for CPU access. Only Upload and Readback
    /// memory is mappable; the pointer stays valid until [`unmap`](Self::unmap).
    fn map(&self, offset: u64, size: u64) -> GfxResult<*mut u8>;
    fn unmap(&self, offset: u64, size: u64);

    /// Convenience write through [`map`](Self::map) for Upload buffers.
    fn write(&self, offset: u64, data: &[u8]) -> GfxResult<()> {
        let ptr = self.map(offset, data.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        self.unmap(offset, data.len() as u64);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

pub trait Texture: RenderObject + Send + Sync {
    fn id(&self) -> ResourceId;
    fn format(&self) -> TextureFormat;
    /// `(width, height, depth)` of mip 0.
    fn extent(&self) -> (u32, u32, u32);
    fn array_layers(&self) -> u32;
    fn mip_levels(&self) -> u32;
    fn sample_count(&self) -> u32;
    fn usage(&self) -> TextureUses;
    fn as_any(&self) -> &dyn Any;
}

/// Anything a descriptor set element can reference: buffer views, texture
/// views and samplers.
pub trait ResourceView: RenderObject {
    /// Identity of the viewed resource; 0 for samplers.
    fn resource_id(&self) -> ResourceId;
    fn as_any(&self) -> &dyn Any;
}

pub trait BufferView: ResourceView {
    fn offset(&self) -> u64;
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn as_resource_view(&self) -> &dyn ResourceView;
}

pub trait TextureView: ResourceView {
    fn format(&self) -> TextureFormat;
    fn range(&self) -> SubresourceRange;
    fn as_resource_view(&self) -> &dyn ResourceView;
}

pub trait Sampler: ResourceView {
    fn as_resource_view(&self) -> &dyn ResourceView;
}

/// Runtime binding table of one descriptor set of a root signature. Writes
/// happen immediately; the set must be fully populated before it is bound.
pub trait DescriptorSet: RenderObject {
    fn set_resource(
        &mut self,
        element: u32,
        array_index: u32,
        view: &dyn ResourceView,
    ) -> GfxResult<()>;
    /// True once every element slot holds a view (or a static sampler).
    fn is_complete(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

pub trait Fence: RenderObject + Send + Sync {
    fn state(&self) -> FenceState;
    /// Blocks the calling thread until the fence signals.
    fn wait(&self) -> GfxResult<()>;
    fn as_any(&self) -> &dyn Any;
}

pub trait Semaphore: RenderObject + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Which side of a queue-ownership handoff this barrier encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffDirection {
    /// The resource arrives from `other`.
    From,
    /// The resource leaves toward `other`.
    To,
}

#[derive(Clone, Copy)]
pub struct QueueHandoff<'a> {
    pub other: &'a dyn CommandQueue,
    pub direction: HandoffDirection,
}

pub struct BufferBarrier<'a> {
    pub buffer: &'a dyn Buffer,
    pub before: BufferUses,
    pub after: BufferUses,
    pub handoff: Option<QueueHandoff<'a>>,
}

pub struct TextureBarrier<'a> {
    pub texture: &'a dyn Texture,
    pub before: TextureUses,
    pub after: TextureUses,
    pub handoff: Option<QueueHandoff<'a>>,
    /// `None` transitions every subresource.
    pub range: Option<SubresourceRange>,
}

#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy)]
pub struct VertexBufferBinding<'a> {
    pub buffer: &'a dyn Buffer,
    pub offset: u64,
}

#[derive(Clone, Copy)]
pub struct IndexBufferBinding<'a> {
    pub buffer: &'a dyn Buffer,
    pub offset: u64,
    pub format: IndexFormat,
}

pub struct ColorAttachment<'a> {
    pub view: &'a dyn TextureView,
    pub load: LoadAction,
    pub store: StoreAction,
    pub clear: ColorClearValue,
}

pub struct DepthStencilAttachment<'a> {
    pub view: &'a dyn TextureView,
    pub depth_load: LoadAction,
    pub depth_store: StoreAction,
    pub stencil_load: LoadAction,
    pub stencil_store: StoreAction,
    pub clear: DepthStencilClearValue,
}

pub struct RenderPassDescriptor<'a> {
    pub label: Option<&'static str>,
    pub color_attachments: &'a [ColorAttachment<'a>],
    pub depth_stencil: Option<DepthStencilAttachment<'a>>,
}

/// Source layout of a buffer→texture copy.
#[derive(Debug, Clone, Copy)]
pub struct BufferTextureCopyLayout {
    pub offset: u64,
    /// Bytes per row in the buffer; 0 means tightly packed.
    pub bytes_per_row: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureCopySlice {
    pub mip_level: u32,
    pub array_layer: u32,
    pub origin: (u32, u32, u32),
}

/// Binding operations shared by graphics and compute encoders. The bind
/// bridge drives these in root-signature order.
pub trait CommandEncoder {
    fn bind_root_signature(&mut self, root_signature: &dyn RootSignature);
    /// Writes the root constant block. `data.len()` must match the layout.
    fn push_constant(&mut self, data: &[u8]);
    fn bind_root_descriptor(&mut self, root_index: u32, buffer: &dyn Buffer, offset: u64, size: u64);
    /// Like [`bind_root_descriptor`](Self::bind_root_descriptor), addressed
    /// through an existing buffer view.
    fn bind_root_descriptor_view(&mut self, root_index: u32, view: &dyn BufferView);
    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet);
}

/// Pass-scoped recorder for draws. Dropping the encoder ends the pass.
pub trait GraphicsCommandEncoder: CommandEncoder {
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, rect: ScissorRect);
    fn bind_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBufferBinding<'_>]);
    fn bind_index_buffer(&mut self, binding: IndexBufferBinding<'_>);
    fn bind_pipeline(&mut self, pipeline: &dyn GraphicsPipelineState);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
}

/// Pass-scoped recorder for dispatches. Dropping the encoder ends the pass.
pub trait ComputeCommandEncoder: CommandEncoder {
    fn bind_pipeline(&mut self, pipeline: &dyn ComputePipelineState);
    /// Declares the thread-group shape for backends that need it at encode
    /// time (Metal). Elsewhere it is validated against the pipeline only.
    fn set_thread_group_size(&mut self, x: u32, y: u32, z: u32);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

/// Recorded GPU work. Single-threaded: recording and ending must happen on
/// one thread. See [`RecordState`] for the lifecycle.
pub trait CommandBuffer: RenderObject {
    fn state(&self) -> RecordState;

    /// Starts recording. A `Pending` buffer re-arms automatically once its
    /// tracking fence has signalled; beginning before that panics.
    fn begin(&mut self) -> GfxResult<()>;
    fn end(&mut self) -> GfxResult<()>;

    /// Legal only while `Recording` (outside passes).
    fn resource_barrier(&mut self, buffers: &[BufferBarrier<'_>], textures: &[TextureBarrier<'_>]);
    fn copy_buffer_to_buffer(
        &mut self,
        src: &dyn Buffer,
        src_offset: u64,
        dst: &dyn Buffer,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &mut self,
        src: &dyn Buffer,
        src_layout: BufferTextureCopyLayout,
        dst: &dyn Texture,
        dst_slice: TextureCopySlice,
        extent: (u32, u32, u32),
    );

    /// Opens a render pass. One pass at a time; the encoder borrows the
    /// buffer until dropped.
    fn begin_render_pass<'a>(
        &'a mut self,
        desc: &RenderPassDescriptor<'_>,
    ) -> Box<dyn GraphicsCommandEncoder + 'a>;
    fn begin_compute_pass<'a>(&'a mut self) -> Box<dyn ComputeCommandEncoder + 'a>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub trait CommandQueue: RenderObject + Send + Sync {
    fn queue_type(&self) -> QueueType;

    /// Submits recorded buffers in order. Wait semaphores gate execution,
    /// signal semaphores and the fence fire on completion. Buffers move to
    /// `Pending` and re-arm when the submission's fence signals.
    fn submit(
        &self,
        command_buffers: &mut [&mut dyn CommandBuffer],
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> GfxResult<()>;

    /// Queue-attached present of the swap chain's current back buffer.
    #[cfg(feature = "window")]
    fn present(
        &self,
        swap_chain: &mut dyn SwapChain,
        wait_semaphores: &[&dyn Semaphore],
    ) -> GfxResult<()>;

    /// Blocking host-side queue drain.
    fn wait_idle(&self) -> GfxResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(feature = "window")]
pub struct SwapChainDescriptor<'a> {
    pub present_queue: &'a dyn CommandQueue,
    pub window: raw_window_handle::RawWindowHandle,
    pub display: raw_window_handle::RawDisplayHandle,
    pub width: u32,
    pub height: u32,
    /// Ring size; at least two.
    pub back_buffer_count: u32,
    pub format: TextureFormat,
    pub present_mode: PresentMode,
}

/// Back-buffer ring. The chain owns its textures; the caller observes them
/// but must not destroy them. Resize is destroy + recreate after a drain.
#[cfg(feature = "window")]
pub trait SwapChain: RenderObject {
    fn format(&self) -> TextureFormat;
    fn extent(&self) -> (u32, u32);
    fn back_buffer_count(&self) -> u32;

    /// Blocks until the backend hands out the next back buffer, then records
    /// it as current. `signal_semaphore` fires when the image is ready;
    /// `wait_fence` additionally gates the host.
    fn acquire_next(
        &mut self,
        signal_semaphore: Option<&dyn Semaphore>,
        wait_fence: Option<&dyn Fence>,
    ) -> GfxResult<u32>;

    fn back_buffer(&self, index: u32) -> &dyn Texture;
    /// Render-target view of a back buffer, owned by the chain.
    fn back_buffer_view(&self, index: u32) -> &dyn TextureView;

    /// Defined only between `acquire_next` and the matching present.
    fn current_index(&self) -> Option<u32>;
    fn current_back_buffer(&self) -> Option<&dyn Texture>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Pure acquire/present bookkeeping shared by swap chain implementations.
#[derive(Debug, Clone)]
pub struct BackBufferRing {
    count: u32,
    current: Option<u32>,
    presented: u64,
}

impl BackBufferRing {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            current: None,
            presented: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn acquire(&mut self, index: u32) -> GfxResult<()> {
        if index >= self.count {
            return Err(GfxError::invalid_argument(format!(
                "back buffer index {index} out of ring of {}",
                self.count
            )));
        }
        if self.current.is_some() {
            return Err(GfxError::invalid_operation(
                "acquire while a back buffer is already outstanding".to_string(),
            ));
        }
        self.current = Some(index);
        Ok(())
    }

    pub fn present(&mut self) -> GfxResult<u32> {
        let index = self.current.take().ok_or_else(|| {
            GfxError::invalid_operation("present without an acquired back buffer".to_string())
        })?;
        self.presented += 1;
        Ok(index)
    }
}

/// A device bound to one physical GPU on one backend. Owns its queues and
/// native allocators, and outlives every object it produces.
///
/// Thread safety: read-only queries and resource creation are callable from
/// any thread; command buffers are single-threaded (see [`CommandBuffer`]).
pub trait Device: RenderObject + Send + Sync {
    fn backend(&self) -> Backend;
    fn detail(&self) -> &DeviceDetail;

    fn queue(&self, queue_type: QueueType, slot: u32) -> Option<Arc<dyn CommandQueue>>;

    fn create_command_buffer(&self, queue: &dyn CommandQueue) -> GfxResult<Box<dyn CommandBuffer>>;
    fn create_fence(&self) -> GfxResult<Box<dyn Fence>>;
    fn create_semaphore(&self) -> GfxResult<Box<dyn Semaphore>>;
    /// Blocks until every listed fence has signalled.
    fn wait_fences(&self, fences: &[&dyn Fence]) -> GfxResult<()>;

    fn create_buffer(&self, desc: &BufferDescriptor) -> GfxResult<Box<dyn Buffer>>;
    fn create_texture(&self, desc: &TextureDescriptor) -> GfxResult<Box<dyn Texture>>;
    /// Views borrow the resource: the caller keeps the underlying buffer or
    /// texture alive for the view's lifetime, and destroying the resource
    /// while views exist is a programming error. The handles are shared so
    /// binding tables can retain them without owning the resource.
    fn create_buffer_view(
        &self,
        buffer: &dyn Buffer,
        desc: &BufferViewDescriptor,
    ) -> GfxResult<Arc<dyn BufferView>>;
    fn create_texture_view(
        &self,
        texture: &dyn Texture,
        desc: &TextureViewDescriptor,
    ) -> GfxResult<Arc<dyn TextureView>>;
    fn create_sampler(&self, desc: &SamplerDescriptor) -> GfxResult<Arc<dyn Sampler>>;

    fn create_shader(&self, desc: &ShaderDescriptor<'_>) -> GfxResult<Box<dyn Shader>>;
    fn create_root_signature(
        &self,
        desc: &RootSignatureDescriptor,
    ) -> GfxResult<Box<dyn RootSignature>>;
    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor<'_>,
    ) -> GfxResult<Box<dyn GraphicsPipelineState>>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor<'_>,
    ) -> GfxResult<Box<dyn ComputePipelineState>>;
    /// Instantiates descriptor set `set_index` of a root signature.
    fn create_descriptor_set(
        &self,
        root_signature: &dyn RootSignature,
        set_index: u32,
    ) -> GfxResult<Box<dyn DescriptorSet>>;

    #[cfg(feature = "window")]
    fn create_swap_chain(&self, desc: &SwapChainDescriptor<'_>) -> GfxResult<Box<dyn SwapChain>>;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_state_happy_path() {
        let state = RecordState::Initial;
        let state = state.begin().unwrap();
        let state = state.begin_pass().unwrap();
        let state = state.end_pass().unwrap();
        let state = state.end().unwrap();
        assert_eq!(state, RecordState::Executable);
        let state = state.submit().unwrap();
        assert_eq!(state, RecordState::Pending);
        let state = state.complete().unwrap();
        let state = state.begin().unwrap();
        assert_eq!(state, RecordState::Recording);
    }

    #[test]
    fn record_state_empty_buffer_is_submittable() {
        let state = RecordState::Initial.begin().unwrap().end().unwrap();
        assert!(state.submit().is_ok());
    }

    #[test]
    fn record_state_rejects_illegal_transitions() {
        assert!(RecordState::Initial.end().is_err());
        assert!(RecordState::Initial.begin_pass().is_err());
        assert!(RecordState::Recording.begin().is_err());
        assert!(RecordState::Recording.submit().is_err());
        assert!(RecordState::RecordingPass.begin_pass().is_err());
        assert!(RecordState::RecordingPass.end().is_err());
        assert!(RecordState::Executable.end().is_err());
        assert!(RecordState::Pending.begin().is_err());
        assert!(RecordState::Pending.submit().is_err());
    }

    #[test]
    fn back_buffer_ring_cycles() {
        let mut ring = BackBufferRing::new(2);
        let mut presents = [0u32; 2];
        let mut seen = Vec::new();
        for i in 0..4 {
            let index = i % 2;
            ring.acquire(index).unwrap();
            assert_eq!(ring.current(), Some(index));
            seen.push(index);
            let presented = ring.present().unwrap();
            presents[presented as usize] += 1;
        }
        assert_eq!(seen, [0, 1, 0, 1]);
        assert_eq!(presents, [2, 2]);
        assert_eq!(ring.presented(), 4);
        assert_eq!(ring.current(), None);
    }

    #[test]
    fn back_buffer_ring_guards_misuse() {
        let mut ring = BackBufferRing::new(2);
        assert!(ring.present().is_err());
        ring.acquire(0).unwrap();
        assert!(ring.acquire(1).is_err());
        assert!(ring.acquire(5).is_err());
        ring.present().unwrap();
    }
}
