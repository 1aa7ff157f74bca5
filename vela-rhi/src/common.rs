//! Enums and small value types shared across the whole RHI surface.

use bitflags::bitflags;

/// Native API a device is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Dx12,
    Vulkan,
    Metal,
}

/// Hardware queue families exposed by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Graphics + compute + copy.
    Direct,
    /// Async compute.
    Compute,
    /// Transfer only.
    Copy,
}

impl QueueType {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            Self::Direct => 0,
            Self::Compute => 1,
            Self::Copy => 2,
        }
    }
}

/// Upper bound on queue slots a device exposes per [`QueueType`].
pub const MAX_QUEUES_PER_TYPE: usize = 3;

/// Intermediate representation of a compiled shader blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderBlobCategory {
    Dxil,
    Spirv,
    Msl,
}

/// A single shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
}

bitflags! {
    /// Stage mask, used by bindings and root signatures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
        const COMPUTE = 1 << 2;
        const GRAPHICS = Self::VERTEX.bits() | Self::PIXEL.bits();
    }
}

impl Default for ShaderStages {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Pixel => Self::PIXEL,
            ShaderStage::Compute => Self::COMPUTE,
        }
    }
}

bitflags! {
    /// Uses a buffer may be put to. Doubles as the state space for barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUses: u32 {
        const MAP_READ = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const CBUFFER = 1 << 6;
        const STORAGE_RO = 1 << 7;
        const STORAGE_RW = 1 << 8;
        const INDIRECT = 1 << 9;
    }
}

impl Default for BufferUses {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Uses a texture may be put to. Doubles as the state space for barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUses: u32 {
        /// No defined contents yet; only legal as a barrier source.
        const UNINITIALIZED = 1 << 0;
        /// Presentable; only legal on swap-chain back buffers.
        const PRESENT = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
        /// Sampled / read in shaders.
        const RESOURCE = 1 << 4;
        const RENDER_TARGET = 1 << 5;
        const DEPTH_READ = 1 << 6;
        const DEPTH_WRITE = 1 << 7;
        const STORAGE_RO = 1 << 8;
        const STORAGE_RW = 1 << 9;
    }
}

impl Default for TextureUses {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Per-channel write mask for color targets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const COLOR = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const ALL = Self::COLOR.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWrites {
    fn default() -> Self {
        Self::ALL
    }
}

/// Kind tag carried by every GPU object. Closed set; see [`crate::device::RenderObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectTag {
    Device,
    Queue,
    CmdBuffer,
    CmdEncoder,
    Fence,
    Semaphore,
    Shader,
    RootSignature,
    GraphicsPipelineState,
    ComputePipelineState,
    SwapChain,
    Buffer,
    Texture,
    BufferView,
    TextureView,
    DescriptorSet,
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// What to do with an attachment's contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadAction {
    DontCare,
    Load,
    Clear,
}

/// What to do with an attachment's contents when a pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreAction {
    Store,
    Discard,
}

/// Host-observable state of a [`crate::device::Fence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Complete,
    Incomplete,
    NotSubmitted,
}

/// Swap-chain presentation pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentMode {
    Fifo,
    Immediate,
    Mailbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorClearValue {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorClearValue {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClearValue {
    pub depth: f32,
    pub stencil: u8,
}

impl Default for DepthStencilClearValue {
    fn default() -> Self {
        Self {
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Clear value attached to texture descriptors; must match the format family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color(ColorClearValue),
    DepthStencil(DepthStencilClearValue),
}

/// Value-typed sampler description. Backends may intern equal descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub address_s: AddressMode,
    pub address_t: AddressMode,
    pub address_r: AddressMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min: f32,
    pub lod_max: f32,
    pub compare: Option<CompareFunction>,
    pub anisotropy_clamp: u32,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            address_s: AddressMode::ClampToEdge,
            address_t: AddressMode::ClampToEdge,
            address_r: AddressMode::ClampToEdge,
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            lod_min: 0.0,
            lod_max: f32::MAX,
            compare: None,
            anisotropy_clamp: 1,
        }
    }
}

/// Adapter facts reported by a device.
#[derive(Debug, Clone)]
pub struct DeviceDetail {
    pub name: String,
    pub vram_bytes: u64,
    pub is_uma: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Dx12DeviceDescriptor {
    /// Adapter to bind, or `None` for the highest-performance one.
    pub adapter_index: Option<u32>,
    pub enable_debug_layer: bool,
    pub enable_gpu_based_validation: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MetalDeviceDescriptor {
    pub device_index: Option<u32>,
}

/// One `(queue type, count)` request for Vulkan device creation.
#[derive(Debug, Clone, Copy)]
pub struct QueueRequest {
    pub queue_type: QueueType,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct VulkanDeviceDescriptor {
    /// Physical device to bind, or `None` for the highest-performance one.
    pub physical_device_index: Option<u32>,
    pub queues: Vec<QueueRequest>,
}

/// Backend-tagged device creation descriptor.
#[derive(Debug, Clone)]
pub enum DeviceDescriptor {
    Dx12(Dx12DeviceDescriptor),
    Vulkan(VulkanDeviceDescriptor),
    Metal(MetalDeviceDescriptor),
}

impl DeviceDescriptor {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Dx12(_) => Backend::Dx12,
            Self::Vulkan(_) => Backend::Vulkan,
            Self::Metal(_) => Backend::Metal,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VulkanBackendInitDescriptor {
    pub enable_debug_layer: bool,
    pub enable_gpu_based_validation: bool,
}

/// Process-wide backend bootstrap descriptor, consumed by
/// [`crate::global_init_graphics`].
#[derive(Debug, Clone)]
pub enum BackendInitDescriptor {
    Dx12,
    Vulkan(VulkanBackendInitDescriptor),
    Metal,
}

impl BackendInitDescriptor {
    pub fn backend(&self) -> Backend {
        match self {
            Self::Dx12 => Backend::Dx12,
            Self::Vulkan(_) => Backend::Vulkan,
            Self::Metal => Backend::Metal,
        }
    }
}
