//! Mappings from RHI enums to their Vulkan equivalents.

use ash::vk;

use crate::common::{
    AddressMode, BlendFactor, BlendOperation, CompareFunction, CullMode, FilterMode, FrontFace,
    IndexFormat, LoadAction, PolygonMode, PrimitiveTopology, ShaderStages, StencilOperation,
    StoreAction,
};
use crate::format::{TextureFormat, VertexFormat};
use crate::pipeline::VertexStepMode;
use crate::reflection::ResourceBindType;

pub fn map_format(format: TextureFormat) -> vk::Format {
    use TextureFormat as F;
    match format {
        F::R8Sint => vk::Format::R8_SINT,
        F::R8Uint => vk::Format::R8_UINT,
        F::R8Snorm => vk::Format::R8_SNORM,
        F::R8Unorm => vk::Format::R8_UNORM,
        F::R16Sint => vk::Format::R16_SINT,
        F::R16Uint => vk::Format::R16_UINT,
        F::R16Snorm => vk::Format::R16_SNORM,
        F::R16Unorm => vk::Format::R16_UNORM,
        F::R16Float => vk::Format::R16_SFLOAT,
        F::Rg8Sint => vk::Format::R8G8_SINT,
        F::Rg8Uint => vk::Format::R8G8_UINT,
        F::Rg8Snorm => vk::Format::R8G8_SNORM,
        F::Rg8Unorm => vk::Format::R8G8_UNORM,
        F::R32Sint => vk::Format::R32_SINT,
        F::R32Uint => vk::Format::R32_UINT,
        F::R32Float => vk::Format::R32_SFLOAT,
        F::Rg16Sint => vk::Format::R16G16_SINT,
        F::Rg16Uint => vk::Format::R16G16_UINT,
        F::Rg16Snorm => vk::Format::R16G16_SNORM,
        F::Rg16Unorm => vk::Format::R16G16_UNORM,
        F::Rg16Float => vk::Format::R16G16_SFLOAT,
        F::Rgba8Sint => vk::Format::R8G8B8A8_SINT,
        F::Rgba8Uint => vk::Format::R8G8B8A8_UINT,
        F::Rgba8Snorm => vk::Format::R8G8B8A8_SNORM,
        F::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        F::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        F::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        F::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        F::Rgb10a2Uint => vk::Format::A2B10G10R10_UINT_PACK32,
        F::Rgb10a2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        F::Rg11b10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        F::Rg32Sint => vk::Format::R32G32_SINT,
        F::Rg32Uint => vk::Format::R32G32_UINT,
        F::Rg32Float => vk::Format::R32G32_SFLOAT,
        F::Rgba16Sint => vk::Format::R16G16B16A16_SINT,
        F::Rgba16Uint => vk::Format::R16G16B16A16_UINT,
        F::Rgba16Snorm => vk::Format::R16G16B16A16_SNORM,
        F::Rgba16Unorm => vk::Format::R16G16B16A16_UNORM,
        F::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        F::Rgba32Sint => vk::Format::R32G32B32A32_SINT,
        F::Rgba32Uint => vk::Format::R32G32B32A32_UINT,
        F::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        F::S8 => vk::Format::S8_UINT,
        F::D16Unorm => vk::Format::D16_UNORM,
        F::D32Float => vk::Format::D32_SFLOAT,
        F::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        F::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub fn format_aspect(format: TextureFormat) -> vk::ImageAspectFlags {
    let mut aspect = vk::ImageAspectFlags::empty();
    if format.has_depth() {
        aspect |= vk::ImageAspectFlags::DEPTH;
    }
    if format.has_stencil() {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }
    if aspect.is_empty() {
        aspect = vk::ImageAspectFlags::COLOR;
    }
    aspect
}

pub fn map_vertex_format(format: VertexFormat) -> vk::Format {
    use VertexFormat as F;
    match format {
        F::Uint8x2 => vk::Format::R8G8_UINT,
        F::Uint8x4 => vk::Format::R8G8B8A8_UINT,
        F::Sint8x2 => vk::Format::R8G8_SINT,
        F::Sint8x4 => vk::Format::R8G8B8A8_SINT,
        F::Unorm8x2 => vk::Format::R8G8_UNORM,
        F::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
        F::Snorm8x2 => vk::Format::R8G8_SNORM,
        F::Snorm8x4 => vk::Format::R8G8B8A8_SNORM,
        F::Uint16x2 => vk::Format::R16G16_UINT,
        F::Uint16x4 => vk::Format::R16G16B16A16_UINT,
        F::Sint16x2 => vk::Format::R16G16_SINT,
        F::Sint16x4 => vk::Format::R16G16B16A16_SINT,
        F::Unorm16x2 => vk::Format::R16G16_UNORM,
        F::Unorm16x4 => vk::Format::R16G16B16A16_UNORM,
        F::Snorm16x2 => vk::Format::R16G16_SNORM,
        F::Snorm16x4 => vk::Format::R16G16B16A16_SNORM,
        F::Float16x2 => vk::Format::R16G16_SFLOAT,
        F::Float16x4 => vk::Format::R16G16B16A16_SFLOAT,
        F::Uint32 => vk::Format::R32_UINT,
        F::Uint32x2 => vk::Format::R32G32_UINT,
        F::Uint32x3 => vk::Format::R32G32B32_UINT,
        F::Uint32x4 => vk::Format::R32G32B32A32_UINT,
        F::Sint32 => vk::Format::R32_SINT,
        F::Sint32x2 => vk::Format::R32G32_SINT,
        F::Sint32x3 => vk::Format::R32G32B32_SINT,
        F::Sint32x4 => vk::Format::R32G32B32A32_SINT,
        F::Float32 => vk::Format::R32_SFLOAT,
        F::Float32x2 => vk::Format::R32G32_SFLOAT,
        F::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        F::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub fn map_shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::PIXEL) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

/// Descriptor type of a set element. Root descriptors use the same mapping.
pub fn map_descriptor_type(bind_type: ResourceBindType) -> vk::DescriptorType {
    match bind_type {
        ResourceBindType::CBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceBindType::Buffer | ResourceBindType::RwBuffer => {
            vk::DescriptorType::STORAGE_BUFFER
        }
        ResourceBindType::Texture => vk::DescriptorType::SAMPLED_IMAGE,
        ResourceBindType::RwTexture => vk::DescriptorType::STORAGE_IMAGE,
        ResourceBindType::Sampler => vk::DescriptorType::SAMPLER,
    }
}

pub fn map_filter(filter: FilterMode) -> vk::Filter {
    match filter {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub fn map_mipmap_filter(filter: FilterMode) -> vk::SamplerMipmapMode {
    match filter {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn map_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

pub fn map_compare(compare: CompareFunction) -> vk::CompareOp {
    match compare {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn map_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn map_front_face(front: FrontFace) -> vk::FrontFace {
    match front {
        FrontFace::Ccw => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Cw => vk::FrontFace::CLOCKWISE,
    }
}

pub fn map_cull_mode(cull: CullMode) -> vk::CullModeFlags {
    match cull {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn map_polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn map_stencil_op(op: StencilOperation) -> vk::StencilOp {
    match op {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::Invert => vk::StencilOp::INVERT,
        StencilOperation::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOperation::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOperation::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn map_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::Src => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrc => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::Dst => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDst => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::SrcAlphaSaturated => vk::BlendFactor::SRC_ALPHA_SATURATE,
        BlendFactor::Constant => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstant => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub fn map_blend_op(op: BlendOperation) -> vk::BlendOp {
    match op {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

pub fn map_index_format(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn map_load_op(action: LoadAction) -> vk::AttachmentLoadOp {
    match action {
        LoadAction::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        LoadAction::Load => vk::AttachmentLoadOp::LOAD,
        LoadAction::Clear => vk::AttachmentLoadOp::CLEAR,
    }
}

pub fn map_store_op(action: StoreAction) -> vk::AttachmentStoreOp {
    match action {
        StoreAction::Store => vk::AttachmentStoreOp::STORE,
        StoreAction::Discard => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn map_step_mode(mode: VertexStepMode) -> vk::VertexInputRate {
    match mode {
        VertexStepMode::Vertex => vk::VertexInputRate::VERTEX,
        VertexStepMode::Instance => vk::VertexInputRate::INSTANCE,
    }
}
