//! Fixed-function state and pipeline descriptors.

use crate::common::{
    BlendFactor, BlendOperation, ColorWrites, CompareFunction, CullMode, FrontFace,
    PolygonMode, PrimitiveTopology, StencilOperation,
};
use crate::device::{RootSignature, Shader};
use crate::error::{GfxError, GfxResult};
use crate::format::{TextureFormat, VertexFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

/// One attribute inside a vertex buffer layout. The semantic pair addresses
/// the shader's input signature (D3D12); `location` addresses SPIR-V.
#[derive(Debug, Clone)]
pub struct VertexElement {
    pub location: u32,
    pub semantic: String,
    pub semantic_index: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub step_mode: VertexStepMode,
    pub elements: Vec<VertexElement>,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale: f32,
    pub clamp: f32,
}

#[derive(Debug, Clone)]
pub struct PrimitiveState {
    pub topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub depth_bias: Option<DepthBias>,
    /// Disables depth clipping when set.
    pub unclipped_depth: bool,
    pub conservative_raster: bool,
}

impl Default for PrimitiveState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::Back,
            polygon_mode: PolygonMode::Fill,
            depth_bias: None,
            unclipped_depth: false,
            conservative_raster: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
}

impl DepthStencilState {
    pub fn depth_only(format: TextureFormat, compare: CompareFunction) -> Self {
        Self {
            format,
            depth_write_enabled: true,
            depth_compare: compare,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MultiSampleState {
    pub count: u32,
    pub mask: u64,
    pub alpha_to_coverage: bool,
}

impl Default for MultiSampleState {
    fn default() -> Self {
        Self {
            count: 1,
            mask: u64::MAX,
            alpha_to_coverage: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };

    pub const ALPHA_BLEND: Self = Self {
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrites,
}

impl ColorTargetState {
    pub fn opaque(format: TextureFormat) -> Self {
        Self {
            format,
            blend: None,
            write_mask: ColorWrites::ALL,
        }
    }
}

/// Immutable graphics pipeline description. The root signature and shaders
/// must stay alive for as long as the created pipeline does.
pub struct GraphicsPipelineDescriptor<'a> {
    pub label: Option<&'static str>,
    pub root_signature: &'a dyn RootSignature,
    pub vertex_shader: &'a dyn Shader,
    pub pixel_shader: Option<&'a dyn Shader>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub multisample: MultiSampleState,
    pub color_targets: Vec<ColorTargetState>,
}

pub struct ComputePipelineDescriptor<'a> {
    pub label: Option<&'static str>,
    pub root_signature: &'a dyn RootSignature,
    pub shader: &'a dyn Shader,
}

/// Checks that every element sits inside its buffer's declared stride and
/// that a depth-stencil state names a depth-stencil format. Backends run this
/// before translating the descriptor.
pub fn validate_graphics_pipeline(
    vertex_buffers: &[VertexBufferLayout],
    depth_stencil: Option<&DepthStencilState>,
    color_targets: &[ColorTargetState],
) -> GfxResult<()> {
    for (slot, layout) in vertex_buffers.iter().enumerate() {
        for element in &layout.elements {
            let end = element.offset as u64 + u64::from(element.format.size());
            if end > u64::from(layout.stride) {
                return Err(GfxError::invalid_argument(format!(
                    "vertex element '{}{}' ends at {end}, past stride {} of buffer {slot}",
                    element.semantic, element.semantic_index, layout.stride
                )));
            }
        }
    }
    if let Some(ds) = depth_stencil {
        if !ds.format.is_depth_stencil() {
            return Err(GfxError::invalid_argument(format!(
                "{:?} is not a depth-stencil format",
                ds.format
            )));
        }
    }
    for target in color_targets {
        if target.format.is_depth_stencil() {
            return Err(GfxError::invalid_argument(format!(
                "{:?} is not a color format",
                target.format
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(stride: u32, offset: u32, format: VertexFormat) -> VertexBufferLayout {
        VertexBufferLayout {
            stride,
            step_mode: VertexStepMode::Vertex,
            elements: vec![VertexElement {
                location: 0,
                semantic: "POSITION".to_string(),
                semantic_index: 0,
                format,
                offset,
            }],
        }
    }

    #[test]
    fn vertex_elements_must_fit_stride() {
        assert!(validate_graphics_pipeline(
            &[layout(12, 0, VertexFormat::Float32x3)],
            None,
            &[]
        )
        .is_ok());
        assert!(validate_graphics_pipeline(
            &[layout(12, 4, VertexFormat::Float32x3)],
            None,
            &[]
        )
        .is_err());
    }

    #[test]
    fn depth_state_requires_depth_format() {
        let ds = DepthStencilState::depth_only(TextureFormat::D32Float, CompareFunction::Less);
        assert!(validate_graphics_pipeline(&[], Some(&ds), &[]).is_ok());
        let bad = DepthStencilState::depth_only(TextureFormat::Rgba8Unorm, CompareFunction::Less);
        assert!(validate_graphics_pipeline(&[], Some(&bad), &[]).is_err());
    }

    #[test]
    fn color_targets_reject_depth_formats() {
        let target = ColorTargetState::opaque(TextureFormat::D32Float);
        assert!(validate_graphics_pipeline(&[], None, &[target]).is_err());
    }
}
