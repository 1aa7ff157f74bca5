//! Reflection records describing what a compiled shader binds.
//!
//! The RHI does not compile shaders; an external front end (DXC for HLSL,
//! SPIRV-Cross for the Metal path) produces a blob plus one of these records.
//! [`merge_shader_descs`] folds the per-stage records of one pipeline into a
//! single table the root-signature bridge consumes.

use crate::common::ShaderStages;
use crate::error::{GfxError, GfxResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableClass {
    Scalar,
    Vector,
    MatrixRows,
    MatrixColumns,
    Object,
    Struct,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableBaseType {
    Void,
    Bool,
    Int,
    UInt,
    Float,
    Half,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderTypeMember {
    pub name: String,
    /// Index into the owning record's type table.
    pub type_id: usize,
    pub offset: u32,
}

/// One entry of the type side table referenced by cbuffer variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderTypeDesc {
    pub name: String,
    pub class: VariableClass,
    pub base: VariableBaseType,
    pub rows: u32,
    pub columns: u32,
    /// Array element count; 0 when not an array.
    pub elements: u32,
    pub size: u32,
    pub members: Vec<ShaderTypeMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CBufferVariable {
    pub name: String,
    pub type_id: usize,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CBufferDesc {
    pub name: String,
    pub size: u32,
    pub variables: Vec<CBufferVariable>,
}

/// Raw resource classes as the HLSL compiler reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderInputType {
    CBuffer,
    TBuffer,
    Texture,
    Sampler,
    UavRwTyped,
    Structured,
    UavRwStructured,
    ByteAddress,
    UavRwByteAddress,
    RayAcceleration,
    UavFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceReturnType {
    #[default]
    Unknown,
    UNorm,
    SNorm,
    SInt,
    UInt,
    Float,
    Mixed,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SrvDimension {
    #[default]
    Unknown,
    Buffer,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMs,
    Texture2DMsArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
    BufferEx,
}

impl SrvDimension {
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::Buffer | Self::BufferEx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterComponentType {
    Unknown,
    Uint32,
    Sint32,
    Float32,
    Uint16,
    Sint16,
    Float16,
}

/// Binding classes the RHI itself distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBindType {
    CBuffer,
    Buffer,
    RwBuffer,
    Texture,
    RwTexture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResourceDesc {
    pub name: String,
    pub input_type: ShaderInputType,
    pub bind_point: u32,
    /// `u32::MAX` marks an unbounded array, which the RHI rejects.
    pub bind_count: u32,
    pub space: u32,
    pub return_type: ResourceReturnType,
    pub dimension: SrvDimension,
    pub stages: ShaderStages,
}

impl BoundResourceDesc {
    /// Folds the compiler's resource class and dimension into the RHI's
    /// binding classes. Buffer-dimensioned textures/UAVs are buffers.
    pub fn resource_bind_type(&self) -> Option<ResourceBindType> {
        match self.input_type {
            ShaderInputType::CBuffer | ShaderInputType::TBuffer => Some(ResourceBindType::CBuffer),
            ShaderInputType::Texture => {
                if self.dimension.is_buffer() {
                    Some(ResourceBindType::Buffer)
                } else {
                    Some(ResourceBindType::Texture)
                }
            }
            ShaderInputType::Sampler => Some(ResourceBindType::Sampler),
            ShaderInputType::UavRwTyped => {
                if self.dimension.is_buffer() {
                    Some(ResourceBindType::RwBuffer)
                } else {
                    Some(ResourceBindType::RwTexture)
                }
            }
            ShaderInputType::Structured | ShaderInputType::ByteAddress => {
                Some(ResourceBindType::Buffer)
            }
            ShaderInputType::UavRwStructured | ShaderInputType::UavRwByteAddress => {
                Some(ResourceBindType::RwBuffer)
            }
            ShaderInputType::RayAcceleration | ShaderInputType::UavFeedback => None,
        }
    }
}

/// Vertex-stage input signature element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInputDesc {
    pub semantic: String,
    pub semantic_index: u32,
    pub register: u32,
    pub component_type: RegisterComponentType,
    /// Component usage mask (bit N = component N).
    pub mask: u8,
}

/// Reflection of one HLSL-compiled stage.
#[derive(Debug, Clone, Default)]
pub struct HlslShaderDesc {
    pub constant_buffers: Vec<CBufferDesc>,
    pub bound_resources: Vec<BoundResourceDesc>,
    pub vertex_inputs: Vec<VertexInputDesc>,
    pub types: Vec<ShaderTypeDesc>,
    pub group_size: (u32, u32, u32),
    pub stage: ShaderStages,
}

impl HlslShaderDesc {
    pub fn find_cbuffer(&self, name: &str) -> Option<&CBufferDesc> {
        self.constant_buffers.iter().find(|cb| cb.name == name)
    }
}

/// One descriptor binding of a SPIR-V stage (set/binding model).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvBindingDesc {
    pub name: String,
    pub bind_type: ResourceBindType,
    pub set: u32,
    pub binding: u32,
    pub count: u32,
    pub stages: ShaderStages,
    /// Index into the record's `constant_buffers` for CBuffer bindings.
    pub cbuffer: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvPushConstantDesc {
    pub name: String,
    pub size: u32,
    pub stages: ShaderStages,
    pub cbuffer: Option<usize>,
}

/// Reflection of one SPIR-V stage.
#[derive(Debug, Clone, Default)]
pub struct SpirvShaderDesc {
    pub bindings: Vec<SpirvBindingDesc>,
    pub push_constant: Option<SpirvPushConstantDesc>,
    pub constant_buffers: Vec<CBufferDesc>,
    pub types: Vec<ShaderTypeDesc>,
    pub vertex_inputs: Vec<VertexInputDesc>,
    pub group_size: (u32, u32, u32),
    pub stage: ShaderStages,
}

/// A binding after folding all stages of one pipeline together.
#[derive(Debug, Clone)]
pub struct CombinedBinding {
    pub name: String,
    pub bind_type: ResourceBindType,
    pub slot: u32,
    pub space: u32,
    pub count: u32,
    pub stages: ShaderStages,
    /// Index into [`MergedShaderDesc::constant_buffers`].
    pub cbuffer: Option<usize>,
}

/// Stage-merged reflection, input to the root-signature bridge.
#[derive(Debug, Clone, Default)]
pub struct MergedShaderDesc {
    pub bindings: Vec<CombinedBinding>,
    pub constant_buffers: Vec<CBufferDesc>,
    pub types: Vec<ShaderTypeDesc>,
    pub vertex_inputs: Vec<VertexInputDesc>,
    pub group_size: (u32, u32, u32),
    pub stages: ShaderStages,
    /// Binding index of a push-constant block the source declared explicitly
    /// (SPIR-V). The bridge must place it as the root constant.
    pub explicit_push_constant: Option<usize>,
}

/// Structural equality of two type trees across two records.
fn types_equal(
    lhs_types: &[ShaderTypeDesc],
    lhs_id: usize,
    rhs_types: &[ShaderTypeDesc],
    rhs_id: usize,
) -> bool {
    let (Some(lhs), Some(rhs)) = (lhs_types.get(lhs_id), rhs_types.get(rhs_id)) else {
        return false;
    };
    if lhs.name != rhs.name
        || lhs.class != rhs.class
        || lhs.base != rhs.base
        || lhs.rows != rhs.rows
        || lhs.columns != rhs.columns
        || lhs.elements != rhs.elements
        || lhs.size != rhs.size
        || lhs.members.len() != rhs.members.len()
    {
        return false;
    }
    lhs.members.iter().zip(&rhs.members).all(|(lm, rm)| {
        lm.name == rm.name
            && lm.offset == rm.offset
            && types_equal(lhs_types, lm.type_id, rhs_types, rm.type_id)
    })
}

fn cbuffers_equal(
    lhs: &CBufferDesc,
    lhs_types: &[ShaderTypeDesc],
    rhs: &CBufferDesc,
    rhs_types: &[ShaderTypeDesc],
) -> bool {
    if lhs.name != rhs.name || lhs.size != rhs.size || lhs.variables.len() != rhs.variables.len() {
        return false;
    }
    lhs.variables.iter().zip(&rhs.variables).all(|(lv, rv)| {
        lv.name == rv.name
            && lv.offset == rv.offset
            && lv.size == rv.size
            && types_equal(lhs_types, lv.type_id, rhs_types, rv.type_id)
    })
}

/// Copies a type tree into `dst`, returning the new root id.
fn import_type(dst: &mut Vec<ShaderTypeDesc>, src: &[ShaderTypeDesc], id: usize) -> usize {
    let ty = &src[id];
    let members = ty
        .members
        .iter()
        .map(|m| ShaderTypeMember {
            name: m.name.clone(),
            type_id: import_type(dst, src, m.type_id),
            offset: m.offset,
        })
        .collect();
    dst.push(ShaderTypeDesc {
        name: ty.name.clone(),
        class: ty.class,
        base: ty.base,
        rows: ty.rows,
        columns: ty.columns,
        elements: ty.elements,
        size: ty.size,
        members,
    });
    dst.len() - 1
}

fn import_cbuffer(merged: &mut MergedShaderDesc, src_types: &[ShaderTypeDesc], cb: &CBufferDesc) -> usize {
    let variables = cb
        .variables
        .iter()
        .map(|v| CBufferVariable {
            name: v.name.clone(),
            type_id: import_type(&mut merged.types, src_types, v.type_id),
            offset: v.offset,
            size: v.size,
        })
        .collect();
    merged.constant_buffers.push(CBufferDesc {
        name: cb.name.clone(),
        size: cb.size,
        variables,
    });
    merged.constant_buffers.len() - 1
}

/// Folds per-stage HLSL reflection into one binding table.
///
/// Bindings that agree on (type, space, slot) merge with a stage-mask union;
/// disagreement on anything else, including cbuffer layout, is an error.
pub fn merge_shader_descs(descs: &[&HlslShaderDesc]) -> GfxResult<MergedShaderDesc> {
    if descs.is_empty() {
        return Err(GfxError::invalid_argument("no shader descs to merge"));
    }
    let mut merged = MergedShaderDesc::default();
    for desc in descs {
        merged.stages |= desc.stage;
        if desc.stage.contains(ShaderStages::VERTEX) {
            merged.vertex_inputs = desc.vertex_inputs.clone();
        }
        if desc.stage.contains(ShaderStages::COMPUTE) {
            merged.group_size = desc.group_size;
        }
        for bind in &desc.bound_resources {
            if bind.bind_count == 0 {
                return Err(GfxError::invalid_argument(format!(
                    "binding '{}' has zero bind count",
                    bind.name
                )));
            }
            if bind.bind_count == u32::MAX {
                return Err(GfxError::not_supported(format!(
                    "binding '{}' is an unbounded array",
                    bind.name
                )));
            }
            let Some(bind_type) = bind.resource_bind_type() else {
                return Err(GfxError::not_supported(format!(
                    "binding '{}' has an unsupported resource class",
                    bind.name
                )));
            };
            let existing = merged.bindings.iter().position(|b| {
                b.bind_type == bind_type && b.space == bind.space && b.slot == bind.bind_point
            });
            match existing {
                None => {
                    let cbuffer = if bind_type == ResourceBindType::CBuffer {
                        let cb = desc.find_cbuffer(&bind.name).ok_or_else(|| {
                            GfxError::invalid_argument(format!(
                                "binding '{}' has no matching cbuffer reflection",
                                bind.name
                            ))
                        })?;
                        Some(import_cbuffer(&mut merged, &desc.types, cb))
                    } else {
                        None
                    };
                    merged.bindings.push(CombinedBinding {
                        name: bind.name.clone(),
                        bind_type,
                        slot: bind.bind_point,
                        space: bind.space,
                        count: bind.bind_count,
                        stages: desc.stage,
                        cbuffer,
                    });
                }
                Some(idx) => {
                    let layout_matches = {
                        let b = &merged.bindings[idx];
                        b.name == bind.name && b.count == bind.bind_count
                    };
                    if !layout_matches {
                        return Err(GfxError::invalid_operation(format!(
                            "binding '{}' is declared with mismatched layouts across stages",
                            bind.name
                        )));
                    }
                    if bind_type == ResourceBindType::CBuffer {
                        let cb = desc.find_cbuffer(&bind.name).ok_or_else(|| {
                            GfxError::invalid_argument(format!(
                                "binding '{}' has no matching cbuffer reflection",
                                bind.name
                            ))
                        })?;
                        let merged_cb_idx = merged.bindings[idx]
                            .cbuffer
                            .expect("merged cbuffer binding lost its layout");
                        if !cbuffers_equal(
                            &merged.constant_buffers[merged_cb_idx],
                            &merged.types,
                            cb,
                            &desc.types,
                        ) {
                            return Err(GfxError::invalid_operation(format!(
                                "cbuffer '{}' layout differs between stages",
                                bind.name
                            )));
                        }
                    }
                    merged.bindings[idx].stages |= desc.stage;
                }
            }
        }
    }
    Ok(merged)
}

/// Folds per-stage SPIR-V reflection into one binding table. The declared
/// push-constant block, if any, is carried through as an explicit entry.
pub fn merge_spirv_shader_descs(descs: &[&SpirvShaderDesc]) -> GfxResult<MergedShaderDesc> {
    if descs.is_empty() {
        return Err(GfxError::invalid_argument("no shader descs to merge"));
    }
    let mut merged = MergedShaderDesc::default();
    for desc in descs {
        merged.stages |= desc.stage;
        if desc.stage.contains(ShaderStages::VERTEX) {
            merged.vertex_inputs = desc.vertex_inputs.clone();
        }
        if desc.stage.contains(ShaderStages::COMPUTE) {
            merged.group_size = desc.group_size;
        }
        for bind in &desc.bindings {
            if bind.count == 0 {
                return Err(GfxError::invalid_argument(format!(
                    "binding '{}' has zero bind count",
                    bind.name
                )));
            }
            if bind.count == u32::MAX {
                return Err(GfxError::not_supported(format!(
                    "binding '{}' is an unbounded array",
                    bind.name
                )));
            }
            let existing = merged.bindings.iter().position(|b| {
                b.bind_type == bind.bind_type && b.space == bind.set && b.slot == bind.binding
            });
            match existing {
                None => {
                    let cbuffer = match bind.cbuffer {
                        Some(src_idx) => Some(import_cbuffer(
                            &mut merged,
                            &desc.types,
                            &desc.constant_buffers[src_idx],
                        )),
                        None => None,
                    };
                    merged.bindings.push(CombinedBinding {
                        name: bind.name.clone(),
                        bind_type: bind.bind_type,
                        slot: bind.binding,
                        space: bind.set,
                        count: bind.count,
                        stages: desc.stage,
                        cbuffer,
                    });
                }
                Some(idx) => {
                    if merged.bindings[idx].name != bind.name
                        || merged.bindings[idx].count != bind.count
                    {
                        return Err(GfxError::invalid_operation(format!(
                            "binding '{}' is declared with mismatched layouts across stages",
                            bind.name
                        )));
                    }
                    merged.bindings[idx].stages |= desc.stage;
                }
            }
        }
        if let Some(push) = &desc.push_constant {
            match merged.explicit_push_constant {
                None => {
                    let cbuffer = match push.cbuffer {
                        Some(src_idx) => Some(import_cbuffer(
                            &mut merged,
                            &desc.types,
                            &desc.constant_buffers[src_idx],
                        )),
                        None => None,
                    };
                    merged.bindings.push(CombinedBinding {
                        name: push.name.clone(),
                        bind_type: ResourceBindType::CBuffer,
                        slot: 0,
                        space: 0,
                        count: 1,
                        stages: desc.stage,
                        cbuffer,
                    });
                    merged.explicit_push_constant = Some(merged.bindings.len() - 1);
                }
                Some(idx) => {
                    if merged.bindings[idx].name != push.name {
                        return Err(GfxError::invalid_operation(
                            "push constant blocks differ between stages".to_string(),
                        ));
                    }
                    merged.bindings[idx].stages |= desc.stage;
                }
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float4_type() -> ShaderTypeDesc {
        ShaderTypeDesc {
            name: "float4".to_string(),
            class: VariableClass::Vector,
            base: VariableBaseType::Float,
            rows: 1,
            columns: 4,
            elements: 0,
            size: 16,
            members: Vec::new(),
        }
    }

    fn cbuffer_desc(name: &str) -> CBufferDesc {
        CBufferDesc {
            name: name.to_string(),
            size: 16,
            variables: vec![CBufferVariable {
                name: "tint".to_string(),
                type_id: 0,
                offset: 0,
                size: 16,
            }],
        }
    }

    fn stage_desc(stage: ShaderStages, cb_name: &str) -> HlslShaderDesc {
        HlslShaderDesc {
            constant_buffers: vec![cbuffer_desc(cb_name)],
            bound_resources: vec![BoundResourceDesc {
                name: cb_name.to_string(),
                input_type: ShaderInputType::CBuffer,
                bind_point: 0,
                bind_count: 1,
                space: 0,
                return_type: ResourceReturnType::Unknown,
                dimension: SrvDimension::Unknown,
                stages: stage,
            }],
            types: vec![float4_type()],
            stage,
            ..Default::default()
        }
    }

    #[test]
    fn merge_unions_stage_masks() {
        let vs = stage_desc(ShaderStages::VERTEX, "Globals");
        let ps = stage_desc(ShaderStages::PIXEL, "Globals");
        let merged = merge_shader_descs(&[&vs, &ps]).unwrap();
        assert_eq!(merged.bindings.len(), 1);
        assert_eq!(
            merged.bindings[0].stages,
            ShaderStages::VERTEX | ShaderStages::PIXEL
        );
        assert_eq!(merged.constant_buffers.len(), 1);
    }

    #[test]
    fn merge_rejects_layout_mismatch() {
        let vs = stage_desc(ShaderStages::VERTEX, "Globals");
        let mut ps = stage_desc(ShaderStages::PIXEL, "Globals");
        ps.constant_buffers[0].size = 32;
        ps.constant_buffers[0].variables[0].size = 32;
        let err = merge_shader_descs(&[&vs, &ps]).unwrap_err();
        assert!(matches!(err, GfxError::InvalidOperation(_)));
    }

    #[test]
    fn merge_rejects_unbounded_arrays() {
        let mut vs = stage_desc(ShaderStages::VERTEX, "Globals");
        vs.bound_resources.push(BoundResourceDesc {
            name: "g_Textures".to_string(),
            input_type: ShaderInputType::Texture,
            bind_point: 0,
            bind_count: u32::MAX,
            space: 1,
            return_type: ResourceReturnType::Float,
            dimension: SrvDimension::Texture2D,
            stages: ShaderStages::VERTEX,
        });
        let err = merge_shader_descs(&[&vs]).unwrap_err();
        assert!(matches!(err, GfxError::NotSupported(_)));
    }

    #[test]
    fn buffer_dimension_maps_to_buffer_binding() {
        let bind = BoundResourceDesc {
            name: "g_Data".to_string(),
            input_type: ShaderInputType::Texture,
            bind_point: 0,
            bind_count: 1,
            space: 0,
            return_type: ResourceReturnType::Float,
            dimension: SrvDimension::Buffer,
            stages: ShaderStages::PIXEL,
        };
        assert_eq!(bind.resource_bind_type(), Some(ResourceBindType::Buffer));
        let tex = BoundResourceDesc {
            dimension: SrvDimension::Texture2D,
            ..bind
        };
        assert_eq!(tex.resource_bind_type(), Some(ResourceBindType::Texture));
    }

    #[test]
    fn spirv_merge_carries_push_constant() {
        let desc = SpirvShaderDesc {
            push_constant: Some(SpirvPushConstantDesc {
                name: "Push".to_string(),
                size: 16,
                stages: ShaderStages::COMPUTE,
                cbuffer: Some(0),
            }),
            constant_buffers: vec![cbuffer_desc("Push")],
            types: vec![float4_type()],
            stage: ShaderStages::COMPUTE,
            ..Default::default()
        };
        let merged = merge_spirv_shader_descs(&[&desc]).unwrap();
        let idx = merged.explicit_push_constant.unwrap();
        assert_eq!(merged.bindings[idx].name, "Push");
        assert_eq!(merged.bindings[idx].bind_type, ResourceBindType::CBuffer);
    }
}
