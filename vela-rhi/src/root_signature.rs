//! Backend-neutral root signature description and the bridge that classifies
//! reflected bindings into root constants, root descriptors and descriptor
//! sets under the 64-DWORD root budget.

use std::collections::{BTreeMap, HashMap};

use crate::common::{SamplerDescriptor, ShaderStages};
use crate::error::{GfxError, GfxResult};
use crate::reflection::{MergedShaderDesc, ResourceBindType};

/// Root signature cost ceiling, in 4-byte words.
pub const MAX_ROOT_SIGNATURE_DWORDS: u32 = 64;

/// Metal keeps the first vertex-stage buffer indices for inline constants and
/// root descriptors; vertex streams start above this offset. Compute argument
/// indices are not offset.
pub const METAL_VERTEX_BUFFER_SLOT_OFFSET: u32 = 16;

/// The single root constant block (D3D12 root constants / Vulkan push
/// constants / Metal inline constants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConstant {
    pub slot: u32,
    pub space: u32,
    /// Size in bytes, a multiple of four.
    pub size: u32,
    pub stages: ShaderStages,
}

/// An inline single-resource binding without descriptor-set indirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDescriptor {
    pub slot: u32,
    pub space: u32,
    pub bind_type: ResourceBindType,
    pub stages: ShaderStages,
}

/// One range of a descriptor set: `count` descriptors of one type starting at
/// `slot`. Adjacent reflected bindings of the same type are merged into one
/// element.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSetElement {
    pub slot: u32,
    pub space: u32,
    pub bind_type: ResourceBindType,
    pub count: u32,
    pub stages: ShaderStages,
    pub static_samplers: Vec<SamplerDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorSetLayoutDesc {
    pub elements: Vec<DescriptorSetElement>,
}

/// Backend-neutral root signature description, ordered root constant →
/// root descriptors → descriptor sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootSignatureDescriptor {
    pub constant: Option<RootConstant>,
    pub root_descriptors: Vec<RootDescriptor>,
    pub descriptor_sets: Vec<DescriptorSetLayoutDesc>,
    pub static_samplers: Vec<SamplerDescriptor>,
}

impl RootSignatureDescriptor {
    /// Union of every placed binding's stage mask.
    pub fn stages(&self) -> ShaderStages {
        let mut stages = self
            .constant
            .as_ref()
            .map(|c| c.stages)
            .unwrap_or_default();
        for rd in &self.root_descriptors {
            stages |= rd.stages;
        }
        for set in &self.descriptor_sets {
            for element in &set.elements {
                stages |= element.stages;
            }
        }
        stages
    }

    /// Root cost in DWORDs: constants by size, root descriptors at two each,
    /// one per descriptor set table pointer.
    pub fn cost_in_dwords(&self) -> u32 {
        let const_dwords = self.constant.as_ref().map(|c| c.size / 4).unwrap_or(0);
        const_dwords
            + self.root_descriptors.len() as u32 * 2
            + self.descriptor_sets.len() as u32
    }
}

/// Where one reflected binding ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingPlacement {
    PushConst {
        /// Size in bytes.
        size: u32,
    },
    RootDescriptor {
        root_index: u32,
    },
    DescriptorSet {
        set_index: u32,
        element_index: u32,
        /// Offset of this binding inside its merged element.
        array_base: u32,
    },
}

/// One reflected binding with its bridge-assigned id and placement.
#[derive(Debug, Clone)]
pub struct BindingEntry {
    pub id: u32,
    pub name: String,
    pub bind_type: ResourceBindType,
    pub slot: u32,
    pub space: u32,
    pub count: u32,
    pub stages: ShaderStages,
    /// Index into the merged reflection's constant buffer table.
    pub cbuffer: Option<usize>,
    pub placement: BindingPlacement,
}

/// Samplers to bake into the root signature instead of binding at runtime,
/// matched to reflected sampler bindings by name.
#[derive(Debug, Clone)]
pub struct StaticSamplerBinding {
    pub name: String,
    pub samplers: Vec<SamplerDescriptor>,
}

/// Output of the bridge: the neutral descriptor plus one entry per reflected
/// binding, addressable by name. Carries the cbuffer layouts so downstream
/// consumers need no further access to the reflection record.
#[derive(Debug, Clone, Default)]
pub struct BindingLayout {
    pub descriptor: RootSignatureDescriptor,
    pub bindings: Vec<BindingEntry>,
    pub constant_buffers: Vec<crate::reflection::CBufferDesc>,
    pub types: Vec<crate::reflection::ShaderTypeDesc>,
    name_to_id: HashMap<String, u32>,
}

impl BindingLayout {
    pub fn binding_id(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).copied()
    }

    pub fn binding(&self, id: u32) -> Option<&BindingEntry> {
        self.bindings.get(id as usize)
    }

    /// Classifies the merged reflection into placements. See module docs for
    /// the budget rules.
    pub fn build(
        merged: &MergedShaderDesc,
        static_samplers: &[StaticSamplerBinding],
    ) -> GfxResult<Self> {
        build_binding_layout(merged, static_samplers)
    }
}

fn bind_type_priority(bind_type: ResourceBindType) -> u32 {
    match bind_type {
        ResourceBindType::CBuffer => 0,
        ResourceBindType::Buffer => 1,
        ResourceBindType::RwBuffer => 2,
        ResourceBindType::Texture => 3,
        ResourceBindType::RwTexture => 4,
        ResourceBindType::Sampler => 5,
    }
}

fn stage_usage_score(stages: ShaderStages) -> u32 {
    stages.bits().count_ones()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Table,
    RootDescriptor,
    RootConstant,
}

struct TableBuild {
    sets: Vec<DescriptorSetLayoutDesc>,
    /// `(binding index, set index, element index, array base)`
    slots: Vec<(usize, u32, u32, u32)>,
}

fn build_tables(merged: &MergedShaderDesc, placements: &[Placement]) -> GfxResult<TableBuild> {
    let mut per_space: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, placement) in placements.iter().enumerate() {
        if *placement == Placement::Table {
            per_space
                .entry(merged.bindings[idx].space)
                .or_default()
                .push(idx);
        }
    }
    let mut build = TableBuild {
        sets: Vec::new(),
        slots: Vec::new(),
    };
    for (space, mut indices) in per_space {
        indices.sort_by(|&lhs, &rhs| {
            let l = &merged.bindings[lhs];
            let r = &merged.bindings[rhs];
            bind_type_priority(l.bind_type)
                .cmp(&bind_type_priority(r.bind_type))
                .then(l.slot.cmp(&r.slot))
                .then(l.name.cmp(&r.name))
        });
        let set_index = build.sets.len() as u32;
        let mut elements: Vec<DescriptorSetElement> = Vec::new();
        for idx in indices {
            let binding = &merged.bindings[idx];
            if let Some(current) = elements.last_mut() {
                if binding.bind_type == current.bind_type {
                    let expected = u64::from(current.slot) + u64::from(current.count);
                    if u64::from(binding.slot) < expected {
                        return Err(GfxError::invalid_operation(format!(
                            "register overlap at space {space} slot {}",
                            binding.slot
                        )));
                    }
                    if u64::from(binding.slot) == expected {
                        // Contiguous same-type bindings collapse into one range.
                        let array_base = current.count;
                        current.count = current.count.checked_add(binding.count).ok_or_else(
                            || GfxError::invalid_operation("descriptor range overflow"),
                        )?;
                        current.stages |= binding.stages;
                        build.slots.push((
                            idx,
                            set_index,
                            elements.len() as u32 - 1,
                            array_base,
                        ));
                        continue;
                    }
                }
            }
            build
                .slots
                .push((idx, set_index, elements.len() as u32, 0));
            elements.push(DescriptorSetElement {
                slot: binding.slot,
                space,
                bind_type: binding.bind_type,
                count: binding.count,
                stages: binding.stages,
                static_samplers: Vec::new(),
            });
        }
        build.sets.push(DescriptorSetLayoutDesc { elements });
    }
    Ok(build)
}

fn build_binding_layout(
    merged: &MergedShaderDesc,
    static_samplers: &[StaticSamplerBinding],
) -> GfxResult<BindingLayout> {
    let bindings = &merged.bindings;
    if bindings.is_empty() {
        return Ok(BindingLayout::default());
    }

    let mut placements = vec![Placement::Table; bindings.len()];

    // Root constant: an explicitly declared push-constant block wins;
    // otherwise the smallest (space, slot) cbuffer that fits the budget.
    let root_const_idx = match merged.explicit_push_constant {
        Some(idx) => {
            let binding = &bindings[idx];
            let size = binding
                .cbuffer
                .map(|cb| merged.constant_buffers[cb].size)
                .unwrap_or(0);
            if size == 0 || size % 4 != 0 || size > MAX_ROOT_SIGNATURE_DWORDS * 4 {
                return Err(GfxError::invalid_operation(format!(
                    "push constant block '{}' has unusable size {size}",
                    binding.name
                )));
            }
            Some(idx)
        }
        None => {
            let mut best: Option<usize> = None;
            for (idx, binding) in bindings.iter().enumerate() {
                if binding.bind_type != ResourceBindType::CBuffer || binding.count != 1 {
                    continue;
                }
                let Some(cb) = binding.cbuffer else { continue };
                let size = merged.constant_buffers[cb].size;
                if size == 0 || size % 4 != 0 || size > MAX_ROOT_SIGNATURE_DWORDS * 4 {
                    continue;
                }
                match best {
                    None => best = Some(idx),
                    Some(current) => {
                        let cur = &bindings[current];
                        if binding.space < cur.space
                            || (binding.space == cur.space && binding.slot < cur.slot)
                        {
                            best = Some(idx);
                        }
                    }
                }
            }
            best
        }
    };

    let mut root_constant: Option<RootConstant> = None;
    let mut root_const_dwords = 0u32;
    if let Some(idx) = root_const_idx {
        let binding = &bindings[idx];
        let size = merged.constant_buffers[binding.cbuffer.unwrap()].size;
        placements[idx] = Placement::RootConstant;
        root_const_dwords = size / 4;
        root_constant = Some(RootConstant {
            slot: binding.slot,
            space: binding.space,
            size,
            stages: binding.stages,
        });
    }

    // Root descriptor candidates: single-resource buffer-like bindings,
    // hottest first.
    let mut candidates: Vec<usize> = bindings
        .iter()
        .enumerate()
        .filter(|(idx, binding)| {
            placements[*idx] == Placement::Table
                && binding.count == 1
                && match binding.bind_type {
                    ResourceBindType::CBuffer => binding.cbuffer.is_some(),
                    ResourceBindType::Buffer | ResourceBindType::RwBuffer => true,
                    _ => false,
                }
        })
        .map(|(idx, _)| idx)
        .collect();
    candidates.sort_by(|&lhs, &rhs| {
        let l = &bindings[lhs];
        let r = &bindings[rhs];
        bind_type_priority(l.bind_type)
            .cmp(&bind_type_priority(r.bind_type))
            .then(stage_usage_score(r.stages).cmp(&stage_usage_score(l.stages)))
            .then(l.space.cmp(&r.space))
            .then(l.slot.cmp(&r.slot))
            .then(l.name.cmp(&r.name))
    });
    let mut selected = candidates;
    for &idx in &selected {
        placements[idx] = Placement::RootDescriptor;
    }

    let mut tables = build_tables(merged, &placements)?;
    let cost = |root_descs: usize, sets: usize, const_dwords: u32| {
        const_dwords + root_descs as u32 * 2 + sets as u32
    };
    let mut total = cost(selected.len(), tables.sets.len(), root_const_dwords);

    // Over budget: demote root descriptors starting from the least useful.
    while total > MAX_ROOT_SIGNATURE_DWORDS {
        if let Some(idx) = selected.pop() {
            placements[idx] = Placement::Table;
            tables = build_tables(merged, &placements)?;
            total = cost(selected.len(), tables.sets.len(), root_const_dwords);
            continue;
        }
        // Then the root constant, unless the source demands one.
        if let Some(idx) = root_const_idx {
            if merged.explicit_push_constant.is_some() {
                break;
            }
            if root_constant.take().is_some() {
                placements[idx] = Placement::Table;
                root_const_dwords = 0;
                tables = build_tables(merged, &placements)?;
                total = cost(selected.len(), tables.sets.len(), root_const_dwords);
                continue;
            }
        }
        break;
    }
    if total > MAX_ROOT_SIGNATURE_DWORDS {
        return Err(GfxError::invalid_operation(format!(
            "root signature cost {total} DWORDs exceeds the limit of {MAX_ROOT_SIGNATURE_DWORDS}"
        )));
    }

    // Stable root descriptor order for the backends.
    selected.sort_by(|&lhs, &rhs| {
        let l = &bindings[lhs];
        let r = &bindings[rhs];
        bind_type_priority(l.bind_type)
            .cmp(&bind_type_priority(r.bind_type))
            .then(l.space.cmp(&r.space))
            .then(l.slot.cmp(&r.slot))
            .then(l.name.cmp(&r.name))
    });
    let root_descriptors: Vec<RootDescriptor> = selected
        .iter()
        .map(|&idx| {
            let binding = &bindings[idx];
            RootDescriptor {
                slot: binding.slot,
                space: binding.space,
                bind_type: binding.bind_type,
                stages: binding.stages,
            }
        })
        .collect();

    let mut descriptor = RootSignatureDescriptor {
        constant: root_constant,
        root_descriptors,
        descriptor_sets: tables.sets,
        static_samplers: Vec::new(),
    };

    // Assemble per-binding entries.
    let mut entries = Vec::with_capacity(bindings.len());
    let mut name_to_id = HashMap::with_capacity(bindings.len());
    for (idx, binding) in bindings.iter().enumerate() {
        let placement = match placements[idx] {
            Placement::RootConstant => BindingPlacement::PushConst {
                size: merged.constant_buffers[binding.cbuffer.unwrap()].size,
            },
            Placement::RootDescriptor => BindingPlacement::RootDescriptor {
                root_index: selected.iter().position(|&s| s == idx).unwrap() as u32,
            },
            Placement::Table => {
                let (_, set, element, array_base) = *tables
                    .slots
                    .iter()
                    .find(|(b, ..)| *b == idx)
                    .expect("table binding missing from build");
                BindingPlacement::DescriptorSet {
                    set_index: set,
                    element_index: element,
                    array_base,
                }
            }
        };
        let id = idx as u32;
        name_to_id.insert(binding.name.clone(), id);
        entries.push(BindingEntry {
            id,
            name: binding.name.clone(),
            bind_type: binding.bind_type,
            slot: binding.slot,
            space: binding.space,
            count: binding.count,
            stages: binding.stages,
            cbuffer: binding.cbuffer,
            placement,
        });
    }

    // Fold static samplers onto the sampler elements they name.
    for static_sampler in static_samplers {
        let Some(entry) = entries
            .iter()
            .find(|e| e.name == static_sampler.name && e.bind_type == ResourceBindType::Sampler)
        else {
            log::warn!(
                "static sampler '{}' does not match any reflected sampler binding",
                static_sampler.name
            );
            continue;
        };
        let BindingPlacement::DescriptorSet {
            set_index,
            element_index,
            array_base,
        } = entry.placement
        else {
            continue;
        };
        let element = &mut descriptor.descriptor_sets[set_index as usize].elements
            [element_index as usize];
        if array_base != 0 || element.count != entry.count {
            log::warn!(
                "static sampler '{}' targets a merged range; binding it dynamically",
                static_sampler.name
            );
            continue;
        }
        element.static_samplers = static_sampler.samplers.clone();
        descriptor
            .static_samplers
            .extend(static_sampler.samplers.iter().cloned());
    }

    Ok(BindingLayout {
        descriptor,
        bindings: entries,
        constant_buffers: merged.constant_buffers.clone(),
        types: merged.types.clone(),
        name_to_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{CBufferDesc, CBufferVariable, CombinedBinding};

    fn cbuffer(name: &str, size: u32) -> CBufferDesc {
        CBufferDesc {
            name: name.to_string(),
            size,
            variables: vec![CBufferVariable {
                name: format!("{name}_field"),
                type_id: 0,
                offset: 0,
                size,
            }],
        }
    }

    fn binding(
        name: &str,
        bind_type: ResourceBindType,
        slot: u32,
        space: u32,
        count: u32,
        cbuffer: Option<usize>,
    ) -> CombinedBinding {
        CombinedBinding {
            name: name.to_string(),
            bind_type,
            slot,
            space,
            count,
            stages: ShaderStages::GRAPHICS,
            cbuffer,
        }
    }

    #[test]
    fn small_layout_fits_budget() {
        let merged = MergedShaderDesc {
            bindings: vec![
                binding("Globals", ResourceBindType::CBuffer, 0, 0, 1, Some(0)),
                binding("g_Albedo", ResourceBindType::Texture, 0, 0, 1, None),
                binding("g_Sampler", ResourceBindType::Sampler, 0, 0, 1, None),
            ],
            constant_buffers: vec![cbuffer("Globals", 64)],
            ..Default::default()
        };
        let layout = BindingLayout::build(&merged, &[]).unwrap();
        assert!(layout.descriptor.cost_in_dwords() <= MAX_ROOT_SIGNATURE_DWORDS);
        // The cbuffer becomes the root constant, the rest one table.
        assert!(matches!(
            layout.binding(layout.binding_id("Globals").unwrap()).unwrap().placement,
            BindingPlacement::PushConst { size: 64 }
        ));
        assert_eq!(layout.descriptor.descriptor_sets.len(), 1);
        assert_eq!(layout.descriptor.descriptor_sets[0].elements.len(), 2);
    }

    #[test]
    fn contiguous_bindings_merge_into_one_range() {
        let merged = MergedShaderDesc {
            bindings: vec![
                binding("g_A", ResourceBindType::Texture, 0, 0, 1, None),
                binding("g_B", ResourceBindType::Texture, 1, 0, 2, None),
                binding("g_C", ResourceBindType::Texture, 3, 0, 1, None),
                binding("g_Far", ResourceBindType::Texture, 9, 0, 1, None),
            ],
            ..Default::default()
        };
        let layout = BindingLayout::build(&merged, &[]).unwrap();
        let set = &layout.descriptor.descriptor_sets[0];
        assert_eq!(set.elements.len(), 2);
        assert_eq!(set.elements[0].slot, 0);
        assert_eq!(set.elements[0].count, 4);
        assert_eq!(set.elements[1].slot, 9);
        // g_B sits at array offset 1 of the merged range.
        let entry = layout.binding(layout.binding_id("g_B").unwrap()).unwrap();
        assert_eq!(
            entry.placement,
            BindingPlacement::DescriptorSet {
                set_index: 0,
                element_index: 0,
                array_base: 1
            }
        );
    }

    #[test]
    fn overlapping_registers_are_rejected() {
        let merged = MergedShaderDesc {
            bindings: vec![
                binding("g_A", ResourceBindType::Texture, 0, 0, 2, None),
                binding("g_B", ResourceBindType::Texture, 1, 0, 1, None),
            ],
            ..Default::default()
        };
        let err = BindingLayout::build(&merged, &[]).unwrap_err();
        assert!(matches!(err, GfxError::InvalidOperation(_)));
    }

    #[test]
    fn budget_overflow_demotes_root_descriptors() {
        // 16 DWORDs of root constants + 30 CBV root descriptors + one table
        // overflows: 16 + 60 + 1 = 77. At least seven CBVs must fall back to
        // the table, and every binding must keep a placement.
        let mut bindings = vec![binding("Big", ResourceBindType::CBuffer, 0, 0, 1, Some(0))];
        let mut cbuffers = vec![cbuffer("Big", 64)];
        for i in 0..30 {
            cbuffers.push(cbuffer(&format!("CB{i}"), 16));
            bindings.push(binding(
                &format!("CB{i}"),
                ResourceBindType::CBuffer,
                i + 1,
                0,
                1,
                Some(cbuffers.len() - 1),
            ));
        }
        bindings.push(binding("g_Tex", ResourceBindType::Texture, 0, 0, 1, None));
        let merged = MergedShaderDesc {
            bindings,
            constant_buffers: cbuffers,
            ..Default::default()
        };
        let layout = BindingLayout::build(&merged, &[]).unwrap();
        assert!(layout.descriptor.cost_in_dwords() <= MAX_ROOT_SIGNATURE_DWORDS);
        let demoted = layout
            .bindings
            .iter()
            .filter(|e| {
                e.bind_type == ResourceBindType::CBuffer
                    && matches!(e.placement, BindingPlacement::DescriptorSet { .. })
            })
            .count();
        assert!(demoted >= 7, "expected at least 7 demotions, got {demoted}");
        assert_eq!(layout.descriptor.root_descriptors.len(), 30 - demoted);
        // No binding is lost: every entry has a placement and ids are dense.
        assert_eq!(layout.bindings.len(), 32);
        assert!(matches!(
            layout.binding(layout.binding_id("Big").unwrap()).unwrap().placement,
            BindingPlacement::PushConst { .. }
        ));
    }

    #[test]
    fn explicit_push_constant_is_kept() {
        let merged = MergedShaderDesc {
            bindings: vec![
                binding("Push", ResourceBindType::CBuffer, 0, 0, 1, Some(0)),
                binding("Params", ResourceBindType::CBuffer, 1, 0, 1, Some(1)),
            ],
            constant_buffers: vec![cbuffer("Push", 16), cbuffer("Params", 64)],
            explicit_push_constant: Some(0),
            ..Default::default()
        };
        let layout = BindingLayout::build(&merged, &[]).unwrap();
        assert_eq!(
            layout.descriptor.constant,
            Some(RootConstant {
                slot: 0,
                space: 0,
                size: 16,
                stages: ShaderStages::GRAPHICS,
            })
        );
        // The other cbuffer becomes a root descriptor, not the constant.
        assert!(matches!(
            layout.binding(layout.binding_id("Params").unwrap()).unwrap().placement,
            BindingPlacement::RootDescriptor { .. }
        ));
    }

    #[test]
    fn static_samplers_attach_to_named_elements() {
        let merged = MergedShaderDesc {
            bindings: vec![
                binding("g_Tex", ResourceBindType::Texture, 0, 0, 1, None),
                binding("g_LinearClamp", ResourceBindType::Sampler, 0, 0, 1, None),
            ],
            ..Default::default()
        };
        let statics = [StaticSamplerBinding {
            name: "g_LinearClamp".to_string(),
            samplers: vec![SamplerDescriptor::default()],
        }];
        let layout = BindingLayout::build(&merged, &statics).unwrap();
        let set = &layout.descriptor.descriptor_sets[0];
        let sampler_element = set
            .elements
            .iter()
            .find(|e| e.bind_type == ResourceBindType::Sampler)
            .unwrap();
        assert_eq!(sampler_element.static_samplers.len(), 1);
        assert_eq!(layout.descriptor.static_samplers.len(), 1);
    }
}
