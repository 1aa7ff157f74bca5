//! Per-draw staging ground between named shader bindings and an encoder.
//!
//! A [`BindBridge`] is built from a [`BindingLayout`] and owns the CPU copy of
//! every bridge-recognized cbuffer, a locator per binding, and the descriptor
//! sets of its root signature. Callers write fields by name, attach views,
//! then `upload` dirty constants into a [`CBufferArena`] and `bind` the whole
//! table to an encoder in root-signature order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::BufferUses;
use crate::device::{
    Buffer, BufferView, CommandEncoder, DescriptorSet, Device, RootSignature, Sampler,
    TextureView,
};
use crate::error::{GfxError, GfxResult};
use crate::reflection::{CBufferDesc, ShaderTypeDesc, VariableClass};
use crate::resource::{BufferDescriptor, BufferViewDescriptor, MemoryType, ViewUsage, CBUFFER_ALIGNMENT};
use crate::root_signature::{BindingLayout, BindingPlacement};
use crate::structured::{StructuredBufferStorage, StructuredBufferView};

/// A view handed to [`BindBridge::set_resource`]. Shared handles so the
/// bridge can retain what it needs without owning the viewed resource.
#[derive(Clone)]
pub enum BoundView {
    Buffer(Arc<dyn BufferView>),
    Texture(Arc<dyn TextureView>),
    Sampler(Arc<dyn Sampler>),
}

impl BoundView {
    fn as_resource_view(&self) -> &dyn crate::device::ResourceView {
        match self {
            Self::Buffer(v) => v.as_resource_view(),
            Self::Texture(v) => v.as_resource_view(),
            Self::Sampler(v) => v.as_resource_view(),
        }
    }
}

/// One transient allocation inside a [`CBufferArena`]. Valid until the arena
/// is reset.
#[derive(Debug, Clone, Copy)]
pub struct ArenaSlice {
    pub page: usize,
    pub offset: u64,
    pub size: u64,
    generation: u64,
}

struct ArenaPage {
    buffer: Box<dyn Buffer>,
    cursor: u64,
}

/// Bump arena of Upload-memory pages for per-frame constant data. Reset once
/// the frame's fence has signalled; pages are kept and reused.
pub struct CBufferArena {
    pages: Vec<ArenaPage>,
    page_size: u64,
    generation: u64,
}

impl CBufferArena {
    pub fn new(page_size: u64) -> Self {
        Self {
            pages: Vec::new(),
            page_size: page_size.max(CBUFFER_ALIGNMENT),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn buffer(&self, page: usize) -> &dyn Buffer {
        self.pages[page].buffer.as_ref()
    }

    /// Reserves `size` bytes at cbuffer alignment, growing by whole pages.
    pub fn allocate(&mut self, device: &dyn Device, size: u64) -> GfxResult<ArenaSlice> {
        if size == 0 {
            return Err(GfxError::invalid_argument("arena allocation of zero bytes"));
        }
        let aligned = size.div_ceil(CBUFFER_ALIGNMENT) * CBUFFER_ALIGNMENT;
        for (index, page) in self.pages.iter_mut().enumerate() {
            if page.cursor + aligned <= page.buffer.size() {
                let offset = page.cursor;
                page.cursor += aligned;
                return Ok(ArenaSlice {
                    page: index,
                    offset,
                    size,
                    generation: self.generation,
                });
            }
        }
        let page_size = self.page_size.max(aligned);
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some("cbuffer arena page"),
            size: page_size,
            memory: MemoryType::Upload,
            usage: BufferUses::MAP_WRITE | BufferUses::CBUFFER,
            ..Default::default()
        })?;
        self.pages.push(ArenaPage {
            buffer,
            cursor: aligned,
        });
        Ok(ArenaSlice {
            page: self.pages.len() - 1,
            offset: 0,
            size,
            generation: self.generation,
        })
    }

    pub fn write(&self, slice: &ArenaSlice, data: &[u8]) -> GfxResult<()> {
        debug_assert!(data.len() as u64 <= slice.size);
        self.pages[slice.page].buffer.write(slice.offset, data)
    }

    /// Invalidates every outstanding slice and rewinds the pages. Legal only
    /// once the GPU is done with the previous frame's constants.
    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.cursor = 0;
        }
        self.generation += 1;
    }
}

#[derive(Debug, Clone, Copy)]
enum Locator {
    PushConst {
        root: usize,
        size: u32,
    },
    RootDescriptor {
        root_index: u32,
        /// Storage root for cbuffer-backed root descriptors.
        root: Option<usize>,
    },
    DescriptorSet {
        set_index: u32,
        element_index: u32,
        array_base: u32,
        count: u32,
        root: Option<usize>,
    },
}

struct RootDescriptorState {
    binding_id: u32,
    /// Staged constants, refreshed by `upload`.
    slice: Option<ArenaSlice>,
    /// Caller-supplied view overriding the staged path.
    external: Option<Arc<dyn BufferView>>,
}

/// Runtime binding table for one root signature. See module docs.
pub struct BindBridge {
    device: Arc<dyn Device>,
    locators: Vec<Locator>,
    name_to_id: HashMap<String, u32>,
    storage: StructuredBufferStorage,
    /// Storage root per binding id, where applicable.
    binding_roots: Vec<Option<usize>>,
    /// Indexed by root descriptor index.
    root_descriptors: Vec<RootDescriptorState>,
    sets: Vec<Box<dyn DescriptorSet>>,
    /// Arena slices of descriptor-set cbuffers, per binding id.
    set_cbuffer_slices: Vec<Option<ArenaSlice>>,
    /// Views created over arena pages; alive until the next upload.
    owned_views: Vec<Arc<dyn BufferView>>,
}

/// Recursively registers a reflected type with the storage builder.
fn import_reflected_type(
    builder: &mut crate::structured::StructuredBufferBuilder,
    types: &[ShaderTypeDesc],
    type_id: usize,
) -> usize {
    let ty = &types[type_id];
    let id = builder.add_type(&ty.name, ty.size as usize);
    if ty.class == VariableClass::Array && ty.elements > 0 {
        builder.set_array(id, ty.elements as usize, (ty.size / ty.elements) as usize);
    }
    for member in &ty.members {
        let member_ty = import_reflected_type(builder, types, member.type_id);
        builder.add_member(id, member_ty, &member.name, member.offset as usize);
    }
    id
}

fn build_storage(
    layout: &BindingLayout,
) -> GfxResult<(StructuredBufferStorage, Vec<Option<usize>>)> {
    let mut builder = StructuredBufferStorage::builder();
    builder.set_alignment(CBUFFER_ALIGNMENT as usize);
    let mut roots = vec![None; layout.bindings.len()];
    for entry in &layout.bindings {
        let Some(cb_index) = entry.cbuffer else { continue };
        let cb: &CBufferDesc = &layout.constant_buffers[cb_index];
        let cb_type = builder.add_type(&cb.name, cb.size as usize);
        for variable in &cb.variables {
            let var_type = import_reflected_type(&mut builder, &layout.types, variable.type_id);
            builder.add_member(cb_type, var_type, &variable.name, variable.offset as usize);
        }
        let root = builder.add_root(&entry.name, cb_type);
        roots[entry.id as usize] = Some(root);
    }
    let storage = builder
        .build()
        .ok_or_else(|| GfxError::invalid_argument("cbuffer reflection is inconsistent"))?;
    Ok((storage, roots))
}

impl BindBridge {
    /// Builds the bridge for `root_signature`, creating its descriptor sets
    /// up front. The signature must have been created from `layout`.
    pub fn new(
        device: Arc<dyn Device>,
        root_signature: &dyn RootSignature,
        layout: &BindingLayout,
    ) -> GfxResult<Self> {
        let (storage, binding_roots) = build_storage(layout)?;
        let mut locators = Vec::with_capacity(layout.bindings.len());
        let mut root_descriptors: Vec<Option<RootDescriptorState>> =
            std::iter::repeat_with(|| None)
                .take(layout.descriptor.root_descriptors.len())
                .collect();
        for entry in &layout.bindings {
            let root = binding_roots[entry.id as usize];
            let locator = match entry.placement {
                BindingPlacement::PushConst { size } => Locator::PushConst {
                    root: root.expect("push constant binding without cbuffer storage"),
                    size,
                },
                BindingPlacement::RootDescriptor { root_index } => {
                    root_descriptors[root_index as usize] = Some(RootDescriptorState {
                        binding_id: entry.id,
                        slice: None,
                        external: None,
                    });
                    Locator::RootDescriptor { root_index, root }
                }
                BindingPlacement::DescriptorSet {
                    set_index,
                    element_index,
                    array_base,
                } => Locator::DescriptorSet {
                    set_index,
                    element_index,
                    array_base,
                    count: entry.count,
                    root,
                },
            };
            locators.push(locator);
        }
        let root_descriptors = root_descriptors
            .into_iter()
            .map(|state| state.expect("root descriptor index without binding"))
            .collect();
        let mut sets = Vec::with_capacity(layout.descriptor.descriptor_sets.len());
        for set_index in 0..layout.descriptor.descriptor_sets.len() {
            sets.push(device.create_descriptor_set(root_signature, set_index as u32)?);
        }
        let mut name_to_id = HashMap::with_capacity(layout.bindings.len());
        for entry in &layout.bindings {
            name_to_id.insert(entry.name.clone(), entry.id);
        }
        Ok(Self {
            device,
            locators,
            name_to_id,
            storage,
            binding_roots,
            root_descriptors,
            sets,
            set_cbuffer_slices: vec![None; layout.bindings.len()],
            owned_views: Vec::new(),
        })
    }

    pub fn binding_id(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).copied()
    }

    /// Field-level access to a cbuffer's CPU copy, by cbuffer binding name.
    pub fn cbuffer(&mut self, name: &str) -> Option<StructuredBufferView<'_>> {
        let id = self.binding_id(name)?;
        self.cbuffer_by_id(id)
    }

    pub fn cbuffer_by_id(&mut self, id: u32) -> Option<StructuredBufferView<'_>> {
        let root = (*self.binding_roots.get(id as usize)?)?;
        self.storage.var_by_id(root)
    }

    /// Attaches a view to a binding. For descriptor-set bindings the write
    /// reaches the set immediately; for buffer-typed root descriptors the
    /// view overrides the staged-constant path.
    pub fn set_resource(&mut self, id: u32, view: BoundView, array_index: u32) -> GfxResult<()> {
        let locator = *self
            .locators
            .get(id as usize)
            .ok_or_else(|| GfxError::invalid_argument(format!("unknown binding id {id}")))?;
        match locator {
            Locator::PushConst { .. } => Err(GfxError::invalid_operation(
                "a push constant block cannot be bound as a resource view".to_string(),
            )),
            Locator::RootDescriptor { root_index, .. } => {
                let BoundView::Buffer(buffer_view) = view else {
                    return Err(GfxError::invalid_argument(
                        "root descriptors accept buffer views only".to_string(),
                    ));
                };
                self.root_descriptors[root_index as usize].external = Some(buffer_view);
                Ok(())
            }
            Locator::DescriptorSet {
                set_index,
                element_index,
                array_base,
                count,
                ..
            } => {
                if array_index >= count {
                    return Err(GfxError::invalid_argument(format!(
                        "array index {array_index} out of bounds for binding of {count}"
                    )));
                }
                self.sets[set_index as usize].set_resource(
                    element_index,
                    array_base + array_index,
                    view.as_resource_view(),
                )
            }
        }
    }

    pub fn set_resource_by_name(
        &mut self,
        name: &str,
        view: BoundView,
        array_index: u32,
    ) -> GfxResult<()> {
        let id = self
            .binding_id(name)
            .ok_or_else(|| GfxError::invalid_argument(format!("unknown binding '{name}'")))?;
        self.set_resource(id, view, array_index)
    }

    /// Stages dirty cbuffers into the arena and patches the affected
    /// locators. Must run after `arena.reset()` and before [`bind`](Self::bind).
    pub fn upload(&mut self, arena: &mut CBufferArena) -> GfxResult<()> {
        self.owned_views.clear();
        for id in 0..self.locators.len() {
            let locator = self.locators[id];
            match locator {
                Locator::PushConst { .. } => {}
                Locator::RootDescriptor { root_index, root } => {
                    let Some(root) = root else { continue };
                    let state = &self.root_descriptors[root_index as usize];
                    if state.external.is_some() {
                        continue;
                    }
                    let needs_upload = self.storage.is_dirty(root)
                        || state
                            .slice
                            .map(|s| s.generation != arena.generation())
                            .unwrap_or(true);
                    if !needs_upload {
                        continue;
                    }
                    let (_, size) = self.storage.root_span(root);
                    let slice = arena.allocate(self.device.as_ref(), size as u64)?;
                    arena.write(&slice, self.storage.root_bytes(root))?;
                    self.storage.clear_dirty(root);
                    self.root_descriptors[root_index as usize].slice = Some(slice);
                }
                Locator::DescriptorSet {
                    set_index,
                    element_index,
                    array_base,
                    root,
                    ..
                } => {
                    let Some(root) = root else { continue };
                    let needs_upload = self.storage.is_dirty(root)
                        || self.set_cbuffer_slices[id]
                            .map(|s| s.generation != arena.generation())
                            .unwrap_or(true);
                    if !needs_upload {
                        continue;
                    }
                    let (_, size) = self.storage.root_span(root);
                    let slice = arena.allocate(self.device.as_ref(), size as u64)?;
                    arena.write(&slice, self.storage.root_bytes(root))?;
                    self.storage.clear_dirty(root);
                    let view = self.device.create_buffer_view(
                        arena.buffer(slice.page),
                        &BufferViewDescriptor {
                            usage: ViewUsage::CBuffer,
                            offset: slice.offset,
                            size: slice.size,
                            ..Default::default()
                        },
                    )?;
                    self.sets[set_index as usize].set_resource(
                        element_index,
                        array_base,
                        view.as_resource_view(),
                    )?;
                    self.owned_views.push(view);
                    self.set_cbuffer_slices[id] = Some(slice);
                }
            }
        }
        Ok(())
    }

    /// Pushes the whole table to an encoder in root-signature order: root
    /// constants, root descriptors, then descriptor sets. The caller binds
    /// the root signature itself. Unbound descriptor slots and missing
    /// uploads are programming errors and panic.
    pub fn bind(&self, encoder: &mut dyn CommandEncoder, arena: &CBufferArena) {
        for locator in &self.locators {
            if let Locator::PushConst { root, size } = locator {
                let bytes = self.storage.root_bytes(*root);
                encoder.push_constant(&bytes[..*size as usize]);
            }
        }
        for (root_index, state) in self.root_descriptors.iter().enumerate() {
            if let Some(view) = &state.external {
                encoder.bind_root_descriptor_view(root_index as u32, view.as_ref());
                continue;
            }
            let slice = state
                .slice
                .unwrap_or_else(|| panic!("root descriptor {root_index} bound without upload"));
            assert_eq!(
                slice.generation,
                arena.generation(),
                "root descriptor {root_index} holds constants from a reset arena"
            );
            encoder.bind_root_descriptor(
                root_index as u32,
                arena.buffer(slice.page),
                slice.offset,
                slice.size,
            );
        }
        for (set_index, set) in self.sets.iter().enumerate() {
            assert!(
                set.is_complete(),
                "descriptor set {set_index} has unbound slots (binding id {})",
                self.locators
                    .iter()
                    .position(|l| matches!(l, Locator::DescriptorSet { set_index: s, .. } if *s == set_index as u32))
                    .unwrap_or(usize::MAX)
            );
            encoder.bind_descriptor_set(set_index as u32, set.as_ref());
        }
    }

    /// Drops attached views and staged slices; keeps the cbuffer storage and
    /// descriptor sets for reuse.
    pub fn clear(&mut self) {
        for state in &mut self.root_descriptors {
            state.slice = None;
            state.external = None;
        }
        for slice in &mut self.set_cbuffer_slices {
            *slice = None;
        }
        self.owned_views.clear();
    }
}

impl std::fmt::Debug for BindBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindBridge")
            .field("bindings", &self.locators.len())
            .field("root_descriptors", &self.root_descriptors.len())
            .field("descriptor_sets", &self.sets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ObjectTag, SamplerDescriptor, ShaderStages};
    use crate::device::{
        CommandBuffer, CommandQueue, ComputePipelineState, Fence, GraphicsPipelineState,
        RenderObject, ResourceId, ResourceView, Semaphore, Shader, ShaderDescriptor,
    };
    use crate::format::TextureFormat;
    use crate::pipeline::{ComputePipelineDescriptor, GraphicsPipelineDescriptor};
    use crate::reflection::{
        CBufferDesc, CBufferVariable, CombinedBinding, MergedShaderDesc, ResourceBindType,
    };
    use crate::resource::{SubresourceRange, TextureDescriptor, TextureViewDescriptor};
    use crate::root_signature::RootSignatureDescriptor;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct NullBuffer {
        id: ResourceId,
        size: u64,
        data: Mutex<Vec<u8>>,
    }

    impl RenderObject for NullBuffer {
        fn tag(&self) -> ObjectTag {
            ObjectTag::Buffer
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl Buffer for NullBuffer {
        fn id(&self) -> ResourceId {
            self.id
        }
        fn size(&self) -> u64 {
            self.size
        }
        fn memory_type(&self) -> MemoryType {
            MemoryType::Upload
        }
        fn usage(&self) -> BufferUses {
            BufferUses::MAP_WRITE | BufferUses::CBUFFER
        }
        fn map(&self, _offset: u64, _size: u64) -> GfxResult<*mut u8> {
            Err(GfxError::not_supported("test double"))
        }
        fn unmap(&self, _offset: u64, _size: u64) {}
        fn write(&self, offset: u64, data: &[u8]) -> GfxResult<()> {
            let mut guard = self.data.lock().unwrap();
            guard[offset as usize..offset as usize + data.len()].copy_from_slice(data);
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Debug)]
    struct NullBufferView {
        resource: ResourceId,
        offset: u64,
        size: u64,
    }

    impl RenderObject for NullBufferView {
        fn tag(&self) -> ObjectTag {
            ObjectTag::BufferView
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl ResourceView for NullBufferView {
        fn resource_id(&self) -> ResourceId {
            self.resource
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl BufferView for NullBufferView {
        fn offset(&self) -> u64 {
            self.offset
        }
        fn len(&self) -> u64 {
            self.size
        }
        fn as_resource_view(&self) -> &dyn ResourceView {
            self
        }
    }

    #[derive(Debug)]
    struct NullTextureView;

    impl RenderObject for NullTextureView {
        fn tag(&self) -> ObjectTag {
            ObjectTag::TextureView
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl ResourceView for NullTextureView {
        fn resource_id(&self) -> ResourceId {
            99
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl TextureView for NullTextureView {
        fn format(&self) -> TextureFormat {
            TextureFormat::Rgba8Unorm
        }
        fn range(&self) -> SubresourceRange {
            SubresourceRange::ALL
        }
        fn as_resource_view(&self) -> &dyn ResourceView {
            self
        }
    }

    #[derive(Debug)]
    struct NullSampler;

    impl RenderObject for NullSampler {
        fn tag(&self) -> ObjectTag {
            ObjectTag::Sampler
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl ResourceView for NullSampler {
        fn resource_id(&self) -> ResourceId {
            0
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl Sampler for NullSampler {
        fn as_resource_view(&self) -> &dyn ResourceView {
            self
        }
    }

    #[derive(Debug)]
    struct NullDescriptorSet {
        bound: Vec<Vec<bool>>,
    }

    impl RenderObject for NullDescriptorSet {
        fn tag(&self) -> ObjectTag {
            ObjectTag::DescriptorSet
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl DescriptorSet for NullDescriptorSet {
        fn set_resource(
            &mut self,
            element: u32,
            array_index: u32,
            _view: &dyn ResourceView,
        ) -> GfxResult<()> {
            self.bound[element as usize][array_index as usize] = true;
            Ok(())
        }
        fn is_complete(&self) -> bool {
            self.bound.iter().all(|e| e.iter().all(|b| *b))
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Debug)]
    struct NullRootSignature {
        descriptor: RootSignatureDescriptor,
    }

    impl RenderObject for NullRootSignature {
        fn tag(&self) -> ObjectTag {
            ObjectTag::RootSignature
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl RootSignature for NullRootSignature {
        fn descriptor(&self) -> &RootSignatureDescriptor {
            &self.descriptor
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Debug)]
    struct NullDevice {
        next_id: AtomicU64,
        detail: crate::common::DeviceDetail,
    }

    impl NullDevice {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                next_id: AtomicU64::new(1),
                detail: crate::common::DeviceDetail {
                    name: "null".to_string(),
                    vram_bytes: 0,
                    is_uma: true,
                },
            })
        }
    }

    impl RenderObject for NullDevice {
        fn tag(&self) -> ObjectTag {
            ObjectTag::Device
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn destroy(&self) {}
    }

    impl Device for NullDevice {
        fn backend(&self) -> crate::common::Backend {
            crate::common::Backend::Vulkan
        }
        fn detail(&self) -> &crate::common::DeviceDetail {
            &self.detail
        }
        fn queue(
            &self,
            _queue_type: crate::common::QueueType,
            _slot: u32,
        ) -> Option<Arc<dyn CommandQueue>> {
            None
        }
        fn create_command_buffer(
            &self,
            _queue: &dyn CommandQueue,
        ) -> GfxResult<Box<dyn CommandBuffer>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_fence(&self) -> GfxResult<Box<dyn Fence>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_semaphore(&self) -> GfxResult<Box<dyn Semaphore>> {
            Err(GfxError::not_supported("test double"))
        }
        fn wait_fences(&self, _fences: &[&dyn Fence]) -> GfxResult<()> {
            Ok(())
        }
        fn create_buffer(&self, desc: &BufferDescriptor) -> GfxResult<Box<dyn Buffer>> {
            Ok(Box::new(NullBuffer {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                size: desc.size,
                data: Mutex::new(vec![0; desc.size as usize]),
            }))
        }
        fn create_texture(&self, _desc: &TextureDescriptor) -> GfxResult<Box<dyn crate::device::Texture>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_buffer_view(
            &self,
            buffer: &dyn Buffer,
            desc: &BufferViewDescriptor,
        ) -> GfxResult<Arc<dyn BufferView>> {
            Ok(Arc::new(NullBufferView {
                resource: buffer.id(),
                offset: desc.offset,
                size: desc.size,
            }))
        }
        fn create_texture_view(
            &self,
            _texture: &dyn crate::device::Texture,
            _desc: &TextureViewDescriptor,
        ) -> GfxResult<Arc<dyn TextureView>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_sampler(&self, _desc: &SamplerDescriptor) -> GfxResult<Arc<dyn Sampler>> {
            Ok(Arc::new(NullSampler))
        }
        fn create_shader(&self, _desc: &ShaderDescriptor<'_>) -> GfxResult<Box<dyn Shader>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_root_signature(
            &self,
            desc: &RootSignatureDescriptor,
        ) -> GfxResult<Box<dyn RootSignature>> {
            Ok(Box::new(NullRootSignature {
                descriptor: desc.clone(),
            }))
        }
        fn create_graphics_pipeline(
            &self,
            _desc: &GraphicsPipelineDescriptor<'_>,
        ) -> GfxResult<Box<dyn GraphicsPipelineState>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_compute_pipeline(
            &self,
            _desc: &ComputePipelineDescriptor<'_>,
        ) -> GfxResult<Box<dyn ComputePipelineState>> {
            Err(GfxError::not_supported("test double"))
        }
        fn create_descriptor_set(
            &self,
            root_signature: &dyn RootSignature,
            set_index: u32,
        ) -> GfxResult<Box<dyn DescriptorSet>> {
            let set = &root_signature.descriptor().descriptor_sets[set_index as usize];
            let bound = set
                .elements
                .iter()
                .map(|e| {
                    if e.static_samplers.is_empty() {
                        vec![false; e.count as usize]
                    } else {
                        vec![true; e.count as usize]
                    }
                })
                .collect();
            Ok(Box::new(NullDescriptorSet { bound }))
        }
        #[cfg(feature = "window")]
        fn create_swap_chain(
            &self,
            _desc: &crate::device::SwapChainDescriptor<'_>,
        ) -> GfxResult<Box<dyn crate::device::SwapChain>> {
            Err(GfxError::not_supported("test double"))
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Debug, PartialEq)]
    enum Call {
        PushConst(usize),
        RootDescriptor { index: u32, offset: u64, size: u64 },
        RootDescriptorView { index: u32 },
        Set(u32),
    }

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Vec<Call>,
    }

    impl CommandEncoder for RecordingEncoder {
        fn bind_root_signature(&mut self, _root_signature: &dyn RootSignature) {}
        fn push_constant(&mut self, data: &[u8]) {
            self.calls.push(Call::PushConst(data.len()));
        }
        fn bind_root_descriptor(
            &mut self,
            root_index: u32,
            _buffer: &dyn Buffer,
            offset: u64,
            size: u64,
        ) {
            self.calls.push(Call::RootDescriptor {
                index: root_index,
                offset,
                size,
            });
        }
        fn bind_root_descriptor_view(&mut self, root_index: u32, _view: &dyn BufferView) {
            self.calls.push(Call::RootDescriptorView { index: root_index });
        }
        fn bind_descriptor_set(&mut self, set_index: u32, _set: &dyn DescriptorSet) {
            self.calls.push(Call::Set(set_index));
        }
    }

    fn float4_type() -> ShaderTypeDesc {
        ShaderTypeDesc {
            name: "float4".to_string(),
            class: VariableClass::Vector,
            base: crate::reflection::VariableBaseType::Float,
            rows: 1,
            columns: 4,
            elements: 0,
            size: 16,
            members: Vec::new(),
        }
    }

    fn cbuffer(name: &str, size: u32) -> CBufferDesc {
        CBufferDesc {
            name: name.to_string(),
            size,
            variables: vec![CBufferVariable {
                name: "value".to_string(),
                type_id: 0,
                offset: 0,
                size: 16,
            }],
        }
    }

    fn binding(
        name: &str,
        bind_type: ResourceBindType,
        slot: u32,
        cbuffer: Option<usize>,
    ) -> CombinedBinding {
        CombinedBinding {
            name: name.to_string(),
            bind_type,
            slot,
            space: 0,
            count: 1,
            stages: ShaderStages::GRAPHICS,
            cbuffer,
        }
    }

    /// Frame (push const) + Object (root descriptor) + texture and sampler
    /// in one descriptor set.
    fn sample_layout() -> BindingLayout {
        let merged = MergedShaderDesc {
            bindings: vec![
                binding("Frame", ResourceBindType::CBuffer, 0, Some(0)),
                binding("Object", ResourceBindType::CBuffer, 1, Some(1)),
                binding("g_Tex", ResourceBindType::Texture, 0, None),
                binding("g_Samp", ResourceBindType::Sampler, 0, None),
            ],
            constant_buffers: vec![cbuffer("Frame", 64), cbuffer("Object", 128)],
            types: vec![float4_type()],
            ..Default::default()
        };
        BindingLayout::build(&merged, &[]).unwrap()
    }

    fn sample_bridge() -> (Arc<NullDevice>, BindBridge) {
        let device = NullDevice::new();
        let layout = sample_layout();
        let root_signature = device.create_root_signature(&layout.descriptor).unwrap();
        let bridge = BindBridge::new(device.clone(), root_signature.as_ref(), &layout).unwrap();
        (device, bridge)
    }

    #[test]
    fn bridge_binds_in_root_signature_order() {
        let (_device, mut bridge) = sample_bridge();
        let tint = [1.0f32, 0.0, 0.0, 1.0];
        bridge
            .cbuffer("Frame")
            .unwrap()
            .var("value")
            .unwrap()
            .set(&tint);
        bridge
            .set_resource_by_name("g_Tex", BoundView::Texture(Arc::new(NullTextureView)), 0)
            .unwrap();
        bridge
            .set_resource_by_name("g_Samp", BoundView::Sampler(Arc::new(NullSampler)), 0)
            .unwrap();
        let mut arena = CBufferArena::new(4096);
        bridge.upload(&mut arena).unwrap();
        let mut encoder = RecordingEncoder::default();
        bridge.bind(&mut encoder, &arena);
        assert_eq!(
            encoder.calls,
            vec![
                Call::PushConst(64),
                Call::RootDescriptor {
                    index: 0,
                    offset: 0,
                    size: 128
                },
                Call::Set(0),
            ]
        );
    }

    #[test]
    fn external_view_overrides_staged_root_descriptor() {
        let (_device, mut bridge) = sample_bridge();
        bridge
            .set_resource_by_name("g_Tex", BoundView::Texture(Arc::new(NullTextureView)), 0)
            .unwrap();
        bridge
            .set_resource_by_name("g_Samp", BoundView::Sampler(Arc::new(NullSampler)), 0)
            .unwrap();
        let external = Arc::new(NullBufferView {
            resource: 7,
            offset: 0,
            size: 128,
        });
        bridge
            .set_resource_by_name("Object", BoundView::Buffer(external), 0)
            .unwrap();
        let mut arena = CBufferArena::new(4096);
        bridge.upload(&mut arena).unwrap();
        let mut encoder = RecordingEncoder::default();
        bridge.bind(&mut encoder, &arena);
        assert!(encoder
            .calls
            .contains(&Call::RootDescriptorView { index: 0 }));
    }

    #[test]
    fn upload_skips_clean_cbuffers_within_one_generation() {
        let (_device, mut bridge) = sample_bridge();
        let mut arena = CBufferArena::new(4096);
        bridge.upload(&mut arena).unwrap();
        let first = bridge.root_descriptors[0].slice.unwrap();
        // Nothing written since: the staged slice must be reused.
        bridge.upload(&mut arena).unwrap();
        let second = bridge.root_descriptors[0].slice.unwrap();
        assert_eq!(first.offset, second.offset);
        // After a reset every cbuffer restages even if clean.
        arena.reset();
        bridge.upload(&mut arena).unwrap();
        let third = bridge.root_descriptors[0].slice.unwrap();
        assert_eq!(third.generation, arena.generation());
    }

    #[test]
    #[should_panic(expected = "unbound slots")]
    fn bind_panics_on_unbound_descriptor_slot() {
        let (_device, mut bridge) = sample_bridge();
        let mut arena = CBufferArena::new(4096);
        bridge.upload(&mut arena).unwrap();
        let mut encoder = RecordingEncoder::default();
        bridge.bind(&mut encoder, &arena);
    }

    #[test]
    fn push_constant_rejects_resource_views() {
        let (_device, mut bridge) = sample_bridge();
        let err = bridge
            .set_resource_by_name("Frame", BoundView::Texture(Arc::new(NullTextureView)), 0)
            .unwrap_err();
        assert!(matches!(err, GfxError::InvalidOperation(_)));
    }

    #[test]
    fn arena_reuses_pages_after_reset() {
        let device = NullDevice::new();
        let mut arena = CBufferArena::new(1024);
        let a = arena.allocate(device.as_ref(), 100).unwrap();
        let b = arena.allocate(device.as_ref(), 100).unwrap();
        assert_eq!(a.page, b.page);
        assert_eq!(b.offset, 256);
        let big = arena.allocate(device.as_ref(), 2048).unwrap();
        assert_ne!(big.page, a.page);
        arena.reset();
        let c = arena.allocate(device.as_ref(), 100).unwrap();
        assert_eq!(c.page, 0);
        assert_eq!(c.offset, 0);
        assert_ne!(c.generation, a.generation);
    }
}
