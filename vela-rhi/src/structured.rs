//! CPU-side storage for shader constant data, laid out from reflection.
//!
//! A [`StructuredBufferStorage`] owns one contiguous byte buffer holding every
//! cbuffer of a pipeline, each root aligned for direct GPU upload. Fields are
//! written through transient [`StructuredBufferView`]s looked up by name.

use bytemuck::Pod;

pub const INVALID_ID: usize = usize::MAX;

#[derive(Debug, Clone)]
pub struct StructuredMember {
    pub name: String,
    pub type_id: usize,
    /// Offset inside the owning type.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct StructuredType {
    pub name: String,
    pub size: usize,
    pub members: Vec<StructuredMember>,
    /// For array types: number of elements and distance between them.
    pub element_count: usize,
    pub element_stride: usize,
}

#[derive(Debug, Clone)]
struct RootVariable {
    name: String,
    type_id: usize,
    offset: usize,
}

/// Accumulates types and root variables, then lays the buffer out.
#[derive(Debug, Clone, Default)]
pub struct StructuredBufferBuilder {
    types: Vec<StructuredType>,
    roots: Vec<(String, usize)>,
    align: usize,
}

impl StructuredBufferBuilder {
    pub fn add_type(&mut self, name: &str, size: usize) -> usize {
        self.types.push(StructuredType {
            name: name.to_string(),
            size,
            members: Vec::new(),
            element_count: 0,
            element_stride: 0,
        });
        self.types.len() - 1
    }

    pub fn add_member(&mut self, target_type: usize, member_type: usize, name: &str, offset: usize) {
        self.types[target_type].members.push(StructuredMember {
            name: name.to_string(),
            type_id: member_type,
            offset,
        });
    }

    /// Marks a type as an array of `count` elements `stride` bytes apart.
    pub fn set_array(&mut self, type_id: usize, count: usize, stride: usize) {
        let ty = &mut self.types[type_id];
        ty.element_count = count;
        ty.element_stride = stride;
    }

    pub fn add_root(&mut self, name: &str, type_id: usize) -> usize {
        self.roots.push((name.to_string(), type_id));
        self.roots.len() - 1
    }

    /// Alignment applied to every root's offset (cbuffer binding alignment).
    pub fn set_alignment(&mut self, align: usize) {
        self.align = align;
    }

    pub fn is_valid(&self) -> bool {
        let type_ok = self.types.iter().all(|ty| {
            ty.members
                .iter()
                .all(|m| m.type_id < self.types.len() && m.offset + self.types[m.type_id].size <= ty.size)
        });
        type_ok && self.roots.iter().all(|(_, ty)| *ty < self.types.len())
    }

    pub fn build(self) -> Option<StructuredBufferStorage> {
        if !self.is_valid() {
            return None;
        }
        let mut offset = 0usize;
        let mut roots = Vec::with_capacity(self.roots.len());
        for (name, type_id) in self.roots {
            if self.align > 0 {
                offset = offset.div_ceil(self.align) * self.align;
            }
            roots.push(RootVariable {
                name,
                type_id,
                offset,
            });
            offset += self.types[type_id].size;
        }
        let dirty = vec![true; roots.len()];
        Some(StructuredBufferStorage {
            types: self.types,
            roots,
            buffer: vec![0; offset],
            dirty,
        })
    }
}

#[derive(Debug, Default)]
pub struct StructuredBufferStorage {
    types: Vec<StructuredType>,
    roots: Vec<RootVariable>,
    buffer: Vec<u8>,
    /// Per-root write tracking; consumed by the uploader.
    dirty: Vec<bool>,
}

impl StructuredBufferStorage {
    pub fn builder() -> StructuredBufferBuilder {
        StructuredBufferBuilder::default()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    pub fn root_id(&self, name: &str) -> Option<usize> {
        self.roots.iter().position(|r| r.name == name)
    }

    /// `(offset, size)` of a root inside the backing buffer.
    pub fn root_span(&self, root_id: usize) -> (usize, usize) {
        let root = &self.roots[root_id];
        (root.offset, self.types[root.type_id].size)
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn root_bytes(&self, root_id: usize) -> &[u8] {
        let (offset, size) = self.root_span(root_id);
        &self.buffer[offset..offset + size]
    }

    pub fn is_dirty(&self, root_id: usize) -> bool {
        self.dirty[root_id]
    }

    pub fn clear_dirty(&mut self, root_id: usize) {
        self.dirty[root_id] = false;
    }

    /// Writes raw bytes at an absolute offset and marks the containing root.
    pub fn write(&mut self, offset: usize, data: &[u8]) {
        debug_assert!(offset + data.len() <= self.buffer.len());
        self.buffer[offset..offset + data.len()].copy_from_slice(data);
        for (idx, root) in self.roots.iter().enumerate() {
            let size = self.types[root.type_id].size;
            if offset >= root.offset && offset < root.offset + size {
                self.dirty[idx] = true;
                break;
            }
        }
    }

    /// View of a root variable by name.
    pub fn var(&mut self, name: &str) -> Option<StructuredBufferView<'_>> {
        let root_id = self.root_id(name)?;
        self.var_by_id(root_id)
    }

    pub fn var_by_id(&mut self, root_id: usize) -> Option<StructuredBufferView<'_>> {
        let root = self.roots.get(root_id)?;
        let type_id = root.type_id;
        let offset = root.offset;
        Some(StructuredBufferView {
            storage: self,
            type_id,
            offset,
        })
    }
}

/// A writable window on one variable inside the storage. Narrow with
/// [`var`](Self::var) / [`element`](Self::element), then [`set`](Self::set).
#[derive(Debug)]
pub struct StructuredBufferView<'a> {
    storage: &'a mut StructuredBufferStorage,
    type_id: usize,
    offset: usize,
}

impl<'a> StructuredBufferView<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.storage.types[self.type_id].size
    }

    /// Descends into a struct member.
    pub fn var(self, name: &str) -> Option<StructuredBufferView<'a>> {
        let ty = &self.storage.types[self.type_id];
        let member = ty.members.iter().find(|m| m.name == name)?;
        let type_id = member.type_id;
        let offset = self.offset + member.offset;
        Some(StructuredBufferView {
            storage: self.storage,
            type_id,
            offset,
        })
    }

    /// Steps to one element of an array variable.
    pub fn element(self, index: usize) -> Option<StructuredBufferView<'a>> {
        let ty = &self.storage.types[self.type_id];
        if ty.element_count == 0 || index >= ty.element_count {
            return None;
        }
        let offset = self.offset + index * ty.element_stride;
        Some(StructuredBufferView {
            storage: self.storage,
            type_id: self.type_id,
            offset,
        })
    }

    pub fn set<T: Pod>(&mut self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        debug_assert!(
            bytes.len() <= self.size(),
            "value of {} bytes does not fit variable of {} bytes",
            bytes.len(),
            self.size()
        );
        self.storage.write(self.offset, bytes);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.size());
        self.storage.write(self.offset, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_storage() -> StructuredBufferStorage {
        let mut builder = StructuredBufferStorage::builder();
        let float4 = builder.add_type("float4", 16);
        let float4x4 = builder.add_type("float4x4", 64);
        let globals = builder.add_type("Globals", 80);
        builder.add_member(globals, float4x4, "view_proj", 0);
        builder.add_member(globals, float4, "tint", 64);
        let lights = builder.add_type("LightArray", 64);
        builder.set_array(lights, 4, 16);
        builder.add_root("Globals", globals);
        builder.add_root("Lights", lights);
        builder.set_alignment(256);
        builder.build().unwrap()
    }

    #[test]
    fn roots_are_aligned() {
        let storage = sample_storage();
        assert_eq!(storage.root_span(0), (0, 80));
        assert_eq!(storage.root_span(1), (256, 64));
        assert_eq!(storage.data().len(), 320);
    }

    #[test]
    fn member_writes_land_at_their_offsets() {
        let mut storage = sample_storage();
        let tint = [1.0f32, 0.5, 0.25, 1.0];
        storage
            .var("Globals")
            .unwrap()
            .var("tint")
            .unwrap()
            .set(&tint);
        let bytes = storage.root_bytes(0);
        assert_eq!(&bytes[64..80], bytemuck::bytes_of(&tint));
    }

    #[test]
    fn array_elements_step_by_stride() {
        let mut storage = sample_storage();
        let light = [0.0f32, 1.0, 0.0, 1.0];
        storage
            .var("Lights")
            .unwrap()
            .element(2)
            .unwrap()
            .set(&light);
        let bytes = storage.root_bytes(1);
        assert_eq!(&bytes[32..48], bytemuck::bytes_of(&light));
        assert!(storage.var("Lights").unwrap().element(4).is_none());
    }

    #[test]
    fn writes_mark_only_the_touched_root() {
        let mut storage = sample_storage();
        storage.clear_dirty(0);
        storage.clear_dirty(1);
        let value = [0.0f32; 4];
        storage.var("Lights").unwrap().element(0).unwrap().set(&value);
        assert!(!storage.is_dirty(0));
        assert!(storage.is_dirty(1));
    }

    #[test]
    fn invalid_member_type_fails_build() {
        let mut builder = StructuredBufferStorage::builder();
        let globals = builder.add_type("Globals", 16);
        builder.add_member(globals, 42, "broken", 0);
        builder.add_root("Globals", globals);
        assert!(builder.build().is_none());
    }
}
