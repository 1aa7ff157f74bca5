//! Descriptors for buffers, textures, views and the memory model behind them.

use crate::common::{BufferUses, ClearValue, TextureUses};
use crate::format::TextureFormat;

/// Required offset alignment for constant buffer bindings.
pub const CBUFFER_ALIGNMENT: u64 = 256;

/// Sentinel meaning "the rest of the mip chain / array" in subresource ranges.
pub const ALL_REMAINING: u32 = u32::MAX;

/// Which heap a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// GPU-private; no CPU mapping.
    Device,
    /// CPU-writable, GPU-readable staging memory.
    Upload,
    /// GPU-writable, CPU-readable readback memory.
    Readback,
}

/// Placement hint for the memory allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceHint {
    #[default]
    None,
    /// Give the resource its own native allocation instead of suballocating.
    Dedicated,
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<&'static str>,
    pub size: u64,
    pub memory: MemoryType,
    pub usage: BufferUses,
    pub hint: ResourceHint,
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            memory: MemoryType::Device,
            usage: BufferUses::empty(),
            hint: ResourceHint::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureViewDimension {
    D1,
    #[default]
    D2,
    D3,
    D1Array,
    D2Array,
    Cube,
    CubeArray,
}

#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<&'static str>,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures; ignored otherwise.
    pub depth: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUses,
    /// Optimized clear value; must match the format family.
    pub clear_value: Option<ClearValue>,
    pub hint: ResourceHint,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            dimension: TextureDimension::D2,
            width: 1,
            height: 1,
            depth: 1,
            array_layers: 1,
            mip_levels: 1,
            sample_count: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUses::empty(),
            clear_value: None,
            hint: ResourceHint::None,
        }
    }
}

/// A (mips × layers) window into a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    /// [`ALL_REMAINING`] selects every level from `base_mip` on.
    pub mip_count: u32,
    pub base_layer: u32,
    /// [`ALL_REMAINING`] selects every layer from `base_layer` on.
    pub layer_count: u32,
}

impl SubresourceRange {
    /// The whole mip chain of every layer.
    pub const ALL: Self = Self {
        base_mip: 0,
        mip_count: ALL_REMAINING,
        base_layer: 0,
        layer_count: ALL_REMAINING,
    };

    /// Resolves the sentinels against a concrete texture shape.
    pub fn resolve(&self, mip_levels: u32, array_layers: u32) -> (u32, u32) {
        let mips = if self.mip_count == ALL_REMAINING {
            mip_levels.saturating_sub(self.base_mip)
        } else {
            self.mip_count
        };
        let layers = if self.layer_count == ALL_REMAINING {
            array_layers.saturating_sub(self.base_layer)
        } else {
            self.layer_count
        };
        (mips, layers)
    }
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Usage category a view binds its resource into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUsage {
    /// Shader-visible read (SRV / sampled image).
    Resource,
    StorageRo,
    StorageRw,
    RenderTarget,
    DepthStencil,
    Vertex,
    Index,
    CBuffer,
}

#[derive(Debug, Clone)]
pub struct BufferViewDescriptor {
    pub usage: ViewUsage,
    pub offset: u64,
    /// Bytes covered by the view; `u64::MAX` means "to the end of the buffer".
    pub size: u64,
    /// Element format for typed buffer views.
    pub format: Option<TextureFormat>,
    /// Element stride for structured views; 0 for raw views.
    pub stride: u32,
}

impl Default for BufferViewDescriptor {
    fn default() -> Self {
        Self {
            usage: ViewUsage::Resource,
            offset: 0,
            size: u64::MAX,
            format: None,
            stride: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureViewDescriptor {
    pub usage: ViewUsage,
    pub dimension: TextureViewDimension,
    pub format: TextureFormat,
    pub range: SubresourceRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subresource_range_resolves_sentinels() {
        let range = SubresourceRange {
            base_mip: 2,
            mip_count: ALL_REMAINING,
            base_layer: 1,
            layer_count: ALL_REMAINING,
        };
        assert_eq!(range.resolve(6, 4), (4, 3));
        assert_eq!(SubresourceRange::ALL.resolve(1, 1), (1, 1));
    }
}
