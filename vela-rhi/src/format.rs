//! Closed sets of texture and vertex formats plus the queries the rest of the
//! crate needs (depth/stencil classification, pixel and element sizes).

/// Texture element formats understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Sint,
    R8Uint,
    R8Snorm,
    R8Unorm,

    R16Sint,
    R16Uint,
    R16Snorm,
    R16Unorm,
    R16Float,

    Rg8Sint,
    Rg8Uint,
    Rg8Snorm,
    Rg8Unorm,

    R32Sint,
    R32Uint,
    R32Float,

    Rg16Sint,
    Rg16Uint,
    Rg16Snorm,
    Rg16Unorm,
    Rg16Float,

    Rgba8Sint,
    Rgba8Uint,
    Rgba8Snorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,

    Rgb10a2Uint,
    Rgb10a2Unorm,
    Rg11b10Float,

    Rg32Sint,
    Rg32Uint,
    Rg32Float,

    Rgba16Sint,
    Rgba16Uint,
    Rgba16Snorm,
    Rgba16Unorm,
    Rgba16Float,

    Rgba32Sint,
    Rgba32Uint,
    Rgba32Float,

    S8,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl TextureFormat {
    /// True for every depth and depth+stencil variant.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::S8
                | Self::D16Unorm
                | Self::D32Float
                | Self::D24UnormS8Uint
                | Self::D32FloatS8Uint
        )
    }

    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::S8 | Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// Bytes per pixel. `D32FloatS8Uint` reports its packed backend footprint.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Sint | Self::R8Uint | Self::R8Snorm | Self::R8Unorm | Self::S8 => 1,
            Self::R16Sint
            | Self::R16Uint
            | Self::R16Snorm
            | Self::R16Unorm
            | Self::R16Float
            | Self::Rg8Sint
            | Self::Rg8Uint
            | Self::Rg8Snorm
            | Self::Rg8Unorm
            | Self::D16Unorm => 2,
            Self::R32Sint
            | Self::R32Uint
            | Self::R32Float
            | Self::Rg16Sint
            | Self::Rg16Uint
            | Self::Rg16Snorm
            | Self::Rg16Unorm
            | Self::Rg16Float
            | Self::Rgba8Sint
            | Self::Rgba8Uint
            | Self::Rgba8Snorm
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Rgb10a2Uint
            | Self::Rgb10a2Unorm
            | Self::Rg11b10Float
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::Rg32Sint
            | Self::Rg32Uint
            | Self::Rg32Float
            | Self::Rgba16Sint
            | Self::Rgba16Uint
            | Self::Rgba16Snorm
            | Self::Rgba16Unorm
            | Self::Rgba16Float
            | Self::D32FloatS8Uint => 8,
            Self::Rgba32Sint | Self::Rgba32Uint | Self::Rgba32Float => 16,
        }
    }
}

/// Vertex element formats: `{UINT|SINT|UNORM|SNORM|FLOAT}{8|16|32}[XN]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Uint8x2,
    Uint8x4,
    Sint8x2,
    Sint8x4,
    Unorm8x2,
    Unorm8x4,
    Snorm8x2,
    Snorm8x4,
    Uint16x2,
    Uint16x4,
    Sint16x2,
    Sint16x4,
    Unorm16x2,
    Unorm16x4,
    Snorm16x2,
    Snorm16x4,
    Float16x2,
    Float16x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    /// Size of one element in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Uint8x2 | Self::Sint8x2 | Self::Unorm8x2 | Self::Snorm8x2 => 2,
            Self::Uint8x4
            | Self::Sint8x4
            | Self::Unorm8x4
            | Self::Snorm8x4
            | Self::Uint16x2
            | Self::Sint16x2
            | Self::Unorm16x2
            | Self::Snorm16x2
            | Self::Float16x2
            | Self::Uint32
            | Self::Sint32
            | Self::Float32 => 4,
            Self::Uint16x4
            | Self::Sint16x4
            | Self::Unorm16x4
            | Self::Snorm16x4
            | Self::Float16x4
            | Self::Uint32x2
            | Self::Sint32x2
            | Self::Float32x2 => 8,
            Self::Uint32x3 | Self::Sint32x3 | Self::Float32x3 => 12,
            Self::Uint32x4 | Self::Sint32x4 | Self::Float32x4 => 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_stencil_classification() {
        assert!(TextureFormat::D32Float.is_depth_stencil());
        assert!(TextureFormat::D24UnormS8Uint.is_depth_stencil());
        assert!(TextureFormat::S8.is_depth_stencil());
        assert!(!TextureFormat::Rgba8Unorm.is_depth_stencil());
        assert!(!TextureFormat::S8.has_depth());
        assert!(TextureFormat::D32FloatS8Uint.has_stencil());
        assert!(!TextureFormat::D32Float.has_stencil());
    }

    #[test]
    fn pixel_sizes() {
        assert_eq!(TextureFormat::Rgba8Unorm.bytes_per_pixel(), 4);
        assert_eq!(TextureFormat::Rgba32Float.bytes_per_pixel(), 16);
        assert_eq!(TextureFormat::D16Unorm.bytes_per_pixel(), 2);
    }

    #[test]
    fn vertex_sizes() {
        assert_eq!(VertexFormat::Float32x3.size(), 12);
        assert_eq!(VertexFormat::Unorm8x4.size(), 4);
        assert_eq!(VertexFormat::Uint16x2.size(), 4);
    }
}
