//! Translation of abstract resource transitions into Vulkan barriers.
//!
//! Each use bit contributes its access and the widest stage mask consistent
//! with it; texture states additionally resolve to a single image layout.

use ash::vk;

use crate::common::{BufferUses, TextureUses};

const SHADER_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::COMPUTE_SHADER.as_raw(),
);

const DEPTH_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Access and stage masks of a buffer state.
pub(crate) fn buffer_state(uses: BufferUses) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    let mut access = vk::AccessFlags::empty();
    let mut stages = vk::PipelineStageFlags::empty();
    if uses.contains(BufferUses::MAP_READ) {
        access |= vk::AccessFlags::HOST_READ;
        stages |= vk::PipelineStageFlags::HOST;
    }
    if uses.contains(BufferUses::MAP_WRITE) {
        access |= vk::AccessFlags::HOST_WRITE;
        stages |= vk::PipelineStageFlags::HOST;
    }
    if uses.contains(BufferUses::COPY_SRC) {
        access |= vk::AccessFlags::TRANSFER_READ;
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if uses.contains(BufferUses::COPY_DST) {
        access |= vk::AccessFlags::TRANSFER_WRITE;
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if uses.contains(BufferUses::INDEX) {
        access |= vk::AccessFlags::INDEX_READ;
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if uses.contains(BufferUses::VERTEX) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if uses.contains(BufferUses::CBUFFER) {
        access |= vk::AccessFlags::UNIFORM_READ;
        stages |= SHADER_STAGES;
    }
    if uses.contains(BufferUses::STORAGE_RO) {
        access |= vk::AccessFlags::SHADER_READ;
        stages |= SHADER_STAGES;
    }
    if uses.contains(BufferUses::STORAGE_RW) {
        access |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
        stages |= SHADER_STAGES;
    }
    if uses.contains(BufferUses::INDIRECT) {
        access |= vk::AccessFlags::INDIRECT_COMMAND_READ;
        stages |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if stages.is_empty() {
        stages = vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    (access, stages)
}

/// Access, stage and layout of a texture state.
pub(crate) fn texture_state(
    uses: TextureUses,
) -> (vk::AccessFlags, vk::PipelineStageFlags, vk::ImageLayout) {
    let mut access = vk::AccessFlags::empty();
    let mut stages = vk::PipelineStageFlags::empty();
    if uses.contains(TextureUses::COPY_SRC) {
        access |= vk::AccessFlags::TRANSFER_READ;
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if uses.contains(TextureUses::COPY_DST) {
        access |= vk::AccessFlags::TRANSFER_WRITE;
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if uses.contains(TextureUses::RESOURCE) {
        access |= vk::AccessFlags::SHADER_READ;
        stages |= SHADER_STAGES;
    }
    if uses.contains(TextureUses::RENDER_TARGET) {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        stages |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if uses.contains(TextureUses::DEPTH_READ) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
        stages |= DEPTH_STAGES;
    }
    if uses.contains(TextureUses::DEPTH_WRITE) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        stages |= DEPTH_STAGES;
    }
    if uses.intersects(TextureUses::STORAGE_RO | TextureUses::STORAGE_RW) {
        access |= vk::AccessFlags::SHADER_READ;
        if uses.contains(TextureUses::STORAGE_RW) {
            access |= vk::AccessFlags::SHADER_WRITE;
        }
        stages |= SHADER_STAGES;
    }
    if uses.contains(TextureUses::PRESENT) {
        access |= vk::AccessFlags::MEMORY_READ;
        stages |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    if stages.is_empty() {
        stages = vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    let layout = texture_layout(uses);
    (access, stages, layout)
}

/// Resolves a use set to one image layout; mixed read/write sets fall back to
/// GENERAL.
pub(crate) fn texture_layout(uses: TextureUses) -> vk::ImageLayout {
    if uses.contains(TextureUses::UNINITIALIZED) {
        return vk::ImageLayout::UNDEFINED;
    }
    if uses.contains(TextureUses::PRESENT) {
        return vk::ImageLayout::PRESENT_SRC_KHR;
    }
    if uses.intersects(TextureUses::STORAGE_RO | TextureUses::STORAGE_RW) {
        return vk::ImageLayout::GENERAL;
    }
    if uses == TextureUses::COPY_SRC {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else if uses == TextureUses::COPY_DST {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if uses == TextureUses::RESOURCE {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if uses == TextureUses::RENDER_TARGET {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if uses.contains(TextureUses::DEPTH_WRITE) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if uses == TextureUses::DEPTH_READ
        || uses == TextureUses::DEPTH_READ | TextureUses::RESOURCE
    {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::GENERAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_maps_to_undefined_layout() {
        let (access, _, layout) = texture_state(TextureUses::UNINITIALIZED);
        assert_eq!(layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(access, vk::AccessFlags::empty());
    }

    #[test]
    fn render_target_state() {
        let (access, stages, layout) = texture_state(TextureUses::RENDER_TARGET);
        assert_eq!(layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert!(access.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(stages, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn storage_uses_general_layout_and_all_shader_stages() {
        let (access, stages, layout) = texture_state(TextureUses::STORAGE_RW);
        assert_eq!(layout, vk::ImageLayout::GENERAL);
        assert!(access.contains(vk::AccessFlags::SHADER_WRITE));
        assert!(stages.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
        assert!(stages.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
    }

    #[test]
    fn depth_read_plus_resource_stays_read_only() {
        let layout = texture_layout(TextureUses::DEPTH_READ | TextureUses::RESOURCE);
        assert_eq!(layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn cbuffer_spans_every_shader_stage() {
        let (access, stages) = buffer_state(BufferUses::CBUFFER);
        assert_eq!(access, vk::AccessFlags::UNIFORM_READ);
        assert!(stages.contains(vk::PipelineStageFlags::VERTEX_SHADER));
        assert!(stages.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
    }

    #[test]
    fn copy_states() {
        let (access, stages) = buffer_state(BufferUses::COPY_DST);
        assert_eq!(access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(stages, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(
            texture_layout(TextureUses::COPY_SRC),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        );
    }
}
