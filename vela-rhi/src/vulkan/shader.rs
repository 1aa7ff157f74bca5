//! Vulkan shader modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::common::{ObjectTag, ShaderBlobCategory, ShaderStage};
use crate::device::{RenderObject, Shader, ShaderDescriptor, ShaderReflection};
use crate::error::{GfxError, GfxResult};

use super::DeviceShared;

pub(crate) fn create_shader(
    shared: &Arc<DeviceShared>,
    desc: &ShaderDescriptor<'_>,
) -> GfxResult<Box<dyn Shader>> {
    if desc.category != ShaderBlobCategory::Spirv {
        return Err(GfxError::not_supported(format!(
            "the vulkan backend consumes SPIR-V, not {:?}",
            desc.category
        )));
    }
    if desc.blob.is_empty() || desc.blob.len() % 4 != 0 {
        return Err(GfxError::invalid_argument(
            "SPIR-V blob length must be a non-zero multiple of four",
        ));
    }
    // SPIR-V is a stream of 4-byte little-endian words; the blob may not be
    // word-aligned, so re-pack it.
    let words: Vec<u32> = desc
        .blob
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
    let module = unsafe {
        shared
            .raw
            .create_shader_module(&create_info, None)
            .map_err(|e| shared.backend_err(e, "vkCreateShaderModule"))?
    };
    Ok(Box::new(VulkanShader {
        shared: shared.clone(),
        module,
        stage: desc.stage,
        entry_point: desc.entry_point.to_string(),
        reflection: desc.reflection.clone(),
        valid: AtomicBool::new(true),
    }))
}

pub struct VulkanShader {
    shared: Arc<DeviceShared>,
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    pub(crate) entry_point: String,
    reflection: ShaderReflection,
    valid: AtomicBool,
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_shader_module(self.module, None);
        }
    }
}

impl std::fmt::Debug for VulkanShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanShader")
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

impl RenderObject for VulkanShader {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Shader
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Shader for VulkanShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn category(&self) -> ShaderBlobCategory {
        ShaderBlobCategory::Spirv
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
