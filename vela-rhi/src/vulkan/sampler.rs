//! Vulkan samplers, interned per device by descriptor equality. The device
//! owns the native handles; handed-out `Sampler` objects are wrappers over
//! the interned handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::common::{ObjectTag, SamplerDescriptor};
use crate::device::{RenderObject, ResourceId, ResourceView, Sampler};
use crate::error::GfxResult;

use super::{convert, DeviceShared};

pub(crate) fn make_create_info(desc: &SamplerDescriptor) -> vk::SamplerCreateInfo<'static> {
    let anisotropy = desc.anisotropy_clamp.clamp(1, 16) as f32;
    let mut create_info = vk::SamplerCreateInfo::default()
        .mag_filter(convert::map_filter(desc.mag_filter))
        .min_filter(convert::map_filter(desc.min_filter))
        .mipmap_mode(convert::map_mipmap_filter(desc.mipmap_filter))
        .address_mode_u(convert::map_address_mode(desc.address_s))
        .address_mode_v(convert::map_address_mode(desc.address_t))
        .address_mode_w(convert::map_address_mode(desc.address_r))
        .min_lod(desc.lod_min)
        .max_lod(desc.lod_max)
        .anisotropy_enable(desc.anisotropy_clamp > 1)
        .max_anisotropy(anisotropy)
        .unnormalized_coordinates(false);
    if let Some(compare) = desc.compare {
        create_info = create_info
            .compare_enable(true)
            .compare_op(convert::map_compare(compare));
    }
    create_info
}

pub(crate) fn create_sampler(
    shared: &Arc<DeviceShared>,
    desc: &SamplerDescriptor,
) -> GfxResult<Arc<dyn Sampler>> {
    let raw = {
        let cache = shared.sampler_cache.lock().unwrap();
        cache
            .iter()
            .find(|(cached, _)| cached == desc)
            .map(|(_, raw)| *raw)
    };
    let raw = match raw {
        Some(raw) => raw,
        None => {
            let create_info = make_create_info(desc);
            let raw = unsafe {
                shared
                    .raw
                    .create_sampler(&create_info, None)
                    .map_err(|e| shared.backend_err(e, "vkCreateSampler"))?
            };
            shared
                .sampler_cache
                .lock()
                .unwrap()
                .push((desc.clone(), raw));
            raw
        }
    };
    Ok(Arc::new(VulkanSampler {
        raw,
        valid: AtomicBool::new(true),
    }))
}

/// Wrapper over an interned sampler handle; the device destroys the handle.
pub struct VulkanSampler {
    pub(crate) raw: vk::Sampler,
    valid: AtomicBool,
}

impl std::fmt::Debug for VulkanSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSampler").finish()
    }
}

impl RenderObject for VulkanSampler {
    fn tag(&self) -> ObjectTag {
        ObjectTag::Sampler
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl ResourceView for VulkanSampler {
    fn resource_id(&self) -> ResourceId {
        0
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Sampler for VulkanSampler {
    fn as_resource_view(&self) -> &dyn ResourceView {
        self
    }
}
