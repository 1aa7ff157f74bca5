//! Vela RHI: a backend-agnostic Rendering Hardware Interface.
//!
//! One capability surface over Direct3D 12, Vulkan and Metal: resources,
//! pipelines, command recording and presentation behind backend-implemented
//! traits. The caller picks a backend at [`create_device`]; everything after
//! that goes through the traits in [`device`].
//!
//! This build ships the Vulkan backend (cargo feature `vulkan`, on by
//! default). The D3D12 and Metal descriptor surfaces exist unconditionally
//! and report [`GfxError::NotSupported`] when their backend is not compiled
//! in.

pub mod alloc;
pub mod bind_bridge;
pub mod common;
pub mod device;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod reflection;
pub mod resource;
pub mod root_signature;
pub mod structured;

#[cfg(feature = "vulkan")]
pub mod vulkan;

use std::sync::Arc;

pub use bind_bridge::{ArenaSlice, BindBridge, BoundView, CBufferArena};
pub use common::*;
pub use device::*;
pub use error::{ErrorKind, GfxError, GfxResult};
pub use format::{TextureFormat, VertexFormat};
pub use pipeline::*;
pub use reflection::{
    merge_shader_descs, merge_spirv_shader_descs, BoundResourceDesc, CBufferDesc,
    CBufferVariable, CombinedBinding, HlslShaderDesc, MergedShaderDesc,
    RegisterComponentType, ResourceBindType, ResourceReturnType, ShaderInputType,
    ShaderTypeDesc, ShaderTypeMember, SpirvBindingDesc, SpirvPushConstantDesc,
    SpirvShaderDesc, SrvDimension, VariableBaseType, VariableClass, VertexInputDesc,
};
pub use resource::*;
pub use root_signature::{
    BindingEntry, BindingLayout, BindingPlacement, DescriptorSetElement,
    DescriptorSetLayoutDesc, RootConstant, RootDescriptor, RootSignatureDescriptor,
    StaticSamplerBinding, MAX_ROOT_SIGNATURE_DWORDS,
};
pub use structured::{StructuredBufferStorage, StructuredBufferView};

#[cfg(feature = "window")]
pub use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Brings the requested backends up process-wide (Vulkan instance, debug
/// layers). Call once at program start, before any [`create_device`].
/// Returns `false` with the cause logged if any backend fails.
pub fn global_init_graphics(descs: &[BackendInitDescriptor]) -> bool {
    for desc in descs {
        match desc {
            BackendInitDescriptor::Vulkan(_init) => {
                #[cfg(feature = "vulkan")]
                {
                    if let Err(err) = vulkan::global_init(_init) {
                        log::error!("vulkan backend init failed: {err}");
                        return false;
                    }
                }
                #[cfg(not(feature = "vulkan"))]
                {
                    log::error!("vulkan backend is not compiled into this build");
                    return false;
                }
            }
            other => {
                log::error!(
                    "backend {:?} is not available in this build",
                    other.backend()
                );
                return false;
            }
        }
    }
    true
}

/// Tears down what [`global_init_graphics`] brought up. Devices created in
/// between must already be dropped.
pub fn global_terminate_graphics() {
    #[cfg(feature = "vulkan")]
    vulkan::global_terminate();
}

/// Enumerates adapters of the descriptor's backend and returns a device bound
/// to one of them. Fails with a logged [`GfxError`]; never panics.
pub fn create_device(desc: &DeviceDescriptor) -> GfxResult<Arc<dyn Device>> {
    match desc {
        DeviceDescriptor::Vulkan(_vk) => {
            #[cfg(feature = "vulkan")]
            {
                vulkan::create_device(_vk).map(|device| device as Arc<dyn Device>)
            }
            #[cfg(not(feature = "vulkan"))]
            {
                Err(GfxError::not_supported(
                    "vulkan backend is not compiled into this build",
                )
                .trace("create_device"))
            }
        }
        DeviceDescriptor::Dx12(_) => Err(GfxError::not_supported(
            "the d3d12 backend is not available in this build",
        )
        .trace("create_device")),
        DeviceDescriptor::Metal(_) => Err(GfxError::not_supported(
            "the metal backend is not available in this build",
        )
        .trace("create_device")),
    }
}
