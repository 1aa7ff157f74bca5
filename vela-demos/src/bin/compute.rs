//! Compute dispatch with a verified result: a kernel doubles 64 counters in
//! a storage buffer, the result is copied to readback memory and checked on
//! the host. Exercises the bind bridge path end to end (root descriptor,
//! barriers, fence).

use vela_rhi::{
    Buffer as _, BufferBarrier, BufferDescriptor, BufferUses, CommandBuffer as _,
    CommandEncoder as _, CommandQueue as _, ComputeCommandEncoder as _, Device as _,
    DeviceDescriptor, Fence as _, MemoryType, QueueType,
    ResourceBindType, ShaderBlobCategory, ShaderDescriptor, ShaderReflection, ShaderStage,
    ShaderStages, SpirvBindingDesc, SpirvShaderDesc, VulkanDeviceDescriptor,
};

const ELEMENTS: usize = 64;

const COMPUTE_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x < arrayLength(&data)) {
        data[gid.x] = data[gid.x] * 2u;
    }
}
"#;

fn compile_wgsl_to_spirv(source: &str) -> Vec<u8> {
    let module = naga::front::wgsl::parse_str(source).expect("parse wgsl");
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::default(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .expect("validate wgsl");
    let options = naga::back::spv::Options::default();
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: naga::ShaderStage::Compute,
        entry_point: "main".to_string(),
    };
    let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .expect("compile to spirv");
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn main() {
    env_logger::init();
    let device = vela_rhi::create_device(&DeviceDescriptor::Vulkan(
        VulkanDeviceDescriptor::default(),
    ))
    .expect("create vulkan device");
    log::info!("running on {}", device.detail().name);
    let queue = device.queue(QueueType::Direct, 0).expect("direct queue");

    let byte_size = (ELEMENTS * 4) as u64;
    let values: Vec<u32> = (0..ELEMENTS as u32).collect();
    let staging = device
        .create_buffer(&BufferDescriptor {
            label: Some("counter staging"),
            size: byte_size,
            memory: MemoryType::Upload,
            usage: BufferUses::MAP_WRITE | BufferUses::COPY_SRC,
            ..Default::default()
        })
        .expect("create staging");
    staging
        .write(0, bytemuck::cast_slice(&values))
        .expect("write staging");
    let storage = device
        .create_buffer(&BufferDescriptor {
            label: Some("counters"),
            size: byte_size,
            memory: MemoryType::Device,
            usage: BufferUses::COPY_DST | BufferUses::COPY_SRC | BufferUses::STORAGE_RW,
            ..Default::default()
        })
        .expect("create storage buffer");
    let readback = device
        .create_buffer(&BufferDescriptor {
            label: Some("readback"),
            size: byte_size,
            memory: MemoryType::Readback,
            usage: BufferUses::MAP_READ | BufferUses::COPY_DST,
            ..Default::default()
        })
        .expect("create readback buffer");

    // Reflection mirrors the kernel's single storage binding. The bridge
    // places it as root descriptor 0, which the Vulkan backend realizes at
    // set 0 / binding 0 — matching the kernel's @group(0) @binding(0).
    let reflection = SpirvShaderDesc {
        bindings: vec![SpirvBindingDesc {
            name: "data".to_string(),
            bind_type: ResourceBindType::RwBuffer,
            set: 0,
            binding: 0,
            count: 1,
            stages: ShaderStages::COMPUTE,
            cbuffer: None,
        }],
        group_size: (64, 1, 1),
        stage: ShaderStages::COMPUTE,
        ..Default::default()
    };
    let blob = compile_wgsl_to_spirv(COMPUTE_WGSL);
    let shader = device
        .create_shader(&ShaderDescriptor {
            label: Some("double"),
            blob: &blob,
            category: ShaderBlobCategory::Spirv,
            stage: ShaderStage::Compute,
            entry_point: "main",
            reflection: ShaderReflection::Spirv(reflection.clone()),
        })
        .expect("create shader");

    let merged = vela_rhi::merge_spirv_shader_descs(&[&reflection]).expect("merge reflection");
    let layout = vela_rhi::BindingLayout::build(&merged, &[]).expect("binding layout");
    let root_signature = device
        .create_root_signature(&layout.descriptor)
        .expect("create root signature");
    let pipeline = device
        .create_compute_pipeline(&vela_rhi::ComputePipelineDescriptor {
            label: Some("double"),
            root_signature: root_signature.as_ref(),
            shader: shader.as_ref(),
        })
        .expect("create compute pipeline");

    let data_binding = layout.binding_id("data").expect("binding id");
    log::debug!(
        "binding 'data' placed as {:?}",
        layout.binding(data_binding).unwrap().placement
    );

    let mut command_buffer = device
        .create_command_buffer(queue.as_ref())
        .expect("create command buffer");
    command_buffer.begin().expect("begin");
    command_buffer.copy_buffer_to_buffer(staging.as_ref(), 0, storage.as_ref(), 0, byte_size);
    command_buffer.resource_barrier(
        &[BufferBarrier {
            buffer: storage.as_ref(),
            before: BufferUses::COPY_DST,
            after: BufferUses::STORAGE_RW,
            handoff: None,
        }],
        &[],
    );
    {
        let mut pass = command_buffer.begin_compute_pass();
        pass.bind_root_signature(root_signature.as_ref());
        pass.bind_root_descriptor(0, storage.as_ref(), 0, byte_size);
        pass.bind_pipeline(pipeline.as_ref());
        pass.dispatch(1, 1, 1);
    }
    command_buffer.resource_barrier(
        &[BufferBarrier {
            buffer: storage.as_ref(),
            before: BufferUses::STORAGE_RW,
            after: BufferUses::COPY_SRC,
            handoff: None,
        }],
        &[],
    );
    command_buffer.copy_buffer_to_buffer(storage.as_ref(), 0, readback.as_ref(), 0, byte_size);
    command_buffer.end().expect("end");

    let fence = device.create_fence().expect("create fence");
    queue
        .submit(
            &mut [command_buffer.as_mut()],
            &[],
            &[],
            Some(fence.as_ref()),
        )
        .expect("submit");
    fence.wait().expect("wait fence");

    let mut result = vec![0u32; ELEMENTS];
    let ptr = readback.map(0, byte_size).expect("map readback");
    unsafe {
        std::ptr::copy_nonoverlapping(
            ptr,
            result.as_mut_ptr() as *mut u8,
            byte_size as usize,
        );
    }
    readback.unmap(0, byte_size);
    for (index, value) in result.iter().enumerate() {
        assert_eq!(*value, index as u32 * 2, "counter {index} mismatch");
    }
    println!("compute dispatch verified {ELEMENTS} counters: OK");
}
