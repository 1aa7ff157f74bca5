//! Offscreen triangle: staging upload, barriers, a render pass and an indexed
//! draw, fenced on the host. Shaders are compiled from WGSL at runtime via
//! naga, standing in for the offline HLSL tool chain.

use vela_rhi::{
    Buffer as _, BufferBarrier, BufferDescriptor, BufferUses, ColorAttachment, ColorClearValue,
    ColorTargetState, CommandBuffer as _, CommandQueue as _, CullMode, Device as _,
    DeviceDescriptor, Fence as _, FenceState, GraphicsCommandEncoder as _,
    GraphicsPipelineDescriptor, IndexBufferBinding,
    IndexFormat, LoadAction, MemoryType, PrimitiveState, QueueType, RenderPassDescriptor,
    ShaderBlobCategory, ShaderDescriptor, ShaderReflection, ShaderStage, ShaderStages,
    SpirvShaderDesc, StoreAction, SubresourceRange, TextureBarrier, TextureDescriptor,
    TextureFormat, TextureUses, TextureViewDescriptor, VertexBufferBinding, VertexBufferLayout,
    VertexElement, VertexFormat, VertexStepMode, ViewUsage, VulkanDeviceDescriptor,
};

const VERTEX_WGSL: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn main(@location(0) pos: vec3<f32>, @builtin(vertex_index) vid: u32) -> VsOut {
    var colors = array<vec3<f32>, 3>(
        vec3<f32>(1.0, 0.0, 0.0),
        vec3<f32>(0.0, 1.0, 0.0),
        vec3<f32>(0.0, 0.0, 1.0),
    );
    var out: VsOut;
    out.pos = vec4<f32>(pos, 1.0);
    out.color = colors[vid % 3u];
    return out;
}
"#;

const FRAGMENT_WGSL: &str = r#"
@fragment
fn main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0);
}
"#;

fn compile_wgsl_to_spirv(source: &str, stage: naga::ShaderStage) -> Vec<u8> {
    let module = naga::front::wgsl::parse_str(source).expect("parse wgsl");
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::default(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .expect("validate wgsl");
    let options = naga::back::spv::Options::default();
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
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

    // Render target and its view.
    let render_target = device
        .create_texture(&TextureDescriptor {
            label: Some("triangle target"),
            width: 256,
            height: 256,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUses::RENDER_TARGET | TextureUses::COPY_SRC,
            ..Default::default()
        })
        .expect("create render target");
    let target_view = device
        .create_texture_view(
            render_target.as_ref(),
            &TextureViewDescriptor {
                usage: ViewUsage::RenderTarget,
                dimension: Default::default(),
                format: TextureFormat::Rgba8Unorm,
                range: SubresourceRange::ALL,
            },
        )
        .expect("create target view");

    // Geometry: vertices through a staging copy, indices written directly.
    let vertices: [[f32; 3]; 3] = [[0.0, 0.5, 0.0], [-0.5, -0.366, 0.0], [0.5, -0.366, 0.0]];
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let staging = device
        .create_buffer(&BufferDescriptor {
            label: Some("vertex staging"),
            size: vertex_bytes.len() as u64,
            memory: MemoryType::Upload,
            usage: BufferUses::MAP_WRITE | BufferUses::COPY_SRC,
            ..Default::default()
        })
        .expect("create staging buffer");
    staging.write(0, vertex_bytes).expect("write staging");
    let vertex_buffer = device
        .create_buffer(&BufferDescriptor {
            label: Some("vertices"),
            size: vertex_bytes.len() as u64,
            memory: MemoryType::Device,
            usage: BufferUses::COPY_DST | BufferUses::VERTEX,
            ..Default::default()
        })
        .expect("create vertex buffer");
    let indices: [u16; 3] = [0, 1, 2];
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let index_buffer = device
        .create_buffer(&BufferDescriptor {
            label: Some("indices"),
            size: index_bytes.len() as u64,
            memory: MemoryType::Upload,
            usage: BufferUses::MAP_WRITE | BufferUses::INDEX,
            ..Default::default()
        })
        .expect("create index buffer");
    index_buffer.write(0, index_bytes).expect("write indices");

    // Shaders carry an empty reflection record: this pipeline binds nothing.
    let vs_blob = compile_wgsl_to_spirv(VERTEX_WGSL, naga::ShaderStage::Vertex);
    let fs_blob = compile_wgsl_to_spirv(FRAGMENT_WGSL, naga::ShaderStage::Fragment);
    let vs_reflection = SpirvShaderDesc {
        stage: ShaderStages::VERTEX,
        ..Default::default()
    };
    let fs_reflection = SpirvShaderDesc {
        stage: ShaderStages::PIXEL,
        ..Default::default()
    };
    let vertex_shader = device
        .create_shader(&ShaderDescriptor {
            label: Some("triangle vs"),
            blob: &vs_blob,
            category: ShaderBlobCategory::Spirv,
            stage: ShaderStage::Vertex,
            entry_point: "main",
            reflection: ShaderReflection::Spirv(vs_reflection.clone()),
        })
        .expect("create vertex shader");
    let pixel_shader = device
        .create_shader(&ShaderDescriptor {
            label: Some("triangle ps"),
            blob: &fs_blob,
            category: ShaderBlobCategory::Spirv,
            stage: ShaderStage::Pixel,
            entry_point: "main",
            reflection: ShaderReflection::Spirv(fs_reflection.clone()),
        })
        .expect("create pixel shader");

    let merged = vela_rhi::merge_spirv_shader_descs(&[&vs_reflection, &fs_reflection])
        .expect("merge reflection");
    let layout = vela_rhi::BindingLayout::build(&merged, &[]).expect("binding layout");
    let root_signature = device
        .create_root_signature(&layout.descriptor)
        .expect("create root signature");

    let pipeline = device
        .create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: Some("triangle"),
            root_signature: root_signature.as_ref(),
            vertex_shader: vertex_shader.as_ref(),
            pixel_shader: Some(pixel_shader.as_ref()),
            vertex_buffers: vec![VertexBufferLayout {
                stride: 12,
                step_mode: VertexStepMode::Vertex,
                elements: vec![VertexElement {
                    location: 0,
                    semantic: "POSITION".to_string(),
                    semantic_index: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                }],
            }],
            primitive: PrimitiveState {
                cull_mode: CullMode::None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: Default::default(),
            color_targets: vec![ColorTargetState::opaque(TextureFormat::Rgba8Unorm)],
        })
        .expect("create pipeline");

    let mut command_buffer = device
        .create_command_buffer(queue.as_ref())
        .expect("create command buffer");
    command_buffer.begin().expect("begin");
    command_buffer.copy_buffer_to_buffer(
        staging.as_ref(),
        0,
        vertex_buffer.as_ref(),
        0,
        vertex_bytes.len() as u64,
    );
    command_buffer.resource_barrier(
        &[BufferBarrier {
            buffer: vertex_buffer.as_ref(),
            before: BufferUses::COPY_DST,
            after: BufferUses::VERTEX,
            handoff: None,
        }],
        &[TextureBarrier {
            texture: render_target.as_ref(),
            before: TextureUses::UNINITIALIZED,
            after: TextureUses::RENDER_TARGET,
            handoff: None,
            range: None,
        }],
    );
    {
        let mut pass = command_buffer.begin_render_pass(&RenderPassDescriptor {
            label: Some("triangle pass"),
            color_attachments: &[ColorAttachment {
                view: target_view.as_ref(),
                load: LoadAction::Clear,
                store: StoreAction::Store,
                clear: ColorClearValue::new(0.0, 0.0, 0.0, 1.0),
            }],
            depth_stencil: None,
        });
        pass.bind_pipeline(pipeline.as_ref());
        pass.bind_vertex_buffers(
            0,
            &[VertexBufferBinding {
                buffer: vertex_buffer.as_ref(),
                offset: 0,
            }],
        );
        pass.bind_index_buffer(IndexBufferBinding {
            buffer: index_buffer.as_ref(),
            offset: 0,
            format: IndexFormat::Uint16,
        });
        pass.draw_indexed(3, 1, 0, 0, 0);
    }
    command_buffer.end().expect("end");

    let fence = device.create_fence().expect("create fence");
    assert_eq!(fence.state(), FenceState::NotSubmitted);
    queue
        .submit(
            &mut [command_buffer.as_mut()],
            &[],
            &[],
            Some(fence.as_ref()),
        )
        .expect("submit");
    fence.wait().expect("wait fence");
    assert_eq!(fence.state(), FenceState::Complete);
    println!("triangle rendered offscreen and fenced: OK");
}
