use std::borrow::Cow;

use crate::resources::GpuError;
use crate::shader::{ParameterSlots, FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::types::QuadVertex;

use super::uniforms::PortalUniforms;

/// Compiled effect program and everything derived from its parameter slots.
pub struct PortalProgram {
    pub(crate) module: wgpu::ShaderModule,
    pub(crate) linked: Option<LinkedProgram>,
}

pub(crate) struct LinkedProgram {
    pub pipeline: wgpu::RenderPipeline,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub uniform_group: u32,
    pub image_layout: wgpu::BindGroupLayout,
    pub image_group: u32,
    pub texture_binding: u32,
    pub sampler_binding: u32,
    pub sampler: wgpu::Sampler,
}

/// Compiles WGSL inside a validation scope so bad source surfaces as an error.
pub(crate) fn compile_module(
    device: &wgpu::Device,
    source: &str,
) -> Result<wgpu::ShaderModule, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("portal effect"),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_owned())),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(GpuError::Compile(err.to_string())),
        None => Ok(module),
    }
}

pub(crate) fn link(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    slots: &ParameterSlots,
    format: wgpu::TextureFormat,
) -> Result<LinkedProgram, GpuError> {
    PortalUniforms::check_layout(slots)?;
    if slots.texture.0 != slots.sampler.0 || slots.texture.0 == slots.uniform_group {
        return Err(GpuError::Compile(format!(
            "window texture and sampler must share a group apart from the parameters (texture {:?}, sampler {:?})",
            slots.texture, slots.sampler
        )));
    }
    // The pipeline layout lists groups 0 and 1 in order.
    if slots.uniform_group.max(slots.texture.0) > 1 {
        return Err(GpuError::Compile(format!(
            "effect program uses bind group {} but only groups 0 and 1 are available",
            slots.uniform_group.max(slots.texture.0)
        )));
    }

    let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("portal uniform layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: slots.uniform_binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });

    let image_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("portal window layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: slots.texture.1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: slots.sampler.1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("portal uniforms"),
        size: std::mem::size_of::<PortalUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("portal uniform bind group"),
        layout: &uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: slots.uniform_binding,
            resource: uniform_buffer.as_entire_binding(),
        }],
    });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("portal window sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });

    let layouts: [&wgpu::BindGroupLayout; 2] = if slots.uniform_group == 0 {
        [&uniform_layout, &image_layout]
    } else {
        [&image_layout, &uniform_layout]
    };
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("portal pipeline layout"),
        bind_group_layouts: &layouts,
        push_constant_ranges: &[],
    });

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("portal pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(VERTEX_ENTRY),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(FRAGMENT_ENTRY),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(GpuError::Compile(err.to_string()));
    }

    Ok(LinkedProgram {
        pipeline,
        uniform_buffer,
        uniform_bind_group,
        uniform_group: slots.uniform_group,
        image_layout,
        image_group: slots.texture.0,
        texture_binding: slots.texture.1,
        sampler_binding: slots.sampler.1,
        sampler,
    })
}
