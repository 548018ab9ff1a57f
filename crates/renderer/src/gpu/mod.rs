//! wgpu implementation of [`GpuBackend`].
//!
//! - `context` acquires a device/queue, headless or from a host.
//! - `pipeline` compiles the WGSL program inside a validation scope and links
//!   it against the reflected parameter slots.
//! - `uniforms` is the CPU image of the parameter block and checks its layout
//!   against the program.
//! - `target` holds the draw target, uploaded snapshots and read-back.

mod context;
mod pipeline;
mod target;
mod uniforms;

use wgpu::util::DeviceExt;

use crate::resources::{GpuBackend, GpuError, QuadDraw};
use crate::shader::ParameterSlots;
use crate::types::QuadVertex;

pub use context::GpuContext;
pub use pipeline::PortalProgram;
pub use target::{GpuImage, OffscreenTarget, RenderTarget, TARGET_FORMAT};

use uniforms::PortalUniforms;

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            queue,
            format,
        }
    }

    pub fn from_context(context: &GpuContext) -> Self {
        Self::new(context.device.clone(), context.queue.clone(), TARGET_FORMAT)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn upload(&self, image: &image::RgbaImage) -> GpuImage {
        GpuImage::upload(&self.device, &self.queue, image)
    }
}

impl GpuBackend for WgpuBackend {
    type Program = PortalProgram;
    type Quad = wgpu::Buffer;
    type Image = GpuImage;
    type Target = RenderTarget;

    fn compile(&mut self, source: &str) -> Result<PortalProgram, GpuError> {
        let module = pipeline::compile_module(&self.device, source)?;
        Ok(PortalProgram {
            module,
            linked: None,
        })
    }

    fn bind_parameters(
        &mut self,
        program: &mut PortalProgram,
        slots: &ParameterSlots,
    ) -> Result<(), GpuError> {
        program.linked = Some(pipeline::link(
            &self.device,
            &program.module,
            slots,
            self.format,
        )?);
        Ok(())
    }

    fn create_quad(&mut self, vertices: &[QuadVertex]) -> Result<wgpu::Buffer, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("portal quad"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(GpuError::Buffer(err.to_string())),
            None => Ok(buffer),
        }
    }

    fn draw(
        &mut self,
        target: &mut RenderTarget,
        program: &PortalProgram,
        quad: &wgpu::Buffer,
        draw: &QuadDraw<'_, GpuImage>,
    ) -> Result<(), GpuError> {
        let linked = program.linked.as_ref().ok_or(GpuError::NotInitialized)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniforms = PortalUniforms::new(draw.rect, (target.width, target.height), &draw.params);
        self.queue
            .write_buffer(&linked.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let image_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("portal window bind group"),
            layout: &linked.image_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: linked.texture_binding,
                    resource: wgpu::BindingResource::TextureView(&draw.image.view),
                },
                wgpu::BindGroupEntry {
                    binding: linked.sampler_binding,
                    resource: wgpu::BindingResource::Sampler(&linked.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("portal draw encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("portal pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&linked.pipeline);
            pass.set_bind_group(linked.uniform_group, &linked.uniform_bind_group, &[]);
            pass.set_bind_group(linked.image_group, &image_bind_group, &[]);
            pass.set_vertex_buffer(0, quad.slice(..));
            pass.draw(0..4, 0..1);
        }
        // Each draw submits on its own so the next one can rewrite the uniforms.
        self.queue.submit(std::iter::once(encoder.finish()));

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(GpuError::Draw(err.to_string())),
            None => Ok(()),
        }
    }

    fn release_program(&mut self, program: PortalProgram) {
        drop(program);
    }

    fn release_quad(&mut self, quad: wgpu::Buffer) {
        quad.destroy();
    }
}
