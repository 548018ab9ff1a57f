use bytemuck::{Pod, Zeroable};

use crate::resources::GpuError;
use crate::shader::{ParameterSlots, UNIFORM_PARAMETERS};
use crate::types::{KernelParams, Rect};

/// CPU image of the program's `PortalParams` uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct PortalUniforms {
    pub rect: [f32; 4],
    pub viewport: [f32; 2],
    pub size: [f32; 2],
    pub seed: [f32; 2],
    pub progress: f32,
    pub duration: f32,
    pub color: [f32; 3],
    pub rotation_speed: f32,
    pub whirling: f32,
    pub _padding: [f32; 3],
}

impl PortalUniforms {
    pub fn new(rect: Rect, viewport: (u32, u32), params: &KernelParams) -> Self {
        Self {
            rect: [rect.x, rect.y, rect.width, rect.height],
            viewport: [viewport.0.max(1) as f32, viewport.1.max(1) as f32],
            size: params.size,
            seed: params.seed,
            progress: params.progress,
            duration: params.duration,
            color: params.color,
            rotation_speed: params.rotation_speed,
            whirling: params.whirling,
            _padding: [0.0; 3],
        }
    }

    /// Byte offset of each field, in the order of [`UNIFORM_PARAMETERS`].
    fn offsets() -> [u32; UNIFORM_PARAMETERS.len()] {
        [
            std::mem::offset_of!(Self, rect) as u32,
            std::mem::offset_of!(Self, viewport) as u32,
            std::mem::offset_of!(Self, size) as u32,
            std::mem::offset_of!(Self, seed) as u32,
            std::mem::offset_of!(Self, progress) as u32,
            std::mem::offset_of!(Self, duration) as u32,
            std::mem::offset_of!(Self, color) as u32,
            std::mem::offset_of!(Self, rotation_speed) as u32,
            std::mem::offset_of!(Self, whirling) as u32,
        ]
    }

    /// Checks that the program reads every parameter where this struct writes it.
    pub fn check_layout(slots: &ParameterSlots) -> Result<(), GpuError> {
        for ((name, expected), found) in UNIFORM_PARAMETERS
            .into_iter()
            .zip(Self::offsets())
            .zip(slots.offsets)
        {
            if expected != found {
                return Err(GpuError::Layout {
                    name,
                    expected,
                    found,
                });
            }
        }
        let expected = std::mem::size_of::<Self>() as u32;
        if slots.uniform_size != expected {
            return Err(GpuError::Layout {
                name: "PortalParams",
                expected,
                found: slots.uniform_size,
            });
        }
        Ok(())
    }
}
