//! Renderer crate for the portal closing effect.
//!
//! The effect is defined once, as the pure function [`kernel::shade`], and
//! executed either on the GPU (the WGSL program in [`shader`], driven through
//! [`gpu::WgpuBackend`]) or on the CPU ([`software::SoftwareBackend`]). The
//! flow for one animated window per frame is:
//!
//! ```text
//!   animator ──▶ EffectResources::ensure_initialized ──▶ compile + reflect + quad
//!       │
//!       └──▶ EffectResources::draw(QuadDraw) ──▶ GpuBackend::draw ──▶ target
//! ```
//!
//! [`resources::EffectResources`] owns the program, its parameter slots and the
//! quad geometry, and is the only place that creates or releases them.

pub mod gpu;
pub mod kernel;
pub mod resources;
pub mod shader;
pub mod software;
pub mod types;

pub use resources::{EffectResources, GpuBackend, GpuError, QuadDraw};
pub use shader::{BindingSlot, BindingTable, ParameterSlots, ShaderError};
pub use software::{SnapshotImage, SoftwareBackend};
pub use types::{ImageSampler, KernelParams, QuadVertex, Rect, Rgba, QUAD_VERTICES};
