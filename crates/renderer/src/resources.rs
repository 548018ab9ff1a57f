//! Lifetime management for the effect's GPU resource set.
//!
//! [`EffectResources`] owns the compiled program, its resolved parameter slots
//! and the static quad buffer. The concrete GPU calls sit behind
//! [`GpuBackend`], so the same lifecycle drives the wgpu device, the CPU
//! rasterizer and the recording fakes used in tests.

use std::borrow::Cow;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::shader::{reflect_bindings, ParameterSlots, ShaderError, PORTAL_SHADER_WGSL};
use crate::types::{KernelParams, QuadVertex, Rect, QUAD_VERTICES};

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to compile effect program: {0}")]
    Compile(String),
    #[error(transparent)]
    Binding(#[from] ShaderError),
    #[error("parameter '{name}' sits at offset {found}, upload layout expects {expected}")]
    Layout {
        name: &'static str,
        expected: u32,
        found: u32,
    },
    #[error("failed to allocate quad geometry: {0}")]
    Buffer(String),
    #[error("draw failed: {0}")]
    Draw(String),
    #[error("effect resources are not initialized")]
    NotInitialized,
    #[error("effect is unavailable after an earlier initialization failure")]
    Unavailable,
}

/// One textured quad to draw with the effect program.
#[derive(Debug, Clone, Copy)]
pub struct QuadDraw<'a, I> {
    /// Destination in target-local pixels.
    pub rect: Rect,
    pub params: KernelParams,
    pub image: &'a I,
}

/// The GPU operations the resource manager needs.
///
/// All calls happen on the thread that owns the rendering context.
pub trait GpuBackend {
    type Program;
    type Quad;
    /// Captured window appearance, sampled by the program.
    type Image: Clone;
    /// Surface the effect draws into.
    type Target;

    fn compile(&mut self, source: &str) -> Result<Self::Program, GpuError>;

    /// Wires the resolved parameter slots into the program.
    fn bind_parameters(
        &mut self,
        program: &mut Self::Program,
        slots: &ParameterSlots,
    ) -> Result<(), GpuError>;

    fn create_quad(&mut self, vertices: &[QuadVertex]) -> Result<Self::Quad, GpuError>;

    fn draw(
        &mut self,
        target: &mut Self::Target,
        program: &Self::Program,
        quad: &Self::Quad,
        draw: &QuadDraw<'_, Self::Image>,
    ) -> Result<(), GpuError>;

    fn release_program(&mut self, program: Self::Program);

    fn release_quad(&mut self, quad: Self::Quad);
}

struct ResourceSet<B: GpuBackend> {
    program: B::Program,
    slots: ParameterSlots,
    quad: B::Quad,
}

enum ResourceState<B: GpuBackend> {
    Uninitialized,
    Ready(ResourceSet<B>),
    Failed,
}

/// Lazily created program, parameter table and quad buffer.
///
/// Initialization happens at most once per lifecycle. A failed initialization
/// latches until [`teardown`](Self::teardown) resets the manager.
pub struct EffectResources<B: GpuBackend> {
    backend: B,
    source: Cow<'static, str>,
    state: ResourceState<B>,
}

impl<B: GpuBackend> EffectResources<B> {
    pub fn new(backend: B) -> Self {
        Self::with_source(backend, PORTAL_SHADER_WGSL)
    }

    /// Uses a different effect program. It must expose the same parameters.
    pub fn with_source(backend: B, source: impl Into<Cow<'static, str>>) -> Self {
        Self {
            backend,
            source: source.into(),
            state: ResourceState::Uninitialized,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ResourceState::Ready(_))
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, ResourceState::Failed)
    }

    /// Parameter slots of the live program, if initialized.
    pub fn slots(&self) -> Option<&ParameterSlots> {
        match &self.state {
            ResourceState::Ready(set) => Some(&set.slots),
            _ => None,
        }
    }

    /// Creates the resource set unless it already exists.
    pub fn ensure_initialized(&mut self) -> Result<(), GpuError> {
        match self.state {
            ResourceState::Ready(_) => return Ok(()),
            ResourceState::Failed => return Err(GpuError::Unavailable),
            ResourceState::Uninitialized => {}
        }

        match self.build() {
            Ok(set) => {
                info!(
                    uniform_bytes = set.slots.uniform_size,
                    "effect resources initialized"
                );
                self.state = ResourceState::Ready(set);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "failed to initialize effect resources");
                self.state = ResourceState::Failed;
                Err(err)
            }
        }
    }

    fn build(&mut self) -> Result<ResourceSet<B>, GpuError> {
        let mut program = self.backend.compile(&self.source)?;

        let slots = match reflect_bindings(&self.source)
            .and_then(|table| ParameterSlots::resolve(&table))
        {
            Ok(slots) => slots,
            Err(err) => {
                self.backend.release_program(program);
                return Err(err.into());
            }
        };
        if let Err(err) = self.backend.bind_parameters(&mut program, &slots) {
            self.backend.release_program(program);
            return Err(err);
        }

        match self.backend.create_quad(&QUAD_VERTICES) {
            Ok(quad) => Ok(ResourceSet {
                program,
                slots,
                quad,
            }),
            Err(err) => {
                self.backend.release_program(program);
                Err(err)
            }
        }
    }

    /// Draws one quad. Requires a successful [`ensure_initialized`](Self::ensure_initialized).
    pub fn draw(
        &mut self,
        target: &mut B::Target,
        draw: &QuadDraw<'_, B::Image>,
    ) -> Result<(), GpuError> {
        match &self.state {
            ResourceState::Ready(set) => self.backend.draw(target, &set.program, &set.quad, draw),
            ResourceState::Failed => Err(GpuError::Unavailable),
            ResourceState::Uninitialized => Err(GpuError::NotInitialized),
        }
    }

    /// Releases everything and returns to the uninitialized state.
    ///
    /// Safe to call repeatedly. Also clears a latched initialization failure.
    pub fn teardown(&mut self) {
        match std::mem::replace(&mut self.state, ResourceState::Uninitialized) {
            ResourceState::Ready(set) => {
                self.backend.release_quad(set.quad);
                self.backend.release_program(set.program);
                debug!("effect resources released");
            }
            ResourceState::Failed => debug!("cleared effect initialization failure"),
            ResourceState::Uninitialized => {}
        }
    }
}

impl<B: GpuBackend> Drop for EffectResources<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Default)]
    struct Journal {
        compiles: usize,
        binds: usize,
        quads: usize,
        draws: Vec<Rect>,
        released_programs: usize,
        released_quads: usize,
    }

    /// Backend that records every call and fails on request.
    #[derive(Default, Clone)]
    struct RecordingBackend {
        journal: Rc<RefCell<Journal>>,
        fail_compile: bool,
        fail_quad: bool,
        fail_draw: bool,
    }

    impl GpuBackend for RecordingBackend {
        type Program = u32;
        type Quad = usize;
        type Image = &'static str;
        type Target = Vec<&'static str>;

        fn compile(&mut self, _source: &str) -> Result<u32, GpuError> {
            self.journal.borrow_mut().compiles += 1;
            if self.fail_compile {
                return Err(GpuError::Compile("syntax error".into()));
            }
            Ok(7)
        }

        fn bind_parameters(
            &mut self,
            _program: &mut u32,
            _slots: &ParameterSlots,
        ) -> Result<(), GpuError> {
            self.journal.borrow_mut().binds += 1;
            Ok(())
        }

        fn create_quad(&mut self, vertices: &[QuadVertex]) -> Result<usize, GpuError> {
            self.journal.borrow_mut().quads += 1;
            if self.fail_quad {
                return Err(GpuError::Buffer("out of memory".into()));
            }
            Ok(vertices.len())
        }

        fn draw(
            &mut self,
            target: &mut Vec<&'static str>,
            _program: &u32,
            _quad: &usize,
            draw: &QuadDraw<'_, &'static str>,
        ) -> Result<(), GpuError> {
            if self.fail_draw {
                return Err(GpuError::Draw("device lost".into()));
            }
            self.journal.borrow_mut().draws.push(draw.rect);
            target.push(draw.image);
            Ok(())
        }

        fn release_program(&mut self, _program: u32) {
            self.journal.borrow_mut().released_programs += 1;
        }

        fn release_quad(&mut self, _quad: usize) {
            self.journal.borrow_mut().released_quads += 1;
        }
    }

    fn quad_draw<'a>(image: &'a &'static str) -> QuadDraw<'a, &'static str> {
        QuadDraw {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            params: KernelParams::default(),
            image,
        }
    }

    #[test]
    fn initialization_happens_once() {
        let backend = RecordingBackend::default();
        let journal = backend.journal.clone();
        let mut resources = EffectResources::new(backend);
        for _ in 0..5 {
            resources.ensure_initialized().unwrap();
        }
        let journal = journal.borrow();
        assert_eq!(journal.compiles, 1);
        assert_eq!(journal.binds, 1);
        assert_eq!(journal.quads, 1);
        assert!(resources.is_ready());
        assert_eq!(resources.slots().map(|slots| slots.uniform_size), Some(80));
    }

    #[test]
    fn teardown_is_idempotent_and_reversible() {
        let backend = RecordingBackend::default();
        let journal = backend.journal.clone();
        let mut resources = EffectResources::new(backend);
        resources.ensure_initialized().unwrap();
        for _ in 0..3 {
            resources.teardown();
        }
        assert_eq!(journal.borrow().released_programs, 1);
        assert_eq!(journal.borrow().released_quads, 1);
        assert!(!resources.is_ready());

        resources.ensure_initialized().unwrap();
        let mut target = Vec::new();
        resources.draw(&mut target, &quad_draw(&"snapshot")).unwrap();
        assert_eq!(target, vec!["snapshot"]);
        assert_eq!(journal.borrow().compiles, 2);
        assert_eq!(journal.borrow().draws, vec![Rect::new(0.0, 0.0, 10.0, 10.0)]);
    }

    #[test]
    fn draw_requires_initialization() {
        let mut resources = EffectResources::new(RecordingBackend::default());
        let mut target = Vec::new();
        let err = resources.draw(&mut target, &quad_draw(&"x")).unwrap_err();
        assert!(matches!(err, GpuError::NotInitialized));
        assert!(target.is_empty());
    }

    #[test]
    fn compile_failure_latches_until_teardown() {
        let backend = RecordingBackend {
            fail_compile: true,
            ..RecordingBackend::default()
        };
        let journal = backend.journal.clone();
        let mut resources = EffectResources::new(backend);

        assert!(matches!(resources.ensure_initialized(), Err(GpuError::Compile(_))));
        assert!(matches!(resources.ensure_initialized(), Err(GpuError::Unavailable)));
        assert_eq!(journal.borrow().compiles, 1);
        assert!(resources.has_failed());

        resources.backend_mut().fail_compile = false;
        resources.teardown();
        resources.ensure_initialized().unwrap();
        assert_eq!(journal.borrow().compiles, 2);
    }

    #[test]
    fn missing_parameter_fails_and_releases_program() {
        let source = r#"
struct Params { progress: f32 };
@group(0) @binding(0) var<uniform> params: Params;
"#;
        let backend = RecordingBackend::default();
        let journal = backend.journal.clone();
        let mut resources = EffectResources::with_source(backend, source);
        let err = resources.ensure_initialized().unwrap_err();
        assert!(matches!(err, GpuError::Binding(ShaderError::MissingBinding(_))));
        assert_eq!(journal.borrow().released_programs, 1);
        assert_eq!(journal.borrow().quads, 0);
    }

    #[test]
    fn quad_failure_releases_program() {
        let backend = RecordingBackend {
            fail_quad: true,
            ..RecordingBackend::default()
        };
        let journal = backend.journal.clone();
        let mut resources = EffectResources::new(backend);
        assert!(matches!(resources.ensure_initialized(), Err(GpuError::Buffer(_))));
        assert_eq!(journal.borrow().released_programs, 1);
    }

    #[test]
    fn draw_errors_leave_resources_ready() {
        let backend = RecordingBackend {
            fail_draw: true,
            ..RecordingBackend::default()
        };
        let mut resources = EffectResources::new(backend);
        resources.ensure_initialized().unwrap();
        let mut target = Vec::new();
        assert!(resources.draw(&mut target, &quad_draw(&"x")).is_err());
        assert!(resources.is_ready());
    }

    #[test]
    fn dropping_releases_resources() {
        let backend = RecordingBackend::default();
        let journal = backend.journal.clone();
        {
            let mut resources = EffectResources::new(backend);
            resources.ensure_initialized().unwrap();
        }
        assert_eq!(journal.borrow().released_programs, 1);
        assert_eq!(journal.borrow().released_quads, 1);
    }
}
