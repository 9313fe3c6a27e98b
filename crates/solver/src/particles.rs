//! Passive particle-density grid.
//!
//! A secondary scalar grid, advected by the fluid solver's velocity field.
//! Its resolution is independent of the velocity grid's; the advection
//! kernel maps positions through normalized space using both sizes. The
//! subsystem owns its own buffer pair and follows the same double-buffer
//! and dispatch discipline as the fluid solver, but its lifecycle is fully
//! decoupled -- it borrows the solver only while sampling.

use crate::field::FieldPair;
use crate::fluid::FluidSolver;
use crate::{Access, BindSlot, ComputeBackend, KernelId, SolverError, Uniform, dispatch_size};

const DEFAULT_SPEED: f32 = 500.0;
const DEFAULT_DISSIPATION: f32 = 1.0;

/// Scalar density grid advected by a [`FluidSolver`]'s velocity field.
pub struct ParticleArea<B: ComputeBackend> {
    width: u32,
    height: u32,
    num_groups_x: u32,
    num_groups_y: u32,

    speed: f32,
    dissipation: f32,
    /// Run/pause flag: while false, injection and `update` are no-ops.
    pub simulate: bool,

    particles: FieldPair<B::Buffer>,
    add_kernel: B::Kernel,
    advect_kernel: B::Kernel,
}

impl<B: ComputeBackend> ParticleArea<B> {
    /// Build a particle grid of `width x height` cells, compiling its two
    /// kernels and allocating a zero-initialized buffer pair.
    pub fn new(backend: &mut B, width: u32, height: u32) -> Result<Self, SolverError> {
        if width == 0 || height == 0 {
            return Err(SolverError::ResourceInit(format!(
                "particle grid dimensions must be nonzero (got {width}x{height})"
            )));
        }

        let add_kernel = backend.compile(KernelId::AddParticles)?;
        let advect_kernel = backend.compile(KernelId::AdvectParticles)?;
        let particles = FieldPair::allocate(backend, "particles", width * height, 1)?;

        let group = backend.group_size();
        let area = Self {
            width,
            height,
            num_groups_x: dispatch_size(width, group),
            num_groups_y: dispatch_size(height, group),
            speed: DEFAULT_SPEED,
            dissipation: DEFAULT_DISSIPATION,
            simulate: true,
            particles,
            add_kernel,
            advect_kernel,
        };
        area.bind(backend);

        tracing::info!("particle area initialized: {}x{} grid", width, height);
        Ok(area)
    }

    /// Particle grid width in cells.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Particle grid height in cells.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The density buffer presentation should read: the current read side.
    pub fn particle_field(&self) -> &B::Buffer {
        self.particles.current_read()
    }

    /// Advection speed scale.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Set the advection speed scale; must be greater than zero.
    pub fn set_speed(&mut self, value: f32) -> Result<(), SolverError> {
        if value > 0.0 {
            self.speed = value;
            Ok(())
        } else {
            Err(SolverError::InvalidParameter {
                name: "speed",
                constraint: "greater than zero",
                value,
            })
        }
    }

    /// Multiplicative decay applied by advection each step.
    pub fn dissipation(&self) -> f32 {
        self.dissipation
    }

    /// Set the dissipation factor; must be greater than zero.
    pub fn set_dissipation(&mut self, value: f32) -> Result<(), SolverError> {
        if value > 0.0 {
            self.dissipation = value;
            Ok(())
        } else {
            Err(SolverError::InvalidParameter {
                name: "dissipation",
                constraint: "greater than zero",
                value,
            })
        }
    }

    /// Write `strength` into a disk of `radius` cells around the
    /// normalized `position`, then flip. No-op while paused.
    pub fn add_particles(
        &mut self,
        backend: &mut B,
        position: [f32; 2],
        radius: f32,
        strength: f32,
    ) {
        if !self.simulate {
            return;
        }
        self.bind(backend);
        backend.set_uniform(Uniform::Position(position));
        backend.set_uniform(Uniform::Radius(radius));
        backend.set_uniform(Uniform::Value([strength, 0.0]));
        backend.dispatch(self.add_kernel, self.groups());
        self.flip(backend);
    }

    /// Advect the density by sampling `fluid`'s current velocity
    /// read-buffer, applying this grid's own dissipation and speed, then
    /// flip. The velocity grid's dimensions are passed to the kernel so
    /// the two resolutions need not match. No-op while paused.
    pub fn update(&mut self, backend: &mut B, fluid: &FluidSolver<B>, dt: f32) {
        if !self.simulate {
            return;
        }
        self.bind(backend);
        backend.bind_buffer(BindSlot::VelocityIn, fluid.velocity_field(), Access::Read);
        backend.set_uniform(Uniform::VelocitySize([
            fluid.width() as f32,
            fluid.height() as f32,
        ]));
        backend.set_uniform(Uniform::ElapsedTime(dt));
        backend.set_uniform(Uniform::Speed(self.speed));
        backend.set_uniform(Uniform::Dissipation(self.dissipation));
        backend.dispatch(self.advect_kernel, self.groups());
        self.flip(backend);
    }

    /// Release the buffer pair. Consuming `self` makes a second destroy
    /// unrepresentable.
    pub fn destroy(self, backend: &mut B) {
        let [a, b] = self.particles.into_inner();
        backend.destroy_buffer(b);
        backend.destroy_buffer(a);
        tracing::debug!("particle area destroyed");
    }

    fn groups(&self) -> [u32; 3] {
        [self.num_groups_x, self.num_groups_y, 1]
    }

    fn bind(&self, backend: &mut B) {
        backend.set_uniform(Uniform::ParticleSize([
            self.width as f32,
            self.height as f32,
        ]));
        backend.bind_buffer(
            BindSlot::ParticlesIn,
            self.particles.current_read(),
            Access::Read,
        );
        backend.bind_buffer(
            BindSlot::ParticlesOut,
            self.particles.current_write(),
            Access::Write,
        );
    }

    fn flip(&mut self, backend: &mut B) {
        self.particles.flip();
        backend.bind_buffer(
            BindSlot::ParticlesIn,
            self.particles.current_read(),
            Access::Read,
        );
        backend.bind_buffer(
            BindSlot::ParticlesOut,
            self.particles.current_write(),
            Access::Write,
        );
    }
}
