//! The per-frame fluid pipeline.
//!
//! `FluidSolver` owns the velocity/pressure pairs, the single-buffered
//! derived fields, and one compiled handle per kernel. Every public
//! operation issues an ordered chain of dispatches against a
//! [`ComputeBackend`] and performs the buffer flips the chain's data
//! dependencies require. Nothing here blocks on kernel completion; the
//! flips are host-side index swaps that take effect at the next binding.

use crate::field::FieldPair;
use crate::{Access, BindSlot, ComputeBackend, KernelId, SolverError, Uniform, dispatch_size};

const DEFAULT_SPEED: f32 = 500.0;
const DEFAULT_ITERATIONS: u32 = 50;
const DEFAULT_DISSIPATION: f32 = 1.0;
const DEFAULT_VORTICITY: f32 = 0.0;
const DEFAULT_VISCOSITY: f32 = 0.1;

struct FluidKernels<K> {
    add_velocity: K,
    init_boundaries: K,
    advect_velocity: K,
    calc_vorticity: K,
    apply_vorticity: K,
    viscosity: K,
    divergence: K,
    poisson: K,
    subtract_gradient: K,
    add_circle_obstacle: K,
    add_triangle_obstacle: K,
    clear_buffer: K,
}

/// Eulerian incompressible-flow solver on a `width x height` grid.
///
/// Construction compiles the full kernel set and allocates all fields
/// zero-initialized; any failure there is fatal ([`SolverError::ResourceInit`])
/// and the solver must be reconstructed. Teardown goes through
/// [`FluidSolver::destroy`], which consumes the solver so a second destroy
/// cannot be expressed.
pub struct FluidSolver<B: ComputeBackend> {
    width: u32,
    height: u32,
    num_groups_x: u32,
    num_groups_y: u32,

    speed: f32,
    iterations: u32,
    dissipation: f32,
    vorticity: f32,
    viscosity: f32,

    /// Enforce no-slip walls on the domain border each step.
    pub has_borders: bool,
    /// Run/pause flag: while false, `update` and every injection are no-ops.
    pub simulate: bool,

    velocity: FieldPair<B::Buffer>,
    pressure: FieldPair<B::Buffer>,
    divergence: B::Buffer,
    vorticity_field: B::Buffer,
    obstacles: B::Buffer,

    kernels: FluidKernels<B::Kernel>,
}

impl<B: ComputeBackend> FluidSolver<B> {
    /// Build a solver on a `width x height` grid, compiling all kernels and
    /// allocating zero-initialized fields on `backend`.
    pub fn new(backend: &mut B, width: u32, height: u32) -> Result<Self, SolverError> {
        if width == 0 || height == 0 {
            return Err(SolverError::ResourceInit(format!(
                "grid dimensions must be nonzero (got {width}x{height})"
            )));
        }

        let kernels = FluidKernels {
            add_velocity: backend.compile(KernelId::AddVelocity)?,
            init_boundaries: backend.compile(KernelId::InitBoundaries)?,
            advect_velocity: backend.compile(KernelId::AdvectVelocity)?,
            calc_vorticity: backend.compile(KernelId::CalcVorticity)?,
            apply_vorticity: backend.compile(KernelId::ApplyVorticity)?,
            viscosity: backend.compile(KernelId::Viscosity)?,
            divergence: backend.compile(KernelId::Divergence)?,
            poisson: backend.compile(KernelId::Poisson)?,
            subtract_gradient: backend.compile(KernelId::SubtractGradient)?,
            add_circle_obstacle: backend.compile(KernelId::AddCircleObstacle)?,
            add_triangle_obstacle: backend.compile(KernelId::AddTriangleObstacle)?,
            clear_buffer: backend.compile(KernelId::ClearBuffer)?,
        };

        let cells = width * height;
        let velocity = FieldPair::allocate(backend, "velocity", cells, 2)?;
        let pressure = FieldPair::allocate(backend, "pressure", cells, 1)?;
        let divergence = backend.create_buffer("divergence", cells, 1)?;
        let vorticity_field = backend.create_buffer("vorticity", cells, 1)?;
        let obstacles = backend.create_buffer("obstacles", cells, 2)?;

        let group = backend.group_size();
        let solver = Self {
            width,
            height,
            num_groups_x: dispatch_size(width, group),
            num_groups_y: dispatch_size(height, group),
            speed: DEFAULT_SPEED,
            iterations: DEFAULT_ITERATIONS,
            dissipation: DEFAULT_DISSIPATION,
            vorticity: DEFAULT_VORTICITY,
            viscosity: DEFAULT_VISCOSITY,
            has_borders: true,
            simulate: true,
            velocity,
            pressure,
            divergence,
            vorticity_field,
            obstacles,
            kernels,
        };
        solver.bind_all(backend);

        tracing::info!(
            "fluid solver initialized: {}x{} grid, {}x{} thread groups",
            width,
            height,
            solver.num_groups_x,
            solver.num_groups_y
        );
        Ok(solver)
    }

    /// Grid width in cells.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The velocity buffer presentation (and the particle subsystem)
    /// should sample: the current read side.
    pub fn velocity_field(&self) -> &B::Buffer {
        self.velocity.current_read()
    }

    /// Current read side of the pressure pair.
    pub fn pressure_field(&self) -> &B::Buffer {
        self.pressure.current_read()
    }

    /// The obstacle field (single-buffered, 2 components per cell).
    pub fn obstacle_field(&self) -> &B::Buffer {
        &self.obstacles
    }

    // -- validated properties ------------------------------------------------

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

    /// Jacobi iteration count for pressure projection and viscous diffusion.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Set the Jacobi iteration count; must be greater than zero.
    pub fn set_iterations(&mut self, value: u32) -> Result<(), SolverError> {
        if value > 0 {
            self.iterations = value;
            Ok(())
        } else {
            Err(SolverError::InvalidParameter {
                name: "iterations",
                constraint: "greater than zero",
                value: value as f32,
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

    /// Vorticity-confinement scale.
    pub fn vorticity(&self) -> f32 {
        self.vorticity
    }

    /// Set the vorticity-confinement scale; must not be negative.
    pub fn set_vorticity(&mut self, value: f32) -> Result<(), SolverError> {
        if value >= 0.0 {
            self.vorticity = value;
            Ok(())
        } else {
            Err(SolverError::InvalidParameter {
                name: "vorticity",
                constraint: "greater or equal than zero",
                value,
            })
        }
    }

    /// Kinematic viscosity; zero disables the diffusion passes.
    pub fn viscosity(&self) -> f32 {
        self.viscosity
    }

    /// Set the kinematic viscosity; must not be negative. Stability for
    /// large values relative to the grid spacing is the caller's
    /// responsibility (raise `iterations` along with it).
    pub fn set_viscosity(&mut self, value: f32) -> Result<(), SolverError> {
        if value >= 0.0 {
            self.viscosity = value;
            Ok(())
        } else {
            Err(SolverError::InvalidParameter {
                name: "viscosity",
                constraint: "greater or equal than zero",
                value,
            })
        }
    }

    // -- impulse and obstacle injection --------------------------------------

    /// Splat a velocity impulse of `velocity` around the normalized
    /// `position` with falloff `radius` (cell units), then flip the
    /// velocity pair. No-op while paused.
    pub fn add_velocity(
        &mut self,
        backend: &mut B,
        position: [f32; 2],
        velocity: [f32; 2],
        radius: f32,
    ) {
        if !self.simulate {
            return;
        }
        self.bind_all(backend);
        backend.set_uniform(Uniform::Position(position));
        backend.set_uniform(Uniform::Value(velocity));
        backend.set_uniform(Uniform::Radius(radius));
        backend.dispatch(self.kernels.add_velocity, self.groups());
        self.flip_velocity(backend);
    }

    /// Rasterize a circle (normalized center, radius in cell units) into
    /// the obstacle field. The obstacle field is single-buffered, so no
    /// flip happens. No-op while paused.
    ///
    /// `is_static` is recorded in the obstacle field but the end-of-frame
    /// clear in [`FluidSolver::update`] removes static obstacles too;
    /// callers that want persistent obstacles re-inject them each frame.
    pub fn add_circle_obstacle(
        &mut self,
        backend: &mut B,
        position: [f32; 2],
        radius: f32,
        is_static: bool,
    ) {
        if !self.simulate {
            return;
        }
        self.bind_all(backend);
        backend.set_uniform(Uniform::Position(position));
        backend.set_uniform(Uniform::Radius(radius));
        backend.set_uniform(Uniform::Static(if is_static { 1.0 } else { 0.0 }));
        backend.dispatch(self.kernels.add_circle_obstacle, self.groups());
    }

    /// Rasterize a triangle (normalized vertices) into the obstacle field.
    /// Same flip and `is_static` semantics as
    /// [`FluidSolver::add_circle_obstacle`]. No-op while paused.
    pub fn add_triangle_obstacle(
        &mut self,
        backend: &mut B,
        p1: [f32; 2],
        p2: [f32; 2],
        p3: [f32; 2],
        is_static: bool,
    ) {
        if !self.simulate {
            return;
        }
        self.bind_all(backend);
        backend.set_uniform(Uniform::P1(p1));
        backend.set_uniform(Uniform::P2(p2));
        backend.set_uniform(Uniform::P3(p3));
        backend.set_uniform(Uniform::Static(if is_static { 1.0 } else { 0.0 }));
        backend.dispatch(self.kernels.add_triangle_obstacle, self.groups());
    }

    // -- the frame pipeline --------------------------------------------------

    /// Advance the simulation by `dt` seconds. No-op while paused.
    ///
    /// The dispatch order is fixed; each pass depends on the buffer state
    /// the previous one left behind:
    ///
    /// 1. border no-slip (if enabled), 2. self-advection, 3. curl,
    /// 4. vorticity confinement, 5. viscous diffusion (`iterations` Jacobi
    /// passes, skipped when viscosity is zero), 6. divergence, 7. pressure
    /// clear, 8. `iterations` Poisson passes, 9. gradient subtraction,
    /// 10. obstacle clear (always).
    pub fn update(&mut self, backend: &mut B, dt: f32) {
        if !self.simulate {
            return;
        }

        self.bind_all(backend);
        self.update_params(backend, dt);
        let groups = self.groups();

        // 1. Walls.
        if self.has_borders {
            backend.dispatch(self.kernels.init_boundaries, groups);
        }

        // 2. Advect velocity by itself.
        backend.dispatch(self.kernels.advect_velocity, groups);
        self.flip_velocity(backend);

        // 3.-4. Vorticity confinement: curl, then the restoring force.
        backend.dispatch(self.kernels.calc_vorticity, groups);
        backend.dispatch(self.kernels.apply_vorticity, groups);
        self.flip_velocity(backend);

        // 5. Implicit viscous diffusion, one Jacobi pass per iteration.
        if self.viscosity > 0.0 {
            for _ in 0..self.iterations {
                backend.dispatch(self.kernels.viscosity, groups);
                self.flip_velocity(backend);
            }
        }

        // 6. Divergence of the advected velocity.
        backend.dispatch(self.kernels.divergence, groups);

        // 7. Zero the pressure read side through the generic slot, then
        // restore its normal binding.
        backend.bind_buffer(
            BindSlot::Generic,
            self.pressure.current_read(),
            Access::ReadWrite,
        );
        backend.dispatch(self.kernels.clear_buffer, groups);
        backend.bind_buffer(
            BindSlot::PressureIn,
            self.pressure.current_read(),
            Access::Read,
        );

        // 8. Jacobi relaxation of the Poisson equation.
        for _ in 0..self.iterations {
            backend.dispatch(self.kernels.poisson, groups);
            self.flip_pressure(backend);
        }

        // 9. Project: subtract the pressure gradient.
        backend.dispatch(self.kernels.subtract_gradient, groups);
        self.flip_velocity(backend);

        // 10. Obstacles are transient: cleared every frame regardless of
        // their static flag.
        backend.bind_buffer(BindSlot::Generic, &self.obstacles, Access::ReadWrite);
        backend.dispatch(self.kernels.clear_buffer, groups);
        backend.bind_buffer(BindSlot::Obstacles, &self.obstacles, Access::ReadWrite);
    }

    /// Release every buffer this solver owns, in reverse allocation order.
    /// Consuming `self` makes a second destroy unrepresentable. Kernel
    /// handles die with the backend.
    pub fn destroy(self, backend: &mut B) {
        backend.destroy_buffer(self.obstacles);
        backend.destroy_buffer(self.vorticity_field);
        backend.destroy_buffer(self.divergence);
        let [p0, p1] = self.pressure.into_inner();
        backend.destroy_buffer(p1);
        backend.destroy_buffer(p0);
        let [v0, v1] = self.velocity.into_inner();
        backend.destroy_buffer(v1);
        backend.destroy_buffer(v0);
        tracing::debug!("fluid solver destroyed");
    }

    // -- internals -----------------------------------------------------------

    fn groups(&self) -> [u32; 3] {
        [self.num_groups_x, self.num_groups_y, 1]
    }

    /// Restore the full slot table and the grid-size uniform. Mirrors what
    /// every public operation expects before its first dispatch.
    fn bind_all(&self, backend: &mut B) {
        backend.set_uniform(Uniform::Size([self.width as f32, self.height as f32]));
        backend.bind_buffer(
            BindSlot::VelocityIn,
            self.velocity.current_read(),
            Access::Read,
        );
        backend.bind_buffer(
            BindSlot::VelocityOut,
            self.velocity.current_write(),
            Access::Write,
        );
        backend.bind_buffer(
            BindSlot::PressureIn,
            self.pressure.current_read(),
            Access::Read,
        );
        backend.bind_buffer(
            BindSlot::PressureOut,
            self.pressure.current_write(),
            Access::Write,
        );
        backend.bind_buffer(BindSlot::Divergence, &self.divergence, Access::ReadWrite);
        backend.bind_buffer(BindSlot::Vorticity, &self.vorticity_field, Access::ReadWrite);
        backend.bind_buffer(BindSlot::Obstacles, &self.obstacles, Access::ReadWrite);
    }

    /// Stage the per-frame uniforms, including the diffusion coefficients
    /// derived from viscosity.
    fn update_params(&self, backend: &mut B, dt: f32) {
        backend.set_uniform(Uniform::ElapsedTime(dt));
        backend.set_uniform(Uniform::Speed(self.speed));
        backend.set_uniform(Uniform::Dissipation(self.dissipation));
        backend.set_uniform(Uniform::VorticityScale(self.vorticity));

        if self.viscosity > 0.0 {
            let centre_factor = 1.0 / self.viscosity;
            let stencil_factor = 1.0 / (4.0 + centre_factor);
            backend.set_uniform(Uniform::Alpha(centre_factor));
            backend.set_uniform(Uniform::RBeta(stencil_factor));
        }
    }

    fn flip_velocity(&mut self, backend: &mut B) {
        self.velocity.flip();
        backend.bind_buffer(
            BindSlot::VelocityIn,
            self.velocity.current_read(),
            Access::Read,
        );
        backend.bind_buffer(
            BindSlot::VelocityOut,
            self.velocity.current_write(),
            Access::Write,
        );
    }

    fn flip_pressure(&mut self, backend: &mut B) {
        self.pressure.flip();
        backend.bind_buffer(
            BindSlot::PressureIn,
            self.pressure.current_read(),
            Access::Read,
        );
        backend.bind_buffer(
            BindSlot::PressureOut,
            self.pressure.current_write(),
            Access::Write,
        );
    }
}
