//! 2D Incompressible Fluid Solver
//!
//! This crate provides a real-time Eulerian grid fluid solver whose entire
//! numerical pipeline runs as compute-kernel dispatches: semi-Lagrangian
//! advection, vorticity confinement, implicit viscous diffusion, and
//! pressure projection via Jacobi iteration, plus obstacle rasterization
//! and a passive particle-density grid advected by the velocity field.
//!
//! # Modules
//! - [`field`] -- Double-buffered (read/write pair) grid field storage.
//! - [`fluid`] -- The per-frame dispatch pipeline and its parameters.
//! - [`particles`] -- Passive scalar density grid advected by the fluid.
//! - [`cpu`] -- Reference CPU interpreter of the kernel set.
//! - [`gpu`] -- wgpu compute backend (feature `gpu`).
//!
//! The host sequences everything single-threaded: each `update` call issues
//! a fixed, ordered chain of dispatches whose data dependencies are carried
//! through buffer flips. Backend selection (GPU vs. the CPU reference) is
//! made by the caller, not by this crate.

#![warn(missing_docs)]

pub mod cpu;
pub mod field;
pub mod fluid;
pub mod particles;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use cpu::CpuBackend;
pub use field::FieldPair;
pub use fluid::FluidSolver;
pub use particles::ParticleArea;

#[cfg(feature = "gpu")]
pub use gpu::{WgpuBackend, gpu_available};

use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the solver core.
///
/// There are no internal retries anywhere: parameter errors leave state
/// untouched and may be retried by the caller with a valid value;
/// construction errors leave the half-built value unusable and it must be
/// reconstructed from scratch.
#[derive(Debug)]
pub enum SolverError {
    /// A property setter rejected an out-of-domain value. The previous
    /// value is left in place.
    InvalidParameter {
        /// Name of the rejected property.
        name: &'static str,
        /// Human-readable domain constraint, e.g. `"> 0"`.
        constraint: &'static str,
        /// The offending value.
        value: f32,
    },
    /// A kernel failed to compile or a resource failed to allocate during
    /// construction. Fatal: there is no runtime fallback.
    ResourceInit(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::InvalidParameter {
                name,
                constraint,
                value,
            } => {
                write!(f, "'{name}' should be {constraint} (got {value})")
            }
            SolverError::ResourceInit(msg) => {
                write!(f, "resource initialization failed: {msg}")
            }
        }
    }
}

impl std::error::Error for SolverError {}

// ---------------------------------------------------------------------------
// Kernel and binding identifiers
// ---------------------------------------------------------------------------

/// The compute kernels every backend must provide.
///
/// Each kernel reads and writes whole grid fields through the storage slots
/// of [`BindSlot`]; none of them reads a buffer it also writes, except the
/// explicitly in-place ones (`InitBoundaries`, the obstacle rasterizers and
/// `ClearBuffer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelId {
    /// Splat a velocity impulse around a point into the velocity field.
    AddVelocity,
    /// Zero the velocity on the domain border (no-slip walls), in place.
    InitBoundaries,
    /// Semi-Lagrangian self-advection of the velocity field.
    AdvectVelocity,
    /// Curl of the velocity field into the vorticity field.
    CalcVorticity,
    /// Vorticity-confinement force applied to the velocity field.
    ApplyVorticity,
    /// One Jacobi step of implicit viscous diffusion.
    Viscosity,
    /// Divergence of the velocity field into the divergence field.
    Divergence,
    /// One Jacobi step of the discrete Poisson pressure solve.
    Poisson,
    /// Subtract the pressure gradient from the velocity field.
    SubtractGradient,
    /// Rasterize a circle into the obstacle field, in place.
    AddCircleObstacle,
    /// Rasterize a triangle into the obstacle field, in place.
    AddTriangleObstacle,
    /// Zero whatever buffer is bound to the generic slot.
    ClearBuffer,
    /// Splat particle density around a point into the particle field.
    AddParticles,
    /// Advect the particle field by sampling the velocity field.
    AdvectParticles,
}

/// Storage-buffer binding slots shared by the whole kernel set.
///
/// Slot numbers are part of the kernel contract: a kernel addresses the
/// field it needs by slot, and the host keeps the slots pointed at the
/// right physical buffer across flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BindSlot {
    /// Velocity read side (2 components per cell).
    VelocityIn = 1,
    /// Velocity write side (2 components per cell).
    VelocityOut = 2,
    /// Pressure read side (1 component per cell).
    PressureIn = 3,
    /// Pressure write side (1 component per cell).
    PressureOut = 4,
    /// Vorticity scratch field (1 component per cell).
    Vorticity = 5,
    /// Divergence scratch field (1 component per cell).
    Divergence = 6,
    /// Obstacle field (2 components per cell: occupancy, static flag).
    Obstacles = 7,
    /// Transient slot the clear kernel writes through.
    Generic = 8,
    /// Particle density read side (1 component per cell).
    ParticlesIn = 9,
    /// Particle density write side (1 component per cell).
    ParticlesOut = 10,
}

impl BindSlot {
    pub(crate) fn index(self) -> usize {
        self as u32 as usize
    }
}

/// Number of addressable binding slots (slot 0 is reserved for uniforms).
pub(crate) const SLOT_COUNT: usize = 11;

/// Host intent when binding a buffer to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The next dispatches only read this slot.
    Read,
    /// The next dispatches only write this slot.
    Write,
    /// The next dispatches read and write this slot in place.
    ReadWrite,
}

// ---------------------------------------------------------------------------
// Uniforms
// ---------------------------------------------------------------------------

/// A uniform value staged for subsequent dispatches.
///
/// Uniforms are sticky: once set they keep their value until overwritten,
/// so per-frame parameters are staged once and shared by every pass of the
/// frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    /// Grid dimensions of the field the next dispatches operate on.
    Size([f32; 2]),
    /// Injection point in normalized `[0, 1]` coordinates.
    Position([f32; 2]),
    /// Injected value (velocity delta, or strength in `.x` for particles).
    Value([f32; 2]),
    /// Injection radius in cell units.
    Radius(f32),
    /// Static flag for obstacle rasterization (1.0 = static).
    Static(f32),
    /// First triangle vertex, normalized.
    P1([f32; 2]),
    /// Second triangle vertex, normalized.
    P2([f32; 2]),
    /// Third triangle vertex, normalized.
    P3([f32; 2]),
    /// Frame time step in seconds.
    ElapsedTime(f32),
    /// Advection speed scale.
    Speed(f32),
    /// Multiplicative decay per advection step.
    Dissipation(f32),
    /// Vorticity-confinement force scale.
    VorticityScale(f32),
    /// Jacobi diffusion center coefficient, `1 / viscosity`.
    Alpha(f32),
    /// Jacobi diffusion stencil coefficient, `1 / (4 + alpha)`.
    RBeta(f32),
    /// Particle grid dimensions (particle kernels only).
    ParticleSize([f32; 2]),
    /// Velocity grid dimensions as seen by the particle advection kernel.
    VelocitySize([f32; 2]),
}

/// The staged uniform state a backend carries between dispatches.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StagedUniforms {
    pub size: [f32; 2],
    pub position: [f32; 2],
    pub value: [f32; 2],
    pub p1: [f32; 2],
    pub p2: [f32; 2],
    pub p3: [f32; 2],
    pub particle_size: [f32; 2],
    pub velocity_size: [f32; 2],
    pub radius: f32,
    pub static_flag: f32,
    pub elapsed_time: f32,
    pub speed: f32,
    pub dissipation: f32,
    pub vorticity_scale: f32,
    pub alpha: f32,
    pub rbeta: f32,
}

impl StagedUniforms {
    pub(crate) fn set(&mut self, uniform: Uniform) {
        match uniform {
            Uniform::Size(v) => self.size = v,
            Uniform::Position(v) => self.position = v,
            Uniform::Value(v) => self.value = v,
            Uniform::Radius(v) => self.radius = v,
            Uniform::Static(v) => self.static_flag = v,
            Uniform::P1(v) => self.p1 = v,
            Uniform::P2(v) => self.p2 = v,
            Uniform::P3(v) => self.p3 = v,
            Uniform::ElapsedTime(v) => self.elapsed_time = v,
            Uniform::Speed(v) => self.speed = v,
            Uniform::Dissipation(v) => self.dissipation = v,
            Uniform::VorticityScale(v) => self.vorticity_scale = v,
            Uniform::Alpha(v) => self.alpha = v,
            Uniform::RBeta(v) => self.rbeta = v,
            Uniform::ParticleSize(v) => self.particle_size = v,
            Uniform::VelocitySize(v) => self.velocity_size = v,
        }
    }
}

// ---------------------------------------------------------------------------
// ComputeBackend trait
// ---------------------------------------------------------------------------

/// The dispatch interface the solver pipeline is written against.
///
/// A backend compiles the kernel set once, keeps a table of slot bindings
/// and staged uniforms, and executes kernels over a 3D grid of thread
/// groups. Two implementations ship with the crate: [`WgpuBackend`]
/// submits real compute passes, [`CpuBackend`] interprets the same kernels
/// deterministically for tests and GPU-less hosts.
///
/// Dispatches never block the host; [`ComputeBackend::read_back`] is the
/// only synchronizing operation.
pub trait ComputeBackend {
    /// Handle to a grid-field storage buffer.
    type Buffer: Clone;
    /// Handle to a compiled, dispatch-ready kernel.
    type Kernel: Copy;

    /// Allocate a zero-initialized field buffer of `cells * components`
    /// scalars.
    fn create_buffer(
        &mut self,
        label: &str,
        cells: u32,
        components: u32,
    ) -> Result<Self::Buffer, SolverError>;

    /// Compile `kernel` (idempotent) and return its dispatch handle.
    fn compile(&mut self, kernel: KernelId) -> Result<Self::Kernel, SolverError>;

    /// Point `slot` at `buffer` for all subsequent dispatches. `access`
    /// documents the host's intent; the kernel contract fixes the actual
    /// access mode per kernel.
    fn bind_buffer(&mut self, slot: BindSlot, buffer: &Self::Buffer, access: Access);

    /// Stage a uniform value for subsequent dispatches.
    fn set_uniform(&mut self, uniform: Uniform);

    /// Execute `kernel` over `groups` thread groups against the current
    /// slot bindings and staged uniforms.
    fn dispatch(&mut self, kernel: Self::Kernel, groups: [u32; 3]);

    /// Copy a buffer's current contents back to the host. Blocks until all
    /// previously dispatched work that touches it has completed.
    fn read_back(&self, buffer: &Self::Buffer) -> Vec<f32>;

    /// Eagerly release a buffer. The default lets it die by drop.
    fn destroy_buffer(&mut self, buffer: Self::Buffer) {
        drop(buffer);
    }

    /// Thread-group edge length used by the compiled kernels (default 8).
    fn group_size(&self) -> u32 {
        8
    }
}

/// Thread groups needed to cover `dim` items at `group_size` items per
/// group: `ceil(dim / group_size)`.
pub fn dispatch_size(dim: u32, group_size: u32) -> u32 {
    dim.div_ceil(group_size)
}
