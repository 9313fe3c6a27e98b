//! wgpu compute backend.
//!
//! Implements [`ComputeBackend`] on top of wgpu compute pipelines. Each
//! kernel compiles once into a pipeline plus a bind-group layout derived
//! from the kernel's static binding table (uniform parameters at binding 0,
//! storage slots at their [`BindSlot`] numbers). A dispatch snapshots the
//! current slot table into a bind group, writes the staged uniforms, and
//! submits one compute pass -- the host never waits on completion except in
//! [`WgpuBackend::read_back`].

pub mod buffers;

use std::collections::HashMap;

use buffers::{KernelParams, create_params_buffer, create_storage_buffer, read_f32_buffer};

use crate::{
    Access, BindSlot, ComputeBackend, KernelId, SLOT_COUNT, SolverError, StagedUniforms, Uniform,
};

/// Shared WGSL prelude: the uniform parameter block every kernel sees.
const PARAMS_WGSL: &str = include_str!("shaders/params.wgsl");

/// Binding access as the kernel contract fixes it, per slot: `RO` becomes
/// a read-only storage binding, `RW` a read-write one.
const RO: bool = true;
const RW: bool = false;

/// The kernel's WGSL source and its storage bindings `(slot, read_only)`.
fn kernel_desc(kernel: KernelId) -> (&'static str, &'static [(BindSlot, bool)]) {
    use BindSlot::*;
    match kernel {
        KernelId::AddVelocity => (
            include_str!("shaders/add_velocity.wgsl"),
            &[(VelocityIn, RO), (VelocityOut, RW)],
        ),
        KernelId::InitBoundaries => (
            include_str!("shaders/init_boundaries.wgsl"),
            &[(VelocityIn, RW)],
        ),
        KernelId::AdvectVelocity => (
            include_str!("shaders/advect_velocity.wgsl"),
            &[(VelocityIn, RO), (VelocityOut, RW), (Obstacles, RO)],
        ),
        KernelId::CalcVorticity => (
            include_str!("shaders/calc_vorticity.wgsl"),
            &[(VelocityIn, RO), (Vorticity, RW)],
        ),
        KernelId::ApplyVorticity => (
            include_str!("shaders/apply_vorticity.wgsl"),
            &[(VelocityIn, RO), (VelocityOut, RW), (Vorticity, RO)],
        ),
        KernelId::Viscosity => (
            include_str!("shaders/viscosity.wgsl"),
            &[(VelocityIn, RO), (VelocityOut, RW)],
        ),
        KernelId::Divergence => (
            include_str!("shaders/divergence.wgsl"),
            &[(VelocityIn, RO), (Divergence, RW)],
        ),
        KernelId::Poisson => (
            include_str!("shaders/poisson.wgsl"),
            &[
                (PressureIn, RO),
                (PressureOut, RW),
                (Divergence, RO),
                (Obstacles, RO),
            ],
        ),
        KernelId::SubtractGradient => (
            include_str!("shaders/subtract_gradient.wgsl"),
            &[
                (VelocityIn, RO),
                (VelocityOut, RW),
                (PressureIn, RO),
                (Obstacles, RO),
            ],
        ),
        KernelId::AddCircleObstacle => (
            include_str!("shaders/add_circle_obstacle.wgsl"),
            &[(Obstacles, RW)],
        ),
        KernelId::AddTriangleObstacle => (
            include_str!("shaders/add_triangle_obstacle.wgsl"),
            &[(Obstacles, RW)],
        ),
        KernelId::ClearBuffer => (include_str!("shaders/clear_buffer.wgsl"), &[(Generic, RW)]),
        KernelId::AddParticles => (
            include_str!("shaders/add_particles.wgsl"),
            &[(ParticlesIn, RO), (ParticlesOut, RW)],
        ),
        KernelId::AdvectParticles => (
            include_str!("shaders/advect_particles.wgsl"),
            &[(ParticlesIn, RO), (ParticlesOut, RW), (VelocityIn, RO)],
        ),
    }
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Check whether a usable compute adapter is present.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// Handle to a compiled compute kernel.
#[derive(Debug, Clone, Copy)]
pub struct KernelHandle(usize);

struct CompiledKernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    bindings: &'static [(BindSlot, bool)],
}

/// wgpu implementation of [`ComputeBackend`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    group_size: u32,

    uniforms: StagedUniforms,
    params_buffer: wgpu::Buffer,

    kernels: Vec<CompiledKernel>,
    compiled: HashMap<KernelId, KernelHandle>,
    slots: [Option<wgpu::Buffer>; SLOT_COUNT],
}

impl WgpuBackend {
    /// Acquire an adapter and device with the default 8x8 thread groups.
    pub fn new() -> Result<Self, SolverError> {
        Self::with_group_size(8)
    }

    /// Acquire an adapter and device; kernels compile with
    /// `group_size x group_size` thread groups.
    pub fn with_group_size(group_size: u32) -> Result<Self, SolverError> {
        if group_size == 0 {
            return Err(SolverError::ResourceInit(
                "thread-group size must be nonzero".into(),
            ));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| SolverError::ResourceInit("no suitable GPU adapter found".into()))?;

        tracing::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fluid_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| SolverError::ResourceInit(format!("failed to create device: {e}")))?;

        let params_buffer = create_params_buffer(&device);

        Ok(Self {
            device,
            queue,
            group_size,
            uniforms: StagedUniforms::default(),
            params_buffer,
            kernels: Vec::new(),
            compiled: HashMap::new(),
            slots: Default::default(),
        })
    }

    fn kernel_label(kernel: KernelId) -> String {
        format!("{kernel:?}")
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Kernel = KernelHandle;

    fn create_buffer(
        &mut self,
        label: &str,
        cells: u32,
        components: u32,
    ) -> Result<Self::Buffer, SolverError> {
        if cells == 0 || components == 0 {
            return Err(SolverError::ResourceInit(format!(
                "buffer '{label}' has zero size ({cells} cells x {components} components)"
            )));
        }
        Ok(create_storage_buffer(
            &self.device,
            label,
            (cells * components) as usize,
        ))
    }

    fn compile(&mut self, kernel: KernelId) -> Result<Self::Kernel, SolverError> {
        if let Some(&handle) = self.compiled.get(&kernel) {
            return Ok(handle);
        }

        let (body, bindings) = kernel_desc(kernel);
        let mut source = format!("{PARAMS_WGSL}\n{body}");
        if self.group_size != 8 {
            source = source.replace(
                "@workgroup_size(8, 8, 1)",
                &format!("@workgroup_size({0}, {0}, 1)", self.group_size),
            );
        }
        let label = Self::kernel_label(kernel);

        // Shader and pipeline errors must fail construction rather than
        // land in the uncaptured-error handler later.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let mut entries = vec![bgl_uniform(0)];
        for &(slot, read_only) in bindings {
            entries.push(bgl_storage(slot as u32, read_only));
        }
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label}_bgl")),
                entries: &entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label}_pl")),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SolverError::ResourceInit(format!(
                "kernel '{label}' failed to compile: {err}"
            )));
        }

        let handle = KernelHandle(self.kernels.len());
        self.kernels.push(CompiledKernel {
            pipeline,
            layout,
            bindings,
        });
        self.compiled.insert(kernel, handle);
        tracing::debug!("compiled kernel {label}");
        Ok(handle)
    }

    fn bind_buffer(&mut self, slot: BindSlot, buffer: &Self::Buffer, _access: Access) {
        self.slots[slot.index()] = Some(buffer.clone());
    }

    fn set_uniform(&mut self, uniform: Uniform) {
        self.uniforms.set(uniform);
    }

    fn dispatch(&mut self, kernel: Self::Kernel, groups: [u32; 3]) {
        let compiled = &self.kernels[kernel.0];

        self.queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&KernelParams::from(self.uniforms)),
        );

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.params_buffer.as_entire_binding(),
        }];
        for &(slot, _) in compiled.bindings {
            let buffer = self.slots[slot.index()]
                .as_ref()
                .unwrap_or_else(|| panic!("no buffer bound to slot {slot:?}"));
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &compiled.layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn read_back(&self, buffer: &Self::Buffer) -> Vec<f32> {
        read_f32_buffer(&self.device, &self.queue, buffer)
    }

    fn destroy_buffer(&mut self, buffer: Self::Buffer) {
        buffer.destroy();
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }
}
