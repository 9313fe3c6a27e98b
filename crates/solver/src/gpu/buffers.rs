//! GPU buffer helpers for the wgpu backend.
//!
//! Storage buffers hold one grid field each (flat `f32` data, 1 or 2
//! components per cell); a single uniform buffer carries the staged kernel
//! parameters and is rewritten before every dispatch. Read-back goes
//! through a transient staging buffer.

use wgpu::util::DeviceExt;

use crate::StagedUniforms;

/// Kernel parameter uniform layout.
/// Must match the `Params` struct in `shaders/params.wgsl` exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelParams {
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

impl From<StagedUniforms> for KernelParams {
    fn from(u: StagedUniforms) -> Self {
        Self {
            size: u.size,
            position: u.position,
            value: u.value,
            p1: u.p1,
            p2: u.p2,
            p3: u.p3,
            particle_size: u.particle_size,
            velocity_size: u.velocity_size,
            radius: u.radius,
            static_flag: u.static_flag,
            elapsed_time: u.elapsed_time,
            speed: u.speed,
            dissipation: u.dissipation,
            vorticity_scale: u.vorticity_scale,
            alpha: u.alpha,
            rbeta: u.rbeta,
        }
    }
}

/// Create the kernel-parameter uniform buffer.
pub fn create_params_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("kernel_params"),
        contents: bytemuck::bytes_of(&KernelParams::from(StagedUniforms::default())),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Create a zero-initialized storage buffer of `len` f32 scalars.
pub fn create_storage_buffer(device: &wgpu::Device, label: &str, len: usize) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&vec![0.0f32; len]),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
    })
}

/// Copy `buffer` into a staging buffer, block until the copy completes,
/// and return the contents as f32 data.
pub fn read_f32_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
) -> Vec<f32> {
    let size = buffer.size();
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .expect("map_async callback dropped")
        .expect("buffer mapping failed");

    let data = slice.get_mapped_range();
    let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    staging.unmap();
    result
}
