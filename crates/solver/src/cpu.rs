//! Reference CPU backend.
//!
//! Interprets the same kernel set as the wgpu backend, cell by cell, with
//! identical arithmetic (32-bit floats, same sampling and stencils). It
//! exists for two reasons: deterministic tests that read every cell back
//! without a GPU in the loop, and hosts with no usable adapter.
//!
//! Buffers are shared `Rc<RefCell<Vec<f32>>>` handles so that binding a
//! buffer to a slot and flipping a pair are index bookkeeping here too.
//! A kernel that would read and write the same physical buffer through
//! different slots panics on the nested borrow -- that situation is a host
//! bug (the pairing invariant of [`crate::field::FieldPair`] was violated)
//! and corrupting the simulation silently would be worse.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{
    Access, BindSlot, ComputeBackend, KernelId, SLOT_COUNT, SolverError, StagedUniforms, Uniform,
};

/// Shared handle to a CPU field buffer.
pub type CpuBuffer = Rc<RefCell<Vec<f32>>>;

/// Reference CPU implementation of [`ComputeBackend`].
pub struct CpuBackend {
    slots: [Option<CpuBuffer>; SLOT_COUNT],
    uniforms: StagedUniforms,
    group_size: u32,
}

impl CpuBackend {
    /// Create a backend with the default 8x8 thread-group size.
    pub fn new() -> Self {
        Self::with_group_size(8)
    }

    /// Create a backend with an explicit thread-group size. The value only
    /// affects [`crate::dispatch_size`] computations made against this
    /// backend; the interpreter always covers the exact grid.
    pub fn with_group_size(group_size: u32) -> Self {
        Self {
            slots: Default::default(),
            uniforms: StagedUniforms::default(),
            group_size,
        }
    }

    fn slot(&self, slot: BindSlot) -> CpuBuffer {
        self.slots[slot.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("no buffer bound to slot {slot:?}"))
            .clone()
    }

    fn grid(&self) -> (i32, i32) {
        (self.uniforms.size[0] as i32, self.uniforms.size[1] as i32)
    }

    fn particle_grid(&self) -> (i32, i32) {
        (
            self.uniforms.particle_size[0] as i32,
            self.uniforms.particle_size[1] as i32,
        )
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_index(x: i32, y: i32, w: i32, h: i32) -> usize {
    let cx = x.clamp(0, w - 1);
    let cy = y.clamp(0, h - 1);
    (cy * w + cx) as usize
}

fn vec2_at(buf: &[f32], x: i32, y: i32, w: i32, h: i32) -> [f32; 2] {
    let i = clamp_index(x, y, w, h);
    [buf[2 * i], buf[2 * i + 1]]
}

fn scalar_at(buf: &[f32], x: i32, y: i32, w: i32, h: i32) -> f32 {
    buf[clamp_index(x, y, w, h)]
}

/// Bilinear sample of a 2-component field at a cell-center position.
fn sample_vec2(buf: &[f32], p: [f32; 2], w: i32, h: i32) -> [f32; 2] {
    let gx = p[0] - 0.5;
    let gy = p[1] - 0.5;
    let x0 = gx.floor();
    let y0 = gy.floor();
    let fx = gx - x0;
    let fy = gy - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);
    let v00 = vec2_at(buf, x0, y0, w, h);
    let v10 = vec2_at(buf, x0 + 1, y0, w, h);
    let v01 = vec2_at(buf, x0, y0 + 1, w, h);
    let v11 = vec2_at(buf, x0 + 1, y0 + 1, w, h);
    let mut out = [0.0f32; 2];
    for c in 0..2 {
        let a = v00[c] + (v10[c] - v00[c]) * fx;
        let b = v01[c] + (v11[c] - v01[c]) * fx;
        out[c] = a + (b - a) * fy;
    }
    out
}

/// Bilinear sample of a scalar field at a cell-center position.
fn sample_scalar(buf: &[f32], p: [f32; 2], w: i32, h: i32) -> f32 {
    let gx = p[0] - 0.5;
    let gy = p[1] - 0.5;
    let x0 = gx.floor();
    let y0 = gy.floor();
    let fx = gx - x0;
    let fy = gy - y0;
    let (x0, y0) = (x0 as i32, y0 as i32);
    let v00 = scalar_at(buf, x0, y0, w, h);
    let v10 = scalar_at(buf, x0 + 1, y0, w, h);
    let v01 = scalar_at(buf, x0, y0 + 1, w, h);
    let v11 = scalar_at(buf, x0 + 1, y0 + 1, w, h);
    let a = v00 + (v10 - v00) * fx;
    let b = v01 + (v11 - v01) * fx;
    a + (b - a) * fy
}

fn edge(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    (p[0] - a[0]) * (b[1] - a[1]) - (p[1] - a[1]) * (b[0] - a[0])
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Kernel = KernelId;

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
        Ok(Rc::new(RefCell::new(vec![
            0.0;
            (cells * components) as usize
        ])))
    }

    fn compile(&mut self, kernel: KernelId) -> Result<Self::Kernel, SolverError> {
        Ok(kernel)
    }

    fn bind_buffer(&mut self, slot: BindSlot, buffer: &Self::Buffer, _access: Access) {
        self.slots[slot.index()] = Some(buffer.clone());
    }

    fn set_uniform(&mut self, uniform: Uniform) {
        self.uniforms.set(uniform);
    }

    fn dispatch(&mut self, kernel: Self::Kernel, _groups: [u32; 3]) {
        // The interpreter covers the exact grid; the group count only
        // over-approximates it on the GPU side, where out-of-range threads
        // return early.
        let u = self.uniforms;
        match kernel {
            KernelId::AddVelocity => {
                let (w, h) = self.grid();
                let src = self.slot(BindSlot::VelocityIn);
                let dst = self.slot(BindSlot::VelocityOut);
                let src = src.borrow();
                let mut dst = dst.borrow_mut();
                let target = [u.position[0] * w as f32, u.position[1] * h as f32];
                let radius = u.radius.max(1.0e-4);
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        let dx = x as f32 + 0.5 - target[0];
                        let dy = y as f32 + 0.5 - target[1];
                        let amount = (-(dx * dx + dy * dy) / radius).exp();
                        dst[2 * i] = src[2 * i] + u.value[0] * amount;
                        dst[2 * i + 1] = src[2 * i + 1] + u.value[1] * amount;
                    }
                }
            }
            KernelId::InitBoundaries => {
                let (w, h) = self.grid();
                let vel = self.slot(BindSlot::VelocityIn);
                let mut vel = vel.borrow_mut();
                for y in 0..h {
                    for x in 0..w {
                        if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                            let i = (y * w + x) as usize;
                            vel[2 * i] = 0.0;
                            vel[2 * i + 1] = 0.0;
                        }
                    }
                }
            }
            KernelId::AdvectVelocity => {
                let (w, h) = self.grid();
                let src = self.slot(BindSlot::VelocityIn);
                let dst = self.slot(BindSlot::VelocityOut);
                let obs = self.slot(BindSlot::Obstacles);
                let src = src.borrow();
                let obs = obs.borrow();
                let mut dst = dst.borrow_mut();
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        if obs[2 * i] > 0.0 {
                            dst[2 * i] = 0.0;
                            dst[2 * i + 1] = 0.0;
                            continue;
                        }
                        let back = [
                            x as f32 + 0.5 - src[2 * i] * u.elapsed_time * u.speed,
                            y as f32 + 0.5 - src[2 * i + 1] * u.elapsed_time * u.speed,
                        ];
                        let v = sample_vec2(&src, back, w, h);
                        dst[2 * i] = v[0] * u.dissipation;
                        dst[2 * i + 1] = v[1] * u.dissipation;
                    }
                }
            }
            KernelId::CalcVorticity => {
                let (w, h) = self.grid();
                let vel = self.slot(BindSlot::VelocityIn);
                let vort = self.slot(BindSlot::Vorticity);
                let vel = vel.borrow();
                let mut vort = vort.borrow_mut();
                for y in 0..h {
                    for x in 0..w {
                        let l = vec2_at(&vel, x - 1, y, w, h)[1];
                        let r = vec2_at(&vel, x + 1, y, w, h)[1];
                        let b = vec2_at(&vel, x, y - 1, w, h)[0];
                        let t = vec2_at(&vel, x, y + 1, w, h)[0];
                        vort[(y * w + x) as usize] = 0.5 * ((r - l) - (t - b));
                    }
                }
            }
            KernelId::ApplyVorticity => {
                let (w, h) = self.grid();
                let src = self.slot(BindSlot::VelocityIn);
                let vort = self.slot(BindSlot::Vorticity);
                let dst = self.slot(BindSlot::VelocityOut);
                let src = src.borrow();
                let vort = vort.borrow();
                let mut dst = dst.borrow_mut();
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        let l = scalar_at(&vort, x - 1, y, w, h).abs();
                        let r = scalar_at(&vort, x + 1, y, w, h).abs();
                        let b = scalar_at(&vort, x, y - 1, w, h).abs();
                        let t = scalar_at(&vort, x, y + 1, w, h).abs();
                        let grad = [0.5 * (r - l), 0.5 * (t - b)];
                        let len = (grad[0] * grad[0] + grad[1] * grad[1])
                            .sqrt()
                            .max(1.0e-4);
                        let omega = vort[i];
                        let force = [
                            u.vorticity_scale * omega * grad[1] / len,
                            -u.vorticity_scale * omega * grad[0] / len,
                        ];
                        dst[2 * i] = src[2 * i] + force[0] * u.elapsed_time;
                        dst[2 * i + 1] = src[2 * i + 1] + force[1] * u.elapsed_time;
                    }
                }
            }
            KernelId::Viscosity => {
                let (w, h) = self.grid();
                let src = self.slot(BindSlot::VelocityIn);
                let dst = self.slot(BindSlot::VelocityOut);
                let src = src.borrow();
                let mut dst = dst.borrow_mut();
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        let l = vec2_at(&src, x - 1, y, w, h);
                        let r = vec2_at(&src, x + 1, y, w, h);
                        let b = vec2_at(&src, x, y - 1, w, h);
                        let t = vec2_at(&src, x, y + 1, w, h);
                        for c in 0..2 {
                            dst[2 * i + c] = (l[c] + r[c] + b[c] + t[c]
                                + u.alpha * src[2 * i + c])
                                * u.rbeta;
                        }
                    }
                }
            }
            KernelId::Divergence => {
                let (w, h) = self.grid();
                let vel = self.slot(BindSlot::VelocityIn);
                let div = self.slot(BindSlot::Divergence);
                let vel = vel.borrow();
                let mut div = div.borrow_mut();
                for y in 0..h {
                    for x in 0..w {
                        let l = vec2_at(&vel, x - 1, y, w, h)[0];
                        let r = vec2_at(&vel, x + 1, y, w, h)[0];
                        let b = vec2_at(&vel, x, y - 1, w, h)[1];
                        let t = vec2_at(&vel, x, y + 1, w, h)[1];
                        div[(y * w + x) as usize] = 0.5 * ((r - l) + (t - b));
                    }
                }
            }
            KernelId::Poisson => {
                let (w, h) = self.grid();
                let src = self.slot(BindSlot::PressureIn);
                let dst = self.slot(BindSlot::PressureOut);
                let div = self.slot(BindSlot::Divergence);
                let obs = self.slot(BindSlot::Obstacles);
                let src = src.borrow();
                let div = div.borrow();
                let obs = obs.borrow();
                let mut dst = dst.borrow_mut();
                let p_at = |x: i32, y: i32, center: f32| -> f32 {
                    // Solid cells reflect the center pressure (Neumann).
                    let i = clamp_index(x, y, w, h);
                    if obs[2 * i] > 0.0 { center } else { src[i] }
                };
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        let pc = src[i];
                        let l = p_at(x - 1, y, pc);
                        let r = p_at(x + 1, y, pc);
                        let b = p_at(x, y - 1, pc);
                        let t = p_at(x, y + 1, pc);
                        dst[i] = (l + r + b + t - div[i]) * 0.25;
                    }
                }
            }
            KernelId::SubtractGradient => {
                let (w, h) = self.grid();
                let src = self.slot(BindSlot::VelocityIn);
                let dst = self.slot(BindSlot::VelocityOut);
                let pres = self.slot(BindSlot::PressureIn);
                let obs = self.slot(BindSlot::Obstacles);
                let src = src.borrow();
                let pres = pres.borrow();
                let obs = obs.borrow();
                let mut dst = dst.borrow_mut();
                let p_at = |x: i32, y: i32, center: f32| -> f32 {
                    let i = clamp_index(x, y, w, h);
                    if obs[2 * i] > 0.0 { center } else { pres[i] }
                };
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        if obs[2 * i] > 0.0 {
                            dst[2 * i] = 0.0;
                            dst[2 * i + 1] = 0.0;
                            continue;
                        }
                        let pc = pres[i];
                        let l = p_at(x - 1, y, pc);
                        let r = p_at(x + 1, y, pc);
                        let b = p_at(x, y - 1, pc);
                        let t = p_at(x, y + 1, pc);
                        dst[2 * i] = src[2 * i] - 0.5 * (r - l);
                        dst[2 * i + 1] = src[2 * i + 1] - 0.5 * (t - b);
                    }
                }
            }
            KernelId::AddCircleObstacle => {
                let (w, h) = self.grid();
                let obs = self.slot(BindSlot::Obstacles);
                let mut obs = obs.borrow_mut();
                let target = [u.position[0] * w as f32, u.position[1] * h as f32];
                for y in 0..h {
                    for x in 0..w {
                        let dx = x as f32 + 0.5 - target[0];
                        let dy = y as f32 + 0.5 - target[1];
                        if (dx * dx + dy * dy).sqrt() <= u.radius {
                            let i = (y * w + x) as usize;
                            obs[2 * i] = 1.0;
                            obs[2 * i + 1] = u.static_flag;
                        }
                    }
                }
            }
            KernelId::AddTriangleObstacle => {
                let (w, h) = self.grid();
                let obs = self.slot(BindSlot::Obstacles);
                let mut obs = obs.borrow_mut();
                let scale = [w as f32, h as f32];
                let a = [u.p1[0] * scale[0], u.p1[1] * scale[1]];
                let b = [u.p2[0] * scale[0], u.p2[1] * scale[1]];
                let c = [u.p3[0] * scale[0], u.p3[1] * scale[1]];
                for y in 0..h {
                    for x in 0..w {
                        let p = [x as f32 + 0.5, y as f32 + 0.5];
                        let e0 = edge(p, a, b);
                        let e1 = edge(p, b, c);
                        let e2 = edge(p, c, a);
                        let inside = (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0)
                            || (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0);
                        if inside {
                            let i = (y * w + x) as usize;
                            obs[2 * i] = 1.0;
                            obs[2 * i + 1] = u.static_flag;
                        }
                    }
                }
            }
            KernelId::ClearBuffer => {
                let buf = self.slot(BindSlot::Generic);
                buf.borrow_mut().fill(0.0);
            }
            KernelId::AddParticles => {
                let (w, h) = self.particle_grid();
                let src = self.slot(BindSlot::ParticlesIn);
                let dst = self.slot(BindSlot::ParticlesOut);
                let src = src.borrow();
                let mut dst = dst.borrow_mut();
                let target = [u.position[0] * w as f32, u.position[1] * h as f32];
                let radius = u.radius.max(1.0e-4);
                for y in 0..h {
                    for x in 0..w {
                        let i = (y * w + x) as usize;
                        let dx = x as f32 + 0.5 - target[0];
                        let dy = y as f32 + 0.5 - target[1];
                        let d = (dx * dx + dy * dy).sqrt();
                        if d <= radius {
                            dst[i] = src[i] + u.value[0] * (1.0 - d / radius);
                        } else {
                            dst[i] = src[i];
                        }
                    }
                }
            }
            KernelId::AdvectParticles => {
                let (pw, ph) = self.particle_grid();
                let (vw, vh) = (
                    u.velocity_size[0] as i32,
                    u.velocity_size[1] as i32,
                );
                let src = self.slot(BindSlot::ParticlesIn);
                let dst = self.slot(BindSlot::ParticlesOut);
                let vel = self.slot(BindSlot::VelocityIn);
                let src = src.borrow();
                let vel = vel.borrow();
                let mut dst = dst.borrow_mut();
                for y in 0..ph {
                    for x in 0..pw {
                        let i = (y * pw + x) as usize;
                        let p = [x as f32 + 0.5, y as f32 + 0.5];
                        // Map through normalized space: the two grids may
                        // have different resolutions.
                        let vp = [
                            p[0] / pw as f32 * vw as f32,
                            p[1] / ph as f32 * vh as f32,
                        ];
                        let v = sample_vec2(&vel, vp, vw, vh);
                        let back = [
                            p[0] - v[0] * u.elapsed_time * u.speed,
                            p[1] - v[1] * u.elapsed_time * u.speed,
                        ];
                        dst[i] = sample_scalar(&src, back, pw, ph) * u.dissipation;
                    }
                }
            }
        }
    }

    fn read_back(&self, buffer: &Self::Buffer) -> Vec<f32> {
        buffer.borrow().clone()
    }

    fn group_size(&self) -> u32 {
        self.group_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_sampling_interpolates_between_cells() {
        // 2x1 scalar grid with values 0 and 1; halfway between the two
        // cell centers the sample is 0.5.
        let buf = vec![0.0, 1.0];
        let mid = sample_scalar(&buf, [1.0, 0.5], 2, 1);
        assert!((mid - 0.5).abs() < 1.0e-6, "got {mid}");
        // At a cell center the sample is the cell value.
        let at0 = sample_scalar(&buf, [0.5, 0.5], 2, 1);
        assert!((at0 - 0.0).abs() < 1.0e-6, "got {at0}");
    }

    #[test]
    fn clear_zeroes_the_generic_slot() {
        let mut backend = CpuBackend::new();
        let buf = backend.create_buffer("b", 4, 2).unwrap();
        buf.borrow_mut().fill(3.5);
        backend.bind_buffer(BindSlot::Generic, &buf, Access::ReadWrite);
        backend.set_uniform(Uniform::Size([2.0, 2.0]));
        backend.dispatch(KernelId::ClearBuffer, [1, 1, 1]);
        assert!(backend.read_back(&buf).iter().all(|&v| v == 0.0));
    }
}
