//! Simulation runner with lifecycle management.
//!
//! The runner owns the backend and both subsystems and drives them from
//! the caller's thread: the whole pipeline is single-threaded host
//! sequencing, so there is no background thread here, only a small state
//! machine (created, running, paused, finished) and a fixed-timestep
//! `step`.

use solver::{ComputeBackend, FluidSolver, ParticleArea};

use crate::config::SimulationConfig;

/// Runner lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Built but not yet started.
    Created,
    /// `step` advances the simulation.
    Running,
    /// `step` is a no-op until resumed.
    Paused,
    /// Reached the configured frame count.
    Finished,
}

/// Owns a backend, a fluid solver and a particle area, and advances them
/// one fixed-dt frame at a time.
pub struct SimulationRunner<B: ComputeBackend> {
    backend: B,
    fluid: FluidSolver<B>,
    area: ParticleArea<B>,
    config: SimulationConfig,
    state: RunnerState,
    frame: u64,
    sim_time: f64,
}

impl<B: ComputeBackend> SimulationRunner<B> {
    /// Build both subsystems on `backend` and apply the config through the
    /// validating setters.
    pub fn new(
        mut backend: B,
        config: SimulationConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut fluid = FluidSolver::new(&mut backend, config.width, config.height)?;
        let (pw, ph) = config.particle_dims();
        let mut area = ParticleArea::new(&mut backend, pw, ph)?;
        config.apply(&mut fluid, &mut area)?;

        tracing::info!(
            "simulation '{}' ready: fluid {}x{}, particles {}x{}",
            config.name,
            config.width,
            config.height,
            pw,
            ph
        );

        Ok(Self {
            backend,
            fluid,
            area,
            config,
            state: RunnerState::Created,
            frame: 0,
            sim_time: 0.0,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Frames stepped so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds so far.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Begin stepping. Only meaningful from `Created`.
    pub fn start(&mut self) {
        if self.state == RunnerState::Created {
            self.state = RunnerState::Running;
            tracing::info!("simulation '{}' started", self.config.name);
        }
    }

    /// Pause: subsequent `step` calls (and any injection) become no-ops.
    pub fn pause(&mut self) {
        if self.state == RunnerState::Running {
            self.state = RunnerState::Paused;
            self.fluid.simulate = false;
            self.area.simulate = false;
        }
    }

    /// Resume from `Paused`.
    pub fn resume(&mut self) {
        if self.state == RunnerState::Paused {
            self.state = RunnerState::Running;
            self.fluid.simulate = true;
            self.area.simulate = true;
        }
    }

    /// Advance one fixed-dt frame; no-op unless running. Transitions to
    /// `Finished` once `max_steps` frames have run.
    pub fn step(&mut self) {
        if self.state != RunnerState::Running {
            return;
        }
        let dt = self.config.dt;
        self.fluid.update(&mut self.backend, dt);
        self.area.update(&mut self.backend, &self.fluid, dt);
        self.frame += 1;
        self.sim_time += dt as f64;

        if self.frame >= self.config.max_steps {
            self.state = RunnerState::Finished;
            tracing::info!(
                "simulation '{}' finished: {} frames, {:.3}s simulated",
                self.config.name,
                self.frame,
                self.sim_time
            );
        }
    }

    /// Inject a velocity impulse (normalized position, radius in cells).
    pub fn add_velocity(&mut self, position: [f32; 2], velocity: [f32; 2], radius: f32) {
        self.fluid
            .add_velocity(&mut self.backend, position, velocity, radius);
    }

    /// Rasterize a circle obstacle for this frame.
    pub fn add_circle_obstacle(&mut self, position: [f32; 2], radius: f32, is_static: bool) {
        self.fluid
            .add_circle_obstacle(&mut self.backend, position, radius, is_static);
    }

    /// Inject particle density (normalized position, radius in cells).
    pub fn add_particles(&mut self, position: [f32; 2], radius: f32, strength: f32) {
        self.area
            .add_particles(&mut self.backend, position, radius, strength);
    }

    /// Read back the current velocity field (2 scalars per cell).
    pub fn read_velocity(&self) -> Vec<f32> {
        self.backend.read_back(self.fluid.velocity_field())
    }

    /// Read back the current particle density field.
    pub fn read_density(&self) -> Vec<f32> {
        self.backend.read_back(self.area.particle_field())
    }

    /// Tear down both subsystems, then drop the backend.
    pub fn destroy(self) {
        let mut backend = self.backend;
        self.area.destroy(&mut backend);
        self.fluid.destroy(&mut backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver::CpuBackend;

    fn test_config(max_steps: u64) -> SimulationConfig {
        serde_json::from_str(&format!(
            r#"{{ "name": "test", "width": 16, "height": 16,
                 "speed": 10.0, "viscosity": 0.0, "max_steps": {max_steps} }}"#
        ))
        .unwrap()
    }

    #[test]
    fn lifecycle_created_running_finished() {
        let mut runner = SimulationRunner::new(CpuBackend::new(), test_config(3)).unwrap();
        assert_eq!(runner.state(), RunnerState::Created);

        // Stepping before start does nothing.
        runner.step();
        assert_eq!(runner.frame(), 0);

        runner.start();
        assert_eq!(runner.state(), RunnerState::Running);
        runner.step();
        runner.step();
        assert_eq!(runner.frame(), 2);
        runner.step();
        assert_eq!(runner.state(), RunnerState::Finished);

        // Finished is terminal.
        runner.step();
        assert_eq!(runner.frame(), 3);
    }

    #[test]
    fn pause_gates_stepping_and_injection() {
        let mut runner = SimulationRunner::new(CpuBackend::new(), test_config(100)).unwrap();
        runner.start();
        runner.step();
        runner.pause();
        assert_eq!(runner.state(), RunnerState::Paused);

        let before = runner.read_velocity();
        runner.add_velocity([0.5, 0.5], [1.0, 0.0], 2.0);
        runner.step();
        assert_eq!(runner.frame(), 1);
        assert_eq!(runner.read_velocity(), before);

        runner.resume();
        runner.step();
        assert_eq!(runner.frame(), 2);
    }

    #[test]
    fn injected_impulse_survives_a_step() {
        let mut runner = SimulationRunner::new(CpuBackend::new(), test_config(100)).unwrap();
        runner.start();
        runner.add_velocity([0.5, 0.5], [1.0, 0.0], 4.0);
        runner.step();
        let vel = runner.read_velocity();
        assert!(vel.iter().any(|&v| v.abs() > 1.0e-3));
        runner.destroy();
    }
}
