//! Configuration parsing and validation for fluid simulations.

use serde::{Deserialize, Serialize};
use std::fs;

use solver::{ComputeBackend, FluidSolver, ParticleArea, SolverError};

/// Main simulation configuration.
///
/// Parameter domains are not re-checked here; [`SimulationConfig::apply`]
/// pushes every value through the solver's validating setters, so an
/// out-of-domain config fails with the same `InvalidParameter` errors a
/// live caller would see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name.
    pub name: String,
    /// Velocity/pressure grid width in cells.
    pub width: u32,
    /// Velocity/pressure grid height in cells.
    pub height: u32,
    /// Particle grid width; defaults to the fluid grid width.
    #[serde(default)]
    pub particle_width: Option<u32>,
    /// Particle grid height; defaults to the fluid grid height.
    #[serde(default)]
    pub particle_height: Option<u32>,
    /// Advection speed scale.
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Jacobi iteration count for projection and diffusion.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Multiplicative decay per advection step.
    #[serde(default = "default_dissipation")]
    pub dissipation: f32,
    /// Vorticity-confinement scale.
    #[serde(default)]
    pub vorticity: f32,
    /// Kinematic viscosity; zero disables the diffusion passes.
    #[serde(default = "default_viscosity")]
    pub viscosity: f32,
    /// Enforce no-slip walls on the domain border.
    #[serde(default = "default_true")]
    pub borders: bool,
    /// Fixed frame time step in seconds.
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Stop after this many frames (the demo binary's stopping condition).
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

fn default_speed() -> f32 {
    500.0
}

fn default_iterations() -> u32 {
    50
}

fn default_dissipation() -> f32 {
    1.0
}

fn default_viscosity() -> f32 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

fn default_max_steps() -> u64 {
    600
}

impl SimulationConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let text = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Particle grid dimensions, falling back to the fluid grid's.
    pub fn particle_dims(&self) -> (u32, u32) {
        (
            self.particle_width.unwrap_or(self.width),
            self.particle_height.unwrap_or(self.height),
        )
    }

    /// Push every parameter through the solver's validating setters.
    pub fn apply<B: ComputeBackend>(
        &self,
        fluid: &mut FluidSolver<B>,
        area: &mut ParticleArea<B>,
    ) -> Result<(), SolverError> {
        fluid.set_speed(self.speed)?;
        fluid.set_iterations(self.iterations)?;
        fluid.set_dissipation(self.dissipation)?;
        fluid.set_vorticity(self.vorticity)?;
        fluid.set_viscosity(self.viscosity)?;
        fluid.has_borders = self.borders;
        area.set_speed(self.speed)?;
        area.set_dissipation(self.dissipation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver::CpuBackend;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{ "name": "smoke", "width": 128, "height": 128 }"#,
        )
        .unwrap();
        assert_eq!(config.speed, 500.0);
        assert_eq!(config.iterations, 50);
        assert_eq!(config.dissipation, 1.0);
        assert_eq!(config.vorticity, 0.0);
        assert!(config.borders);
        assert_eq!(config.particle_dims(), (128, 128));
    }

    #[test]
    fn particle_grid_may_differ_from_the_fluid_grid() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{ "name": "hires", "width": 64, "height": 64,
                 "particle_width": 256, "particle_height": 256 }"#,
        )
        .unwrap();
        assert_eq!(config.particle_dims(), (256, 256));
    }

    #[test]
    fn out_of_domain_config_is_rejected_by_apply() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{ "name": "bad", "width": 32, "height": 32, "speed": -1.0 }"#,
        )
        .unwrap();

        let mut backend = CpuBackend::new();
        let mut fluid = FluidSolver::new(&mut backend, 32, 32).unwrap();
        let mut area = ParticleArea::new(&mut backend, 32, 32).unwrap();
        assert!(config.apply(&mut fluid, &mut area).is_err());
    }
}
