//! Headless demo driver.
//!
//! Builds a simulation from a JSON config (or built-in defaults), stirs the
//! fluid with a moving impulse while feeding particle density into it, and
//! logs field statistics as it runs. Picks the GPU backend when an adapter
//! is available, otherwise falls back to the CPU reference.

use orchestrator::{RunnerState, SimulationConfig, SimulationRunner};
use solver::{ComputeBackend, CpuBackend};

fn default_config() -> SimulationConfig {
    serde_json::from_str(
        r#"{
            "name": "headless-demo",
            "width": 128,
            "height": 128,
            "speed": 200.0,
            "viscosity": 0.05,
            "vorticity": 1.0,
            "dissipation": 0.99,
            "max_steps": 600
        }"#,
    )
    .expect("built-in default config is valid")
}

fn mean_magnitude(velocity: &[f32]) -> f32 {
    let cells = velocity.len() / 2;
    if cells == 0 {
        return 0.0;
    }
    let sum: f32 = velocity
        .chunks_exact(2)
        .map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt())
        .sum();
    sum / cells as f32
}

fn run<B: ComputeBackend>(backend: B, config: SimulationConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut runner = SimulationRunner::new(backend, config)?;
    runner.start();

    let mut frame = 0u64;
    while runner.state() == RunnerState::Running {
        // Stir: an impulse orbiting the domain center, tangential to its
        // path, with density fed in at the same point.
        let theta = frame as f32 * 0.02;
        let position = [0.5 + 0.3 * theta.cos(), 0.5 + 0.3 * theta.sin()];
        let velocity = [-theta.sin() * 0.8, theta.cos() * 0.8];
        runner.add_velocity(position, velocity, 8.0);
        runner.add_particles(position, 6.0, 0.5);

        runner.step();
        frame += 1;

        if frame % 60 == 0 {
            let velocity = runner.read_velocity();
            let density = runner.read_density();
            tracing::info!(
                "frame {}: t={:.2}s, mean |v|={:.4}, total density={:.2}",
                frame,
                runner.sim_time(),
                mean_magnitude(&velocity),
                density.iter().sum::<f32>()
            );
        }
    }

    let velocity = runner.read_velocity();
    tracing::info!(
        "done after {} frames: mean |v|={:.4}",
        runner.frame(),
        mean_magnitude(&velocity)
    );
    runner.destroy();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load(&path)?,
        None => default_config(),
    };
    tracing::info!("simulation: {}", config.name);

    #[cfg(feature = "gpu")]
    if solver::gpu_available() {
        return run(solver::WgpuBackend::new()?, config);
    }

    tracing::info!("no GPU adapter, using the CPU reference backend");
    run(CpuBackend::new(), config)
}
