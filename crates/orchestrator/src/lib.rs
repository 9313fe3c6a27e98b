//! Orchestration layer.
//!
//! This crate stands in for the host collaborators around the solver core:
//! - Configuration loading and validation ([`config`]).
//! - A single-threaded frame loop with lifecycle management ([`runner`]).
//!
//! The presentation layer (pixels, windows, UI) is intentionally absent;
//! consumers read fields back through the runner and format them however
//! they like.

#![warn(missing_docs)]

pub mod config;
pub mod runner;

pub use config::SimulationConfig;
pub use runner::{RunnerState, SimulationRunner};

use solver::ComputeBackend;

/// Create a ready-to-start simulation from a JSON configuration file.
///
/// # Example
/// ```no_run
/// use orchestrator::create_simulation;
/// use solver::CpuBackend;
///
/// let mut runner = create_simulation(CpuBackend::new(), "config/demo.json")?;
/// runner.start();
/// while runner.state() == orchestrator::RunnerState::Running {
///     runner.step();
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation<B: ComputeBackend>(
    backend: B,
    config_path: &str,
) -> Result<SimulationRunner<B>, Box<dyn std::error::Error>> {
    tracing::info!("creating simulation from config: {config_path}");
    let config = SimulationConfig::load(config_path)?;
    SimulationRunner::new(backend, config)
}
