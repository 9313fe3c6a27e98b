//! Property-setter domain validation.
//!
//! Every setter rejects out-of-domain values with `InvalidParameter` and
//! leaves the previous value in place.

use solver::{CpuBackend, FluidSolver, ParticleArea, SolverError};

fn setup() -> (CpuBackend, FluidSolver<CpuBackend>) {
    let mut backend = CpuBackend::new();
    let fluid = FluidSolver::new(&mut backend, 16, 16).expect("solver construction");
    (backend, fluid)
}

fn assert_invalid(result: Result<(), SolverError>, expected_name: &str) {
    match result {
        Err(SolverError::InvalidParameter { name, .. }) => {
            assert_eq!(name, expected_name);
        }
        other => panic!("expected InvalidParameter for '{expected_name}', got {other:?}"),
    }
}

#[test]
fn speed_must_be_positive() {
    let (_backend, mut fluid) = setup();
    fluid.set_speed(250.0).unwrap();
    assert_invalid(fluid.set_speed(0.0), "speed");
    assert_invalid(fluid.set_speed(-10.0), "speed");
    assert_eq!(fluid.speed(), 250.0);
}

#[test]
fn iterations_must_be_positive() {
    let (_backend, mut fluid) = setup();
    fluid.set_iterations(20).unwrap();
    assert_invalid(fluid.set_iterations(0), "iterations");
    assert_eq!(fluid.iterations(), 20);
}

#[test]
fn dissipation_must_be_positive() {
    let (_backend, mut fluid) = setup();
    fluid.set_dissipation(0.95).unwrap();
    assert_invalid(fluid.set_dissipation(0.0), "dissipation");
    assert_invalid(fluid.set_dissipation(-0.5), "dissipation");
    assert_eq!(fluid.dissipation(), 0.95);
}

#[test]
fn vorticity_accepts_zero_but_not_negative() {
    let (_backend, mut fluid) = setup();
    fluid.set_vorticity(0.0).unwrap();
    fluid.set_vorticity(1.5).unwrap();
    assert_invalid(fluid.set_vorticity(-0.1), "vorticity");
    assert_eq!(fluid.vorticity(), 1.5);
}

#[test]
fn viscosity_accepts_zero_but_not_negative() {
    let (_backend, mut fluid) = setup();
    fluid.set_viscosity(0.0).unwrap();
    fluid.set_viscosity(0.3).unwrap();
    assert_invalid(fluid.set_viscosity(-1.0), "viscosity");
    assert_eq!(fluid.viscosity(), 0.3);
}

#[test]
fn particle_setters_validate_their_domains() {
    let mut backend = CpuBackend::new();
    let mut area = ParticleArea::new(&mut backend, 16, 16).expect("area construction");

    area.set_speed(100.0).unwrap();
    assert_invalid(area.set_speed(0.0), "speed");
    assert_eq!(area.speed(), 100.0);

    area.set_dissipation(0.9).unwrap();
    assert_invalid(area.set_dissipation(-0.2), "dissipation");
    assert_eq!(area.dissipation(), 0.9);
}

#[test]
fn zero_sized_grids_fail_construction() {
    let mut backend = CpuBackend::new();
    assert!(matches!(
        FluidSolver::new(&mut backend, 0, 16),
        Err(SolverError::ResourceInit(_))
    ));
    assert!(matches!(
        ParticleArea::new(&mut backend, 16, 0),
        Err(SolverError::ResourceInit(_))
    ));
}
