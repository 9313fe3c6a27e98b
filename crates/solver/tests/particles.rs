//! Particle advection subsystem: injection, dissipation decay, drift along
//! an injected velocity field, and resolution independence.

use solver::{ComputeBackend, CpuBackend, FluidSolver, ParticleArea};

fn setup(
    fluid_size: u32,
    particle_size: u32,
) -> (CpuBackend, FluidSolver<CpuBackend>, ParticleArea<CpuBackend>) {
    let mut backend = CpuBackend::new();
    let fluid = FluidSolver::new(&mut backend, fluid_size, fluid_size).expect("solver");
    let area = ParticleArea::new(&mut backend, particle_size, particle_size).expect("area");
    (backend, fluid, area)
}

fn total_mass(data: &[f32]) -> f32 {
    data.iter().sum()
}

fn center_of_mass_x(data: &[f32], w: usize) -> f32 {
    let mut mass = 0.0f32;
    let mut weighted = 0.0f32;
    for (i, &m) in data.iter().enumerate() {
        let x = (i % w) as f32 + 0.5;
        mass += m;
        weighted += m * x;
    }
    weighted / mass.max(1.0e-12)
}

#[test]
fn injection_writes_a_disk_of_density() {
    let (mut backend, _fluid, mut area) = setup(32, 32);
    area.add_particles(&mut backend, [0.5, 0.5], 4.0, 1.0);

    let density = backend.read_back(area.particle_field());
    assert!(total_mass(&density) > 0.0, "injection added no mass");

    // Strength peaks at the injection point and is zero outside the disk.
    let at = |x: usize, y: usize| density[y * 32 + x];
    assert!(at(16, 16) > 0.8, "center density {}", at(16, 16));
    assert_eq!(at(0, 0), 0.0);
    assert_eq!(at(31, 31), 0.0);
}

#[test]
fn zero_velocity_decay_is_exactly_the_dissipation_factor() {
    let (mut backend, fluid, mut area) = setup(16, 16);
    area.set_dissipation(0.9).unwrap();

    area.add_particles(&mut backend, [0.5, 0.5], 3.0, 1.0);
    let mut mass = total_mass(&backend.read_back(area.particle_field()));
    assert!(mass > 0.0);

    // With a zero velocity field the backtrace is the identity, so each
    // step is a pure multiplicative decay.
    for _ in 0..5 {
        area.update(&mut backend, &fluid, 0.016);
        let next = total_mass(&backend.read_back(area.particle_field()));
        let expected = mass * 0.9;
        assert!(
            (next - expected).abs() <= expected.abs() * 1.0e-5 + 1.0e-6,
            "expected {expected}, got {next}"
        );
        mass = next;
    }
}

#[test]
fn mass_drifts_with_the_flow_and_never_grows() {
    let (mut backend, mut fluid, mut area) = setup(32, 32);
    fluid.set_speed(10.0).unwrap();
    fluid.set_viscosity(0.0).unwrap();
    area.set_speed(10.0).unwrap();
    area.set_dissipation(0.9).unwrap();

    area.add_particles(&mut backend, [0.2, 0.2], 3.0, 1.0);
    let initial = backend.read_back(area.particle_field());
    let com_before = center_of_mass_x(&initial, 32);
    let mut mass = total_mass(&initial);

    for _ in 0..10 {
        // Keep the rightward flow alive against projection and walls.
        fluid.add_velocity(&mut backend, [0.2, 0.2], [1.0, 0.0], 6.0);
        fluid.update(&mut backend, 0.016);
        area.update(&mut backend, &fluid, 0.016);

        let density = backend.read_back(area.particle_field());
        let next = total_mass(&density);
        assert!(
            next <= mass * 1.0001 + 1.0e-6,
            "total mass grew: {mass} -> {next}"
        );
        mass = next;
    }

    let com_after = center_of_mass_x(&backend.read_back(area.particle_field()), 32);
    assert!(
        com_after > com_before + 0.02,
        "density did not drift with the +x flow: {com_before} -> {com_after}"
    );
    assert!(mass > 0.0, "all mass dissipated during the drift window");
}

#[test]
fn particle_grid_resolution_is_independent_of_the_velocity_grid() {
    let (mut backend, mut fluid, mut area) = setup(16, 48);
    fluid.set_speed(10.0).unwrap();
    area.set_speed(10.0).unwrap();

    area.add_particles(&mut backend, [0.5, 0.5], 6.0, 1.0);
    fluid.add_velocity(&mut backend, [0.5, 0.5], [0.5, 0.5], 3.0);
    for _ in 0..3 {
        fluid.update(&mut backend, 0.016);
        area.update(&mut backend, &fluid, 0.016);
    }

    let density = backend.read_back(area.particle_field());
    assert_eq!(density.len(), 48 * 48);
    assert!(density.iter().all(|v| v.is_finite()));
    assert!(total_mass(&density) > 0.0);
}

#[test]
fn paused_area_ignores_injection_and_update() {
    let (mut backend, fluid, mut area) = setup(16, 16);
    area.simulate = false;

    let before = backend.read_back(area.particle_field());
    area.add_particles(&mut backend, [0.5, 0.5], 3.0, 1.0);
    area.update(&mut backend, &fluid, 0.016);
    assert_eq!(backend.read_back(area.particle_field()), before);
}
