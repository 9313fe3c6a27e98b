//! Obstacle rasterization and the end-of-frame clear.

use solver::{ComputeBackend, CpuBackend, FluidSolver};

fn setup(size: u32) -> (CpuBackend, FluidSolver<CpuBackend>) {
    let mut backend = CpuBackend::new();
    let fluid = FluidSolver::new(&mut backend, size, size).expect("solver construction");
    (backend, fluid)
}

fn occupied(obstacles: &[f32], x: u32, y: u32, w: u32) -> bool {
    obstacles[2 * (y * w + x) as usize] > 0.0
}

#[test]
fn circle_marks_cells_within_its_radius() {
    let (mut backend, mut fluid) = setup(64);
    fluid.add_circle_obstacle(&mut backend, [0.5, 0.5], 5.0, false);

    let obstacles = backend.read_back(fluid.obstacle_field());

    // Cells well inside the 5-cell radius around the grid center.
    assert!(occupied(&obstacles, 32, 32, 64));
    assert!(occupied(&obstacles, 36, 32, 64));
    assert!(occupied(&obstacles, 32, 28, 64));
    // Cells clearly outside.
    assert!(!occupied(&obstacles, 39, 32, 64));
    assert!(!occupied(&obstacles, 0, 0, 64));

    let count = (0..64 * 64)
        .filter(|&i| obstacles[2 * i as usize] > 0.0)
        .count();
    // Rasterized disk area, pi * r^2 with r = 5, within raster tolerance.
    assert!(
        (60..=97).contains(&count),
        "disk covered {count} cells, expected about 79"
    );
}

#[test]
fn triangle_marks_its_interior() {
    let (mut backend, mut fluid) = setup(16);
    fluid.add_triangle_obstacle(
        &mut backend,
        [0.0, 0.0],
        [1.0, 0.0],
        [0.0, 1.0],
        false,
    );

    let obstacles = backend.read_back(fluid.obstacle_field());
    // Lower-left half of the grid is inside the triangle.
    assert!(occupied(&obstacles, 2, 2, 16));
    assert!(occupied(&obstacles, 1, 10, 16));
    // The opposite corner is outside.
    assert!(!occupied(&obstacles, 14, 14, 16));
}

#[test]
fn update_clears_obstacles_at_end_of_frame() {
    let (mut backend, mut fluid) = setup(64);
    fluid.add_circle_obstacle(&mut backend, [0.5, 0.5], 5.0, false);
    assert!(
        backend
            .read_back(fluid.obstacle_field())
            .iter()
            .any(|&v| v > 0.0)
    );

    fluid.update(&mut backend, 0.016);
    assert!(
        backend
            .read_back(fluid.obstacle_field())
            .iter()
            .all(|&v| v == 0.0),
        "obstacle field should read back all-zero after the frame clear"
    );
}

#[test]
fn static_flag_is_recorded_but_does_not_survive_the_frame_clear() {
    let (mut backend, mut fluid) = setup(32);
    fluid.add_circle_obstacle(&mut backend, [0.5, 0.5], 4.0, true);

    let obstacles = backend.read_back(fluid.obstacle_field());
    let center = 2 * (16 * 32 + 16) as usize;
    assert_eq!(obstacles[center], 1.0);
    assert_eq!(obstacles[center + 1], 1.0, "static flag not recorded");

    // The end-of-frame clear is unconditional: obstacles marked static are
    // wiped like any other. Callers wanting persistence re-inject each
    // frame.
    fluid.update(&mut backend, 0.016);
    assert!(
        backend
            .read_back(fluid.obstacle_field())
            .iter()
            .all(|&v| v == 0.0)
    );
}

#[test]
fn velocity_inside_an_obstacle_is_suppressed_by_the_frame() {
    let (mut backend, mut fluid) = setup(32);
    fluid.set_speed(10.0).unwrap();

    // Impulse across the whole grid, obstacle in the middle of it.
    fluid.add_velocity(&mut backend, [0.5, 0.5], [2.0, 0.0], 40.0);
    fluid.add_circle_obstacle(&mut backend, [0.5, 0.5], 3.0, false);
    fluid.update(&mut backend, 0.016);

    let vel = backend.read_back(fluid.velocity_field());
    let center = 2 * (16 * 32 + 16) as usize;
    assert!(
        vel[center].abs() < 1.0e-6 && vel[center + 1].abs() < 1.0e-6,
        "cells inside an obstacle should carry no velocity, got ({}, {})",
        vel[center],
        vel[center + 1]
    );
}
