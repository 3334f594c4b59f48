//! # MPC Cycle Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mpc_lib::{
    mpc_ctrl::{HorizonProblem, InputData, MpcCtrl, Params},
    nlp::{AlmSolver, NlpSolver},
    reference::{Pose2, RefCurve},
    vehicle_model::{Actuation, VehicleState},
};
use util::module::State;

fn mpc_cycle_benchmark(c: &mut Criterion) {
    // ---- Build the inputs ----

    let params = Params::default();

    // Gently curving waypoints ahead of a vehicle slightly off the path
    let pose = Pose2 {
        x_m: 10.0,
        y_m: 5.0,
        psi_rad: 0.1,
    };
    let world_x: Vec<f64> = (0..6).map(|i| 8.0 + 10.0 * i as f64).collect();
    let world_y: Vec<f64> = world_x.iter().map(|x| 4.0 + 0.15 * x + 0.001 * x * x).collect();

    let input = InputData::from_world(
        &pose,
        30.0,
        &world_x,
        &world_y,
        Some(Actuation { steer_rad: 0.02, throttle: 0.3 }),
    )
    .unwrap();

    // Bench the curve fit
    c.bench_function("RefCurve::fit", |b| {
        b.iter(|| RefCurve::fit(black_box(&world_x), black_box(&world_y)).unwrap())
    });

    // Bench a solve of the horizon problem alone
    let init_state = VehicleState::at_origin(30.0, input.state.cte_m, input.state.epsi_rad);
    let mut solver = AlmSolver::new(params.solver.clone());
    c.bench_function("AlmSolver::solve", |b| {
        b.iter(|| {
            let problem = HorizonProblem::new(&params, init_state);
            solver.solve(&problem).unwrap()
        })
    });

    // Bench one full control cycle
    let mut mpc_ctrl: MpcCtrl = MpcCtrl::init(params.clone()).unwrap();
    c.bench_function("MpcCtrl::proc", |b| {
        b.iter(|| mpc_ctrl.proc(black_box(&input)).unwrap())
    });
}

criterion_group!(benches, mpc_cycle_benchmark);
criterion_main!(benches);
