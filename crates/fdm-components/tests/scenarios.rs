//! End-to-end runs of the reference components.

use fdm_components::{Counter, Harness, Oscillator, PiController, ThrottleActuator, ThrottleServo};
use fdm_sim::{Algorithm, SaveOptions, SimOptions, Simulation};
use fdm_system::System;
use proptest::prelude::*;

#[test]
fn oscillator_and_counter_scenario() {
    let harness = Harness::default();
    let osc = harness.osc.clone();
    let mut sim = Simulation::new(
        System::new(harness).unwrap(),
        SimOptions {
            algorithm: Algorithm::Rk4,
            dt: 0.01,
            disc_dt: 1.0,
            t_end: 10.0,
            ..SimOptions::default()
        },
    )
    .unwrap();
    sim.run().unwrap();

    let count = sim
        .with_system(|sys| sys.s().unwrap().lookup("counter.count").unwrap().as_int())
        .unwrap();
    assert_eq!(count, Some(10));

    let ts = sim.timeseries().unwrap();
    assert_eq!(ts.len(), 1001);
    let pos = ts.path("osc.pos").unwrap().scalars().unwrap();
    for (&t, &p) in ts.times().iter().zip(&pos) {
        assert!((p - osc.exact_pos(t)).abs() < 1e-3, "t = {t}");
    }
    let counts = ts.path("counter.count").unwrap();
    assert_eq!(counts.last().unwrap().1.as_int(), Some(10));
}

#[test]
fn adaptive_method_tracks_oscillator() {
    let osc = Oscillator::new(2.0, 0.0, 1.0).unwrap();
    let mut sim = Simulation::new(
        System::new(osc.clone()).unwrap(),
        SimOptions {
            algorithm: Algorithm::BogackiShampine,
            adaptive: true,
            dt: 0.01,
            disc_dt: 0.5,
            t_end: 5.0,
            abstol: 1e-6,
            reltol: 1e-6,
            save: SaveOptions::at(vec![1.0, 2.5, 5.0]),
            ..SimOptions::default()
        },
    )
    .unwrap();
    let summary = sim.run().unwrap();
    // Fewer steps than the initial step size would need.
    assert!(summary.steps < 500, "steps = {}", summary.steps);

    let ts = sim.timeseries().unwrap();
    assert_eq!(ts.times(), &[0.0, 1.0, 2.5, 5.0]);
    for (t, y) in ts.iter() {
        let p = y.get_path_f64("pos").unwrap();
        assert!((p - osc.exact_pos(t)).abs() < 1e-3, "t = {t}");
    }
}

#[test]
fn servo_settles_on_commanded_throttle() {
    let servo = ThrottleServo::new(
        ThrottleActuator::new(0.2, 2.0).unwrap(),
        PiController::new(1.5, 3.75, 0.0, 1.0)
            .unwrap()
            .with_reference(0.7),
    );
    let mut sim = Simulation::new(
        System::new(servo).unwrap(),
        SimOptions {
            dt: 0.005,
            disc_dt: 0.02,
            t_end: 15.0,
            save: SaveOptions::start_and_end(),
            ..SimOptions::default()
        },
    )
    .unwrap();
    sim.run().unwrap();
    let throttle = sim
        .with_system(|sys| sys.y().unwrap().get_path_f64("actuator.throttle").unwrap())
        .unwrap();
    assert!((throttle - 0.7).abs() < 1e-2, "throttle = {throttle}");
}

#[test]
fn throttle_stays_between_stops() {
    // Command past full power: the post-step clamp holds the lever at 1.
    let act = ThrottleActuator::new(0.05, 100.0).unwrap().with_throttle(0.9);
    let mut sys = System::new(act).unwrap();
    sys.u_mut().unwrap().set_path_f64("cmd", 3.0).unwrap();
    let mut sim = Simulation::new(
        sys,
        SimOptions {
            dt: 0.01,
            t_end: 1.0,
            ..SimOptions::default()
        },
    )
    .unwrap();
    sim.run().unwrap();
    let ts = sim.timeseries().unwrap();
    let throttle = ts.path("throttle").unwrap().scalars().unwrap();
    assert!(throttle.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(throttle.last(), Some(&1.0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn counter_matches_number_of_periods(periods in 1_u32..20, steps_per in 1_u32..8) {
        let disc_dt = 0.05;
        let mut sim = Simulation::new(
            System::new(Counter::default()).unwrap(),
            SimOptions {
                dt: disc_dt / steps_per as f64,
                disc_dt,
                t_end: disc_dt * periods as f64,
                save: SaveOptions::start_and_end(),
                ..SimOptions::default()
            },
        )
        .unwrap();
        let summary = sim.run().unwrap();
        prop_assert_eq!(summary.discrete_updates, periods as u64);
        let count = sim
            .with_system(|sys| sys.s().unwrap().lookup("count").unwrap().as_int())
            .unwrap();
        prop_assert_eq!(count, Some(periods as i64));
    }
}
