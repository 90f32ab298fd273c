//! Integration tests for fdm-system: construction, aliasing and the update protocol.

use fdm_system::{
    Args, BuildInputs, Component, NodeMut, Parts, Record, StateVector, System, SystemError,
    SystemResult, Value,
};
use proptest::prelude::*;

#[derive(Clone, Debug)]
struct Mass {
    m: f64,
}

impl Component for Mass {
    fn x0(&self) -> Option<StateVector> {
        Some(StateVector::named(&[("pos", 0.0), ("vel", 0.0)]))
    }

    fn y0(&self) -> Option<Value> {
        Some(Record::new().with("pos", 0.0).with("vel", 0.0).into())
    }

    fn u0(&self) -> Option<Value> {
        Some(Record::new().with("force", 0.0).into())
    }

    fn params(&self) -> Option<Value> {
        Some(Record::new().with("m", self.m).into())
    }

    fn f_ode(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<()> {
        let force = node.u()?.get_path_f64("force")?;
        let Parts {
            x: Some(x),
            xdot: Some(xdot),
            y: Some(y),
            ..
        } = node.parts_mut()
        else {
            return Err(node.absent("x"));
        };
        xdot[0] = x[1];
        xdot[1] = force / self.m;
        y.set_path_f64("pos", x[0])?;
        y.set_path_f64("vel", x[1])
    }
}

/// Discrete counter; `f_step` optionally reports an `x` change.
#[derive(Clone, Debug)]
struct Tick {
    reports_change: bool,
}

impl Component for Tick {
    fn s0(&self) -> Option<Value> {
        Some(Record::new().with("count", 0_i64).into())
    }

    fn f_step(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<bool> {
        let s = node.s_mut()?;
        let count = s.lookup("count").and_then(Value::as_int).unwrap_or(0);
        s.lookup_mut("count")
            .ok_or(SystemError::FieldNotFound {
                path: "count".into(),
            })?
            .set_int(count + 1)?;
        Ok(self.reports_change)
    }
}

#[derive(Clone, Debug)]
struct Rig {
    left: Mass,
    right: Mass,
    tick: Tick,
}

impl Component for Rig {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        vec![
            ("left", &self.left),
            ("right", &self.right),
            ("tick", &self.tick),
        ]
    }
}

fn rig() -> Rig {
    Rig {
        left: Mass { m: 1.0 },
        right: Mass { m: 2.0 },
        tick: Tick {
            reports_change: false,
        },
    }
}

fn count_at(sys: &System, path: &str) -> i64 {
    sys.s()
        .and_then(|s| s.lookup(path))
        .and_then(Value::as_int)
        .unwrap()
}

#[test]
fn derived_shapes_follow_tree() {
    let sys = System::new(rig()).unwrap();

    assert_eq!(sys.node_count(), 4);
    assert_eq!(
        sys.paths().collect::<Vec<_>>(),
        vec!["", "left", "right", "tick"]
    );
    assert_eq!(sys.x().len(), 4);
    assert_eq!(sys.x_layout().unwrap().range_of("right.vel"), Some(3..4));

    let y_names: Vec<&str> = sys.y().unwrap().as_record().unwrap().names().collect();
    assert_eq!(y_names, vec!["left", "right"]);
    let s_names: Vec<&str> = sys.s().unwrap().as_record().unwrap().names().collect();
    assert_eq!(s_names, vec!["tick"]);

    assert!(sys.x_at("tick").is_none());
    assert!(sys.y_at("tick").is_none());
    assert_eq!(
        sys.nodes()[1].params().unwrap().get_path_f64("m").unwrap(),
        1.0
    );
}

#[test]
fn leaf_views_alias_root_buffer() {
    let mut sys = System::new(rig()).unwrap();

    sys.node_mut("right").unwrap().x_mut().unwrap()[0] = 5.0;
    assert_eq!(sys.x(), &[0.0, 0.0, 5.0, 0.0]);

    sys.x_mut()[1] = 3.0;
    assert_eq!(sys.x_at("left").unwrap(), &[0.0, 3.0]);
    assert_eq!(sys.node_mut("left").unwrap().x().unwrap(), &[0.0, 3.0]);
}

#[test]
fn f_ode_updates_derivative_and_aggregate_output() {
    let mut sys = System::new(rig()).unwrap();
    sys.u_mut()
        .unwrap()
        .set_path_f64("right.force", 4.0)
        .unwrap();
    sys.set_x(&[1.0, 0.5, -1.0, 0.0]).unwrap();

    sys.update_continuous(Args::NONE).unwrap();

    assert_eq!(sys.xdot(), &[0.5, 0.0, 0.0, 2.0]);
    let y = sys.y().unwrap();
    assert_eq!(y.get_path_f64("left.pos").unwrap(), 1.0);
    assert_eq!(y.get_path_f64("right.pos").unwrap(), -1.0);
    assert_eq!(sys.y_at("left").unwrap().get_path_f64("vel").unwrap(), 0.5);
}

#[derive(Clone, Debug)]
struct Ticks {
    a: Tick,
    b: Tick,
    c: Tick,
}

impl Component for Ticks {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        vec![("a", &self.a), ("b", &self.b), ("c", &self.c)]
    }
}

#[test]
fn f_step_visits_every_child_after_a_true_result() {
    let mut sys = System::new(Ticks {
        a: Tick {
            reports_change: true,
        },
        b: Tick {
            reports_change: false,
        },
        c: Tick {
            reports_change: true,
        },
    })
    .unwrap();

    assert!(sys.update_step(Args::NONE).unwrap());
    assert!(sys.f_step(Args::NONE).unwrap());
    for path in ["a.count", "b.count", "c.count"] {
        assert_eq!(count_at(&sys, path), 2);
    }

    let mut quiet = System::new(rig()).unwrap();
    assert!(!quiet.f_step(Args::NONE).unwrap());
    assert!(!quiet.update_discrete(0.1, Args::NONE).unwrap());
}

#[derive(Clone, Debug)]
struct Silent;

impl Component for Silent {
    fn x0(&self) -> Option<StateVector> {
        Some(StateVector::flat(vec![1.0]))
    }
}

#[test]
fn stateful_leaf_without_f_ode_is_an_error() {
    let mut sys = System::new(Silent).unwrap();
    let err = sys.f_ode(Args::NONE).unwrap_err();
    assert!(matches!(err, SystemError::Unimplemented { op: "f_ode", .. }));
    assert!(err.to_string().contains("Silent"));
}

#[derive(Debug)]
struct Gravity(f64);

#[derive(Clone, Debug)]
struct Faller;

impl Component for Faller {
    fn x0(&self) -> Option<StateVector> {
        Some(StateVector::flat(vec![0.0]))
    }

    fn f_ode(&self, node: &mut NodeMut<'_>, args: Args<'_>) -> SystemResult<()> {
        let g = args.get::<Gravity>("Faller")?;
        node.xdot_mut()?[0] = -g.0;
        Ok(())
    }
}

#[test]
fn wrong_update_arguments_fail_loudly() {
    let mut sys = System::new(Faller).unwrap();

    let err = sys.f_ode(Args::new(&1.5_f64)).unwrap_err();
    assert!(matches!(
        err,
        SystemError::ArgsMismatch {
            component: "Faller",
            ..
        }
    ));
    assert!(sys.f_ode(Args::NONE).is_err());

    sys.f_ode(Args::new(&Gravity(9.81))).unwrap();
    assert_eq!(sys.xdot(), &[-9.81]);
}

#[derive(Clone, Debug)]
struct LeftOnly {
    rig: Rig,
}

impl Component for LeftOnly {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        self.rig.children()
    }

    fn y0(&self) -> Option<Value> {
        let left = fdm_system::derive_y(&self.rig.left)?;
        Some(Record::new().with("left", left).into())
    }
}

#[test]
fn explicit_output_hides_unnamed_children() {
    let mut sys = System::new(LeftOnly { rig: rig() }).unwrap();
    assert!(sys.node_mut("left").unwrap().has_y());
    assert!(!sys.node_mut("right").unwrap().has_y());

    // `right` has no output view, so its f_ode reports the missing trait.
    let err = sys.f_ode(Args::NONE).unwrap_err();
    assert_eq!(
        err,
        SystemError::FieldNotFound {
            path: "right.x".into()
        }
    );
}

#[test]
fn external_containers_override_derivation() {
    let x = StateVector::concat(vec![
        ("left".into(), StateVector::named(&[("pos", 7.0), ("vel", 1.0)])),
        ("right".into(), StateVector::named(&[("pos", 8.0), ("vel", 2.0)])),
    ]);
    let sys = System::build(
        &rig(),
        BuildInputs {
            x: Some(x),
            t: Some(3.0),
            ..BuildInputs::default()
        },
    )
    .unwrap();

    assert_eq!(sys.t(), 3.0);
    assert_eq!(sys.x(), &[7.0, 1.0, 8.0, 2.0]);
    assert_eq!(sys.xdot(), &[0.0; 4]);

    let bad = System::build(
        &rig(),
        BuildInputs {
            xdot: Some(StateVector::flat(vec![0.0; 3])),
            ..BuildInputs::default()
        },
    );
    assert!(matches!(bad, Err(SystemError::ShapeMismatch { .. })));
}

#[test]
fn reset_restores_initial_values_in_place() {
    let mut sys = System::new(rig()).unwrap();
    sys.set_t(4.0);
    sys.set_x(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    sys.f_ode(Args::NONE).unwrap();
    sys.f_step(Args::NONE).unwrap();
    assert_eq!(count_at(&sys, "tick.count"), 1);

    let before = sys.x().as_ptr();
    sys.reset().unwrap();
    assert_eq!(sys.x().as_ptr(), before);
    assert_eq!(sys.t(), 0.0);
    assert_eq!(sys.x(), &[0.0; 4]);
    assert_eq!(count_at(&sys, "tick.count"), 0);
    assert_eq!(sys.y().unwrap().get_path_f64("right.pos").unwrap(), 0.0);
}

#[test]
fn node_view_downcasts_component() {
    let mut sys = System::new(rig()).unwrap();
    let node = sys.node_mut("right").unwrap();
    assert_eq!(node.component::<Mass>().unwrap().m, 2.0);
    assert!(matches!(
        node.component::<Tick>(),
        Err(SystemError::ComponentType { .. })
    ));

    let mut root = sys.root_mut();
    assert_eq!(
        root.child_names().collect::<Vec<_>>(),
        vec!["left", "right", "tick"]
    );
    assert!(root.child_mut("tick").unwrap().has_s());
    assert!(root.child_mut("nope").is_err());
}

#[derive(Clone, Debug)]
struct Twins {
    a: Tick,
    b: Tick,
}

impl Component for Twins {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        vec![("same", &self.a), ("same", &self.b)]
    }
}

#[test]
fn duplicate_child_names_rejected() {
    let tick = Tick {
        reports_change: false,
    };
    let err = System::new(Twins {
        a: tick.clone(),
        b: tick,
    })
    .unwrap_err();
    assert!(matches!(err, SystemError::DuplicateChild { .. }));
}

#[derive(Clone, Debug)]
struct Seeded {
    gain: f64,
}

impl Component for Seeded {
    fn s0(&self) -> Option<Value> {
        Some(Record::new().with("gain", 0.0).into())
    }

    fn init(&self, node: &mut NodeMut<'_>) -> SystemResult<()> {
        node.s_mut()?.set_path_f64("gain", self.gain)
    }
}

#[test]
fn init_hook_runs_once_and_is_the_reset_baseline() {
    let mut sys = System::new(Seeded { gain: 2.5 }).unwrap();
    assert_eq!(sys.s().unwrap().get_path_f64("gain").unwrap(), 2.5);

    sys.s_mut().unwrap().set_path_f64("gain", 0.0).unwrap();
    sys.reset().unwrap();
    assert_eq!(sys.s().unwrap().get_path_f64("gain").unwrap(), 2.5);
}

/// Misbehaving leaf: grows its discrete state and swaps out its input.
#[derive(Clone, Debug)]
struct Sprawl {
    grow_in_init: bool,
}

impl Component for Sprawl {
    fn u0(&self) -> Option<Value> {
        Some(Record::new().with("cmd", 0.0).into())
    }

    fn s0(&self) -> Option<Value> {
        Some(Record::new().with("count", 0_i64).into())
    }

    fn init(&self, node: &mut NodeMut<'_>) -> SystemResult<()> {
        if self.grow_in_init {
            *node.s_mut()? = Value::Vector(vec![0.0; 3]);
        }
        Ok(())
    }

    fn f_step(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<bool> {
        *node.u_mut()? = Value::Scalar(1.0);
        Ok(false)
    }

    fn f_disc(&self, node: &mut NodeMut<'_>, _dt: f64, _args: Args<'_>) -> SystemResult<bool> {
        if let Value::Record(r) = node.s_mut()? {
            r.insert("extra", 1.0);
        }
        Ok(false)
    }
}

#[test]
fn hooks_cannot_change_container_shapes() {
    let mut sys = System::new(Sprawl {
        grow_in_init: false,
    })
    .unwrap();

    let err = sys.f_disc(0.1, Args::NONE).unwrap_err();
    match err {
        SystemError::ShapeMismatch { what, .. } => assert_eq!(what, "s container"),
        other => panic!("unexpected error: {other}"),
    }

    let mut sys = System::new(Sprawl {
        grow_in_init: false,
    })
    .unwrap();
    let err = sys.f_step(Args::NONE).unwrap_err();
    assert!(matches!(err, SystemError::ShapeMismatch { .. }), "{err}");

    let err = System::new(Sprawl { grow_in_init: true }).unwrap_err();
    assert!(matches!(err, SystemError::ShapeMismatch { .. }), "{err}");
}

#[test]
fn input_writes_keep_shape() {
    let mut sys = System::new(rig()).unwrap();
    sys.node_mut("left")
        .unwrap()
        .u_mut()
        .unwrap()
        .set_path_f64("force", 3.0)
        .unwrap();
    assert!(sys.check_shapes().is_ok());

    if let Some(Value::Record(u)) = sys.u_mut() {
        u.insert("thrust", 1.0);
    }
    assert!(matches!(
        sys.check_shapes(),
        Err(SystemError::ShapeMismatch { .. })
    ));
}

#[test]
fn non_finite_state_is_rejected() {
    let mut sys = System::new(rig()).unwrap();
    let err = sys.set_x(&[0.0, f64::NAN, 0.0, 0.0]).unwrap_err();
    assert!(matches!(
        err,
        SystemError::NonFinite {
            what: "system state",
            ..
        }
    ));
    assert_eq!(sys.x(), &[0.0; 4]);
    assert!(sys.set_x(&[f64::INFINITY, 0.0, 0.0, 0.0]).is_err());
}

#[derive(Clone, Debug)]
struct Bank {
    masses: Vec<(String, Mass)>,
}

impl Component for Bank {
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        self.masses
            .iter()
            .map(|(n, m)| (n.as_str(), m as &dyn Component))
            .collect()
    }
}

fn bank(n: usize) -> Bank {
    Bank {
        masses: (0..n)
            .map(|i| (format!("m{i}"), Mass { m: 1.0 + i as f64 }))
            .collect(),
    }
}

proptest! {
    #[test]
    fn shapes_survive_updates(n in 1_usize..6, values in prop::collection::vec(-1e3_f64..1e3, 12)) {
        let mut sys = System::new(bank(n)).unwrap();
        let y_before = sys.snapshot_y().unwrap();
        let x_ptr = sys.x().as_ptr();

        sys.set_x(&values[..2 * n]).unwrap();
        sys.f_ode(Args::NONE).unwrap();
        sys.f_step(Args::NONE).unwrap();

        prop_assert_eq!(sys.x().len(), 2 * n);
        prop_assert_eq!(sys.x().as_ptr(), x_ptr);
        prop_assert!(sys.y().unwrap().same_shape(&y_before));
        for i in 0..n {
            let pos = sys.y().unwrap().get_path_f64(&format!("m{i}.pos")).unwrap();
            prop_assert_eq!(pos, values[2 * i]);
        }
    }
}
