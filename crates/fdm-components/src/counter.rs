//! Discrete event counter.

use fdm_system::{Args, Component, NodeMut, Record, SystemError, SystemResult, Value};

/// Increments `s.count` on every discrete update and mirrors it in `y`.
///
/// Has no continuous state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counter {
    pub start: i64,
}

impl Component for Counter {
    fn y0(&self) -> Option<Value> {
        Some(Record::new().with("count", self.start).into())
    }

    fn s0(&self) -> Option<Value> {
        Some(Record::new().with("count", self.start).into())
    }

    fn f_ode(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<()> {
        let count = count_of(node.s()?)?;
        set_count(node.y_mut()?, count)
    }

    fn f_disc(&self, node: &mut NodeMut<'_>, _dt: f64, _args: Args<'_>) -> SystemResult<bool> {
        let s = node.s_mut()?;
        let count = count_of(s)?;
        set_count(s, count + 1)?;
        Ok(false)
    }
}

fn count_of(v: &Value) -> SystemResult<i64> {
    v.lookup("count")
        .and_then(Value::as_int)
        .ok_or_else(|| SystemError::FieldNotFound {
            path: "count".into(),
        })
}

fn set_count(v: &mut Value, count: i64) -> SystemResult<()> {
    v.lookup_mut("count")
        .ok_or_else(|| SystemError::FieldNotFound {
            path: "count".into(),
        })?
        .set_int(count)
}
