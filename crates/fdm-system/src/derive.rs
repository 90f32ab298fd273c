//! Trait-container derivation from a component tree.
//!
//! Each function walks the component description only; no system is built.
//! Two components with the same shape always derive identically-shaped
//! containers. Absence propagates: a subtree contributing nothing for a
//! trait yields `None`, never an empty container.

use crate::component::Component;
use crate::layout::StateVector;
use crate::value::{Record, Value};

/// The five per-node trait categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraitKind {
    /// Continuous-state derivative (Ẋ).
    XDot,
    /// Continuous state (X).
    X,
    /// Output (Y).
    Y,
    /// Control input (U).
    U,
    /// Discrete state (S).
    S,
}

/// A derived container of either flavor.
#[derive(Clone, Debug, PartialEq)]
pub enum TraitContainer {
    State(StateVector),
    Value(Value),
}

/// Derive the container for `kind`, or `None` if the trait is absent.
pub fn build_trait(kind: TraitKind, component: &dyn Component) -> Option<TraitContainer> {
    match kind {
        TraitKind::XDot => derive_xdot(component).map(TraitContainer::State),
        TraitKind::X => derive_x(component).map(TraitContainer::State),
        TraitKind::Y => derive_y(component).map(TraitContainer::Value),
        TraitKind::U => derive_u(component).map(TraitContainer::Value),
        TraitKind::S => derive_s(component).map(TraitContainer::Value),
    }
}

pub fn derive_x(component: &dyn Component) -> Option<StateVector> {
    if let Some(x) = component.x0() {
        return Some(x);
    }
    concat_children(component, derive_x)
}

pub fn derive_xdot(component: &dyn Component) -> Option<StateVector> {
    if let Some(xdot) = component.xdot0() {
        return Some(xdot);
    }
    if let Some(x) = component.x0() {
        let (layout, _) = x.into_parts();
        return Some(StateVector::zeros(layout));
    }
    concat_children(component, derive_xdot)
}

pub fn derive_y(component: &dyn Component) -> Option<Value> {
    component
        .y0()
        .or_else(|| aggregate_children(component, derive_y))
}

pub fn derive_u(component: &dyn Component) -> Option<Value> {
    component
        .u0()
        .or_else(|| aggregate_children(component, derive_u))
}

pub fn derive_s(component: &dyn Component) -> Option<Value> {
    component
        .s0()
        .or_else(|| aggregate_children(component, derive_s))
}

fn concat_children(
    component: &dyn Component,
    rule: fn(&dyn Component) -> Option<StateVector>,
) -> Option<StateVector> {
    let blocks: Vec<(String, StateVector)> = component
        .children()
        .into_iter()
        .filter_map(|(name, child)| rule(child).map(|x| (name.to_string(), x)))
        .collect();
    if blocks.is_empty() {
        None
    } else {
        Some(StateVector::concat(blocks))
    }
}

fn aggregate_children(
    component: &dyn Component,
    rule: fn(&dyn Component) -> Option<Value>,
) -> Option<Value> {
    let record: Record = component
        .children()
        .into_iter()
        .filter_map(|(name, child)| rule(child).map(|v| (name, v)))
        .collect();
    if record.is_empty() {
        None
    } else {
        Some(Value::Record(record))
    }
}
