//! The `Component` trait: static description of one node of a system tree.

use std::any::Any;
use std::fmt;

use dyn_clone::DynClone;

use crate::args::Args;
use crate::error::SystemResult;
use crate::layout::StateVector;
use crate::node::NodeMut;
use crate::value::Value;

/// Upcast helper so `dyn Component` can be downcast to its concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Immutable description of a system node and, recursively, its children.
///
/// A component declares its shape in two ways:
/// - composites list their children in [`Component::children`] and inherit
///   the derived trait containers (concatenated X, aggregated Y/U/S);
/// - leaves return explicit containers from `x0`/`y0`/`u0`/`s0`.
///
/// An explicit container always wins over derivation. A child whose name has
/// no entry in its parent's container sees that trait as absent.
///
/// The update methods receive a [`NodeMut`] view of the live system. Their
/// defaults recurse into the children; a leaf with continuous state must
/// override [`Component::f_ode`] or the first evaluation fails with
/// [`SystemError::Unimplemented`](crate::SystemError::Unimplemented).
pub trait Component: AsAny + DynClone + fmt::Debug + Send + Sync {
    /// Child components in declaration order.
    fn children(&self) -> Vec<(&str, &dyn Component)> {
        Vec::new()
    }

    /// Explicit continuous state. `None` derives it from the children.
    fn x0(&self) -> Option<StateVector> {
        None
    }

    /// Explicit state derivative. `None` uses zeros shaped like `x0`, or the
    /// children's derivatives for composites.
    fn xdot0(&self) -> Option<StateVector> {
        None
    }

    /// Explicit output.
    fn y0(&self) -> Option<Value> {
        None
    }

    /// Explicit control input.
    fn u0(&self) -> Option<Value> {
        None
    }

    /// Explicit discrete state.
    fn s0(&self) -> Option<Value> {
        None
    }

    /// Snapshot of the non-child configuration, for display and logging.
    fn params(&self) -> Option<Value> {
        None
    }

    /// One-time setup after the whole tree is wired.
    fn init(&self, _node: &mut NodeMut<'_>) -> SystemResult<()> {
        Ok(())
    }

    /// Continuous dynamics: compute `ẋ` and `y` from `x`, `u`, `t`.
    ///
    /// Called several times per integration step at trial points; must not
    /// touch anything but `ẋ` and `y`.
    fn f_ode(&self, node: &mut NodeMut<'_>, args: Args<'_>) -> SystemResult<()> {
        node.f_ode_children(args)
    }

    /// Post-step correction. Returns `true` if `x` was modified.
    fn f_step(&self, node: &mut NodeMut<'_>, args: Args<'_>) -> SystemResult<bool> {
        node.f_step_children(args)
    }

    /// Periodic discrete update with period `dt`. Returns `true` if `x` was
    /// modified.
    fn f_disc(&self, node: &mut NodeMut<'_>, dt: f64, args: Args<'_>) -> SystemResult<bool> {
        node.f_disc_children(dt, args)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

dyn_clone::clone_trait_object!(Component);

/// Downcast a component to its concrete type.
pub fn downcast<C: Component>(component: &dyn Component) -> Option<&C> {
    component.as_any().downcast_ref::<C>()
}
