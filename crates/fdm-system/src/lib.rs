//! fdm-system: hierarchical system trees built from component descriptions.
//!
//! A [`Component`] declares a node's static configuration and its children.
//! From it the five trait containers (Ẋ, X, Y, U, S) are derived, and a
//! [`System`] is built: one flat state buffer and one value tree per trait at
//! the root, with every node addressing its own sub-view. The update protocol
//! (`f_ode`, `f_step`, `f_disc`) then walks the tree through [`NodeMut`].
//!
//! # Example
//!
//! ```
//! use fdm_system::{Args, Component, NodeMut, Record, StateVector, System, SystemResult, Value};
//!
//! #[derive(Clone, Debug)]
//! struct Decay {
//!     rate: f64,
//! }
//!
//! impl Component for Decay {
//!     fn x0(&self) -> Option<StateVector> {
//!         Some(StateVector::flat(vec![1.0]))
//!     }
//!     fn y0(&self) -> Option<Value> {
//!         Some(Record::new().with("level", 1.0).into())
//!     }
//!     fn f_ode(&self, node: &mut NodeMut<'_>, _args: Args<'_>) -> SystemResult<()> {
//!         let (x, xdot) = node.state_mut()?;
//!         xdot[0] = -self.rate * x[0];
//!         let level = x[0];
//!         node.y_mut()?.set_path_f64("level", level)
//!     }
//! }
//!
//! let mut sys = System::new(Decay { rate: 2.0 }).unwrap();
//! sys.f_ode(Args::NONE).unwrap();
//! assert_eq!(sys.xdot(), &[-2.0]);
//! ```

pub mod args;
pub mod component;
pub mod derive;
pub mod error;
pub mod layout;
pub mod node;
pub mod system;
mod validate;
pub mod value;

pub use args::Args;
pub use component::{AsAny, Component, downcast};
pub use derive::{
    TraitContainer, TraitKind, build_trait, derive_s, derive_u, derive_x, derive_xdot, derive_y,
};
pub use error::{SystemError, SystemResult};
pub use layout::{StateBlock, StateLayout, StateVector};
pub use node::{NodeMut, Parts};
pub use system::{BuildInputs, Node, System};
pub use value::{Record, Value};
