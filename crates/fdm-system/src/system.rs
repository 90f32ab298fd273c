//! The runtime system tree.
//!
//! A [`System`] is an arena of nodes laid out in preorder (root first). The
//! root owns every buffer: the flat continuous state `x` and its derivative
//! `ẋ`, and the `y`/`u`/`s` value trees. A node never owns data; it holds
//! - an offset range into `x`/`ẋ`, or `None` when it has no continuous state,
//! - an index path into each of the `y`/`u`/`s` trees, or `None` when the
//!   trait is absent for it.
//!
//! Writing through a leaf's view is therefore immediately visible at the root
//! and vice versa, and an aggregate `y` needs no reassembly after its
//! children update.

use std::ops::Range;
use std::sync::Arc;

use fdm_core::NodeId;
use tracing::debug;

use crate::args::Args;
use crate::component::Component;
use crate::derive::{derive_s, derive_u, derive_x, derive_xdot, derive_y};
use crate::error::{SystemError, SystemResult};
use crate::layout::{StateLayout, StateVector};
use crate::node::NodeMut;
use crate::validate;
use crate::value::Value;

/// One arena slot.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) component: Arc<dyn Component>,
    pub(crate) x: Option<Range<usize>>,
    pub(crate) y: Option<Vec<usize>>,
    pub(crate) u: Option<Vec<usize>>,
    pub(crate) s: Option<Vec<usize>>,
    pub(crate) params: Option<Value>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path from the root; empty for the root itself.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn component(&self) -> &dyn Component {
        self.component.as_ref()
    }

    pub fn state_range(&self) -> Option<Range<usize>> {
        self.x.clone()
    }

    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }
}

/// Externally supplied containers for [`System::build`].
///
/// Any field left `None` is derived from the component.
#[derive(Clone, Debug, Default)]
pub struct BuildInputs {
    pub xdot: Option<StateVector>,
    pub x: Option<StateVector>,
    pub y: Option<Value>,
    pub u: Option<Value>,
    pub s: Option<Value>,
    pub t: Option<f64>,
}

#[derive(Clone, Debug)]
struct Snapshot {
    t: f64,
    x: Vec<f64>,
    xdot: Vec<f64>,
    y: Option<Value>,
    u: Option<Value>,
    s: Option<Value>,
}

/// A built component tree with its live state.
#[derive(Clone, Debug)]
pub struct System {
    pub(crate) nodes: Vec<Node>,
    pub(crate) t: f64,
    pub(crate) x: Vec<f64>,
    pub(crate) xdot: Vec<f64>,
    pub(crate) x_layout: Option<StateLayout>,
    pub(crate) y: Option<Value>,
    pub(crate) u: Option<Value>,
    pub(crate) s: Option<Value>,
    initial: Snapshot,
}

impl System {
    /// Build a system with every container derived from `component`.
    pub fn new<C: Component>(component: C) -> SystemResult<Self> {
        Self::build(&component, BuildInputs::default())
    }

    /// Build a system, using any containers supplied in `inputs` in place of
    /// derived ones.
    pub fn build(component: &dyn Component, inputs: BuildInputs) -> SystemResult<Self> {
        let xdot = match (&inputs.x, inputs.xdot) {
            (_, Some(xdot)) => Some(xdot),
            (Some(x), None) => Some(StateVector::zeros(x.layout().clone())),
            (None, None) => derive_xdot(component),
        };
        let x = inputs.x.or_else(|| derive_x(component));
        validate::validate_state_pair(x.as_ref(), xdot.as_ref())?;

        let y = inputs.y.or_else(|| derive_y(component));
        let u = inputs.u.or_else(|| derive_u(component));
        let s = inputs.s.or_else(|| derive_s(component));

        let (x_layout, x) = match x {
            Some(sv) => {
                let (layout, data) = sv.into_parts();
                (Some(layout), data)
            }
            None => (None, Vec::new()),
        };
        let xdot = xdot.map(|sv| sv.into_parts().1).unwrap_or_default();

        let mut builder = TreeBuilder {
            nodes: Vec::new(),
            y: y.as_ref(),
            u: u.as_ref(),
            s: s.as_ref(),
        };
        let root_state = x_layout.as_ref().map(|l| (0..l.len(), l));
        builder.visit(
            component,
            "root",
            None,
            root_state,
            y.as_ref().map(|_| Vec::new()),
            u.as_ref().map(|_| Vec::new()),
            s.as_ref().map(|_| Vec::new()),
        )?;
        let nodes = builder.nodes;
        validate::validate_ranges(&nodes, x.len())?;

        let t = inputs.t.unwrap_or(0.0);
        let mut sys = System {
            nodes,
            t,
            x,
            xdot,
            x_layout,
            y,
            u,
            s,
            initial: Snapshot {
                t,
                x: Vec::new(),
                xdot: Vec::new(),
                y: None,
                u: None,
                s: None,
            },
        };

        // Preorder is top-down. `init` may set values but not shapes.
        sys.initial = sys.capture();
        for index in 0..sys.nodes.len() {
            let id = node_id(index)?;
            let component = Arc::clone(&sys.nodes[index].component);
            component.init(&mut NodeMut::new(&mut sys, id))?;
        }
        sys.check_shapes()?;
        sys.initial = sys.capture();

        debug!(
            nodes = sys.nodes.len(),
            x_len = sys.x.len(),
            has_y = sys.y.is_some(),
            has_u = sys.u.is_some(),
            has_s = sys.s.is_some(),
            "built system"
        );
        Ok(sys)
    }

    fn capture(&self) -> Snapshot {
        Snapshot {
            t: self.t,
            x: self.x.clone(),
            xdot: self.xdot.clone(),
            y: self.y.clone(),
            u: self.u.clone(),
            s: self.s.clone(),
        }
    }

    /// Restore the values captured right after construction (and `init`).
    ///
    /// Shapes are untouched; nothing is reallocated.
    pub fn reset(&mut self) -> SystemResult<()> {
        self.t = self.initial.t;
        self.x.copy_from_slice(&self.initial.x);
        self.xdot.copy_from_slice(&self.initial.xdot);
        assign_opt(&mut self.y, &self.initial.y)?;
        assign_opt(&mut self.u, &self.initial.u)?;
        assign_opt(&mut self.s, &self.initial.s)?;
        Ok(())
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn set_t(&mut self, t: f64) {
        self.t = t;
    }

    pub fn has_x(&self) -> bool {
        self.x_layout.is_some()
    }

    /// Root continuous state; empty when the system has none.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn x_mut(&mut self) -> &mut [f64] {
        &mut self.x
    }

    pub fn xdot(&self) -> &[f64] {
        &self.xdot
    }

    pub fn x_layout(&self) -> Option<&StateLayout> {
        self.x_layout.as_ref()
    }

    /// Overwrite the whole continuous state in place.
    ///
    /// Rejects a state of the wrong length or with a NaN/infinite entry.
    pub fn set_x(&mut self, x: &[f64]) -> SystemResult<()> {
        if x.len() != self.x.len() {
            return Err(SystemError::shape(
                "system state",
                format!("{} entries", self.x.len()),
                format!("{} entries", x.len()),
            ));
        }
        if let Some(&value) = x.iter().find(|v| !v.is_finite()) {
            return Err(SystemError::NonFinite {
                what: "system state",
                value,
            });
        }
        self.x.copy_from_slice(x);
        Ok(())
    }

    pub fn y(&self) -> Option<&Value> {
        self.y.as_ref()
    }

    pub fn u(&self) -> Option<&Value> {
        self.u.as_ref()
    }

    pub fn u_mut(&mut self) -> Option<&mut Value> {
        self.u.as_mut()
    }

    pub fn s(&self) -> Option<&Value> {
        self.s.as_ref()
    }

    pub fn s_mut(&mut self) -> Option<&mut Value> {
        self.s.as_mut()
    }

    /// Deep copy of the root output, for logging.
    pub fn snapshot_y(&self) -> Option<Value> {
        self.y.clone()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// All node paths in preorder.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.path.as_str())
    }

    /// Find a node by dotted path (`""` is the root).
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.path == path)
            .and_then(NodeId::from_index)
    }

    /// Output of the node at `path`.
    pub fn y_at(&self, path: &str) -> Option<&Value> {
        let node = self.node(self.find(path)?)?;
        resolve(self.y.as_ref(), node.y.as_deref())
    }

    /// Continuous state of the node at `path`.
    pub fn x_at(&self, path: &str) -> Option<&[f64]> {
        let node = self.node(self.find(path)?)?;
        node.x.clone().map(|r| &self.x[r])
    }

    pub fn root_mut(&mut self) -> NodeMut<'_> {
        NodeMut::new(self, NodeId::ROOT)
    }

    /// Mutable view of the node at a dotted path.
    pub fn node_mut(&mut self, path: &str) -> SystemResult<NodeMut<'_>> {
        let id = self.find(path).ok_or_else(|| SystemError::FieldNotFound {
            path: path.to_string(),
        })?;
        Ok(NodeMut::new(self, id))
    }

    /// Fail if `y`, `u` or `s` no longer has the shape it was built with.
    ///
    /// Hooks and input mappings get plain `&mut Value` access, so a record
    /// field could be inserted or a value replaced wholesale; the protocol
    /// entry points below check after every call.
    pub fn check_shapes(&self) -> SystemResult<()> {
        check_shape("y", self.y.as_ref(), self.initial.y.as_ref())?;
        check_shape("u", self.u.as_ref(), self.initial.u.as_ref())?;
        check_shape("s", self.s.as_ref(), self.initial.s.as_ref())
    }

    /// Continuous evaluation of the whole tree.
    pub fn f_ode(&mut self, args: Args<'_>) -> SystemResult<()> {
        self.root_mut().f_ode(args)?;
        self.check_shapes()
    }

    /// Post-step correction of the whole tree; `true` if `x` changed.
    pub fn f_step(&mut self, args: Args<'_>) -> SystemResult<bool> {
        let modified = self.root_mut().f_step(args)?;
        self.check_shapes()?;
        Ok(modified)
    }

    /// Discrete update of the whole tree with period `dt`.
    pub fn f_disc(&mut self, dt: f64, args: Args<'_>) -> SystemResult<bool> {
        let modified = self.root_mut().f_disc(dt, args)?;
        self.check_shapes()?;
        Ok(modified)
    }

    pub fn update_continuous(&mut self, args: Args<'_>) -> SystemResult<()> {
        self.f_ode(args)
    }

    pub fn update_step(&mut self, args: Args<'_>) -> SystemResult<bool> {
        self.f_step(args)
    }

    pub fn update_discrete(&mut self, dt: f64, args: Args<'_>) -> SystemResult<bool> {
        self.f_disc(dt, args)
    }
}

pub(crate) fn node_id(index: usize) -> SystemResult<NodeId> {
    NodeId::from_index(index).ok_or_else(|| {
        fdm_core::CoreError::IndexOob {
            what: "system node",
            index,
            len: u32::MAX as usize,
        }
        .into()
    })
}

pub(crate) fn resolve<'a>(root: Option<&'a Value>, path: Option<&[usize]>) -> Option<&'a Value> {
    match (root, path) {
        (Some(v), Some(p)) => v.resolve(p),
        _ => None,
    }
}

pub(crate) fn resolve_mut<'a>(
    root: Option<&'a mut Value>,
    path: Option<&[usize]>,
) -> Option<&'a mut Value> {
    match (root, path) {
        (Some(v), Some(p)) => v.resolve_mut(p),
        _ => None,
    }
}

fn check_shape(what: &str, live: Option<&Value>, built: Option<&Value>) -> SystemResult<()> {
    match (live, built) {
        (Some(live), Some(built)) if !live.same_shape(built) => Err(SystemError::shape(
            format!("{what} container"),
            built.kind_name(),
            live.kind_name(),
        )),
        _ => Ok(()),
    }
}

fn assign_opt(dst: &mut Option<Value>, src: &Option<Value>) -> SystemResult<()> {
    if let (Some(d), Some(s)) = (dst.as_mut(), src.as_ref()) {
        d.assign_from(s)?;
    }
    Ok(())
}

/// Preorder walk assigning arena slots and container views.
struct TreeBuilder<'a> {
    nodes: Vec<Node>,
    y: Option<&'a Value>,
    u: Option<&'a Value>,
    s: Option<&'a Value>,
}

impl TreeBuilder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        component: &dyn Component,
        name: &str,
        parent: Option<NodeId>,
        state: Option<(Range<usize>, &StateLayout)>,
        y: Option<Vec<usize>>,
        u: Option<Vec<usize>>,
        s: Option<Vec<usize>>,
    ) -> SystemResult<NodeId> {
        let index = self.nodes.len();
        let id = node_id(index)?;
        let path = match parent {
            None => String::new(),
            Some(p) if self.nodes[p.index()].path.is_empty() => name.to_string(),
            Some(p) => format!("{}.{}", self.nodes[p.index()].path, name),
        };

        let children = component.children();
        let names: Vec<&str> = children.iter().map(|(n, _)| *n).collect();
        validate::validate_children(&path, &names)?;

        self.nodes.push(Node {
            name: name.to_string(),
            path,
            parent,
            children: Vec::with_capacity(children.len()),
            component: Arc::from(dyn_clone::clone_box(component)),
            x: state.as_ref().map(|(r, _)| r.clone()),
            y: y.clone(),
            u: u.clone(),
            s: s.clone(),
            params: component.params(),
        });

        for (child_name, child) in children {
            let child_state = state.as_ref().and_then(|(range, layout)| {
                layout.block(child_name).map(|b| {
                    let start = range.start + b.offset;
                    (start..start + b.layout.len(), &b.layout)
                })
            });
            let child_y = sub_path(self.y, y.as_deref(), child_name);
            let child_u = sub_path(self.u, u.as_deref(), child_name);
            let child_s = sub_path(self.s, s.as_deref(), child_name);
            let child_id =
                self.visit(child, child_name, Some(id), child_state, child_y, child_u, child_s)?;
            self.nodes[index].children.push(child_id);
        }
        Ok(id)
    }
}

/// Index path of field `name` under the value at `parent`, if it exists.
fn sub_path(root: Option<&Value>, parent: Option<&[usize]>, name: &str) -> Option<Vec<usize>> {
    let record = resolve(root, parent)?.as_record()?;
    let i = record.index_of(name)?;
    let mut path = parent?.to_vec();
    path.push(i);
    Some(path)
}
