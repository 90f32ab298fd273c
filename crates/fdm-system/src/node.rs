//! Mutable view of one node of a [`System`], handed to component hooks.

use std::any::type_name;
use std::sync::Arc;

use fdm_core::NodeId;

use crate::args::Args;
use crate::component::{Component, downcast};
use crate::error::{SystemError, SystemResult};
use crate::system::{System, resolve, resolve_mut};
use crate::value::Value;

/// A node's share of the root buffers, split for simultaneous borrowing.
///
/// Absent traits are `None`.
#[derive(Debug)]
pub struct Parts<'a> {
    pub t: f64,
    pub x: Option<&'a mut [f64]>,
    pub xdot: Option<&'a mut [f64]>,
    pub y: Option<&'a mut Value>,
    pub u: Option<&'a mut Value>,
    pub s: Option<&'a mut Value>,
    pub params: Option<&'a Value>,
}

/// Borrow of a system positioned at one node.
///
/// All accessors address the node's own sub-view of the root containers. The
/// `f_*` methods dispatch to this node's component; the `f_*_children`
/// methods are the composite fallbacks that recurse in declaration order.
pub struct NodeMut<'a> {
    sys: &'a mut System,
    id: NodeId,
}

impl<'a> NodeMut<'a> {
    pub(crate) fn new(sys: &'a mut System, id: NodeId) -> Self {
        Self { sys, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.sys.nodes[self.id.index()].name
    }

    pub fn path(&self) -> &str {
        &self.sys.nodes[self.id.index()].path
    }

    /// Shared simulation time.
    pub fn t(&self) -> f64 {
        self.sys.t
    }

    pub fn params(&self) -> Option<&Value> {
        self.sys.nodes[self.id.index()].params.as_ref()
    }

    /// The component this node was built from, as its concrete type.
    pub fn component<C: Component>(&self) -> SystemResult<&C> {
        let component = self.sys.nodes[self.id.index()].component.as_ref();
        downcast::<C>(component).ok_or(SystemError::ComponentType {
            expected: type_name::<C>(),
            found: component.type_name(),
        })
    }

    pub fn has_x(&self) -> bool {
        self.sys.nodes[self.id.index()].x.is_some()
    }

    pub fn has_y(&self) -> bool {
        self.sys.nodes[self.id.index()].y.is_some()
    }

    pub fn has_u(&self) -> bool {
        self.sys.nodes[self.id.index()].u.is_some()
    }

    pub fn has_s(&self) -> bool {
        self.sys.nodes[self.id.index()].s.is_some()
    }

    /// Error for a trait this node does not carry.
    pub fn absent(&self, what: &str) -> SystemError {
        let path = self.path();
        SystemError::FieldNotFound {
            path: if path.is_empty() {
                what.to_string()
            } else {
                format!("{path}.{what}")
            },
        }
    }

    pub fn x(&self) -> SystemResult<&[f64]> {
        match &self.sys.nodes[self.id.index()].x {
            Some(r) => Ok(&self.sys.x[r.clone()]),
            None => Err(self.absent("x")),
        }
    }

    pub fn x_mut(&mut self) -> SystemResult<&mut [f64]> {
        match self.sys.nodes[self.id.index()].x.clone() {
            Some(r) => Ok(&mut self.sys.x[r]),
            None => Err(self.absent("x")),
        }
    }

    pub fn xdot(&self) -> SystemResult<&[f64]> {
        match &self.sys.nodes[self.id.index()].x {
            Some(r) => Ok(&self.sys.xdot[r.clone()]),
            None => Err(self.absent("xdot")),
        }
    }

    pub fn xdot_mut(&mut self) -> SystemResult<&mut [f64]> {
        match self.sys.nodes[self.id.index()].x.clone() {
            Some(r) => Ok(&mut self.sys.xdot[r]),
            None => Err(self.absent("xdot")),
        }
    }

    /// State and derivative together, for `f_ode` bodies.
    pub fn state_mut(&mut self) -> SystemResult<(&[f64], &mut [f64])> {
        match self.sys.nodes[self.id.index()].x.clone() {
            Some(r) => Ok((&self.sys.x[r.clone()], &mut self.sys.xdot[r])),
            None => Err(self.absent("x")),
        }
    }

    pub fn y(&self) -> SystemResult<&Value> {
        let node = &self.sys.nodes[self.id.index()];
        resolve(self.sys.y.as_ref(), node.y.as_deref()).ok_or_else(|| self.absent("y"))
    }

    pub fn y_mut(&mut self) -> SystemResult<&mut Value> {
        if !self.has_y() {
            return Err(self.absent("y"));
        }
        let System { nodes, y, .. } = &mut *self.sys;
        resolve_mut(y.as_mut(), nodes[self.id.index()].y.as_deref()).ok_or(SystemError::Core(
            fdm_core::CoreError::Invariant {
                what: "output view does not resolve",
            },
        ))
    }

    pub fn u(&self) -> SystemResult<&Value> {
        let node = &self.sys.nodes[self.id.index()];
        resolve(self.sys.u.as_ref(), node.u.as_deref()).ok_or_else(|| self.absent("u"))
    }

    pub fn u_mut(&mut self) -> SystemResult<&mut Value> {
        if !self.has_u() {
            return Err(self.absent("u"));
        }
        let System { nodes, u, .. } = &mut *self.sys;
        resolve_mut(u.as_mut(), nodes[self.id.index()].u.as_deref()).ok_or(SystemError::Core(
            fdm_core::CoreError::Invariant {
                what: "input view does not resolve",
            },
        ))
    }

    pub fn s(&self) -> SystemResult<&Value> {
        let node = &self.sys.nodes[self.id.index()];
        resolve(self.sys.s.as_ref(), node.s.as_deref()).ok_or_else(|| self.absent("s"))
    }

    pub fn s_mut(&mut self) -> SystemResult<&mut Value> {
        if !self.has_s() {
            return Err(self.absent("s"));
        }
        let System { nodes, s, .. } = &mut *self.sys;
        resolve_mut(s.as_mut(), nodes[self.id.index()].s.as_deref()).ok_or(SystemError::Core(
            fdm_core::CoreError::Invariant {
                what: "discrete state view does not resolve",
            },
        ))
    }

    /// Every view of this node at once.
    pub fn parts_mut(&mut self) -> Parts<'_> {
        let System {
            nodes,
            t,
            x,
            xdot,
            y,
            u,
            s,
            ..
        } = &mut *self.sys;
        let node = &nodes[self.id.index()];
        let (x, xdot) = match node.x.clone() {
            Some(r) => (Some(&mut x[r.clone()]), Some(&mut xdot[r])),
            None => (None, None),
        };
        Parts {
            t: *t,
            x,
            xdot,
            y: resolve_mut(y.as_mut(), node.y.as_deref()),
            u: resolve_mut(u.as_mut(), node.u.as_deref()),
            s: resolve_mut(s.as_mut(), node.s.as_deref()),
            params: node.params.as_ref(),
        }
    }

    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        let nodes = &self.sys.nodes;
        nodes[self.id.index()]
            .children
            .iter()
            .map(move |c| nodes[c.index()].name.as_str())
    }

    /// View of the direct child called `name`.
    pub fn child_mut(&mut self, name: &str) -> SystemResult<NodeMut<'_>> {
        let nodes = &self.sys.nodes;
        let id = nodes[self.id.index()]
            .children
            .iter()
            .copied()
            .find(|c| nodes[c.index()].name == name)
            .ok_or_else(|| self.absent(name))?;
        Ok(NodeMut::new(self.sys, id))
    }

    /// View of a descendant by dotted path relative to this node.
    pub fn node_mut(&mut self, path: &str) -> SystemResult<NodeMut<'_>> {
        let mut id = self.id;
        for name in path.split('.').filter(|s| !s.is_empty()) {
            let nodes = &self.sys.nodes;
            id = nodes[id.index()]
                .children
                .iter()
                .copied()
                .find(|c| nodes[c.index()].name == name)
                .ok_or_else(|| self.absent(path))?;
        }
        Ok(NodeMut::new(self.sys, id))
    }

    /// Reborrow, for passing the view down without giving it up.
    pub fn reborrow(&mut self) -> NodeMut<'_> {
        NodeMut::new(self.sys, self.id)
    }

    fn component_arc(&self) -> Arc<dyn Component> {
        Arc::clone(&self.sys.nodes[self.id.index()].component)
    }

    fn unimplemented(&self, op: &'static str) -> SystemError {
        SystemError::Unimplemented {
            component: self.sys.nodes[self.id.index()].component.type_name(),
            path: self.path().to_string(),
            op,
        }
    }

    fn child_at(&self, k: usize) -> Option<NodeId> {
        self.sys.nodes[self.id.index()].children.get(k).copied()
    }

    /// Run this node's `f_ode`.
    pub fn f_ode(&mut self, args: Args<'_>) -> SystemResult<()> {
        self.component_arc().f_ode(self, args)
    }

    /// Run this node's `f_step`.
    pub fn f_step(&mut self, args: Args<'_>) -> SystemResult<bool> {
        self.component_arc().f_step(self, args)
    }

    /// Run this node's `f_disc`.
    pub fn f_disc(&mut self, dt: f64, args: Args<'_>) -> SystemResult<bool> {
        self.component_arc().f_disc(self, dt, args)
    }

    /// Composite `f_ode`: evaluate every child in order.
    ///
    /// A childless node with continuous state has no derivative to offer, so
    /// it is an error rather than a silent no-op.
    pub fn f_ode_children(&mut self, args: Args<'_>) -> SystemResult<()> {
        if self.child_at(0).is_none() && self.has_x() {
            return Err(self.unimplemented("f_ode"));
        }
        let mut k = 0;
        while let Some(child) = self.child_at(k) {
            NodeMut::new(self.sys, child).f_ode(args)?;
            k += 1;
        }
        Ok(())
    }

    /// Composite `f_step`: every child runs; the results are OR-ed.
    pub fn f_step_children(&mut self, args: Args<'_>) -> SystemResult<bool> {
        let mut modified = false;
        let mut k = 0;
        while let Some(child) = self.child_at(k) {
            modified |= NodeMut::new(self.sys, child).f_step(args)?;
            k += 1;
        }
        Ok(modified)
    }

    /// Composite `f_disc`: every child runs; the results are OR-ed.
    pub fn f_disc_children(&mut self, dt: f64, args: Args<'_>) -> SystemResult<bool> {
        let mut modified = false;
        let mut k = 0;
        while let Some(child) = self.child_at(k) {
            modified |= NodeMut::new(self.sys, child).f_disc(dt, args)?;
            k += 1;
        }
        Ok(modified)
    }
}

impl std::fmt::Debug for NodeMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMut")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}
