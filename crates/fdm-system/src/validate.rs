//! Structural checks run while a system tree is built.

use std::collections::HashSet;

use fdm_core::CoreError;

use crate::error::{SystemError, SystemResult};
use crate::layout::StateVector;
use crate::system::Node;

/// Child names of one component must be unique: they key every sub-view.
pub(crate) fn validate_children(path: &str, names: &[&str]) -> SystemResult<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for &name in names {
        if name.is_empty() || name.contains('.') {
            return Err(SystemError::shape(
                format!("child name under '{path}'"),
                "non-empty name without '.'",
                format!("'{name}'"),
            ));
        }
        if !seen.insert(name) {
            return Err(SystemError::DuplicateChild {
                path: path.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Ẋ must have exactly the layout of X, and cannot exist without it.
pub(crate) fn validate_state_pair(
    x: Option<&StateVector>,
    xdot: Option<&StateVector>,
) -> SystemResult<()> {
    match (x, xdot) {
        (Some(x), Some(xdot)) if x.layout() != xdot.layout() => Err(SystemError::shape(
            "state derivative layout",
            format!("{} entries matching x", x.len()),
            format!("{} entries", xdot.len()),
        )),
        (None, Some(xdot)) => Err(SystemError::shape(
            "state derivative without state",
            "absent",
            format!("{} entries", xdot.len()),
        )),
        _ => Ok(()),
    }
}

/// Every node's state range must lie inside its parent's, so that all views
/// alias the single root buffer.
pub(crate) fn validate_ranges(nodes: &[Node], x_len: usize) -> SystemResult<()> {
    for node in nodes {
        let Some(range) = &node.x else { continue };
        if range.end > x_len {
            return Err(CoreError::IndexOob {
                what: "node state range",
                index: range.end,
                len: x_len,
            }
            .into());
        }
        if let Some(parent) = node.parent {
            match &nodes[parent.index()].x {
                Some(p) if p.start <= range.start && range.end <= p.end => {}
                _ => {
                    return Err(CoreError::Invariant {
                        what: "child state range escapes parent range",
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StateLayout;

    #[test]
    fn duplicate_child_names_rejected() {
        assert!(validate_children("", &["a", "b"]).is_ok());
        let err = validate_children("root", &["a", "b", "a"]).unwrap_err();
        assert_eq!(
            err,
            SystemError::DuplicateChild {
                path: "root".into(),
                name: "a".into()
            }
        );
        assert!(validate_children("", &["a.b"]).is_err());
    }

    #[test]
    fn state_pair_layouts_must_match() {
        let x = StateVector::flat(vec![1.0, 2.0]);
        let good = StateVector::zeros(StateLayout::flat(2));
        let bad = StateVector::zeros(StateLayout::flat(3));
        assert!(validate_state_pair(Some(&x), Some(&good)).is_ok());
        assert!(validate_state_pair(Some(&x), Some(&bad)).is_err());
        assert!(validate_state_pair(None, Some(&good)).is_err());
        assert!(validate_state_pair(None, None).is_ok());
    }
}
