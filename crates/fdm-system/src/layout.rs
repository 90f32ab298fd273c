//! Continuous-state layout: one flat buffer, named contiguous sub-ranges.
//!
//! A composite's layout is the concatenation of its children's layouts, each
//! remembered as a block at a fixed offset. The flat buffer lives once at the
//! root of a system; every node addresses its share through an offset range
//! computed at build time.

use std::ops::Range;

use crate::error::{SystemError, SystemResult};

/// Shape of a flat continuous-state buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateLayout {
    len: usize,
    blocks: Vec<StateBlock>,
}

/// A named sub-range of a parent layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateBlock {
    pub name: String,
    pub offset: usize,
    pub layout: StateLayout,
}

impl StateBlock {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.layout.len
    }
}

impl StateLayout {
    /// Unnamed flat layout of `len` entries.
    pub fn flat(len: usize) -> Self {
        Self {
            len,
            blocks: Vec::new(),
        }
    }

    /// Leaf layout with named fields of the given lengths, laid out in order.
    pub fn named(fields: &[(&str, usize)]) -> Self {
        Self::concat(
            fields
                .iter()
                .map(|(name, len)| (name.to_string(), StateLayout::flat(*len))),
        )
    }

    /// Concatenate child layouts, recording each child's offset.
    pub fn concat(children: impl IntoIterator<Item = (String, StateLayout)>) -> Self {
        let mut offset = 0;
        let mut blocks = Vec::new();
        for (name, layout) in children {
            let len = layout.len;
            blocks.push(StateBlock {
                name,
                offset,
                layout,
            });
            offset += len;
        }
        Self {
            len: offset,
            blocks,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn blocks(&self) -> &[StateBlock] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&StateBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Range of a dotted block path relative to the start of this layout.
    pub fn range_of(&self, dotted: &str) -> Option<Range<usize>> {
        let mut start = 0;
        let mut cur = self;
        for name in dotted.split('.') {
            let block = cur.block(name)?;
            start += block.offset;
            cur = &block.layout;
        }
        Some(start..start + cur.len)
    }
}

/// A continuous-state container: layout plus initial values.
#[derive(Clone, Debug, PartialEq)]
pub struct StateVector {
    layout: StateLayout,
    data: Vec<f64>,
}

impl StateVector {
    pub fn new(layout: StateLayout, data: Vec<f64>) -> SystemResult<Self> {
        if layout.len() != data.len() {
            return Err(SystemError::shape(
                "state vector",
                format!("{} entries", layout.len()),
                format!("{} entries", data.len()),
            ));
        }
        Ok(Self { layout, data })
    }

    /// Unnamed state.
    pub fn flat(data: Vec<f64>) -> Self {
        Self {
            layout: StateLayout::flat(data.len()),
            data,
        }
    }

    /// Named scalar states, e.g. `[("pos", 1.0), ("vel", 0.0)]`.
    pub fn named(fields: &[(&str, f64)]) -> Self {
        let layout = StateLayout::named(
            &fields.iter().map(|(n, _)| (*n, 1)).collect::<Vec<_>>(),
        );
        Self {
            layout,
            data: fields.iter().map(|(_, v)| *v).collect(),
        }
    }

    pub fn zeros(layout: StateLayout) -> Self {
        let data = vec![0.0; layout.len()];
        Self { layout, data }
    }

    /// Concatenate named child state vectors into one buffer.
    pub fn concat(children: Vec<(String, StateVector)>) -> Self {
        let mut data = Vec::with_capacity(children.iter().map(|(_, c)| c.len()).sum());
        let mut layouts = Vec::with_capacity(children.len());
        for (name, child) in children {
            data.extend_from_slice(&child.data);
            layouts.push((name, child.layout));
        }
        Self {
            layout: StateLayout::concat(layouts),
            data,
        }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (StateLayout, Vec<f64>) {
        (self.layout, self.data)
    }
}
