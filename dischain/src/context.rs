//! The mutable state threaded through one chain run.

use std::collections::BTreeMap;

use crate::chain::{SlotId, SubrangeLength};
use crate::error::{BoundsError, ChainIntegrityError, StackKind};
use crate::tree::{NodeId, Span};
use crate::tvb::Tvb;

#[derive(Debug)]
struct SavedBuffer<'p> {
    offset: usize,
    tvb: Tvb<'p>,
}

#[derive(Debug)]
struct SavedTree {
    start: usize,
    previous: NodeId,
    root: NodeId,
}

/// Pending override for a `CallNextDissector`, set by `SetNextDissector`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NextDissector {
    pub protocol: Option<String>,
    pub length: Option<SubrangeLength>,
}

/// Active buffer, active tree node and cursor, plus the stacks that undo buffer and tree swaps.
///
/// A context without a tree (`tree() == None`) stays that way for the whole run, and tree pushes
/// and pops on it do nothing.
#[derive(Debug)]
pub(crate) struct ExecutionContext<'p> {
    tvb: Tvb<'p>,
    tree: Option<NodeId>,
    offset: usize,
    saved_buffers: Vec<SavedBuffer<'p>>,
    saved_trees: Vec<SavedTree>,
    items: Vec<Option<NodeId>>,
    next: BTreeMap<SlotId, NextDissector>,
}

impl<'p> ExecutionContext<'p> {
    pub(crate) fn new(tvb: Tvb<'p>, offset: usize, tree: Option<NodeId>, nr_items: usize) -> Self {
        Self {
            tvb,
            tree,
            offset,
            saved_buffers: Vec::new(),
            saved_trees: Vec::new(),
            items: vec![None; nr_items],
            next: BTreeMap::new(),
        }
    }

    pub fn tvb(&self) -> &Tvb<'p> {
        &self.tvb
    }

    pub fn tree(&self) -> Option<NodeId> {
        self.tree
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of sub-buffers and sub-trees currently pushed.
    pub fn depth(&self) -> (usize, usize) {
        (self.saved_buffers.len(), self.saved_trees.len())
    }

    /// Span of `length` bytes at the cursor, in source coordinates.
    pub(crate) fn span(&self, length: usize) -> Span {
        Span {
            source: self.tvb.source(),
            start: self.tvb.start() + self.offset,
            length,
        }
    }

    pub(crate) fn advance(&mut self, by: usize) -> Result<(), BoundsError> {
        self.offset = self.offset.checked_add(by).ok_or(BoundsError {
            offset: self.offset,
            length: by,
            available: self.tvb.len(),
        })?;
        Ok(())
    }

    pub(crate) fn push_buffer(&mut self, tvb: Tvb<'p>) {
        let saved = std::mem::replace(&mut self.tvb, tvb);
        self.saved_buffers.push(SavedBuffer {
            offset: self.offset,
            tvb: saved,
        });
        self.offset = 0;
    }

    /// Restores the buffer and offset active before the matching push.
    pub(crate) fn pop_buffer(&mut self, index: usize) -> Result<(), ChainIntegrityError> {
        let saved = self
            .saved_buffers
            .pop()
            .ok_or(ChainIntegrityError::UnmatchedPop {
                kind: StackKind::Buffer,
                index,
            })?;
        self.tvb = saved.tvb;
        self.offset = saved.offset;
        Ok(())
    }

    pub(crate) fn push_tree(&mut self, root: NodeId) {
        if let Some(previous) = self.tree {
            self.saved_trees.push(SavedTree {
                start: self.offset,
                previous,
                root,
            });
            self.tree = Some(root);
        }
    }

    /// Restores the node active before the matching push. Returns the subtree root along with the
    /// number of bytes the cursor moved while it was active. The cursor is left where it is.
    pub(crate) fn pop_tree(
        &mut self,
        index: usize,
    ) -> Result<Option<(NodeId, usize)>, ChainIntegrityError> {
        if self.tree.is_none() {
            return Ok(None);
        }
        let saved = self
            .saved_trees
            .pop()
            .ok_or(ChainIntegrityError::UnmatchedPop {
                kind: StackKind::Tree,
                index,
            })?;
        self.tree = Some(saved.previous);
        Ok(Some((saved.root, self.offset.saturating_sub(saved.start))))
    }

    pub(crate) fn record_item(&mut self, index: usize, node: NodeId) {
        if let Some(slot) = self.items.get_mut(index) {
            *slot = Some(node);
        }
    }

    /// The item produced by the instruction at `index`, if it ran with a tree attached.
    pub fn item(&self, index: usize) -> Option<NodeId> {
        self.items.get(index).copied().flatten()
    }

    pub(crate) fn override_next(
        &mut self,
        slot: SlotId,
        protocol: Option<String>,
        length: Option<SubrangeLength>,
    ) {
        let next = self.next.entry(slot).or_default();
        if protocol.is_some() {
            next.protocol = protocol;
        }
        if length.is_some() {
            next.length = length;
        }
    }

    /// Takes the override for the slot, leaving the slot back at its defaults.
    pub(crate) fn take_next(&mut self, slot: SlotId) -> NextDissector {
        self.next.remove(&slot).unwrap_or_default()
    }
}
