//! The output tree: an arena of labelled byte spans.

use std::fmt::{self, Write as _};
use std::ops::Index;

use crate::fields::{FieldDisplay, FieldId, FieldInfo, FieldType, SubtreeId};
use crate::packet::Severity;
use crate::tvb::SourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// The decoded value of a field item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    None,
    Uint(u32),
    Bytes(Vec<u8>),
    String(String),
}

impl FieldValue {
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            FieldValue::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Root,
    Field { field: FieldId, value: FieldValue },
    /// An item whose label was supplied by the chain instead of decoded.
    Text { field: FieldId },
    /// Bytes nobody dissected.
    Data,
    Expert { severity: Severity },
}

#[derive(Debug, Clone)]
pub struct ProtoNode {
    pub kind: ItemKind,
    pub label: String,
    pub source: SourceId,
    pub start: usize,
    pub length: usize,
    /// Set once the node has been used as the root of a pushed subtree.
    pub subtree: Option<SubtreeId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ProtoNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn value(&self) -> Option<&FieldValue> {
        match &self.kind {
            ItemKind::Field { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<FieldId> {
        match &self.kind {
            ItemKind::Field { field, .. } | ItemKind::Text { field } => Some(*field),
            _ => None,
        }
    }

    /// The half-open span `[start, start + length)` in source coordinates.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.length
    }
}

/// Location of a new item, shared by everything the interpreter adds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub source: SourceId,
    pub start: usize,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct ProtoTree {
    nodes: Vec<ProtoNode>,
}

impl Default for ProtoTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtoTree {
    pub fn new() -> Self {
        let root = ProtoNode {
            kind: ItemKind::Root,
            label: String::new(),
            source: SourceId::Frame,
            start: 0,
            length: 0,
            subtree: None,
            parent: None,
            children: Vec::new(),
        };
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&ProtoNode> {
        self.nodes.get(id.0)
    }

    /// Number of items, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add(
        &mut self,
        parent: NodeId,
        kind: ItemKind,
        label: String,
        span: Span,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ProtoNode {
            kind,
            label,
            source: span.source,
            start: span.start,
            length: span.length,
            subtree: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub(crate) fn set_subtree(&mut self, id: NodeId, subtree: SubtreeId) {
        self.nodes[id.0].subtree = Some(subtree);
    }

    pub(crate) fn set_len(&mut self, id: NodeId, length: usize) {
        self.nodes[id.0].length = length;
    }

    /// All nodes in depth first order, paired with their depth below the root.
    pub fn walk(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<(usize, NodeId)> = self.nodes[0]
            .children
            .iter()
            .rev()
            .map(|id| (0, *id))
            .collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            stack.extend(self.nodes[id.0].children.iter().rev().map(|c| (depth + 1, *c)));
        }
        out
    }

    /// Every item of the given field, in tree order.
    pub fn items_of(&self, field: FieldId) -> Vec<&ProtoNode> {
        self.walk()
            .into_iter()
            .map(|(_, id)| &self[id])
            .filter(|node| node.field() == Some(field))
            .collect()
    }
}

impl Index<NodeId> for ProtoTree {
    type Output = ProtoNode;

    fn index(&self, id: NodeId) -> &ProtoNode {
        &self.nodes[id.0]
    }
}

impl fmt::Display for ProtoTree {
    /// One line per item, indented by depth.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, id) in self.walk() {
            writeln!(f, "{:indent$}{}", "", self[id].label, indent = depth * 4)?;
        }
        Ok(())
    }
}

/// Builds the "Name: value" label for a field item.
pub(crate) fn field_label(info: &FieldInfo, value: &FieldValue) -> String {
    let mut label = info.name.clone();
    match value {
        FieldValue::None => {}
        FieldValue::Uint(v) => {
            let _ = match info.display {
                FieldDisplay::Dec => write!(label, ": {v}"),
                FieldDisplay::Hex => write!(label, ": {}", hex_uint(*v, info.ftype)),
                FieldDisplay::DecHex => {
                    write!(label, ": {v} ({})", hex_uint(*v, info.ftype))
                }
            };
        }
        FieldValue::Bytes(bytes) => {
            label.push_str(": ");
            let hex: Vec<_> = bytes.iter().map(|b| format!("{b:02x}")).collect();
            label.push_str(&hex.join(":"));
        }
        FieldValue::String(s) => {
            let _ = write!(label, ": {s}");
        }
    }
    label
}

fn hex_uint(v: u32, ftype: FieldType) -> String {
    let width = match ftype {
        FieldType::Uint8 => 2,
        FieldType::Uint16 => 4,
        FieldType::Uint24 => 6,
        _ => 8,
    };
    format!("0x{v:0width$x}")
}
