//! The instruction set, compiled chains, and the static checks run over them at registration.

use crate::error::{ChainIntegrityError, StackKind};
use crate::fields::{FieldId, FieldTable, SubtreeId, SubtreeTable};
use crate::packet::Column;
use crate::tvb::Encoding;

/// Index of an instruction inside its chain. Used to name the tree item an `AddField` or `AddText`
/// produced, so a later `PushTree` can hang a subtree off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemRef(pub usize);

/// Names a next-dissector override slot. Slots live for one chain run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u16);

/// How `AdvanceOffset` moves the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceMode {
    /// Skip `length` bytes.
    None,
    /// Skip by the value of the `length` byte field at the cursor.
    ReadLength,
    /// Skip by the value of the field at the cursor, which counts its own bytes.
    ReadLengthIncluding,
    /// Skip the field at the cursor, then the number of bytes it holds.
    ReadLengthExcluding,
}

/// Size of the range handed to a delegated dissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubrangeLength {
    /// Up to the end of the active buffer.
    Remaining,
    Fixed(usize),
}

/// Where a `SetNextDissector` takes its length from. Decoded lengths are read when the
/// instruction runs, at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthSource {
    Remaining,
    Fixed(usize),
    Decoded { length: usize, encoding: Encoding },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    AddField {
        field: FieldId,
        length: usize,
        encoding: Encoding,
    },
    AddText {
        field: FieldId,
        length: usize,
        text: String,
    },
    PushTree {
        item: ItemRef,
        subtree: SubtreeId,
    },
    PopTree,
    PushBuffer {
        name: String,
        data: Vec<u8>,
    },
    PopBuffer,
    AdvanceOffset {
        length: usize,
        encoding: Encoding,
        mode: AdvanceMode,
    },
    SetColumnText {
        column: Column,
        text: String,
    },
    SetNextDissector {
        slot: SlotId,
        protocol: Option<String>,
        length: Option<LengthSource>,
    },
    CallNextDissector {
        slot: SlotId,
        default_protocol: String,
        default_length: SubrangeLength,
    },
}

impl Instruction {
    /// Whether running the instruction adds an item which a `PushTree` may refer to.
    pub fn produces_item(&self) -> bool {
        matches!(self, Instruction::AddField { .. } | Instruction::AddText { .. })
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::AddField { .. } => "add_field",
            Instruction::AddText { .. } => "add_text",
            Instruction::PushTree { .. } => "push_tree",
            Instruction::PopTree => "pop_tree",
            Instruction::PushBuffer { .. } => "push_buffer",
            Instruction::PopBuffer => "pop_buffer",
            Instruction::AdvanceOffset { .. } => "advance_offset",
            Instruction::SetColumnText { .. } => "set_column_text",
            Instruction::SetNextDissector { .. } => "set_next_dissector",
            Instruction::CallNextDissector { .. } => "call_next_dissector",
        }
    }
}

/// A straight-line program for one protocol. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    instructions: Vec<Instruction>,
}

impl From<Vec<Instruction>> for Chain {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }
}

impl FromIterator<Instruction> for Chain {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

impl Chain {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Checks that pushes and pops pair up and nest, that subtree roots refer to earlier items,
    /// and that every field and subtree id is registered.
    pub fn validate(
        &self,
        fields: &FieldTable,
        subtrees: &SubtreeTable,
    ) -> Result<(), ChainIntegrityError> {
        let mut open: Vec<(StackKind, usize)> = Vec::new();

        for (index, instruction) in self.instructions.iter().enumerate() {
            match instruction {
                Instruction::AddField { field, .. } | Instruction::AddText { field, .. } => {
                    if fields.get(*field).is_none() {
                        return Err(ChainIntegrityError::UnknownField {
                            index,
                            field: field.index(),
                        });
                    }
                }
                Instruction::PushTree { item, subtree } => {
                    let refers_back = item.0 < index
                        && self.instructions[item.0].produces_item();
                    if !refers_back {
                        return Err(ChainIntegrityError::BadItemRef {
                            index,
                            item: item.0,
                        });
                    }
                    if subtrees.name(*subtree).is_none() {
                        return Err(ChainIntegrityError::UnknownSubtree {
                            index,
                            subtree: subtree.index(),
                        });
                    }
                    open.push((StackKind::Tree, index));
                }
                Instruction::PushBuffer { .. } => open.push((StackKind::Buffer, index)),
                Instruction::PopTree => close(&mut open, StackKind::Tree, index)?,
                Instruction::PopBuffer => close(&mut open, StackKind::Buffer, index)?,
                _ => {}
            }
        }

        match open.pop() {
            Some((kind, index)) => Err(ChainIntegrityError::UnclosedPush { kind, index }),
            None => Ok(()),
        }
    }

    /// Instructions which decode a length of a size other than 1 to 4 bytes, and will therefore
    /// always read zero.
    pub fn zero_length_decodes(&self) -> impl Iterator<Item = usize> + '_ {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| match instruction {
                Instruction::AdvanceOffset { length, mode, .. } => {
                    *mode != AdvanceMode::None && !(1..=4).contains(length)
                }
                Instruction::SetNextDissector {
                    length: Some(LengthSource::Decoded { length, .. }),
                    ..
                } => !(1..=4).contains(length),
                _ => false,
            })
            .map(|(index, _)| index)
    }

    /// Every protocol name this chain may delegate to.
    pub fn delegation_targets(&self) -> impl Iterator<Item = &str> + '_ {
        self.instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::CallNextDissector {
                    default_protocol, ..
                } => Some(default_protocol.as_str()),
                Instruction::SetNextDissector {
                    protocol: Some(protocol),
                    ..
                } => Some(protocol.as_str()),
                _ => None,
            })
    }
}

fn close(
    open: &mut Vec<(StackKind, usize)>,
    kind: StackKind,
    index: usize,
) -> Result<(), ChainIntegrityError> {
    match open.pop() {
        None => Err(ChainIntegrityError::UnmatchedPop { kind, index }),
        Some((top, pushed_at)) if top != kind => Err(ChainIntegrityError::CrossedPush {
            kind,
            index,
            open: top,
            pushed_at,
        }),
        Some(_) => Ok(()),
    }
}

/// Assembles a [`Chain`] one instruction at a time.
///
/// ```
/// use dischain::{ChainBuilder, Encoding, FieldId};
/// # fn chain(hdr: FieldId, len: FieldId, hdr_tree: dischain::SubtreeId) -> dischain::Chain {
/// let mut b = ChainBuilder::new();
/// let header = b.add_text(hdr, 4, "Header");
/// b.push_tree(header, hdr_tree)
///     .add_field(len, 2, Encoding::BIG_ENDIAN);
/// b.advance(2).pop_tree();
/// b.build()
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ChainBuilder {
    instructions: Vec<Instruction>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruction(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    fn next_ref(&self) -> ItemRef {
        ItemRef(self.instructions.len())
    }

    /// Adds a field item at the cursor. Returns a reference usable as a subtree root.
    pub fn add_field(&mut self, field: FieldId, length: usize, encoding: Encoding) -> ItemRef {
        let item = self.next_ref();
        self.instruction(Instruction::AddField {
            field,
            length,
            encoding,
        });
        item
    }

    /// Adds a literal text item at the cursor. Returns a reference usable as a subtree root.
    pub fn add_text(&mut self, field: FieldId, length: usize, text: &str) -> ItemRef {
        let item = self.next_ref();
        self.instruction(Instruction::AddText {
            field,
            length,
            text: text.to_string(),
        });
        item
    }

    pub fn push_tree(&mut self, item: ItemRef, subtree: SubtreeId) -> &mut Self {
        self.instruction(Instruction::PushTree { item, subtree })
    }

    pub fn pop_tree(&mut self) -> &mut Self {
        self.instruction(Instruction::PopTree)
    }

    pub fn push_buffer(&mut self, name: &str, data: impl Into<Vec<u8>>) -> &mut Self {
        self.instruction(Instruction::PushBuffer {
            name: name.to_string(),
            data: data.into(),
        })
    }

    pub fn pop_buffer(&mut self) -> &mut Self {
        self.instruction(Instruction::PopBuffer)
    }

    pub fn advance(&mut self, length: usize) -> &mut Self {
        self.instruction(Instruction::AdvanceOffset {
            length,
            encoding: Encoding::NA,
            mode: AdvanceMode::None,
        })
    }

    pub fn advance_by_length(
        &mut self,
        length: usize,
        encoding: Encoding,
        mode: AdvanceMode,
    ) -> &mut Self {
        self.instruction(Instruction::AdvanceOffset {
            length,
            encoding,
            mode,
        })
    }

    pub fn set_column(&mut self, column: Column, text: &str) -> &mut Self {
        self.instruction(Instruction::SetColumnText {
            column,
            text: text.to_string(),
        })
    }

    pub fn set_next_dissector(
        &mut self,
        slot: SlotId,
        protocol: Option<&str>,
        length: Option<LengthSource>,
    ) -> &mut Self {
        self.instruction(Instruction::SetNextDissector {
            slot,
            protocol: protocol.map(str::to_string),
            length,
        })
    }

    pub fn call_next_dissector(
        &mut self,
        slot: SlotId,
        default_protocol: &str,
        default_length: SubrangeLength,
    ) -> &mut Self {
        self.instruction(Instruction::CallNextDissector {
            slot,
            default_protocol: default_protocol.to_string(),
            default_length,
        })
    }

    pub fn build(&mut self) -> Chain {
        Chain::from(std::mem::take(&mut self.instructions))
    }
}
