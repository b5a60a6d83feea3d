//! **dischain** runs precompiled packet dissection chains. A chain is a flat list of
//! [`Instruction`]s which adds fields to a protocol tree, moves a cursor through the packet, swaps
//! in decoded sub-buffers, writes summary columns and hands byte ranges to other chains. The
//! chains themselves are produced elsewhere; this crate only registers and executes them.
//!
//! * [Getting started](#getting-started)
//! * [Chains](#chains)
//!     * [Cursor movement](#cursor-movement)
//!     * [Subtrees and sub-buffers](#subtrees-and-sub-buffers)
//!     * [Delegation](#delegation)
//! * [Errors](#errors)
//! * [Configuration](#configuration)
//!
//! # Getting started
//!
//! Fields and subtrees are registered first, then every chain is loaded in one go, and the
//! resulting [`Registry`] is handed to an [`Engine`].
//!
//! ```rust
//! use dischain::{ChainBuilder, Encoding, Engine, FieldInfo, FieldType, FieldValue, Registry};
//!
//! let mut builder = Registry::builder();
//! let src = builder.field(FieldInfo::new("Source Port", "udp.srcport", FieldType::Uint16));
//! let dst = builder.field(FieldInfo::new("Destination Port", "udp.dstport", FieldType::Uint16));
//!
//! let mut udp = ChainBuilder::new();
//! udp.add_field(src, 2, Encoding::BIG_ENDIAN);
//! udp.advance(2);
//! udp.add_field(dst, 2, Encoding::BIG_ENDIAN);
//! udp.advance(2);
//!
//! builder.register_dissectors([("udp", udp.build())])?;
//! let engine = Engine::new(builder.build()?);
//!
//! let out = engine.dissect_packet("udp", &[0x30, 0x39, 0x00, 0x35]);
//! assert_eq!(out.consumed, 4);
//! let ports: Vec<_> = out
//!     .tree
//!     .walk()
//!     .into_iter()
//!     .map(|(_, id)| out.tree[id].value().cloned())
//!     .collect();
//! assert_eq!(ports, vec![Some(FieldValue::Uint(12345)), Some(FieldValue::Uint(53))]);
//! # Ok::<(), dischain::RegistryError>(())
//! ```
//!
//! Registration happens once. A second call to
//! [`register_dissectors`](RegistryBuilder::register_dissectors) fails, and so does a batch which
//! names the same protocol twice.
//!
//! # Chains
//!
//! Every chain run owns an execution context: the active buffer, the tree node new items are
//! added under, and an offset into the buffer. Field and text items are added at the offset but
//! do **not** move it.
//!
//! ## Cursor movement
//!
//! [`Instruction::AdvanceOffset`] moves the cursor, either by a fixed amount or by a length read
//! from the packet.
//!
//! Mode                                | Moves by
//! ------------------------------------|------------------------------------------------
//! [`AdvanceMode::None`]               | `length`
//! [`AdvanceMode::ReadLength`]         | the decoded value
//! [`AdvanceMode::ReadLengthIncluding`]| the decoded value, which covers the length field
//! [`AdvanceMode::ReadLengthExcluding`]| the decoded value plus `length`
//!
//! Lengths are decoded with [`decode_unsigned`], which only understands widths of 1 to 4 bytes and
//! reads anything else as 0.
//!
//! ## Subtrees and sub-buffers
//!
//! `PushTree` makes an earlier item the parent of everything added until the matching `PopTree`,
//! which then stretches the item over every byte the cursor moved in between. `PushBuffer` swaps in
//! a buffer carried by the chain and resets the offset to 0; `PopBuffer` brings back the previous
//! buffer and offset. Pushed buffers are listed in [`PacketInfo::data_sources`], and items inside
//! them carry the matching [`SourceId`].
//!
//! Pushes and pops have to nest. [`RegistryBuilder::build`] refuses chains where they don't.
//!
//! ## Delegation
//!
//! `CallNextDissector` runs another chain over a slice of the active buffer starting at the
//! cursor, under the active tree node. A preceding `SetNextDissector` on the same [`SlotId`] can
//! override the protocol or the slice length for that one call.
//!
//! If the protocol is not registered the range is shown as opaque data and a single "protocol not
//! found" expert info is added. Nesting deeper than
//! [`max_call_depth`](EngineConfig::max_call_depth) is refused the same way.
//!
//! # Errors
//!
//! Nothing that happens while dissecting is returned as an error. A read past the end of the
//! buffer ([`BoundsError`]) ends the chain that made it, adds a malformed expert info, and leaves
//! everything dissected so far in place; the calling chain carries on. [`Engine::dissect`] always
//! reports every byte from the starting offset as consumed.
//!
//! # Configuration
//!
//! [`EngineConfig`] can be loaded from TOML.
//!
//! ```rust
//! let config = dischain::EngineConfig::from_toml_str("max_call_depth = 8")?;
//! assert_eq!(config.max_call_depth, 8);
//! assert!(config.validate_chains);
//! # Ok::<(), dischain::ConfigError>(())
//! ```
//!
//! The crate logs through the [`log`] facade and never installs a logger itself.

mod chain;
mod config;
mod context;
mod engine;
mod error;
mod fields;
mod packet;
mod registry;
mod tree;
mod tvb;

pub use chain::{
    AdvanceMode, Chain, ChainBuilder, Instruction, ItemRef, LengthSource, SlotId, SubrangeLength,
};
pub use config::EngineConfig;
pub use engine::{Dissection, Engine};
pub use error::{
    BoundsError, ChainIntegrityError, ConfigError, DissectError, RegistryError, StackKind,
};
pub use fields::{FieldDisplay, FieldId, FieldInfo, FieldTable, FieldType, SubtreeId, SubtreeTable};
pub use packet::{Column, DataSource, ExpertGroup, ExpertInfo, PacketInfo, Severity};
pub use registry::{Dissector, ProtocolId, Registry, RegistryBuilder};
pub use tree::{FieldValue, ItemKind, NodeId, ProtoNode, ProtoTree};
pub use tvb::{decode_unsigned, message_length, Encoding, SourceId, Tvb};
