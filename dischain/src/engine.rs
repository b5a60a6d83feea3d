//! The chain interpreter.

use std::sync::Arc;

use log::{debug, error, trace, warn};

use crate::chain::{AdvanceMode, Instruction, LengthSource, SubrangeLength};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{BoundsError, ChainIntegrityError, DissectError, RegistryError};
use crate::fields::{FieldInfo, FieldType};
use crate::packet::{ExpertGroup, ExpertInfo, PacketInfo, Severity};
use crate::registry::{Dissector, Registry, RegistryBuilder};
use crate::tree::{field_label, FieldValue, ItemKind, NodeId, ProtoTree, Span};
use crate::tvb::{Encoding, Tvb};

/// Output of [`Engine::dissect_packet`].
#[derive(Debug, Clone)]
pub struct Dissection {
    pub tree: ProtoTree,
    pub info: PacketInfo,
    pub consumed: usize,
}

/// Where a chain run writes. The tree is optional; the packet info is not.
struct Sink<'o> {
    tree: Option<&'o mut ProtoTree>,
    pinfo: &'o mut PacketInfo,
}

/// Runs registered chains against packets. Holds no per-packet state, so one engine may serve
/// many threads.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Registry,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Registry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Freezes the builder, validating chains unless the config says otherwise.
    pub fn build(builder: RegistryBuilder, config: EngineConfig) -> Result<Self, RegistryError> {
        let registry = if config.validate_chains {
            builder.build()?
        } else {
            builder.build_unvalidated()
        };
        Ok(Self::with_config(registry, config))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dissects `bytes` as `protocol`, starting at `starting_offset`.
    ///
    /// Items are added under the root of `tree`; pass `None` for a pass which only fills in
    /// `pinfo`. Problems with the packet or the chain end up as expert infos, never as an error,
    /// and the returned count is always every byte from `starting_offset` on.
    pub fn dissect(
        &self,
        protocol: &str,
        bytes: &[u8],
        starting_offset: usize,
        tree: Option<&mut ProtoTree>,
        pinfo: &mut PacketInfo,
    ) -> usize {
        let parent = tree.as_deref().map(ProtoTree::root);
        let mut sink = Sink { tree, pinfo };
        self.dispatch(
            protocol,
            Tvb::new(bytes),
            starting_offset,
            parent,
            &mut sink,
            0,
        );
        bytes.len().saturating_sub(starting_offset)
    }

    /// Dissects a whole packet into a fresh tree.
    pub fn dissect_packet(&self, protocol: &str, bytes: &[u8]) -> Dissection {
        let mut tree = ProtoTree::new();
        let mut info = PacketInfo::new();
        let consumed = self.dissect(protocol, bytes, 0, Some(&mut tree), &mut info);
        Dissection {
            tree,
            info,
            consumed,
        }
    }

    fn dispatch(
        &self,
        protocol: &str,
        tvb: Tvb<'_>,
        offset: usize,
        parent: Option<NodeId>,
        sink: &mut Sink<'_>,
        depth: usize,
    ) {
        match self.registry.find(protocol) {
            Some(dissector) => self.run(dissector, tvb, offset, parent, sink, depth),
            None => self.not_found(protocol, &tvb, offset, parent, sink),
        }
    }

    fn run(
        &self,
        dissector: &Dissector,
        tvb: Tvb<'_>,
        offset: usize,
        parent: Option<NodeId>,
        sink: &mut Sink<'_>,
        depth: usize,
    ) {
        let name = dissector.name();
        let chain = dissector.chain();
        debug!(
            "{name}: dissecting {} bytes from offset {offset} at depth {depth}",
            tvb.len()
        );

        let mut ctx = ExecutionContext::new(tvb, offset, parent, chain.len());
        for (index, instruction) in chain.instructions().iter().enumerate() {
            trace!(
                "{name}: [{index}] {} at offset {}",
                instruction.mnemonic(),
                ctx.offset()
            );
            if let Err(err) = self.step(index, instruction, &mut ctx, sink, depth) {
                self.malformed(name, index, &err, &ctx, sink);
                return;
            }
        }

        let (buffers, trees) = ctx.depth();
        if buffers + trees > 0 {
            warn!("{name}: chain ended with {buffers} buffers and {trees} trees still pushed");
        }
    }

    fn step(
        &self,
        index: usize,
        instruction: &Instruction,
        ctx: &mut ExecutionContext<'_>,
        sink: &mut Sink<'_>,
        depth: usize,
    ) -> Result<(), DissectError> {
        match instruction {
            Instruction::AddField {
                field,
                length,
                encoding,
            } => {
                ctx.tvb().ensure(ctx.offset(), *length)?;
                if let (Some(tree), Some(parent)) = (sink.tree.as_deref_mut(), ctx.tree()) {
                    let info = self.registry.fields().get(*field).ok_or(
                        ChainIntegrityError::UnknownField {
                            index,
                            field: field.index(),
                        },
                    )?;
                    let value = decode_value(info, ctx.tvb(), ctx.offset(), *length, *encoding)?;
                    let label = field_label(info, &value);
                    let kind = ItemKind::Field {
                        field: *field,
                        value,
                    };
                    let node = tree.add(parent, kind, label, ctx.span(*length));
                    ctx.record_item(index, node);
                }
            }
            Instruction::AddText {
                field,
                length,
                text,
            } => {
                ctx.tvb().ensure(ctx.offset(), *length)?;
                if let (Some(tree), Some(parent)) = (sink.tree.as_deref_mut(), ctx.tree()) {
                    let kind = ItemKind::Text { field: *field };
                    let node = tree.add(parent, kind, text.clone(), ctx.span(*length));
                    ctx.record_item(index, node);
                }
            }
            Instruction::PushTree { item, subtree } => {
                if let (Some(tree), Some(_)) = (sink.tree.as_deref_mut(), ctx.tree()) {
                    let root = ctx.item(item.0).ok_or(ChainIntegrityError::MissingItem {
                        index,
                        item: item.0,
                    })?;
                    tree.set_subtree(root, *subtree);
                    ctx.push_tree(root);
                }
            }
            Instruction::PopTree => {
                if let Some((root, length)) = ctx.pop_tree(index)? {
                    if let Some(tree) = sink.tree.as_deref_mut() {
                        tree.set_len(root, length);
                    }
                }
            }
            Instruction::PushBuffer { name, data } => {
                let data: Arc<[u8]> = Arc::from(data.as_slice());
                debug!("pushing buffer {name:?} of {} bytes", data.len());
                let source = sink.pinfo.add_data_source(name, Arc::clone(&data));
                ctx.push_buffer(Tvb::owned(data, source));
            }
            Instruction::PopBuffer => ctx.pop_buffer(index)?,
            Instruction::AdvanceOffset {
                length,
                encoding,
                mode,
            } => {
                let by = match mode {
                    AdvanceMode::None => *length,
                    AdvanceMode::ReadLength | AdvanceMode::ReadLengthIncluding => {
                        read_length(ctx, *length, *encoding)?
                    }
                    AdvanceMode::ReadLengthExcluding => {
                        read_length(ctx, *length, *encoding)?.saturating_add(*length)
                    }
                };
                ctx.advance(by)?;
            }
            Instruction::SetColumnText { column, text } => {
                sink.pinfo.set_column(*column, text.as_str());
            }
            Instruction::SetNextDissector {
                slot,
                protocol,
                length,
            } => {
                let length = match length {
                    None => None,
                    Some(LengthSource::Remaining) => Some(SubrangeLength::Remaining),
                    Some(LengthSource::Fixed(n)) => Some(SubrangeLength::Fixed(*n)),
                    Some(LengthSource::Decoded { length, encoding }) => Some(
                        SubrangeLength::Fixed(read_length(ctx, *length, *encoding)?),
                    ),
                };
                ctx.override_next(*slot, protocol.clone(), length);
            }
            Instruction::CallNextDissector {
                slot,
                default_protocol,
                default_length,
            } => {
                let next = ctx.take_next(*slot);
                let protocol = next
                    .protocol
                    .as_deref()
                    .unwrap_or(default_protocol.as_str());
                let offset = ctx.offset();
                let length = match next.length.unwrap_or(*default_length) {
                    SubrangeLength::Remaining => ctx.tvb().remaining(offset)?,
                    SubrangeLength::Fixed(n) => n,
                };
                let subset = ctx.tvb().subset(offset, length)?;
                self.delegate(protocol, subset, ctx.tree(), sink, depth);
            }
        }
        Ok(())
    }

    fn delegate(
        &self,
        protocol: &str,
        tvb: Tvb<'_>,
        parent: Option<NodeId>,
        sink: &mut Sink<'_>,
        depth: usize,
    ) {
        if depth >= self.config.max_call_depth {
            let limit = self.config.max_call_depth;
            warn!("not calling {protocol:?}: call depth limit of {limit} reached");
            self.opaque_data(&tvb, 0, parent, sink);
            annotate(
                sink,
                parent,
                span_of(&tvb, 0, tvb.len()),
                Severity::Error,
                ExpertGroup::Protocol,
                format!("call depth limit of {limit} reached, {protocol} not called"),
            );
            return;
        }
        debug!("delegating {} bytes to {protocol:?}", tvb.len());
        self.dispatch(protocol, tvb, 0, parent, sink, depth + 1);
    }

    fn not_found(
        &self,
        protocol: &str,
        tvb: &Tvb<'_>,
        offset: usize,
        parent: Option<NodeId>,
        sink: &mut Sink<'_>,
    ) {
        warn!("protocol {protocol:?} not found");
        self.opaque_data(tvb, offset, parent, sink);
        let start = offset.min(tvb.len());
        annotate(
            sink,
            parent,
            span_of(tvb, start, tvb.len() - start),
            Severity::Warning,
            ExpertGroup::Undecoded,
            format!("protocol {protocol} not found"),
        );
    }

    /// Covers the rest of the buffer with a "Data" item.
    fn opaque_data(
        &self,
        tvb: &Tvb<'_>,
        offset: usize,
        parent: Option<NodeId>,
        sink: &mut Sink<'_>,
    ) {
        if !self.config.opaque_data_item {
            return;
        }
        let remaining = match tvb.remaining(offset) {
            Ok(n) if n > 0 => n,
            _ => return,
        };
        if let (Some(tree), Some(parent)) = (sink.tree.as_deref_mut(), parent) {
            let label = format!("Data ({remaining} bytes)");
            tree.add(
                parent,
                ItemKind::Data,
                label,
                span_of(tvb, offset, remaining),
            );
        }
    }

    fn malformed(
        &self,
        protocol: &str,
        index: usize,
        err: &DissectError,
        ctx: &ExecutionContext<'_>,
        sink: &mut Sink<'_>,
    ) {
        match err {
            DissectError::Bounds(_) => debug!("{protocol}: aborted at instruction {index}: {err}"),
            DissectError::Integrity(_) => {
                error!("{protocol}: broken chain at instruction {index}: {err}")
            }
        }
        let offset = ctx.offset().min(ctx.tvb().len());
        annotate(
            sink,
            ctx.tree(),
            span_of(ctx.tvb(), offset, 0),
            Severity::Error,
            ExpertGroup::Malformed,
            format!("Malformed packet ({protocol}): {err}"),
        );
    }
}

fn read_length(
    ctx: &ExecutionContext<'_>,
    length: usize,
    encoding: Encoding,
) -> Result<usize, BoundsError> {
    Ok(ctx.tvb().decode_unsigned(ctx.offset(), length, encoding)? as usize)
}

fn decode_value(
    info: &FieldInfo,
    tvb: &Tvb<'_>,
    offset: usize,
    length: usize,
    encoding: Encoding,
) -> Result<FieldValue, BoundsError> {
    let value = match info.ftype {
        ftype if ftype.is_unsigned() => {
            FieldValue::Uint(tvb.decode_unsigned(offset, length, encoding)?)
        }
        FieldType::Bytes => FieldValue::Bytes(tvb.get_bytes(offset, length)?.to_vec()),
        FieldType::String => {
            let bytes = tvb.get_bytes(offset, length)?;
            let s = String::from_utf8_lossy(bytes);
            FieldValue::String(s.trim_end_matches('\0').to_string())
        }
        _ => FieldValue::None,
    };
    Ok(value)
}

fn span_of(tvb: &Tvb<'_>, offset: usize, length: usize) -> Span {
    Span {
        source: tvb.source(),
        start: tvb.start() + offset,
        length,
    }
}

fn annotate(
    sink: &mut Sink<'_>,
    parent: Option<NodeId>,
    span: Span,
    severity: Severity,
    group: ExpertGroup,
    message: String,
) {
    let item = match (sink.tree.as_deref_mut(), parent) {
        (Some(tree), Some(parent)) => {
            Some(tree.add(parent, ItemKind::Expert { severity }, message.clone(), span))
        }
        _ => None,
    };
    sink.pinfo.add_expert(ExpertInfo {
        severity,
        group,
        message,
        item,
    });
}

#[cfg(test)]
mod test_engine {
    use super::*;
    use crate::chain::{Chain, ChainBuilder, ItemRef, SlotId};
    use crate::fields::{FieldId, FieldInfo, SubtreeId};
    use crate::packet::Column;
    use crate::tvb::SourceId;

    struct Fixture {
        builder: RegistryBuilder,
        x: FieldId,
        y: FieldId,
        text: FieldId,
        ett: SubtreeId,
    }

    fn fixture() -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut builder = Registry::builder();
        let x = builder.field(FieldInfo::new("X", "t.x", FieldType::Uint32));
        let y = builder.field(FieldInfo::new("Y", "t.y", FieldType::Uint16));
        let text = builder.field(FieldInfo::new("Text", "t.text", FieldType::None));
        let ett = builder.subtree("t");
        Fixture {
            builder,
            x,
            y,
            text,
            ett,
        }
    }

    fn engine(mut builder: RegistryBuilder, chains: Vec<(&str, Chain)>) -> Engine {
        builder.register_dissectors(chains).unwrap();
        Engine::new(builder.build().unwrap())
    }

    #[test]
    fn fields_sit_back_to_back() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.add_field(f.x, 4, Encoding::BIG_ENDIAN);
        b.advance(4);
        b.add_field(f.y, 2, Encoding::LITTLE_ENDIAN);
        let engine = engine(f.builder, vec![("t", b.build())]);

        let out = engine.dissect_packet("t", &[0x00, 0x00, 0x00, 0x05, 0x0a, 0x00]);
        assert_eq!(out.consumed, 6);
        assert!(out.info.expert_infos().is_empty());

        let items: Vec<_> = out.tree.walk().into_iter().map(|(_, id)| &out.tree[id]).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value(), Some(&FieldValue::Uint(5)));
        assert_eq!(items[0].span(), 0..4);
        assert_eq!(items[0].label, "X: 5");
        assert_eq!(items[1].value(), Some(&FieldValue::Uint(10)));
        assert_eq!(items[1].span(), 4..6);
    }

    #[test]
    fn length_modes() {
        let tests = [
            (AdvanceMode::None, 2),
            (AdvanceMode::ReadLength, 10),
            (AdvanceMode::ReadLengthIncluding, 10),
            (AdvanceMode::ReadLengthExcluding, 12),
        ];

        for (mode, want) in tests {
            let f = fixture();
            let mut b = ChainBuilder::new();
            b.advance_by_length(2, Encoding::BIG_ENDIAN, mode);
            // Leaves a marker at wherever the cursor ended up.
            b.add_text(f.text, 0, "here");
            let engine = engine(f.builder, vec![("t", b.build())]);

            let mut packet = vec![0u8; 16];
            packet[1] = 0x0a;
            let out = engine.dissect_packet("t", &packet);
            let marker = &out.tree[out.tree.walk()[0].1];
            assert_eq!(marker.start, want, "{mode:?}");
        }
    }

    #[test]
    fn subtree_length_covers_what_was_read() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.advance(1);
        let header = b.add_text(f.text, 0, "Header");
        b.push_tree(header, f.ett);
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(f.x, 4, Encoding::BIG_ENDIAN);
        b.advance(4);
        b.pop_tree();
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        let engine = engine(f.builder, vec![("t", b.build())]);

        let out = engine.dissect_packet("t", &[0xff, 0, 1, 0, 0, 0, 2, 0, 3]);
        let walk = out.tree.walk();
        let depths: Vec<_> = walk.iter().map(|(depth, _)| *depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 0]);

        let header = &out.tree[walk[0].1];
        assert_eq!(header.span(), 1..7);
        assert_eq!(header.subtree, Some(f.ett));
        assert_eq!(out.tree[walk[3].1].value(), Some(&FieldValue::Uint(3)));
        assert_eq!(out.tree[walk[3].1].start, 7);
    }

    #[test]
    fn no_tree_means_no_items_but_side_effects_still_happen() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        let header = b.add_text(f.text, 2, "Header");
        b.push_tree(header, f.ett);
        b.set_column(Column::Protocol, "T");
        b.push_buffer("inner", vec![1, 2, 3]);
        b.pop_buffer();
        b.pop_tree();
        let engine = engine(f.builder, vec![("t", b.build())]);

        let mut pinfo = PacketInfo::new();
        let consumed = engine.dissect("t", &[0, 0], 0, None, &mut pinfo);
        assert_eq!(consumed, 2);
        assert_eq!(pinfo.column(Column::Protocol), Some("T"));
        assert_eq!(pinfo.data_sources().len(), 1);
        assert!(pinfo.expert_infos().is_empty());
    }

    #[test]
    fn pushed_buffers_are_read_then_left() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.advance(2);
        b.push_buffer("decoded", vec![0xab, 0xcd]);
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.pop_buffer();
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        let engine = engine(f.builder, vec![("t", b.build())]);

        let out = engine.dissect_packet("t", &[0, 0, 0x12, 0x34]);
        let walk = out.tree.walk();
        let inner = &out.tree[walk[0].1];
        assert_eq!(inner.source, SourceId::Derived(0));
        assert_eq!(inner.value(), Some(&FieldValue::Uint(0xabcd)));
        let outer = &out.tree[walk[1].1];
        assert_eq!(outer.source, SourceId::Frame);
        assert_eq!(outer.span(), 2..4);
        assert_eq!(outer.value(), Some(&FieldValue::Uint(0x1234)));

        let source = out.info.data_source(inner.source).unwrap();
        assert_eq!(source.name, "decoded");
        assert_eq!(&*source.data, &[0xab, 0xcd]);
    }

    #[test]
    fn bounds_error_keeps_partial_tree() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(f.x, 4, Encoding::BIG_ENDIAN);
        b.set_column(Column::Info, "unreachable");
        let engine = engine(f.builder, vec![("t", b.build())]);

        let out = engine.dissect_packet("t", &[0, 1, 2]);
        assert_eq!(out.consumed, 3);
        assert_eq!(out.info.column(Column::Info), None);

        let experts = out.info.expert_infos();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].severity, Severity::Error);
        assert_eq!(experts[0].group, ExpertGroup::Malformed);
        assert!(experts[0].message.starts_with("Malformed packet (t)"));

        // The first field survives, followed by the annotation.
        let walk = out.tree.walk();
        assert_eq!(walk.len(), 2);
        assert_eq!(out.tree[walk[0].1].value(), Some(&FieldValue::Uint(1)));
        assert_eq!(Some(walk[1].1), experts[0].item);
    }

    #[test]
    fn unvalidated_broken_chain_is_reported_not_panicked() {
        let f = fixture();
        let mut builder = f.builder;
        builder
            .register_dissectors([("t", ChainBuilder::new().advance(1).pop_buffer().build())])
            .unwrap();
        let config = EngineConfig {
            validate_chains: false,
            ..EngineConfig::default()
        };
        let engine = Engine::build(builder, config).unwrap();

        let out = engine.dissect_packet("t", &[0; 4]);
        assert_eq!(out.consumed, 4);
        let experts = out.info.expert_infos();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].group, ExpertGroup::Malformed);
        assert!(experts[0].message.contains("no matching push"));
    }

    #[test]
    fn starting_offset_is_honoured() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        let engine = engine(f.builder, vec![("t", b.build())]);

        let mut tree = ProtoTree::new();
        let mut pinfo = PacketInfo::new();
        let consumed = engine.dissect("t", &[9, 9, 0, 7], 2, Some(&mut tree), &mut pinfo);
        assert_eq!(consumed, 2);
        let item = &tree[tree.walk()[0].1];
        assert_eq!(item.span(), 2..4);
        assert_eq!(item.value(), Some(&FieldValue::Uint(7)));
    }

    #[test]
    fn unknown_top_level_protocol() {
        let f = fixture();
        let engine = engine(f.builder, vec![]);
        let out = engine.dissect_packet("nope", &[1, 2, 3]);
        assert_eq!(out.consumed, 3);
        let experts = out.info.expert_infos();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].message, "protocol nope not found");
        assert_eq!(out.tree.len(), 2);
        assert_eq!(out.tree[out.tree.walk()[0].1].kind, ItemKind::Data);
    }

    #[test]
    fn slot_overrides_revert_after_one_call() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.set_next_dissector(SlotId(0), Some("inner"), Some(LengthSource::Fixed(1)));
        b.call_next_dissector(SlotId(0), "missing", SubrangeLength::Remaining);
        b.call_next_dissector(SlotId(0), "missing", SubrangeLength::Remaining);
        let mut inner = ChainBuilder::new();
        inner.add_field(f.y, 1, Encoding::BIG_ENDIAN);
        let engine = engine(f.builder, vec![("t", b.build()), ("inner", inner.build())]);

        let out = engine.dissect_packet("t", &[4, 5, 6]);
        let walk = out.tree.walk();
        assert_eq!(out.tree[walk[0].1].value(), Some(&FieldValue::Uint(4)));
        // The second call fell back to the default protocol and length.
        assert_eq!(out.tree[walk[1].1].kind, ItemKind::Data);
        assert_eq!(out.tree[walk[1].1].span(), 0..3);
        assert_eq!(out.info.expert_infos().len(), 1);
        assert_eq!(out.info.expert_infos()[0].message, "protocol missing not found");
    }

    #[test]
    fn tree_less_pass_still_checks_bounds() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.add_field(f.y, 2, Encoding::BIG_ENDIAN);
        b.set_column(Column::Info, "unreachable");
        let engine = engine(f.builder, vec![("t", b.build())]);

        let mut pinfo = PacketInfo::new();
        let consumed = engine.dissect("t", &[1], 0, None, &mut pinfo);
        assert_eq!(consumed, 1);
        assert_eq!(pinfo.column(Column::Info), None);

        let experts = pinfo.expert_infos();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].group, ExpertGroup::Malformed);
        assert_eq!(experts[0].item, None);
        assert_eq!(
            experts[0].message,
            "Malformed packet (t): read of 2 bytes at offset 0 exceeds buffer of 1 bytes"
        );
    }

    #[test]
    fn subtree_root_that_produced_nothing_is_malformed() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.advance(1);
        b.instruction(Instruction::PushTree {
            item: ItemRef(0),
            subtree: f.ett,
        });
        b.pop_tree();
        b.set_column(Column::Info, "unreachable");
        let mut builder = f.builder;
        builder.register_dissectors([("t", b.build())]).unwrap();
        let engine = Engine::new(builder.build_unvalidated());

        let out = engine.dissect_packet("t", &[0; 2]);
        assert_eq!(out.consumed, 2);
        assert_eq!(out.info.column(Column::Info), None);
        let experts = out.info.expert_infos();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].severity, Severity::Error);
        assert_eq!(
            experts[0].message,
            format!(
                "Malformed packet (t): {}",
                ChainIntegrityError::MissingItem { index: 1, item: 0 }
            )
        );
    }

    #[test]
    fn delegated_range_past_the_end_aborts_the_caller() {
        let f = fixture();
        let mut b = ChainBuilder::new();
        b.set_next_dissector(SlotId(0), None, Some(LengthSource::Fixed(100)));
        b.call_next_dissector(SlotId(0), "inner", SubrangeLength::Remaining);
        b.set_column(Column::Info, "unreachable");
        let mut inner = ChainBuilder::new();
        inner.set_column(Column::Protocol, "INNER");
        let engine = engine(f.builder, vec![("p", b.build()), ("inner", inner.build())]);

        let out = engine.dissect_packet("p", &[7, 8, 9]);
        assert_eq!(out.consumed, 3);
        assert_eq!(out.info.column(Column::Info), None);
        assert_eq!(out.info.column(Column::Protocol), None);

        let experts = out.info.expert_infos();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].group, ExpertGroup::Malformed);
        assert_eq!(
            experts[0].message,
            "Malformed packet (p): read of 100 bytes at offset 0 exceeds buffer of 3 bytes"
        );
        assert_eq!(out.tree.len(), 1);
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
