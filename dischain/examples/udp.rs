//! Dissects a stream of length-prefixed datagrams, each carrying a baby UDP header followed by a
//! DNS-like header. Run with `RUST_LOG=debug` to watch the chains execute, and optionally pass the
//! path of a TOML engine config.

use dischain::{
    message_length, ChainBuilder, Column, Encoding, Engine, EngineConfig, FieldDisplay, FieldInfo,
    FieldType, LengthSource, PacketInfo, ProtoTree, Registry, SlotId, SubrangeLength,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let mut builder = Registry::builder();

    let udp = {
        let proto = builder.field(FieldInfo::new("Baby UDP", "baby_udp", FieldType::None));
        let src = builder.field(FieldInfo::new(
            "Source Port",
            "baby_udp.srcport",
            FieldType::Uint16,
        ));
        let dst = builder.field(FieldInfo::new(
            "Destination Port",
            "baby_udp.dstport",
            FieldType::Uint16,
        ));
        let length = builder.field(FieldInfo::new(
            "Length",
            "baby_udp.length",
            FieldType::Uint16,
        ));
        let checksum = builder.field(
            FieldInfo::new("Checksum", "baby_udp.checksum", FieldType::Uint16)
                .with_display(FieldDisplay::Hex),
        );
        let ett = builder.subtree("baby_udp");

        let mut b = ChainBuilder::new();
        b.set_column(Column::Protocol, "Baby UDP");
        let root = b.add_text(proto, 8, "Baby UDP");
        b.push_tree(root, ett);
        b.add_field(src, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(dst, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(length, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(checksum, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.pop_tree();
        b.call_next_dissector(SlotId(0), "dns", SubrangeLength::Remaining);
        b.build()
    };

    let dns = {
        let proto = builder.field(FieldInfo::new("Domain Name System", "dns", FieldType::None));
        let id = builder.field(
            FieldInfo::new("Transaction ID", "dns.id", FieldType::Uint16)
                .with_display(FieldDisplay::Hex),
        );
        let flags = builder.field(
            FieldInfo::new("Flags", "dns.flags", FieldType::Uint16)
                .with_display(FieldDisplay::DecHex),
        );
        let questions = builder.field(FieldInfo::new(
            "Questions",
            "dns.count.queries",
            FieldType::Uint16,
        ));
        let ett = builder.subtree("dns");

        let mut b = ChainBuilder::new();
        b.set_column(Column::Protocol, "DNS");
        let root = b.add_text(proto, 6, "Domain Name System");
        b.push_tree(root, ett);
        b.add_field(id, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(flags, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.add_field(questions, 2, Encoding::BIG_ENDIAN);
        b.advance(2);
        b.pop_tree();
        // Whatever follows the header is left to a protocol nobody registered.
        b.set_next_dissector(
            SlotId(0),
            Some("dns.records"),
            Some(LengthSource::Remaining),
        );
        b.call_next_dissector(SlotId(0), "data", SubrangeLength::Remaining);
        b.build()
    };

    builder.register_dissectors([("baby_udp", udp), ("dns", dns)])?;
    let engine = Engine::build(builder, config)?;

    #[rustfmt::skip]
    let stream: &[u8] = &[
        0x00, 0x0e,
        0x30, 0x39, 0x00, 0x35, 0x00, 0x0e, 0xbe, 0xef,
        0x12, 0x34, 0x01, 0x00, 0x00, 0x01,
        0x00, 0x12,
        0x00, 0x35, 0x30, 0x39, 0x00, 0x12, 0xca, 0xfe,
        0x12, 0x34, 0x81, 0x80, 0x00, 0x01, 0x03, 0x77, 0x77, 0x77,
    ];

    let mut offset = 0;
    let mut number = 1;
    while offset < stream.len() {
        let length = message_length(stream, offset)? as usize;
        let start = offset + 2;
        let end = (start + length).min(stream.len());

        let mut tree = ProtoTree::new();
        let mut pinfo = PacketInfo::new();
        engine.dissect("baby_udp", &stream[start..end], 0, Some(&mut tree), &mut pinfo);

        println!("Message {number} ({} bytes)", end - start);
        print!("{tree}");
        for expert in pinfo.expert_infos() {
            println!("  ! {expert}");
        }
        println!();

        offset = end;
        number += 1;
    }

    Ok(())
}
