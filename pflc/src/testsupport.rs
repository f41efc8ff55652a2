//! A small, hand-built protocol database shared by unit and integration
//! tests. Shaped after the worked examples in the design's "Concrete
//! scenarios": `startproto -> ethernet -> {ip, arp, ipv6}`,
//! `ip -> {tcp, udp}`, and a self-looping `ipv6 -> ipv6` edge for the
//! multi-instance extraction scenario.
#![doc(hidden)]

use pflc_types::{EncapCase, Expr, FieldDef, FieldKind, ProtoDef};

use crate::error::ErrorRecorder;

/// `let _ = env_logger::init();` would panic the second test in the same
/// binary to call it; `try_init` makes this safe to call from every test
/// that wants `RUST_LOG=pflc=trace` output.
pub fn init_test_logging() {
    let _ = env_logger::try_init();
}

pub struct ErrorSink(pub ErrorRecorder);

impl ErrorSink {
    pub fn new() -> Self {
        ErrorSink(ErrorRecorder::new())
    }
}

fn fixed(name: &str, len: u32) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        kind: FieldKind::Fixed { len },
        compattable: true,
    }
}

fn proto(
    id: u32,
    name: &str,
    fields: Vec<FieldDef>,
    selector: Option<&str>,
    encap: Vec<(Option<i64>, &str)>,
) -> ProtoDef {
    ProtoDef {
        id,
        name: name.to_string(),
        fields,
        before: None,
        encapsulation: encap
            .into_iter()
            .map(|(val, next)| EncapCase {
                case_value: val.map(Expr::IntConst),
                next_proto: next.to_string(),
            })
            .collect(),
        encap_selector: selector.map(|f| Expr::FieldRef(f.to_string())),
        verify: None,
        preferred_next: Vec::new(),
        supported: true,
    }
}

pub fn sample_database() -> Vec<ProtoDef> {
    vec![
        proto(0, "startproto", vec![], None, vec![(None, "ethernet")]),
        proto(
            1,
            "ethernet",
            vec![fixed("ethertype", 2)],
            Some("ethertype"),
            vec![(Some(0x0800), "ip"), (Some(0x0806), "arp"), (Some(0x86DD), "ipv6")],
        ),
        {
            let mut ip = proto(
                2,
                "ip",
                vec![
                    fixed("ttl", 1),
                    fixed("proto", 1),
                    fixed("src", 4),
                    fixed("dst", 4),
                ],
                Some("proto"),
                vec![(Some(6), "tcp"), (Some(17), "udp")],
            );
            ip.preferred_next = vec!["tcp".to_string()];
            ip
        },
        proto(3, "arp", vec![fixed("oper", 2)], None, vec![]),
        proto(4, "tcp", vec![fixed("srcport", 2), fixed("dstport", 2)], None, vec![]),
        proto(5, "udp", vec![fixed("srcport", 2), fixed("dstport", 2)], None, vec![]),
        proto(
            6,
            "ipv6",
            vec![fixed("nextheader", 1)],
            Some("nextheader"),
            vec![(Some(41), "ipv6"), (Some(6), "tcp"), (Some(17), "udp")],
        ),
    ]
}
