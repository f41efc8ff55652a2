//! End-to-end coverage through `CompilationUnit`, one test per concrete
//! scenario: trivial accept, a single protocol, a field predicate, a regex
//! over headers, field extraction, and multi-instance extraction.

use pflc::error::ErrorRecorder;
use pflc::graph::EncapGraph;
use pflc::symtab::GlobalSymbols;
use pflc::unit::{get_netil_filter, CompilationUnit, CompileOutcome};
use pflc_types::{
    Action, BinOp, EncapCase, Expr, FieldDef, FieldKind, FieldPath, Inclusion, ParsedFilter,
    Repeat, SetElement, SetMembership, TermExpr,
};

fn fixed(name: &str, len: u32) -> FieldDef {
    FieldDef { name: name.to_string(), kind: FieldKind::Fixed { len }, compattable: true }
}

fn proto(
    id: u32,
    name: &str,
    fields: Vec<FieldDef>,
    selector: Option<&str>,
    encap: Vec<(Option<i64>, &str)>,
) -> pflc_types::ProtoDef {
    pflc_types::ProtoDef {
        id,
        name: name.to_string(),
        fields,
        before: None,
        encapsulation: encap.into_iter().map(|(v, next)| EncapCase { case_value: v.map(Expr::IntConst), next_proto: next.to_string() }).collect(),
        encap_selector: selector.map(|f| Expr::FieldRef(f.to_string())),
        verify: None,
        preferred_next: Vec::new(),
        supported: true,
    }
}

/// `startproto -> ethernet -> {ip, arp, ipv6}`, `ip -> {tcp, udp}`, and a
/// self-looping `ipv6 -> ipv6` edge for the multi-instance scenario.
fn sample_database() -> Vec<pflc_types::ProtoDef> {
    vec![
        proto(0, "startproto", vec![], None, vec![(None, "ethernet")]),
        proto(1, "ethernet", vec![fixed("ethertype", 2)], Some("ethertype"), vec![(Some(0x0800), "ip"), (Some(0x0806), "arp"), (Some(0x86DD), "ipv6")]),
        proto(2, "ip", vec![fixed("ttl", 1), fixed("proto", 1), fixed("src", 4), fixed("dst", 4)], Some("proto"), vec![(Some(6), "tcp"), (Some(17), "udp")]),
        proto(3, "arp", vec![fixed("oper", 2)], None, vec![]),
        proto(4, "tcp", vec![fixed("srcport", 2), fixed("dstport", 2)], None, vec![]),
        proto(5, "udp", vec![fixed("srcport", 2), fixed("dstport", 2)], None, vec![]),
        proto(6, "ipv6", vec![fixed("nextheader", 1)], Some("nextheader"), vec![(Some(41), "ipv6"), (Some(6), "tcp"), (Some(17), "udp")]),
    ]
}

fn build_world() -> (GlobalSymbols, EncapGraph) {
    let _ = env_logger::try_init();
    let mut recorder = ErrorRecorder::new();
    let mut global = GlobalSymbols::from_database(sample_database(), &mut recorder).unwrap();
    let mut graph = EncapGraph::build(&global).unwrap();
    graph.remove_unsupported_nodes(&global);
    graph.remove_unconnected_nodes();
    graph.assign_layers(&mut global);
    (global, graph)
}

fn seq(elements: Vec<SetElement>) -> ParsedFilter {
    ParsedFilter { expr: Some(TermExpr::Seq(elements)), actions: vec![] }
}

fn named(proto: &str) -> SetElement {
    SetElement {
        protos: SetMembership::Named(vec![proto.to_string()]),
        include: Inclusion::In,
        repeat: Repeat::Exactly1,
        tunneled: false,
        predicate: None,
        header_index: None,
    }
}

#[test]
fn trivial_accept_emits_send_1_and_ret_for_the_empty_filter() {
    let (global, graph) = build_world();
    let unit = CompilationUnit::new(&global, &graph);
    let filter = ParsedFilter { expr: None, actions: vec![] };
    let result = unit.compile(&filter, true);
    assert_eq!(result.outcome, CompileOutcome::Success);
    let netil = get_netil_filter(&result).unwrap();
    assert!(netil.contains("SEND 1"));
    assert!(netil.contains("RET"));
}

#[test]
fn single_protocol_filter_compiles_without_touching_the_info_partition() {
    let (global, graph) = build_world();
    let unit = CompilationUnit::new(&global, &graph);
    let filter = seq(vec![named("ip")]);
    let result = unit.compile(&filter, true);
    assert_eq!(result.outcome, CompileOutcome::Success);
    let netil = get_netil_filter(&result).unwrap();
    assert!(!netil.contains("ISSTR"), "a filter with no extractfields() action must never emit an info-partition store");
}

#[test]
fn a_field_predicate_compiles_to_a_guarded_dispatch() {
    let (global, graph) = build_world();
    let unit = CompilationUnit::new(&global, &graph);
    let mut ip = named("ip");
    ip.predicate = Some(Expr::Bin(BinOp::Eq, Box::new(Expr::FieldRef("src".to_string())), Box::new(Expr::IntConst(0x0A000001))));
    let filter = seq(vec![ip]);
    let result = unit.compile(&filter, true);
    assert_eq!(result.outcome, CompileOutcome::Success);
    let netil = get_netil_filter(&result).unwrap();
    assert!(netil.contains("CMPEQ") || netil.contains("#167772161"), "the 10.0.0.1 literal (0x0A000001) must survive into the emitted guard");
}

#[test]
fn ip_followed_by_tcp_or_udp_compiles_a_multi_state_dfa_that_never_reaches_arp() {
    let (global, graph) = build_world();
    let ip_then_transport = seq(vec![
        named("ip"),
        SetElement { protos: SetMembership::Named(vec!["tcp".to_string(), "udp".to_string()]), ..named("tcp") },
    ]);
    let unit = CompilationUnit::new(&global, &graph);
    let result = unit.compile(&ip_then_transport, true);
    assert_eq!(result.outcome, CompileOutcome::Success);

    let automaton = unit.automaton(&ip_then_transport).unwrap();
    assert!(automaton.dfa.states.len() > 1, "ip (tcp|udp) must pass through at least one intermediate state before accepting");
    let arp = global.proto_by_name("arp").unwrap();
    assert!(
        automaton.dfa.states.iter().filter(|s| s.accepting).all(|s| !s.protos.contains(&arp)),
        "no accepting state may be reached by way of arp for a filter that never mentions it"
    );
}

#[test]
fn ip_followed_by_tcp_or_udp_emits_a_real_encapsulation_switch_for_both_branches() {
    let (global, graph) = build_world();
    let ip_then_transport = seq(vec![
        named("ip"),
        SetElement { protos: SetMembership::Named(vec!["tcp".to_string(), "udp".to_string()]), ..named("tcp") },
    ]);
    let unit = CompilationUnit::new(&global, &graph);
    let result = unit.compile(&ip_then_transport, false);
    assert_eq!(result.outcome, CompileOutcome::Success);
    let netil = get_netil_filter(&result).unwrap();
    assert!(netil.contains("#6"), "the tcp case (ip proto 6) must reach a real comparison:\n{netil}");
    assert!(netil.contains("#17"), "the udp case (ip proto 17) must reach a real comparison, not be shadowed by an earlier unconditional jump:\n{netil}");
}

#[test]
fn extract_fields_emits_one_isstr_store_per_extracted_field() {
    let (global, graph) = build_world();
    let unit = CompilationUnit::new(&global, &graph);
    let filter = ParsedFilter {
        expr: Some(TermExpr::Seq(vec![named("ip"), named("tcp")])),
        actions: vec![Action::ExtractFields(vec![
            FieldPath { proto: "ip".to_string(), field: "src".to_string(), multi: false },
            FieldPath { proto: "ip".to_string(), field: "dst".to_string(), multi: false },
            FieldPath { proto: "tcp".to_string(), field: "srcport".to_string(), multi: false },
        ])],
    };
    let result = unit.compile(&filter, true);
    assert_eq!(result.outcome, CompileOutcome::Success);
    let netil = get_netil_filter(&result).unwrap();
    let isstr_count = netil.lines().filter(|l| l.starts_with("ISSTR")).count();
    assert_eq!(isstr_count, 3, "three extracted fields must produce three info-partition stores:\n{netil}");
}

#[test]
fn multi_instance_extraction_reserves_space_for_every_ipv6_header_seen() {
    let (global, graph) = build_world();
    let unit = CompilationUnit::new(&global, &graph);
    let filter = ParsedFilter {
        expr: Some(TermExpr::Seq(vec![named("ipv6")])),
        actions: vec![Action::ExtractFields(vec![FieldPath { proto: "ipv6".to_string(), field: "nextheader".to_string(), multi: true }])],
    };
    let result = unit.compile(&filter, true);
    assert_eq!(result.outcome, CompileOutcome::Success);
    let netil = get_netil_filter(&result).unwrap();
    let isstr_count = netil.lines().filter(|l| l.starts_with("ISSTR")).count();
    assert!(isstr_count >= 1, "a multi-instance extraction must emit at least one info-partition store:\n{netil}");
}
