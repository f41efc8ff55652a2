//! Filter Front-End (component F): drives the encapsulation graph and the
//! automaton builder from a parsed filter expression, then resolves its
//! `extractfields(...)` action into info-partition positions.

use pflc_types::{Action, FieldKind, FieldPath, ParsedFilter};

use crate::error::{Diagnostic, ErrorRecorder, Fatal};
use crate::fsa::{self, Dfa, DfaState};
use crate::graph::EncapGraph;
use crate::ids::ProtoId;
use crate::symtab::{ExtractionInfo, GlobalSymbols, LocalSymbols};

/// Upper bound on how many instances of one protocol a multi-instance
/// extraction (`proto*.field`) tracks before it stops counting; concrete
/// scenario 6 reserves `4*(1+MAX_PROTO_INSTANCES)` bytes per such field.
pub const MAX_PROTO_INSTANCES: u32 = 8;

pub struct CompiledFilter {
    pub dfa: Dfa,
    pub alphabet: Vec<ProtoId>,
}

pub fn build(
    filter: &ParsedFilter,
    global: &GlobalSymbols,
    graph: &EncapGraph,
    local: &mut LocalSymbols,
    recorder: &mut ErrorRecorder,
) -> Result<CompiledFilter, Fatal> {
    let alphabet: Vec<ProtoId> = graph.nodes().collect();

    let mut dfa = match &filter.expr {
        // Concrete scenario 1: the empty filter accepts every packet without
        // looking at a single protocol.
        None => trivial_accept_dfa(),
        Some(term) => {
            let raw = fsa::build_term(term, global, &alphabet);
            fsa::minimize(&raw, &alphabet)
        }
    };

    let wants_extraction = filter.actions.iter().any(|a| matches!(a, Action::ExtractFields(_)));
    if wants_extraction {
        for state in &mut dfa.states {
            if state.accepting {
                state.is_action = true;
            }
        }
    }

    for action in &filter.actions {
        if let Action::ExtractFields(paths) = action {
            resolve_extraction(paths, global, local, recorder);
        }
    }

    log::debug!("front-end built a {}-state DFA over a {}-symbol alphabet", dfa.states.len(), alphabet.len());

    Ok(CompiledFilter { dfa, alphabet })
}

fn trivial_accept_dfa() -> Dfa {
    let mut dfa = Dfa::default();
    dfa.states.push(DfaState { id: crate::ids::StateId(0), protos: Vec::new(), accepting: true, is_action: false });
    dfa.start = crate::ids::StateId(0);
    dfa
}

fn resolve_extraction(
    paths: &[FieldPath],
    global: &GlobalSymbols,
    local: &mut LocalSymbols,
    recorder: &mut ErrorRecorder,
) {
    let mut position = 0u32;
    let mut seen_allfields = false;
    for path in paths {
        let Some(proto_id) = global.proto_by_name(&path.proto) else {
            recorder.push(Diagnostic::Pfl { message: format!("unknown protocol '{}' in extractfields", path.proto) });
            continue;
        };
        let proto = global.proto(proto_id);
        let Some(field) = proto.field_named(&path.field) else {
            recorder.push(Diagnostic::Pfl {
                message: format!("unknown field '{}.{}' in extractfields", path.proto, path.field),
            });
            continue;
        };
        if seen_allfields {
            recorder.push(Diagnostic::Pfl {
                message: format!(
                    "'{}.{}' is named after an allfields() extraction, which must be the last entry",
                    path.proto, path.field
                ),
            });
            continue;
        }
        if matches!(field.kind, FieldKind::Allfields) {
            seen_allfields = true;
        }
        let mut usage = local.usage(field.id);
        usage.used = true;
        usage.multi_proto = path.multi;
        *local.usage_mut(field.id) = usage;
        local.set_extraction(field.id, ExtractionInfo { position, instance_count: 0 });
        position += if path.multi { 4 * (1 + MAX_PROTO_INSTANCES) } else { 4 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::GlobalSymbols;
    use pflc_types::{FieldDef, ProtoDef};

    fn database_with_allfields() -> Vec<ProtoDef> {
        vec![
            ProtoDef {
                id: 0,
                name: "startproto".to_string(),
                fields: vec![],
                before: None,
                encapsulation: vec![],
                encap_selector: None,
                verify: None,
                preferred_next: vec![],
                supported: true,
            },
            ProtoDef {
                id: 1,
                name: "ip".to_string(),
                fields: vec![
                    FieldDef { name: "ttl".to_string(), kind: FieldKind::Fixed { len: 1 }, compattable: true },
                    FieldDef { name: "allfields".to_string(), kind: FieldKind::Allfields, compattable: false },
                ],
                before: None,
                encapsulation: vec![],
                encap_selector: None,
                verify: None,
                preferred_next: vec![],
                supported: true,
            },
        ]
    }

    #[test]
    fn extraction_named_after_allfields_is_a_pfl_error() {
        let mut recorder = ErrorRecorder::new();
        let global = GlobalSymbols::from_database(database_with_allfields(), &mut recorder).unwrap();
        let mut local = LocalSymbols::new();
        resolve_extraction(
            &[
                FieldPath { proto: "ip".to_string(), field: "allfields".to_string(), multi: false },
                FieldPath { proto: "ip".to_string(), field: "ttl".to_string(), multi: false },
            ],
            &global,
            &mut local,
            &mut recorder,
        );
        assert!(recorder.has_blocking(), "a field named after allfields() must fail the compile");
    }

    #[test]
    fn allfields_alone_is_not_an_error() {
        let mut recorder = ErrorRecorder::new();
        let global = GlobalSymbols::from_database(database_with_allfields(), &mut recorder).unwrap();
        let mut local = LocalSymbols::new();
        resolve_extraction(
            &[FieldPath { proto: "ip".to_string(), field: "allfields".to_string(), multi: false }],
            &global,
            &mut local,
            &mut recorder,
        );
        assert!(!recorder.has_blocking());
    }
}
