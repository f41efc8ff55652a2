//! `BuildRegExpFSA`: Thompson-style construction of an NFA from an ordered
//! list of protocol-set elements, plus the boolean-combinator recursion that
//! turns a whole filter term tree into a DFA.

use pflc_types::{Inclusion, Repeat, SetElement, SetMembership, TermExpr};

use super::{boolean, determinize, Nfa, NfaTransition};
use crate::ids::ProtoId;
use crate::symtab::GlobalSymbols;

fn resolve_protos(element: &SetElement, global: &GlobalSymbols, alphabet: &[ProtoId]) -> Vec<ProtoId> {
    let named: Vec<ProtoId> = match &element.protos {
        SetMembership::Any => alphabet.to_vec(),
        SetMembership::Named(names) => names.iter().filter_map(|n| global.proto_by_name(n)).collect(),
    };
    match element.include {
        Inclusion::In => named,
        Inclusion::NotIn => alphabet.iter().copied().filter(|p| !named.contains(p)).collect(),
    }
}

/// Builds the Thompson fragment for one set element (with its repeat
/// operator) between fresh `entry`/`exit` states, and wires it into `nfa`.
fn element_fragment(nfa: &mut Nfa, element: &SetElement, protos: &[ProtoId]) -> (crate::ids::StateId, crate::ids::StateId) {
    let add_matched_edge = |nfa: &mut Nfa, from, to| {
        for &symbol in protos {
            nfa.add_transition(
                from,
                NfaTransition { to, symbol, predicate: element.predicate.clone(), tunneled: element.tunneled },
            );
        }
    };

    match element.repeat {
        Repeat::Exactly1 => {
            let entry = nfa.new_state();
            let exit = nfa.new_state();
            add_matched_edge(nfa, entry, exit);
            (entry, exit)
        }
        Repeat::Question => {
            let entry = nfa.new_state();
            let exit = nfa.new_state();
            add_matched_edge(nfa, entry, exit);
            nfa.add_epsilon(entry, exit);
            (entry, exit)
        }
        Repeat::Star => {
            let entry = nfa.new_state();
            let exit = nfa.new_state();
            add_matched_edge(nfa, entry, entry);
            nfa.add_epsilon(entry, exit);
            (entry, exit)
        }
        Repeat::Plus => {
            let entry = nfa.new_state();
            let loop_state = nfa.new_state();
            let exit = nfa.new_state();
            add_matched_edge(nfa, entry, loop_state);
            add_matched_edge(nfa, loop_state, loop_state);
            nfa.add_epsilon(loop_state, exit);
            (entry, exit)
        }
    }
}

pub fn build_regexp_fsa(elements: &[SetElement], global: &GlobalSymbols, alphabet: &[ProtoId]) -> Nfa {
    let mut nfa = Nfa::new();
    let mut cursor = nfa.start;
    for element in elements {
        let protos = resolve_protos(element, global, alphabet);
        let (entry, exit) = element_fragment(&mut nfa, element, &protos);
        nfa.add_epsilon(cursor, entry);
        cursor = exit;
    }
    nfa.states[cursor.index()].accepting = true;
    nfa
}

/// Recursively lowers a whole filter term (regex sequences plus and/or/not
/// boolean composition) to a single DFA, the way `CreateAutomatonFromFilter`
/// drives `BuildRegExpFSA` + `BooleanAND/OR/Not` internally.
pub fn build_term(term: &TermExpr, global: &GlobalSymbols, alphabet: &[ProtoId]) -> super::Dfa {
    match term {
        TermExpr::Seq(elements) => {
            let nfa = build_regexp_fsa(elements, global, alphabet);
            determinize(&nfa)
        }
        TermExpr::And(a, b) => {
            let da = build_term(a, global, alphabet);
            let db = build_term(b, global, alphabet);
            boolean::and(&da, &db, alphabet)
        }
        TermExpr::Or(a, b) => {
            let da = build_term(a, global, alphabet);
            let db = build_term(b, global, alphabet);
            boolean::or(&da, &db, alphabet)
        }
        TermExpr::Not(inner) => {
            let d = build_term(inner, global, alphabet);
            boolean::negate(&d, alphabet)
        }
    }
}
