//! `BooleanAND/BooleanOR/BooleanNot` and `ReduceAutomaton`: product
//! construction, complementation, and minimisation-style pruning over
//! completed (everywhere-defined) DFAs.

use std::collections::{HashMap, HashSet, VecDeque};

use pflc_types::{BinOp, Expr};

use super::{Dfa, DfaEdge, DfaState};
use crate::ids::{ProtoId, StateId};

/// Adds a single sink state with a self-loop on every symbol, so every state
/// has exactly one canonical outgoing edge per symbol. Required before
/// complementation (a DFA with missing transitions has no well-defined
/// complement) and before the product construction used by AND/OR.
pub fn complete(dfa: &Dfa, alphabet: &[ProtoId]) -> Dfa {
    let mut out = Dfa { states: dfa.states.clone(), start: dfa.start, transitions: HashMap::new() };
    for state in &dfa.states {
        for &symbol in alphabet {
            let edges = dfa.edges_for(state.id, symbol);
            if edges.is_empty() {
                continue;
            }
            out.transitions.insert((state.id, symbol), edges.to_vec());
        }
    }
    let dead = StateId(out.states.len() as u32);
    out.states.push(DfaState { id: dead, protos: Vec::new(), accepting: false, is_action: false });
    for &symbol in alphabet {
        out.transitions.insert((dead, symbol), vec![DfaEdge { to: dead, predicate: None, tunneled: false }]);
    }
    for state in dfa.states.iter().map(|s| s.id) {
        for &symbol in alphabet {
            out.transitions.entry((state, symbol)).or_insert_with(|| vec![DfaEdge { to: dead, predicate: None, tunneled: false }]);
        }
    }
    out
}

fn canonical_edge(dfa: &Dfa, state: StateId, symbol: ProtoId) -> DfaEdge {
    dfa.edges_for(state, symbol).first().cloned().expect("dfa must be completed before use")
}

pub fn negate(dfa: &Dfa, alphabet: &[ProtoId]) -> Dfa {
    let mut out = complete(dfa, alphabet);
    for state in &mut out.states {
        state.accepting = !state.accepting;
    }
    out
}

fn and_predicate(a: Option<Expr>, b: Option<Expr>) -> Option<Expr> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (Some(x), Some(y)) => Some(Expr::Bin(BinOp::LAnd, Box::new(x), Box::new(y))),
    }
}

enum Mode {
    And,
    Or,
}

fn product(da: &Dfa, db: &Dfa, alphabet: &[ProtoId], mode: Mode) -> Dfa {
    let ca = complete(da, alphabet);
    let cb = complete(db, alphabet);
    let mut dfa = Dfa::default();
    let mut seen: HashMap<(StateId, StateId), StateId> = HashMap::new();

    let start_pair = (ca.start, cb.start);
    let make_state = |dfa: &mut Dfa, a: &Dfa, b: &Dfa, pa: StateId, pb: StateId| -> StateId {
        let id = StateId(dfa.states.len() as u32);
        let sa = a.state(pa);
        let sb = b.state(pb);
        let accepting = match mode {
            Mode::And => sa.accepting && sb.accepting,
            Mode::Or => sa.accepting || sb.accepting,
        };
        let mut protos: Vec<ProtoId> = sa.protos.iter().chain(sb.protos.iter()).copied().collect();
        protos.sort_by_key(|p| p.0);
        protos.dedup();
        dfa.states.push(DfaState { id, protos, accepting, is_action: sa.is_action || sb.is_action });
        id
    };

    dfa.start = make_state(&mut dfa, &ca, &cb, start_pair.0, start_pair.1);
    seen.insert(start_pair, dfa.start);
    let mut queue = VecDeque::new();
    queue.push_back(start_pair);

    while let Some((pa, pb)) = queue.pop_front() {
        let from = seen[&(pa, pb)];
        for &symbol in alphabet {
            let ea = canonical_edge(&ca, pa, symbol);
            let eb = canonical_edge(&cb, pb, symbol);
            let target_pair = (ea.to, eb.to);
            let to = *seen.entry(target_pair).or_insert_with(|| {
                let id = make_state(&mut dfa, &ca, &cb, target_pair.0, target_pair.1);
                queue.push_back(target_pair);
                id
            });
            dfa.add_edge(from, symbol, DfaEdge {
                to,
                predicate: and_predicate(ea.predicate, eb.predicate),
                tunneled: ea.tunneled || eb.tunneled,
            });
        }
    }
    dfa
}

pub fn and(da: &Dfa, db: &Dfa, alphabet: &[ProtoId]) -> Dfa {
    product(da, db, alphabet, Mode::And)
}

pub fn or(da: &Dfa, db: &Dfa, alphabet: &[ProtoId]) -> Dfa {
    product(da, db, alphabet, Mode::Or)
}

/// `ReduceAutomaton`: drops states unreachable from the start, then merges
/// states that are behaviourally indistinguishable (same accepting status,
/// same canonical successor-group for every symbol) by partition
/// refinement. Operates on the *canonical* (first) edge per symbol, which is
/// exact for automata with at most one guard per symbol and an
/// over-approximation (keeps a few more states than strictly necessary)
/// when extended-transition guards are present.
pub fn minimize(dfa: &Dfa, alphabet: &[ProtoId]) -> Dfa {
    let reachable = reachable_states(dfa);
    let mut group_of: HashMap<StateId, usize> = HashMap::new();
    for &id in &reachable {
        group_of.insert(id, dfa.state(id).accepting as usize);
    }

    loop {
        let mut signature_to_group: HashMap<Vec<i64>, usize> = HashMap::new();
        let mut new_group_of = HashMap::new();
        for &id in &reachable {
            let mut sig = vec![group_of[&id] as i64];
            for &symbol in alphabet {
                let target = dfa.edges_for(id, symbol).first().map(|e| group_of.get(&e.to).copied());
                sig.push(match target {
                    Some(Some(g)) => g as i64,
                    _ => -1,
                });
            }
            let next_id = signature_to_group.len();
            let group = *signature_to_group.entry(sig).or_insert(next_id);
            new_group_of.insert(id, group);
        }
        if new_group_of == group_of {
            break;
        }
        group_of = new_group_of;
    }

    let group_count = group_of.values().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut representative: Vec<Option<StateId>> = vec![None; group_count];
    for &id in &reachable {
        representative[group_of[&id]].get_or_insert(id);
    }

    let mut out = Dfa::default();
    for g in 0..group_count {
        let rep = representative[g].unwrap();
        let src = dfa.state(rep);
        out.states.push(DfaState { id: StateId(g as u32), protos: src.protos.clone(), accepting: src.accepting, is_action: src.is_action });
    }
    out.start = StateId(group_of[&dfa.start] as u32);
    for g in 0..group_count {
        let rep = representative[g].unwrap();
        for &symbol in alphabet {
            for edge in dfa.edges_for(rep, symbol) {
                if let Some(&target_group) = group_of.get(&edge.to) {
                    out.add_edge(StateId(g as u32), symbol, DfaEdge {
                        to: StateId(target_group as u32),
                        predicate: edge.predicate.clone(),
                        tunneled: edge.tunneled,
                    });
                }
            }
        }
    }
    out
}

fn reachable_states(dfa: &Dfa) -> Vec<StateId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(dfa.start);
    queue.push_back(dfa.start);
    while let Some(s) = queue.pop_front() {
        for symbol in dfa.symbols_from(s).collect::<Vec<_>>() {
            for edge in dfa.edges_for(s, symbol) {
                if seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
    }
    seen.into_iter().collect()
}
