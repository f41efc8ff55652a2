//! `NFAtoDFA`: subset construction over the protocol alphabet.

use std::collections::{BTreeSet, HashMap, VecDeque};

use pflc_types::{BinOp, Expr};

use super::{Dfa, DfaEdge, DfaState, Nfa};
use crate::ids::{ProtoId, StateId};

fn epsilon_closure(nfa: &Nfa, seed: &BTreeSet<u32>) -> BTreeSet<u32> {
    let mut closure = seed.clone();
    let mut stack: Vec<u32> = seed.iter().copied().collect();
    while let Some(s) = stack.pop() {
        for &eps in &nfa.states[s as usize].epsilons {
            if closure.insert(eps.0) {
                stack.push(eps.0);
            }
        }
    }
    closure
}

/// Merges two predicate guards for a symbol reached through more than one
/// NFA path: either path being satisfied is enough, so the combined guard
/// is their logical OR (`None` on either side already means "unconditional"
/// and absorbs the other).
fn merge_predicate(a: Option<Expr>, b: Option<Expr>) -> Option<Expr> {
    match (a, b) {
        (None, _) | (_, None) => None,
        (Some(x), Some(y)) if x == y => Some(x),
        (Some(x), Some(y)) => Some(Expr::Bin(BinOp::LOr, Box::new(x), Box::new(y))),
    }
}

pub fn determinize(nfa: &Nfa) -> Dfa {
    let mut dfa = Dfa::default();
    let mut set_to_state: HashMap<BTreeSet<u32>, StateId> = HashMap::new();
    let mut protos_of: HashMap<StateId, Vec<ProtoId>> = HashMap::new();

    let start_set = epsilon_closure(nfa, &BTreeSet::from([nfa.start.0]));
    let start_id = StateId(0);
    dfa.states.push(DfaState { id: start_id, protos: Vec::new(), accepting: is_accepting(nfa, &start_set), is_action: false });
    dfa.start = start_id;
    set_to_state.insert(start_set.clone(), start_id);

    let mut queue = VecDeque::new();
    queue.push_back(start_set);

    while let Some(current) = queue.pop_front() {
        let from_id = set_to_state[&current];
        // Group outgoing NFA transitions reachable from this subset by symbol.
        let mut by_symbol: HashMap<ProtoId, (BTreeSet<u32>, Option<Expr>, bool)> = HashMap::new();
        for &s in &current {
            for t in &nfa.states[s as usize].out {
                let entry = by_symbol.entry(t.symbol).or_insert_with(|| (BTreeSet::new(), None, false));
                entry.0.insert(t.to.0);
                entry.1 = merge_predicate(entry.1.take(), t.predicate.clone());
                entry.2 |= t.tunneled;
            }
        }

        for (symbol, (targets, predicate, tunneled)) in by_symbol {
            let closed = epsilon_closure(nfa, &targets);
            let to_id = *set_to_state.entry(closed.clone()).or_insert_with(|| {
                let id = StateId(dfa.states.len() as u32);
                dfa.states.push(DfaState {
                    id,
                    protos: Vec::new(),
                    accepting: is_accepting(nfa, &closed),
                    is_action: false,
                });
                queue.push_back(closed);
                id
            });
            protos_of.entry(to_id).or_default().push(symbol);
            dfa.add_edge(from_id, symbol, DfaEdge { to: to_id, predicate, tunneled });
        }
    }

    for (id, protos) in protos_of {
        let mut protos = protos;
        protos.sort_by_key(|p| p.0);
        protos.dedup();
        dfa.state_mut(id).protos = protos;
    }
    dfa
}

fn is_accepting(nfa: &Nfa, set: &BTreeSet<u32>) -> bool {
    set.iter().any(|&s| nfa.states[s as usize].accepting)
}
