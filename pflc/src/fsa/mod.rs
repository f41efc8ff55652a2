//! Finite-State Automaton (component E): an NFA built by Thompson-style
//! construction over protocol-set sequences, determinised into a DFA whose
//! transitions carry optional field predicates ("extended transitions").
//!
//! The alphabet is the protocol alphabet of the encapsulation graph rather
//! than characters: a transition fires on "the next protocol parsed is
//! `to`", guarded by an optional predicate over that protocol's fields.

mod boolean;
mod build;
mod determinize;
pub mod extended;

pub use boolean::{and, complete, minimize, negate, or};
pub use build::build_term;
pub use determinize::determinize;

use std::collections::HashMap;

use pflc_types::Expr;

use crate::ids::{ProtoId, StateId};

#[derive(Debug, Clone)]
pub struct NfaTransition {
    pub to: StateId,
    pub symbol: ProtoId,
    pub predicate: Option<Expr>,
    pub tunneled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NfaState {
    pub epsilons: Vec<StateId>,
    pub out: Vec<NfaTransition>,
    pub accepting: bool,
}

/// An epsilon-NFA over the protocol alphabet, one fragment per filter term.
#[derive(Debug, Default)]
pub struct Nfa {
    pub states: Vec<NfaState>,
    pub start: StateId,
}

impl Nfa {
    pub fn new() -> Self {
        let mut nfa = Nfa::default();
        nfa.start = nfa.new_state();
        nfa
    }

    pub fn new_state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(NfaState::default());
        id
    }

    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.states[from.index()].epsilons.push(to);
    }

    pub fn add_transition(&mut self, from: StateId, t: NfaTransition) {
        self.states[from.index()].out.push(t);
    }
}

/// One extended-transition guard attached to a DFA edge: the protocol match
/// itself is the edge's key, this is the refinement tested once that
/// protocol is reached. `None` is an unconditional ("catch-all") edge.
#[derive(Debug, Clone)]
pub struct DfaEdge {
    pub to: StateId,
    pub predicate: Option<Expr>,
    pub tunneled: bool,
}

#[derive(Debug, Clone)]
pub struct DfaState {
    pub id: StateId,
    /// `Info`: the single protocol this state represents, or `None` when
    /// several protocols converged here during determinisation or boolean
    /// composition, a "multi-proto" state.
    pub protos: Vec<ProtoId>,
    pub accepting: bool,
    /// Whether extraction code should run when this state is reached.
    pub is_action: bool,
}

impl DfaState {
    pub fn single_proto(&self) -> Option<ProtoId> {
        match self.protos.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Deterministic: for a given state and protocol symbol, `edges_for` returns
/// an ordered guard list tested in order, the way an extended-transition
/// decision tree tests its internal nodes in sequence, first match wins. At
/// most one edge in that list is unconditional, and it is always last.
#[derive(Debug, Default)]
pub struct Dfa {
    pub states: Vec<DfaState>,
    pub start: StateId,
    transitions: HashMap<(StateId, ProtoId), Vec<DfaEdge>>,
}

impl Dfa {
    pub fn edges_for(&self, from: StateId, symbol: ProtoId) -> &[DfaEdge] {
        self.transitions.get(&(from, symbol)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_edge(&mut self, from: StateId, symbol: ProtoId, edge: DfaEdge) {
        self.transitions.entry((from, symbol)).or_default().push(edge);
    }

    pub fn symbols_from(&self, from: StateId) -> impl Iterator<Item = ProtoId> + '_ {
        self.transitions.keys().filter(move |(s, _)| *s == from).map(|(_, sym)| *sym)
    }

    pub fn state(&self, id: StateId) -> &DfaState {
        &self.states[id.index()]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut DfaState {
        &mut self.states[id.index()]
    }
}
