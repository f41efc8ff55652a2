//! `CompilationUnit`: the single-threaded, non-reentrant driver that owns
//! one filter's transient IR for the life of a `compile()` call. The
//! `GlobalSymbols`/`EncapGraph` pair it's built from may be shared (by
//! shared reference) across many concurrently-running units; nothing here
//! mutates either.

use std::collections::HashSet;

use pflc_types::ParsedFilter;

use crate::cfg::{self, Cfg};
use crate::error::{ErrorRecorder, Fatal};
use crate::frontend::{self, CompiledFilter};
use crate::graph::EncapGraph;
use crate::ids::RegId;
use crate::lowering::{self, LoweredProgram};
use crate::mir::MirArena;
use crate::optimiser::{self, PassStats};
use crate::symtab::{GlobalSymbols, LocalSymbols};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    Success,
    Warning,
    Failure,
}

/// Everything a successful `compile()` leaves behind: the optimised CFG, the
/// arena it still references, and whatever diagnostics were non-fatal.
pub struct CompileResult {
    pub outcome: CompileOutcome,
    pub cfg: Option<Cfg>,
    pub arena: Option<MirArena>,
    pub local: LocalSymbols,
    pub recorder: ErrorRecorder,
    pub stats: Option<PassStats>,
}

/// Owns one filter's compile. Built against a `GlobalSymbols`/`EncapGraph`
/// pair that may outlive it and be shared with other units; every other
/// allocation here (labels, temporaries, the MIR arena, the CFG) is dropped
/// with the unit.
pub struct CompilationUnit<'g> {
    global: &'g GlobalSymbols,
    graph: &'g EncapGraph,
}

impl<'g> CompilationUnit<'g> {
    pub fn new(global: &'g GlobalSymbols, graph: &'g EncapGraph) -> Self {
        CompilationUnit { global, graph }
    }

    /// `CompileFilter(filterText, optimise)`: the filter has already been
    /// parsed into a `ParsedFilter` by the (external) filter-language
    /// parser — this crate's contract with that collaborator is the tree
    /// shape, not the surface syntax it was read from.
    pub fn compile(&self, filter: &ParsedFilter, optimise: bool) -> CompileResult {
        let mut recorder = ErrorRecorder::new();
        let mut local = LocalSymbols::new();

        let compiled = match frontend::build(filter, self.global, self.graph, &mut local, &mut recorder) {
            Ok(c) => c,
            Err(_) => {
                return CompileResult {
                    outcome: CompileOutcome::Failure,
                    cfg: None,
                    arena: None,
                    local,
                    recorder,
                    stats: None,
                }
            }
        };

        if recorder.has_blocking() {
            return CompileResult { outcome: CompileOutcome::Failure, cfg: None, arena: None, local, recorder, stats: None };
        }

        let LoweredProgram { mut arena, code, entry, .. } = lowering::lower(&compiled, self.global, &mut local, &mut recorder);
        let mut built = cfg::build(&code, entry);

        let stats = if optimise {
            let ignored: HashSet<RegId> = lowering::pinned_registers().into_iter().collect();
            Some(optimiser::optimise(&mut built, &mut arena, &mut local, &ignored))
        } else {
            None
        };

        let outcome = if recorder.is_empty() { CompileOutcome::Success } else { CompileOutcome::Warning };
        CompileResult { outcome, cfg: Some(built), arena: Some(arena), local, recorder, stats }
    }

    /// `CheckFilter(filterText)`: syntax/front-end validity only, no
    /// lowering or optimisation. Since parsing happens upstream of this
    /// crate, "check" here means "the front-end accepts this tree without a
    /// blocking diagnostic".
    pub fn check(&self, filter: &ParsedFilter) -> bool {
        let mut recorder = ErrorRecorder::new();
        let mut local = LocalSymbols::new();
        match frontend::build(filter, self.global, self.graph, &mut local, &mut recorder) {
            Ok(_) => !recorder.has_blocking(),
            Err(_) => false,
        }
    }

    /// `CreateAutomatonFromFilter(filterText)`: builds and exposes just the
    /// DFA, for offline inspection tooling.
    pub fn automaton(&self, filter: &ParsedFilter) -> Result<CompiledFilter, Fatal> {
        let mut recorder = ErrorRecorder::new();
        let mut local = LocalSymbols::new();
        frontend::build(filter, self.global, self.graph, &mut local, &mut recorder)
    }

}

/// `GetNetILFilter()`: renders a successful compile's CFG to the VM's text
/// bytecode format. Returns `None` if the compile didn't succeed or wasn't
/// run with a CFG attached (e.g. a failed `compile()`).
pub fn get_netil_filter(result: &CompileResult) -> Option<String> {
    let (cfg, arena) = (result.cfg.as_ref()?, result.arena.as_ref()?);
    Some(crate::emitter::emit(cfg, arena, &result.local))
}

/// `DumpCFG(out, graphOnly, netIL)`: a plain-text block-by-block rendering
/// for debugging, independent of the emitter's instruction-level format.
pub fn dump_cfg(result: &CompileResult) -> String {
    let Some(cfg) = result.cfg.as_ref() else { return String::new() };
    let mut out = String::new();
    for block in cfg.blocks() {
        out.push_str(&format!("block {} (label {:?}):\n", block.id.0, block.label.map(|l| l.0)));
        out.push_str(&format!("  succ: {:?}\n", block.succ.iter().map(|b| b.0).collect::<Vec<_>>()));
        out.push_str(&format!("  pred: {:?}\n", block.pred.iter().map(|b| b.0).collect::<Vec<_>>()));
        out.push_str(&format!("  {} statements\n", block.stmts.len()));
    }
    out
}

/// `PrintFinalAutomaton(path)`: a terse DFA dump (one line per state,
/// listing its owning protocol(s) and outgoing symbols), for offline
/// inspection tooling rather than bytecode production.
pub fn print_automaton(compiled: &CompiledFilter) -> String {
    let mut out = String::new();
    for state in &compiled.dfa.states {
        out.push_str(&format!(
            "state {} protos={:?} accepting={} action={}\n",
            state.id.0, state.protos.iter().map(|p| p.0).collect::<Vec<_>>(), state.accepting, state.is_action
        ));
        for &symbol in &compiled.alphabet {
            for edge in compiled.dfa.edges_for(state.id, symbol) {
                out.push_str(&format!("  on {} -> {} (tunneled={})\n", symbol.0, edge.to.0, edge.tunneled));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::sample_database;
    use pflc_types::ParsedFilter;

    fn setup() -> (GlobalSymbols, EncapGraph) {
        crate::testsupport::init_test_logging();
        let mut recorder = ErrorRecorder::new();
        let global = GlobalSymbols::from_database(sample_database(), &mut recorder).unwrap();
        let graph = EncapGraph::build(&global).unwrap();
        (global, graph)
    }

    #[test]
    fn trivial_accept_compiles_and_emits_send_1() {
        let (global, graph) = setup();
        let unit = CompilationUnit::new(&global, &graph);
        let result = unit.compile(&ParsedFilter { expr: None, actions: vec![] }, true);
        assert_eq!(result.outcome, CompileOutcome::Success);
        let netil = get_netil_filter(&result).unwrap();
        assert!(netil.contains("SEND 1"));
        assert!(netil.contains("RET"));
    }

    #[test]
    fn check_accepts_the_empty_filter() {
        let (global, graph) = setup();
        let unit = CompilationUnit::new(&global, &graph);
        assert!(unit.check(&ParsedFilter { expr: None, actions: vec![] }));
    }
}
