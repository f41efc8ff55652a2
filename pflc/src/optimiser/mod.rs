//! Optimiser (component I): edge-split, dominance, enter-SSA, a fixed-point
//! rewrite loop, exit-SSA, copy cleanup, and register mapping, run in that
//! order over one [`Cfg`]/[`MirArena`] pair per compiled filter.

pub mod bb_elim;
pub mod dce;
pub mod dominance;
pub mod edge_split;
pub mod folding;
pub mod propagation;
pub mod reassociation;
pub mod regalloc;
pub mod ssa;

use std::collections::HashSet;

use crate::cfg::Cfg;
use crate::ids::RegId;
use crate::mir::{MirArena, MirOp, MirStmt};
use crate::symtab::LocalSymbols;

/// One pass's report to the driver: whether it changed anything, and how
/// many rewrite events it performed (exposed for regression tests that pin
/// down how aggressively the optimiser is allowed to run).
#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub propagation: u32,
    pub folding: u32,
    pub dce: u32,
    pub reassociation: u32,
    pub bb_elim: u32,
    pub rounds: u32,
}

/// Folds a chain of `mov rN, rN` and `mov rA, rB; mov rC, rA`-style copies
/// left behind once exit-SSA has placed its predecessor-edge copies, and
/// drops any copy whose source and destination end up identical.
fn fold_and_kill_redundant_copies(cfg: &mut Cfg, arena: &mut MirArena) {
    loop {
        let mut alias: std::collections::HashMap<RegId, RegId> = std::collections::HashMap::new();
        for block in cfg.blocks() {
            for stmt in &block.stmts {
                if let MirStmt::StReg { reg, expr, side_effecting: false } = stmt {
                    if let MirOp::LoadReg(src) = arena.node(*expr).op {
                        alias.insert(*reg, src);
                    }
                }
            }
        }
        let mut changed = false;
        for block in &mut cfg.blocks {
            block.stmts.retain(|stmt| {
                if let MirStmt::StReg { reg, expr, side_effecting: false } = stmt {
                    if let MirOp::LoadReg(src) = arena.node(*expr).op {
                        if src == *reg {
                            changed = true;
                            return false;
                        }
                    }
                }
                true
            });
        }
        if !changed {
            break;
        }
    }
}

/// Runs the full pipeline in place. `ignored_regs` is passed straight to
/// register mapping; the lowering pass's well-known registers
/// (`REG_CURRENT_OFFSET`, `REG_LAST_LAYER`) are pinned this way so the
/// emitter can always find them at a fixed slot.
pub fn optimise(cfg: &mut Cfg, arena: &mut MirArena, local: &mut LocalSymbols, ignored_regs: &HashSet<RegId>) -> PassStats {
    let mut stats = PassStats::default();

    while edge_split::split_critical_edges(cfg, local) {}
    let dom = dominance::compute(cfg);
    ssa::enter_ssa(cfg, arena, &dom);

    let mut propagation = propagation::Propagation::new();
    let mut folding = folding::Folding::new();
    let mut dce = dce::Dce::new();
    let mut reassociation = reassociation::Reassociation::new();
    let mut bb_elim = bb_elim::BasicBlockElim::new();

    loop {
        let mut changed = false;
        changed |= propagation.run(cfg, arena);
        changed |= folding.run(cfg, arena);
        changed |= dce.run(cfg, arena);
        changed |= reassociation.run(cfg, arena);
        changed |= bb_elim.run(cfg);
        stats.rounds += 1;
        log::trace!(
            "fixed-point round {}: propagation={} folding={} dce={} reassociation={} bb_elim={}",
            stats.rounds,
            propagation.modified_count(),
            folding.modified_count(),
            dce.modified_count(),
            reassociation.modified_count(),
            bb_elim.modified_count(),
        );
        if !changed {
            break;
        }
    }
    stats.propagation = propagation.modified_count();
    stats.folding = folding.modified_count();
    stats.dce = dce.modified_count();
    stats.reassociation = reassociation.modified_count();
    stats.bb_elim = bb_elim.modified_count();

    ssa::exit_ssa(cfg, arena);
    fold_and_kill_redundant_copies(cfg, arena);

    let map = regalloc::compute_mapping(cfg, arena, ignored_regs);
    regalloc::apply_mapping(cfg, arena, &map);

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::LabelId;
    use crate::mir::MirOp;
    use crate::symtab::LocalSymbols;

    #[test]
    fn a_constant_branch_and_a_dead_store_are_cleaned_up_end_to_end() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let unused = arena.alloc(MirOp::Const, None, None, Some(9));
        let three = arena.alloc(MirOp::Const, None, None, Some(3));
        let zero = arena.alloc(MirOp::Const, None, None, Some(0));
        let sum = arena.alloc(MirOp::Bin(pflc_types::BinOp::AddI), Some(three), Some(zero), None);
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(5), expr: unused, side_effecting: false },
            MirStmt::StReg { reg: RegId(6), expr: sum, side_effecting: true },
        ];
        let mut built = cfg::build(&code, entry);
        let mut local = LocalSymbols::new();
        let stats = optimise(&mut built, &mut arena, &mut local, &HashSet::new());
        assert!(stats.rounds >= 1);
        let all_stmts: Vec<&MirStmt> = built.blocks().iter().flat_map(|b| &b.stmts).collect();
        assert!(!all_stmts.iter().any(|s| matches!(s, MirStmt::StReg { reg: RegId(5), .. })));
        assert!(all_stmts.iter().any(|s| matches!(s, MirStmt::StReg { side_effecting: true, .. })));
    }
}
