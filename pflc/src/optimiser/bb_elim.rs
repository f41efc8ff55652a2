//! Basic-block elimination: collapses jump-to-jump chains by retargeting
//! every jump aimed at a pass-through block (one whose body is just
//! `Label; Jump(target)`) straight to `target`, then recomputes
//! successor/predecessor edges from the rewritten terminators.
//!
//! Blocks are never removed from the CFG's backing vector here — `BlockId`
//! is a vector index elsewhere in the optimiser, so compacting the vector
//! would invalidate every other block's id. A block left with no predecessor
//! after this pass is simply dead weight the emitter's reachability walk
//! skips over.

use std::collections::HashMap;

use crate::cfg::Cfg;
use crate::ids::LabelId;
use crate::mir::MirStmt;

fn retarget(stmt: &mut MirStmt, rewrite: &HashMap<LabelId, LabelId>) -> bool {
    let mut changed = false;
    match stmt {
        MirStmt::Jump(l) => {
            if let Some(&t) = rewrite.get(l) {
                *l = t;
                changed = true;
            }
        }
        MirStmt::CondJump { true_label, false_label, .. } => {
            if let Some(&t) = rewrite.get(true_label) {
                *true_label = t;
                changed = true;
            }
            if let Some(&t) = rewrite.get(false_label) {
                *false_label = t;
                changed = true;
            }
        }
        MirStmt::Switch { cases, default, .. } => {
            for (_, l) in cases.iter_mut() {
                if let Some(&t) = rewrite.get(l) {
                    *l = t;
                    changed = true;
                }
            }
            if let Some(&t) = rewrite.get(default) {
                *default = t;
                changed = true;
            }
        }
        _ => {}
    }
    changed
}

/// A block whose body is exactly `Label; Jump(target)` is a pass-through:
/// every jump aimed at its label can be retargeted straight to `target`.
/// Chains (`a -> b -> c`) are chased to their final destination.
fn pass_through_targets(cfg: &Cfg) -> HashMap<LabelId, LabelId> {
    let mut rewrite = HashMap::new();
    for block in cfg.blocks() {
        let Some(label) = block.label else { continue };
        let body: Vec<&MirStmt> = block.stmts.iter().filter(|s| !matches!(s, MirStmt::Label(_))).collect();
        if let [MirStmt::Jump(target)] = body[..] {
            if *target != label {
                rewrite.insert(label, *target);
            }
        }
    }
    let keys: Vec<LabelId> = rewrite.keys().copied().collect();
    for k in keys {
        let mut target = rewrite[&k];
        let mut guard = 0;
        while let Some(&next) = rewrite.get(&target) {
            if next == target || guard > rewrite.len() {
                break;
            }
            target = next;
            guard += 1;
        }
        rewrite.insert(k, target);
    }
    rewrite
}

fn rebuild_edges(cfg: &mut Cfg) {
    for block in &mut cfg.blocks {
        block.succ.clear();
        block.pred.clear();
    }
    let targets: Vec<(usize, Vec<LabelId>)> =
        cfg.blocks().iter().enumerate().map(|(i, b)| (i, b.stmts.last().map(|s| s.label_targets()).unwrap_or_default())).collect();
    for (idx, labels) in &targets {
        let mut succ: Vec<_> = labels.iter().filter_map(|l| cfg.block_of_label(*l)).collect();
        if succ.is_empty() {
            // Falls through.
            if let Some(next) = cfg.blocks().get(idx + 1) {
                succ.push(next.id);
            }
        }
        succ.sort_by_key(|b| b.0);
        succ.dedup();
        cfg.blocks[*idx].succ = succ;
    }
    for idx in 0..cfg.blocks.len() {
        let id = cfg.blocks[idx].id;
        let succs = cfg.blocks[idx].succ.clone();
        for s in succs {
            cfg.block_mut(s).pred.push(id);
        }
    }
}

#[derive(Debug, Default)]
pub struct BasicBlockElim {
    modified: u32,
}

impl BasicBlockElim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        "bb_elim"
    }

    pub fn modified_count(&self) -> u32 {
        self.modified
    }

    pub fn run(&mut self, cfg: &mut Cfg) -> bool {
        let rewrite = pass_through_targets(cfg);
        if rewrite.is_empty() {
            return false;
        }
        let mut changed = false;
        for block in &mut cfg.blocks {
            for stmt in &mut block.stmts {
                changed |= retarget(stmt, &rewrite);
            }
        }
        if changed {
            rebuild_edges(cfg);
            self.modified += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::RegId;
    use crate::mir::{MirArena, MirOp};

    #[test]
    fn a_jump_to_a_pass_through_block_is_retargeted_to_its_final_destination() {
        let mut arena = MirArena::new();
        let (l0, l1, l2, l3) = (LabelId(0), LabelId(1), LabelId(2), LabelId(3));
        let cond = arena.alloc(MirOp::Const, None, None, Some(1));
        let marker = arena.alloc(MirOp::Const, None, None, Some(42));
        let code = vec![
            MirStmt::Label(l0),
            MirStmt::CondJump { cond, true_label: l1, false_label: l2 },
            MirStmt::Label(l1),
            MirStmt::Jump(l2),
            MirStmt::Label(l2),
            MirStmt::StReg { reg: RegId(0), expr: marker, side_effecting: false },
            MirStmt::Jump(l3),
            MirStmt::Label(l3),
        ];
        let mut built = cfg::build(&code, l0);
        let mut pass = BasicBlockElim::new();
        assert!(pass.run(&mut built));
        let entry_block = built.block(built.entry);
        match entry_block.stmts.last().unwrap() {
            MirStmt::CondJump { true_label, false_label, .. } => {
                assert_eq!(*true_label, l2);
                assert_eq!(*false_label, l2);
            }
            other => panic!("expected a retargeted CondJump, got {other:?}"),
        }
        assert!(!pass.run(&mut built), "a second pass over an already-collapsed CFG should be a no-op");
    }
}
