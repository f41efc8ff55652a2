//! Edge-split: every critical edge (predecessor has more than
//! one successor, successor has more than one predecessor) gets an empty
//! block inserted on it. Required before exit-SSA can place φ-resolving
//! copies unambiguously on a predecessor edge.

use crate::cfg::{BasicBlock, Cfg};
use crate::ids::{BlockId, LabelId};
use crate::mir::MirStmt;
use crate::symtab::LocalSymbols;

fn retarget(stmt: &mut MirStmt, from: LabelId, to: LabelId) {
    match stmt {
        MirStmt::Jump(l) => {
            if *l == from {
                *l = to;
            }
        }
        MirStmt::CondJump { true_label, false_label, .. } => {
            if *true_label == from {
                *true_label = to;
            }
            if *false_label == from {
                *false_label = to;
            }
        }
        MirStmt::Switch { cases, default, .. } => {
            for (_, l) in cases.iter_mut() {
                if *l == from {
                    *l = to;
                }
            }
            if *default == from {
                *default = to;
            }
        }
        _ => {}
    }
}

pub fn split_critical_edges(cfg: &mut Cfg, local: &mut LocalSymbols) -> bool {
    let critical: Vec<(BlockId, BlockId)> = cfg
        .blocks()
        .iter()
        .flat_map(|b| b.succ.iter().map(move |&s| (b.id, s)))
        .filter(|&(p, s)| cfg.block(p).succ.len() > 1 && cfg.block(s).pred.len() > 1)
        .collect();
    if critical.is_empty() {
        return false;
    }

    for (p, s) in critical {
        let Some(s_label) = cfg.block(s).label else { continue };
        let new_label = local.new_code_label("split");
        let new_id = BlockId(cfg.blocks.len() as u32);
        cfg.blocks.push(BasicBlock {
            id: new_id,
            label: Some(new_label),
            stmts: vec![MirStmt::Label(new_label), MirStmt::Jump(s_label)],
            succ: vec![s],
            pred: vec![p],
        });
        retarget(cfg.block_mut(p).stmts.last_mut().unwrap(), s_label, new_label);
        if let Some(pos) = cfg.block_mut(p).succ.iter().position(|&x| x == s) {
            cfg.block_mut(p).succ[pos] = new_id;
        }
        if let Some(pos) = cfg.block_mut(s).pred.iter().position(|&x| x == p) {
            cfg.block_mut(s).pred[pos] = new_id;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::LabelId;
    use crate::mir::{MirArena, MirOp};

    /// Two branches both landing on a join that also has a third, unrelated
    /// predecessor makes both branch->join edges critical.
    #[test]
    fn a_critical_edge_gets_a_split_block_inserted() {
        let mut arena = MirArena::new();
        let (entry, left, right, third, join) = (LabelId(0), LabelId(1), LabelId(2), LabelId(3), LabelId(4));
        let cond = arena.alloc(MirOp::Const, None, None, Some(1));
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::CondJump { cond, true_label: left, false_label: right },
            MirStmt::Label(left),
            MirStmt::Jump(join),
            MirStmt::Label(right),
            MirStmt::CondJump { cond, true_label: join, false_label: third },
            MirStmt::Label(third),
            MirStmt::Jump(join),
            MirStmt::Label(join),
        ];
        let mut built = cfg::build(&code, entry);
        let mut local = LocalSymbols::new();
        let before = built.blocks().len();
        assert!(split_critical_edges(&mut built, &mut local));
        assert!(built.blocks().len() > before);
        assert!(!split_critical_edges(&mut built, &mut local), "no critical edges should remain after one pass");
    }
}
