//! Enter-SSA / exit-SSA: φ-node insertion at dominance
//! frontiers, stack-based renaming over the dominator tree (Cytron et al.),
//! and — after the fixed-point passes run — resolving φ-nodes back into
//! copies placed on predecessor edges.

use std::collections::{HashMap, HashSet};

use super::dominance::DomInfo;
use crate::cfg::Cfg;
use crate::ids::{BlockId, RegId};
use crate::mir::{MirArena, MirOp, MirStmt};

/// Registers defined in more than one block need a φ at the dominance
/// frontier of each defining block; single-definition registers are
/// already in SSA form and are left untouched.
fn multiply_defined(cfg: &Cfg) -> HashMap<RegId, HashSet<BlockId>> {
    let mut def_blocks: HashMap<RegId, HashSet<BlockId>> = HashMap::new();
    for block in cfg.blocks() {
        for stmt in &block.stmts {
            if let Some(reg) = stmt.defined_reg() {
                def_blocks.entry(reg).or_default().insert(block.id);
            }
        }
    }
    def_blocks.retain(|_, blocks| blocks.len() > 1);
    def_blocks
}

fn insert_phis(cfg: &mut Cfg, dom: &DomInfo, def_blocks: &HashMap<RegId, HashSet<BlockId>>) {
    for (&reg, def_sites) in def_blocks {
        let mut has_phi: HashSet<BlockId> = HashSet::new();
        let mut worklist: Vec<BlockId> = def_sites.iter().copied().collect();
        while let Some(b) = worklist.pop() {
            let Some(frontier) = dom.frontier.get(&b) else { continue };
            for &f in frontier {
                if has_phi.insert(f) {
                    let preds = cfg.block(f).pred.clone();
                    let sources = preds.into_iter().map(|p| (p, reg)).collect();
                    // Right after the block's leading label, so the φ reads
                    // as "the first thing this block does".
                    let insert_at = if matches!(cfg.block(f).stmts.first(), Some(MirStmt::Label(_))) { 1 } else { 0 };
                    cfg.block_mut(f).stmts.insert(insert_at, MirStmt::Phi { reg, sources });
                    worklist.push(f);
                }
            }
        }
    }
}

fn rename_expr(arena: &mut MirArena, id: crate::ids::MirId, stacks: &HashMap<RegId, Vec<RegId>>) {
    let (left, right, is_load) = {
        let node = arena.node(id);
        (node.left, node.right, matches!(node.op, MirOp::LoadReg(_)))
    };
    if is_load {
        if let MirOp::LoadReg(r) = arena.node(id).op {
            if let Some(top) = stacks.get(&r).and_then(|s| s.last()) {
                arena.node_mut(id).op = MirOp::LoadReg(*top);
            }
        }
    }
    if let Some(l) = left {
        rename_expr(arena, l, stacks);
    }
    if let Some(r) = right {
        rename_expr(arena, r, stacks);
    }
}

fn stmt_expr_id(stmt: &MirStmt) -> Option<crate::ids::MirId> {
    match stmt {
        MirStmt::StReg { expr, .. } => Some(*expr),
        MirStmt::CondJump { cond, .. } => Some(*cond),
        MirStmt::Switch { selector, .. } => Some(*selector),
        MirStmt::CoprocOut { expr, .. } => Some(*expr),
        _ => None,
    }
}

fn rename_block(
    cfg: &mut Cfg,
    arena: &mut MirArena,
    dom: &DomInfo,
    block: BlockId,
    stacks: &mut HashMap<RegId, Vec<RegId>>,
    next_version: &mut u32,
) {
    let mut pushed = Vec::new();
    let stmt_count = cfg.block(block).stmts.len();
    for i in 0..stmt_count {
        let is_phi = matches!(cfg.block(block).stmts[i], MirStmt::Phi { .. });
        if !is_phi {
            if let Some(expr_id) = stmt_expr_id(&cfg.block(block).stmts[i]) {
                rename_expr(arena, expr_id, stacks);
            }
            // CoprocIn / FieldInfoStore read registers directly rather than
            // through an arena expression; rename those uses too.
            match &mut cfg.block_mut(block).stmts[i] {
                MirStmt::FieldInfoStore { offset_reg, len_reg, instance_reg, .. } => {
                    if let Some(top) = stacks.get(offset_reg).and_then(|s| s.last()) {
                        *offset_reg = *top;
                    }
                    if let Some(top) = stacks.get(len_reg).and_then(|s| s.last()) {
                        *len_reg = *top;
                    }
                    if let Some(r) = instance_reg {
                        if let Some(top) = stacks.get(r).and_then(|s| s.last()) {
                            *r = *top;
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(base) = cfg.block(block).stmts[i].defined_reg() {
            let fresh = RegId(u32::MAX / 2 + *next_version);
            *next_version += 1;
            stacks.entry(base).or_default().push(fresh);
            pushed.push(base);
            *cfg.block_mut(block).stmts[i].defined_reg_mut().unwrap() = fresh;
        }
    }

    for succ in cfg.block(block).succ.clone() {
        for stmt in cfg.block_mut(succ).stmts.iter_mut() {
            if let MirStmt::Phi { reg, sources } = stmt {
                for (pred, src_reg) in sources.iter_mut() {
                    if *pred == block {
                        if let Some(top) = stacks.get(reg).and_then(|s| s.last()) {
                            *src_reg = *top;
                        }
                    }
                }
            }
        }
    }

    if let Some(children) = dom.children.get(&block).cloned() {
        for child in children {
            rename_block(cfg, arena, dom, child, stacks, next_version);
        }
    }

    for base in pushed {
        stacks.get_mut(&base).unwrap().pop();
    }
}

pub fn enter_ssa(cfg: &mut Cfg, arena: &mut MirArena, dom: &DomInfo) {
    let def_blocks = multiply_defined(cfg);
    insert_phis(cfg, dom, &def_blocks);
    let mut stacks = HashMap::new();
    let mut next_version = 0u32;
    rename_block(cfg, arena, dom, cfg.entry, &mut stacks, &mut next_version);
}

/// Resolves every remaining `Phi` into a copy appended to the matching
/// predecessor block, relying on edge-split having already guaranteed that
/// block has no other successor to be confused with.
pub fn exit_ssa(cfg: &mut Cfg, arena: &mut MirArena) {
    let mut copies: Vec<(BlockId, RegId, RegId)> = Vec::new();
    for block in cfg.blocks() {
        for stmt in &block.stmts {
            if let MirStmt::Phi { reg, sources } = stmt {
                for &(pred, src) in sources {
                    copies.push((pred, *reg, src));
                }
            }
        }
    }
    for (pred, dest, src) in copies {
        let expr = arena.alloc(MirOp::LoadReg(src), None, None, None);
        let stmts = &mut cfg.block_mut(pred).stmts;
        let insert_at = stmts.iter().position(|s| s.is_terminator()).unwrap_or(stmts.len());
        stmts.insert(insert_at, MirStmt::StReg { reg: dest, expr, side_effecting: false });
    }
    for block in &mut cfg.blocks {
        block.stmts.retain(|s| !matches!(s, MirStmt::Phi { .. }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::{LabelId, RegId};
    use crate::optimiser::dominance;

    /// entry branches into two arms that both define r0, then join: enter_ssa
    /// must place exactly one φ at the join, and exit_ssa must resolve it
    /// into a copy on each incoming edge without leaving a Phi behind.
    #[test]
    fn a_diamond_with_conflicting_definitions_gets_one_phi_that_exit_ssa_resolves() {
        let mut arena = MirArena::new();
        let (entry, left, right, join) = (LabelId(0), LabelId(1), LabelId(2), LabelId(3));
        let cond = arena.alloc(MirOp::Const, None, None, Some(1));
        let one = arena.alloc(MirOp::Const, None, None, Some(1));
        let two = arena.alloc(MirOp::Const, None, None, Some(2));
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::CondJump { cond, true_label: left, false_label: right },
            MirStmt::Label(left),
            MirStmt::StReg { reg: RegId(0), expr: one, side_effecting: false },
            MirStmt::Jump(join),
            MirStmt::Label(right),
            MirStmt::StReg { reg: RegId(0), expr: two, side_effecting: false },
            MirStmt::Jump(join),
            MirStmt::Label(join),
        ];
        let mut built = cfg::build(&code, entry);
        let dom = dominance::compute(&built);
        enter_ssa(&mut built, &mut arena, &dom);

        let join_id = built.block_of_label(join).unwrap();
        let phi_count = built.block(join_id).stmts.iter().filter(|s| matches!(s, MirStmt::Phi { .. })).count();
        assert_eq!(phi_count, 1);

        exit_ssa(&mut built, &mut arena);
        for block in built.blocks() {
            assert!(!block.stmts.iter().any(|s| matches!(s, MirStmt::Phi { .. })));
        }
        let left_id = built.block_of_label(left).unwrap();
        let right_id = built.block_of_label(right).unwrap();
        assert!(built.block(left_id).stmts.iter().any(|s| matches!(s, MirStmt::StReg { side_effecting: false, .. })));
        assert!(built.block(right_id).stmts.iter().any(|s| matches!(s, MirStmt::StReg { side_effecting: false, .. })));
    }
}
