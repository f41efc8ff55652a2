//! Register mapping: after exit-SSA the live register ids are
//! a sparse mix of the lowering pass's numbered namespaces and the SSA
//! renaming pass's high range; this pass walks the CFG in source order and
//! assigns each one a dense id starting at zero, in first-use order, so the
//! emitter can size its register file exactly.

use std::collections::{HashMap, HashSet};

use crate::cfg::Cfg;
use crate::ids::{MirId, RegId};
use crate::mir::{MirArena, MirOp, MirStmt};

fn remap_expr(arena: &mut MirArena, id: MirId, map: &HashMap<RegId, RegId>) {
    let (left, right, op) = {
        let n = arena.node(id);
        (n.left, n.right, n.op)
    };
    if let MirOp::LoadReg(r) = op {
        if let Some(&mapped) = map.get(&r) {
            arena.node_mut(id).op = MirOp::LoadReg(mapped);
        }
    }
    if let Some(l) = left {
        remap_expr(arena, l, map);
    }
    if let Some(r) = right {
        remap_expr(arena, r, map);
    }
}

/// Builds the dense mapping, skipping any register in `ignored` (left at
/// its original id, for callers who pin well-known registers like the
/// lowering pass's `REG_CURRENT_OFFSET`/`REG_LAST_LAYER` to stable slots).
pub fn compute_mapping(cfg: &Cfg, arena: &MirArena, ignored: &HashSet<RegId>) -> HashMap<RegId, RegId> {
    let mut map = HashMap::new();
    let mut next = 0u32;
    for block in cfg.blocks() {
        for stmt in &block.stmts {
            if let Some(reg) = stmt.defined_reg() {
                if !ignored.contains(&reg) && !map.contains_key(&reg) {
                    map.insert(reg, RegId(next));
                    next += 1;
                }
            }
            for id in stmt.expr_ids() {
                collect_loads(arena, id, ignored, &mut map, &mut next);
            }
            if let MirStmt::FieldInfoStore { offset_reg, len_reg, instance_reg, .. } = stmt {
                for r in [Some(*offset_reg), Some(*len_reg), *instance_reg].into_iter().flatten() {
                    if !ignored.contains(&r) && !map.contains_key(&r) {
                        map.insert(r, RegId(next));
                        next += 1;
                    }
                }
            }
        }
    }
    map
}

fn collect_loads(arena: &MirArena, id: MirId, ignored: &HashSet<RegId>, map: &mut HashMap<RegId, RegId>, next: &mut u32) {
    let n = arena.node(id);
    if let MirOp::LoadReg(r) = n.op {
        if !ignored.contains(&r) && !map.contains_key(&r) {
            map.insert(r, RegId(*next));
            *next += 1;
        }
    }
    if let Some(l) = n.left {
        collect_loads(arena, l, ignored, map, next);
    }
    if let Some(r) = n.right {
        collect_loads(arena, r, ignored, map, next);
    }
}

pub fn apply_mapping(cfg: &mut Cfg, arena: &mut MirArena, map: &HashMap<RegId, RegId>) {
    for block in &mut cfg.blocks {
        for stmt in &mut block.stmts {
            for id in stmt.expr_ids() {
                remap_expr(arena, id, map);
            }
            if let Some(reg) = stmt.defined_reg_mut() {
                if let Some(&mapped) = map.get(reg) {
                    *reg = mapped;
                }
            }
            if let MirStmt::FieldInfoStore { offset_reg, len_reg, instance_reg, .. } = stmt {
                if let Some(&m) = map.get(offset_reg) {
                    *offset_reg = m;
                }
                if let Some(&m) = map.get(len_reg) {
                    *len_reg = m;
                }
                if let Some(r) = instance_reg {
                    if let Some(&m) = map.get(r) {
                        *r = m;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::LabelId;

    #[test]
    fn registers_are_renumbered_densely_from_zero_in_first_use_order() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let c = arena.alloc(MirOp::Const, None, None, Some(1));
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(40), expr: c, side_effecting: false },
            MirStmt::StReg { reg: RegId(7), expr: c, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let map = compute_mapping(&built, &arena, &HashSet::new());
        assert_eq!(map[&RegId(40)], RegId(0));
        assert_eq!(map[&RegId(7)], RegId(1));
        apply_mapping(&mut built, &mut arena, &map);
        let stmts = &built.block(built.entry).stmts;
        assert!(matches!(stmts[0], MirStmt::StReg { reg: RegId(0), .. }));
        assert!(matches!(stmts[1], MirStmt::StReg { reg: RegId(1), .. }));
    }

    #[test]
    fn ignored_registers_are_left_at_their_original_id() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let c = arena.alloc(MirOp::Const, None, None, Some(1));
        let code = vec![MirStmt::Label(entry), MirStmt::StReg { reg: RegId(99), expr: c, side_effecting: false }];
        let built = cfg::build(&code, entry);
        let mut ignored = HashSet::new();
        ignored.insert(RegId(99));
        let map = compute_mapping(&built, &arena, &ignored);
        assert!(!map.contains_key(&RegId(99)));
    }
}
