//! Reassociation and redistribution: a single-use register's defining expression is
//! substituted directly at its one use site, and a substitution-exposed
//! `(x + c1) + c2` chain collapses to `x + (c1+c2)`.
//!
//! A defining expression may only be substituted while the memory state it
//! was computed under is still current; a coprocessor call invalidates
//! every recorded definition rather than tracking per-field provenance,
//! which is conservative but keeps the pass a single linear block walk.

use std::collections::HashMap;

use pflc_types::BinOp;

use crate::cfg::Cfg;
use crate::ids::{MirId, RegId};
use crate::mir::{MirArena, MirOp, MirStmt};

fn count_loads(arena: &MirArena, id: MirId, reg: RegId, count: &mut u32) {
    let n = arena.node(id);
    if let MirOp::LoadReg(r) = n.op {
        if r == reg {
            *count += 1;
        }
    }
    if let Some(l) = n.left {
        count_loads(arena, l, reg, count);
    }
    if let Some(r) = n.right {
        count_loads(arena, r, reg, count);
    }
}

fn total_uses(cfg: &Cfg, arena: &MirArena, reg: RegId) -> u32 {
    let mut n = 0;
    for block in cfg.blocks() {
        for stmt in &block.stmts {
            for id in stmt.expr_ids() {
                count_loads(arena, id, reg, &mut n);
            }
        }
    }
    n
}

fn substitute(arena: &mut MirArena, id: MirId, reg: RegId, def: MirId) -> bool {
    let (left, right, op) = {
        let n = arena.node(id);
        (n.left, n.right, n.op)
    };
    if let MirOp::LoadReg(r) = op {
        if r == reg {
            let cloned = arena.clone_subtree(def);
            let src = arena.node(cloned).clone();
            let n = arena.node_mut(id);
            n.op = src.op;
            n.value = src.value;
            n.left = src.left;
            n.right = src.right;
            return true;
        }
    }
    let mut changed = false;
    if let Some(l) = left {
        changed |= substitute(arena, l, reg, def);
    }
    if let Some(r) = right {
        changed |= substitute(arena, r, reg, def);
    }
    changed
}

fn const_of(arena: &MirArena, id: MirId) -> Option<i64> {
    let n = arena.node(id);
    matches!(n.op, MirOp::Const).then_some(n.value).flatten()
}

/// `(x + c1) + c2 -> x + (c1+c2)`, and the `c2 + (x + c1)` / `(c1 + x) + c2`
/// mirror shapes. Only fires on `AddI`; `SubI` chains are already
/// canonicalised to `AddI` of a negated constant by folding.
fn redistribute(arena: &mut MirArena, id: MirId) -> bool {
    let (left, right, op) = {
        let n = arena.node(id);
        (n.left, n.right, n.op)
    };
    let mut changed = false;
    if let Some(l) = left {
        changed |= redistribute(arena, l);
    }
    if let Some(r) = right {
        changed |= redistribute(arena, r);
    }
    if op != MirOp::Bin(BinOp::AddI) {
        return changed;
    }
    let (Some(l), Some(r)) = (left, right) else { return changed };
    let Some(outer_c) = const_of(arena, r) else { return changed };
    let inner = arena.node(l);
    if inner.op != MirOp::Bin(BinOp::AddI) {
        return changed;
    }
    let (Some(il), Some(ir)) = (inner.left, inner.right) else { return changed };
    let Some(inner_c) = const_of(arena, ir) else { return changed };
    let sum = inner_c.wrapping_add(outer_c);
    let new_const = arena.alloc(MirOp::Const, None, None, Some(sum));
    let n = arena.node_mut(id);
    n.left = Some(il);
    n.right = Some(new_const);
    true
}

#[derive(Debug, Default)]
pub struct Reassociation {
    modified: u32,
}

impl Reassociation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        "reassociation"
    }

    pub fn modified_count(&self) -> u32 {
        self.modified
    }

    pub fn run(&mut self, cfg: &mut Cfg, arena: &mut MirArena) -> bool {
        let mut changed = false;
        for block in &cfg.blocks {
            let mut defs: HashMap<RegId, MirId> = HashMap::new();
            for stmt in &block.stmts {
                if matches!(stmt, MirStmt::CoprocOut { .. } | MirStmt::CoprocRun { .. } | MirStmt::CoprocIn { .. }) {
                    defs.clear();
                }
                for id in stmt.expr_ids() {
                    let loads: Vec<RegId> = {
                        let mut regs = Vec::new();
                        collect_load_regs(arena, id, &mut regs);
                        regs
                    };
                    for reg in loads {
                        if let Some(&def) = defs.get(&reg) {
                            if total_uses(cfg, arena, reg) == 1 {
                                changed |= substitute(arena, id, reg, def);
                            }
                        }
                    }
                }
                if let MirStmt::StReg { reg, expr, side_effecting: false } = stmt {
                    defs.insert(*reg, *expr);
                }
            }
        }
        for id in cfg.blocks().iter().flat_map(|b| b.stmts.iter()).flat_map(|s| s.expr_ids()) {
            changed |= redistribute(arena, id);
        }
        if changed {
            self.modified += 1;
        }
        changed
    }
}

fn collect_load_regs(arena: &MirArena, id: MirId, out: &mut Vec<RegId>) {
    let n = arena.node(id);
    if let MirOp::LoadReg(r) = n.op {
        out.push(r);
    }
    if let Some(l) = n.left {
        collect_load_regs(arena, l, out);
    }
    if let Some(r) = n.right {
        collect_load_regs(arena, r, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::LabelId;

    #[test]
    fn a_single_use_definition_is_substituted_at_its_use_site() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let base = arena.alloc(MirOp::LoadReg(RegId(9)), None, None, None);
        let one = arena.alloc(MirOp::Const, None, None, Some(1));
        let def_expr = arena.alloc(MirOp::Bin(BinOp::AddI), Some(base), Some(one), None);
        let use_node = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(0), expr: def_expr, side_effecting: false },
            MirStmt::StReg { reg: RegId(1), expr: use_node, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let mut pass = Reassociation::new();
        assert!(pass.run(&mut built, &mut arena));
        assert_eq!(arena.node(use_node).op, MirOp::Bin(BinOp::AddI));
    }

    #[test]
    fn redistribute_folds_nested_add_of_constants() {
        let mut arena = MirArena::new();
        let x = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let c1 = arena.alloc(MirOp::Const, None, None, Some(2));
        let inner = arena.alloc(MirOp::Bin(BinOp::AddI), Some(x), Some(c1), None);
        let c2 = arena.alloc(MirOp::Const, None, None, Some(3));
        let outer = arena.alloc(MirOp::Bin(BinOp::AddI), Some(inner), Some(c2), None);
        assert!(redistribute(&mut arena, outer));
        let right = arena.node(outer).right.unwrap();
        assert_eq!(arena.node(right).value, Some(5));
    }

    #[test]
    fn a_coprocessor_call_invalidates_recorded_definitions() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let base = arena.alloc(MirOp::LoadReg(RegId(9)), None, None, None);
        let def_expr = arena.alloc(MirOp::Un(pflc_types::UnOp::NegI), Some(base), None, None);
        let use_node = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(0), expr: def_expr, side_effecting: false },
            MirStmt::CoprocRun { coproc: crate::hir::Coprocessor::Regexp, op: "run" },
            MirStmt::StReg { reg: RegId(1), expr: use_node, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let mut pass = Reassociation::new();
        pass.run(&mut built, &mut arena);
        // The definition was recorded before the barrier and must not have
        // been carried across it to the use site after.
        assert_eq!(arena.node(use_node).op, MirOp::LoadReg(RegId(0)));
    }
}
