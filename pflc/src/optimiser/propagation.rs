//! Copy propagation and constant propagation: registers whose single
//! definition is itself a bare constant or a bare load of another register
//! are substituted at every use, repeated until no substitution fires.

use std::collections::{HashMap, HashSet};

use crate::cfg::Cfg;
use crate::ids::{MirId, RegId};
use crate::mir::{MirArena, MirOp, MirStmt};

/// Resolves `start` through a chain of copy/const definitions, stopping at
/// the first node that is neither, and refusing to follow a cycle (which
/// would only arise from malformed input, never from a real SSA program).
fn resolve(subst: &HashMap<RegId, MirId>, arena: &MirArena, start: RegId) -> Option<(MirOp, Option<i64>)> {
    let mut seen = HashSet::new();
    let mut cur = start;
    loop {
        if !seen.insert(cur) {
            return None;
        }
        let &id = subst.get(&cur)?;
        let node = arena.node(id);
        match node.op {
            MirOp::Const => return Some((MirOp::Const, node.value)),
            MirOp::LoadReg(next) => cur = next,
            _ => return None,
        }
    }
}

fn rewrite(arena: &mut MirArena, id: MirId, subst: &HashMap<RegId, MirId>) -> bool {
    let (left, right, op) = {
        let n = arena.node(id);
        (n.left, n.right, n.op)
    };
    let mut changed = false;
    if let MirOp::LoadReg(r) = op {
        if let Some((new_op, value)) = resolve(subst, arena, r) {
            let n = arena.node_mut(id);
            n.op = new_op;
            n.value = value;
            n.left = None;
            n.right = None;
            changed = true;
        }
    }
    if let Some(l) = left {
        changed |= rewrite(arena, l, subst);
    }
    if let Some(r) = right {
        changed |= rewrite(arena, r, subst);
    }
    changed
}

#[derive(Debug, Default)]
pub struct Propagation {
    modified: u32,
}

impl Propagation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        "propagation"
    }

    pub fn modified_count(&self) -> u32 {
        self.modified
    }

    pub fn run(&mut self, cfg: &mut Cfg, arena: &mut MirArena) -> bool {
        let mut subst: HashMap<RegId, MirId> = HashMap::new();
        for block in cfg.blocks() {
            for stmt in &block.stmts {
                if let MirStmt::StReg { reg, expr, .. } = stmt {
                    let node = arena.node(*expr);
                    if matches!(node.op, MirOp::Const | MirOp::LoadReg(_)) {
                        subst.insert(*reg, *expr);
                    }
                }
            }
        }
        if subst.is_empty() {
            return false;
        }

        let mut changed = false;
        for block in &cfg.blocks {
            for stmt in &block.stmts {
                for id in stmt.expr_ids() {
                    changed |= rewrite(arena, id, &subst);
                }
            }
        }
        if changed {
            self.modified += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::LabelId;

    #[test]
    fn a_constant_copy_propagates_to_its_use() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let five = arena.alloc(MirOp::Const, None, None, Some(5));
        let load = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(0), expr: five, side_effecting: false },
            MirStmt::StReg { reg: RegId(1), expr: load, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let mut pass = Propagation::new();
        assert!(pass.run(&mut built, &mut arena));
        assert_eq!(arena.node(load).op, MirOp::Const);
        assert_eq!(arena.node(load).value, Some(5));
        assert_eq!(pass.modified_count(), 1);
    }

    #[test]
    fn a_self_referential_chain_does_not_loop_forever() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let a = arena.alloc(MirOp::LoadReg(RegId(1)), None, None, None);
        let b = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(0), expr: a, side_effecting: false },
            MirStmt::StReg { reg: RegId(1), expr: b, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let mut pass = Propagation::new();
        // Neither definition resolves to a terminal const, and the cycle
        // guard in `resolve` must stop rather than spin.
        pass.run(&mut built, &mut arena);
    }
}
