//! Dead-code elimination: drops any `StReg`/`CoprocIn` whose defined
//! register is never read and which has no side effect of its own
//! (`MirStmt::has_side_effects`), iterating because removing one dead
//! definition can expose another.

use std::collections::HashSet;

use crate::cfg::Cfg;
use crate::ids::RegId;
use crate::mir::{MirArena, MirOp, MirStmt};

fn collect_reads(arena: &MirArena, id: crate::ids::MirId, used: &mut HashSet<RegId>) {
    let n = arena.node(id);
    if let MirOp::LoadReg(r) = n.op {
        used.insert(r);
    }
    if let Some(l) = n.left {
        collect_reads(arena, l, used);
    }
    if let Some(r) = n.right {
        collect_reads(arena, r, used);
    }
}

fn used_registers(cfg: &Cfg, arena: &MirArena) -> HashSet<RegId> {
    let mut used = HashSet::new();
    for block in cfg.blocks() {
        for stmt in &block.stmts {
            for id in stmt.expr_ids() {
                collect_reads(arena, id, &mut used);
            }
            match stmt {
                MirStmt::FieldInfoStore { offset_reg, len_reg, instance_reg, .. } => {
                    used.insert(*offset_reg);
                    used.insert(*len_reg);
                    if let Some(r) = instance_reg {
                        used.insert(*r);
                    }
                }
                MirStmt::Phi { sources, .. } => {
                    for (_, r) in sources {
                        used.insert(*r);
                    }
                }
                _ => {}
            }
        }
    }
    used
}

#[derive(Debug, Default)]
pub struct Dce {
    modified: u32,
}

impl Dce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        "dce"
    }

    pub fn modified_count(&self) -> u32 {
        self.modified
    }

    pub fn run(&mut self, cfg: &mut Cfg, arena: &mut MirArena) -> bool {
        let used = used_registers(cfg, arena);
        let mut removed = 0u32;
        for block in &mut cfg.blocks {
            let before = block.stmts.len();
            block.stmts.retain(|stmt| {
                if stmt.has_side_effects() {
                    return true;
                }
                match stmt.defined_reg() {
                    Some(reg) => used.contains(&reg),
                    None => true,
                }
            });
            removed += (before - block.stmts.len()) as u32;
        }
        let _ = arena;
        if removed > 0 {
            self.modified += removed;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::hir::Coprocessor;
    use crate::ids::LabelId;

    #[test]
    fn an_unread_definition_is_dropped() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let c = arena.alloc(MirOp::Const, None, None, Some(1));
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(0), expr: c, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let mut dce = Dce::new();
        assert!(dce.run(&mut built, &mut arena));
        assert!(built.block(built.entry).stmts.iter().all(|s| !matches!(s, MirStmt::StReg { .. })));
    }

    #[test]
    fn a_side_effecting_store_survives_even_if_unread() {
        let mut arena = MirArena::new();
        let entry = LabelId(0);
        let c = arena.alloc(MirOp::Const, None, None, Some(1));
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::CoprocOut { coproc: Coprocessor::StringMatching, expr: c },
            MirStmt::StReg { reg: RegId(0), expr: c, side_effecting: true },
        ];
        let mut built = cfg::build(&code, entry);
        let mut dce = Dce::new();
        assert!(!dce.run(&mut built, &mut arena));
        assert_eq!(built.block(built.entry).stmts.len(), 3);
    }
}
