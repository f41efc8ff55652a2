//! Constant folding and algebraic simplification: a bottom-up, in-place
//! rewrite of every expression tree reachable from a statement, folding
//! `Bin`/`Un` nodes whose operands are already `Const` and canonicalizing a
//! handful of identities (`x+0`, `x*1`, `x*0`, `x^x`, double negation).

use pflc_types::{BinOp, UnOp};

use crate::cfg::Cfg;
use crate::ids::MirId;
use crate::mir::{MirArena, MirOp};

fn const_of(arena: &MirArena, id: MirId) -> Option<i64> {
    let n = arena.node(id);
    matches!(n.op, MirOp::Const).then_some(n.value).flatten()
}

fn eval_bin(op: BinOp, l: i64, r: i64) -> Option<i64> {
    Some(match op {
        BinOp::AddI => l.wrapping_add(r),
        BinOp::SubI => l.wrapping_sub(r),
        BinOp::MulI => l.wrapping_mul(r),
        BinOp::DivI => {
            if r == 0 {
                return None;
            }
            l.wrapping_div(r)
        }
        BinOp::AndI => l & r,
        BinOp::OrI => l | r,
        BinOp::XorI => l ^ r,
        BinOp::ShlI => l.wrapping_shl(r as u32),
        BinOp::ShrI => l.wrapping_shr(r as u32),
        BinOp::Eq => (l == r) as i64,
        BinOp::Neq => (l != r) as i64,
        BinOp::Lt => (l < r) as i64,
        BinOp::Gt => (l > r) as i64,
        BinOp::Le => (l <= r) as i64,
        BinOp::Ge => (l >= r) as i64,
        BinOp::LAnd => ((l != 0) && (r != 0)) as i64,
        BinOp::LOr => ((l != 0) || (r != 0)) as i64,
    })
}

fn eval_un(op: UnOp, v: i64) -> i64 {
    match op {
        UnOp::NotI => !v,
        UnOp::NegI => -v,
        UnOp::LNot => (v == 0) as i64,
    }
}

fn make_const(arena: &mut MirArena, id: MirId, value: i64) {
    let n = arena.node_mut(id);
    n.op = MirOp::Const;
    n.value = Some(value);
    n.left = None;
    n.right = None;
}

/// Rewires `id` to be a plain copy of `src` without reusing `src`'s node
/// (arena nodes are not reference counted, so content is cloned in place).
fn become_copy_of(arena: &mut MirArena, id: MirId, src: MirId) {
    let src_node = arena.node(src).clone();
    let n = arena.node_mut(id);
    n.op = src_node.op;
    n.value = src_node.value;
    n.left = src_node.left;
    n.right = src_node.right;
}

fn fold(arena: &mut MirArena, id: MirId) -> bool {
    let (left, right, op) = {
        let n = arena.node(id);
        (n.left, n.right, n.op)
    };
    let mut changed = false;
    if let Some(l) = left {
        changed |= fold(arena, l);
    }
    if let Some(r) = right {
        changed |= fold(arena, r);
    }

    match op {
        MirOp::Un(u) => {
            if let Some(l) = left {
                if u == UnOp::NotI {
                    if let MirOp::Un(UnOp::NotI) = arena.node(l).op {
                        // !!x -> x
                        if let Some(inner) = arena.node(l).left {
                            become_copy_of(arena, id, inner);
                            return true;
                        }
                    }
                }
                if let Some(v) = const_of(arena, l) {
                    make_const(arena, id, eval_un(u, v));
                    return true;
                }
            }
        }
        MirOp::Bin(b) => {
            if let (Some(l), Some(r)) = (left, right) {
                if let (Some(lv), Some(rv)) = (const_of(arena, l), const_of(arena, r)) {
                    if let Some(v) = eval_bin(b, lv, rv) {
                        make_const(arena, id, v);
                        return true;
                    }
                }
                match (b, const_of(arena, l), const_of(arena, r)) {
                    (BinOp::AddI, Some(0), _) | (BinOp::OrI, Some(0), _) => {
                        become_copy_of(arena, id, r);
                        return true;
                    }
                    (BinOp::AddI, _, Some(0)) | (BinOp::SubI, _, Some(0)) | (BinOp::OrI, _, Some(0)) => {
                        become_copy_of(arena, id, l);
                        return true;
                    }
                    (BinOp::MulI, Some(1), _) | (BinOp::AndI, Some(-1), _) => {
                        become_copy_of(arena, id, r);
                        return true;
                    }
                    (BinOp::MulI, _, Some(1)) | (BinOp::AndI, _, Some(-1)) | (BinOp::ShlI, _, Some(0)) | (BinOp::ShrI, _, Some(0)) => {
                        become_copy_of(arena, id, l);
                        return true;
                    }
                    (BinOp::MulI, Some(0), _) | (BinOp::MulI, _, Some(0)) | (BinOp::AndI, Some(0), _) | (BinOp::AndI, _, Some(0)) => {
                        make_const(arena, id, 0);
                        return true;
                    }
                    (BinOp::XorI, Some(l), Some(r)) if l == r => {
                        make_const(arena, id, 0);
                        return true;
                    }
                    // canonicalise `x - c` to `x + (-c)` so reassociation only
                    // ever has to look for nested AddI chains
                    (BinOp::SubI, _, Some(c)) if c != 0 => {
                        let n = arena.node_mut(id);
                        n.op = MirOp::Bin(BinOp::AddI);
                        make_const(arena, r, -c);
                        return true;
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    changed
}

#[derive(Debug, Default)]
pub struct Folding {
    modified: u32,
}

impl Folding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &'static str {
        "folding"
    }

    pub fn modified_count(&self) -> u32 {
        self.modified
    }

    pub fn run(&mut self, cfg: &mut Cfg, arena: &mut MirArena) -> bool {
        let mut changed = false;
        for block in &cfg.blocks {
            for stmt in &block.stmts {
                for id in stmt.expr_ids() {
                    changed |= fold(arena, id);
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
    use crate::ids::{LabelId, RegId};
    use crate::mir::MirStmt;

    fn const_node(arena: &mut MirArena, v: i64) -> MirId {
        arena.alloc(MirOp::Const, None, None, Some(v))
    }

    #[test]
    fn constant_binary_expression_folds_to_one_node() {
        let mut arena = MirArena::new();
        let l = const_node(&mut arena, 2);
        let r = const_node(&mut arena, 3);
        let sum = arena.alloc(MirOp::Bin(BinOp::AddI), Some(l), Some(r), None);
        assert!(fold(&mut arena, sum));
        assert_eq!(arena.node(sum).op, MirOp::Const);
        assert_eq!(arena.node(sum).value, Some(5));
    }

    #[test]
    fn double_not_cancels() {
        let mut arena = MirArena::new();
        let x = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let not1 = arena.alloc(MirOp::Un(UnOp::NotI), Some(x), None, None);
        let not2 = arena.alloc(MirOp::Un(UnOp::NotI), Some(not1), None, None);
        assert!(fold(&mut arena, not2));
        assert_eq!(arena.node(not2).op, MirOp::LoadReg(RegId(0)));
    }

    #[test]
    fn subtracting_a_constant_canonicalises_to_adding_its_negation() {
        let mut arena = MirArena::new();
        let x = arena.alloc(MirOp::LoadReg(RegId(0)), None, None, None);
        let c = const_node(&mut arena, 7);
        let sub = arena.alloc(MirOp::Bin(BinOp::SubI), Some(x), Some(c), None);
        assert!(fold(&mut arena, sub));
        assert_eq!(arena.node(sub).op, MirOp::Bin(BinOp::AddI));
        assert_eq!(arena.node(c).value, Some(-7));
    }

    #[test]
    fn run_folds_every_statement_in_the_cfg() {
        let mut arena = MirArena::new();
        let l = const_node(&mut arena, 4);
        let r = const_node(&mut arena, 0);
        let sum = arena.alloc(MirOp::Bin(BinOp::AddI), Some(l), Some(r), None);
        let entry = LabelId(0);
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::StReg { reg: RegId(1), expr: sum, side_effecting: false },
        ];
        let mut built = cfg::build(&code, entry);
        let mut folding = Folding::new();
        assert!(folding.run(&mut built, &mut arena));
        assert_eq!(folding.modified_count(), 1);
        assert!(!folding.run(&mut built, &mut arena));
    }
}
