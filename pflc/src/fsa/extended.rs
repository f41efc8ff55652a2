//! Extended-transition (ET) walking: turns a guard [`Expr`] attached to a
//! [`super::DfaEdge`] into the ordered `newlabel/range/punct/jump/special`
//! callback sequence the design describes, so code generation can subscribe
//! with a visitor instead of re-deriving the decision structure itself.

use pflc_types::{BinOp, Expr};

use crate::ids::StateId;

/// Typed callbacks a decision-tree walk emits, in walk order. A closure or
/// small struct implementing this trait stands in for the source's
/// function-pointer-plus-userdata walker (design note: "Function-pointer
/// walkers").
pub trait EtVisitor {
    /// Entering a test against a named field or counter variable.
    fn on_label(&mut self, name: &str);
    /// A range test: `field <op> bound`.
    fn on_range(&mut self, op: BinOp, bound: i64);
    /// A punctual (equality-set) test: `field == value`.
    fn on_punct(&mut self, op: BinOp, value: i64);
    /// An unconditional jump to a DFA state (ET leaf, or fallthrough).
    fn on_jump(&mut self, target: StateId);
    /// A regex match/contains test against a string-valued field.
    fn on_special(&mut self, op: &str, pattern: &str);
}

fn field_name(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::FieldRef(name) | Expr::VarRef(name) => Some(name),
        _ => None,
    }
}

/// Walks one guard predicate, calling `visitor` for every comparison it
/// finds. Conjunctions/disjunctions are walked left-to-right; this does not
/// attempt to build a balanced decision tree, mirroring the source's
/// single-pass recursive-descent ET construction rather than an optimal
/// discrimination network.
pub fn walk(expr: &Expr, visitor: &mut dyn EtVisitor) {
    match expr {
        Expr::Bin(BinOp::LAnd, l, r) | Expr::Bin(BinOp::LOr, l, r) => {
            walk(l, visitor);
            walk(r, visitor);
        }
        Expr::Bin(op @ (BinOp::Eq | BinOp::Neq), l, r) => {
            if let (Some(name), Expr::IntConst(v)) = (field_name(l), r.as_ref()) {
                visitor.on_label(name);
                visitor.on_punct(*op, *v);
            } else if let (Some(name), Expr::StrConst(pattern)) = (field_name(l), r.as_ref()) {
                visitor.on_label(name);
                visitor.on_special("match", pattern);
            }
        }
        Expr::Bin(op @ (BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge), l, r) => {
            if let (Some(name), Expr::IntConst(v)) = (field_name(l), r.as_ref()) {
                visitor.on_label(name);
                visitor.on_range(*op, *v);
            }
        }
        _ => {}
    }
}
