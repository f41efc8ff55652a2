//! Expression trees shared by the protocol database (field-length and verify
//! predicates) and the filter language (per-protocol field predicates).
//!
//! `pflc` never constructs these nodes from source text; they arrive fully
//! parsed from the database parser or the filter parser and are only ever
//! read or cloned.

/// A typed expression node. Mirrors the HIR expression op set from the
/// database front-end (`ADDI`, `SUBI`, ... `CINT`, `CHGBORD`) one-for-one, so
/// the HIR builder can translate a node without re-inferring its shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntConst(i64),
    StrConst(String),
    BoolConst(bool),
    /// Reference to a field already parsed earlier in the same protocol.
    FieldRef(String),
    /// Reference to a runtime variable or lookup-table item.
    VarRef(String),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Un(UnOp, Box<Expr>),
    /// `CINT`: cast a string or field reference to an integer.
    Cint(Box<Expr>),
    /// `CHGBORD`: byte-swap an integer value.
    ChgByteOrder(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    AddI,
    SubI,
    MulI,
    DivI,
    AndI,
    OrI,
    XorI,
    ShlI,
    ShrI,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    /// Logical `and`/`or` over boolean sub-expressions (verify sections).
    LAnd,
    LOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    NotI,
    NegI,
    LNot,
}

impl Expr {
    /// Evaluates a constant-folded expression tree directly, for use by
    /// property tests that check the optimiser's constant folding against
    /// ground truth. Returns `None` if the tree is not fully constant, if it
    /// references a field/variable, or if a division by zero occurs.
    pub fn eval_const(&self) -> Option<i64> {
        match self {
            Expr::IntConst(v) => Some(*v),
            Expr::BoolConst(b) => Some(*b as i64),
            Expr::StrConst(_) => None,
            Expr::FieldRef(_) | Expr::VarRef(_) => None,
            Expr::Cint(inner) => inner.eval_const(),
            Expr::ChgByteOrder(inner) => inner.eval_const().map(|v| (v as u32).swap_bytes() as i64),
            Expr::Un(op, inner) => {
                let v = inner.eval_const()?;
                Some(match op {
                    UnOp::NotI => !v,
                    UnOp::NegI => -v,
                    UnOp::LNot => (v == 0) as i64,
                })
            }
            Expr::Bin(op, lhs, rhs) => {
                let l = lhs.eval_const()?;
                let r = rhs.eval_const()?;
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
        }
    }
}
