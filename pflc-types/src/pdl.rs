//! The protocol database tree, as handed to `pflc` by the (external) NetPDL
//! XML parser. A [`ProtoDef`] is one `<protocol>` element; its before/format/
//! encapsulation/verify sections are generic [`PdlNode`] trees so the HIR
//! builder can walk them uniformly regardless of which section it is in.

use crate::expr::Expr;

/// One protocol definition, as produced by the database parser.
#[derive(Debug, Clone)]
pub struct ProtoDef {
    pub id: u32,
    pub name: String,
    /// Field definitions in on-the-wire order.
    pub fields: Vec<FieldDef>,
    pub before: Option<PdlNode>,
    pub encapsulation: Vec<EncapCase>,
    /// The expression each `EncapCase::case_value` is compared against, e.g.
    /// an ethernet frame's `ethertype` field or an IP packet's `proto` byte.
    /// `None` when every case is the default arm (no real branching) or the
    /// protocol has no encapsulation section at all.
    pub encap_selector: Option<Expr>,
    pub verify: Option<PdlNode>,
    /// Protocol names this protocol's database author flagged as the
    /// preferred (most likely) follow-on, used to build the "preferred"
    /// variant of the encapsulation graph.
    pub preferred_next: Vec<String>,
    /// Set to `false` by the database parser when a before/verify section
    /// references a construct the parser does not understand; such protocols
    /// are pruned by `EncapGraph::remove_unsupported_nodes`.
    pub supported: bool,
}

/// One field definition within a protocol's format section.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Whether this field may be fused with an adjacent fixed field by the
    /// field compactor (`Compattable` in the symbol-table model).
    pub compattable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Fixed { len: u32 },
    Variable { len_expr: Expr },
    BitField { container: String, mask: u64, shift: u8 },
    Padding { modulus: u32 },
    TokenEnded { terminator: TokenMatch, end_discard: bool, end_offset: i32 },
    TokenWrapped { begin: TokenMatch, end: TokenMatch },
    Line,
    Pattern { regex: String },
    Eatall,
    Allfields,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenMatch {
    Literal(Vec<u8>),
    Regex(String),
}

/// One `case` (or the `default`) arm of a protocol's encapsulation switch.
#[derive(Debug, Clone)]
pub struct EncapCase {
    /// `None` for the default arm.
    pub case_value: Option<Expr>,
    pub next_proto: String,
}

/// A generic node of a before/verify section tree. Statement-shaped
/// (assignments, conditionals, loops); expression-bearing nodes carry their
/// parsed [`Expr`] in `expr`.
#[derive(Debug, Clone)]
pub struct PdlNode {
    pub kind: PdlNodeKind,
    pub children: Vec<PdlNode>,
    pub expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdlNodeKind {
    Block,
    /// `children[0]` is the condition-bearing node (its `expr` is the test),
    /// `children[1]` the then-block, `children[2]` (if present) the else.
    If,
    /// A `do { .. } while (expr)`-style loop; `expr` on this node is the
    /// bound, `children[0]` the body block.
    Loop,
    /// `name := expr`; `expr` carries the assignment's right-hand side.
    Assign { var: String },
}
