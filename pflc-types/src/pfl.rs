//! The filter expression tree, as handed to `pflc` by the filter-language
//! parser. A [`ParsedFilter`] pairs the boolean/regex predicate over protocol
//! sets with the action the user asked for (accept, extract fields,
//! classify).

use crate::expr::Expr;

/// The parsed form of a filter string. `expr == None` denotes the empty
/// filter, which accepts every packet (concrete scenario: "trivial accept").
#[derive(Debug, Clone)]
pub struct ParsedFilter {
    pub expr: Option<TermExpr>,
    pub actions: Vec<Action>,
}

/// Boolean/regex composition over protocol-set terms.
#[derive(Debug, Clone)]
pub enum TermExpr {
    And(Box<TermExpr>, Box<TermExpr>),
    Or(Box<TermExpr>, Box<TermExpr>),
    Not(Box<TermExpr>),
    /// An ordered sequence of protocol-set elements, e.g. `ip (tcp | udp)`.
    Seq(Vec<SetElement>),
}

/// One element of a protocol-set sequence, e.g. `tcp+`, `not in {arp, rarp}`,
/// or `ip.ttl < 10`.
#[derive(Debug, Clone)]
pub struct SetElement {
    pub protos: SetMembership,
    pub include: Inclusion,
    pub repeat: Repeat,
    /// `tunneled`: require the matched protocol to sit at a strictly greater
    /// encapsulation-graph depth than the previous element.
    pub tunneled: bool,
    /// A per-protocol field predicate, e.g. `src == 10.0.0.1`, valid only
    /// when `protos` names exactly one protocol.
    pub predicate: Option<Expr>,
    /// `[n]`-style "nth occurrence of this header" predicate.
    pub header_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum SetMembership {
    /// The `any`-placeholder: every protocol in the encapsulation graph's
    /// alphabet.
    Any,
    Named(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Exactly1,
    Star,
    Plus,
    Question,
}

#[derive(Debug, Clone)]
pub enum Action {
    ReturnPacket,
    ExtractFields(Vec<FieldPath>),
    Classify(String),
}

/// One `proto.field` (or `proto*.field` for multi-instance extraction) path
/// in an `extractfields(...)` action.
#[derive(Debug, Clone)]
pub struct FieldPath {
    pub proto: String,
    pub field: String,
    /// `true` for the `proto*.field` form: extract this field from every
    /// instance of `proto` seen while parsing the packet.
    pub multi: bool,
}
