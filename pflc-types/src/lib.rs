//! Plain data types for the two trees `pflc` consumes from its collaborators:
//! the protocol database tree (produced by a NetPDL-style XML parser) and the
//! filter expression tree (produced by the filter-language parser).
//!
//! Neither tree is built here. This crate only defines the shapes, the same
//! way `prost-types` defines `FileDescriptorProto` without parsing a single
//! `.proto` file itself.

mod expr;
mod pdl;
mod pfl;

pub use expr::{BinOp, Expr, UnOp};
pub use pdl::{
    EncapCase, FieldDef, FieldKind, PdlNode, PdlNodeKind, ProtoDef, TokenMatch,
};
pub use pfl::{
    Action, FieldPath, Inclusion, ParsedFilter, Repeat, SetElement, SetMembership, TermExpr,
};
