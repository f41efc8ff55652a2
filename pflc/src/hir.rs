//! HIR (component C): a tree IR of typed integer/string/boolean operations,
//! plus a statement list covering labels, assignment, control flow, switches,
//! loops, jumps, field definitions and coprocessor calls.
//!
//! Two phases build HIR: the *per-protocol parse*, which walks the
//! database tree once per protocol at database-load time and is cached on
//! [`crate::symtab::GlobalSymbols`] forever after; and the *per-state
//! synthesis* that the Filter Front-End drives during lowering, which
//! attaches `FieldInfo` extraction markers for one particular `compile()`
//! call. This module only implements the first phase and the shared tree
//! types; the second lives in [`crate::lowering`].

use pflc_types::{BinOp, Expr, FieldKind, PdlNode, PdlNodeKind, TokenMatch, UnOp};

use crate::error::{Diagnostic, ErrorRecorder};
use crate::ids::{FieldId, LabelId, TempId, VarId};
use crate::symtab::global::{FieldSym, ProtoSym};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coprocessor {
    Regexp,
    StringMatching,
    LookupEx,
}

/// An assignable location: a runtime variable/temporary, the running parse
/// cursor, or a piece of a field (its byte offset, length, or decoded
/// integer value, for bit-fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HirLValue {
    Var(VarId),
    Temp(TempId),
    CurrentOffset,
    FieldOffset(FieldId),
    FieldLen(FieldId),
    FieldValue(FieldId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirExpr {
    IntConst(i64),
    StrConst(String),
    BoolConst(bool),
    Load(HirLValue),
    PacketLength,
    Bin(BinOp, Box<HirExpr>, Box<HirExpr>),
    Un(UnOp, Box<HirExpr>),
    Cint(Box<HirExpr>),
    ChgByteOrder(Box<HirExpr>),
}

impl HirExpr {
    pub fn add(self, rhs: HirExpr) -> HirExpr {
        HirExpr::Bin(BinOp::AddI, Box::new(self), Box::new(rhs))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirStmt {
    Gen(HirExpr),
    Label(LabelId),
    Jump(LabelId),
    JCond { cond: HirExpr, true_label: LabelId, false_label: LabelId },
    Switch { selector: HirExpr, cases: Vec<(i64, LabelId)>, default: LabelId },
    If { cond: HirExpr, then_block: Vec<HirStmt>, else_block: Vec<HirStmt> },
    Loop { bound: Option<HirExpr>, body: Vec<HirStmt> },
    Break,
    Continue,
    Comment(String),
    FieldInfo { field: FieldId, position: u32, multi: bool },
    Assign { dest: HirLValue, value: HirExpr },
    CoprocOut { coproc: Coprocessor, value: HirExpr },
    CoprocRun { coproc: Coprocessor, op: &'static str },
    CoprocIn { coproc: Coprocessor, dest: HirLValue, what: &'static str },
}

/// The HIR synthesised once for one protocol's before/format/verify
/// sections, cached for the life of the `GlobalSymbols` that owns it.
#[derive(Debug, Clone, Default)]
pub struct ProtoHir {
    pub before: Vec<HirStmt>,
    pub format: Vec<HirStmt>,
    pub verify: Vec<HirStmt>,
}

/// Translates a protocol's field list and before/verify sections into HIR.
/// `alloc_label`/`alloc_temp` are passed in rather than owned so that label
/// and temp ids stay unique across every protocol built from one database
/// (labels referenced by `before`/`verify` jumps never collide).
pub struct HirBuilder<'a> {
    alloc_label: &'a mut dyn FnMut() -> LabelId,
    alloc_temp: &'a mut dyn FnMut() -> TempId,
}

impl<'a> HirBuilder<'a> {
    pub fn new(
        alloc_label: &'a mut dyn FnMut() -> LabelId,
        alloc_temp: &'a mut dyn FnMut() -> TempId,
    ) -> Self {
        HirBuilder { alloc_label, alloc_temp }
    }

    pub fn build(&mut self, proto: &ProtoSym, recorder: &mut ErrorRecorder) -> ProtoHir {
        ProtoHir {
            before: proto
                .before
                .as_ref()
                .map(|n| self.lower_node(proto, n))
                .unwrap_or_default(),
            format: self.lower_format(proto, recorder),
            verify: proto
                .verify
                .as_ref()
                .map(|n| self.lower_node(proto, n))
                .unwrap_or_default(),
        }
    }

    fn lower_format(&mut self, proto: &ProtoSym, recorder: &mut ErrorRecorder) -> Vec<HirStmt> {
        let mut stmts = Vec::new();
        for field in &proto.fields {
            self.lower_field(proto, field, &mut stmts, recorder);
        }
        stmts
    }

    fn lower_field(
        &mut self,
        proto: &ProtoSym,
        field: &FieldSym,
        out: &mut Vec<HirStmt>,
        recorder: &mut ErrorRecorder,
    ) {
        out.push(HirStmt::Comment(format!("field {}.{}", proto.name, field.name)));
        match &field.kind {
            FieldKind::Fixed { len } => {
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldLen(field.id),
                    value: HirExpr::IntConst(*len as i64),
                });
                self.advance_offset(out, HirExpr::IntConst(*len as i64));
            }
            FieldKind::Variable { len_expr } => {
                let len_temp = (self.alloc_temp)();
                out.push(HirStmt::Assign {
                    dest: HirLValue::Temp(len_temp),
                    value: lower_expr(proto, len_expr),
                });
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldLen(field.id),
                    value: HirExpr::Load(HirLValue::Temp(len_temp)),
                });
                self.advance_offset(out, HirExpr::Load(HirLValue::Temp(len_temp)));
            }
            FieldKind::BitField { container, mask, shift } => {
                let Some(container_field) = proto.field_named(container) else {
                    recorder.push(Diagnostic::Pdl {
                        proto: proto.name.clone(),
                        message: format!(
                            "bit-field '{}' refers to unknown container '{container}'",
                            field.name
                        ),
                    });
                    return;
                };
                let masked = HirExpr::Bin(
                    BinOp::AndI,
                    Box::new(HirExpr::Load(HirLValue::FieldValue(container_field.id))),
                    Box::new(HirExpr::IntConst(*mask as i64)),
                );
                let shifted = HirExpr::Bin(BinOp::ShrI, Box::new(masked), Box::new(HirExpr::IntConst(*shift as i64)));
                out.push(HirStmt::Assign { dest: HirLValue::FieldValue(field.id), value: shifted });
            }
            FieldKind::Padding { modulus } => {
                // align(offset, modulus) = offset + ((modulus - (offset % modulus)) % modulus).
                // `% modulus` is folded into an AND against `modulus - 1`, which is exact only
                // for a power-of-two modulus; every alignment field in the database's protocols
                // is byte/word/dword aligned, so this holds in practice.
                let offset = HirExpr::Load(HirLValue::CurrentOffset);
                let remainder = HirExpr::Bin(
                    BinOp::SubI,
                    Box::new(HirExpr::IntConst(*modulus as i64)),
                    Box::new(HirExpr::Bin(
                        BinOp::AndI,
                        Box::new(offset.clone()),
                        Box::new(HirExpr::IntConst((*modulus as i64) - 1)),
                    )),
                );
                let padded = HirExpr::Bin(
                    BinOp::AndI,
                    Box::new(remainder),
                    Box::new(HirExpr::IntConst((*modulus as i64) - 1)),
                );
                self.advance_offset(out, padded);
            }
            FieldKind::TokenEnded { terminator, end_discard, end_offset } => {
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
                self.lower_regex_search(out, terminator);
                // `lower_regex_search` has moved `CurrentOffset` to the
                // terminator's match position; the field's length is the
                // span between the recorded start and there, nudged by
                // `end_offset` and whether the terminator itself is kept
                // inside the field. Resolved consistently as "match start"
                // here and in `TokenWrapped`/`Line`.
                let discard_adjust = if *end_discard { 0 } else { *end_offset };
                let mut len = HirExpr::Bin(
                    BinOp::SubI,
                    Box::new(HirExpr::Load(HirLValue::CurrentOffset)),
                    Box::new(HirExpr::Load(HirLValue::FieldOffset(field.id))),
                );
                if discard_adjust != 0 {
                    len = HirExpr::Bin(BinOp::AddI, Box::new(len), Box::new(HirExpr::IntConst(discard_adjust as i64)));
                }
                out.push(HirStmt::Assign { dest: HirLValue::FieldLen(field.id), value: len });
            }
            FieldKind::TokenWrapped { begin, end } => {
                self.lower_regex_search(out, begin);
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
                self.lower_regex_search(out, end);
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldLen(field.id),
                    value: HirExpr::Bin(
                        BinOp::SubI,
                        Box::new(HirExpr::Load(HirLValue::CurrentOffset)),
                        Box::new(HirExpr::Load(HirLValue::FieldOffset(field.id))),
                    ),
                });
            }
            FieldKind::Line => {
                self.lower_regex_search(out, &TokenMatch::Literal(b"\r\n".to_vec()));
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
            }
            FieldKind::Pattern { regex } => {
                self.lower_regex_search(out, &TokenMatch::Regex(regex.clone()));
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
            }
            FieldKind::Eatall => {
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldOffset(field.id),
                    value: HirExpr::Load(HirLValue::CurrentOffset),
                });
                out.push(HirStmt::Assign {
                    dest: HirLValue::FieldLen(field.id),
                    value: HirExpr::Bin(
                        BinOp::SubI,
                        Box::new(HirExpr::PacketLength),
                        Box::new(HirExpr::Load(HirLValue::CurrentOffset)),
                    ),
                });
            }
            FieldKind::Allfields => {
                // Expanded by the extraction-list resolver (component F),
                // not during per-protocol format lowering: it names every
                // defined field of this protocol rather than parsing bytes.
            }
        }
    }

    fn advance_offset(&mut self, out: &mut Vec<HirStmt>, delta: HirExpr) {
        out.push(HirStmt::Assign {
            dest: HirLValue::CurrentOffset,
            value: HirExpr::Bin(BinOp::AddI, Box::new(HirExpr::Load(HirLValue::CurrentOffset)), Box::new(delta)),
        });
    }

    /// Emits the fixed coprocessor-out/run/in sequence for token/line/pattern
    /// fields: push the pattern id, the search window
    /// offset and length, run `MATCH_WITH_OFFSET`, then read back whether a
    /// match was found and where.
    fn lower_regex_search(&mut self, out: &mut Vec<HirStmt>, terminator: &TokenMatch) {
        let pattern_id = match terminator {
            TokenMatch::Literal(bytes) => HirExpr::StrConst(String::from_utf8_lossy(bytes).into_owned()),
            TokenMatch::Regex(pattern) => HirExpr::StrConst(pattern.clone()),
        };
        out.push(HirStmt::CoprocOut { coproc: Coprocessor::Regexp, value: pattern_id });
        out.push(HirStmt::CoprocOut { coproc: Coprocessor::Regexp, value: HirExpr::Load(HirLValue::CurrentOffset) });
        out.push(HirStmt::CoprocOut { coproc: Coprocessor::Regexp, value: HirExpr::PacketLength });
        out.push(HirStmt::CoprocRun { coproc: Coprocessor::Regexp, op: "MATCH_WITH_OFFSET" });
        let matched = (self.alloc_temp)();
        out.push(HirStmt::CoprocIn {
            coproc: Coprocessor::Regexp,
            dest: HirLValue::Temp(matched),
            what: "matches_found",
        });
        let offset_found = (self.alloc_temp)();
        out.push(HirStmt::CoprocIn {
            coproc: Coprocessor::Regexp,
            dest: HirLValue::Temp(offset_found),
            what: "offset_found",
        });
        out.push(HirStmt::Assign {
            dest: HirLValue::CurrentOffset,
            value: HirExpr::Load(HirLValue::Temp(offset_found)),
        });
    }

    fn lower_node(&mut self, proto: &ProtoSym, node: &PdlNode) -> Vec<HirStmt> {
        match &node.kind {
            PdlNodeKind::Block => node.children.iter().flat_map(|c| self.lower_node(proto, c)).collect(),
            PdlNodeKind::Assign { var } => {
                let value = node.expr.as_ref().map(|e| lower_expr(proto, e)).unwrap_or(HirExpr::IntConst(0));
                vec![HirStmt::Assign { dest: HirLValue::Var(database_var_id(var)), value }]
            }
            PdlNodeKind::If => {
                let cond = node.expr.as_ref().map(|e| lower_expr(proto, e)).unwrap_or(HirExpr::BoolConst(true));
                let then_block = node.children.first().map(|n| self.lower_node(proto, n)).unwrap_or_default();
                let else_block = node.children.get(1).map(|n| self.lower_node(proto, n)).unwrap_or_default();
                vec![HirStmt::If { cond, then_block, else_block }]
            }
            PdlNodeKind::Loop => {
                let bound = node.expr.as_ref().map(|e| lower_expr(proto, e));
                let body = node.children.first().map(|n| self.lower_node(proto, n)).unwrap_or_default();
                vec![HirStmt::Loop { bound, body }]
            }
        }
    }
}

/// A variable named in the database is identified by a stable hash of its
/// name rather than a `LocalSymbols`-allocated id: `ProtoHir` is built once
/// per database load, before any `CompilationUnit` (and its `LocalSymbols`)
/// exists. `crate::lowering` re-keys these into real `VarId`s the first time
/// a given compile actually touches the variable, the same way `LenTemp`
/// handling is re-keyed on first use.
fn database_var_id(name: &str) -> VarId {
    VarId(name.bytes().fold(0u32, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u32)))
}

pub fn lower_expr(proto: &ProtoSym, expr: &Expr) -> HirExpr {
    match expr {
        Expr::IntConst(v) => HirExpr::IntConst(*v),
        Expr::StrConst(s) => HirExpr::StrConst(s.clone()),
        Expr::BoolConst(b) => HirExpr::BoolConst(*b),
        Expr::FieldRef(name) => match proto.field_named(name) {
            Some(field) => HirExpr::Load(HirLValue::FieldValue(field.id)),
            None => HirExpr::IntConst(-1), // unresolved field: warn and use a sentinel.
        },
        Expr::VarRef(name) => HirExpr::Load(HirLValue::Var(database_var_id(name))),
        Expr::Bin(op, l, r) => HirExpr::Bin(*op, Box::new(lower_expr(proto, l)), Box::new(lower_expr(proto, r))),
        Expr::Un(op, inner) => HirExpr::Un(*op, Box::new(lower_expr(proto, inner))),
        Expr::Cint(inner) => HirExpr::Cint(Box::new(lower_expr(proto, inner))),
        Expr::ChgByteOrder(inner) => HirExpr::ChgByteOrder(Box::new(lower_expr(proto, inner))),
    }
}
