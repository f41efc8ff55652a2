//! Bytecode Emitter (component J): linearises an optimised CFG into the
//! line-oriented text format the virtual machine reads — one instruction
//! per MIR statement, `rN` register names, symbolic labels, a constant/data
//! pool, and a coprocessor-table prelude ahead of the filter entry point.

use std::fmt::Write as _;

use pflc_types::{BinOp, UnOp};

use crate::cfg::Cfg;
use crate::ids::MirId;
use crate::mir::{FieldPart, MirArena, MirOp, MirStmt, StrCmpOp};
use crate::symtab::{ConstValue, LocalSymbols};

fn bin_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::AddI => "ADD",
        BinOp::SubI => "SUB",
        BinOp::MulI => "MUL",
        BinOp::DivI => "DIV",
        BinOp::AndI => "AND",
        BinOp::OrI => "OR",
        BinOp::XorI => "XOR",
        BinOp::ShlI => "SHL",
        BinOp::ShrI => "SHR",
        BinOp::Eq => "CMPEQ",
        BinOp::Neq => "CMPNE",
        BinOp::Lt => "CMPLT",
        BinOp::Gt => "CMPGT",
        BinOp::Le => "CMPLE",
        BinOp::Ge => "CMPGE",
        BinOp::LAnd => "AND",
        BinOp::LOr => "OR",
    }
}

fn un_mnemonic(op: UnOp) -> &'static str {
    match op {
        UnOp::NotI => "NOT",
        UnOp::NegI => "NEG",
        UnOp::LNot => "LNOT",
    }
}

fn strcmp_mnemonic(op: StrCmpOp) -> &'static str {
    match op {
        StrCmpOp::Eq => "JFLDEQ",
        StrCmpOp::Neq => "JFLDNEQ",
        StrCmpOp::Gt => "JFLDGT",
        StrCmpOp::Lt => "JFLDLT",
    }
}

fn field_part_suffix(part: FieldPart) -> &'static str {
    match part {
        FieldPart::Offset => "off",
        FieldPart::Len => "len",
        FieldPart::Value => "val",
    }
}

/// A value computed in-expression is named by its arena id (`tN`); a
/// `Const` or `LoadReg` node needs no instruction of its own and is
/// referenced directly as an immediate or a register name.
fn operand(arena: &MirArena, id: MirId) -> String {
    let node = arena.node(id);
    match node.op {
        MirOp::Const => format!("#{}", node.value.unwrap_or(0)),
        MirOp::LoadReg(r) => format!("r{}", r.0),
        _ => format!("t{}", id.0),
    }
}

fn emit_expr(arena: &MirArena, id: MirId, out: &mut String) {
    let node = arena.node(id);
    if let Some(l) = node.left {
        emit_expr(arena, l, out);
    }
    if let Some(r) = node.right {
        emit_expr(arena, r, out);
    }
    let dest = format!("t{}", id.0);
    match node.op {
        MirOp::Const | MirOp::LoadReg(_) => {}
        MirOp::LoadVar(v) => {
            let _ = writeln!(out, "LDVAR {dest}, v{}", v.0);
        }
        MirOp::LoadField(f, part) => {
            let _ = writeln!(out, "LDFLD {dest}, f{}.{}", f.0, field_part_suffix(part));
        }
        MirOp::PacketLength => {
            let _ = writeln!(out, "PKTLEN {dest}");
        }
        MirOp::Bin(op) => {
            let l = operand(arena, node.left.unwrap());
            let r = operand(arena, node.right.unwrap());
            let _ = writeln!(out, "{} {dest}, {l}, {r}", bin_mnemonic(op));
        }
        MirOp::Un(op) => {
            let v = operand(arena, node.left.unwrap());
            let _ = writeln!(out, "{} {dest}, {v}", un_mnemonic(op));
        }
        MirOp::Cint => {
            let v = operand(arena, node.left.unwrap());
            let _ = writeln!(out, "CINT {dest}, {v}");
        }
        MirOp::ChgBord => {
            let v = operand(arena, node.left.unwrap());
            let _ = writeln!(out, "CHGBORD {dest}, {v}");
        }
        MirOp::StrCmp(op) => {
            let l = operand(arena, node.left.unwrap());
            let r = operand(arena, node.right.unwrap());
            let _ = writeln!(out, "{} {dest}, {l}, {r}", strcmp_mnemonic(op));
        }
    }
}

fn emit_stmt(arena: &MirArena, stmt: &MirStmt, out: &mut String) {
    match stmt {
        MirStmt::Label(l) => {
            let _ = writeln!(out, "L{}:", l.0);
        }
        MirStmt::Jump(l) => {
            let _ = writeln!(out, "JUMP L{}", l.0);
        }
        MirStmt::CondJump { cond, true_label, false_label } => {
            emit_expr(arena, *cond, out);
            let c = operand(arena, *cond);
            let _ = writeln!(out, "JNZ {c}, L{}", true_label.0);
            let _ = writeln!(out, "JUMP L{}", false_label.0);
        }
        MirStmt::Switch { selector, cases, default } => {
            emit_expr(arena, *selector, out);
            let s = operand(arena, *selector);
            for (value, label) in cases {
                let _ = writeln!(out, "JEQI {s}, #{value}, L{}", label.0);
            }
            let _ = writeln!(out, "JUMP L{}", default.0);
        }
        MirStmt::StReg { reg, expr, .. } => {
            emit_expr(arena, *expr, out);
            let v = operand(arena, *expr);
            let _ = writeln!(out, "MOV r{}, {v}", reg.0);
        }
        MirStmt::CoprocOut { coproc, expr } => {
            emit_expr(arena, *expr, out);
            let v = operand(arena, *expr);
            let _ = writeln!(out, "OUT {coproc:?}, {v}");
        }
        MirStmt::CoprocRun { coproc, op } => {
            let _ = writeln!(out, "COPRUN {coproc:?} {op}");
        }
        MirStmt::CoprocIn { coproc, reg, what } => {
            let _ = writeln!(out, "COPIN r{}, {coproc:?}.{what}", reg.0);
        }
        MirStmt::FieldInfoStore { field, position, offset_reg, len_reg, instance_reg } => {
            let _ = write!(out, "ISSTR f{}, pos{position}, r{}, r{}", field.0, offset_reg.0, len_reg.0);
            if let Some(r) = instance_reg {
                let _ = writeln!(out, ", r{}", r.0);
            } else {
                let _ = writeln!(out);
            }
        }
        MirStmt::Comment(text) => {
            if let Some(rest) = text.strip_prefix("accept: ").or_else(|| text.strip_prefix("reject: ")) {
                for part in rest.split("; ") {
                    let _ = writeln!(out, "{part}");
                }
            } else {
                let _ = writeln!(out, "; {text}");
            }
        }
        MirStmt::Phi { .. } => {
            debug_assert!(false, "Phi node reached the emitter; exit_ssa should have removed it");
        }
    }
}

/// Coprocessor-table and constant-pool prelude, emitted before the filter
/// entry point so the VM can size its tables ahead of time.
fn emit_prelude(local: &LocalSymbols, out: &mut String) {
    let _ = writeln!(out, "; -- init --");
    for (idx, value) in local.const_values().enumerate() {
        match value {
            ConstValue::Int(v) => {
                let _ = writeln!(out, "DATA_TYPE_WORD const[{idx}] = {v}");
            }
            ConstValue::Str(s) => {
                let _ = writeln!(out, "DATA_TYPE_BYTE const[{idx}] = {s:?}");
            }
        }
    }
    for (idx, pattern) in local.regex_entries().iter().enumerate() {
        let _ = writeln!(out, "DATA_TYPE_BYTE regex[{idx}] = {pattern:?}");
    }
    for (idx, literal) in local.string_match_entries().iter().enumerate() {
        let _ = writeln!(out, "DATA_TYPE_BYTE strmatch[{idx}] = {literal:?}");
    }
    let _ = writeln!(out, "; -- end init --");
}

/// Flattens `cfg` in reverse-postorder (preserving fall-through where a
/// block's single successor follows it immediately) and renders every
/// statement to text.
pub fn emit(cfg: &Cfg, arena: &MirArena, local: &LocalSymbols) -> String {
    let mut out = String::new();
    emit_prelude(local, &mut out);
    for block_id in cfg.reverse_postorder() {
        for stmt in &cfg.block(block_id).stmts {
            emit_stmt(arena, stmt, &mut out);
        }
    }
    out
}
