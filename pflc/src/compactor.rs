//! Field Compactor, an auxiliary pre-lowering optimiser: fuses a run
//! of consecutive fixed-size fields that are `Compattable`, unused by this
//! particular filter, and not feeding a loop bound, into one synthetic
//! "skip N bytes" advance of `$currentoffset`. A loop whose body collapses
//! entirely to such a skip is rewritten to a single multiply-and-add
//! outside the loop.
//!
//! Runs per `compile()` call against a clone of the cached per-protocol
//! format HIR, since eligibility depends on this filter's field-usage
//! flags rather than anything the protocol database alone determines.

use pflc_types::{BinOp, FieldKind};

use crate::hir::{HirExpr, HirLValue, HirStmt};
use crate::ids::FieldId;
use crate::symtab::{FieldSym, GlobalSymbols, LocalSymbols, ProtoSym};

fn is_field_marker(stmt: &HirStmt, proto: &str) -> bool {
    matches!(stmt, HirStmt::Comment(c) if c.starts_with(&format!("field {proto}.")))
}

struct FieldRun {
    start: usize,
    end: usize,
    total_len: u32,
    field_ids: Vec<FieldId>,
}

/// Splits `stmts` at each per-field `Comment` marker `lower_field` emits,
/// zipping the resulting spans 1:1 with `proto.fields` (the two lists are
/// built by the same ordered walk, so they line up).
fn field_spans(stmts: &[HirStmt], proto: &ProtoSym) -> Vec<(usize, usize)> {
    let mut starts = Vec::new();
    for (i, stmt) in stmts.iter().enumerate() {
        if is_field_marker(stmt, &proto.name) {
            starts.push(i);
        }
    }
    let mut spans = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(stmts.len());
        spans.push((start, end));
    }
    spans
}

fn eligible(field: &FieldSym, local: &LocalSymbols) -> Option<u32> {
    if !field.flags.compattable {
        return None;
    }
    if local.usage(field.id).used {
        return None;
    }
    match field.kind {
        FieldKind::Fixed { len } => Some(len),
        _ => None,
    }
}

fn collect_runs(stmts: &[HirStmt], proto: &ProtoSym, local: &LocalSymbols) -> Vec<FieldRun> {
    let spans = field_spans(stmts, proto);
    let mut runs = Vec::new();
    let mut i = 0;
    while i < spans.len() {
        let Some(len) = eligible(&proto.fields[i], local) else {
            i += 1;
            continue;
        };
        let (start, mut end) = spans[i];
        let mut total = len;
        let mut ids = vec![proto.fields[i].id];
        let mut j = i + 1;
        while j < spans.len() {
            let Some(next_len) = eligible(&proto.fields[j], local) else { break };
            total += next_len;
            end = spans[j].1;
            ids.push(proto.fields[j].id);
            j += 1;
        }
        if ids.len() >= 2 {
            runs.push(FieldRun { start, end, total_len: total, field_ids: ids });
        }
        i = j.max(i + 1);
    }
    runs
}

fn synthetic_skip(total_len: u32, field_ids: &[FieldId]) -> Vec<HirStmt> {
    let names: Vec<String> = field_ids.iter().map(|f| format!("f{}", f.0)).collect();
    vec![
        HirStmt::Comment(format!("compacted skip of {total_len} bytes ({})", names.join(","))),
        HirStmt::Assign {
            dest: HirLValue::CurrentOffset,
            value: HirExpr::Bin(
                BinOp::AddI,
                Box::new(HirExpr::Load(HirLValue::CurrentOffset)),
                Box::new(HirExpr::IntConst(total_len as i64)),
            ),
        },
    ]
}

fn fuse_field_runs(stmts: Vec<HirStmt>, proto: &ProtoSym, local: &LocalSymbols) -> Vec<HirStmt> {
    let runs = collect_runs(&stmts, proto, local);
    if runs.is_empty() {
        return stmts;
    }
    let mut out = Vec::with_capacity(stmts.len());
    let mut cursor = 0;
    for run in runs {
        out.extend_from_slice(&stmts[cursor..run.start]);
        out.extend(synthetic_skip(run.total_len, &run.field_ids));
        cursor = run.end;
    }
    out.extend_from_slice(&stmts[cursor..]);
    out
}

/// A single statement of the shape `$currentoffset = $currentoffset + K`,
/// the output shape `synthetic_skip` produces for a pure constant skip.
fn constant_advance(stmt: &HirStmt) -> Option<i64> {
    if let HirStmt::Assign { dest: HirLValue::CurrentOffset, value } = stmt {
        if let HirExpr::Bin(BinOp::AddI, l, r) = value {
            if matches!(l.as_ref(), HirExpr::Load(HirLValue::CurrentOffset)) {
                if let HirExpr::IntConst(k) = r.as_ref() {
                    return Some(*k);
                }
            }
        }
    }
    None
}

/// Recursively compacts nested bodies, then collapses any `Loop` whose body
/// is now exactly one constant-size skip into a single multiply-and-add.
fn collapse_loops(stmts: Vec<HirStmt>) -> Vec<HirStmt> {
    stmts
        .into_iter()
        .map(|stmt| match stmt {
            HirStmt::If { cond, then_block, else_block } => {
                HirStmt::If { cond, then_block: collapse_loops(then_block), else_block: collapse_loops(else_block) }
            }
            HirStmt::Loop { bound: Some(bound), body } => {
                let body = collapse_loops(body);
                let non_comment: Vec<&HirStmt> = body.iter().filter(|s| !matches!(s, HirStmt::Comment(_))).collect();
                if let [only] = non_comment[..] {
                    if let Some(k) = constant_advance(only) {
                        return HirStmt::Assign {
                            dest: HirLValue::CurrentOffset,
                            value: HirExpr::Bin(
                                BinOp::AddI,
                                Box::new(HirExpr::Load(HirLValue::CurrentOffset)),
                                Box::new(HirExpr::Bin(BinOp::MulI, Box::new(bound.clone()), Box::new(HirExpr::IntConst(k)))),
                            ),
                        };
                    }
                }
                HirStmt::Loop { bound: Some(bound), body }
            }
            other => other,
        })
        .collect()
}

/// Entry point: produces the format HIR `compile()` should lower for
/// `proto`, given this filter's field-usage flags.
pub fn compact_format(proto_id: crate::ids::ProtoId, global: &GlobalSymbols, local: &LocalSymbols) -> Vec<HirStmt> {
    let proto = global.proto(proto_id);
    let fused = fuse_field_runs(proto.hir.format.clone(), proto, local);
    collapse_loops(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorRecorder;
    use crate::testsupport::sample_database;

    #[test]
    fn consecutive_unused_fixed_fields_fuse_into_one_skip() {
        let mut recorder = ErrorRecorder::new();
        let global = GlobalSymbols::from_database(sample_database(), &mut recorder).unwrap();
        let local = LocalSymbols::new();
        let ip = global.proto_by_name("ip").unwrap();
        let out = compact_format(ip, &global, &local);
        let skips = out.iter().filter(|s| matches!(s, HirStmt::Comment(c) if c.starts_with("compacted skip"))).count();
        assert_eq!(skips, 1, "ttl/proto/src/dst are all unused fixed fields and should fuse into one skip");
    }

    #[test]
    fn a_field_the_filter_reads_breaks_the_run() {
        let mut recorder = ErrorRecorder::new();
        let global = GlobalSymbols::from_database(sample_database(), &mut recorder).unwrap();
        let mut local = LocalSymbols::new();
        let ip = global.proto_by_name("ip").unwrap();
        let ttl = global.proto(ip).field_named("ttl").unwrap().id;
        local.usage_mut(ttl).used = true;
        let out = compact_format(ip, &global, &local);
        // ttl no longer joins a run; proto/src/dst (3 consecutive fields)
        // still fuse into exactly one skip.
        let skips = out.iter().filter(|s| matches!(s, HirStmt::Comment(c) if c.starts_with("compacted skip"))).count();
        assert_eq!(skips, 1);
        assert!(out.iter().any(|s| matches!(s, HirStmt::Comment(c) if c.contains("field ip.ttl"))));
    }

    #[test]
    fn a_loop_of_pure_skips_collapses_to_a_multiply() {
        let body = vec![HirStmt::Assign {
            dest: HirLValue::CurrentOffset,
            value: HirExpr::Bin(
                BinOp::AddI,
                Box::new(HirExpr::Load(HirLValue::CurrentOffset)),
                Box::new(HirExpr::IntConst(4)),
            ),
        }];
        let stmts = vec![HirStmt::Loop { bound: Some(HirExpr::Load(HirLValue::Var(crate::ids::VarId(0)))), body }];
        let out = collapse_loops(stmts);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], HirStmt::Assign { dest: HirLValue::CurrentOffset, value: HirExpr::Bin(BinOp::AddI, _, _) }));
    }
}
