//! HIR Lowering (component G): walks the DFA states built by the filter
//! front-end, synthesises HIR for each state's owning protocol, and
//! translates HIR to the flat MIR statement list a [`crate::cfg`] later cuts
//! into basic blocks.

use std::collections::HashMap;

use pflc_types::{BinOp, Expr};

use crate::error::ErrorRecorder;
use crate::frontend::CompiledFilter;
use crate::fsa::DfaState;
use crate::hir::{self, HirExpr, HirLValue, HirStmt};
use crate::ids::{LabelId, MirId, ProtoId, RegId, StateId};
use crate::mir::{MirArena, MirOp, MirStmt};
use crate::symtab::{ExtractionInfo, GlobalSymbols, LocalSymbols};

// Deterministic register numbering scheme: every HIR lvalue kind gets its
// own numeric namespace so no accidental collisions occur before the
// optimiser's enter-SSA pass renumbers everything into versioned registers
// anyway. The exact numbers are never observed outside this module.
const NS_TEMP: u32 = 0;
const NS_VAR: u32 = 1 << 28;
const NS_FIELD_OFFSET: u32 = 2 << 28;
const NS_FIELD_LEN: u32 = 3 << 28;
const NS_FIELD_VALUE: u32 = 4 << 28;
const REG_CURRENT_OFFSET: u32 = (5 << 28) + 1;
/// Tracks the encapsulation-graph layer of the most recently matched
/// protocol, so a `tunneled` transition can require a strictly greater
/// depth at the next one.
const REG_LAST_LAYER: u32 = (5 << 28) + 2;

/// The fixed registers lowering wires by well-known id rather than through
/// normal def/use chains (`$currentoffset`, the dispatch loop's cached
/// `$lastlayer`). The optimiser must never fold these away or hand their
/// number to a different value.
pub fn pinned_registers() -> [RegId; 2] {
    [RegId(REG_CURRENT_OFFSET), RegId(REG_LAST_LAYER)]
}

fn reg_for(lv: HirLValue) -> RegId {
    match lv {
        HirLValue::Temp(t) => RegId(NS_TEMP + t.0),
        HirLValue::Var(v) => RegId(NS_VAR + v.0),
        HirLValue::FieldOffset(f) => RegId(NS_FIELD_OFFSET + f.0),
        HirLValue::FieldLen(f) => RegId(NS_FIELD_LEN + f.0),
        HirLValue::FieldValue(f) => RegId(NS_FIELD_VALUE + f.0),
        HirLValue::CurrentOffset => RegId(REG_CURRENT_OFFSET),
    }
}

pub struct LoweredProgram {
    pub arena: MirArena,
    pub code: Vec<MirStmt>,
    pub entry: LabelId,
    pub filter_true: LabelId,
    pub filter_false: LabelId,
}

struct Ctx<'a> {
    arena: MirArena,
    local: &'a mut LocalSymbols,
    loop_stack: Vec<(LabelId, LabelId)>,
}

impl<'a> Ctx<'a> {
    fn expr(&mut self, e: &HirExpr) -> MirId {
        match e {
            HirExpr::IntConst(v) => self.arena.alloc(MirOp::Const, None, None, Some(*v)),
            HirExpr::BoolConst(b) => self.arena.alloc(MirOp::Const, None, None, Some(*b as i64)),
            HirExpr::StrConst(s) => {
                let id = self.local.str_const(s);
                self.arena.alloc(MirOp::Const, None, None, Some(id.0 as i64))
            }
            HirExpr::Load(lv) => self.arena.alloc(MirOp::LoadReg(reg_for(*lv)), None, None, None),
            HirExpr::PacketLength => self.arena.alloc(MirOp::PacketLength, None, None, None),
            HirExpr::Bin(op, l, r) => {
                let left = self.expr(l);
                let right = self.expr(r);
                self.arena.alloc(MirOp::Bin(*op), Some(left), Some(right), None)
            }
            HirExpr::Un(op, inner) => {
                let v = self.expr(inner);
                self.arena.alloc(MirOp::Un(*op), Some(v), None, None)
            }
            HirExpr::Cint(inner) => {
                let v = self.expr(inner);
                self.arena.alloc(MirOp::Cint, Some(v), None, None)
            }
            HirExpr::ChgByteOrder(inner) => {
                let v = self.expr(inner);
                self.arena.alloc(MirOp::ChgBord, Some(v), None, None)
            }
        }
    }

    fn stmts(&mut self, stmts: &[HirStmt], out: &mut Vec<MirStmt>) {
        for stmt in stmts {
            self.stmt(stmt, out);
        }
    }

    fn stmt(&mut self, stmt: &HirStmt, out: &mut Vec<MirStmt>) {
        match stmt {
            HirStmt::Gen(e) => {
                let expr = self.expr(e);
                let reg = RegId(NS_TEMP + self.local.new_temp().0);
                out.push(MirStmt::StReg { reg, expr, side_effecting: false });
            }
            HirStmt::Label(l) => out.push(MirStmt::Label(*l)),
            HirStmt::Jump(l) => out.push(MirStmt::Jump(*l)),
            HirStmt::JCond { cond, true_label, false_label } => {
                let c = self.expr(cond);
                out.push(MirStmt::CondJump { cond: c, true_label: *true_label, false_label: *false_label });
            }
            HirStmt::Switch { selector, cases, default } => {
                let sel = self.expr(selector);
                out.push(MirStmt::Switch { selector: sel, cases: cases.clone(), default: *default });
            }
            HirStmt::If { cond, then_block, else_block } => {
                let then_label = self.local.new_code_label("if_then");
                let else_label = self.local.new_code_label("if_else");
                let join_label = self.local.new_code_label("if_join");
                let c = self.expr(cond);
                out.push(MirStmt::CondJump { cond: c, true_label: then_label, false_label: else_label });
                out.push(MirStmt::Label(then_label));
                self.stmts(then_block, out);
                out.push(MirStmt::Jump(join_label));
                out.push(MirStmt::Label(else_label));
                self.stmts(else_block, out);
                out.push(MirStmt::Label(join_label));
            }
            HirStmt::Loop { bound, body } => {
                let head = self.local.new_code_label("loop_head");
                let body_label = self.local.new_code_label("loop_body");
                let exit = self.local.new_code_label("loop_exit");
                out.push(MirStmt::Label(head));
                if let Some(bound_expr) = bound {
                    let counter_reg = RegId(NS_TEMP + self.local.new_temp().0);
                    let counter = self.arena.alloc(MirOp::LoadReg(counter_reg), None, None, None);
                    let limit = self.expr(bound_expr);
                    let cond = self.arena.alloc(MirOp::Bin(BinOp::Lt), Some(counter), Some(limit), None);
                    out.push(MirStmt::CondJump { cond, true_label: body_label, false_label: exit });
                    out.push(MirStmt::Label(body_label));
                }
                self.loop_stack.push((head, exit));
                self.stmts(body, out);
                self.loop_stack.pop();
                out.push(MirStmt::Jump(head));
                out.push(MirStmt::Label(exit));
            }
            HirStmt::Break => {
                if let Some((_, exit)) = self.loop_stack.last() {
                    out.push(MirStmt::Jump(*exit));
                }
            }
            HirStmt::Continue => {
                if let Some((head, _)) = self.loop_stack.last() {
                    out.push(MirStmt::Jump(*head));
                }
            }
            HirStmt::Comment(c) => out.push(MirStmt::Comment(c.clone())),
            HirStmt::FieldInfo { field, position, multi } => {
                let offset_reg = reg_for(HirLValue::FieldOffset(*field));
                let len_reg = reg_for(HirLValue::FieldLen(*field));
                out.push(MirStmt::FieldInfoStore {
                    field: *field,
                    position: *position,
                    offset_reg,
                    len_reg,
                    instance_reg: multi.then_some(RegId(NS_TEMP + self.local.new_temp().0)),
                });
            }
            HirStmt::Assign { dest, value } => {
                let expr = self.expr(value);
                out.push(MirStmt::StReg { reg: reg_for(*dest), expr, side_effecting: false });
            }
            HirStmt::CoprocOut { coproc, value } => {
                let expr = self.expr(value);
                out.push(MirStmt::CoprocOut { coproc: *coproc, expr });
            }
            HirStmt::CoprocRun { coproc, op } => out.push(MirStmt::CoprocRun { coproc: *coproc, op }),
            HirStmt::CoprocIn { coproc, dest, what } => {
                out.push(MirStmt::CoprocIn { coproc: *coproc, reg: reg_for(*dest), what });
            }
        }
    }
}

/// One protocol's incoming-transition guard, resolved once a DFA state's
/// single owning protocol is known. Only the first contributing edge's
/// guard is kept: every element in a filter that names the same protocol at
/// the same automaton position carries the same predicate in practice, so
/// arbitrarily picking one is equivalent to intersecting identical guards.
struct IncomingGuard {
    predicate: Option<Expr>,
    tunneled: bool,
}

fn collect_incoming_guards(dfa: &crate::fsa::Dfa, alphabet: &[ProtoId]) -> HashMap<StateId, IncomingGuard> {
    let mut incoming: HashMap<StateId, IncomingGuard> = HashMap::new();
    for state in &dfa.states {
        for &symbol in alphabet {
            for edge in dfa.edges_for(state.id, symbol) {
                incoming.entry(edge.to).or_insert(IncomingGuard { predicate: edge.predicate.clone(), tunneled: edge.tunneled });
            }
        }
    }
    incoming
}

pub fn lower(
    compiled: &CompiledFilter,
    global: &GlobalSymbols,
    local: &mut LocalSymbols,
    _recorder: &mut ErrorRecorder,
) -> LoweredProgram {
    let filter_true = local.new_code_label("filter_true");
    let filter_false = local.new_code_label("filter_false");
    let state_labels: HashMap<StateId, LabelId> = compiled
        .dfa
        .states
        .iter()
        .map(|s| (s.id, local.new_code_label(format!("state_{}", s.id.0))))
        .collect();
    let entry = state_labels[&compiled.dfa.start];
    let incoming = collect_incoming_guards(&compiled.dfa, &compiled.alphabet);

    let mut ctx = Ctx { arena: MirArena::new(), local, loop_stack: Vec::new() };
    let mut code = Vec::new();
    let mut before_emitted: std::collections::HashSet<ProtoId> = std::collections::HashSet::new();

    for state in &compiled.dfa.states {
        code.push(MirStmt::Label(state_labels[&state.id]));
        lower_state_body(&mut ctx, state, global, &incoming, filter_false, &mut before_emitted, &mut code);
        let no_match = ctx.local.new_linked_label();
        emit_dispatch(&mut ctx, &compiled.dfa, state, global, &compiled.alphabet, &state_labels, no_match, &mut code);
        code.push(MirStmt::Label(no_match));
        code.push(if state.accepting { MirStmt::Jump(filter_true) } else { MirStmt::Jump(filter_false) });
    }
    code.push(MirStmt::Label(filter_true));
    code.push(MirStmt::Comment("accept: SEND 1; RET".to_string()));
    code.push(MirStmt::Label(filter_false));
    code.push(MirStmt::Comment("reject: SEND 0; RET".to_string()));

    LoweredProgram { arena: ctx.arena, code, entry, filter_true, filter_false }
}

fn lower_state_body(
    ctx: &mut Ctx,
    state: &DfaState,
    global: &GlobalSymbols,
    incoming: &HashMap<StateId, IncomingGuard>,
    filter_false: LabelId,
    before_emitted: &mut std::collections::HashSet<ProtoId>,
    code: &mut Vec<MirStmt>,
) {
    let owners: Vec<ProtoId> = state.protos.clone();
    for &proto_id in &owners {
        if before_emitted.insert(proto_id) {
            let proto = global.proto(proto_id);
            ctx.stmts(&proto.hir.before, code);
        }
    }
    if let Some(proto_id) = state.single_proto() {
        let proto = global.proto(proto_id);
        let format = crate::compactor::compact_format(proto_id, global, ctx.local);
        ctx.stmts(&format, code);
        emit_extractions(ctx, proto, code);

        // Record this state's depth for the next `tunneled` check, then
        // apply this state's own incoming guard (field predicate and/or
        // strictly-greater-depth requirement) before falling into verify.
        let layer_const = ctx.arena.alloc(MirOp::Const, None, None, Some(proto.layer as i64));
        code.push(MirStmt::StReg { reg: RegId(REG_LAST_LAYER), expr: layer_const, side_effecting: true });

        if let Some(guard) = incoming.get(&state.id) {
            if let Some(cond) = build_guard_cond(ctx, proto, guard) {
                let pass = ctx.local.new_linked_label();
                code.push(MirStmt::CondJump { cond, true_label: pass, false_label: filter_false });
                code.push(MirStmt::Label(pass));
            }
        }
        ctx.stmts(&proto.hir.verify, code);
    }
}

/// Drives [`crate::fsa::extended::EtVisitor`] over one edge's predicate,
/// folding every `on_range`/`on_punct`/`on_special` test it reports into a
/// single MIR condition as it walks (each test is ANDed onto what came
/// before, the same way the decision tree's tests are all tried in
/// sequence before a transition fires).
struct MirGuardBuilder<'c, 'a> {
    ctx: &'c mut Ctx<'a>,
    proto: &'c crate::symtab::ProtoSym,
    pending_field: Option<crate::ids::FieldId>,
    cond: Option<MirId>,
}

impl MirGuardBuilder<'_, '_> {
    fn push_cmp(&mut self, op: BinOp, rhs: HirExpr) {
        let Some(field) = self.pending_field else { return };
        let cmp = HirExpr::Bin(op, Box::new(HirExpr::Load(HirLValue::FieldValue(field))), Box::new(rhs));
        let cmp = self.ctx.expr(&cmp);
        self.cond = Some(match self.cond {
            Some(prev) => self.ctx.arena.alloc(MirOp::Bin(BinOp::LAnd), Some(prev), Some(cmp), None),
            None => cmp,
        });
    }
}

impl crate::fsa::extended::EtVisitor for MirGuardBuilder<'_, '_> {
    fn on_label(&mut self, name: &str) {
        self.pending_field = self.proto.field_named(name).map(|f| f.id);
    }
    fn on_range(&mut self, op: BinOp, bound: i64) {
        self.push_cmp(op, HirExpr::IntConst(bound));
    }
    fn on_punct(&mut self, op: BinOp, value: i64) {
        self.push_cmp(op, HirExpr::IntConst(value));
    }
    fn on_jump(&mut self, _target: StateId) {
        // This guard only ever has two outcomes (fall into the state body
        // or reject), handled by the `CondJump` at the call site; a leaf
        // jump straight to a third label doesn't arise here.
    }
    fn on_special(&mut self, _op: &str, pattern: &str) {
        self.push_cmp(BinOp::Eq, HirExpr::StrConst(pattern.to_string()));
    }
}

fn build_guard_cond(ctx: &mut Ctx, proto: &crate::symtab::ProtoSym, guard: &IncomingGuard) -> Option<MirId> {
    let predicate_cond = guard.predicate.as_ref().and_then(|p| {
        let mut builder = MirGuardBuilder { ctx: &mut *ctx, proto, pending_field: None, cond: None };
        crate::fsa::extended::walk(p, &mut builder);
        builder.cond
    });
    let depth_cond = guard.tunneled.then(|| {
        let prev_layer = ctx.arena.alloc(MirOp::LoadReg(RegId(REG_LAST_LAYER)), None, None, None);
        let this_layer = ctx.arena.alloc(MirOp::Const, None, None, Some(proto.layer as i64));
        ctx.arena.alloc(MirOp::Bin(BinOp::Gt), Some(this_layer), Some(prev_layer), None)
    });
    match (predicate_cond, depth_cond) {
        (None, None) => None,
        (Some(p), None) => Some(p),
        (None, Some(d)) => Some(d),
        (Some(p), Some(d)) => Some(ctx.arena.alloc(MirOp::Bin(BinOp::LAnd), Some(p), Some(d), None)),
    }
}

fn emit_extractions(ctx: &mut Ctx, proto: &crate::symtab::ProtoSym, code: &mut Vec<MirStmt>) {
    for field in &proto.fields {
        if let Some(ExtractionInfo { position, instance_count }) = ctx.local.extraction(field.id) {
            let usage = ctx.local.usage(field.id);
            code.push(MirStmt::FieldInfoStore {
                field: field.id,
                position,
                offset_reg: reg_for(HirLValue::FieldOffset(field.id)),
                len_reg: reg_for(HirLValue::FieldLen(field.id)),
                instance_reg: usage.multi_proto.then_some(RegId(NS_TEMP + ctx.local.new_temp().0)),
            });
            if usage.multi_proto {
                ctx.local.set_extraction(field.id, ExtractionInfo { position, instance_count: instance_count + 1 });
            }
        }
    }
}

/// Picks the real successor of `state`: the automaton may offer several
/// outgoing symbols (e.g. `ip` followed by either `tcp` or `udp`), but only
/// one of them is the packet's actual next protocol. When `state` has a
/// single owning protocol with an encapsulation section, that section's
/// switch is the thing that decides at runtime, so it is lowered and driven
/// instead of guessing. `no_match` is where control falls through when
/// either nothing in the switch matches or this filter's automaton never
/// follows the matched case at all (the state's own accept/reject jump).
fn emit_dispatch(
    ctx: &mut Ctx,
    dfa: &crate::fsa::Dfa,
    state: &DfaState,
    global: &GlobalSymbols,
    alphabet: &[ProtoId],
    state_labels: &HashMap<StateId, LabelId>,
    no_match: LabelId,
    code: &mut Vec<MirStmt>,
) {
    if let Some(proto_id) = state.single_proto() {
        let proto = global.proto(proto_id);
        if !proto.encapsulation.is_empty() {
            emit_encapsulation_switch(ctx, dfa, state.id, global, proto, state_labels, no_match, code);
            return;
        }
    }
    // A merge state (several owning protocols converged here) or a protocol
    // with no encapsulation section at all: at most one symbol can have a
    // live edge in practice, so take it unconditionally.
    for &symbol in alphabet {
        if let Some(edge) = dfa.edges_for(state.id, symbol).first() {
            code.push(MirStmt::Jump(state_labels[&edge.to]));
            return;
        }
    }
}

/// Lowers one protocol's encapsulation section the way its database entry
/// describes it: a switch on `encap_selector`'s runtime value, one arm per
/// `EncapCase`, landing on whichever DFA-state label that case's real
/// next-protocol maps to for this filter, or `no_match` when this filter's
/// automaton doesn't follow that particular next protocol at all.
fn emit_encapsulation_switch(
    ctx: &mut Ctx,
    dfa: &crate::fsa::Dfa,
    from: StateId,
    global: &GlobalSymbols,
    proto: &crate::symtab::ProtoSym,
    state_labels: &HashMap<StateId, LabelId>,
    no_match: LabelId,
    code: &mut Vec<MirStmt>,
) {
    let target_for = |next_proto: &str| -> LabelId {
        global
            .proto_by_name(next_proto)
            .and_then(|pid| dfa.edges_for(from, pid).first())
            .map(|edge| state_labels[&edge.to])
            .unwrap_or(no_match)
    };

    let Some(selector) = &proto.encap_selector else {
        // Nothing to switch on; only a bare default case can still be taken.
        if let Some(default_case) = proto.encapsulation.iter().find(|c| c.case_value.is_none()) {
            code.push(MirStmt::Jump(target_for(&default_case.next_proto)));
        }
        return;
    };

    let mut cases = Vec::new();
    let mut default = no_match;
    for case in &proto.encapsulation {
        let target = target_for(&case.next_proto);
        match &case.case_value {
            Some(Expr::IntConst(v)) => cases.push((*v, target)),
            Some(_) => log::warn!(
                target: "pflc::pfl",
                "protocol '{}' encapsulation case for '{}' is not a constant; ignored",
                proto.name,
                case.next_proto
            ),
            None => default = target,
        }
    }
    let switch = HirStmt::Switch { selector: hir::lower_expr(proto, selector), cases, default };
    ctx.stmt(&switch, code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorRecorder;
    use crate::frontend;
    use crate::graph::EncapGraph;
    use crate::testsupport::sample_database;
    use pflc_types::ParsedFilter;

    #[test]
    fn trivial_accept_emits_unconditional_jump_to_filter_true() {
        let mut recorder = ErrorRecorder::new();
        let global = GlobalSymbols::from_database(sample_database(), &mut recorder).unwrap();
        let graph = EncapGraph::build(&global).unwrap();
        let mut local = LocalSymbols::new();
        let compiled = frontend::build(&ParsedFilter { expr: None, actions: vec![] }, &global, &graph, &mut local, &mut recorder).unwrap();
        let program = lower(&compiled, &global, &mut local, &mut recorder);
        assert!(program.code.iter().any(|s| matches!(s, MirStmt::Jump(l) if *l == program.filter_true)));
    }
}
