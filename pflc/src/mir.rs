//! MIR/MIRO (component D): a three-address, register-oriented instruction
//! set. Expression nodes are two-child trees held in an arena and referenced
//! by [`MirId`] handle rather than by pointer (design note: "Cyclic IR
//! graphs") because the reassociation pass clones and re-parents subtrees
//! when it substitutes a load for its defining store.

use pflc_types::{BinOp, UnOp};

use crate::hir::Coprocessor;
use crate::ids::{FieldId, LabelId, MirId, RegId, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPart {
    Offset,
    Len,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirOp {
    Const,
    LoadReg(RegId),
    LoadVar(VarId),
    LoadField(FieldId, FieldPart),
    PacketLength,
    Bin(BinOp),
    Un(UnOp),
    Cint,
    ChgBord,
    /// `JFLDEQ`/`NEQ`/`GT`/`LT`-style length-normalized string compare.
    StrCmp(StrCmpOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrCmpOp {
    Eq,
    Neq,
    Gt,
    Lt,
}

/// Packet-memory and data-memory version counters, bumped on every store
/// that can alias a load of that kind. A reassociation candidate may only
/// move a load across memory-versioned positions whose tag it still
/// matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemBarrier {
    pub packet_version: u32,
    pub data_version: u32,
}

#[derive(Debug, Clone)]
pub struct MirNode {
    pub op: MirOp,
    pub left: Option<MirId>,
    pub right: Option<MirId>,
    /// Constant payload for `MirOp::Const`.
    pub value: Option<i64>,
    /// The register this node's enclosing `StReg` defines, filled in once
    /// the node is placed inside a statement (SSA requires each register
    /// version defined exactly once).
    pub def_reg: Option<RegId>,
    pub barrier: MemBarrier,
}

/// Owns every MIR expression node for one `compile()` call. Statements
/// reference nodes by [`MirId`]; the CFG, and every optimiser pass, borrow
/// this arena alongside the statement lists.
#[derive(Debug, Default)]
pub struct MirArena {
    nodes: Vec<MirNode>,
}

impl MirArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, op: MirOp, left: Option<MirId>, right: Option<MirId>, value: Option<i64>) -> MirId {
        let id = MirId(self.nodes.len() as u32);
        self.nodes.push(MirNode { op, left, right, value, def_reg: None, barrier: MemBarrier::default() });
        id
    }

    pub fn node(&self, id: MirId) -> &MirNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: MirId) -> &mut MirNode {
        &mut self.nodes[id.index()]
    }

    /// Deep-clones the subtree rooted at `id`, returning the new root. Used
    /// by reassociation when substituting a load's defining-store expression
    /// at a use site: the expression is cloned rather than shared so each
    /// copy can be independently rewritten afterwards.
    pub fn clone_subtree(&mut self, id: MirId) -> MirId {
        let node = self.nodes[id.index()].clone();
        let left = node.left.map(|l| self.clone_subtree(l));
        let right = node.right.map(|r| self.clone_subtree(r));
        self.alloc(node.op, left, right, node.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLValue {
    Offset(FieldId),
    Len(FieldId),
    Value(FieldId),
}

#[derive(Debug, Clone)]
pub enum MirStmt {
    Label(LabelId),
    Jump(LabelId),
    CondJump { cond: MirId, true_label: LabelId, false_label: LabelId },
    Switch { selector: MirId, cases: Vec<(i64, LabelId)>, default: LabelId },
    /// Defines `reg` exactly once under SSA. `side_effecting` pins
    /// coprocessor-read results and info-partition stores so DCE never
    /// drops them even if nothing downstream reads the register.
    StReg { reg: RegId, expr: MirId, side_effecting: bool },
    CoprocOut { coproc: Coprocessor, expr: MirId },
    CoprocRun { coproc: Coprocessor, op: &'static str },
    CoprocIn { coproc: Coprocessor, reg: RegId, what: &'static str },
    /// Writes one extracted field's coordinates into the info partition.
    FieldInfoStore { field: FieldId, position: u32, offset_reg: RegId, len_reg: RegId, instance_reg: Option<RegId> },
    Comment(String),
    /// SSA merge point, inserted by `enter_ssa` at dominance frontiers and
    /// resolved back into predecessor-edge copies by `exit_ssa`.
    Phi { reg: RegId, sources: Vec<(crate::ids::BlockId, RegId)> },
}

impl MirStmt {
    pub fn defined_reg(&self) -> Option<RegId> {
        match self {
            MirStmt::StReg { reg, .. } => Some(*reg),
            MirStmt::CoprocIn { reg, .. } => Some(*reg),
            MirStmt::Phi { reg, .. } => Some(*reg),
            _ => None,
        }
    }

    pub fn defined_reg_mut(&mut self) -> Option<&mut RegId> {
        match self {
            MirStmt::StReg { reg, .. } => Some(reg),
            MirStmt::CoprocIn { reg, .. } => Some(reg),
            MirStmt::Phi { reg, .. } => Some(reg),
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, MirStmt::Jump(_) | MirStmt::CondJump { .. } | MirStmt::Switch { .. })
    }

    pub fn label_targets(&self) -> Vec<LabelId> {
        match self {
            MirStmt::Jump(l) => vec![*l],
            MirStmt::CondJump { true_label, false_label, .. } => vec![*true_label, *false_label],
            MirStmt::Switch { cases, default, .. } => {
                let mut v: Vec<LabelId> = cases.iter().map(|(_, l)| *l).collect();
                v.push(*default);
                v
            }
            _ => Vec::new(),
        }
    }

    /// Top-level expression roots this statement reads from the arena
    /// (distinct from the registers the `FieldInfoStore`/`Phi` variants
    /// reference directly rather than through an expression tree).
    pub fn expr_ids(&self) -> Vec<MirId> {
        match self {
            MirStmt::StReg { expr, .. } => vec![*expr],
            MirStmt::CondJump { cond, .. } => vec![*cond],
            MirStmt::Switch { selector, .. } => vec![*selector],
            MirStmt::CoprocOut { expr, .. } => vec![*expr],
            _ => Vec::new(),
        }
    }

    /// `true` when dropping this statement (because nothing reads its
    /// defined register) would still change observable behaviour, and so
    /// DCE must keep it regardless.
    pub fn has_side_effects(&self) -> bool {
        match self {
            MirStmt::StReg { side_effecting, .. } => *side_effecting,
            MirStmt::CoprocOut { .. }
            | MirStmt::CoprocRun { .. }
            | MirStmt::CoprocIn { .. }
            | MirStmt::FieldInfoStore { .. } => true,
            _ => false,
        }
    }
}
