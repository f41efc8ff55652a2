//! CFG Builder (component H): cuts a flat MIR statement list into basic
//! blocks at every leader (a label target, or the statement right after a
//! terminator) and wires successor/predecessor edges from each block's
//! terminator.

use std::collections::HashMap;

use crate::ids::{BlockId, LabelId};
use crate::mir::MirStmt;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: Option<LabelId>,
    pub stmts: Vec<MirStmt>,
    pub succ: Vec<BlockId>,
    pub pred: Vec<BlockId>,
}

#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    label_to_block: HashMap<LabelId, BlockId>,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_of_label(&self, label: LabelId) -> Option<BlockId> {
        self.label_to_block.get(&label).copied()
    }

    /// Blocks in source order; every pass iterates this way unless it
    /// specifically needs (reverse) postorder, which is computed on demand.
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = vec![(self.entry, 0usize)];
        visited[self.entry.index()] = true;
        while let Some((block, next_succ)) = stack.pop() {
            if next_succ < self.block(block).succ.len() {
                let succ = self.block(block).succ[next_succ];
                stack.push((block, next_succ + 1));
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                order.push(block);
            }
        }
        order
    }

    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }
}

pub fn build(code: &[MirStmt], entry_label: LabelId) -> Cfg {
    let mut leaders = vec![0usize];
    for (i, stmt) in code.iter().enumerate() {
        if matches!(stmt, MirStmt::Label(_)) {
            leaders.push(i);
        }
        if stmt.is_terminator() && i + 1 < code.len() {
            leaders.push(i + 1);
        }
    }
    leaders.sort_unstable();
    leaders.dedup();

    let mut blocks = Vec::new();
    let mut label_to_block = HashMap::new();
    for (idx, &start) in leaders.iter().enumerate() {
        let end = leaders.get(idx + 1).copied().unwrap_or(code.len());
        let stmts: Vec<MirStmt> = code[start..end].to_vec();
        let label = stmts.first().and_then(|s| if let MirStmt::Label(l) = s { Some(*l) } else { None });
        let id = BlockId(blocks.len() as u32);
        if let Some(l) = label {
            label_to_block.insert(l, id);
        }
        blocks.push(BasicBlock { id, label, stmts, succ: Vec::new(), pred: Vec::new() });
    }

    for idx in 0..blocks.len() {
        let last = blocks[idx].stmts.last();
        let mut succ: Vec<BlockId> = match last {
            Some(stmt) if stmt.is_terminator() => {
                stmt.label_targets().into_iter().filter_map(|l| label_to_block.get(&l).copied()).collect()
            }
            _ => {
                // Falls through to the next block when the last statement
                // is not itself a jump/switch.
                blocks.get(idx + 1).map(|b| b.id).into_iter().collect()
            }
        };
        succ.sort_by_key(|b| b.0);
        succ.dedup();
        blocks[idx].succ = succ;
    }
    for idx in 0..blocks.len() {
        let succs = blocks[idx].succ.clone();
        let id = blocks[idx].id;
        for s in succs {
            blocks[s.index()].pred.push(id);
        }
    }

    let entry = label_to_block.get(&entry_label).copied().unwrap_or(BlockId(0));
    Cfg { blocks, entry, label_to_block }
}
