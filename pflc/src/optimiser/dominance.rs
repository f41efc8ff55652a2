//! Dominance: dominator tree and dominance frontiers, used by
//! `enter_ssa` to place φ-nodes and by `exit_ssa` to resolve them.

use std::collections::{HashMap, HashSet};

use petgraph::algo::dominators::simple_fast;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::cfg::Cfg;
use crate::ids::BlockId;

pub struct DomInfo {
    pub idom: HashMap<BlockId, BlockId>,
    pub frontier: HashMap<BlockId, HashSet<BlockId>>,
    pub children: HashMap<BlockId, Vec<BlockId>>,
}

pub fn compute(cfg: &Cfg) -> DomInfo {
    let mut g = DiGraph::<(), ()>::new();
    let nodes: Vec<NodeIndex> = (0..cfg.blocks().len()).map(|_| g.add_node(())).collect();
    for block in cfg.blocks() {
        for &s in &block.succ {
            g.add_edge(nodes[block.id.index()], nodes[s.index()], ());
        }
    }
    let doms = simple_fast(&g, nodes[cfg.entry.index()]);

    let mut idom = HashMap::new();
    for block in cfg.blocks() {
        if block.id == cfg.entry {
            continue;
        }
        if let Some(d) = doms.immediate_dominator(nodes[block.id.index()]) {
            idom.insert(block.id, BlockId(d.index() as u32));
        }
    }

    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (&n, &d) in &idom {
        children.entry(d).or_default().push(n);
    }

    // Cytron/Ferrante/Rosen/Zadeck dominance frontier: for every join block
    // `b` (two or more predecessors), walk each predecessor up the
    // dominator tree until reaching `idom(b)`, adding `b` to every block
    // visited along the way.
    let mut frontier: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for block in cfg.blocks() {
        if block.pred.len() < 2 {
            continue;
        }
        for &p in &block.pred {
            let mut runner = p;
            loop {
                if idom.get(&block.id) == Some(&runner) {
                    break;
                }
                frontier.entry(runner).or_default().insert(block.id);
                match idom.get(&runner) {
                    Some(&d) => runner = d,
                    None => break,
                }
            }
        }
    }

    DomInfo { idom, frontier, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use crate::ids::LabelId;
    use crate::mir::{MirArena, MirOp, MirStmt};

    /// entry -> {left, right} -> join: join's only frontier-eligible block
    /// is itself, and entry strictly dominates everything.
    #[test]
    fn a_diamond_cfg_puts_the_join_in_both_branches_frontiers() {
        let mut arena = MirArena::new();
        let (entry, left, right, join) = (LabelId(0), LabelId(1), LabelId(2), LabelId(3));
        let cond = arena.alloc(MirOp::Const, None, None, Some(1));
        let code = vec![
            MirStmt::Label(entry),
            MirStmt::CondJump { cond, true_label: left, false_label: right },
            MirStmt::Label(left),
            MirStmt::Jump(join),
            MirStmt::Label(right),
            MirStmt::Jump(join),
            MirStmt::Label(join),
        ];
        let built = cfg::build(&code, entry);
        let dom = compute(&built);
        let left_id = built.block_of_label(left).unwrap();
        let right_id = built.block_of_label(right).unwrap();
        let join_id = built.block_of_label(join).unwrap();
        assert_eq!(dom.idom[&join_id], built.entry);
        assert!(dom.frontier.get(&left_id).map_or(false, |f| f.contains(&join_id)));
        assert!(dom.frontier.get(&right_id).map_or(false, |f| f.contains(&join_id)));
    }
}
