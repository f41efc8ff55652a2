//! Encapsulation Graph (component B): a directed graph of protocols whose
//! edges are the legal inner-follows-outer relations declared by each
//! protocol's encapsulation section.
//!
//! Built once per database load and never mutated by a `compile()` call;
//! grounded on the same `petgraph`-backed dependency graph
//! shape as `prost-build`'s `MessageGraph`, swapped from
//! `Graph<String, ()>` + `has_path_connecting` for nested-message detection
//! to a `StableDiGraph<ProtoId, bool>` so unsupported/unreachable protocols
//! can be pruned without invalidating the rest of the node indices.

use std::collections::{HashMap, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;

use crate::error::Fatal;
use crate::ids::ProtoId;
use crate::symtab::GlobalSymbols;

pub struct EncapGraph {
    graph: StableDiGraph<ProtoId, bool>,
    index: HashMap<ProtoId, NodeIndex>,
    start: NodeIndex,
}

impl EncapGraph {
    /// Builds the full encapsulation graph from every protocol's
    /// encapsulation section, plus the edges declared `preferred`.
    pub fn build(global: &GlobalSymbols) -> Result<EncapGraph, Fatal> {
        let mut graph = StableDiGraph::new();
        let mut index = HashMap::new();

        for proto in global.protos() {
            let node = graph.add_node(proto.id);
            index.insert(proto.id, node);
        }

        let start_proto = global.startproto.ok_or(Fatal::MissingStartProto)?;
        let start = index[&start_proto];

        for proto in global.protos() {
            let from = index[&proto.id];
            let preferred: std::collections::HashSet<&str> =
                proto.preferred_next.iter().map(String::as_str).collect();
            for case in &proto.encapsulation {
                let Some(&to) = global
                    .proto_by_name(&case.next_proto)
                    .and_then(|id| index.get(&id))
                else {
                    continue;
                };
                let is_preferred = preferred.contains(case.next_proto.as_str());
                graph.add_edge(from, to, is_preferred);
            }
        }

        Ok(EncapGraph { graph, index, start })
    }

    pub fn start_proto(&self) -> ProtoId {
        self.graph[self.start]
    }

    pub fn get_node(&self, proto: ProtoId) -> Option<NodeIndex> {
        self.index.get(&proto).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = ProtoId> + '_ {
        self.graph.node_indices().map(move |n| self.graph[n])
    }

    pub fn add_edge(&mut self, from: ProtoId, to: ProtoId, preferred: bool) {
        let (Some(&a), Some(&b)) = (self.index.get(&from), self.index.get(&to)) else {
            return;
        };
        self.graph.add_edge(a, b, preferred);
    }

    /// All protocols `proto`'s encapsulation section may select.
    pub fn full_successors(&self, proto: ProtoId) -> Vec<ProtoId> {
        let Some(&node) = self.index.get(&proto) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect()
    }

    /// Only the successors whose edge the database author flagged preferred.
    pub fn preferred_successors(&self, proto: ProtoId) -> Vec<ProtoId> {
        let Some(&node) = self.index.get(&proto) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .filter(|e| *e.weight())
            .map(|e| self.graph[e.target()])
            .collect()
    }

    /// Drops protocols the database parser flagged unsupported
    /// (`ProtoSym::supported == false`). Returns `true` if anything was
    /// removed.
    pub fn remove_unsupported_nodes(&mut self, global: &GlobalSymbols) -> bool {
        let to_remove: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| !global.proto(self.graph[n]).supported)
            .collect();
        let removed = !to_remove.is_empty();
        if removed {
            log::debug!("pruning {} unsupported protocol(s) from the encapsulation graph", to_remove.len());
        }
        for node in to_remove {
            self.graph.remove_node(node);
        }
        self.index.retain(|_, node| self.graph.contains_node(*node));
        removed
    }

    /// Drops every node not reachable from `startproto`.
    pub fn remove_unconnected_nodes(&mut self) {
        let mut dfs = Dfs::new(&self.graph, self.start);
        let mut reachable = std::collections::HashSet::new();
        while let Some(n) = dfs.next(&self.graph) {
            reachable.insert(n);
        }
        let to_remove: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| !reachable.contains(n))
            .collect();
        if !to_remove.is_empty() {
            log::debug!("pruning {} unreachable protocol(s) from the encapsulation graph", to_remove.len());
        }
        for node in to_remove {
            self.graph.remove_node(node);
        }
        self.index.retain(|_, node| self.graph.contains_node(*node));
    }

    pub fn is_connected(&self) -> bool {
        let mut dfs = Dfs::new(&self.graph, self.start);
        let mut count = 0;
        while dfs.next(&self.graph).is_some() {
            count += 1;
        }
        count == self.graph.node_count()
    }

    /// Longest-path-from-`startproto` layer assignment, written back onto
    /// each `ProtoSym::layer`. Cyclic encapsulation (e.g. IP-in-IP tunnels)
    /// is handled by a bounded relaxation pass rather than true longest-path
    /// (which is undefined on a graph with cycles): each node's layer is the
    /// length of the longest *acyclic* prefix reaching it via BFS layering,
    /// which is what the `tunneled` keyword needs (strictly increasing depth
    /// along one pass through a tunnel, not a global topological longest
    /// path).
    pub fn assign_layers(&self, global: &mut GlobalSymbols) {
        // A self-loop or any other cycle would otherwise relax its member
        // nodes forever (each pass through the cycle strictly increases the
        // candidate depth). Capping total relaxations per node at the node
        // count bounds the walk to "one pass through every tunnel", which is
        // all the `tunneled` keyword's strictly-increasing-depth check needs.
        let budget = self.graph.node_count().max(1) as u32;
        let mut layer = HashMap::new();
        let mut relaxations: HashMap<NodeIndex, u32> = HashMap::new();
        layer.insert(self.start, 0u32);
        let mut queue = VecDeque::new();
        queue.push_back(self.start);
        while let Some(node) = queue.pop_front() {
            let here = layer[&node];
            for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let candidate = here + 1;
                let improved = match layer.get(&succ) {
                    Some(&existing) => candidate > existing,
                    None => true,
                };
                let count = relaxations.entry(succ).or_insert(0);
                if improved && *count < budget {
                    *count += 1;
                    layer.insert(succ, candidate);
                    queue.push_back(succ);
                }
            }
        }
        for (&node, &depth) in &layer {
            global.proto_mut(self.graph[node]).layer = depth;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{sample_database, ErrorSink};

    #[test]
    fn start_proto_is_the_only_source() {
        let mut recorder = ErrorSink::new();
        let global = GlobalSymbols::from_database(sample_database(), &mut recorder.0).unwrap();
        let graph = EncapGraph::build(&global).unwrap();
        assert!(graph.is_connected());
        assert_eq!(global.proto(graph.start_proto()).name, "startproto");
    }

    #[test]
    fn unconnected_nodes_are_pruned() {
        let mut recorder = ErrorSink::new();
        let global = GlobalSymbols::from_database(sample_database(), &mut recorder.0).unwrap();
        let mut graph = EncapGraph::build(&global).unwrap();
        let before = graph.nodes().count();
        graph.remove_unconnected_nodes();
        assert_eq!(graph.nodes().count(), before);
        assert!(graph.is_connected());
    }

    #[test]
    fn layers_increase_along_ip_tcp() {
        let mut recorder = ErrorSink::new();
        let mut global = GlobalSymbols::from_database(sample_database(), &mut recorder.0).unwrap();
        let graph = EncapGraph::build(&global).unwrap();
        graph.assign_layers(&mut global);
        let ip = global.proto(global.proto_by_name("ip").unwrap()).layer;
        let tcp = global.proto(global.proto_by_name("tcp").unwrap()).layer;
        assert!(tcp > ip);
    }
}
