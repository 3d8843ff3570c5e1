//! The page dependency graph.
//!
//! A [`Graph`] is an arena of [`Node`]s addressed by [`NodeId`]. Each node
//! stores its dependencies; dependents are derived once when the graph is
//! assembled. Graphs are immutable: metric-specific views are new graphs
//! produced by [`Graph::retain_with_dependencies`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{LanternError, Result};
use crate::node::{CpuNode, NetworkNode, Node, NodeKind};
use crate::types::NodeId;

/// A single-rooted dependency graph of network and CPU nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphRepr")]
pub struct Graph {
    nodes: Vec<Node>,
    root: NodeId,
    #[serde(skip)]
    dependents: Vec<Vec<NodeId>>,
}

#[derive(Deserialize)]
struct GraphRepr {
    nodes: Vec<Node>,
}

impl TryFrom<GraphRepr> for Graph {
    type Error = LanternError;

    fn try_from(repr: GraphRepr) -> Result<Self> {
        Graph::from_nodes(repr.nodes)
    }
}

impl Graph {
    /// Assembles a graph from nodes whose ids are their positions.
    ///
    /// Exactly one node may be without dependencies; it becomes the root.
    /// Dependencies on ids outside the arena are kept as-is and surface as
    /// unresolvable nodes during simulation.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self> {
        if let Some((index, node)) = nodes.iter().enumerate().find(|(i, n)| n.id != *i) {
            return Err(LanternError::MalformedInput(format!(
                "node at position {} has id {}",
                index, node.id
            )));
        }

        let roots: Vec<NodeId> = nodes
            .iter()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.id)
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => return Err(LanternError::NoRoot("every node has a dependency".to_string())),
            many => {
                return Err(LanternError::NoRoot(format!(
                    "{} nodes without dependencies: {:?}",
                    many.len(),
                    many
                )))
            }
        };

        let mut dependents = vec![Vec::new(); nodes.len()];
        for node in &nodes {
            for &dep in &node.dependencies {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(node.id);
                }
            }
        }

        Ok(Self {
            nodes,
            root,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &Node {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.dependencies.as_slice()).unwrap_or(&[])
    }

    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Network nodes with their ids.
    pub fn network_nodes(&self) -> impl Iterator<Item = (NodeId, &NetworkNode)> {
        self.nodes.iter().filter_map(|n| n.as_network().map(|net| (n.id, net)))
    }

    /// CPU nodes with their ids.
    pub fn cpu_nodes(&self) -> impl Iterator<Item = (NodeId, &CpuNode)> {
        self.nodes.iter().filter_map(|n| n.as_cpu().map(|cpu| (n.id, cpu)))
    }

    /// Returns node ids in dependency order (Kahn's algorithm).
    ///
    /// Fails with [`LanternError::CycleDetected`] listing the nodes that
    /// could not be ordered.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &next in self.dependents(id) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let unresolved = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(LanternError::CycleDetected { unresolved });
        }
        Ok(order)
    }

    /// Keeps every node matching `predicate`, all of their transitive
    /// dependencies and the root; ids are reassigned in arena order.
    pub fn retain_with_dependencies<F>(&self, predicate: F) -> Graph
    where
        F: Fn(&Node) -> bool,
    {
        let mut keep = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| predicate(n))
            .map(|n| n.id)
            .collect();
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if keep[id] {
                continue;
            }
            keep[id] = true;
            stack.extend(self.dependencies(id).iter().filter(|&&d| d < keep.len()));
        }

        let mut remap = vec![None; self.nodes.len()];
        let mut next_id = 0;
        for (old, kept) in keep.iter().enumerate() {
            if *kept {
                remap[old] = Some(next_id);
                next_id += 1;
            }
        }

        let nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter_map(|node| {
                let id = remap[node.id]?;
                let mut kind = node.kind.clone();
                if let NodeKind::Network(net) = &mut kind {
                    net.initiator = net.initiator.and_then(|i| remap.get(i).copied().flatten());
                }
                let dependencies = node
                    .dependencies
                    .iter()
                    .filter_map(|&d| remap.get(d).copied().flatten())
                    .collect();
                Some(Node {
                    id,
                    kind,
                    dependencies,
                })
            })
            .collect();

        let root = remap[self.root].unwrap_or(0);
        let mut dependents = vec![Vec::new(); nodes.len()];
        for node in &nodes {
            for &dep in &node.dependencies {
                dependents[dep].push(node.id);
            }
        }

        Graph {
            nodes,
            root,
            dependents,
        }
    }

    /// Summary used in logs and run statistics.
    pub fn export_stats(&self) -> serde_json::Value {
        let network = self.nodes.iter().filter(|n| n.is_network()).count();
        let edges: usize = self.nodes.iter().map(|n| n.dependencies.len()).sum();
        serde_json::json!({
            "nodes": self.nodes.len(),
            "network_nodes": network,
            "cpu_nodes": self.nodes.len() - network,
            "edges": edges,
            "root": self.root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CpuNode;

    fn cpu(id: NodeId, deps: &[NodeId]) -> Node {
        Node::cpu(id, CpuNode::new(id as f64 * 10.0, 5.0, Vec::new()))
            .with_dependencies(deps.iter().copied())
    }

    fn diamond() -> Graph {
        //   0
        //  / \
        // 1   2
        //  \ /
        //   3
        Graph::from_nodes(vec![cpu(0, &[]), cpu(1, &[0]), cpu(2, &[0]), cpu(3, &[1, 2])]).unwrap()
    }

    #[test]
    fn test_from_nodes_derives_dependents() {
        let graph = diamond();
        assert_eq!(graph.root(), 0);
        assert_eq!(graph.dependents(0), &[1, 2]);
        assert_eq!(graph.dependents(1), &[3]);
        assert_eq!(graph.dependencies(3), &[1, 2]);
        assert!(graph.dependents(3).is_empty());
    }

    #[test]
    fn test_from_nodes_rejects_two_roots() {
        let err = Graph::from_nodes(vec![cpu(0, &[]), cpu(1, &[])]).unwrap_err();
        assert!(matches!(err, LanternError::NoRoot(_)));
    }

    #[test]
    fn test_from_nodes_rejects_misplaced_id() {
        let err = Graph::from_nodes(vec![cpu(0, &[]), cpu(5, &[0])]).unwrap_err();
        assert!(matches!(err, LanternError::MalformedInput(_)));
    }

    #[test]
    fn test_topological_order_diamond() {
        let order = diamond().topological_order().unwrap();
        assert_eq!(order[0], 0);
        assert_eq!(order[3], 3);
    }

    #[test]
    fn test_topological_order_cycle() {
        let graph = Graph::from_nodes(vec![cpu(0, &[]), cpu(1, &[0, 2]), cpu(2, &[1])]).unwrap();
        let err = graph.topological_order().unwrap_err();
        assert_eq!(err, LanternError::CycleDetected { unresolved: vec![1, 2] });
    }

    #[test]
    fn test_retain_with_dependencies() {
        let graph = diamond();
        let kept = graph.retain_with_dependencies(|n| n.id == 1);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept.root(), 0);
        assert_eq!(kept.dependencies(1), &[0]);
        assert_eq!(kept.node(1).map(|n| n.start()), Some(10.0));
    }

    #[test]
    fn test_retain_reindexes() {
        let graph = diamond();
        let kept = graph.retain_with_dependencies(|n| n.id == 3);
        assert_eq!(kept.len(), 4);

        let kept = graph.retain_with_dependencies(|n| n.id == 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.node(1).map(|n| n.start()), Some(20.0));
        assert!(kept.topological_order().is_ok());
    }

    #[test]
    fn test_serde_rebuilds_dependents() {
        let graph = diamond();
        let json = serde_json::to_string(&graph).unwrap();
        let restored: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.dependents(0), &[1, 2]);
        assert_eq!(restored, graph);
    }
}
