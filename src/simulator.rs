//! Contention simulator.
//!
//! The [`Simulator`] replays a [`Graph`] under a [`ResourcePolicy`]. It is a
//! deterministic discrete-event loop:
//!
//! - the root is ready at time 0;
//! - each step walks the ready set in resolution order (ready time, then
//!   observed start, then node id) and starts every node whose resource is
//!   free: the single CPU lane for tasks, a connection slot for requests;
//! - the clock then advances to the earliest completion; everything that
//!   completes at that instant releases its resource and unblocks its
//!   dependents.
//!
//! The loop ends when nothing is in flight and nothing can start. Nodes that
//! never got a timing indicate a cycle or a dangling edge.
//!
//! A pessimistic replay first replays the graph under the policy's optimistic
//! [`baseline`](ResourcePolicy::baseline) and never starts a node before its
//! baseline start. Pessimistic durations are never shorter, so every node,
//! and the whole load, ends no earlier than under the optimistic policy.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use tracing::{debug, error, trace};

use crate::connection::{ConnectionPool, Lease};
use crate::error::{LanternError, Result};
use crate::graph::Graph;
use crate::node::{CpuNode, CpuTaskKind, NodeKind};
use crate::policy::{PolicyMode, ResourcePolicy};
use crate::types::{NodeId, OrderedTime, SimTime};

/// Simulated timing of a single node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTiming {
    pub start: SimTime,
    pub end: SimTime,
    pub duration: SimTime,
}

impl NodeTiming {
    pub fn new(start: SimTime, duration: SimTime) -> Self {
        Self {
            start,
            end: start + duration,
            duration,
        }
    }
}

/// Outcome of one simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub mode: PolicyMode,
    /// End of the last node
    pub time_in_ms: SimTime,
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
}

impl SimulationResult {
    pub fn timing(&self, id: NodeId) -> Option<&NodeTiming> {
        self.node_timings.get(&id)
    }
}

/// Counters collected while simulating.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimulatorStats {
    /// Clock advances
    pub steps: u64,
    pub nodes_started: u64,
    /// Times a ready request found its origin's slots taken
    pub connection_waits: u64,
    pub max_in_flight: usize,
}

/// Ready-set key: ready time, observed start, node id.
type ReadyKey = (OrderedTime, OrderedTime, NodeId);

/// Replays graphs under a resource policy.
#[derive(Debug, Default)]
pub struct Simulator {
    stats: SimulatorStats,
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates `graph` under `policy`.
    ///
    /// Fails with [`LanternError::CycleDetected`] when some nodes never
    /// become ready.
    pub fn simulate(
        &mut self,
        graph: &Graph,
        policy: &ResourcePolicy,
    ) -> Result<SimulationResult> {
        let floor = match policy.baseline() {
            Some(baseline) => Some(Simulator::new().replay(graph, &baseline, None)?),
            None => None,
        };
        self.replay(graph, policy, floor.as_ref())
    }

    fn replay(
        &mut self,
        graph: &Graph,
        policy: &ResourcePolicy,
        floor: Option<&SimulationResult>,
    ) -> Result<SimulationResult> {
        let mut pool = ConnectionPool::new(policy);
        let mut remaining: Vec<usize> =
            graph.nodes().iter().map(|n| n.dependencies.len()).collect();
        let mut ready: BTreeSet<ReadyKey> = BTreeSet::new();
        let mut in_flight: BinaryHeap<Reverse<(OrderedTime, NodeId)>> = BinaryHeap::new();
        let mut leases: HashMap<NodeId, Lease> = HashMap::new();
        let mut timings: BTreeMap<NodeId, NodeTiming> = BTreeMap::new();
        let mut cpu_busy = false;
        let mut clock: SimTime = 0.0;

        if !graph.is_empty() {
            let root = graph.root_node();
            ready.insert((OrderedTime(0.0), OrderedTime(root.start()), root.id));
        }

        loop {
            let mut started = Vec::new();
            // earliest baseline start among ready nodes held back
            let mut next_release: Option<SimTime> = None;
            for &key in &ready {
                let id = key.2;
                let Some(node) = graph.node(id) else { continue };
                if let Some(earliest) = floor.and_then(|f| f.timing(id)).map(|t| t.start) {
                    if earliest > clock {
                        next_release = Some(next_release.map_or(earliest, |t| t.min(earliest)));
                        continue;
                    }
                }
                let duration = match &node.kind {
                    NodeKind::Cpu(cpu) => {
                        if cpu_busy {
                            continue;
                        }
                        cpu_busy = true;
                        cpu_duration(cpu, policy)
                    }
                    NodeKind::Network(net) => match pool.try_acquire(net) {
                        Some(lease) => {
                            leases.insert(id, lease);
                            pool.request_duration(net)
                        }
                        None => {
                            self.stats.connection_waits += 1;
                            continue;
                        }
                    },
                };

                let timing = NodeTiming::new(clock, duration);
                trace!(node = id, start = timing.start, end = timing.end, "started");
                timings.insert(id, timing);
                in_flight.push(Reverse((OrderedTime(timing.end), id)));
                started.push(key);
            }
            for key in &started {
                ready.remove(key);
            }
            self.stats.nodes_started += started.len() as u64;
            self.stats.max_in_flight = self.stats.max_in_flight.max(in_flight.len());

            let next_completion =
                in_flight.peek().copied().map(|Reverse((OrderedTime(end), _))| end);
            clock = match (next_completion, next_release) {
                (Some(completion), Some(release)) => completion.min(release),
                (Some(next), None) | (None, Some(next)) => next,
                (None, None) => break,
            };
            self.stats.steps += 1;

            while let Some(Reverse((OrderedTime(end), id))) = in_flight.peek().copied() {
                if end.total_cmp(&clock).is_ne() {
                    break;
                }
                in_flight.pop();

                if graph.node(id).map_or(false, |n| n.is_cpu()) {
                    cpu_busy = false;
                }
                if let Some(lease) = leases.remove(&id) {
                    pool.release(lease);
                }

                for &dependent in graph.dependents(id) {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        let start = graph.node(dependent).map_or(0.0, |n| n.start());
                        ready.insert((OrderedTime(clock), OrderedTime(start), dependent));
                    }
                }
            }
        }

        if timings.len() < graph.len() {
            let unresolved: Vec<NodeId> =
                (0..graph.len()).filter(|id| !timings.contains_key(id)).collect();
            error!(
                mode = %policy.mode,
                unresolved = ?unresolved,
                "simulation finished with unresolved nodes"
            );
            return Err(LanternError::CycleDetected { unresolved });
        }

        let time_in_ms = timings.values().map(|t| t.end).fold(0.0, f64::max);
        debug!(
            mode = %policy.mode,
            nodes = timings.len(),
            time_in_ms,
            "simulation complete"
        );

        Ok(SimulationResult {
            mode: policy.mode,
            time_in_ms,
            node_timings: timings,
        })
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::to_value(&self.stats).unwrap_or(serde_json::Value::Null)
    }
}

/// Simulates `graph` under `policy` with a throwaway simulator.
pub fn simulate(graph: &Graph, policy: &ResourcePolicy) -> Result<SimulationResult> {
    Simulator::new().simulate(graph, policy)
}

fn cpu_duration(cpu: &CpuNode, policy: &ResourcePolicy) -> SimTime {
    let multiplier = if cpu.kind == CpuTaskKind::Layout {
        policy.layout_task_multiplier()
    } else {
        policy.cpu_multiplier
    };
    cpu.duration * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottlingSettings;
    use crate::event::TraceEvent;
    use crate::node::{CpuNode, NetworkNode, Node};

    fn settings() -> ThrottlingSettings {
        ThrottlingSettings {
            rtt_ms: 100.0,
            throughput_kbps: 8000.0,
            max_connections_per_origin: 1,
            ..ThrottlingSettings::default()
        }
    }

    fn request(id: NodeId, url: &str, deps: &[NodeId]) -> Node {
        Node::network(id, NetworkNode::new(id.to_string(), url, 0.0, 1.0))
            .with_dependencies(deps.iter().copied())
    }

    fn task(id: NodeId, start: SimTime, duration: SimTime, deps: &[NodeId]) -> Node {
        Node::cpu(id, CpuNode::new(start, duration, Vec::new()))
            .with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_chain_optimistic() {
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            task(1, 10.0, 50.0, &[0]),
            request(2, "http://a.test/app.js", &[1]),
        ])
        .unwrap();

        let result = simulate(&graph, &ResourcePolicy::optimistic(&settings())).unwrap();
        assert_eq!(result.mode, PolicyMode::Optimistic);
        assert_eq!(result.timing(0), Some(&NodeTiming::new(0.0, 100.0)));
        assert_eq!(result.timing(1), Some(&NodeTiming::new(100.0, 50.0)));
        assert_eq!(result.timing(2), Some(&NodeTiming::new(150.0, 100.0)));
        assert_eq!(result.time_in_ms, 250.0);
    }

    #[test]
    fn test_cpu_lane_is_exclusive() {
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            task(1, 10.0, 30.0, &[0]),
            task(2, 20.0, 30.0, &[0]),
        ])
        .unwrap();

        let result = simulate(&graph, &ResourcePolicy::optimistic(&settings())).unwrap();
        // earlier observed start runs first
        assert_eq!(result.timing(1).unwrap().start, 100.0);
        assert_eq!(result.timing(2).unwrap().start, 130.0);
    }

    #[test]
    fn test_connection_limit_serializes_requests() {
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            request(1, "http://b.test/1", &[0]),
            request(2, "http://b.test/2", &[0]),
        ])
        .unwrap();

        let optimistic = simulate(&graph, &ResourcePolicy::optimistic(&settings())).unwrap();
        assert_eq!(optimistic.timing(1).unwrap().start, 100.0);
        assert_eq!(optimistic.timing(2).unwrap().start, 100.0);

        let pessimistic = simulate(&graph, &ResourcePolicy::pessimistic(&settings())).unwrap();
        // cold origin: dns 2 + tcp 1 + request 1
        assert_eq!(pessimistic.timing(0), Some(&NodeTiming::new(0.0, 400.0)));
        assert_eq!(pessimistic.timing(1), Some(&NodeTiming::new(400.0, 400.0)));
        // slot freed at 800; same origin, empty connection id -> warm
        assert_eq!(pessimistic.timing(2), Some(&NodeTiming::new(800.0, 100.0)));
        assert_eq!(pessimistic.time_in_ms, 900.0);
    }

    #[test]
    fn test_cpu_multipliers() {
        let layout = CpuNode::new(0.0, 10.0, vec![TraceEvent::complete("Layout", 0.0, 10.0)]);
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            task(1, 10.0, 10.0, &[0]),
            Node::cpu(2, layout).with_dependencies([1]),
        ])
        .unwrap();

        let result = simulate(&graph, &ResourcePolicy::pessimistic(&settings())).unwrap();
        assert_eq!(result.timing(1).unwrap().duration, 40.0);
        // max(1, 4 * 0.5)
        assert_eq!(result.timing(2).unwrap().duration, 20.0);
    }

    #[test]
    fn test_cycle_detected() {
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            task(1, 10.0, 10.0, &[0, 2]),
            task(2, 20.0, 10.0, &[1]),
        ])
        .unwrap();

        let err = simulate(&graph, &ResourcePolicy::optimistic(&settings())).unwrap_err();
        assert_eq!(err, LanternError::CycleDetected { unresolved: vec![1, 2] });
    }

    #[test]
    fn test_dangling_edge_detected() {
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            task(1, 10.0, 10.0, &[0, 9]),
        ])
        .unwrap();
        let err = simulate(&graph, &ResourcePolicy::optimistic(&settings())).unwrap_err();
        assert_eq!(err, LanternError::CycleDetected { unresolved: vec![1] });
    }

    #[test]
    fn test_stats() {
        let graph = Graph::from_nodes(vec![
            request(0, "http://a.test/", &[]),
            request(1, "http://b.test/1", &[0]),
            request(2, "http://b.test/2", &[0]),
        ])
        .unwrap();

        let mut simulator = Simulator::new();
        simulator.simulate(&graph, &ResourcePolicy::pessimistic(&settings())).unwrap();
        let stats = simulator.export_stats();
        assert_eq!(stats["nodes_started"], 3);
        assert_eq!(stats["connection_waits"], 1);
    }
}
