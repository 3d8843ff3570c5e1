//! Cached pipeline stages shared by every metric.
//!
//! | Computation | Input | Output |
//! |-------------|-------|--------|
//! | [`ComputeProcessedTrace`] | [`Trace`] | [`ProcessedTrace`] |
//! | [`ComputePageGraph`] | [`GraphInput`] | [`Graph`] |
//! | [`ComputeSimulation`] | [`SimulationInput`] | [`SimulationResult`] |

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::builder::GraphBuilder;
use crate::cache::{Computation, ComputationCache};
use crate::config::GraphOptions;
use crate::error::Result;
use crate::event::{ProcessedTrace, Trace};
use crate::graph::Graph;
use crate::network::NetworkLog;
use crate::policy::ResourcePolicy;
use crate::simulator::{SimulationResult, Simulator};

/// The recorded page load being analysed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageArtifacts {
    pub trace: Arc<Trace>,
    pub network_log: Arc<NetworkLog>,
}

impl PageArtifacts {
    pub fn new(trace: Trace, network_log: NetworkLog) -> Self {
        Self {
            trace: Arc::new(trace),
            network_log: Arc::new(network_log),
        }
    }

    /// Parses both artifacts from JSON.
    pub fn from_json(trace: &str, network_log: &str) -> Result<Self> {
        Ok(Self::new(Trace::from_json(trace)?, NetworkLog::from_json(network_log)?))
    }
}

/// Input of [`ComputePageGraph`].
#[derive(Clone, Debug, Serialize)]
pub struct GraphInput {
    pub artifacts: PageArtifacts,
    pub options: GraphOptions,
}

/// Input of [`ComputeSimulation`].
#[derive(Clone, Debug, Serialize)]
pub struct SimulationInput {
    pub graph: Arc<Graph>,
    pub policy: ResourcePolicy,
}

/// Extracts navigation markers and main-thread events.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeProcessedTrace;

impl Computation for ComputeProcessedTrace {
    type Input = Trace;
    type Output = ProcessedTrace;

    fn name(&self) -> &'static str {
        "ProcessedTrace"
    }

    fn compute(&self, trace: &Trace, _cache: &ComputationCache) -> Result<ProcessedTrace> {
        ProcessedTrace::from_trace(trace)
    }
}

/// Builds the page dependency graph.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputePageGraph;

impl Computation for ComputePageGraph {
    type Input = GraphInput;
    type Output = Graph;

    fn name(&self) -> &'static str {
        "PageDependencyGraph"
    }

    fn compute(&self, input: &GraphInput, cache: &ComputationCache) -> Result<Graph> {
        let processed = cache.request(&ComputeProcessedTrace, input.artifacts.trace.as_ref())?;
        GraphBuilder::new(input.options.clone())
            .build_from_processed(&processed, &input.artifacts.network_log)
    }
}

/// Replays a graph under a policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeSimulation;

impl Computation for ComputeSimulation {
    type Input = SimulationInput;
    type Output = SimulationResult;

    fn name(&self) -> &'static str {
        "LoadSimulation"
    }

    fn compute(
        &self,
        input: &SimulationInput,
        _cache: &ComputationCache,
    ) -> Result<SimulationResult> {
        let mut simulator = Simulator::new();
        let result = simulator.simulate(&input.graph, &input.policy)?;
        debug!(mode = %input.policy.mode, stats = %simulator.export_stats(), "simulated");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottlingSettings;
    use crate::node::{NetworkNode, Node};

    fn two_requests() -> Graph {
        Graph::from_nodes(vec![
            Node::network(0, NetworkNode::new("0", "https://a.test/", 0.0, 10.0)),
            Node::network(1, NetworkNode::new("1", "https://a.test/app.js", 10.0, 20.0))
                .with_dependencies([0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_simulation_shared_between_equal_graphs() {
        let cache = ComputationCache::new();
        let settings = ThrottlingSettings::default();

        let first = SimulationInput {
            graph: Arc::new(two_requests()),
            policy: ResourcePolicy::optimistic(&settings),
        };
        let second = SimulationInput {
            graph: Arc::new(two_requests()),
            policy: ResourcePolicy::optimistic(&settings),
        };

        let a = cache.request(&ComputeSimulation, &first).unwrap();
        let b = cache.request(&ComputeSimulation, &second).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().executions, 1);

        let pessimistic = SimulationInput {
            policy: ResourcePolicy::pessimistic(&settings),
            ..second
        };
        cache.request(&ComputeSimulation, &pessimistic).unwrap();
        assert_eq!(cache.entries_for("LoadSimulation"), 2);
    }

    #[test]
    fn test_processed_trace_failure_is_cached() {
        let cache = ComputationCache::new();
        let trace = Trace::new(Vec::new());

        assert!(cache.request(&ComputeProcessedTrace, &trace).is_err());
        assert!(cache.request(&ComputeProcessedTrace, &trace).is_err());
        assert_eq!(cache.stats().executions, 1);
        assert_eq!(cache.stats().failures, 1);
    }
}
