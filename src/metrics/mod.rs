//! Metric extraction.
//!
//! Every metric follows the same pipeline, implemented once in
//! [`compute_metric`]:
//!
//! 1. select an optimistic and a pessimistic subgraph of the page graph;
//! 2. simulate each under the matching [`ResourcePolicy`];
//! 3. extract an estimate from each simulation;
//! 4. blend the two estimates with the metric's [`BlendCoefficients`].
//!
//! Each stage goes through the run's [`ComputationCache`], so metrics that
//! share a graph or a simulation only pay for it once.

pub mod first_cpu_idle;
pub mod first_meaningful_paint;
pub mod input_latency;
pub mod interactive;

pub use first_cpu_idle::{first_cpu_idle_window_start, FirstCpuIdle};
pub use first_meaningful_paint::FirstMeaningfulPaint;
pub use input_latency::{events_after_fmp, rolling_window_eil, EstimatedInputLatency};
pub use interactive::{find_quiet_window, Interactive};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{Computation, ComputationCache};
use crate::computed::{
    ComputePageGraph, ComputeProcessedTrace, ComputeSimulation, GraphInput, PageArtifacts,
    SimulationInput,
};
use crate::config::{AnalysisConfig, BlendCoefficients, MetricSettings};
use crate::error::{LanternError, Result};
use crate::event::ProcessedTrace;
use crate::graph::Graph;
use crate::policy::{PolicyMode, ResourcePolicy};
use crate::simulator::{NodeTiming, SimulationResult};
use crate::types::{NodeId, SimTime};

/// The metrics this crate estimates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    FirstMeaningfulPaint,
    Interactive,
    FirstCpuIdle,
    EstimatedInputLatency,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::FirstMeaningfulPaint,
        MetricKind::Interactive,
        MetricKind::FirstCpuIdle,
        MetricKind::EstimatedInputLatency,
    ];

    /// Stable identifier used as the key of run results.
    pub fn id(self) -> &'static str {
        match self {
            MetricKind::FirstMeaningfulPaint => "first-meaningful-paint",
            MetricKind::Interactive => "interactive",
            MetricKind::FirstCpuIdle => "first-cpu-idle",
            MetricKind::EstimatedInputLatency => "estimated-input-latency",
        }
    }

    /// Computes this metric through `cache`.
    pub fn request(
        self,
        input: &MetricInput,
        cache: &ComputationCache,
    ) -> Result<Arc<MetricResult>> {
        match self {
            MetricKind::FirstMeaningfulPaint => {
                cache.request(&MetricComputation(FirstMeaningfulPaint), input)
            }
            MetricKind::Interactive => cache.request(&MetricComputation(Interactive), input),
            MetricKind::FirstCpuIdle => cache.request(&MetricComputation(FirstCpuIdle), input),
            MetricKind::EstimatedInputLatency => {
                cache.request(&MetricComputation(EstimatedInputLatency), input)
            }
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Estimate extracted from one simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricEstimate {
    pub time_in_ms: SimTime,
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
    /// Windows or tasks that decided the estimate
    #[serde(default)]
    pub considered: Vec<NodeTiming>,
}

impl MetricEstimate {
    /// An estimate equal to the simulated total time.
    pub fn from_simulation(simulation: &SimulationResult) -> Self {
        Self {
            time_in_ms: simulation.time_in_ms,
            node_timings: simulation.node_timings.clone(),
            considered: Vec::new(),
        }
    }
}

/// A blended metric value and the two estimates it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub timing: SimTime,
    pub optimistic_estimate: MetricEstimate,
    pub pessimistic_estimate: MetricEstimate,
    pub optimistic_graph: Arc<Graph>,
    pub pessimistic_graph: Arc<Graph>,
}

impl MetricResult {
    pub fn estimate(&self, mode: PolicyMode) -> &MetricEstimate {
        match mode {
            PolicyMode::Optimistic => &self.optimistic_estimate,
            PolicyMode::Pessimistic => &self.pessimistic_estimate,
        }
    }
}

/// Input of every metric computation.
#[derive(Clone, Debug, Serialize)]
pub struct MetricInput {
    pub artifacts: PageArtifacts,
    pub config: AnalysisConfig,
}

impl MetricInput {
    pub fn new(artifacts: PageArtifacts, config: AnalysisConfig) -> Self {
        Self { artifacts, config }
    }
}

/// What a metric sees besides its graphs and simulations.
#[derive(Clone, Copy, Debug)]
pub struct MetricContext<'a> {
    pub processed: &'a ProcessedTrace,
    pub settings: &'a MetricSettings,
    /// Present when the metric asked for it
    pub first_meaningful_paint: Option<&'a MetricResult>,
}

impl MetricContext<'_> {
    /// The estimated first meaningful paint for one side.
    pub fn first_meaningful_paint_estimate(&self, mode: PolicyMode) -> Result<SimTime> {
        self.first_meaningful_paint
            .map(|fmp| fmp.estimate(mode).time_in_ms)
            .ok_or_else(|| {
                LanternError::Cache("first meaningful paint was not requested".to_string())
            })
    }
}

/// A metric estimated from an optimistic and a pessimistic simulation.
pub trait LanternMetric: Send + Sync {
    /// Cache name.
    fn name(&self) -> &'static str;

    fn coefficients(&self, settings: &MetricSettings) -> BlendCoefficients;

    /// Whether [`MetricContext::first_meaningful_paint`] must be filled.
    fn needs_first_meaningful_paint(&self) -> bool {
        true
    }

    fn optimistic_graph(&self, graph: &Graph, ctx: &MetricContext<'_>) -> Result<Graph>;

    fn pessimistic_graph(&self, graph: &Graph, ctx: &MetricContext<'_>) -> Result<Graph>;

    /// Extracts the estimate from a simulation of one of the two graphs.
    fn estimate(
        &self,
        simulation: &SimulationResult,
        graph: &Graph,
        ctx: &MetricContext<'_>,
    ) -> Result<MetricEstimate>;

    /// Adjusts the blended result.
    fn finalize(&self, result: MetricResult, _ctx: &MetricContext<'_>) -> MetricResult {
        result
    }
}

/// Adapts a [`LanternMetric`] to the computation cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricComputation<M>(pub M);

impl<M: LanternMetric> Computation for MetricComputation<M> {
    type Input = MetricInput;
    type Output = MetricResult;

    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn compute(&self, input: &MetricInput, cache: &ComputationCache) -> Result<MetricResult> {
        compute_metric(&self.0, input, cache)
    }
}

/// Runs the common metric pipeline.
pub fn compute_metric<M: LanternMetric + ?Sized>(
    metric: &M,
    input: &MetricInput,
    cache: &ComputationCache,
) -> Result<MetricResult> {
    let processed = cache.request(&ComputeProcessedTrace, input.artifacts.trace.as_ref())?;
    let graph = cache.request(
        &ComputePageGraph,
        &GraphInput {
            artifacts: input.artifacts.clone(),
            options: input.config.graph.clone(),
        },
    )?;
    let fmp = if metric.needs_first_meaningful_paint() {
        Some(cache.request(&MetricComputation(FirstMeaningfulPaint), input)?)
    } else {
        None
    };

    let ctx = MetricContext {
        processed: &processed,
        settings: &input.config.metrics,
        first_meaningful_paint: fmp.as_deref(),
    };

    let optimistic_graph = Arc::new(metric.optimistic_graph(&graph, &ctx)?);
    let pessimistic_graph = Arc::new(metric.pessimistic_graph(&graph, &ctx)?);

    let throttling = &input.config.throttling;
    let optimistic_simulation = cache.request(
        &ComputeSimulation,
        &SimulationInput {
            graph: Arc::clone(&optimistic_graph),
            policy: ResourcePolicy::optimistic(throttling),
        },
    )?;
    let pessimistic_simulation = cache.request(
        &ComputeSimulation,
        &SimulationInput {
            graph: Arc::clone(&pessimistic_graph),
            policy: ResourcePolicy::pessimistic(throttling),
        },
    )?;

    let optimistic_estimate = metric.estimate(&optimistic_simulation, &optimistic_graph, &ctx)?;
    let pessimistic_estimate = metric.estimate(&pessimistic_simulation, &pessimistic_graph, &ctx)?;

    let timing = metric
        .coefficients(ctx.settings)
        .blend(optimistic_estimate.time_in_ms, pessimistic_estimate.time_in_ms);
    debug!(
        metric = metric.name(),
        optimistic = optimistic_estimate.time_in_ms,
        pessimistic = pessimistic_estimate.time_in_ms,
        timing,
        "metric estimated"
    );

    let result = MetricResult {
        timing,
        optimistic_estimate,
        pessimistic_estimate,
        optimistic_graph,
        pessimistic_graph,
    };
    Ok(metric.finalize(result, &ctx))
}

/// Simulated timings of the graph's CPU nodes, in node order.
pub fn cpu_timings(simulation: &SimulationResult, graph: &Graph) -> Vec<NodeTiming> {
    graph
        .cpu_nodes()
        .filter_map(|(id, _)| simulation.timing(id).copied())
        .collect()
}

/// Simulated timings of the graph's network nodes, in node order.
pub fn network_timings(simulation: &SimulationResult, graph: &Graph) -> Vec<NodeTiming> {
    graph
        .network_nodes()
        .filter_map(|(id, _)| simulation.timing(id).copied())
        .collect()
}
