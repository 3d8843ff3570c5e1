//! Time to interactive.
//!
//! The page is interactive at the start of the first quiet window after
//! first meaningful paint. Only long CPU tasks starting at or after the
//! reference paint are considered. A window is quiet when none of them
//! overlaps it and the network has at most a couple of requests in flight
//! throughout. Candidate window starts are the reference paint itself and the
//! end of every considered long task or request after it.

use crate::config::{BlendCoefficients, MetricSettings};
use crate::error::Result;
use crate::graph::Graph;
use crate::network::{ResourcePriority, ResourceType};
use crate::node::NodeKind;
use crate::simulator::{NodeTiming, SimulationResult};
use crate::types::{OrderedTime, SimTime};

use super::{
    cpu_timings, network_timings, LanternMetric, MetricContext, MetricEstimate, MetricResult,
};

/// CPU tasks at or below this length are left out of the optimistic graph.
const MIN_CPU_TASK_DURATION_MS: SimTime = 20.0;

#[derive(Clone, Copy, Debug, Default)]
pub struct Interactive;

impl Interactive {
    /// Graph of the work that can plausibly delay interactivity.
    pub(crate) fn important_work(graph: &Graph) -> Graph {
        graph.retain_with_dependencies(|node| match &node.kind {
            NodeKind::Cpu(cpu) => cpu.duration > MIN_CPU_TASK_DURATION_MS,
            NodeKind::Network(net) => {
                net.resource_type != ResourceType::Image
                    && (net.is_script() || net.priority >= ResourcePriority::High)
            }
        })
    }
}

impl LanternMetric for Interactive {
    fn name(&self) -> &'static str {
        "LanternInteractive"
    }

    fn coefficients(&self, settings: &MetricSettings) -> BlendCoefficients {
        settings.interactive
    }

    fn optimistic_graph(&self, graph: &Graph, _ctx: &MetricContext<'_>) -> Result<Graph> {
        Ok(Self::important_work(graph))
    }

    fn pessimistic_graph(&self, graph: &Graph, _ctx: &MetricContext<'_>) -> Result<Graph> {
        Ok(graph.clone())
    }

    fn estimate(
        &self,
        simulation: &SimulationResult,
        graph: &Graph,
        ctx: &MetricContext<'_>,
    ) -> Result<MetricEstimate> {
        let reference = ctx.first_meaningful_paint_estimate(simulation.mode)?;
        let window = find_quiet_window(
            reference,
            &cpu_timings(simulation, graph),
            &network_timings(simulation, graph),
            ctx.settings,
        );

        Ok(MetricEstimate {
            time_in_ms: window.map_or(simulation.time_in_ms, |w| w.start),
            node_timings: simulation.node_timings.clone(),
            considered: window.into_iter().collect(),
        })
    }

    /// Interactivity never precedes the first meaningful paint.
    fn finalize(&self, mut result: MetricResult, ctx: &MetricContext<'_>) -> MetricResult {
        if let Some(fmp) = ctx.first_meaningful_paint {
            result.timing = result.timing.max(fmp.timing);
        }
        result
    }
}

/// Finds the first quiet window at or after `reference`.
///
/// Returns `None` when every candidate is busy.
pub fn find_quiet_window(
    reference: SimTime,
    cpu: &[NodeTiming],
    requests: &[NodeTiming],
    settings: &MetricSettings,
) -> Option<NodeTiming> {
    let long_tasks: Vec<&NodeTiming> = cpu
        .iter()
        .filter(|task| task.start >= reference && task.duration > settings.long_task_threshold_ms)
        .collect();

    let mut candidates: Vec<SimTime> = long_tasks
        .iter()
        .copied()
        .chain(requests.iter())
        .map(|t| t.end)
        .filter(|&end| end > reference)
        .collect();
    candidates.push(reference);
    candidates.sort_by_key(|&t| OrderedTime(t));
    candidates.dedup();

    candidates.into_iter().find_map(|start| {
        let window = NodeTiming::new(start, settings.quiet_window_ms);
        let busy_cpu = long_tasks.iter().any(|task| overlaps(task, &window));
        let quiet = !busy_cpu
            && max_in_flight(requests, &window) <= settings.max_in_flight_requests;
        quiet.then_some(window)
    })
}

fn overlaps(timing: &NodeTiming, window: &NodeTiming) -> bool {
    timing.start < window.end && timing.end > window.start
}

/// Peak number of requests in flight inside `window`.
fn max_in_flight(requests: &[NodeTiming], window: &NodeTiming) -> usize {
    // a request ending at t no longer counts against one starting at t
    let mut edges: Vec<(OrderedTime, i32)> = requests
        .iter()
        .filter(|r| overlaps(r, window))
        .flat_map(|r| [(OrderedTime(r.start.max(window.start)), 1), (OrderedTime(r.end), -1)])
        .collect();
    edges.sort_by_key(|&(t, delta)| (t, delta));

    let mut current = 0i32;
    let mut peak = 0i32;
    for (_, delta) in edges {
        current += delta;
        peak = peak.max(current);
    }
    peak as usize
}
