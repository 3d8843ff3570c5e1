//! First CPU idle.
//!
//! The main thread is first idle at the end of the first long task followed
//! by a long enough window with no bad task cluster in it. The required
//! window shrinks exponentially the later the candidate is: 5 s right at
//! first meaningful paint, 3 s fifteen seconds later, approaching 1 s.
//!
//! Long tasks closer than [`CLUSTER_PADDING_MS`] form a cluster. A cluster
//! is bad when it lasts more than [`MAX_CLUSTER_DURATION_MS`] or starts
//! within [`MIN_CLUSTER_FMP_DISTANCE_MS`] of first meaningful paint.

use crate::config::{BlendCoefficients, MetricSettings};
use crate::error::Result;
use crate::graph::Graph;
use crate::simulator::{NodeTiming, SimulationResult};
use crate::types::{OrderedTime, SimTime};

use super::interactive::Interactive;
use super::{cpu_timings, LanternMetric, MetricContext, MetricEstimate};

pub const CLUSTER_PADDING_MS: SimTime = 1000.0;
pub const MAX_CLUSTER_DURATION_MS: SimTime = 250.0;
pub const MIN_CLUSTER_FMP_DISTANCE_MS: SimTime = 5000.0;

#[derive(Clone, Copy, Debug, Default)]
pub struct FirstCpuIdle;

impl LanternMetric for FirstCpuIdle {
    fn name(&self) -> &'static str {
        "LanternFirstCPUIdle"
    }

    fn coefficients(&self, settings: &MetricSettings) -> BlendCoefficients {
        settings.first_cpu_idle
    }

    fn optimistic_graph(&self, graph: &Graph, _ctx: &MetricContext<'_>) -> Result<Graph> {
        Ok(Interactive::important_work(graph))
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
        let fmp = ctx.first_meaningful_paint_estimate(simulation.mode)?;
        let tasks = cpu_timings(simulation, graph);
        let threshold = ctx.settings.long_task_threshold_ms;

        Ok(MetricEstimate {
            time_in_ms: first_cpu_idle_window_start(&tasks, fmp, threshold),
            node_timings: simulation.node_timings.clone(),
            considered: long_tasks(&tasks, threshold),
        })
    }
}

/// Required quiet window for a candidate `t` ms after first meaningful paint.
pub fn required_window_ms(t: SimTime) -> SimTime {
    let coefficient = -(2f64.ln()) / 15.0;
    (4.0 * (coefficient * t / 1000.0).exp() + 1.0) * 1000.0
}

/// Start of the first CPU-idle window given the simulated CPU timings.
///
/// Tasks shorter than `long_task_threshold_ms` are ignored.
pub fn first_cpu_idle_window_start(
    cpu: &[NodeTiming],
    fmp: SimTime,
    long_task_threshold_ms: SimTime,
) -> SimTime {
    let tasks = long_tasks(cpu, long_task_threshold_ms);
    let Some(first) = tasks.first() else {
        return fmp;
    };
    if first.start > fmp + required_window_ms(0.0) {
        return fmp;
    }

    for (i, task) in tasks.iter().enumerate() {
        let window_start = task.end;
        let window_end = window_start + required_window_ms(window_start - fmp);

        // the next task continues this one's cluster
        if tasks
            .get(i + 1)
            .map_or(false, |next| next.start - window_start <= CLUSTER_PADDING_MS)
        {
            continue;
        }

        let is_bad = |cluster: &NodeTiming| {
            cluster.start < fmp + MIN_CLUSTER_FMP_DISTANCE_MS
                || cluster.duration > MAX_CLUSTER_DURATION_MS
        };
        if !clusters_in_window(&tasks[i + 1..], window_end).iter().any(is_bad) {
            return window_start;
        }
    }

    // the last long task is never followed by a cluster
    tasks.last().map_or(fmp, |t| t.end)
}

fn long_tasks(cpu: &[NodeTiming], threshold: SimTime) -> Vec<NodeTiming> {
    let mut tasks: Vec<NodeTiming> =
        cpu.iter().filter(|t| t.duration >= threshold).copied().collect();
    tasks.sort_by_key(|t| OrderedTime(t.start));
    tasks
}

/// Groups `tasks` into clusters that start before `window_end`.
///
/// Tasks starting up to one padding past the window still join a cluster
/// that began inside it.
fn clusters_in_window(tasks: &[NodeTiming], window_end: SimTime) -> Vec<NodeTiming> {
    let clustering_end = window_end + CLUSTER_PADDING_MS;
    let mut clusters: Vec<NodeTiming> = Vec::new();
    let mut previous_end = SimTime::NEG_INFINITY;

    for task in tasks.iter().take_while(|t| t.start < clustering_end) {
        match clusters.last_mut() {
            Some(cluster) if task.start - previous_end <= CLUSTER_PADDING_MS => {
                *cluster = NodeTiming::new(cluster.start, task.end - cluster.start);
            }
            _ => clusters.push(*task),
        }
        previous_end = task.end;
    }

    clusters.retain(|c| c.start < window_end);
    clusters
}
