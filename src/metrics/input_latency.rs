//! Estimated input latency.
//!
//! Models how long an input arriving at a random moment would wait for the
//! main thread. Every CPU task that ends after first meaningful paint is a
//! source of queueing delay; a rolling window starts at each task of at
//! least [`MIN_WINDOW_START_TASK_MS`] and the metric is the worst window's
//! 90th-percentile delay plus [`BASE_RESPONSE_LATENCY_MS`].
//!
//! Both sides simulate the full graph. Each side uses the *opposite* side's
//! first meaningful paint: a later paint excludes more tasks, so pairing the
//! optimistic simulation with the pessimistic paint keeps the bounds apart.

use crate::config::{BlendCoefficients, MetricSettings};
use crate::error::Result;
use crate::graph::Graph;
use crate::simulator::{NodeTiming, SimulationResult};
use crate::types::{OrderedTime, SimTime};

use super::{cpu_timings, LanternMetric, MetricContext, MetricEstimate};

/// Latency added to every input, ms.
pub const BASE_RESPONSE_LATENCY_MS: SimTime = 16.0;
pub const ROLLING_WINDOW_MS: SimTime = 5000.0;
pub const MIN_WINDOW_START_TASK_MS: SimTime = 10.0;
const PERCENTILE: f64 = 0.9;

#[derive(Clone, Copy, Debug, Default)]
pub struct EstimatedInputLatency;

impl LanternMetric for EstimatedInputLatency {
    fn name(&self) -> &'static str {
        "LanternEstimatedInputLatency"
    }

    fn coefficients(&self, settings: &MetricSettings) -> BlendCoefficients {
        settings.estimated_input_latency
    }

    fn optimistic_graph(&self, graph: &Graph, _ctx: &MetricContext<'_>) -> Result<Graph> {
        Ok(graph.clone())
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
        let fmp = ctx.first_meaningful_paint_estimate(simulation.mode.opposite())?;
        let events = events_after_fmp(&cpu_timings(simulation, graph), fmp);

        Ok(MetricEstimate {
            time_in_ms: rolling_window_eil(&events),
            node_timings: simulation.node_timings.clone(),
            considered: events,
        })
    }
}

/// CPU timings that end at or after `fmp`, sorted by start.
pub fn events_after_fmp(cpu: &[NodeTiming], fmp: SimTime) -> Vec<NodeTiming> {
    let mut events: Vec<NodeTiming> = cpu.iter().filter(|t| t.end >= fmp).copied().collect();
    events.sort_by_key(|t| OrderedTime(t.start));
    events
}

/// Worst 90th-percentile latency over rolling windows, never below the base
/// latency.
pub fn rolling_window_eil(events: &[NodeTiming]) -> SimTime {
    events
        .iter()
        .filter(|e| e.duration >= MIN_WINDOW_START_TASK_MS)
        .map(|start| {
            let end = start.start + ROLLING_WINDOW_MS;
            let latencies = risk_to_responsiveness(events, start.start, end, &[PERCENTILE]);
            latencies.first().copied().unwrap_or(BASE_RESPONSE_LATENCY_MS)
        })
        .fold(BASE_RESPONSE_LATENCY_MS, f64::max)
}

/// Expected input latency at each of `percentiles` for inputs arriving
/// uniformly inside `[start, end)`.
///
/// Tasks are clipped to the window. An input inside a task still running at
/// `end` waits for the task's real end, so that task keeps its full remaining
/// length and the part past the window is tracked as the clipped length.
pub fn risk_to_responsiveness(
    events: &[NodeTiming],
    start: SimTime,
    end: SimTime,
    percentiles: &[f64],
) -> Vec<SimTime> {
    let total_time = end - start;
    let mut clipped_length = 0.0;
    let mut durations = Vec::new();

    for event in events {
        if event.end <= start || event.start >= end {
            continue;
        }
        let clipped_start = event.start.max(start);
        if event.end > end {
            clipped_length = event.end - end;
        }
        durations.push(event.end - clipped_start);
    }
    durations.sort_by_key(|&d| OrderedTime(d));

    risk_percentiles(&durations, total_time, percentiles, clipped_length)
}

/// Percentiles of the queueing-delay distribution.
///
/// `durations` must be sorted ascending. Idle time contributes zero delay;
/// inside a task of length `d` the delay is uniform over `[0, d)`. The loop
/// walks the CDF (scaled by `total_time`) from the shortest task up.
fn risk_percentiles(
    durations: &[SimTime],
    total_time: SimTime,
    percentiles: &[f64],
    mut clipped_length: SimTime,
) -> Vec<SimTime> {
    let busy_time: SimTime = durations.iter().sum::<SimTime>() - clipped_length;

    let mut completed_time = total_time - busy_time;
    let mut duration = 0.0;
    let mut cdf_time = completed_time;
    let mut results = Vec::with_capacity(percentiles.len());

    let mut next_index = 0;
    let mut remaining_count = durations.len() as f64 + 1.0;
    if clipped_length > 0.0 {
        // the clipped task only adds waits longer than the clipped length
        remaining_count -= 1.0;
    }

    for &percentile in percentiles {
        let percentile_time = percentile * total_time;
        while cdf_time < percentile_time && next_index < durations.len() {
            completed_time += duration;
            remaining_count -= if duration < 0.0 { -1.0 } else { 1.0 };

            if clipped_length > 0.0 && clipped_length < durations[next_index] {
                duration = -clipped_length;
                clipped_length = 0.0;
            } else {
                duration = durations[next_index];
                next_index += 1;
            }

            cdf_time = completed_time + duration.abs() * remaining_count;
        }

        let queueing = ((percentile_time - completed_time) / remaining_count).max(0.0);
        results.push(queueing + BASE_RESPONSE_LATENCY_MS);
    }

    results
}
