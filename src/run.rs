//! Analysis runs.
//!
//! An [`AnalysisRun`] owns the [`ComputationCache`] for one page load. Every
//! request made through the run shares that cache, so the trace is processed
//! once, the graph is built once and each (graph, policy) pair is simulated
//! once no matter how many metrics ask for it. Dropping the run, or calling
//! [`AnalysisRun::finish`], discards the cache.
//!
//! # Example
//!
//! ```ignore
//! use lantern::{AnalysisConfig, AnalysisRun, PageArtifacts};
//!
//! let artifacts = PageArtifacts::from_json(&trace_json, &network_json)?;
//! let run = AnalysisRun::new(AnalysisConfig::default()).with_name("example.com");
//! let metrics = run.compute_all(&artifacts)?;
//! println!("interactive: {:.0} ms", metrics["interactive"].timing);
//!
//! let stats = run.finish();
//! stats.to_trace_file("run.trace.json")?;
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::ComputationCache;
use crate::computed::{
    ComputePageGraph, ComputeProcessedTrace, ComputeSimulation, GraphInput, PageArtifacts,
    SimulationInput,
};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::event::ProcessedTrace;
use crate::graph::Graph;
use crate::metrics::{MetricInput, MetricKind, MetricResult};
use crate::policy::{PolicyMode, ResourcePolicy};
use crate::simulator::SimulationResult;
use crate::stats::{RunStats, Timer};

/// One analysis of one or more recorded page loads.
pub struct AnalysisRun {
    config: AnalysisConfig,
    cache: ComputationCache,
    stats: RunStats,
    timer: Timer,
    /// Worker threads for `compute_all` (0 = rayon default)
    num_threads: usize,
}

impl AnalysisRun {
    pub fn new(config: AnalysisConfig) -> Self {
        let mut stats = RunStats::new();
        stats.record_start();
        Self {
            config,
            cache: ComputationCache::new(),
            stats,
            timer: Timer::start(),
            num_threads: 0,
        }
    }

    /// Sets the run name used in statistics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.stats.metadata.name = name.into();
        self
    }

    /// Sets the number of worker threads for [`AnalysisRun::compute_all`].
    ///
    /// Only used with the `parallel` feature.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &ComputationCache {
        &self.cache
    }

    pub fn processed_trace(&self, artifacts: &PageArtifacts) -> Result<Arc<ProcessedTrace>> {
        self.cache.request(&ComputeProcessedTrace, artifacts.trace.as_ref())
    }

    pub fn page_graph(&self, artifacts: &PageArtifacts) -> Result<Arc<Graph>> {
        self.cache.request(
            &ComputePageGraph,
            &GraphInput {
                artifacts: artifacts.clone(),
                options: self.config.graph.clone(),
            },
        )
    }

    /// Simulates `graph` under the policy for `mode`.
    pub fn simulate(&self, graph: Arc<Graph>, mode: PolicyMode) -> Result<Arc<SimulationResult>> {
        self.cache.request(
            &ComputeSimulation,
            &SimulationInput {
                graph,
                policy: ResourcePolicy::for_mode(mode, &self.config.throttling),
            },
        )
    }

    pub fn metric(&self, kind: MetricKind, artifacts: &PageArtifacts) -> Result<Arc<MetricResult>> {
        kind.request(&self.metric_input(artifacts), &self.cache)
    }

    pub fn first_meaningful_paint(&self, artifacts: &PageArtifacts) -> Result<Arc<MetricResult>> {
        self.metric(MetricKind::FirstMeaningfulPaint, artifacts)
    }

    pub fn interactive(&self, artifacts: &PageArtifacts) -> Result<Arc<MetricResult>> {
        self.metric(MetricKind::Interactive, artifacts)
    }

    pub fn first_cpu_idle(&self, artifacts: &PageArtifacts) -> Result<Arc<MetricResult>> {
        self.metric(MetricKind::FirstCpuIdle, artifacts)
    }

    pub fn estimated_input_latency(&self, artifacts: &PageArtifacts) -> Result<Arc<MetricResult>> {
        self.metric(MetricKind::EstimatedInputLatency, artifacts)
    }

    /// Computes every metric, keyed by [`MetricKind::id`].
    pub fn compute_all(&self, artifacts: &PageArtifacts) -> Result<BTreeMap<String, MetricResult>> {
        self.compute_metrics(&MetricKind::ALL, artifacts)
    }

    /// Computes the given metrics sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn compute_metrics(
        &self,
        kinds: &[MetricKind],
        artifacts: &PageArtifacts,
    ) -> Result<BTreeMap<String, MetricResult>> {
        let input = self.metric_input(artifacts);
        let outcomes: Vec<(MetricKind, Result<Arc<MetricResult>>)> = kinds
            .iter()
            .map(|&kind| (kind, kind.request(&input, &self.cache)))
            .collect();
        Self::collect_results(outcomes)
    }

    /// Computes the given metrics in parallel.
    ///
    /// Shared stages are still computed once: workers that need an entry
    /// another worker is computing wait for it.
    #[cfg(feature = "parallel")]
    pub fn compute_metrics(
        &self,
        kinds: &[MetricKind],
        artifacts: &PageArtifacts,
    ) -> Result<BTreeMap<String, MetricResult>> {
        let input = self.metric_input(artifacts);
        let compute = || -> Vec<(MetricKind, Result<Arc<MetricResult>>)> {
            kinds
                .par_iter()
                .map(|&kind| (kind, kind.request(&input, &self.cache)))
                .collect()
        };

        let pool = if self.num_threads > 0 {
            rayon::ThreadPoolBuilder::new().num_threads(self.num_threads).build().ok()
        } else {
            None
        };
        let outcomes = match pool {
            Some(pool) => pool.install(compute),
            None => compute(),
        };
        Self::collect_results(outcomes)
    }

    fn collect_results(
        outcomes: Vec<(MetricKind, Result<Arc<MetricResult>>)>,
    ) -> Result<BTreeMap<String, MetricResult>> {
        let mut results = BTreeMap::new();
        for (kind, outcome) in outcomes {
            let result = outcome?;
            debug!(metric = %kind, timing = result.timing, "metric ready");
            results.insert(kind.id().to_string(), result.as_ref().clone());
        }
        Ok(results)
    }

    fn metric_input(&self, artifacts: &PageArtifacts) -> MetricInput {
        MetricInput::new(artifacts.clone(), self.config.clone())
    }

    /// Exports cache statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let cache = self.cache.stats();
        serde_json::json!({
            "run": {
                "name": self.stats.metadata.name,
                "elapsed_ms": self.timer.elapsed_ms(),
                "parallel": cfg!(feature = "parallel"),
            },
            "cache": {
                "entries": self.cache.len(),
                "requests": cache.requests,
                "hits": cache.hits,
                "executions": cache.executions,
                "failures": cache.failures,
            },
        })
    }

    /// Ends the run, discarding the cache.
    pub fn finish(self) -> RunStats {
        let mut stats = self.stats;
        stats.record_end();
        stats.cache = self.cache.stats();
        stats.measures = self.cache.measures();
        stats.total_wall_time_ms = self.timer.elapsed_ms();

        info!(
            name = %stats.metadata.name,
            executions = stats.cache.executions,
            hits = stats.cache.hits,
            wall_time_ms = stats.total_wall_time_ms,
            "analysis run finished"
        );
        stats
    }
}

impl std::fmt::Debug for AnalysisRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRun")
            .field("name", &self.stats.metadata.name)
            .field("cache", &self.cache)
            .finish()
    }
}
