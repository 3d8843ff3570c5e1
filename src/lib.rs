//! # Lantern
//!
//! Predictive page-load simulation. Lantern takes a browser trace and the
//! network log recorded during one page load, turns them into a dependency
//! graph of network requests and main-thread tasks, and replays that graph
//! under different network and CPU conditions to estimate load metrics
//! without loading the page again.
//!
//! ## Pipeline
//!
//! - **Graph builder** ([`builder`]): requests and tasks become nodes; edges
//!   come from redirects, initiators and the trace events inside each task.
//! - **Contention simulator** ([`simulator`]): a deterministic discrete-event
//!   replay with per-origin connection limits, handshake costs and a single
//!   CPU lane.
//! - **Metric extractors** ([`metrics`]): each metric simulates an
//!   optimistic and a pessimistic subgraph and blends the two estimates.
//! - **Computation cache** ([`cache`]): every stage is memoized per
//!   [`AnalysisRun`], so shared work happens once even when metrics are
//!   computed concurrently.
//!
//! ## Quick Start
//!
//! ```rust
//! use lantern::config::ThrottlingSettings;
//! use lantern::node::{NetworkNode, Node};
//! use lantern::{simulate, Graph, PolicyMode, ResourcePolicy};
//!
//! // A document and the script it loads
//! let graph = Graph::from_nodes(vec![
//!     Node::network(0, NetworkNode::new("1", "https://example.com/", 0.0, 200.0)),
//!     Node::network(1, NetworkNode::new("2", "https://example.com/app.js", 200.0, 400.0))
//!         .with_dependencies([0]),
//! ])
//! .unwrap();
//!
//! let settings = ThrottlingSettings::default();
//! let fast = simulate(&graph, &ResourcePolicy::optimistic(&settings)).unwrap();
//! let slow = simulate(&graph, &ResourcePolicy::pessimistic(&settings)).unwrap();
//!
//! assert_eq!(fast.mode, PolicyMode::Optimistic);
//! assert!(fast.time_in_ms < slow.time_in_ms);
//! ```
//!
//! ## Features
//!
//! - `parallel` - compute the metrics of a run on a rayon thread pool
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use lantern::{AnalysisConfig, AnalysisRun, PageArtifacts};
//!
//! let config = AnalysisConfig::from_file("throttling.yaml")?;
//! let run = AnalysisRun::new(config);
//! let metrics = run.compute_all(&PageArtifacts::from_json(&trace, &log)?)?;
//! ```

pub mod types;
pub mod error;
pub mod event;
pub mod network;
pub mod node;
pub mod graph;
pub mod config;
pub mod builder;
pub mod policy;
pub mod connection;
pub mod simulator;
pub mod cache;
pub mod computed;
pub mod metrics;
pub mod run;
pub mod stats;

// Re-export commonly used types
pub use types::{NodeId, SimTime};
pub use error::{LanternError, Result};
pub use event::{ProcessedTrace, Trace, TraceEvent};
pub use network::{NetworkLog, NetworkRecord, ResourcePriority, ResourceType};
pub use node::{CpuNode, NetworkNode, Node, NodeKind};
pub use graph::Graph;
pub use config::{AnalysisConfig, AnalysisConfigBuilder, ConfigError};
pub use builder::{build, GraphBuilder};
pub use policy::{PolicyMode, ResourcePolicy};
pub use simulator::{simulate, NodeTiming, SimulationResult, Simulator};
pub use cache::{Computation, ComputationCache};
pub use computed::PageArtifacts;
pub use metrics::{LanternMetric, MetricEstimate, MetricKind, MetricResult};
pub use run::AnalysisRun;
pub use stats::{RunStats, Timer};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// lantern::init_logging("debug");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
