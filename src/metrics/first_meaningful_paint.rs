//! First meaningful paint.
//!
//! Both graphs only contain nodes that had finished by the observed first
//! meaningful paint. The optimistic graph keeps the render-blocking requests
//! the parser issued and the tasks that evaluated those scripts; the
//! pessimistic graph keeps every render-blocking request plus the tasks that
//! evaluated them or performed layout.

use std::collections::HashSet;

use crate::config::{BlendCoefficients, MetricSettings};
use crate::error::Result;
use crate::graph::Graph;
use crate::network::InitiatorType;
use crate::node::{CpuNode, NetworkNode, NodeKind};
use crate::simulator::SimulationResult;

use super::{LanternMetric, MetricContext, MetricEstimate};

/// First meaningful paint estimate. Other metrics use it as their reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstMeaningfulPaint;

impl LanternMetric for FirstMeaningfulPaint {
    fn name(&self) -> &'static str {
        "LanternFirstMeaningfulPaint"
    }

    fn coefficients(&self, settings: &MetricSettings) -> BlendCoefficients {
        settings.first_meaningful_paint
    }

    fn needs_first_meaningful_paint(&self) -> bool {
        false
    }

    fn optimistic_graph(&self, graph: &Graph, ctx: &MetricContext<'_>) -> Result<Graph> {
        let fmp = ctx.processed.require_first_meaningful_paint()?;
        let parser_blocking = |net: &NetworkNode| {
            net.is_render_blocking() && net.initiator_type != InitiatorType::Script
        };
        let blocking_scripts = script_urls(graph, |net| net.end <= fmp && parser_blocking(net));

        Ok(graph.retain_with_dependencies(|node| {
            if node.end() > fmp {
                return false;
            }
            match &node.kind {
                NodeKind::Cpu(cpu) => evaluates_any(cpu, &blocking_scripts),
                NodeKind::Network(net) => parser_blocking(net),
            }
        }))
    }

    fn pessimistic_graph(&self, graph: &Graph, ctx: &MetricContext<'_>) -> Result<Graph> {
        let fmp = ctx.processed.require_first_meaningful_paint()?;
        let required_scripts = script_urls(graph, |net| net.end <= fmp && net.is_render_blocking());

        Ok(graph.retain_with_dependencies(|node| {
            if node.end() > fmp {
                return false;
            }
            match &node.kind {
                NodeKind::Cpu(cpu) => {
                    cpu.did_perform_layout() || evaluates_any(cpu, &required_scripts)
                }
                NodeKind::Network(net) => net.is_render_blocking(),
            }
        }))
    }

    fn estimate(
        &self,
        simulation: &SimulationResult,
        _graph: &Graph,
        _ctx: &MetricContext<'_>,
    ) -> Result<MetricEstimate> {
        Ok(MetricEstimate::from_simulation(simulation))
    }
}

/// URLs of script requests matching `filter`.
fn script_urls<F>(graph: &Graph, filter: F) -> HashSet<&str>
where
    F: Fn(&NetworkNode) -> bool,
{
    graph
        .network_nodes()
        .filter(|(_, net)| net.is_script() && filter(net))
        .map(|(_, net)| net.url.as_str())
        .collect()
}

fn evaluates_any(cpu: &CpuNode, urls: &HashSet<&str>) -> bool {
    urls.iter().any(|url| cpu.is_evaluate_script_for(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::event::{ProcessedTrace, TraceEvent};
    use crate::network::{ResourcePriority, ResourceType};
    use crate::node::{CpuNode, NetworkNode, Node};
    use crate::policy::PolicyMode;
    use crate::types::SimTime;
    use serde_json::json;

    fn processed(fmp: SimTime) -> ProcessedTrace {
        ProcessedTrace {
            navigation_start_us: 0.0,
            main_pid: 1,
            main_tid: 1,
            first_contentful_paint: None,
            first_meaningful_paint: Some(fmp),
            trace_end: 5000.0,
            main_thread_events: Vec::new(),
        }
    }

    fn eval_task(start: SimTime, url: &str) -> CpuNode {
        CpuNode::new(
            start,
            20.0,
            vec![
                TraceEvent::complete("EvaluateScript", 0.0, 20_000.0)
                    .with_data(json!({ "url": url })),
            ],
        )
    }

    //   0 document
    //   ├── 1 blocking script (parser)   ── 3 eval(1)
    //   ├── 2 blocking script (script)   ── 4 eval(2)
    //   ├── 5 layout task
    //   └── 6 late stylesheet
    fn graph() -> Graph {
        let doc = NetworkNode::new("0", "https://a.test/", 0.0, 100.0)
            .with_type(ResourceType::Document)
            .with_priority(ResourcePriority::VeryHigh);
        let parser_script = NetworkNode::new("1", "https://a.test/a.js", 100.0, 200.0)
            .with_type(ResourceType::Script)
            .with_priority(ResourcePriority::High);
        let mut injected_script = NetworkNode::new("2", "https://a.test/b.js", 110.0, 210.0)
            .with_type(ResourceType::Script)
            .with_priority(ResourcePriority::High);
        injected_script.initiator_type = InitiatorType::Script;
        let layout = CpuNode::new(
            300.0,
            15.0,
            vec![TraceEvent::complete("Layout", 0.0, 15_000.0)],
        );
        let late = NetworkNode::new("6", "https://a.test/late.css", 400.0, 2000.0)
            .with_type(ResourceType::Stylesheet)
            .with_priority(ResourcePriority::VeryHigh);

        Graph::from_nodes(vec![
            Node::network(0, doc),
            Node::network(1, parser_script).with_dependencies([0]),
            Node::network(2, injected_script).with_dependencies([0]),
            Node::cpu(3, eval_task(220.0, "https://a.test/a.js")).with_dependencies([1]),
            Node::cpu(4, eval_task(250.0, "https://a.test/b.js")).with_dependencies([2]),
            Node::cpu(5, layout).with_dependencies([0]),
            Node::network(6, late).with_dependencies([0]),
        ])
        .unwrap()
    }

    fn urls(graph: &Graph) -> Vec<String> {
        graph.network_nodes().map(|(_, n)| n.url.clone()).collect()
    }

    #[test]
    fn test_optimistic_graph_keeps_parser_blocking_work() {
        let trace = processed(1000.0);
        let settings = AnalysisConfig::default().metrics;
        let ctx = MetricContext {
            processed: &trace,
            settings: &settings,
            first_meaningful_paint: None,
        };

        let optimistic = FirstMeaningfulPaint.optimistic_graph(&graph(), &ctx).unwrap();
        assert_eq!(urls(&optimistic), vec!["https://a.test/", "https://a.test/a.js"]);
        assert_eq!(optimistic.cpu_nodes().count(), 1);
    }

    #[test]
    fn test_pessimistic_graph_adds_layout_and_injected_scripts() {
        let trace = processed(1000.0);
        let settings = AnalysisConfig::default().metrics;
        let ctx = MetricContext {
            processed: &trace,
            settings: &settings,
            first_meaningful_paint: None,
        };

        let pessimistic = FirstMeaningfulPaint.pessimistic_graph(&graph(), &ctx).unwrap();
        assert_eq!(
            urls(&pessimistic),
            vec!["https://a.test/", "https://a.test/a.js", "https://a.test/b.js"]
        );
        // both evaluations and the layout task; the late stylesheet ended after paint
        assert_eq!(pessimistic.cpu_nodes().count(), 3);
    }

    #[test]
    fn test_graph_limited_to_paint_time() {
        let trace = processed(150.0);
        let settings = AnalysisConfig::default().metrics;
        let ctx = MetricContext {
            processed: &trace,
            settings: &settings,
            first_meaningful_paint: None,
        };

        let pessimistic = FirstMeaningfulPaint.pessimistic_graph(&graph(), &ctx).unwrap();
        assert_eq!(pessimistic.len(), 1);
        assert_eq!(pessimistic.root(), 0);
    }

    #[test]
    fn test_requires_paint_marker() {
        let mut trace = processed(0.0);
        trace.first_meaningful_paint = None;
        let settings = AnalysisConfig::default().metrics;
        let ctx = MetricContext {
            processed: &trace,
            settings: &settings,
            first_meaningful_paint: None,
        };
        assert!(FirstMeaningfulPaint.optimistic_graph(&graph(), &ctx).is_err());
        assert!(ctx.first_meaningful_paint_estimate(PolicyMode::Optimistic).is_err());
    }
}
