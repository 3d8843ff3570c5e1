//! Synthetic page loads shared by the integration tests.

#![allow(dead_code)]

use lantern::config::ThrottlingSettings;
use lantern::event::{Trace, TraceEvent};
use lantern::network::{NetworkLog, NetworkRecord, ResourcePriority, ResourceType};
use lantern::node::{CpuNode, NetworkNode, Node};
use lantern::{Graph, NodeId, PageArtifacts};

/// Navigation start on the trace clock, µs.
pub const NAVIGATION_START_US: f64 = 5_000_000.0;
pub const MAIN_PID: u64 = 7;
pub const MAIN_TID: u64 = 11;

/// Seconds on the network clock for `ms` after navigation start.
pub fn at(ms: f64) -> f64 {
    (NAVIGATION_START_US / 1000.0 + ms) / 1000.0
}

/// Microseconds on the trace clock for `ms` after navigation start.
pub fn us(ms: f64) -> f64 {
    NAVIGATION_START_US + ms * 1000.0
}

// ============================================================================
// Page builder
// ============================================================================

/// Assembles a trace and a network log for one navigation.
pub struct PageBuilder {
    origin: String,
    events: Vec<TraceEvent>,
    records: Vec<NetworkRecord>,
}

impl PageBuilder {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            events: vec![
                TraceEvent::instant("TracingStartedInPage", us(0.0)).on_thread(MAIN_PID, MAIN_TID),
                TraceEvent::instant("navigationStart", us(0.0)).on_thread(MAIN_PID, MAIN_TID),
            ],
            records: Vec::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    fn next_request_id(&self) -> String {
        (self.records.len() + 1).to_string()
    }

    pub fn document(mut self, start: f64, end: f64, bytes: u64) -> Self {
        let record = NetworkRecord::new(self.next_request_id(), self.url("/"), at(start), at(end))
            .with_type(ResourceType::Document)
            .with_priority(ResourcePriority::VeryHigh)
            .with_connection("1")
            .with_transfer_size(bytes);
        self.records.push(record);
        self
    }

    /// A request discovered by the parser in the document.
    pub fn resource(
        mut self,
        path: &str,
        resource_type: ResourceType,
        priority: ResourcePriority,
        span: (f64, f64),
        bytes: u64,
    ) -> Self {
        let connection = (self.records.len() % 3 + 1).to_string();
        let id = self.next_request_id();
        let record = NetworkRecord::new(id, self.url(path), at(span.0), at(span.1))
            .with_type(resource_type)
            .with_priority(priority)
            .with_connection(connection)
            .with_transfer_size(bytes)
            .initiated_by_parser(self.url("/"));
        self.records.push(record);
        self
    }

    pub fn script(self, path: &str, span: (f64, f64), bytes: u64) -> Self {
        self.resource(path, ResourceType::Script, ResourcePriority::High, span, bytes)
    }

    pub fn image(self, path: &str, span: (f64, f64), bytes: u64) -> Self {
        self.resource(path, ResourceType::Image, ResourcePriority::Low, span, bytes)
    }

    /// A request issued by a script, e.g. an XHR.
    pub fn xhr(mut self, path: &str, script: &str, span: (f64, f64), bytes: u64) -> Self {
        let id = self.next_request_id();
        let record = NetworkRecord::new(id, self.url(path), at(span.0), at(span.1))
            .with_type(ResourceType::Xhr)
            .with_priority(ResourcePriority::High)
            .with_transfer_size(bytes)
            .initiated_by_script(self.url(script));
        self.records.push(record);
        self
    }

    pub fn record(mut self, record: NetworkRecord) -> Self {
        self.records.push(record);
        self
    }

    /// A top-level main-thread task with the given child events.
    pub fn task(mut self, start: f64, duration: f64, children: Vec<TraceEvent>) -> Self {
        self.events.push(
            TraceEvent::complete("RunTask", us(start), duration * 1000.0)
                .on_thread(MAIN_PID, MAIN_TID),
        );
        for child in children {
            self.events.push(TraceEvent { ts: us(start), ..child }.on_thread(MAIN_PID, MAIN_TID));
        }
        self
    }

    pub fn parse_task(self, start: f64, duration: f64) -> Self {
        self.task(start, duration, vec![TraceEvent::complete("ParseHTML", 0.0, duration * 1000.0)])
    }

    pub fn eval_task(self, start: f64, duration: f64, path: &str) -> Self {
        let url = self.url(path);
        self.task(
            start,
            duration,
            vec![TraceEvent::complete("EvaluateScript", 0.0, duration * 1000.0)
                .with_data(serde_json::json!({ "url": url }))],
        )
    }

    pub fn layout_task(self, start: f64, duration: f64) -> Self {
        self.task(start, duration, vec![TraceEvent::complete("Layout", 0.0, duration * 1000.0)])
    }

    pub fn first_meaningful_paint(mut self, ms: f64) -> Self {
        self.events.push(
            TraceEvent::instant("firstContentfulPaint", us(ms))
                .with_cat("blink.user_timing")
                .on_thread(MAIN_PID, MAIN_TID),
        );
        self.events.push(
            TraceEvent::instant("firstMeaningfulPaint", us(ms))
                .with_cat("blink.user_timing")
                .on_thread(MAIN_PID, MAIN_TID),
        );
        self
    }

    pub fn trace(&self) -> Trace {
        Trace::new(self.events.clone())
    }

    pub fn network_log(&self) -> NetworkLog {
        NetworkLog::new(self.records.clone())
    }

    pub fn build(self) -> PageArtifacts {
        PageArtifacts::new(Trace::new(self.events), NetworkLog::new(self.records))
    }
}

/// A news-article-like page: document, stylesheet, two blocking scripts,
/// a few images, an XHR fired by the app bundle and a handful of long
/// tasks after first meaningful paint.
pub fn typical_page() -> PageBuilder {
    PageBuilder::new("https://news.test")
        .document(0.0, 400.0, 30_000)
        .resource(
            "/main.css",
            ResourceType::Stylesheet,
            ResourcePriority::VeryHigh,
            (420.0, 600.0),
            25_000,
        )
        .script("/vendor.js", (430.0, 900.0), 120_000)
        .script("/app.js", (440.0, 1000.0), 80_000)
        .image("/hero.jpg", (450.0, 1600.0), 200_000)
        .image("/thumb.jpg", (460.0, 1300.0), 40_000)
        .xhr("/api/feed", "/app.js", (1400.0, 1800.0), 10_000)
        .parse_task(410.0, 40.0)
        .eval_task(910.0, 150.0, "/vendor.js")
        .eval_task(1100.0, 200.0, "/app.js")
        .layout_task(1310.0, 60.0)
        .first_meaningful_paint(1400.0)
        .task(
            1380.0,
            15.0,
            vec![TraceEvent::complete("ResourceSendRequest", 0.0, 100.0)
                .with_data(serde_json::json!({ "requestId": "7" }))],
        )
        .task(
            1900.0,
            300.0,
            vec![TraceEvent::complete("FunctionCall", 0.0, 300_000.0)
                .with_data(serde_json::json!({ "url": "https://news.test/app.js" }))],
        )
        .layout_task(2250.0, 80.0)
}

// ============================================================================
// Graph helpers
// ============================================================================

/// A network node at `origin` with the given observed span.
pub fn request(id: NodeId, origin: &str, start: f64, end: f64) -> NetworkNode {
    NetworkNode::new(id.to_string(), format!("{}/{}", origin, id), start, end)
}

/// Graph from `(node, dependencies)` pairs; ids are positions.
pub fn graph(nodes: Vec<(Node, Vec<NodeId>)>) -> Graph {
    let nodes = nodes
        .into_iter()
        .map(|(node, deps)| node.with_dependencies(deps))
        .collect();
    Graph::from_nodes(nodes).expect("valid test graph")
}

/// Root request fanning out to `requests` requests spread over `origins`
/// origins, each followed by a CPU task.
pub fn fan_out(requests: usize, origins: usize) -> Graph {
    let mut nodes = vec![(Node::network(0, request(0, "https://root.test", 0.0, 100.0)), vec![])];
    for i in 0..requests {
        let id = nodes.len();
        let origin = format!("https://cdn{}.test", i % origins.max(1));
        let node = request(id, &origin, 100.0, 200.0).with_transfer_size(10_000 + i as u64 * 1_000);
        nodes.push((Node::network(id, node), vec![0]));
    }
    for i in 0..requests {
        let id = nodes.len();
        let task = CpuNode::new(200.0 + i as f64, 5.0 + (i % 4) as f64 * 10.0, Vec::new());
        nodes.push((Node::cpu(id, task), vec![i + 1]));
    }
    graph(nodes)
}

pub fn throttling() -> ThrottlingSettings {
    ThrottlingSettings::default()
}
