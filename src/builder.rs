//! Dependency graph construction.
//!
//! [`GraphBuilder`] turns a trace and a network log into a single-rooted
//! [`Graph`]:
//!
//! 1. network records become [`NetworkNode`]s (times relative to navigation
//!    start, server response time estimated per origin);
//! 2. main-thread top-level tasks become [`CpuNode`]s (adjacent spans of the
//!    same kind merged, short spans dropped);
//! 3. nodes are numbered by observed start, network before CPU on ties;
//! 4. edges are inferred from redirects, initiators and the trace events
//!    that ran inside each task. An edge always points from a lower id to a
//!    higher one;
//! 5. the earliest request without an initiator becomes the root and every
//!    other orphan is attached to it. An initiator-less request that starts
//!    after the root has finished is an ambiguous navigation.

use std::collections::{HashMap, HashSet};
use tracing::{debug, error, trace, warn};

use crate::config::GraphOptions;
use crate::error::{LanternError, Result};
use crate::event::{ProcessedTrace, Trace, TraceEvent};
use crate::graph::Graph;
use crate::network::{InitiatorType, NetworkLog, NetworkRecord, ResourceTiming, ResourceType};
use crate::node::{CpuNode, NetworkNode, Node, NodeKind};
use crate::types::{us_to_ms, NodeId, SimTime};

/// Builds the page dependency graph.
///
/// Convenience wrapper around [`GraphBuilder`].
pub fn build(trace: &Trace, network_log: &NetworkLog, options: &GraphOptions) -> Result<Graph> {
    GraphBuilder::new(options.clone()).build(trace, network_log)
}

/// Unresolved link information carried by a request until edges are drawn.
#[derive(Debug, Default)]
struct RequestLinks {
    redirect_source: Option<String>,
    initiator_url: Option<String>,
}

enum Entry {
    Request(NetworkNode, RequestLinks),
    Task(CpuNode),
}

impl Entry {
    fn start(&self) -> SimTime {
        match self {
            Entry::Request(n, _) => n.start,
            Entry::Task(c) => c.start,
        }
    }

    fn is_task(&self) -> bool {
        matches!(self, Entry::Task(_))
    }
}

/// Builds page dependency graphs with a fixed set of options.
#[derive(Clone, Debug, Default)]
pub struct GraphBuilder {
    options: GraphOptions,
}

impl GraphBuilder {
    pub fn new(options: GraphOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Builds the graph for a trace and its network log.
    pub fn build(&self, trace: &Trace, network_log: &NetworkLog) -> Result<Graph> {
        let processed = ProcessedTrace::from_trace(trace)?;
        self.build_from_processed(&processed, network_log)
    }

    /// Builds the graph from an already processed trace.
    pub fn build_from_processed(
        &self,
        processed: &ProcessedTrace,
        network_log: &NetworkLog,
    ) -> Result<Graph> {
        let requests = self.network_entries(processed, network_log)?;
        let tasks = self.cpu_nodes(processed);

        let mut entries: Vec<Entry> = requests
            .into_iter()
            .map(|(node, links)| Entry::Request(node, links))
            .chain(tasks.into_iter().map(Entry::Task))
            .collect();
        // stable: equal keys keep log order
        entries.sort_by(|a, b| {
            a.start()
                .total_cmp(&b.start())
                .then_with(|| a.is_task().cmp(&b.is_task()))
        });

        let mut nodes = Vec::with_capacity(entries.len());
        let mut links = Vec::with_capacity(entries.len());
        for (id, entry) in entries.into_iter().enumerate() {
            match entry {
                Entry::Request(node, request_links) => {
                    nodes.push(Node::network(id, node));
                    links.push(request_links);
                }
                Entry::Task(cpu) => {
                    nodes.push(Node::cpu(id, cpu));
                    links.push(RequestLinks::default());
                }
            }
        }

        let edges = Linker::new(&nodes, &links, &self.options).edges();
        for edge in &edges {
            let node = &mut nodes[edge.dependent];
            node.add_dependency(edge.dependency);
            if edge.is_initiator {
                if let NodeKind::Network(net) = &mut node.kind {
                    net.initiator = Some(edge.dependency);
                }
            }
        }

        let nodes = attach_to_root(nodes)?;
        let graph = Graph::from_nodes(nodes)?;
        if let Err(err) = graph.topological_order() {
            error!("page graph is not acyclic: {}", err);
            return Err(err);
        }

        debug!(
            nodes = graph.len(),
            edges = edges.len(),
            root = %graph.root_node().label(),
            "built page dependency graph"
        );
        Ok(graph)
    }

    /// Converts network records into nodes.
    fn network_entries(
        &self,
        processed: &ProcessedTrace,
        network_log: &NetworkLog,
    ) -> Result<Vec<(NetworkNode, RequestLinks)>> {
        let mut seen = HashSet::new();
        for record in &network_log.records {
            if !seen.insert(record.request_id.as_str()) {
                return Err(LanternError::MalformedInput(format!(
                    "duplicate request id {}",
                    record.request_id
                )));
            }
        }

        let origin_rtts = estimate_origin_rtts(&network_log.records);

        network_log
            .records
            .iter()
            .map(|record| {
                let start_seconds = record
                    .start_time
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| {
                        LanternError::MalformedInput(format!(
                            "request {} ({}) has no start time",
                            record.request_id, record.url
                        ))
                    })?;
                let start = processed.to_relative_ms(start_seconds * 1e6);
                let end = record
                    .end_time
                    .filter(|t| t.is_finite())
                    .map(|t| processed.to_relative_ms(t * 1e6))
                    .filter(|&end| end >= start)
                    .unwrap_or(start);

                let origin = record.origin();
                let server_response_time = record
                    .timing
                    .as_ref()
                    .and_then(ResourceTiming::time_to_first_byte_ms)
                    .map(|ttfb| {
                        let rtt = origin_rtts.get(&origin).copied().unwrap_or(ttfb);
                        (ttfb - rtt).max(0.0)
                    })
                    .unwrap_or(0.0);

                if record.failed {
                    trace!(url = %record.url, "keeping failed request");
                }

                let node = NetworkNode {
                    request_id: record.request_id.clone(),
                    url: record.url.clone(),
                    is_secure: record.is_secure(),
                    origin,
                    protocol: record.protocol.clone(),
                    connection_id: record.connection_id.clone(),
                    transfer_size: record.transfer_size,
                    start,
                    end,
                    resource_type: record.resource_type,
                    priority: record.priority,
                    initiator_type: record.initiator.kind,
                    from_disk_cache: record.from_disk_cache,
                    server_response_time,
                    initiator: None,
                };
                let links = RequestLinks {
                    redirect_source: record.redirect_source.clone(),
                    initiator_url: record.initiator.source_url().map(str::to_string),
                };
                Ok((node, links))
            })
            .collect()
    }

    /// Extracts top-level main-thread tasks.
    fn cpu_nodes(&self, processed: &ProcessedTrace) -> Vec<CpuNode> {
        let events = &processed.main_thread_events;
        let mut spans: Vec<CpuNode> = Vec::new();

        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            i += 1;
            let Some(dur) = event.dur.filter(|_| event.is_schedulable_task()) else {
                continue;
            };

            let end_ts = event.end_ts();
            let mut children: Vec<TraceEvent> = Vec::new();
            while i < events.len() && events[i].ts < end_ts {
                if !events[i].is_schedulable_task() {
                    children.push(events[i].clone());
                }
                i += 1;
            }

            let span = CpuNode::new(processed.to_relative_ms(event.ts), us_to_ms(dur), children);
            match spans.last_mut() {
                Some(prev)
                    if prev.kind == span.kind
                        && span.start - prev.end() <= self.options.merge_gap_ms =>
                {
                    let end = prev.end().max(span.end());
                    prev.duration = end - prev.start;
                    prev.children.extend(span.children);
                }
                _ => spans.push(span),
            }
        }

        let merged = spans.len();
        spans.retain(|s| s.duration >= self.options.min_task_duration_ms);
        if spans.len() < merged {
            trace!(
                dropped = merged - spans.len(),
                threshold = self.options.min_task_duration_ms,
                "dropped short main-thread tasks"
            );
        }
        spans
    }
}

/// Estimates each origin's round-trip time.
///
/// Uses the fastest observed TCP handshake; origins without a fresh
/// connection fall back to their fastest time to first byte.
fn estimate_origin_rtts(records: &[NetworkRecord]) -> HashMap<String, SimTime> {
    let mut handshakes: HashMap<String, SimTime> = HashMap::new();
    let mut first_bytes: HashMap<String, SimTime> = HashMap::new();

    for record in records {
        let Some(timing) = &record.timing else {
            continue;
        };
        let origin = record.origin();
        if let Some(tcp) = timing.tcp_handshake_ms() {
            let entry = handshakes.entry(origin.clone()).or_insert(tcp);
            *entry = entry.min(tcp);
        }
        if let Some(ttfb) = timing.time_to_first_byte_ms() {
            let entry = first_bytes.entry(origin).or_insert(ttfb);
            *entry = entry.min(ttfb);
        }
    }

    for (origin, ttfb) in first_bytes {
        handshakes.entry(origin).or_insert(ttfb);
    }
    handshakes
}

/// A dependency edge: `dependent` waits for `dependency`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Edge {
    dependent: NodeId,
    dependency: NodeId,
    is_initiator: bool,
}

/// Infers edges between numbered nodes.
struct Linker<'a> {
    nodes: &'a [Node],
    links: &'a [RequestLinks],
    options: &'a GraphOptions,
    by_request_id: HashMap<&'a str, NodeId>,
    by_url: HashMap<&'a str, Vec<NodeId>>,
}

impl<'a> Linker<'a> {
    fn new(nodes: &'a [Node], links: &'a [RequestLinks], options: &'a GraphOptions) -> Self {
        let mut by_request_id = HashMap::new();
        let mut by_url: HashMap<&str, Vec<NodeId>> = HashMap::new();
        for node in nodes {
            if let Some(net) = node.as_network() {
                by_request_id.insert(net.request_id.as_str(), node.id);
                by_url.entry(net.url.as_str()).or_default().push(node.id);
            }
        }
        Self {
            nodes,
            links,
            options,
            by_request_id,
            by_url,
        }
    }

    fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        self.link_network(&mut edges);
        self.link_cpu(&mut edges);
        edges
    }

    fn push(
        &self,
        edges: &mut Vec<Edge>,
        dependent: NodeId,
        dependency: NodeId,
        is_initiator: bool,
    ) {
        if dependency >= dependent {
            trace!(dependent, dependency, "skipping edge against start order");
            return;
        }
        edges.push(Edge {
            dependent,
            dependency,
            is_initiator,
        });
    }

    /// Redirects and initiators.
    fn link_network(&self, edges: &mut Vec<Edge>) {
        for node in self.nodes.iter().filter(|n| n.is_network()) {
            let links = &self.links[node.id];

            let redirect = links
                .redirect_source
                .as_deref()
                .and_then(|rid| self.by_request_id.get(rid).copied())
                .filter(|&dep| dep < node.id);
            if let Some(dep) = redirect {
                self.push(edges, node.id, dep, true);
                continue;
            }

            // most recently started request for the initiator URL
            let initiator = links
                .initiator_url
                .as_deref()
                .and_then(|url| self.by_url.get(url))
                .and_then(|candidates| candidates.iter().rev().find(|&&c| c < node.id))
                .copied();
            if let Some(dep) = initiator {
                self.push(edges, node.id, dep, true);
            }
        }
    }

    /// Edges implied by the events inside each task.
    fn link_cpu(&self, edges: &mut Vec<Edge>) {
        let mut timer_installs: HashMap<String, NodeId> = HashMap::new();
        for node in self.nodes.iter().filter(|n| n.is_cpu()) {
            let Some(cpu) = node.as_cpu() else { continue };
            for event in cpu.children.iter().filter(|e| e.name == "TimerInstall") {
                if let Some(timer) = timer_id(event) {
                    timer_installs.entry(timer).or_insert(node.id);
                }
            }
        }

        for node in self.nodes.iter().filter(|n| n.is_cpu()) {
            let Some(cpu) = node.as_cpu() else { continue };

            for event in &cpu.children {
                for url in script_urls(event) {
                    if let Some(dep) = self.closest_request(url, node.id, cpu.start) {
                        self.push(edges, node.id, dep, false);
                    }
                }

                match event.name.as_str() {
                    "ResourceSendRequest" => {
                        let request = event
                            .data_str("requestId")
                            .and_then(|rid| self.by_request_id.get(rid).copied());
                        if let Some(request) = request {
                            if self.is_script_issued(request) {
                                self.push(edges, request, node.id, true);
                            }
                        }
                    }
                    "TimerFire" => {
                        let install = timer_id(event).and_then(|t| timer_installs.get(&t).copied());
                        if let Some(install) = install.filter(|&i| i != node.id) {
                            self.push(edges, node.id, install, false);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// The request for `url` closest to the task that started before it.
    ///
    /// Requests may still be finishing up to the configured slack after the
    /// task started.
    fn closest_request(&self, url: &str, task: NodeId, task_start: SimTime) -> Option<NodeId> {
        let candidates = self.by_url.get(url)?;
        let mut best: Option<(NodeId, SimTime)> = None;
        for &candidate in candidates.iter().filter(|&&c| c < task) {
            let Some(net) = self.nodes[candidate].as_network() else { continue };
            let distance = task_start - net.end;
            if distance < -self.options.script_eval_slack_ms {
                continue;
            }
            if best.map_or(true, |(_, d)| distance <= d) {
                best = Some((candidate, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    fn is_script_issued(&self, request: NodeId) -> bool {
        self.nodes[request].as_network().map_or(false, |net| {
            net.initiator_type == InitiatorType::Script
                || matches!(net.resource_type, ResourceType::Xhr | ResourceType::Fetch)
        })
    }
}

fn timer_id(event: &TraceEvent) -> Option<String> {
    event
        .data()
        .and_then(|d| d.get("timerId"))
        .map(|v| v.to_string())
}

/// URLs of the resources a task event depends on.
fn script_urls(event: &TraceEvent) -> Vec<&str> {
    let mut urls = Vec::new();
    match event.name.as_str() {
        "EvaluateScript" => {
            urls.extend(event.data_str("url"));
            urls.extend(event.stack_trace_urls());
        }
        "FunctionCall" | "v8.compile" => urls.extend(event.data_str("url")),
        "XHRReadyStateChange" => {
            let done = event
                .data()
                .and_then(|d| d.get("readyState"))
                .and_then(|s| s.as_u64())
                == Some(4);
            if done {
                urls.extend(event.data_str("url"));
            }
        }
        "ParseAuthorStyleSheet" => urls.extend(event.data_str("styleSheetUrl")),
        "TimerInstall"
        | "InvalidateLayout"
        | "ScheduleStyleRecalculation"
        | "ResourceSendRequest" => urls.extend(event.stack_trace_urls()),
        _ => {}
    }
    urls.retain(|u| !u.is_empty());
    urls
}

/// Selects the root and attaches every other orphan to it.
///
/// Orphans that started before the root are pre-navigation work and are
/// dropped, together with anything left without dependencies by their
/// removal. Surviving nodes are renumbered.
fn attach_to_root(mut nodes: Vec<Node>) -> Result<Vec<Node>> {
    let candidates: Vec<NodeId> = nodes
        .iter()
        .filter(|n| n.is_network() && n.dependencies.is_empty())
        .map(|n| n.id)
        .collect();

    let Some(&root) = candidates.first() else {
        return Err(LanternError::NoRoot(
            "no network request without an initiator".to_string(),
        ));
    };

    // an initiator-less request starting after the root ended is an
    // unrelated load, not part of this navigation
    let root_end = nodes[root].end();
    if let Some(&candidate) = candidates[1..].iter().find(|&&c| nodes[c].start() > root_end) {
        return Err(LanternError::NoRoot(format!(
            "ambiguous navigation: {} and {} have no initiator and disjoint timelines",
            nodes[root].label(),
            nodes[candidate].label()
        )));
    }

    let mut dropped = vec![false; nodes.len()];
    loop {
        let mut changed = false;
        for id in 0..nodes.len() {
            if id == root || dropped[id] {
                continue;
            }
            nodes[id].dependencies.retain(|&d| !dropped[d]);
            if nodes[id].dependencies.is_empty() {
                if id > root {
                    nodes[id].add_dependency(root);
                } else {
                    dropped[id] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let dropped_count = dropped.iter().filter(|&&d| d).count();
    if dropped_count > 0 {
        warn!(dropped = dropped_count, "discarding work that precedes the navigation root");
    }

    let mut remap = vec![None; nodes.len()];
    let mut next_id = 0;
    for (old, is_dropped) in dropped.iter().enumerate() {
        if !is_dropped {
            remap[old] = Some(next_id);
            next_id += 1;
        }
    }

    Ok(nodes
        .into_iter()
        .filter_map(|mut node| {
            let id = remap[node.id]?;
            node.id = id;
            node.dependencies = node
                .dependencies
                .iter()
                .filter_map(|&d| remap[d])
                .collect();
            if let NodeKind::Network(net) = &mut node.kind {
                net.initiator = net.initiator.and_then(|i| remap[i]);
            }
            Some(node)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ResourcePriority;
    use serde_json::json;

    const NAV_US: f64 = 1_000_000.0;

    /// Seconds on the trace clock for `ms` after navigation start.
    fn at(ms: f64) -> f64 {
        (NAV_US / 1000.0 + ms) / 1000.0
    }

    fn trace_with(tasks: Vec<(f64, f64, Vec<TraceEvent>)>) -> Trace {
        let mut events = vec![TraceEvent::instant("navigationStart", NAV_US)];
        for (start_ms, dur_ms, children) in tasks {
            let ts = NAV_US + start_ms * 1000.0;
            events.push(TraceEvent::complete("RunTask", ts, dur_ms * 1000.0));
            for child in children {
                events.push(TraceEvent { ts: ts + 1.0, ..child });
            }
        }
        Trace::new(events)
    }

    fn eval(url: &str) -> TraceEvent {
        TraceEvent::complete("EvaluateScript", 0.0, 100.0).with_data(json!({ "url": url }))
    }

    fn document(start: f64, end: f64) -> NetworkRecord {
        NetworkRecord::new("1", "https://a.test/", at(start), at(end))
            .with_type(ResourceType::Document)
            .with_priority(ResourcePriority::VeryHigh)
    }

    #[test]
    fn test_ids_follow_start_order() {
        let log = NetworkLog::new(vec![
            NetworkRecord::new("2", "https://a.test/late.css", at(300.0), at(400.0))
                .initiated_by_parser("https://a.test/"),
            document(0.0, 200.0),
        ]);
        let trace = trace_with(vec![(300.0, 50.0, vec![])]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.root(), 0);
        // network before CPU on equal start
        assert!(graph.node(1).unwrap().is_network());
        assert!(graph.node(2).unwrap().is_cpu());
        assert_eq!(graph.dependencies(1), &[0]);
        assert_eq!(graph.dependencies(2), &[0]);
        assert_eq!(graph.node(1).unwrap().as_network().unwrap().initiator, Some(0));
    }

    #[test]
    fn test_script_evaluation_depends_on_request() {
        let log = NetworkLog::new(vec![
            document(0.0, 100.0),
            NetworkRecord::new("2", "https://a.test/app.js", at(110.0), at(300.0))
                .with_type(ResourceType::Script)
                .initiated_by_parser("https://a.test/"),
        ]);
        let trace = trace_with(vec![(320.0, 80.0, vec![eval("https://a.test/app.js")])]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        let (task, _) = graph.cpu_nodes().next().unwrap();
        assert_eq!(graph.dependencies(task), &[1]);
    }

    #[test]
    fn test_script_request_after_task_is_not_linked() {
        let log = NetworkLog::new(vec![
            document(0.0, 100.0),
            NetworkRecord::new("2", "https://a.test/app.js", at(500.0), at(600.0))
                .initiated_by_parser("https://a.test/"),
        ]);
        let trace = trace_with(vec![(320.0, 80.0, vec![eval("https://a.test/app.js")])]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        let (task, _) = graph.cpu_nodes().next().unwrap();
        assert_eq!(graph.dependencies(task), &[graph.root()]);
    }

    #[test]
    fn test_xhr_depends_on_sending_task() {
        let send = TraceEvent::instant("ResourceSendRequest", 0.0)
            .with_data(json!({ "requestId": "3" }));
        let log = NetworkLog::new(vec![
            document(0.0, 100.0),
            NetworkRecord::new("3", "https://a.test/api", at(250.0), at(400.0))
                .with_type(ResourceType::Xhr),
        ]);
        let trace = trace_with(vec![(200.0, 30.0, vec![send])]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        let (xhr, _) = graph.network_nodes().find(|(_, n)| n.request_id == "3").unwrap();
        let (task, _) = graph.cpu_nodes().next().unwrap();
        assert_eq!(graph.dependencies(xhr), &[task]);
    }

    #[test]
    fn test_timer_fire_depends_on_install() {
        let install = TraceEvent::instant("TimerInstall", 0.0).with_data(json!({ "timerId": 7 }));
        let fire = TraceEvent::instant("TimerFire", 0.0).with_data(json!({ "timerId": 7 }));
        let log = NetworkLog::new(vec![document(0.0, 100.0)]);
        let trace = trace_with(vec![(150.0, 20.0, vec![install]), (400.0, 20.0, vec![fire])]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        assert_eq!(graph.dependencies(2), &[1]);
    }

    #[test]
    fn test_redirect_chain() {
        let log = NetworkLog::new(vec![
            NetworkRecord::new("1", "http://a.test/", at(0.0), at(50.0))
                .with_type(ResourceType::Document),
            NetworkRecord::new("1:redirect", "https://a.test/", at(60.0), at(200.0))
                .with_type(ResourceType::Document)
                .redirected_from("1"),
        ]);
        let graph = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap();
        assert_eq!(graph.dependencies(1), &[0]);
    }

    #[test]
    fn test_short_tasks_dropped_and_adjacent_merged() {
        let log = NetworkLog::new(vec![document(0.0, 100.0)]);
        let trace = trace_with(vec![
            (200.0, 4.0, vec![]),
            (204.5, 4.0, vec![]),
            (208.6, 4.0, vec![]),
            (400.0, 5.0, vec![eval("x.js")]),
        ]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        let tasks: Vec<&CpuNode> = graph.cpu_nodes().map(|(_, c)| c).collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].start, 200.0);
        assert!((tasks[0].duration - 12.6).abs() < 1e-9);
    }

    #[test]
    fn test_pre_navigation_task_dropped() {
        let log = NetworkLog::new(vec![document(10.0, 100.0)]);
        let trace = trace_with(vec![(0.0, 20.0, vec![]), (150.0, 20.0, vec![])]);

        let graph = build(&trace, &log, &GraphOptions::default()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.node(1).unwrap().start(), 150.0);
    }

    #[test]
    fn test_orphan_request_attached_to_root() {
        // starts while the document is still loading
        let log = NetworkLog::new(vec![
            document(0.0, 100.0),
            NetworkRecord::new("2", "https://cdn.test/font.woff", at(60.0), at(250.0)),
        ]);
        let graph = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap();
        assert_eq!(graph.dependencies(1), &[0]);
        assert_eq!(graph.node(1).unwrap().as_network().unwrap().initiator, None);
    }

    #[test]
    fn test_disjoint_navigations_have_no_root() {
        let log = NetworkLog::new(vec![
            document(0.0, 100.0),
            NetworkRecord::new("2", "https://b.test/", at(500.0), at(700.0))
                .with_type(ResourceType::Document),
        ]);
        let err = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap_err();
        assert!(matches!(err, LanternError::NoRoot(_)));
    }

    #[test]
    fn test_disjoint_orphan_requests_have_no_root() {
        let log = NetworkLog::new(vec![
            NetworkRecord::new("1", "https://a.test/app.js", at(0.0), at(100.0))
                .with_type(ResourceType::Script),
            NetworkRecord::new("2", "https://b.test/x.js", at(500.0), at(700.0))
                .with_type(ResourceType::Script),
        ]);
        let err = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap_err();
        assert!(matches!(err, LanternError::NoRoot(ref m) if m.contains("ambiguous")));
    }

    #[test]
    fn test_empty_log_has_no_root() {
        let err = build(&trace_with(vec![]), &NetworkLog::default(), &GraphOptions::default())
            .unwrap_err();
        assert!(matches!(err, LanternError::NoRoot(_)));
    }

    #[test]
    fn test_missing_start_time() {
        let mut record = document(0.0, 100.0);
        record.start_time = None;
        let log = NetworkLog::new(vec![record]);
        let err = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap_err();
        assert!(matches!(err, LanternError::MalformedInput(_)));
    }

    #[test]
    fn test_duplicate_request_id() {
        let log = NetworkLog::new(vec![document(0.0, 100.0), document(10.0, 20.0)]);
        let err = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap_err();
        assert!(matches!(err, LanternError::MalformedInput(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_server_response_time_from_origin_rtt() {
        let timing = |connect: f64, ttfb: f64| ResourceTiming {
            request_time: 0.0,
            dns_start: -1.0,
            dns_end: -1.0,
            connect_start: 0.0,
            connect_end: connect,
            ssl_start: -1.0,
            ssl_end: -1.0,
            send_start: connect,
            send_end: connect,
            receive_headers_end: connect + ttfb,
        };
        let log = NetworkLog::new(vec![
            document(0.0, 400.0).with_timing(timing(40.0, 240.0)),
            NetworkRecord::new("2", "https://a.test/b.css", at(410.0), at(500.0))
                .initiated_by_parser("https://a.test/")
                .with_timing(timing(60.0, 50.0)),
        ]);

        let graph = build(&trace_with(vec![]), &log, &GraphOptions::default()).unwrap();
        let server: Vec<f64> = graph.network_nodes().map(|(_, n)| n.server_response_time).collect();
        assert_eq!(server, vec![200.0, 10.0]);
    }
}
