//! Node definitions for the page dependency graph.
//!
//! A node is either a network request or a main-thread CPU task. Edges are
//! stored once, as each node's dependency list; see [`crate::graph::Graph`]
//! for the derived dependents.

use serde::{Deserialize, Serialize};

use crate::event::TraceEvent;
use crate::network::{is_secure_url, origin_of, InitiatorType, ResourcePriority, ResourceType};
use crate::types::{NodeId, SimTime};

/// Trace event names that evaluate or compile script.
const SCRIPT_EVENT_NAMES: [&str; 3] = ["EvaluateScript", "FunctionCall", "v8.compile"];

/// What a CPU task mostly did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuTaskKind {
    Script,
    ParseHtml,
    Layout,
    Paint,
    Other,
}

impl CpuTaskKind {
    /// Classifies a task from its child events.
    ///
    /// Script evaluation wins over parsing, parsing over layout, layout over
    /// paint.
    pub fn classify(children: &[TraceEvent]) -> Self {
        let has = |names: &[&str]| children.iter().any(|e| names.contains(&e.name.as_str()));

        if has(&SCRIPT_EVENT_NAMES) {
            CpuTaskKind::Script
        } else if has(&["ParseHTML"]) {
            CpuTaskKind::ParseHtml
        } else if has(&["Layout", "UpdateLayoutTree"]) {
            CpuTaskKind::Layout
        } else if has(&["Paint", "CompositeLayers"]) {
            CpuTaskKind::Paint
        } else {
            CpuTaskKind::Other
        }
    }
}

/// A network request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub request_id: String,
    pub url: String,
    pub origin: String,
    pub protocol: String,
    pub connection_id: String,
    /// Observed bytes on the wire
    pub transfer_size: u64,
    /// Observed start, ms since navigation start
    pub start: SimTime,
    /// Observed end, ms since navigation start
    pub end: SimTime,
    pub resource_type: ResourceType,
    pub priority: ResourcePriority,
    pub initiator_type: InitiatorType,
    pub is_secure: bool,
    pub from_disk_cache: bool,
    /// Estimated server think time (TTFB minus the origin round trip)
    pub server_response_time: SimTime,
    /// Node that issued this request, when it could be resolved
    pub initiator: Option<NodeId>,
}

impl NetworkNode {
    /// Creates a request node with default attributes.
    ///
    /// Origin and security are derived from the URL.
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        start: SimTime,
        end: SimTime,
    ) -> Self {
        let url = url.into();
        Self {
            request_id: request_id.into(),
            origin: origin_of(&url),
            is_secure: is_secure_url(&url),
            url,
            protocol: "http/1.1".to_string(),
            connection_id: String::new(),
            transfer_size: 0,
            start,
            end,
            resource_type: ResourceType::Other,
            priority: ResourcePriority::Medium,
            initiator_type: InitiatorType::Other,
            from_disk_cache: false,
            server_response_time: 0.0,
            initiator: None,
        }
    }

    pub fn with_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn with_priority(mut self, priority: ResourcePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self
    }

    pub fn with_server_response_time(mut self, ms: SimTime) -> Self {
        self.server_response_time = ms;
        self
    }

    pub fn observed_duration(&self) -> SimTime {
        self.end - self.start
    }

    pub fn is_data_url(&self) -> bool {
        self.url.starts_with("data:")
    }

    /// Returns true when requests share one connection per origin.
    pub fn is_multiplexed(&self) -> bool {
        let protocol = self.protocol.to_ascii_lowercase();
        protocol == "h2" || protocol.starts_with("h3") || protocol.starts_with("quic")
    }

    pub fn is_document(&self) -> bool {
        self.resource_type == ResourceType::Document
    }

    pub fn is_script(&self) -> bool {
        self.resource_type == ResourceType::Script
    }

    /// Requests that block the first render.
    pub fn is_render_blocking(&self) -> bool {
        self.priority == ResourcePriority::VeryHigh
            || (self.priority == ResourcePriority::High && self.is_script())
    }
}

/// A top-level main-thread task, possibly merged from adjacent spans.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuNode {
    pub kind: CpuTaskKind,
    /// Observed start, ms since navigation start
    pub start: SimTime,
    /// Observed duration, ms
    pub duration: SimTime,
    /// Events that ran inside the task, in timestamp order
    pub children: Vec<TraceEvent>,
}

impl CpuNode {
    pub fn new(start: SimTime, duration: SimTime, children: Vec<TraceEvent>) -> Self {
        Self {
            kind: CpuTaskKind::classify(&children),
            start,
            duration,
            children,
        }
    }

    pub fn end(&self) -> SimTime {
        self.start + self.duration
    }

    pub fn did_perform_layout(&self) -> bool {
        self.children.iter().any(|e| e.name == "Layout")
    }

    /// Returns true if the task evaluated the script at `url`.
    pub fn is_evaluate_script_for(&self, url: &str) -> bool {
        self.children
            .iter()
            .any(|e| e.name == "EvaluateScript" && e.data_str("url") == Some(url))
    }
}

/// The two node variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Network(NetworkNode),
    Cpu(CpuNode),
}

/// A node in the page dependency graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Arena index inside the owning graph
    pub id: NodeId,
    pub kind: NodeKind,
    /// Nodes that must complete before this one can start
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
}

impl Node {
    pub fn network(id: NodeId, node: NetworkNode) -> Self {
        Self {
            id,
            kind: NodeKind::Network(node),
            dependencies: Vec::new(),
        }
    }

    pub fn cpu(id: NodeId, node: CpuNode) -> Self {
        Self {
            id,
            kind: NodeKind::Cpu(node),
            dependencies: Vec::new(),
        }
    }

    /// Adds dependencies to this node.
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = NodeId>) -> Self {
        for dep in deps {
            self.add_dependency(dep);
        }
        self
    }

    /// Adds a dependency, ignoring duplicates and self-edges.
    pub fn add_dependency(&mut self, dep: NodeId) {
        if dep != self.id && !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, NodeKind::Network(_))
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, NodeKind::Cpu(_))
    }

    pub fn as_network(&self) -> Option<&NetworkNode> {
        match &self.kind {
            NodeKind::Network(n) => Some(n),
            NodeKind::Cpu(_) => None,
        }
    }

    pub fn as_cpu(&self) -> Option<&CpuNode> {
        match &self.kind {
            NodeKind::Cpu(c) => Some(c),
            NodeKind::Network(_) => None,
        }
    }

    /// Observed start, ms since navigation start.
    pub fn start(&self) -> SimTime {
        match &self.kind {
            NodeKind::Network(n) => n.start,
            NodeKind::Cpu(c) => c.start,
        }
    }

    /// Observed end, ms since navigation start.
    pub fn end(&self) -> SimTime {
        match &self.kind {
            NodeKind::Network(n) => n.end,
            NodeKind::Cpu(c) => c.end(),
        }
    }

    /// Short human-readable label for logs.
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Network(n) => format!("network#{} {}", self.id, n.url),
            NodeKind::Cpu(c) => format!("cpu#{} {:?}@{:.1}", self.id, c.kind, c.start),
        }
    }
}
