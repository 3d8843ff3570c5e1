//! Network log records.
//!
//! A network log is the list of request lifecycle records captured alongside
//! the trace. Times are seconds on the same monotonic clock as the trace
//! (trace microseconds / 1e6).

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LanternError, Result};

/// Resource type reported by the browser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    EventSource,
    WebSocket,
    Manifest,
    #[default]
    #[serde(other)]
    Other,
}

/// Request priority assigned by the browser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourcePriority {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

/// What caused a request to be issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitiatorType {
    Parser,
    Script,
    Preload,
    #[default]
    #[serde(other)]
    Other,
}

/// A single stack frame of a script initiator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub function_name: String,
}

/// Script stack attached to an initiator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
}

/// The initiator of a request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Initiator {
    #[serde(rename = "type", default)]
    pub kind: InitiatorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackTrace>,
}

impl Initiator {
    /// URL of the resource that issued the request.
    ///
    /// Script initiators resolve to the top stack frame; everything else to
    /// the explicit `url`.
    pub fn source_url(&self) -> Option<&str> {
        let stack_url = self
            .stack
            .as_ref()
            .and_then(|s| s.call_frames.iter().map(|f| f.url.as_str()).find(|u| !u.is_empty()));

        match self.kind {
            InitiatorType::Script => stack_url.or(self.url.as_deref()),
            _ => self.url.as_deref().or(stack_url),
        }
    }
}

/// Detailed connection timing, offsets in ms relative to `request_time`.
///
/// A value of `-1` means the phase did not happen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    /// Seconds on the trace clock
    pub request_time: f64,
    #[serde(default = "not_applicable")]
    pub dns_start: f64,
    #[serde(default = "not_applicable")]
    pub dns_end: f64,
    #[serde(default = "not_applicable")]
    pub connect_start: f64,
    #[serde(default = "not_applicable")]
    pub connect_end: f64,
    #[serde(default = "not_applicable")]
    pub ssl_start: f64,
    #[serde(default = "not_applicable")]
    pub ssl_end: f64,
    #[serde(default = "not_applicable")]
    pub send_start: f64,
    #[serde(default = "not_applicable")]
    pub send_end: f64,
    #[serde(default = "not_applicable")]
    pub receive_headers_end: f64,
}

fn not_applicable() -> f64 {
    -1.0
}

impl ResourceTiming {
    /// Duration of the TCP handshake alone (one round trip), if observed.
    pub fn tcp_handshake_ms(&self) -> Option<f64> {
        if self.connect_start < 0.0 || self.connect_end < self.connect_start {
            return None;
        }
        let mut tcp = self.connect_end - self.connect_start;
        if self.ssl_start >= 0.0 && self.ssl_end >= self.ssl_start {
            tcp -= self.ssl_end - self.ssl_start;
        }
        (tcp > 0.0).then_some(tcp)
    }

    /// Time from request sent to response headers received.
    pub fn time_to_first_byte_ms(&self) -> Option<f64> {
        if self.send_end < 0.0 || self.receive_headers_end < self.send_end {
            return None;
        }
        Some(self.receive_headers_end - self.send_end)
    }
}

/// A request lifecycle record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub request_id: String,
    pub url: String,
    #[serde(default)]
    pub protocol: String,
    /// Transport connection; requests sharing it reuse one handshake
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub connection_reused: bool,
    /// Seconds; a record without a start time cannot be placed on the timeline
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub transfer_size: u64,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub priority: ResourcePriority,
    #[serde(default)]
    pub initiator: Initiator,
    /// Request id of the redirect that produced this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<ResourceTiming>,
    #[serde(default)]
    pub from_disk_cache: bool,
    #[serde(default)]
    pub failed: bool,
}

impl NetworkRecord {
    /// Creates a record with the given id, URL and time span (seconds).
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        start: f64,
        end: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            protocol: "http/1.1".to_string(),
            connection_id: String::new(),
            connection_reused: false,
            start_time: Some(start),
            end_time: Some(end),
            transfer_size: 0,
            resource_type: ResourceType::Other,
            priority: ResourcePriority::Medium,
            initiator: Initiator::default(),
            redirect_source: None,
            timing: None,
            from_disk_cache: false,
            failed: false,
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

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self
    }

    /// Marks the request as issued by the parser of `url`.
    pub fn initiated_by_parser(mut self, url: impl Into<String>) -> Self {
        self.initiator = Initiator {
            kind: InitiatorType::Parser,
            url: Some(url.into()),
            stack: None,
        };
        self
    }

    /// Marks the request as issued by the script at `url`.
    pub fn initiated_by_script(mut self, url: impl Into<String>) -> Self {
        self.initiator = Initiator {
            kind: InitiatorType::Script,
            url: None,
            stack: Some(StackTrace {
                call_frames: vec![CallFrame {
                    url: url.into(),
                    function_name: String::new(),
                }],
            }),
        };
        self
    }

    pub fn redirected_from(mut self, request_id: impl Into<String>) -> Self {
        self.redirect_source = Some(request_id.into());
        self
    }

    pub fn with_timing(mut self, timing: ResourceTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn from_cache(mut self) -> Self {
        self.from_disk_cache = true;
        self
    }

    /// Security origin of the URL (`null` for opaque origins).
    pub fn origin(&self) -> String {
        origin_of(&self.url)
    }

    /// Returns true for https/wss URLs.
    pub fn is_secure(&self) -> bool {
        is_secure_url(&self.url)
    }
}

/// Serialized security origin of `url`; unparsable and opaque URLs yield
/// `null`.
pub fn origin_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| "null".to_string())
}

pub fn is_secure_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "https" | "wss"))
        .unwrap_or(false)
}

/// The network log of a page load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkLog {
    pub records: Vec<NetworkRecord>,
}

impl NetworkLog {
    pub fn new(records: Vec<NetworkRecord>) -> Self {
        Self { records }
    }

    /// Parses a network log (a JSON array of records).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LanternError::MalformedInput(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let json = r#"[{
            "requestId": "1000.1",
            "url": "https://example.com/",
            "protocol": "h2",
            "connectionId": "42",
            "startTime": 1.0,
            "endTime": 1.25,
            "transferSize": 14000,
            "resourceType": "Document",
            "priority": "VeryHigh",
            "initiator": {"type": "other"}
        }, {
            "requestId": "1000.2",
            "url": "https://example.com/data.json",
            "resourceType": "XHR",
            "initiator": {
                "type": "script",
                "stack": {"callFrames": [{"url": "https://example.com/app.js"}]}
            }
        }]"#;

        let log = NetworkLog::from_json(json).unwrap();
        assert_eq!(log.len(), 2);

        let doc = &log.records[0];
        assert_eq!(doc.resource_type, ResourceType::Document);
        assert_eq!(doc.priority, ResourcePriority::VeryHigh);
        assert_eq!(doc.start_time, Some(1.0));
        assert_eq!(doc.origin(), "https://example.com");
        assert!(doc.is_secure());

        let xhr = &log.records[1];
        assert_eq!(xhr.resource_type, ResourceType::Xhr);
        assert_eq!(xhr.start_time, None);
        assert_eq!(xhr.initiator.source_url(), Some("https://example.com/app.js"));
    }

    #[test]
    fn test_unknown_resource_type_is_other() {
        let json = r#"[{"requestId": "1", "url": "x", "resourceType": "Ping", "startTime": 0}]"#;
        let log = NetworkLog::from_json(json).unwrap();
        assert_eq!(log.records[0].resource_type, ResourceType::Other);
    }

    #[test]
    fn test_opaque_origin() {
        let record = NetworkRecord::new("1", "data:image/png;base64,AAAA", 0.0, 0.0);
        assert_eq!(record.origin(), "null");
        assert!(!record.is_secure());
    }

    #[test]
    fn test_resource_timing_phases() {
        let timing = ResourceTiming {
            request_time: 1.0,
            dns_start: 0.0,
            dns_end: 20.0,
            connect_start: 20.0,
            connect_end: 120.0,
            ssl_start: 70.0,
            ssl_end: 120.0,
            send_start: 121.0,
            send_end: 122.0,
            receive_headers_end: 222.0,
        };
        assert_eq!(timing.tcp_handshake_ms(), Some(50.0));
        assert_eq!(timing.time_to_first_byte_ms(), Some(100.0));
    }

    #[test]
    fn test_parser_initiator_prefers_url() {
        let record = NetworkRecord::new("2", "https://a.test/style.css", 0.0, 0.1)
            .initiated_by_parser("https://a.test/");
        assert_eq!(record.initiator.kind, InitiatorType::Parser);
        assert_eq!(record.initiator.source_url(), Some("https://a.test/"));
    }
}
