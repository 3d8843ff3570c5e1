//! Trace event definitions.
//!
//! A trace is the ordered stream of Chromium trace events recorded during a
//! page load. [`ProcessedTrace`] extracts what the graph builder and the
//! metrics need from it: the navigation start, paint markers and the
//! renderer main thread's events.

use serde::{Deserialize, Serialize};

use crate::error::{LanternError, Result};
use crate::types::{us_to_ms, SimTime, TraceTime};

/// Top-level task names that delimit one unit of main-thread work.
pub const SCHEDULABLE_TASK_NAMES: [&str; 4] = [
    "RunTask",
    "ThreadControllerImpl::RunTask",
    "ThreadControllerImpl::DoWork",
    "TaskQueueManager::ProcessTaskFromWorkQueue",
];

/// A single trace event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Event name, e.g. `EvaluateScript`
    pub name: String,
    /// Comma-separated categories
    #[serde(default)]
    pub cat: String,
    /// Phase (`X` complete, `I` instant, `R` mark, ...)
    #[serde(default)]
    pub ph: String,
    /// Timestamp in microseconds
    pub ts: TraceTime,
    /// Duration in microseconds, for complete events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<TraceTime>,
    #[serde(default)]
    pub pid: u64,
    #[serde(default)]
    pub tid: u64,
    /// Event arguments; `args.data` carries most of the interesting payload
    #[serde(default)]
    pub args: serde_json::Value,
}

impl TraceEvent {
    /// Creates a complete (`X`) event.
    pub fn complete(name: impl Into<String>, ts: TraceTime, dur: TraceTime) -> Self {
        Self {
            name: name.into(),
            cat: "devtools.timeline".to_string(),
            ph: "X".to_string(),
            ts,
            dur: Some(dur),
            pid: 1,
            tid: 1,
            args: serde_json::Value::Null,
        }
    }

    /// Creates an instant (`I`) event.
    pub fn instant(name: impl Into<String>, ts: TraceTime) -> Self {
        Self {
            ph: "I".to_string(),
            dur: None,
            ..Self::complete(name, ts, 0.0)
        }
    }

    /// Sets the `args.data` payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.args = serde_json::json!({ "data": data });
        self
    }

    /// Sets the category string.
    pub fn with_cat(mut self, cat: impl Into<String>) -> Self {
        self.cat = cat.into();
        self
    }

    /// Sets the process and thread ids.
    pub fn on_thread(mut self, pid: u64, tid: u64) -> Self {
        self.pid = pid;
        self.tid = tid;
        self
    }

    /// End timestamp in microseconds (`ts` for events without duration).
    pub fn end_ts(&self) -> TraceTime {
        self.ts + self.dur.unwrap_or(0.0)
    }

    /// Returns true for top-level main-thread tasks.
    pub fn is_schedulable_task(&self) -> bool {
        SCHEDULABLE_TASK_NAMES.contains(&self.name.as_str())
    }

    /// Returns `args.data`, if present.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.args.get("data")
    }

    /// Returns a string field of `args.data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data()?.get(key)?.as_str()
    }

    /// URLs found in `args.data.stackTrace`.
    pub fn stack_trace_urls(&self) -> Vec<&str> {
        self.data()
            .and_then(|d| d.get("stackTrace"))
            .and_then(|s| s.as_array())
            .map(|frames| {
                frames
                    .iter()
                    .filter_map(|f| f.get("url").and_then(|u| u.as_str()))
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A recorded trace.
///
/// Deserializes from either `{"traceEvents": [...]}` or a bare event array.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TraceRepr")]
pub struct Trace {
    #[serde(rename = "traceEvents")]
    pub trace_events: Vec<TraceEvent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceRepr {
    Object {
        #[serde(rename = "traceEvents")]
        trace_events: Vec<TraceEvent>,
    },
    Array(Vec<TraceEvent>),
}

impl From<TraceRepr> for Trace {
    fn from(repr: TraceRepr) -> Self {
        match repr {
            TraceRepr::Object { trace_events } | TraceRepr::Array(trace_events) => {
                Trace { trace_events }
            }
        }
    }
}

impl Trace {
    /// Creates a trace from events.
    pub fn new(trace_events: Vec<TraceEvent>) -> Self {
        Self { trace_events }
    }

    /// Parses a trace from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LanternError::MalformedInput(e.to_string()))
    }
}

/// The parts of a trace the graph builder and metrics consume.
///
/// All marker times are milliseconds relative to navigation start.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessedTrace {
    /// Navigation start, in trace microseconds
    pub navigation_start_us: TraceTime,
    pub main_pid: u64,
    pub main_tid: u64,
    pub first_contentful_paint: Option<SimTime>,
    pub first_meaningful_paint: Option<SimTime>,
    /// Last event end on any thread
    pub trace_end: SimTime,
    /// Main-thread events sorted by timestamp
    pub main_thread_events: Vec<TraceEvent>,
}

impl ProcessedTrace {
    /// Extracts the navigation timeline from a trace.
    ///
    /// Fails with [`LanternError::MalformedInput`] when no `navigationStart`
    /// marker is present.
    pub fn from_trace(trace: &Trace) -> Result<Self> {
        let mut events: Vec<&TraceEvent> = trace.trace_events.iter().collect();
        events.sort_by(|a, b| a.ts.total_cmp(&b.ts));

        let navigation_start = events
            .iter()
            .find(|e| e.name == "navigationStart")
            .copied()
            .ok_or_else(|| {
                LanternError::MalformedInput("trace has no navigationStart marker".to_string())
            })?;
        let navigation_start_us = navigation_start.ts;

        let (main_pid, main_tid) = events
            .iter()
            .find(|e| e.name == "TracingStartedInPage")
            .map(|e| (e.pid, e.tid))
            .unwrap_or((navigation_start.pid, navigation_start.tid));

        let relative = |e: &TraceEvent| us_to_ms(e.ts - navigation_start_us);
        let after_navigation = |e: &&&TraceEvent| e.ts >= navigation_start_us;

        let first_contentful_paint = events
            .iter()
            .filter(after_navigation)
            .find(|e| e.name == "firstContentfulPaint")
            .map(|e| relative(*e));

        let first_meaningful_paint = events
            .iter()
            .filter(after_navigation)
            .find(|e| e.name == "firstMeaningfulPaint")
            .or_else(|| {
                events
                    .iter()
                    .filter(after_navigation)
                    .filter(|e| e.name == "firstMeaningfulPaintCandidate")
                    .last()
            })
            .map(|e| relative(*e));

        let trace_end = events
            .iter()
            .map(|e| us_to_ms(e.end_ts() - navigation_start_us))
            .fold(0.0, f64::max);

        let main_thread_events = events
            .iter()
            .filter(|e| e.pid == main_pid && e.tid == main_tid)
            .map(|e| (*e).clone())
            .collect();

        Ok(Self {
            navigation_start_us,
            main_pid,
            main_tid,
            first_contentful_paint,
            first_meaningful_paint,
            trace_end,
            main_thread_events,
        })
    }

    /// First meaningful paint, or an error when the trace never painted.
    pub fn require_first_meaningful_paint(&self) -> Result<SimTime> {
        self.first_meaningful_paint.ok_or_else(|| {
            LanternError::MalformedInput("trace has no firstMeaningfulPaint marker".to_string())
        })
    }

    /// Converts a trace timestamp (µs) to ms relative to navigation start.
    pub fn to_relative_ms(&self, ts: TraceTime) -> SimTime {
        us_to_ms(ts - self.navigation_start_us)
    }
}
