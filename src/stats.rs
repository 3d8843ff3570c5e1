//! Statistics collection and export for analysis runs.
//!
//! Every computation the cache actually executes is recorded as a
//! [`Measure`]. A finished run's [`RunStats`] can be exported as JSON, as
//! CSV, as a human-readable summary, or as a Chromium trace
//! (`{"traceEvents": [...]}`) that loads in any trace viewer.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::{LanternError, Result};

/// Process name used for exported timing traces.
pub const TRACE_PROCESS_NAME: &str = "lantern";

/// Wall-clock measure of a single computation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub category: String,
    /// Offset from the start of the run, ms
    pub start_ms: f64,
    pub duration_ms: f64,
    /// Thread the computation ran on
    pub thread: String,
}

impl Measure {
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }
}

/// Thread-safe sink for measures.
#[derive(Debug)]
pub struct TimingRecorder {
    origin: Instant,
    measures: Mutex<Vec<Measure>>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            measures: Mutex::new(Vec::new()),
        }
    }

    /// Records a measure that began at `started` and lasted `elapsed`.
    pub fn record(
        &self,
        name: impl Into<String>,
        category: &str,
        started: Instant,
        elapsed: Duration,
    ) {
        let thread = std::thread::current();
        let thread = thread
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread.id()));

        let start_ms = started.saturating_duration_since(self.origin).as_secs_f64() * 1000.0;
        self.measures.lock().push(Measure {
            name: name.into(),
            category: category.to_string(),
            start_ms,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            thread,
        });
    }

    /// Snapshot of the recorded measures.
    pub fn measures(&self) -> Vec<Measure> {
        self.measures.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.measures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TimingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Computation cache counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Every request, hit or miss
    pub requests: u64,
    /// Requests served from an existing entry (including waits on pending ones)
    pub hits: u64,
    /// Computations actually executed
    pub executions: u64,
    /// Executions that returned an error or panicked
    pub failures: u64,
}

/// Metadata about the run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run name/description
    pub name: String,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,

    /// Crate version
    pub version: String,
}

/// Aggregate statistics for an analysis run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub metadata: RunMetadata,

    pub cache: CacheStats,

    /// Measures in recording order
    pub measures: Vec<Measure>,

    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,
}

impl RunStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self {
            metadata: RunMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..RunMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Sets the run name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(unix_now());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(unix_now());
    }

    /// Total time spent in computations with the given name.
    pub fn time_in(&self, name: &str) -> f64 {
        self.measures
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.duration_ms)
            .sum()
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports the measures to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("name,category,thread,start_ms,duration_ms\n");
        for m in &self.measures {
            csv.push_str(&format!(
                "{},{},{},{:.3},{:.3}\n",
                m.name, m.category, m.thread, m.start_ms, m.duration_ms
            ));
        }

        csv
    }

    /// Exports the measures to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Converts the measures into Chromium trace events.
    ///
    /// Measures are sorted by start and placed on one track per thread.
    /// Measures on the same thread must nest; a partial overlap is an error.
    pub fn to_trace_events(&self) -> Result<Vec<serde_json::Value>> {
        let mut measures: Vec<&Measure> = self.measures.iter().collect();
        measures.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));

        let mut events = Vec::with_capacity(measures.len());
        for (i, measure) in measures.iter().enumerate() {
            let overlapping = measures[..i].iter().find(|prev| {
                prev.thread == measure.thread
                    && prev.end_ms() > measure.start_ms
                    && prev.end_ms() < measure.end_ms()
            });
            if let Some(prev) = overlapping {
                return Err(LanternError::Serialization(format!(
                    "measures overlap: {} & {}",
                    prev.name, measure.name
                )));
            }

            let mut event = serde_json::json!({
                "name": measure.name,
                "cat": measure.category,
                "ts": measure.start_ms * 1000.0,
                "dur": measure.duration_ms * 1000.0,
                "args": {},
                "pid": TRACE_PROCESS_NAME,
                "tid": measure.thread,
                "ph": "X",
                "id": format!("0x{:x}", i),
            });
            if measure.duration_ms == 0.0 {
                event["ph"] = "n".into();
                event["s"] = "t".into();
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Serializes the measures as a loadable trace.
    pub fn to_trace_json(&self) -> Result<String> {
        let events = self.to_trace_events()?;
        Ok(serde_json::to_string_pretty(&serde_json::json!({ "traceEvents": events }))?)
    }

    /// Writes the measures as a trace file.
    pub fn to_trace_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_trace_json()?;
        std::fs::write(path, json).map_err(|e| LanternError::Serialization(e.to_string()))
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Analysis Run Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Computation cache ---")?;
        writeln!(w, "Requests: {}", self.cache.requests)?;
        writeln!(w, "Hits: {}", self.cache.hits)?;
        writeln!(w, "Executions: {}", self.cache.executions)?;
        writeln!(w, "Failures: {}", self.cache.failures)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.total_wall_time_ms)?;
        for m in &self.measures {
            writeln!(w, "  {:<48} {:>10.2} ms  [{}]", m.name, m.duration_ms, m.thread)?;
        }

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Returns current timestamp as string.
fn unix_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}
