//! Core type definitions for the simulation framework.
//!
//! This module defines the fundamental types used throughout the simulation engine.

use std::cmp::Ordering;

/// Simulation time unit, in milliseconds.
///
/// Observed node times are milliseconds relative to the trace's navigation
/// start; simulated times are milliseconds since the root node started.
pub type SimTime = f64;

/// Unique identifier for a node in a dependency graph.
///
/// Node ids are arena indices: a graph with `n` nodes uses ids `0..n`.
pub type NodeId = usize;

/// Trace timestamps and durations, in microseconds.
pub type TraceTime = f64;

/// Converts a trace timestamp (µs) to milliseconds.
#[inline]
pub fn us_to_ms(us: TraceTime) -> SimTime {
    us / 1000.0
}

/// A totally ordered wrapper around [`SimTime`] used as a queue key.
///
/// Ordering follows `f64::total_cmp`, which keeps the simulator's priority
/// queues deterministic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderedTime(pub SimTime);

impl Eq for OrderedTime {}

impl PartialOrd for OrderedTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}
