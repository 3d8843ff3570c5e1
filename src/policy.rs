//! Resource-contention policies.
//!
//! A [`ResourcePolicy`] is built fresh for each simulation from the run's
//! [`ThrottlingSettings`]. The optimistic policy gives every request a warm
//! connection of its own; the pessimistic policy caps connections per origin,
//! charges cold handshakes and slows the CPU down.
//!
//! A pessimistic policy never makes a node cheaper than its optimistic
//! [`baseline`](ResourcePolicy::baseline): the slowdown is at least the
//! optimistic multiplier and every origin keeps at least one slot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ThrottlingSettings;
use crate::types::SimTime;

/// Which side of the estimate a simulation produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Optimistic,
    Pessimistic,
}

impl PolicyMode {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            PolicyMode::Optimistic => PolicyMode::Pessimistic,
            PolicyMode::Pessimistic => PolicyMode::Optimistic,
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::Optimistic => write!(f, "optimistic"),
            PolicyMode::Pessimistic => write!(f, "pessimistic"),
        }
    }
}

/// Network and CPU conditions a graph is replayed under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    pub mode: PolicyMode,
    pub rtt_ms: SimTime,
    pub throughput_kbps: f64,
    /// `None` means unlimited
    pub max_connections_per_origin: Option<usize>,
    /// Whether a cold connection pays DNS/TCP/TLS round trips
    pub charge_handshake: bool,
    pub dns_round_trips: u32,
    pub tcp_round_trips: u32,
    pub tls_round_trips: u32,
    pub cpu_multiplier: f64,
    /// CPU multiplier of the optimistic side of the same profile
    pub optimistic_cpu_multiplier: f64,
    pub layout_multiplier: f64,
}

impl ResourcePolicy {
    pub fn optimistic(settings: &ThrottlingSettings) -> Self {
        Self {
            mode: PolicyMode::Optimistic,
            rtt_ms: settings.rtt_ms,
            throughput_kbps: settings.throughput_kbps,
            max_connections_per_origin: None,
            charge_handshake: false,
            dns_round_trips: settings.dns_round_trips,
            tcp_round_trips: settings.tcp_round_trips,
            tls_round_trips: settings.tls_round_trips,
            cpu_multiplier: settings.optimistic_cpu_multiplier,
            optimistic_cpu_multiplier: settings.optimistic_cpu_multiplier,
            layout_multiplier: settings.layout_task_multiplier,
        }
    }

    pub fn pessimistic(settings: &ThrottlingSettings) -> Self {
        Self {
            mode: PolicyMode::Pessimistic,
            max_connections_per_origin: Some(settings.max_connections_per_origin.max(1)),
            charge_handshake: true,
            cpu_multiplier: settings
                .cpu_slowdown_multiplier
                .max(settings.optimistic_cpu_multiplier),
            ..Self::optimistic(settings)
        }
    }

    /// The optimistic policy over the same link, for a pessimistic policy.
    ///
    /// Pessimistic replays never start a node earlier than this baseline
    /// does.
    pub fn baseline(&self) -> Option<ResourcePolicy> {
        match self.mode {
            PolicyMode::Optimistic => None,
            PolicyMode::Pessimistic => Some(Self {
                mode: PolicyMode::Optimistic,
                max_connections_per_origin: None,
                charge_handshake: false,
                cpu_multiplier: self.optimistic_cpu_multiplier,
                ..self.clone()
            }),
        }
    }

    pub fn for_mode(mode: PolicyMode, settings: &ThrottlingSettings) -> Self {
        match mode {
            PolicyMode::Optimistic => Self::optimistic(settings),
            PolicyMode::Pessimistic => Self::pessimistic(settings),
        }
    }

    /// Multiplier applied to layout task durations.
    pub fn layout_task_multiplier(&self) -> f64 {
        (self.cpu_multiplier * self.layout_multiplier).max(1.0)
    }

    /// Time to push `bytes` through the throttled link.
    pub fn transfer_time(&self, bytes: u64) -> SimTime {
        bytes as f64 * 8.0 / self.throughput_kbps
    }
}
