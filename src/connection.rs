//! Connection model for simulated network requests.
//!
//! Tracks per-origin connection slots and which connections are already
//! warm, and turns a request into a simulated duration:
//!
//! | Phase | Cost |
//! |-------|------|
//! | DNS | `dns_round_trips × rtt`, once per origin, cold connections only |
//! | TCP | `tcp_round_trips × rtt`, cold connections only |
//! | TLS | `tls_round_trips × rtt`, cold secure connections only |
//! | Request | `rtt + server_response_time` |
//! | Transfer | `transfer_size × 8 / throughput_kbps` |
//!
//! Handshakes are only charged when the policy asks for it. Requests served
//! from the disk cache or from a data URL keep their observed duration.
//!
//! # Example
//!
//! ```
//! use lantern::config::ThrottlingSettings;
//! use lantern::connection::ConnectionPool;
//! use lantern::node::NetworkNode;
//! use lantern::policy::ResourcePolicy;
//!
//! let policy = ResourcePolicy::pessimistic(&ThrottlingSettings::default());
//! let mut pool = ConnectionPool::new(&policy);
//!
//! let first = NetworkNode::new("1", "https://a.test/", 0.0, 100.0).with_connection("7");
//! let second = NetworkNode::new("2", "https://a.test/app.js", 0.0, 100.0).with_connection("7");
//!
//! // DNS (2 RTT) + TCP (1 RTT) + TLS (1 RTT) + request (1 RTT)
//! assert_eq!(pool.request_duration(&first), 750.0);
//! // the connection is warm now
//! assert_eq!(pool.request_duration(&second), 150.0);
//! ```

use std::collections::{HashMap, HashSet};

use crate::node::NetworkNode;
use crate::policy::ResourcePolicy;
use crate::types::SimTime;

/// A held connection slot; returned to the pool when the request finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lease {
    /// The request does not occupy a limited slot
    Unlimited,
    /// One of the origin's slots
    Origin(String),
}

/// Connection slots and warm-connection state for one simulation.
#[derive(Debug)]
pub struct ConnectionPool<'p> {
    policy: &'p ResourcePolicy,
    in_use: HashMap<String, usize>,
    warm_connections: HashSet<String>,
    resolved_origins: HashSet<String>,
}

impl<'p> ConnectionPool<'p> {
    pub fn new(policy: &'p ResourcePolicy) -> Self {
        Self {
            policy,
            in_use: HashMap::new(),
            warm_connections: HashSet::new(),
            resolved_origins: HashSet::new(),
        }
    }

    /// Returns true if the request never waits for a connection slot.
    pub fn bypasses_limit(node: &NetworkNode) -> bool {
        node.from_disk_cache || node.is_data_url() || node.is_multiplexed()
    }

    /// Takes a connection slot for `node` if one is free.
    pub fn try_acquire(&mut self, node: &NetworkNode) -> Option<Lease> {
        let Some(limit) = self.policy.max_connections_per_origin else {
            return Some(Lease::Unlimited);
        };
        if Self::bypasses_limit(node) {
            return Some(Lease::Unlimited);
        }

        let in_use = self.in_use.entry(node.origin.clone()).or_insert(0);
        if *in_use >= limit {
            return None;
        }
        *in_use += 1;
        Some(Lease::Origin(node.origin.clone()))
    }

    /// Returns a slot to the pool.
    pub fn release(&mut self, lease: Lease) {
        if let Lease::Origin(origin) = lease {
            if let Some(in_use) = self.in_use.get_mut(&origin) {
                *in_use = in_use.saturating_sub(1);
            }
        }
    }

    /// Slots currently held for `origin`.
    pub fn in_use(&self, origin: &str) -> usize {
        self.in_use.get(origin).copied().unwrap_or(0)
    }

    /// Simulated duration of `node`; the connection it uses becomes warm.
    pub fn request_duration(&mut self, node: &NetworkNode) -> SimTime {
        if node.from_disk_cache || node.is_data_url() {
            return node.observed_duration();
        }

        let handshake = self.handshake_time(node);
        self.warm_connections.insert(connection_key(node));
        self.resolved_origins.insert(node.origin.clone());

        handshake
            + self.policy.rtt_ms
            + node.server_response_time
            + self.policy.transfer_time(node.transfer_size)
    }

    /// Handshake cost `node` would pay right now.
    pub fn handshake_time(&self, node: &NetworkNode) -> SimTime {
        if !self.policy.charge_handshake || self.warm_connections.contains(&connection_key(node)) {
            return 0.0;
        }

        let mut round_trips = self.policy.tcp_round_trips;
        if !self.resolved_origins.contains(&node.origin) {
            round_trips += self.policy.dns_round_trips;
        }
        if node.is_secure {
            round_trips += self.policy.tls_round_trips;
        }
        f64::from(round_trips) * self.policy.rtt_ms
    }
}

/// Multiplexed protocols share one connection per origin; otherwise the
/// observed connection id identifies it.
fn connection_key(node: &NetworkNode) -> String {
    if node.is_multiplexed() || node.connection_id.is_empty() {
        node.origin.clone()
    } else {
        format!("{}#{}", node.origin, node.connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottlingSettings;

    fn settings() -> ThrottlingSettings {
        ThrottlingSettings {
            rtt_ms: 100.0,
            throughput_kbps: 800.0,
            max_connections_per_origin: 2,
            ..ThrottlingSettings::default()
        }
    }

    #[test]
    fn test_optimistic_is_unlimited_and_warm() {
        let policy = ResourcePolicy::optimistic(&settings());
        let mut pool = ConnectionPool::new(&policy);
        let node = NetworkNode::new("1", "https://a.test/", 0.0, 10.0).with_transfer_size(1000);

        for _ in 0..10 {
            assert_eq!(pool.try_acquire(&node), Some(Lease::Unlimited));
        }
        // rtt + 8000 bits / 800 kbps
        assert_eq!(pool.request_duration(&node), 110.0);
    }

    #[test]
    fn test_origin_limit() {
        let policy = ResourcePolicy::pessimistic(&settings());
        let mut pool = ConnectionPool::new(&policy);
        let a = NetworkNode::new("1", "http://a.test/1", 0.0, 10.0);
        let b = NetworkNode::new("2", "http://b.test/1", 0.0, 10.0);

        let first = pool.try_acquire(&a).unwrap();
        let _second = pool.try_acquire(&a).unwrap();
        assert_eq!(pool.try_acquire(&a), None);
        assert!(pool.try_acquire(&b).is_some());
        assert_eq!(pool.in_use("http://a.test"), 2);

        pool.release(first);
        assert_eq!(pool.in_use("http://a.test"), 1);
        assert!(pool.try_acquire(&a).is_some());
    }

    #[test]
    fn test_limit_bypass() {
        let policy = ResourcePolicy::pessimistic(&settings());
        let mut pool = ConnectionPool::new(&policy);
        let h2 = NetworkNode::new("1", "https://a.test/1", 0.0, 10.0).with_protocol("h2");
        for _ in 0..5 {
            assert_eq!(pool.try_acquire(&h2), Some(Lease::Unlimited));
        }
        let data = NetworkNode::new("2", "data:text/plain,hi", 0.0, 10.0);
        assert_eq!(pool.try_acquire(&data), Some(Lease::Unlimited));
    }

    #[test]
    fn test_cold_and_warm_handshakes() {
        let policy = ResourcePolicy::pessimistic(&settings());
        let mut pool = ConnectionPool::new(&policy);
        let first = NetworkNode::new("1", "http://a.test/", 0.0, 10.0).with_connection("1");
        let second = NetworkNode::new("2", "http://a.test/x", 0.0, 10.0).with_connection("2");
        let reuse = NetworkNode::new("3", "http://a.test/y", 0.0, 10.0).with_connection("1");

        // DNS 2 + TCP 1, no TLS
        assert_eq!(pool.request_duration(&first), 400.0);
        // new connection, origin already resolved
        assert_eq!(pool.request_duration(&second), 200.0);
        assert_eq!(pool.request_duration(&reuse), 100.0);
    }

    #[test]
    fn test_cached_request_keeps_observed_duration() {
        let policy = ResourcePolicy::pessimistic(&settings());
        let mut pool = ConnectionPool::new(&policy);
        let mut node = NetworkNode::new("1", "https://a.test/logo.png", 5.0, 12.0);
        node.from_disk_cache = true;
        assert_eq!(pool.request_duration(&node), 7.0);
        assert_eq!(pool.handshake_time(&node), 400.0);
    }

    #[test]
    fn test_server_response_time_added() {
        let policy = ResourcePolicy::optimistic(&settings());
        let mut pool = ConnectionPool::new(&policy);
        let node =
            NetworkNode::new("1", "https://a.test/", 0.0, 10.0).with_server_response_time(42.0);
        assert_eq!(pool.request_duration(&node), 142.0);
    }
}
