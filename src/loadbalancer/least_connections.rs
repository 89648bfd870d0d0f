//! Least-connections selection backed by a shared connection tracker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::LoadBalancer;
use crate::registry::ServiceMeta;

/// Per-endpoint connection counts shared between the consumer engine and the
/// least-connections strategy.
///
/// Counts are recorded when a connection is established and never
/// decremented, so they are a coarse preference signal, not a live gauge.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    counts: Mutex<HashMap<String, u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection to `endpoint` (`addr:port`).
    pub fn record(&self, endpoint: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    /// Connection count for an endpoint, if any was ever recorded.
    pub fn count(&self, endpoint: &str) -> Option<u64> {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(endpoint).copied()
    }
}

/// Prefers instances never connected to, then the lowest recorded count.
pub struct LeastConnectionsLoadBalancer {
    tracker: Arc<ConnectionTracker>,
}

impl LeastConnectionsLoadBalancer {
    pub fn new(tracker: Arc<ConnectionTracker>) -> Self {
        Self { tracker }
    }
}

impl LoadBalancer for LeastConnectionsLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        _hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        if let Some(untracked) = servers
            .iter()
            .find(|s| self.tracker.count(&s.endpoint()).is_none())
        {
            return Some(untracked.clone());
        }

        servers
            .iter()
            .min_by_key(|s| self.tracker.count(&s.endpoint()).unwrap_or(0))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadbalancer::test_support::instances;

    #[test]
    fn test_empty_input_yields_none() {
        let balancer = LeastConnectionsLoadBalancer::new(Arc::new(ConnectionTracker::new()));
        assert!(balancer.select(&[], 0, None).is_none());
    }

    #[test]
    fn test_prefers_untracked_instance() {
        let tracker = Arc::new(ConnectionTracker::new());
        let servers = instances(3);
        tracker.record(&servers[0].endpoint());
        tracker.record(&servers[1].endpoint());

        let balancer = LeastConnectionsLoadBalancer::new(tracker);
        let selected = balancer.select(&servers, 0, None).unwrap();
        assert_eq!(selected, servers[2]);
    }

    #[test]
    fn test_picks_minimum_count_when_all_tracked() {
        let tracker = Arc::new(ConnectionTracker::new());
        let servers = instances(3);
        for (i, server) in servers.iter().enumerate() {
            for _ in 0..=i {
                tracker.record(&server.endpoint());
            }
        }

        let balancer = LeastConnectionsLoadBalancer::new(tracker);
        let selected = balancer.select(&servers, 0, None).unwrap();
        assert_eq!(selected, servers[0]);
    }

    #[test]
    fn test_tracker_counts_accumulate() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.count("10.0.0.1:9000"), None);
        tracker.record("10.0.0.1:9000");
        tracker.record("10.0.0.1:9000");
        assert_eq!(tracker.count("10.0.0.1:9000"), Some(2));
    }
}
