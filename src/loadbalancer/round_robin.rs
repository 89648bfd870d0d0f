//! Round-robin selection, plain and weighted.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{expand_by_weight, LoadBalancer};
use crate::registry::ServiceMeta;

/// Counter value at which the cursor is reset, well before wraparound.
const COUNTER_RESET_THRESHOLD: u64 = u64::MAX - 10_000;

fn next_index(counter: &AtomicU64, len: usize) -> usize {
    let ticket = counter.fetch_add(1, Ordering::Relaxed);
    if ticket >= COUNTER_RESET_THRESHOLD {
        counter.store(0, Ordering::Relaxed);
    }
    (ticket % len as u64) as usize
}

/// Cycles through instances with an atomic cursor.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    counter: AtomicU64,
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        _hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        if servers.is_empty() {
            return None;
        }
        Some(servers[next_index(&self.counter, servers.len())].clone())
    }
}

/// Round-robin over the weight-expanded instance list.
#[derive(Debug, Default)]
pub struct RoundRobinWeightLoadBalancer {
    counter: AtomicU64,
}

impl LoadBalancer for RoundRobinWeightLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        _hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        let expanded = expand_by_weight(servers);
        if expanded.is_empty() {
            return None;
        }
        Some(expanded[next_index(&self.counter, expanded.len())].clone())
    }
}
