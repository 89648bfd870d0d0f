//! Load-balancing strategies for picking one provider instance.
//!
//! Strategies implement [`LoadBalancer`] and are registered by name with the
//! extension registry; discovery resolves the configured one and applies it
//! to the instance list. All strategies share one contract: an empty input
//! yields `None`, a non-empty input always yields a selection, and `select`
//! never panics.
//!
//! Weighted variants expand the candidate list by per-instance weight before
//! applying their base rule: a weight of 0 drops the instance, anything else
//! is clamped into `[MIN_INSTANCE_WEIGHT, MAX_INSTANCE_WEIGHT]`.

mod consistent_hash;
mod hash;
mod least_connections;
mod round_robin;
mod source_ip;

pub use consistent_hash::{
    ConsistentHashLoadBalancer, ConsistentHashWeightLoadBalancer, VIRTUAL_NODES_PER_INSTANCE,
};
pub use hash::{HashLoadBalancer, HashWeightLoadBalancer};
pub use least_connections::{ConnectionTracker, LeastConnectionsLoadBalancer};
pub use round_robin::{RoundRobinLoadBalancer, RoundRobinWeightLoadBalancer};
pub use source_ip::SourceIpHashWeightLoadBalancer;

use crate::registry::ServiceMeta;

/// Smallest effective instance weight.
pub const MIN_INSTANCE_WEIGHT: u32 = 1;

/// Largest effective instance weight.
pub const MAX_INSTANCE_WEIGHT: u32 = 100;

/// Picks one instance out of a discovered set.
pub trait LoadBalancer: Send + Sync {
    /// Select an instance.
    ///
    /// `hash` is the request's routing hash; `source_ip` is the caller's
    /// address where known. Returns `None` only for an empty `servers` slice.
    fn select(
        &self,
        servers: &[ServiceMeta],
        hash: u64,
        source_ip: Option<&str>,
    ) -> Option<ServiceMeta>;
}

/// Replicate each instance `weight` times (clamped; weight 0 excluded).
pub(crate) fn expand_by_weight(servers: &[ServiceMeta]) -> Vec<ServiceMeta> {
    let mut expanded = Vec::with_capacity(servers.len());
    for server in servers {
        if server.weight == 0 {
            continue;
        }
        let weight = server.weight.clamp(MIN_INSTANCE_WEIGHT, MAX_INSTANCE_WEIGHT);
        for _ in 0..weight {
            expanded.push(server.clone());
        }
    }
    expanded
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::registry::ServiceMeta;

    pub fn instance(port: u16, weight: u32) -> ServiceMeta {
        ServiceMeta {
            service_name: "Demo".into(),
            service_version: "1.0.0".into(),
            service_group: "g".into(),
            service_addr: "10.0.0.1".into(),
            service_port: port,
            weight,
        }
    }

    pub fn instances(n: u16) -> Vec<ServiceMeta> {
        (0..n).map(|i| instance(9000 + i, 1)).collect()
    }
}
