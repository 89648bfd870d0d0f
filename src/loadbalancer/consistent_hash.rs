//! Consistent-hash ring selection, plain and weighted.
//!
//! Each instance contributes virtual nodes hashed from `addr:port#i`; a
//! request maps to the first ring node at or after its routing hash, wrapping
//! to the lowest node past the end. Removing an instance only remaps the keys
//! that pointed at its own virtual nodes.

use std::collections::BTreeMap;

use super::{LoadBalancer, MAX_INSTANCE_WEIGHT, MIN_INSTANCE_WEIGHT};
use crate::message::stable_hash;
use crate::registry::ServiceMeta;

/// Virtual nodes placed on the ring per instance (before weight scaling).
pub const VIRTUAL_NODES_PER_INSTANCE: usize = 10;

fn build_ring<'a>(
    servers: &'a [ServiceMeta],
    scale_by_weight: bool,
) -> BTreeMap<u64, &'a ServiceMeta> {
    let mut ring = BTreeMap::new();
    for server in servers {
        let replicas = if scale_by_weight {
            if server.weight == 0 {
                continue;
            }
            let weight = server.weight.clamp(MIN_INSTANCE_WEIGHT, MAX_INSTANCE_WEIGHT);
            VIRTUAL_NODES_PER_INSTANCE * weight as usize
        } else {
            VIRTUAL_NODES_PER_INSTANCE
        };
        for i in 0..replicas {
            let key = stable_hash(&format!("{}#{}", server.endpoint(), i));
            ring.insert(key, server);
        }
    }
    ring
}

/// Ceiling lookup with wrap-around to the lowest node.
fn select_from_ring(ring: &BTreeMap<u64, &ServiceMeta>, hash: u64) -> Option<ServiceMeta> {
    ring.range(hash..)
        .next()
        .or_else(|| ring.iter().next())
        .map(|(_, server)| (*server).clone())
}

/// Ring with a fixed number of virtual nodes per instance.
#[derive(Debug, Default)]
pub struct ConsistentHashLoadBalancer;

impl LoadBalancer for ConsistentHashLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        select_from_ring(&build_ring(servers, false), hash)
    }
}

/// Ring whose virtual-node count scales with instance weight.
#[derive(Debug, Default)]
pub struct ConsistentHashWeightLoadBalancer;

impl LoadBalancer for ConsistentHashWeightLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        select_from_ring(&build_ring(servers, true), hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadbalancer::test_support::{instance, instances};

    #[test]
    fn test_empty_input_yields_none() {
        assert!(ConsistentHashLoadBalancer.select(&[], 1, None).is_none());
        assert!(ConsistentHashWeightLoadBalancer.select(&[], 1, None).is_none());
    }

    #[test]
    fn test_selection_is_stable() {
        let servers = instances(5);
        for hash in [0u64, 17, u64::MAX / 2, u64::MAX] {
            let first = ConsistentHashLoadBalancer.select(&servers, hash, None).unwrap();
            let second = ConsistentHashLoadBalancer.select(&servers, hash, None).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_wraps_past_highest_node() {
        let servers = instances(3);
        // u64::MAX sits at or past every virtual node with overwhelming
        // likelihood, forcing the wrap branch.
        assert!(ConsistentHashLoadBalancer
            .select(&servers, u64::MAX, None)
            .is_some());
    }

    #[test]
    fn test_removal_remaps_bounded_fraction() {
        let servers = instances(10);
        let hashes: Vec<u64> = (0..500u64).map(|i| i.wrapping_mul(0x9E3779B97F4A7C15)).collect();

        let before: Vec<u16> = hashes
            .iter()
            .map(|&h| {
                ConsistentHashLoadBalancer
                    .select(&servers, h, None)
                    .unwrap()
                    .service_port
            })
            .collect();

        let removed_port = servers[0].service_port;
        let remaining = &servers[1..];
        let moved = hashes
            .iter()
            .zip(&before)
            .filter(|&(&h, &port)| {
                let after = ConsistentHashLoadBalancer
                    .select(remaining, h, None)
                    .unwrap()
                    .service_port;
                after != port
            })
            .count();

        // Keys not mapped to the removed instance must stay put.
        let removed_share = before.iter().filter(|&&p| p == removed_port).count();
        assert_eq!(moved, removed_share);
    }

    #[test]
    fn test_weighted_ring_favors_heavier_instance() {
        let servers = vec![instance(9000, 10), instance(9001, 1)];
        let heavy_hits = (0..500u64)
            .map(|i| i.wrapping_mul(0x9E3779B97F4A7C15))
            .filter_map(|h| ConsistentHashWeightLoadBalancer.select(&servers, h, None))
            .filter(|s| s.service_port == 9000)
            .count();
        assert!(heavy_hits > 350, "heavy instance got {heavy_hits}/500");
    }

    #[test]
    fn test_weighted_excludes_zero_weight() {
        let servers = vec![instance(9000, 0), instance(9001, 1)];
        for hash in 0..50u64 {
            let selected = ConsistentHashWeightLoadBalancer
                .select(&servers, hash, None)
                .unwrap();
            assert_eq!(selected.service_port, 9001);
        }
    }
}
