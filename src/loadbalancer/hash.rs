//! Hash-modulo selection, plain and weighted.
//!
//! Registered as `hash` / `hash_weight`, and also as `random` /
//! `random_weight`: keying on the routing hash keeps repeated sends of the
//! same request on one instance, which the plain strategies rely on.

use super::{expand_by_weight, LoadBalancer};
use crate::registry::ServiceMeta;

/// `index = hash mod count`.
#[derive(Debug, Default)]
pub struct HashLoadBalancer;

impl LoadBalancer for HashLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        if servers.is_empty() {
            return None;
        }
        let index = (hash % servers.len() as u64) as usize;
        Some(servers[index].clone())
    }
}

/// Hash-modulo over the weight-expanded instance list.
#[derive(Debug, Default)]
pub struct HashWeightLoadBalancer;

impl LoadBalancer for HashWeightLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        hash: u64,
        _source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        let expanded = expand_by_weight(servers);
        if expanded.is_empty() {
            return None;
        }
        let index = (hash % expanded.len() as u64) as usize;
        Some(expanded[index].clone())
    }
}
