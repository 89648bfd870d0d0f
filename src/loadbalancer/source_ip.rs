//! Source-IP affinity over the weight-expanded instance list.

use super::{expand_by_weight, LoadBalancer};
use crate::message::stable_hash;
use crate::registry::ServiceMeta;

/// Pins a caller to an instance by hashing its IP together with the routing
/// hash. An unknown or empty source IP selects the first expanded instance.
#[derive(Debug, Default)]
pub struct SourceIpHashWeightLoadBalancer;

impl LoadBalancer for SourceIpHashWeightLoadBalancer {
    fn select(
        &self,
        servers: &[ServiceMeta],
        hash: u64,
        source_ip: Option<&str>,
    ) -> Option<ServiceMeta> {
        let expanded = expand_by_weight(servers);
        if expanded.is_empty() {
            return None;
        }

        let ip = match source_ip {
            Some(ip) if !ip.is_empty() => ip,
            _ => return Some(expanded[0].clone()),
        };

        let index = (stable_hash(ip).wrapping_add(hash) % expanded.len() as u64) as usize;
        Some(expanded[index].clone())
    }
}
