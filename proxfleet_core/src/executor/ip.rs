use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Pick the management address among the guest addresses:
/// the first routable one, inside the management subnets when any are set.
pub fn select(addresses: &[Ipv4Addr], subnets: &[Ipv4Net]) -> Option<Ipv4Addr> {
    addresses
        .iter()
        .filter(|e| !e.is_loopback() && !e.is_link_local() && !e.is_unspecified())
        .find(|e| subnets.is_empty() || subnets.iter().any(|net| net.contains(*e)))
        .copied()
}
