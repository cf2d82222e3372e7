//! Address policy: which resolved addresses the prober may touch.

use std::net::IpAddr;
use std::sync::OnceLock;

use ipnet::IpNet;

const BLOCKED_RANGES: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "::/128",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
    "ff00::/8",
];

fn blocked_nets() -> &'static [IpNet] {
    static NETS: OnceLock<Vec<IpNet>> = OnceLock::new();
    NETS.get_or_init(|| BLOCKED_RANGES.iter().filter_map(|s| s.parse().ok()).collect())
}

/// True for private, loopback, link-local, CGNAT, multicast and reserved addresses.
/// IPv4-mapped IPv6 addresses are checked as their IPv4 form.
pub fn is_blocked(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    };
    blocked_nets().iter().any(|net| net.contains(&ip))
}

/// Strip IPv6 brackets from a host string.
pub fn bare_host(host: &str) -> &str {
    host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host)
}
