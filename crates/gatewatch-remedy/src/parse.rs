//! Parsers for routing-table, lease-manager and interface output.

use std::net::Ipv4Addr;
use std::time::Duration;

use regex::Regex;

use crate::error::{CommandError, CommandResult};

/// A DHCP lease as reported by the lease manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// Time left before the lease expires.
    pub remaining: Duration,
}

impl Lease {
    /// Whether address, netmask and upstream gateway all match.
    pub fn same_binding(&self, other: &Lease) -> bool {
        self.address == other.address
            && self.netmask == other.netmask
            && self.gateway == other.gateway
    }
}

/// Next hops of every default route in `ip route`-style output.
///
/// Understands single routes (`default via A dev eth0`) and multipath
/// continuation lines (`nexthop via B dev eth1 weight 1`).
pub fn default_routes(output: &str) -> CommandResult<Vec<Ipv4Addr>> {
    let via = Regex::new(r"^\s*(?:default|nexthop)\b.*?\bvia\s+(\d{1,3}(?:\.\d{1,3}){3})")?;
    Ok(output
        .lines()
        .filter_map(|line| via.captures(line))
        .filter_map(|caps| caps[1].parse().ok())
        .collect())
}

/// Parse lease-manager output of `key: value` (or `key=value`) lines.
///
/// Recognised keys: `address`, `netmask`, `gateway`, `expires`, plus the
/// dhcpcd-style aliases `ip_address`, `subnet_mask` and `routers`.
/// `expires` reads like `3 hours` or `45 minutes`.
pub fn lease(output: &str) -> CommandResult<Lease> {
    let line_re = Regex::new(r"^\s*([A-Za-z_]+)\s*[:=]\s*(.+?)\s*$")?;

    let mut address = None;
    let mut netmask = None;
    let mut gateway = None;
    let mut remaining = None;

    for caps in output.lines().filter_map(|l| line_re.captures(l)) {
        let value = &caps[2];
        match caps[1].to_ascii_lowercase().as_str() {
            "address" | "ip_address" => address = value.parse().ok(),
            "netmask" | "subnet_mask" => netmask = value.parse().ok(),
            // dhcpcd lists several routers; the first is the gateway.
            "gateway" | "routers" => {
                gateway = value.split_whitespace().next().and_then(|v| v.parse().ok())
            }
            "expires" => remaining = lease_time(value)?,
            _ => {}
        }
    }

    match (address, netmask, gateway, remaining) {
        (Some(address), Some(netmask), Some(gateway), Some(remaining)) => Ok(Lease {
            address,
            netmask,
            gateway,
            remaining,
        }),
        _ => Err(CommandError::Unparseable {
            what: "lease",
            output: output.trim().to_string(),
        }),
    }
}

/// `"3 hours"` → 3h, `"1 minute"` → 60s. Unknown units and counts too
/// large to represent yield `None`.
pub fn lease_time(value: &str) -> CommandResult<Option<Duration>> {
    let re = Regex::new(r"(?i)^\s*(\d+)\s*(hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)\b")?;
    let Some(caps) = re.captures(value) else {
        return Ok(None);
    };
    let Ok(count) = caps[1].parse::<u64>() else {
        return Ok(None);
    };
    let unit = caps[2].to_ascii_lowercase();
    let scale = if unit.starts_with('h') {
        3600
    } else if unit.starts_with('m') {
        60
    } else {
        1
    };
    Ok(count.checked_mul(scale).map(Duration::from_secs))
}

/// Peer address of a point-to-point interface.
///
/// Accepts iproute2 (`inet A peer B/32`) and BSD ifconfig (`inet A --> B`)
/// formats.
pub fn peer_address(output: &str) -> CommandResult<Ipv4Addr> {
    let re = Regex::new(
        r"inet\s+\d{1,3}(?:\.\d{1,3}){3}(?:/\d+)?\s+(?:peer|-->)\s+(\d{1,3}(?:\.\d{1,3}){3})",
    )?;
    re.captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| CommandError::Unparseable {
            what: "interface",
            output: output.trim().to_string(),
        })
}
