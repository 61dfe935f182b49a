//! Gateway registry types.
//!
//! The descriptor list is built once from `gatewatch.toml`. Its order is the
//! priority order: index 0 is the preferred gateway.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a gateway is reached and what remediation applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Always-on gateway with a static or externally managed address.
    Dedicated,
    /// Dedicated gateway whose address comes from a DHCP lease.
    #[serde(rename = "dhcp_primary")]
    DhcpLeasePrimary,
    /// DHCP-leased gateway that must not install a default route unless active.
    #[serde(rename = "dhcp_backup")]
    DhcpLeaseBackup,
    /// Dial or tunnel link that has to be brought up before use.
    OnDemand,
    /// Monitored only. Never carries the default route.
    HostCheck,
}

impl GatewayKind {
    /// Whether this gateway may become the active gateway.
    pub fn is_routable(self) -> bool {
        self != GatewayKind::HostCheck
    }

    /// Whether the gateway's address is bound to a DHCP lease.
    pub fn is_dhcp(self) -> bool {
        matches!(
            self,
            GatewayKind::DhcpLeasePrimary | GatewayKind::DhcpLeaseBackup
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayKind::Dedicated => "dedicated",
            GatewayKind::DhcpLeasePrimary => "dhcp_primary",
            GatewayKind::DhcpLeaseBackup => "dhcp_backup",
            GatewayKind::OnDemand => "on_demand",
            GatewayKind::HostCheck => "host_check",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An IPv4 network in CIDR notation, e.g. `10.0.0.0/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    pub network: Ipv4Addr,
    pub prefix: u8,
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("missing prefix length in {s:?}"))?;
        let network: Ipv4Addr = addr
            .parse()
            .map_err(|e| format!("bad network address {addr:?}: {e}"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| format!("bad prefix length {prefix:?}: {e}"))?;
        if prefix > 32 {
            return Err(format!("prefix length {prefix} exceeds 32"));
        }
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// One configured gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDescriptor {
    /// Position in the list; 0 is the highest priority.
    pub priority: usize,
    pub gateway_address: Ipv4Addr,
    /// Address probed for reachability. Often equal to `gateway_address`.
    pub probe_address: Ipv4Addr,
    pub interface: Option<String>,
    /// Networks the lease manager routes via this gateway (DHCP backup only).
    pub routes: Vec<Ipv4Cidr>,
    pub kind: GatewayKind,
}

impl GatewayDescriptor {
    pub fn new(priority: usize, gateway_address: Ipv4Addr, kind: GatewayKind) -> Self {
        Self {
            priority,
            gateway_address,
            probe_address: gateway_address,
            interface: None,
            routes: Vec::new(),
            kind,
        }
    }

    pub fn with_probe(mut self, probe_address: Ipv4Addr) -> Self {
        self.probe_address = probe_address;
        self
    }

    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interface = Some(interface.to_string());
        self
    }

    pub fn with_routes(mut self, routes: Vec<Ipv4Cidr>) -> Self {
        self.routes = routes;
        self
    }

    /// Point the gateway at a newly discovered next hop.
    ///
    /// The probe address follows only when it was tracking the gateway
    /// address. Returns the previous gateway address.
    pub fn rewrite_address(&mut self, address: Ipv4Addr) -> Ipv4Addr {
        let old = self.gateway_address;
        if self.probe_address == old {
            self.probe_address = address;
        }
        self.gateway_address = address;
        old
    }
}

impl fmt::Display for GatewayDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({})", self.priority, self.gateway_address, self.kind)
    }
}
