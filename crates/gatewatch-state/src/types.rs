//! Health types shared by the prober, the store and the engine.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use gatewatch_core::GatewayDescriptor;

/// Two-valued gateway health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

impl HealthStatus {
    pub fn is_up(self) -> bool {
        self == HealthStatus::Up
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Up => f.write_str("up"),
            HealthStatus::Down => f.write_str("down"),
        }
    }
}

/// Live health of one gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayHealth {
    pub status: HealthStatus,
    /// Unix timestamp (seconds) of the last status change.
    pub since: u64,
    /// Failed probes accumulated while Down. Zero while Up.
    pub consecutive_failed_probes: u32,
}

impl GatewayHealth {
    /// Fresh health for a gateway with no history: assumed Up.
    pub fn up(now: u64) -> Self {
        Self {
            status: HealthStatus::Up,
            since: now,
            consecutive_failed_probes: 0,
        }
    }

    pub fn down(since: u64, consecutive_failed_probes: u32) -> Self {
        Self {
            status: HealthStatus::Down,
            since,
            consecutive_failed_probes,
        }
    }

    /// Whole minutes spent in the current status.
    pub fn minutes_in_status(&self, now: u64) -> u64 {
        now.saturating_sub(self.since) / 60
    }

    pub fn seconds_in_status(&self, now: u64) -> u64 {
        now.saturating_sub(self.since)
    }
}

/// Result of one cycle's probing of one gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeVerdict {
    pub status: HealthStatus,
    /// Probes sent this cycle. Zero when probing was skipped.
    pub attempts: u32,
    /// Failed probes accumulated across cycles. Zero when Up.
    pub consecutive_failed_probes: u32,
}

impl ProbeVerdict {
    /// Verdict for a gateway that was not probed this cycle.
    pub fn assumed_up() -> Self {
        Self {
            status: HealthStatus::Up,
            attempts: 0,
            consecutive_failed_probes: 0,
        }
    }
}

/// One line of the durable snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub address: Ipv4Addr,
    pub status: HealthStatus,
    pub since: u64,
}

/// Snapshot records for the current health vector, in priority order.
pub fn records(gateways: &[GatewayDescriptor], health: &[GatewayHealth]) -> Vec<HealthRecord> {
    gateways
        .iter()
        .zip(health)
        .map(|(gw, h)| HealthRecord {
            address: gw.gateway_address,
            status: h.status,
            since: h.since,
        })
        .collect()
}

/// Build the startup health vector, preferring persisted records.
///
/// Records are matched by gateway address. Gateways with no record start Up
/// at `now`.
pub fn restore(
    gateways: &[GatewayDescriptor],
    persisted: &[HealthRecord],
    now: u64,
) -> Vec<GatewayHealth> {
    gateways
        .iter()
        .map(|gw| {
            persisted
                .iter()
                .find(|r| r.address == gw.gateway_address)
                .map(|r| GatewayHealth {
                    status: r.status,
                    since: r.since,
                    consecutive_failed_probes: 0,
                })
                .unwrap_or_else(|| GatewayHealth::up(now))
        })
        .collect()
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
