//! One probe round over every configured gateway.
//!
//! Phase 1 probes each gateway once. Phase 2 then retries only the
//! gateways that failed, in priority order. This keeps a single bad
//! gateway from delaying the first probe of the others.

use std::time::Duration;

use tracing::{debug, info, warn};

use gatewatch_core::config::ProbeConfig;
use gatewatch_core::{GatewayDescriptor, GatewayKind};
use gatewatch_state::{GatewayHealth, HealthStatus, ProbeVerdict};

use crate::checker::{AttemptTracker, Prober};

/// Probe timing and retry limits for a round.
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub timeout: Duration,
    pub retry_timeout: Duration,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Attempts numbered at or above this are logged individually.
    pub notify_threshold: u32,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self::from(&ProbeConfig::default())
    }
}

impl From<&ProbeConfig> for RoundSettings {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry_timeout: config.retry_timeout(),
            max_retries: config.max_retries,
            notify_threshold: config.notify_threshold,
        }
    }
}

/// Probe every gateway and return one verdict per gateway, in order.
pub async fn probe_round(
    prober: &dyn Prober,
    gateways: &[GatewayDescriptor],
    health: &[GatewayHealth],
    active: Option<usize>,
    settings: &RoundSettings,
) -> Vec<ProbeVerdict> {
    let max_attempts = settings.max_retries + 1;
    let mut trackers: Vec<Option<AttemptTracker>> = Vec::with_capacity(gateways.len());

    // Phase 1: first probe.
    for (index, (gw, previous)) in gateways.iter().zip(health).enumerate() {
        if is_idle_on_demand(gw, previous, index, active) {
            debug!(gateway = %gw.gateway_address, "on-demand link idle, assuming up");
            trackers.push(None);
            continue;
        }

        let prior = match previous.status {
            HealthStatus::Down => previous.consecutive_failed_probes,
            HealthStatus::Up => 0,
        };
        let mut tracker = AttemptTracker::new(max_attempts, prior);
        let result = prober.probe(gw.probe_address, settings.timeout).await;
        if tracker.record(result) == HealthStatus::Down {
            debug!(gateway = %gw.gateway_address, probe = %gw.probe_address, ?result, "first probe failed");
        }
        trackers.push(Some(tracker));
    }

    // Phase 2: retry the failures.
    for (gw, slot) in gateways.iter().zip(trackers.iter_mut()) {
        let Some(tracker) = slot else { continue };
        while tracker.wants_retry() {
            let result = prober.probe(gw.probe_address, settings.retry_timeout).await;
            let status = tracker.record(result);
            let attempt = tracker.attempts();
            if attempt < settings.notify_threshold {
                continue;
            }
            match status {
                HealthStatus::Up => info!(
                    gateway = %gw.gateway_address,
                    probe = %gw.probe_address,
                    attempt,
                    "probe succeeded on retry"
                ),
                HealthStatus::Down => warn!(
                    gateway = %gw.gateway_address,
                    probe = %gw.probe_address,
                    attempt,
                    max = max_attempts,
                    ?result,
                    "probe retry failed"
                ),
            }
        }
    }

    trackers
        .iter()
        .map(|slot| match slot {
            Some(tracker) => tracker.verdict(),
            None => ProbeVerdict::assumed_up(),
        })
        .collect()
}

/// Idle on-demand links are not dialled just to probe them.
fn is_idle_on_demand(
    gw: &GatewayDescriptor,
    previous: &GatewayHealth,
    index: usize,
    active: Option<usize>,
) -> bool {
    gw.kind == GatewayKind::OnDemand && active != Some(index) && previous.status == HealthStatus::Up
}
