//! Fold a cycle's probe verdicts into the live health vector.

use tracing::debug;

use crate::types::{GatewayHealth, HealthStatus, ProbeVerdict};

/// A status change observed this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub index: usize,
    pub from: HealthStatus,
    pub to: HealthStatus,
    /// Length of the outage that just ended (Down -> Up), else 0.
    pub down_minutes: u64,
    /// Down -> Up: failed probes accumulated over the outage.
    /// Up -> Down: failed probes this cycle.
    pub failed_probes: u32,
}

impl Transition {
    pub fn is_recovery(&self) -> bool {
        self.from == HealthStatus::Down && self.to == HealthStatus::Up
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub transitions: Vec<Transition>,
    /// Gateways that were Down before and still are: `(index, minutes down)`.
    pub still_down: Vec<(usize, u64)>,
}

/// Apply `verdicts` to `health` at time `now`.
///
/// `since` moves only on a status change. The failure counter follows the
/// verdict, except that a recovery reports the count it is resetting.
pub fn reconcile(health: &mut [GatewayHealth], verdicts: &[ProbeVerdict], now: u64) -> Reconciliation {
    let mut out = Reconciliation::default();

    for (index, (current, verdict)) in health.iter_mut().zip(verdicts).enumerate() {
        if current.status == verdict.status {
            current.consecutive_failed_probes = verdict.consecutive_failed_probes;
            if current.status == HealthStatus::Down {
                out.still_down.push((index, current.minutes_in_status(now)));
            }
            continue;
        }

        let transition = match verdict.status {
            HealthStatus::Up => Transition {
                index,
                from: HealthStatus::Down,
                to: HealthStatus::Up,
                down_minutes: current.minutes_in_status(now),
                failed_probes: current.consecutive_failed_probes,
            },
            HealthStatus::Down => Transition {
                index,
                from: HealthStatus::Up,
                to: HealthStatus::Down,
                down_minutes: 0,
                failed_probes: verdict.consecutive_failed_probes,
            },
        };
        debug!(index, from = %transition.from, to = %transition.to, "gateway status changed");

        *current = GatewayHealth {
            status: verdict.status,
            since: now,
            consecutive_failed_probes: verdict.consecutive_failed_probes,
        };
        out.transitions.push(transition);
    }

    out
}
