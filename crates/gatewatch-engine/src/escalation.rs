//! Page escalation for gateways that stay Down.
//!
//! A gateway going Down pages at once. While it stays Down it pages again
//! each time its outage crosses a 15-minute boundary, up to one hour.
//! Recoveries page only after a long outage.

use gatewatch_state::GatewayHealth;

/// Minutes between repeat pages for one outage.
pub const STEP_MINUTES: u64 = 15;

/// Outage length after which repeat pages stop.
pub const LIMIT_MINUTES: u64 = 60;

/// Tracks which escalation step each gateway has already paged for.
#[derive(Debug, Clone, Default)]
pub struct Escalation {
    paged: Vec<Option<u64>>,
}

fn step(minutes: u64) -> u64 {
    minutes.min(LIMIT_MINUTES) / STEP_MINUTES
}

impl Escalation {
    pub fn new(gateway_count: usize) -> Self {
        Self {
            paged: vec![None; gateway_count],
        }
    }

    /// Mark steps already covered by an outage that began before a restart.
    pub fn prime(&mut self, health: &[GatewayHealth], now: u64) {
        self.paged = health
            .iter()
            .map(|h| (!h.status.is_up()).then(|| step(h.minutes_in_status(now))))
            .collect();
    }

    /// Gateway `index` just went Down. Always pages.
    pub fn went_down(&mut self, index: usize) -> bool {
        self.set(index, Some(0));
        true
    }

    /// Gateway `index` has been Down for `minutes`. Pages when a new step
    /// was reached.
    pub fn still_down(&mut self, index: usize, minutes: u64) -> bool {
        let reached = step(minutes);
        let paged = self.paged.get(index).copied().flatten();
        if paged.is_some_and(|p| p >= reached) {
            return false;
        }
        self.set(index, Some(reached));
        true
    }

    /// Gateway `index` came back after `minutes`. Pages for outages longer
    /// than one step.
    pub fn recovered(&mut self, index: usize, minutes: u64) -> bool {
        self.set(index, None);
        minutes > STEP_MINUTES
    }

    fn set(&mut self, index: usize, value: Option<u64>) {
        if index >= self.paged.len() {
            self.paged.resize(index + 1, None);
        }
        self.paged[index] = value;
    }
}
