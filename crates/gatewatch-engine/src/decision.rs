//! Failover decision — which gateway should carry the default route.
//!
//! [`decide`] is a pure function of the descriptors, the reconciled health
//! vector and the active pointer. The supervisor acts on its result.

use std::fmt;
use std::time::Duration;

use gatewatch_core::{GatewayDescriptor, GatewayKind};
use gatewatch_state::GatewayHealth;

/// Outcome of one decision pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the current default route.
    NoChange,
    /// Move to a lower-priority gateway. `from` is `None` when no gateway
    /// was known to be active.
    FailOver { from: Option<usize>, to: usize },
    /// Move back to a higher-priority gateway.
    FailBack { from: usize, to: usize },
    /// The scan landed on the gateway already recorded as active.
    PrimaryConfirmed { index: usize },
    /// No gateway can take the default route.
    AllDown,
}

impl Decision {
    /// Gateway the default route should move to, if any.
    pub fn target(&self) -> Option<usize> {
        match *self {
            Decision::FailOver { to, .. } | Decision::FailBack { to, .. } => Some(to),
            Decision::PrimaryConfirmed { index } => Some(index),
            Decision::NoChange | Decision::AllDown => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::NoChange => f.write_str("no change"),
            Decision::FailOver { from: Some(from), to } => write!(f, "fail-over {from} -> {to}"),
            Decision::FailOver { from: None, to } => write!(f, "fail-over ? -> {to}"),
            Decision::FailBack { from, to } => write!(f, "fail-back {from} -> {to}"),
            Decision::PrimaryConfirmed { index } => write!(f, "primary confirmed at {index}"),
            Decision::AllDown => f.write_str("all gateways down"),
        }
    }
}

/// Decide the route for this cycle.
///
/// A switch is considered when the active gateway has been Down for at
/// least `failover_delay`, or whenever the active gateway is not the
/// primary. The scan then takes the highest-priority routable gateway that
/// is Up, stopping early if that is the active one.
pub fn decide(
    gateways: &[GatewayDescriptor],
    health: &[GatewayHealth],
    active: Option<usize>,
    now: u64,
    failover_delay: Duration,
) -> Decision {
    let active = active.filter(|&a| a < gateways.len() && a < health.len());
    let active_up = active.is_some_and(|a| health[a].status.is_up());

    let delay_elapsed = active.is_some_and(|a| {
        !health[a].status.is_up() && health[a].seconds_in_status(now) >= failover_delay.as_secs()
    });
    let triggered = delay_elapsed || active != Some(0);

    if triggered {
        for (i, (gw, h)) in gateways.iter().zip(health).enumerate() {
            if Some(i) == active && h.status.is_up() {
                return Decision::NoChange;
            }
            if !h.status.is_up() || gw.kind == GatewayKind::HostCheck {
                continue;
            }
            return match active {
                None => Decision::FailOver { from: None, to: i },
                Some(c) if i > c => Decision::FailOver { from: Some(c), to: i },
                Some(c) if i < c => Decision::FailBack { from: c, to: i },
                Some(_) => Decision::PrimaryConfirmed { index: i },
            };
        }
    }

    let any_candidate_up = gateways
        .iter()
        .zip(health)
        .any(|(gw, h)| h.status.is_up() && gw.kind.is_routable());
    if gateways.len() > 1 && !active_up && !any_candidate_up {
        return Decision::AllDown;
    }

    Decision::NoChange
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use gatewatch_core::GatewayKind::{Dedicated, HostCheck, OnDemand};

    const NOW: u64 = 1_700_000_000;
    const DELAY: Duration = Duration::from_secs(120);

    fn gateways(kinds: &[GatewayKind]) -> Vec<GatewayDescriptor> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| GatewayDescriptor::new(i, Ipv4Addr::new(192, 0, 2, i as u8 + 1), kind))
            .collect()
    }

    fn up() -> GatewayHealth {
        GatewayHealth::up(NOW - 3600)
    }

    fn down_for(secs: u64) -> GatewayHealth {
        GatewayHealth::down(NOW - secs, 5)
    }

    #[test]
    fn primary_up_and_active_is_no_change() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let d = decide(&gws, &[up(), up()], Some(0), NOW, DELAY);
        assert_eq!(d, Decision::NoChange);
    }

    #[test]
    fn fails_over_past_host_check_after_delay() {
        let gws = gateways(&[Dedicated, Dedicated, HostCheck]);
        let health = [down_for(120), up(), up()];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::FailOver { from: Some(0), to: 1 });
    }

    #[test]
    fn host_check_is_never_a_target() {
        let gws = gateways(&[Dedicated, HostCheck, Dedicated]);
        let health = [down_for(600), up(), up()];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::FailOver { from: Some(0), to: 2 });
    }

    #[test]
    fn no_fail_over_within_delay() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let health = [down_for(60), up()];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::NoChange);
    }

    #[test]
    fn fails_back_to_recovered_primary() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let health = [GatewayHealth::up(NOW), up()];
        let d = decide(&gws, &health, Some(1), NOW, DELAY);
        assert_eq!(d, Decision::FailBack { from: 1, to: 0 });
    }

    #[test]
    fn healthy_backup_stays_while_primary_down() {
        let gws = gateways(&[Dedicated, Dedicated, OnDemand]);
        let health = [down_for(900), up(), up()];
        let d = decide(&gws, &health, Some(1), NOW, DELAY);
        assert_eq!(d, Decision::NoChange);
    }

    #[test]
    fn unknown_active_fails_over_to_first_up() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let health = [down_for(10), up()];
        let d = decide(&gws, &health, None, NOW, DELAY);
        assert_eq!(d, Decision::FailOver { from: None, to: 1 });
    }

    #[test]
    fn unknown_active_with_primary_up_fails_over_to_primary() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let d = decide(&gws, &[up(), up()], None, NOW, DELAY);
        assert_eq!(d, Decision::FailOver { from: None, to: 0 });
    }

    #[test]
    fn all_down_with_two_gateways() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let health = [down_for(600), down_for(600)];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::AllDown);
    }

    #[test]
    fn single_gateway_is_never_all_down() {
        let gws = gateways(&[Dedicated]);
        let d = decide(&gws, &[down_for(600)], Some(0), NOW, DELAY);
        assert_eq!(d, Decision::NoChange);
    }

    #[test]
    fn all_down_inside_delay_when_nothing_else_is_up() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let health = [down_for(30), down_for(600)];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::AllDown);
    }

    #[test]
    fn not_all_down_inside_delay_when_alternative_is_up() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let health = [down_for(30), up()];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::NoChange);
    }

    #[test]
    fn up_host_check_does_not_prevent_all_down() {
        let gws = gateways(&[Dedicated, Dedicated, HostCheck]);
        let health = [down_for(600), down_for(600), up()];
        let d = decide(&gws, &health, Some(0), NOW, DELAY);
        assert_eq!(d, Decision::AllDown);
    }

    #[test]
    fn out_of_range_active_is_treated_as_unknown() {
        let gws = gateways(&[Dedicated, Dedicated]);
        let d = decide(&gws, &[up(), up()], Some(7), NOW, DELAY);
        assert_eq!(d, Decision::FailOver { from: None, to: 0 });
    }

    #[test]
    fn target_of_each_decision() {
        assert_eq!(Decision::NoChange.target(), None);
        assert_eq!(Decision::AllDown.target(), None);
        assert_eq!(Decision::FailOver { from: None, to: 2 }.target(), Some(2));
        assert_eq!(Decision::FailBack { from: 2, to: 0 }.target(), Some(0));
        assert_eq!(Decision::PrimaryConfirmed { index: 0 }.target(), Some(0));
    }
}
