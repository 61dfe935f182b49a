//! Remediation executor — applies a gateway switch to the host.
//!
//! With `perform_remediation` off, every step is logged as what it would
//! have done and nothing is executed. With it on, each step runs even when
//! an earlier one failed. Failures come back as
//! [`RemediationEvent::Failed`] for the caller to alert on.

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{error, info, warn};

use gatewatch_core::config::DaemonConfig;
use gatewatch_core::{GatewayDescriptor, GatewayKind};
use gatewatch_state::GatewayHealth;

use crate::error::CommandResult;
use crate::parse::Lease;
use crate::ports::Ports;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub perform_remediation: bool,
    pub link_settle: Duration,
    pub lease_renewal_unit: Duration,
}

impl From<&DaemonConfig> for ExecutorSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            perform_remediation: config.perform_remediation,
            link_settle: config.link_settle(),
            lease_renewal_unit: config.lease_renewal_unit(),
        }
    }
}

/// Something the executor did or failed to do that the caller must report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationEvent {
    /// A command failed. The sequence carried on regardless.
    Failed {
        action: &'static str,
        target: String,
        error: String,
    },
    /// An on-demand link came up with a different peer than recorded.
    PeerDiscovered {
        index: usize,
        old: Ipv4Addr,
        new: Ipv4Addr,
    },
    /// Renewal changed the lease's address, netmask or gateway.
    LeaseChanged { index: usize, old: Lease, new: Lease },
    /// A default route the lease manager installed for an inactive backup
    /// was removed.
    StrayRouteRemoved { index: usize, gateway: Ipv4Addr },
}

pub struct Executor {
    ports: Ports,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(ports: Ports, settings: ExecutorSettings) -> Self {
        Self { ports, settings }
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn is_live(&self) -> bool {
        self.settings.perform_remediation
    }

    /// Move the default route from gateway `from` to gateway `to`.
    ///
    /// On-demand targets are dialled first and re-addressed to the peer
    /// they come up with. The old gateway's tracked connections are flushed
    /// last.
    pub async fn switch(
        &self,
        gateways: &mut [GatewayDescriptor],
        from: Option<usize>,
        to: usize,
    ) -> Vec<RemediationEvent> {
        let mut events = Vec::new();
        let old_address = from
            .filter(|&f| f != to)
            .and_then(|f| gateways.get(f))
            .map(|gw| gw.gateway_address);
        let Some(target) = gateways.get_mut(to) else {
            warn!(index = to, "switch target out of range");
            return events;
        };

        match target.kind {
            GatewayKind::HostCheck => {
                warn!(gateway = %target.gateway_address, "host_check gateway cannot carry the default route");
                return events;
            }
            GatewayKind::OnDemand => self.dial(to, target, &mut events).await,
            _ => {}
        }

        let next_hop = target.gateway_address;
        if self.is_live() {
            info!(gateway = %next_hop, "replacing default route");
            let result = self.ports.router.replace_default(next_hop).await;
            note(&mut events, "replace default route", next_hop, result);
        } else {
            info!(dry_run = true, gateway = %next_hop, "would replace default route");
        }

        if let Some(old) = old_address {
            if self.is_live() {
                info!(gateway = %old, "flushing connection state of previous gateway");
                let result = self.ports.firewall.flush_state(old).await;
                note(&mut events, "flush connection state", old, result);
            } else {
                info!(dry_run = true, gateway = %old, "would flush connection state");
            }
        }

        events
    }

    /// Bring an on-demand link up and adopt its peer as the gateway address.
    async fn dial(
        &self,
        index: usize,
        target: &mut GatewayDescriptor,
        events: &mut Vec<RemediationEvent>,
    ) {
        let Some(interface) = target.interface.clone() else {
            warn!(gateway = %target.gateway_address, "on-demand gateway has no interface to dial");
            return;
        };
        if !self.is_live() {
            info!(dry_run = true, %interface, "would bring up on-demand link");
            return;
        }

        info!(%interface, "bringing up on-demand link");
        let result = self.ports.links.bring_up(&interface).await;
        note(events, "bring up link", &interface, result);
        tokio::time::sleep(self.settings.link_settle).await;

        match self.ports.links.peer_address(&interface).await {
            Ok(peer) if peer != target.gateway_address => {
                let old = target.rewrite_address(peer);
                info!(%interface, %old, new = %peer, "on-demand link has a new peer");
                events.push(RemediationEvent::PeerDiscovered {
                    index,
                    old,
                    new: peer,
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%interface, error = %e, "cannot read on-demand peer, keeping recorded gateway");
            }
        }
    }

    /// Per-cycle DHCP upkeep for every Up, interface-bound lease gateway.
    ///
    /// Renews leases close to expiry, reacts to a changed binding, and
    /// strips default routes the lease manager installs for an inactive
    /// backup.
    pub async fn maintain_leases(
        &self,
        gateways: &mut [GatewayDescriptor],
        health: &[GatewayHealth],
        active: Option<usize>,
    ) -> Vec<RemediationEvent> {
        let mut events = Vec::new();

        for index in 0..gateways.len() {
            let gw = &gateways[index];
            let up = health.get(index).is_some_and(|h| h.status.is_up());
            if !gw.kind.is_dhcp() || !up {
                continue;
            }
            let Some(interface) = gw.interface.clone() else {
                continue;
            };

            if let Some((old, new)) = self.refresh_lease(&interface, &mut events).await {
                self.adopt_lease(gateways, index, active, &old, &new, &mut events)
                    .await;
                events.push(RemediationEvent::LeaseChanged { index, old, new });
            }

            if gateways[index].kind == GatewayKind::DhcpLeaseBackup && active != Some(index) {
                self.clean_backup_routes(gateways, index, active, &mut events)
                    .await;
            }
        }

        events
    }

    /// Query the lease and renew it if it is about to run out.
    ///
    /// Returns `(before, after)` when renewal changed the binding.
    async fn refresh_lease(
        &self,
        interface: &str,
        events: &mut Vec<RemediationEvent>,
    ) -> Option<(Lease, Lease)> {
        let before = match self.ports.leases.query(interface).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(%interface, error = %e, "cannot read lease, skipping lease check this cycle");
                return None;
            }
        };
        if before.remaining > self.settings.lease_renewal_unit {
            return None;
        }

        if !self.is_live() {
            info!(dry_run = true, %interface, remaining_secs = before.remaining.as_secs(), "would renew lease");
            return None;
        }

        info!(%interface, remaining_secs = before.remaining.as_secs(), "renewing lease");
        let result = self.ports.leases.renew(interface).await;
        note(events, "renew lease", interface, result);

        let after = match self.ports.leases.query(interface).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(%interface, error = %e, "cannot read lease after renewal");
                return None;
            }
        };
        (!after.same_binding(&before)).then_some((before, after))
    }

    /// React to a changed lease binding.
    async fn adopt_lease(
        &self,
        gateways: &mut [GatewayDescriptor],
        index: usize,
        active: Option<usize>,
        old: &Lease,
        new: &Lease,
        events: &mut Vec<RemediationEvent>,
    ) {
        warn!(
            index,
            old_address = %old.address,
            new_address = %new.address,
            old_gateway = %old.gateway,
            new_gateway = %new.gateway,
            "lease binding changed"
        );

        let result = self.ports.firewall.flush_state(old.gateway).await;
        note(events, "flush connection state", old.gateway, result);

        if gateways[index].gateway_address != new.gateway {
            gateways[index].rewrite_address(new.gateway);
            if active == Some(index) {
                let result = self.ports.router.replace_default(new.gateway).await;
                note(events, "replace default route", new.gateway, result);
            }
        }
    }

    async fn clean_backup_routes(
        &self,
        gateways: &[GatewayDescriptor],
        index: usize,
        active: Option<usize>,
        events: &mut Vec<RemediationEvent>,
    ) {
        let backup = &gateways[index];
        let next_hops = match self.ports.router.default_routes().await {
            Ok(hops) => hops,
            Err(e) => {
                warn!(error = %e, "cannot read routing table, skipping backup route check");
                return;
            }
        };
        if !next_hops.contains(&backup.gateway_address) {
            return;
        }

        let gateway = backup.gateway_address;
        warn!(%gateway, "inactive backup gateway has a default route");
        if !self.is_live() {
            info!(dry_run = true, %gateway, routes = backup.routes.len(), "would remove backup routes");
            return;
        }

        if next_hops.len() > 1 {
            let result = self.ports.router.delete_route("default", gateway).await;
            note(events, "delete default route", gateway, result);
        } else if let Some(active_gw) = active.and_then(|a| gateways.get(a)) {
            // The backup's route replaced the active one outright.
            let result = self
                .ports
                .router
                .replace_default(active_gw.gateway_address)
                .await;
            note(events, "replace default route", active_gw.gateway_address, result);
        } else {
            warn!(%gateway, "no active gateway to take the default route, leaving backup route in place");
            return;
        }

        for network in &backup.routes {
            let result = self
                .ports
                .router
                .delete_route(&network.to_string(), gateway)
                .await;
            note(events, "delete route", network, result);
        }
        events.push(RemediationEvent::StrayRouteRemoved { index, gateway });
    }
}

fn note(
    events: &mut Vec<RemediationEvent>,
    action: &'static str,
    target: impl Display,
    result: CommandResult<()>,
) {
    if let Err(e) = result {
        error!(alert = true, action, %target, error = %e, "remediation command failed");
        events.push(RemediationEvent::Failed {
            action,
            target: target.to_string(),
            error: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::error::CommandError;
    use crate::ports::{Firewall, LeaseManager, LinkDialer, Router};

    /// Records every host mutation as a line of text.
    #[derive(Default)]
    struct FakeHost {
        log: Mutex<Vec<String>>,
        defaults: Mutex<Vec<Ipv4Addr>>,
        leases: Mutex<HashMap<String, Vec<Lease>>>,
        peer: Mutex<Option<Ipv4Addr>>,
        failing: Mutex<Vec<&'static str>>,
    }

    impl FakeHost {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn record(&self, op: &'static str, line: String) -> CommandResult<()> {
            self.log.lock().unwrap().push(line);
            if self.failing.lock().unwrap().contains(&op) {
                return Err(CommandError::Exit {
                    program: op.to_string(),
                    code: Some(1),
                    stderr: "refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Router for FakeHost {
        async fn default_routes(&self) -> CommandResult<Vec<Ipv4Addr>> {
            Ok(self.defaults.lock().unwrap().clone())
        }
        async fn replace_default(&self, gateway: Ipv4Addr) -> CommandResult<()> {
            self.record("replace", format!("replace default {gateway}"))
        }
        async fn delete_route(&self, network: &str, gateway: Ipv4Addr) -> CommandResult<()> {
            self.record("delete", format!("delete {network} {gateway}"))
        }
    }

    #[async_trait]
    impl Firewall for FakeHost {
        async fn flush_state(&self, address: Ipv4Addr) -> CommandResult<()> {
            self.record("flush", format!("flush {address}"))
        }
    }

    #[async_trait]
    impl LeaseManager for FakeHost {
        async fn query(&self, interface: &str) -> CommandResult<Lease> {
            let mut leases = self.leases.lock().unwrap();
            let queue = leases.get_mut(interface).ok_or(CommandError::Unparseable {
                what: "lease",
                output: String::new(),
            })?;
            // The last scripted lease sticks.
            if queue.len() > 1 {
                Ok(queue.remove(0))
            } else {
                Ok(queue[0].clone())
            }
        }
        async fn renew(&self, interface: &str) -> CommandResult<()> {
            self.record("renew", format!("renew {interface}"))
        }
    }

    #[async_trait]
    impl LinkDialer for FakeHost {
        async fn bring_up(&self, interface: &str) -> CommandResult<()> {
            self.record("dial", format!("dial {interface}"))
        }
        async fn peer_address(&self, _interface: &str) -> CommandResult<Ipv4Addr> {
            self.peer.lock().unwrap().ok_or(CommandError::Unparseable {
                what: "interface",
                output: String::new(),
            })
        }
    }

    fn executor(host: &Arc<FakeHost>, live: bool) -> Executor {
        let ports = Ports {
            router: host.clone(),
            firewall: host.clone(),
            leases: host.clone(),
            links: host.clone(),
        };
        Executor::new(
            ports,
            ExecutorSettings {
                perform_remediation: live,
                link_settle: Duration::ZERO,
                lease_renewal_unit: Duration::from_secs(3600),
            },
        )
    }

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    fn lease(gateway: Ipv4Addr, remaining_mins: u64) -> Lease {
        Lease {
            address: ip(198, 51, 100, 20),
            netmask: ip(255, 255, 255, 0),
            gateway,
            remaining: Duration::from_secs(remaining_mins * 60),
        }
    }

    fn dedicated_pair() -> Vec<GatewayDescriptor> {
        vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(198, 51, 100, 1), GatewayKind::Dedicated),
        ]
    }

    #[tokio::test]
    async fn switch_replaces_route_then_flushes_old() {
        let host = Arc::new(FakeHost::default());
        let mut gateways = dedicated_pair();

        let events = executor(&host, true).switch(&mut gateways, Some(0), 1).await;

        assert!(events.is_empty());
        assert_eq!(
            host.log(),
            vec!["replace default 198.51.100.1", "flush 192.0.2.1"]
        );
    }

    #[tokio::test]
    async fn switch_without_previous_gateway_skips_flush() {
        let host = Arc::new(FakeHost::default());
        let mut gateways = dedicated_pair();

        executor(&host, true).switch(&mut gateways, None, 0).await;

        assert_eq!(host.log(), vec!["replace default 192.0.2.1"]);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let host = Arc::new(FakeHost::default());
        let mut gateways = dedicated_pair();

        let events = executor(&host, false).switch(&mut gateways, Some(0), 1).await;

        assert!(events.is_empty());
        assert!(host.log().is_empty());
    }

    #[tokio::test]
    async fn failed_route_change_is_reported_and_sequence_continues() {
        let host = Arc::new(FakeHost::default());
        host.failing.lock().unwrap().push("replace");
        let mut gateways = dedicated_pair();

        let events = executor(&host, true).switch(&mut gateways, Some(0), 1).await;

        assert_eq!(host.log().len(), 2);
        assert!(matches!(
            &events[..],
            [RemediationEvent::Failed { action: "replace default route", .. }]
        ));
    }

    #[tokio::test]
    async fn host_check_is_never_routed() {
        let host = Arc::new(FakeHost::default());
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(203, 0, 113, 9), GatewayKind::HostCheck),
        ];

        executor(&host, true).switch(&mut gateways, Some(0), 1).await;

        assert!(host.log().is_empty());
    }

    #[tokio::test]
    async fn on_demand_adopts_discovered_peer() {
        let host = Arc::new(FakeHost::default());
        *host.peer.lock().unwrap() = Some(ip(100, 64, 0, 1));
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(10, 255, 255, 1), GatewayKind::OnDemand).with_interface("ppp0"),
        ];

        let events = executor(&host, true).switch(&mut gateways, Some(0), 1).await;

        assert_eq!(
            host.log(),
            vec!["dial ppp0", "replace default 100.64.0.1", "flush 192.0.2.1"]
        );
        assert_eq!(gateways[1].gateway_address, ip(100, 64, 0, 1));
        assert_eq!(gateways[1].probe_address, ip(100, 64, 0, 1));
        assert_eq!(
            events,
            vec![RemediationEvent::PeerDiscovered {
                index: 1,
                old: ip(10, 255, 255, 1),
                new: ip(100, 64, 0, 1),
            }]
        );
    }

    #[tokio::test]
    async fn on_demand_without_peer_keeps_recorded_gateway() {
        let host = Arc::new(FakeHost::default());
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(10, 255, 255, 1), GatewayKind::OnDemand).with_interface("ppp0"),
        ];

        executor(&host, true).switch(&mut gateways, None, 0).await;

        assert_eq!(host.log(), vec!["dial ppp0", "replace default 10.255.255.1"]);
    }

    #[tokio::test]
    async fn fresh_lease_is_left_alone() {
        let host = Arc::new(FakeHost::default());
        host.leases
            .lock()
            .unwrap()
            .insert("eth1".into(), vec![lease(ip(198, 51, 100, 1), 180)]);
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(198, 51, 100, 1), GatewayKind::DhcpLeasePrimary).with_interface("eth1"),
        ];
        let health = vec![GatewayHealth::up(0)];

        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, Some(0))
            .await;

        assert!(events.is_empty());
        assert!(host.log().is_empty());
    }

    #[tokio::test]
    async fn expiring_lease_is_renewed() {
        let host = Arc::new(FakeHost::default());
        host.leases.lock().unwrap().insert(
            "eth1".into(),
            vec![lease(ip(198, 51, 100, 1), 50), lease(ip(198, 51, 100, 1), 240)],
        );
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(198, 51, 100, 1), GatewayKind::DhcpLeasePrimary).with_interface("eth1"),
        ];
        let health = vec![GatewayHealth::up(0)];

        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, Some(0))
            .await;

        assert!(events.is_empty());
        assert_eq!(host.log(), vec!["renew eth1"]);
    }

    #[tokio::test]
    async fn changed_lease_flushes_and_moves_active_route() {
        let host = Arc::new(FakeHost::default());
        host.leases.lock().unwrap().insert(
            "eth1".into(),
            vec![lease(ip(198, 51, 100, 1), 30), lease(ip(198, 51, 100, 254), 240)],
        );
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(198, 51, 100, 1), GatewayKind::DhcpLeasePrimary).with_interface("eth1"),
        ];
        let health = vec![GatewayHealth::up(0)];

        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, Some(0))
            .await;

        assert_eq!(
            host.log(),
            vec!["renew eth1", "flush 198.51.100.1", "replace default 198.51.100.254"]
        );
        assert_eq!(gateways[0].gateway_address, ip(198, 51, 100, 254));
        assert!(matches!(events[..], [RemediationEvent::LeaseChanged { index: 0, .. }]));
    }

    #[tokio::test]
    async fn down_or_unbound_dhcp_gateways_are_skipped() {
        let host = Arc::new(FakeHost::default());
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(198, 51, 100, 1), GatewayKind::DhcpLeasePrimary).with_interface("eth1"),
            GatewayDescriptor::new(1, ip(198, 51, 100, 2), GatewayKind::DhcpLeasePrimary),
        ];
        let health = vec![GatewayHealth::down(0, 5), GatewayHealth::up(0)];

        // No scripted leases: any query would surface as a warning, not a log line.
        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, None)
            .await;

        assert!(events.is_empty());
        assert!(host.log().is_empty());
    }

    #[tokio::test]
    async fn inactive_backup_loses_stray_default_route() {
        let host = Arc::new(FakeHost::default());
        *host.defaults.lock().unwrap() = vec![ip(192, 0, 2, 1), ip(198, 51, 100, 1)];
        host.leases
            .lock()
            .unwrap()
            .insert("eth1".into(), vec![lease(ip(198, 51, 100, 1), 600)]);
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(198, 51, 100, 1), GatewayKind::DhcpLeaseBackup)
                .with_interface("eth1")
                .with_routes(vec!["10.0.0.0/8".parse().unwrap()]),
        ];
        let health = vec![GatewayHealth::up(0), GatewayHealth::up(0)];

        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, Some(0))
            .await;

        assert_eq!(
            host.log(),
            vec!["delete default 198.51.100.1", "delete 10.0.0.0/8 198.51.100.1"]
        );
        assert_eq!(
            events,
            vec![RemediationEvent::StrayRouteRemoved {
                index: 1,
                gateway: ip(198, 51, 100, 1)
            }]
        );
    }

    #[tokio::test]
    async fn sole_backup_default_is_replaced_by_active() {
        let host = Arc::new(FakeHost::default());
        *host.defaults.lock().unwrap() = vec![ip(198, 51, 100, 1)];
        host.leases
            .lock()
            .unwrap()
            .insert("eth1".into(), vec![lease(ip(198, 51, 100, 1), 600)]);
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(198, 51, 100, 1), GatewayKind::DhcpLeaseBackup).with_interface("eth1"),
        ];
        let health = vec![GatewayHealth::up(0), GatewayHealth::up(0)];

        executor(&host, true)
            .maintain_leases(&mut gateways, &health, Some(0))
            .await;

        assert_eq!(host.log(), vec!["replace default 192.0.2.1"]);
    }

    #[tokio::test]
    async fn sole_backup_default_stays_without_active_gateway() {
        let host = Arc::new(FakeHost::default());
        *host.defaults.lock().unwrap() = vec![ip(198, 51, 100, 1)];
        host.leases
            .lock()
            .unwrap()
            .insert("eth1".into(), vec![lease(ip(198, 51, 100, 1), 600)]);
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(198, 51, 100, 1), GatewayKind::DhcpLeaseBackup)
                .with_interface("eth1")
                .with_routes(vec!["10.0.0.0/8".parse().unwrap()]),
        ];
        let health = vec![GatewayHealth::down(0, 5), GatewayHealth::up(0)];

        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, None)
            .await;

        assert!(events.is_empty());
        assert!(host.log().is_empty());
    }

    #[tokio::test]
    async fn active_backup_keeps_its_route() {
        let host = Arc::new(FakeHost::default());
        *host.defaults.lock().unwrap() = vec![ip(198, 51, 100, 1)];
        host.leases
            .lock()
            .unwrap()
            .insert("eth1".into(), vec![lease(ip(198, 51, 100, 1), 600)]);
        let mut gateways = vec![
            GatewayDescriptor::new(0, ip(192, 0, 2, 1), GatewayKind::Dedicated),
            GatewayDescriptor::new(1, ip(198, 51, 100, 1), GatewayKind::DhcpLeaseBackup).with_interface("eth1"),
        ];
        let health = vec![GatewayHealth::down(0, 5), GatewayHealth::up(0)];

        let events = executor(&host, true)
            .maintain_leases(&mut gateways, &health, Some(1))
            .await;

        assert!(events.is_empty());
        assert!(host.log().is_empty());
    }
}
