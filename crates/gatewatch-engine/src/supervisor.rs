//! Supervisor — owns the daemon's state and drives one cycle at a time.
//!
//! A cycle is: probe every gateway, fold the verdicts into the health
//! vector, persist it, report transitions, decide, then remediate.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use gatewatch_core::{GatewatchConfig, GatewayDescriptor};
use gatewatch_health::{probe_round, Prober, RoundSettings};
use gatewatch_remedy::{Executor, Pager, RemediationEvent};
use gatewatch_state::{self as state, GatewayHealth, Reconciliation, SnapshotStore};

use crate::decision::{decide, Decision};
use crate::escalation::Escalation;

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub failover_delay: Duration,
    pub round: RoundSettings,
}

impl From<&GatewatchConfig> for SupervisorSettings {
    fn from(config: &GatewatchConfig) -> Self {
        Self {
            failover_delay: Duration::from_secs(config.daemon.failover_delay_secs),
            round: RoundSettings::from(&config.probe),
        }
    }
}

pub struct Supervisor {
    gateways: Vec<GatewayDescriptor>,
    health: Vec<GatewayHealth>,
    active: Option<usize>,
    store: SnapshotStore,
    escalation: Escalation,
    prober: Arc<dyn Prober>,
    executor: Executor,
    pager: Arc<dyn Pager>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(
        gateways: Vec<GatewayDescriptor>,
        store: SnapshotStore,
        prober: Arc<dyn Prober>,
        executor: Executor,
        pager: Arc<dyn Pager>,
        settings: SupervisorSettings,
    ) -> Self {
        let count = gateways.len();
        Self {
            gateways,
            health: vec![GatewayHealth::up(state::epoch_secs()); count],
            active: None,
            store,
            escalation: Escalation::new(count),
            prober,
            executor,
            pager,
            settings,
        }
    }

    pub fn gateways(&self) -> &[GatewayDescriptor] {
        &self.gateways
    }

    pub fn health(&self) -> &[GatewayHealth] {
        &self.health
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Restore health from the snapshot and find the gateway that owns the
    /// default route.
    pub async fn start(&mut self, now: u64) {
        let persisted = match self.store.load() {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.store.path().display(), error = %e, "cannot read state snapshot, starting fresh");
                Vec::new()
            }
        };
        self.health = state::restore(&self.gateways, &persisted, now);
        self.escalation.prime(&self.health, now);
        info!(
            gateways = self.gateways.len(),
            restored = persisted.len(),
            "health restored"
        );

        self.active = self.seed_active().await;
    }

    async fn seed_active(&self) -> Option<usize> {
        let next_hops = match self.executor.ports().router.default_routes().await {
            Ok(hops) => hops,
            Err(e) => {
                warn!(error = %e, "cannot read routing table");
                Vec::new()
            }
        };

        let found = next_hops.iter().find_map(|hop| {
            self.gateways
                .iter()
                .position(|gw| gw.kind.is_routable() && gw.gateway_address == *hop)
        });
        match found {
            Some(index) => {
                info!(index, gateway = %self.gateways[index].gateway_address, "active gateway found");
            }
            None => {
                error!(alert = true, routes = ?next_hops, "default route matches no configured gateway");
                let body = format!("default route next hops: {next_hops:?}\n");
                self.page("current gateway unknown", body).await;
            }
        }
        found
    }

    /// Run one full cycle and return the decision taken.
    pub async fn run_cycle(&mut self, now: u64) -> Decision {
        let verdicts = probe_round(
            self.prober.as_ref(),
            &self.gateways,
            &self.health,
            self.active,
            &self.settings.round,
        )
        .await;
        let rec = state::reconcile(&mut self.health, &verdicts, now);

        if self
            .store
            .needs_write(rec.transitions.len(), self.gateways.len())
        {
            self.persist();
        }
        self.report_health(&rec, now).await;

        let decision = decide(
            &self.gateways,
            &self.health,
            self.active,
            now,
            self.settings.failover_delay,
        );
        self.act(decision, now).await;

        let events = self
            .executor
            .maintain_leases(&mut self.gateways, &self.health, self.active)
            .await;
        self.report_events(events).await;

        decision
    }

    async fn report_health(&mut self, rec: &Reconciliation, now: u64) {
        for t in &rec.transitions {
            let gw = &self.gateways[t.index];
            let address = gw.gateway_address;
            if t.is_recovery() {
                warn!(
                    alert = true,
                    index = t.index,
                    gateway = %address,
                    down_minutes = t.down_minutes,
                    failed_probes = t.failed_probes,
                    "gateway recovered"
                );
                if self.escalation.recovered(t.index, t.down_minutes) {
                    let subject = format!(
                        "{address} recovered after {} minutes ({} failed probes)",
                        t.down_minutes, t.failed_probes
                    );
                    self.page(&subject, self.status_body(now)).await;
                }
            } else {
                error!(
                    alert = true,
                    index = t.index,
                    gateway = %address,
                    kind = %gw.kind,
                    failed_probes = t.failed_probes,
                    "gateway down"
                );
                if self.escalation.went_down(t.index) {
                    self.page(&format!("{address} down"), self.status_body(now))
                        .await;
                }
            }
        }

        for &(index, minutes) in &rec.still_down {
            if self.escalation.still_down(index, minutes) {
                let address = self.gateways[index].gateway_address;
                warn!(alert = true, index, gateway = %address, minutes, "gateway still down");
                let subject = format!("{address} down for {minutes} minutes");
                self.page(&subject, self.status_body(now)).await;
            }
        }
    }

    async fn act(&mut self, decision: Decision, now: u64) {
        let (from, to) = match decision {
            Decision::NoChange => {
                debug!(active = ?self.active, "no route change");
                return;
            }
            Decision::AllDown => {
                error!(alert = true, "all gateways down");
                return;
            }
            Decision::FailOver { from, to } => (from, to),
            Decision::FailBack { from, to } => (Some(from), to),
            Decision::PrimaryConfirmed { index } => (Some(index), index),
        };

        let subject = match from.map(|f| self.gateways[f].gateway_address) {
            Some(old) if Some(to) != from => {
                format!("{decision}: {old} -> {}", self.gateways[to].gateway_address)
            }
            _ => format!("{decision}: {}", self.gateways[to].gateway_address),
        };
        warn!(alert = true, %decision, to = %self.gateways[to].gateway_address, "switching default route");

        let events = self.executor.switch(&mut self.gateways, from, to).await;
        self.active = Some(to);
        self.page(&subject, self.status_body(now)).await;
        self.report_events(events).await;
    }

    async fn report_events(&mut self, events: Vec<RemediationEvent>) {
        let mut readdressed = false;
        for event in events {
            match event {
                RemediationEvent::Failed {
                    action,
                    target,
                    error,
                } => {
                    let subject = format!("remediation failed: {action} {target}");
                    self.page(&subject, format!("{error}\n")).await;
                }
                RemediationEvent::PeerDiscovered { index, old, new } => {
                    info!(index, %old, %new, "gateway re-addressed to on-demand peer");
                    readdressed = true;
                }
                RemediationEvent::LeaseChanged { index, old, new } => {
                    readdressed |= old.gateway != new.gateway;
                    let subject = format!("lease changed on {}", self.gateways[index]);
                    let body = format!(
                        "old: {} / {} via {}\nnew: {} / {} via {}\n",
                        old.address, old.netmask, old.gateway, new.address, new.netmask, new.gateway
                    );
                    self.page(&subject, body).await;
                }
                RemediationEvent::StrayRouteRemoved { index, gateway } => {
                    warn!(index, %gateway, "stray backup route removed");
                }
            }
        }

        // The snapshot is keyed by address.
        if readdressed {
            self.persist();
        }
    }

    fn persist(&mut self) {
        let records = state::records(&self.gateways, &self.health);
        if let Err(e) = self.store.save(&records) {
            error!(alert = true, path = %self.store.path().display(), error = %e, "cannot write state snapshot");
        }
    }

    async fn page(&self, subject: &str, body: String) {
        if let Err(e) = self.pager.page(subject, &body).await {
            warn!(%subject, error = %e, "page not delivered");
        }
    }

    /// One line per gateway, for page bodies.
    fn status_body(&self, now: u64) -> String {
        let mut body = String::new();
        for (i, (gw, h)) in self.gateways.iter().zip(&self.health).enumerate() {
            let marker = if Some(i) == self.active { "*" } else { " " };
            let _ = writeln!(
                body,
                "{marker} {gw} {} for {} minutes",
                h.status,
                h.minutes_in_status(now)
            );
        }
        body
    }
}
