//! Reachability probe logic.
//!
//! A [`Prober`] sends one probe to an address. The [`AttemptTracker`] counts
//! attempts for one gateway within a round and turns them into a verdict.

use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use gatewatch_core::template;
use gatewatch_state::{HealthStatus, ProbeVerdict};

/// Result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The address answered.
    Reachable,
    /// No answer within the timeout.
    Unreachable,
    /// The probe could not be executed at all.
    Failed,
}

impl ProbeResult {
    pub fn is_success(self) -> bool {
        self == ProbeResult::Reachable
    }
}

/// Sends one reachability probe.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> ProbeResult;
}

/// ICMP echo through the system `ping` command.
///
/// Exit status 0 means the address answered.
pub struct PingProber {
    template: String,
}

impl PingProber {
    /// `template` supports `{address}` and `{timeout}` (whole seconds).
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> ProbeResult {
        let addr = address.to_string();
        let secs = timeout.as_secs().max(1).to_string();
        let argv = template::render(&self.template, &[("address", &addr), ("timeout", &secs)]);
        let Some((program, args)) = argv.split_first() else {
            return ProbeResult::Failed;
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        // ping enforces its own deadline; the grace second covers process startup.
        match tokio::time::timeout(timeout + Duration::from_secs(1), child).await {
            Ok(Ok(status)) if status.success() => ProbeResult::Reachable,
            Ok(Ok(status)) => {
                debug!(%address, code = ?status.code(), "ping got no reply");
                ProbeResult::Unreachable
            }
            Ok(Err(e)) => {
                debug!(%address, error = %e, %program, "failed to run ping");
                ProbeResult::Failed
            }
            Err(_) => {
                debug!(%address, "ping timed out");
                ProbeResult::Unreachable
            }
        }
    }
}

/// TCP connect probe.
///
/// A refused connection still proves the host is reachable.
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> ProbeResult {
        let target = SocketAddr::from((address, self.port));
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(target)).await {
            Ok(Ok(_)) => ProbeResult::Reachable,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                ProbeResult::Reachable
            }
            Ok(Err(e)) => {
                debug!(%target, error = %e, "tcp probe failed");
                ProbeResult::Unreachable
            }
            Err(_) => {
                debug!(%target, "tcp probe timed out");
                ProbeResult::Unreachable
            }
        }
    }
}

/// Tracks the attempts made for one gateway within one probe round.
#[derive(Debug)]
pub struct AttemptTracker {
    status: HealthStatus,
    attempts: u32,
    max_attempts: u32,
    /// Failures carried over from earlier cycles of the same outage.
    prior_failures: u32,
}

impl AttemptTracker {
    /// `prior_failures` is the count from earlier cycles; pass 0 if the
    /// gateway was Up.
    pub fn new(max_attempts: u32, prior_failures: u32) -> Self {
        Self {
            status: HealthStatus::Up,
            attempts: 0,
            max_attempts,
            prior_failures,
        }
    }

    /// Record a probe result and return the provisional status.
    ///
    /// Any success is final. A failure leaves the gateway Down until a
    /// later attempt succeeds.
    pub fn record(&mut self, result: ProbeResult) -> HealthStatus {
        self.attempts += 1;
        self.status = if result.is_success() {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        self.status
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is both needed and allowed.
    pub fn wants_retry(&self) -> bool {
        self.status == HealthStatus::Down && self.attempts < self.max_attempts
    }

    pub fn verdict(&self) -> ProbeVerdict {
        match self.status {
            HealthStatus::Up => ProbeVerdict {
                status: HealthStatus::Up,
                attempts: self.attempts,
                consecutive_failed_probes: 0,
            },
            HealthStatus::Down => ProbeVerdict {
                status: HealthStatus::Down,
                attempts: self.attempts,
                consecutive_failed_probes: self.prior_failures + self.attempts,
            },
        }
    }
}
