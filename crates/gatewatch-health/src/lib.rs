//! gatewatch-health — reachability probing with retry hysteresis.
//!
//! # Architecture
//!
//! ```text
//! probe_round()
//!   ├── phase 1: one probe per gateway (idle on-demand links skipped)
//!   └── phase 2: retry only the gateways that failed phase 1
//!         └── AttemptTracker per gateway → ProbeVerdict
//! ```
//!
//! Probing is sequential. Worst-case round latency is
//! `timeout × gateways + retry_timeout × initially_down × max_retries`.

pub mod checker;
pub mod round;

pub use checker::{AttemptTracker, PingProber, ProbeResult, Prober, TcpProber};
pub use round::{probe_round, RoundSettings};
