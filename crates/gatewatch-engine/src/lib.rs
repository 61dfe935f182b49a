//! gatewatch-engine — failover decisions and the cycle supervisor.
//!
//! # Components
//!
//! - **`decision`** — pure priority scan producing a [`Decision`]
//! - **`escalation`** — when a persistent outage pages again
//! - **`supervisor`** — owns descriptors, health and the active pointer,
//!   and runs probe → reconcile → decide → remediate once per cycle

pub mod decision;
pub mod escalation;
pub mod supervisor;

pub use decision::{decide, Decision};
pub use escalation::Escalation;
pub use supervisor::{Supervisor, SupervisorSettings};
