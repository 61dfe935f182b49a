//! gatewatch-remedy — everything that touches the host.
//!
//! Each OS interaction sits behind a narrow port trait so the decision
//! logic can be exercised against recording fakes:
//!
//! ```text
//! Executor
//!   ├── Router       default route query / replace / delete
//!   ├── Firewall     connection-state flush
//!   ├── LeaseManager DHCP lease query / renew
//!   └── LinkDialer   on-demand link bring-up / peer discovery
//!
//! ShellPorts ──implements all four──► CommandRunner (tokio::process)
//! MailPager  ──────────────────────► CommandRunner
//! ```
//!
//! Commands are fire-and-forget in the sense that a failure never stops
//! the remaining steps of a sequence. Failures are still returned as
//! [`RemediationEvent::Failed`] for the caller to report.

pub mod command;
pub mod error;
pub mod executor;
pub mod notify;
pub mod parse;
pub mod ports;

pub use command::{CommandOutput, CommandRunner, ShellRunner};
pub use error::{CommandError, CommandResult};
pub use executor::{Executor, ExecutorSettings, RemediationEvent};
pub use notify::{LogPager, MailPager, Pager};
pub use parse::Lease;
pub use ports::{Firewall, LeaseManager, LinkDialer, Ports, Router, ShellPorts};
