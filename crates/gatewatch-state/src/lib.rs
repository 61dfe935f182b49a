//! gatewatch-state — per-gateway health and its durable snapshot.
//!
//! Every cycle the prober hands over one [`ProbeVerdict`] per gateway.
//! [`reconcile`] folds those into the live [`GatewayHealth`] vector, stamps
//! `since` on every status change and reports the [`Transition`]s. The
//! [`SnapshotStore`] writes the vector to disk as JSON lines whenever the
//! on-disk copy would otherwise go stale, replacing the file atomically.
//!
//! ```text
//! ProbeVerdict[] ──reconcile──► GatewayHealth[] ──SnapshotStore::save──► state file
//!                      │
//!                      └──► Reconciliation { transitions, still_down }
//! ```

pub mod error;
pub mod reconcile;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use reconcile::{reconcile, Reconciliation, Transition};
pub use store::SnapshotStore;
pub use types::*;
