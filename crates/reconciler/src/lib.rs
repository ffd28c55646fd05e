//! Label combination, protection and convergence engine.
//!
//! Tenants declare labels for their namespace in any number of `Source`
//! objects. For one target namespace, each reconciliation:
//!
//! 1. Lists the sources declared in it
//! 2. Runs each source through its finalizer lifecycle (attach the marker to
//!    new sources, clean up and release deleting ones)
//! 3. Combines the live sources' labels, newest source winning a conflict and
//!    protected keys always dropped
//! 4. Converges the namespace onto the combined labels (upsert, reclaim
//!    undeclared keys, never touch protected ones), writing only on change
//! 5. Reports `LabelsApplied` on every live source
//!
//! When to reconcile, and retry/backoff, belong to the caller. Every store
//! call honours the caller's [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! # Example
//!
//! ```no_run
//! use nslabel_core::{ProtectedKeySet, TargetKey};
//! use nslabel_reconciler::{InMemoryLabelStore, ReconcilerBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryLabelStore::new_arc();
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_store(store)
//!         .with_protected(ProtectedKeySet::from_csv("kubernetes.io/managed-by"))
//!         .build()?;
//!
//!     let outcome = reconciler
//!         .reconcile(&TargetKey::new("team-a"), &CancellationToken::new())
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod applier;
pub mod combiner;
pub mod error;
pub mod finalizer;
pub mod reconciler;
pub mod recorder;
pub mod status;
pub mod store;
pub mod types;

// Re-export main types
pub use applier::{ConvergenceApplier, converge};
pub use combiner::combine;
pub use error::{BoxError, Error, Result};
pub use finalizer::{FinalizerManager, FinalizerState, Transition};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use recorder::{CollectingRecorder, EventLevel, EventRecorder, NoopRecorder, RecordedEvent};
pub use status::{Report, StatusReporter, apply_report, mark_applied, set_condition};
pub use store::{Guarded, InMemoryLabelStore, LabelStore, StoreOp};
pub use types::{ApplyOutcome, Combined, ReconcileOutcome, SkippedKey};
