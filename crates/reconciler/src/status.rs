//! Status reporter.
//!
//! Writes the single outcome of a reconciliation onto every live source.
//! Writes for different sources are independent and run concurrently, at most
//! `concurrency` at a time, each on its own copy of the source.

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use nslabel_core::{ConditionStatus, LABELS_APPLIED, Source};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::store::Guarded;

/// Reason recorded on success.
pub const REASON_SUCCESS: &str = "Success";

/// Outcome to report on every live source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Applied,
    Failed { reason: String, message: String },
}

impl Report {
    /// Failure report carrying `err`'s category and text.
    #[must_use]
    pub fn failed(err: &Error) -> Self {
        Self::Failed {
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}

/// Upsert a condition on `source` by type. Returns `true` if it changed.
pub fn set_condition(
    source: &mut Source,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> bool {
    source
        .status
        .set_condition(type_, status, reason, message, now)
}

/// Mark the current generation of `source` as applied.
pub fn mark_applied(source: &mut Source) -> bool {
    let changed =
        !source.status.applied || source.status.observed_generation != source.generation;
    source.status.applied = true;
    source.status.observed_generation = source.generation;
    changed
}

/// Apply `report` to `source`'s status. Returns `true` if the status changed.
pub fn apply_report(source: &mut Source, report: &Report, now: DateTime<Utc>) -> bool {
    match report {
        Report::Applied => {
            let condition = set_condition(
                source,
                LABELS_APPLIED,
                ConditionStatus::True,
                REASON_SUCCESS,
                "Labels applied successfully",
                now,
            );
            mark_applied(source) || condition
        }
        Report::Failed { reason, message } => {
            let condition = set_condition(
                source,
                LABELS_APPLIED,
                ConditionStatus::False,
                reason,
                message,
                now,
            );
            let applied = std::mem::replace(&mut source.status.applied, false);
            applied || condition
        }
    }
}

/// Writes reports through the store with bounded concurrency.
pub struct StatusReporter<'a> {
    store: Guarded<'a>,
    concurrency: usize,
}

impl<'a> StatusReporter<'a> {
    pub fn new(store: Guarded<'a>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Report `report` on every source in `sources`.
    ///
    /// Sources whose status would not change are not written. Sources that
    /// vanished are ignored. Returns the number of statuses written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatusUpdate`] carrying the first failure and the
    /// failure count if any write failed. All writes are attempted.
    pub async fn report(&self, sources: Vec<Source>, report: &Report) -> Result<usize> {
        let now = Utc::now();
        let store = self.store;

        let results = stream::iter(sources)
            .filter_map(|mut source| {
                future::ready(apply_report(&mut source, report, now).then_some(source))
            })
            .map(|source| async move {
                match store.update_source_status(&source).await {
                    Ok(()) => {
                        debug!(source = %source, "Updated status");
                        Ok(true)
                    }
                    Err(e) if e.is_not_found() => Ok(false),
                    Err(e) => {
                        error!(source = %source, error = %e, "Failed to update NamespaceLabel status");
                        Err(e)
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut written = 0usize;
        let mut failures = results.into_iter().filter_map(|result| match result {
            Ok(true) => {
                written += 1;
                None
            }
            Ok(false) => None,
            Err(e) => Some(e),
        });

        let first = failures.next();
        let rest = failures.count();
        match first {
            None => Ok(written),
            Some(first) => Err(Error::StatusUpdate {
                failed: rest + 1,
                first: Box::new(first),
            }),
        }
    }
}
