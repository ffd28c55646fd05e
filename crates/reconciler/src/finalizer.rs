//! Finalizer lifecycle.
//!
//! Every managed source carries [`FINALIZER`] so that its deletion waits until
//! cleanup has run. The marker is only removed after cleanup succeeds, which
//! gives at-least-once cleanup.

use nslabel_core::{FINALIZER, Source};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::recorder::{EventLevel, EventRecorder};
use crate::store::Guarded;

/// Lifecycle state of a source, derived from its marker and deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalizerState {
    /// Live, marker not yet attached.
    Absent,
    /// Live and managed.
    Present,
    /// Deletion requested, marker still attached: cleanup pending.
    CleaningUp,
    /// Deletion requested and marker gone. Terminal.
    Removed,
}

impl FinalizerState {
    #[must_use]
    pub fn of(source: &Source) -> Self {
        match (source.is_deleting(), source.has_finalizer(FINALIZER)) {
            (false, false) => Self::Absent,
            (false, true) => Self::Present,
            (true, true) => Self::CleaningUp,
            (true, false) => Self::Removed,
        }
    }

    /// Whether a source in this state contributes labels.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Absent | Self::Present)
    }
}

/// What the lifecycle manager did with a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Marker attached; the source is live.
    Added(Source),
    /// Nothing to do; the source is live.
    Unchanged(Source),
    /// Cleanup ran and the marker was removed.
    Released,
    /// Source is gone or already released; ignore it.
    Skipped,
}

impl Transition {
    /// The source, if it should take part in combination.
    #[must_use]
    pub fn into_live(self) -> Option<Source> {
        match self {
            Self::Added(source) | Self::Unchanged(source) => Some(source),
            Self::Released | Self::Skipped => None,
        }
    }
}

/// Drives sources through [`FinalizerState`].
pub struct FinalizerManager<'a> {
    store: Guarded<'a>,
    recorder: &'a dyn EventRecorder,
}

impl<'a> FinalizerManager<'a> {
    pub fn new(store: Guarded<'a>, recorder: &'a dyn EventRecorder) -> Self {
        Self { store, recorder }
    }

    /// Advance `source` one step through its lifecycle.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the marker or cleanup fails. A failed
    /// cleanup leaves the marker in place. A source that vanished while being
    /// updated is reported as [`Transition::Skipped`].
    pub async fn step(&self, source: Source) -> Result<Transition> {
        match FinalizerState::of(&source) {
            FinalizerState::Absent => self.attach(source).await,
            FinalizerState::Present => Ok(Transition::Unchanged(source)),
            FinalizerState::CleaningUp => self.release(source).await,
            FinalizerState::Removed => Ok(Transition::Skipped),
        }
    }

    async fn attach(&self, mut source: Source) -> Result<Transition> {
        source.finalizers.push(FINALIZER.to_string());
        match self.store.update_source_status(&source).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(Transition::Skipped),
            Err(e) => return Err(e),
        }

        info!(source = %source, "Added finalizer");
        self.recorder.record(
            &source.object_ref(),
            EventLevel::Normal,
            "FinalizerAdded",
            &format!("Finalizer added to NamespaceLabel {}", source.name),
        );
        Ok(Transition::Added(source))
    }

    async fn release(&self, mut source: Source) -> Result<Transition> {
        if let Err(e) = self.store.perform_cleanup(&source).await {
            warn!(source = %source, error = %e, "Cleanup failed, keeping finalizer");
            self.recorder.record(
                &source.object_ref(),
                EventLevel::Warning,
                "CleanupFailed",
                &e.to_string(),
            );
            return Err(match e {
                Error::Cancelled { .. } | Error::Timeout { .. } => e,
                other => Error::cleanup_failed(source.to_string(), other.to_string()),
            });
        }

        source.finalizers.retain(|f| f != FINALIZER);
        match self.store.update_source_status(&source).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(Transition::Skipped),
            Err(e) => return Err(e),
        }

        info!(source = %source, "Removed finalizer and cleaned up");
        self.recorder.record(
            &source.object_ref(),
            EventLevel::Normal,
            "FinalizerRemoved",
            &format!("Finalizer removed for NamespaceLabel {}", source.name),
        );
        Ok(Transition::Released)
    }
}
