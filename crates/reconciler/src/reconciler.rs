//! Reconciler implementation.

use std::sync::Arc;
use std::time::Duration;

use nslabel_core::{ProtectedKeySet, Source, TargetKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::applier::ConvergenceApplier;
use crate::combiner::combine;
use crate::error::{Error, Result};
use crate::finalizer::{FinalizerManager, FinalizerState, Transition};
use crate::recorder::{EventLevel, EventRecorder, NoopRecorder};
use crate::status::{Report, StatusReporter};
use crate::store::{Guarded, LabelStore};
use crate::types::{Combined, ReconcileOutcome};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Maximum concurrent status writes per target.
    pub status_concurrency: usize,
    /// Time budget for each store operation.
    pub operation_timeout: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            status_concurrency: 8,
            operation_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Reconciles the labels of one target namespace from its sources.
pub struct Reconciler {
    store: Arc<dyn LabelStore>,
    recorder: Arc<dyn EventRecorder>,
    protected: Arc<ProtectedKeySet>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn LabelStore>,
        recorder: Arc<dyn EventRecorder>,
        protected: Arc<ProtectedKeySet>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            recorder,
            protected,
            config,
        }
    }

    /// Reconcile `target`: finalize sources, combine, converge, report.
    ///
    /// A target or source set that vanished mid-way ends the pass cleanly.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. When the failure happens
    /// after the live sources are known, they are marked `LabelsApplied=False`
    /// first (best-effort).
    #[instrument(skip_all, fields(target = %target))]
    pub async fn reconcile(
        &self,
        target: &TargetKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        let store = Guarded::new(self.store.as_ref(), cancel, self.config.operation_timeout);
        let mut outcome = ReconcileOutcome::new(target.clone());

        let sources = match store.list_sources(target).await {
            Ok(sources) => sources,
            Err(e) if e.is_not_found() => return Ok(ReconcileOutcome::vanished(target.clone())),
            Err(e) => return Err(e),
        };
        if sources.is_empty() {
            debug!("No sources declared for target");
            return Ok(outcome);
        }

        info!(sources = sources.len(), "Starting reconciliation");

        let live = self.finalize(store, sources, &mut outcome).await?;

        let Combined { labels, skipped } = combine(&live, &self.protected);
        for skip in &skipped {
            if let Some(source) = live.iter().find(|s| s.to_string() == skip.source) {
                self.recorder.record(
                    &source.object_ref(),
                    EventLevel::Warning,
                    "ProtectedLabelSkipped",
                    &format!("Label '{}' is protected and was not applied", skip.key),
                );
            }
        }

        let applier = ConvergenceApplier::new(store, &self.protected);
        let applied = match applier.apply(target, &labels).await {
            Ok(applied) => applied,
            Err(e) if e.is_not_found() => {
                info!("Target vanished, nothing to converge");
                return Ok(ReconcileOutcome::vanished(target.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Failed to apply labels to the namespace");
                for source in &live {
                    self.recorder.record(
                        &source.object_ref(),
                        EventLevel::Warning,
                        "ApplyFailed",
                        &e.to_string(),
                    );
                }
                self.report_failure(store, live, &e).await;
                return Err(e);
            }
        };

        outcome.combined = labels;
        outcome.target_updated = applied.updated;
        if applied.updated {
            for source in &live {
                self.recorder.record(
                    &source.object_ref(),
                    EventLevel::Normal,
                    "LabelsApplied",
                    &format!("Labels applied to namespace {target}"),
                );
            }
        }

        let reporter = StatusReporter::new(store, self.config.status_concurrency);
        outcome.statuses_written = reporter.report(live, &Report::Applied).await?;

        if outcome.converged() {
            info!("Target converged");
        } else {
            info!(
                target_updated = outcome.target_updated,
                finalizers_added = outcome.finalizers_added.len(),
                cleaned_up = outcome.cleaned_up.len(),
                statuses_written = outcome.statuses_written,
                "Reconciliation complete"
            );
        }

        Ok(outcome)
    }

    /// Run every source through its finalizer lifecycle and return the live
    /// ones. Deleting sources are cleaned up first so a failing cleanup stops
    /// the pass before any marker is attached to new sources.
    async fn finalize(
        &self,
        store: Guarded<'_>,
        sources: Vec<Source>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<Vec<Source>> {
        let manager = FinalizerManager::new(store, self.recorder.as_ref());
        let (live, deleting): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .partition(|source| FinalizerState::of(source).is_live());

        for source in deleting {
            let name = source.to_string();
            match manager.step(source).await {
                Ok(Transition::Released) => outcome.cleaned_up.push(name),
                Ok(_) => {}
                Err(e) => {
                    self.report_failure(store, live, &e).await;
                    return Err(e);
                }
            }
        }

        let mut finalized = Vec::with_capacity(live.len());
        let mut pending = live.into_iter();
        while let Some(source) = pending.next() {
            let name = source.to_string();
            // Still reported on if the step fails.
            let snapshot = source.clone();
            match manager.step(source).await {
                Ok(Transition::Added(source)) => {
                    outcome.finalizers_added.push(name);
                    finalized.push(source);
                }
                Ok(transition) => finalized.extend(transition.into_live()),
                Err(e) => {
                    finalized.push(snapshot);
                    finalized.extend(pending);
                    self.report_failure(store, finalized, &e).await;
                    return Err(e);
                }
            }
        }

        Ok(finalized)
    }

    /// Best-effort failure report; the primary error wins over status errors.
    async fn report_failure(&self, store: Guarded<'_>, live: Vec<Source>, err: &Error) {
        if live.is_empty() || matches!(err, Error::Cancelled { .. }) {
            return;
        }
        let reporter = StatusReporter::new(store, self.config.status_concurrency);
        if let Err(status_err) = reporter.report(live, &Report::failed(err)).await {
            warn!(error = %status_err, "Failed to record failure status");
        }
    }

    /// Get the protected-key policy.
    pub fn protected(&self) -> &ProtectedKeySet {
        &self.protected
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn LabelStore>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    protected: ProtectedKeySet,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            recorder: None,
            protected: ProtectedKeySet::default(),
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the label store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn LabelStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the event recorder. Defaults to dropping events.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Set the protected-key policy.
    #[must_use]
    pub fn with_protected(mut self, protected: ProtectedKeySet) -> Self {
        self.protected = protected;
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the status write concurrency.
    #[must_use]
    pub fn status_concurrency(mut self, limit: usize) -> Self {
        self.config.status_concurrency = limit;
        self
    }

    /// Set the per-operation timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Fails if no store was set or the status concurrency is zero.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("label store is required"))?;

        if self.config.status_concurrency == 0 {
            return Err(Error::invalid_config(
                "status_concurrency must be greater than 0",
            ));
        }

        let recorder = self
            .recorder
            .unwrap_or_else(|| Arc::new(NoopRecorder));

        Ok(Reconciler::new(
            store,
            recorder,
            Arc::new(self.protected),
            self.config,
        ))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
