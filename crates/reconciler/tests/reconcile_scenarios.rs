//! End-to-end reconciliation scenarios against the in-memory store.
//!
//! Covers the worked examples, idempotence, reclaiming, finalizer gating and
//! every error path of the orchestrator.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nslabel_core::{
    ConditionStatus, FINALIZER, LABELS_APPLIED, Labels, ProtectedKeySet, Source, Target, TargetKey,
};
use nslabel_reconciler::{
    CollectingRecorder, Error, InMemoryLabelStore, LabelStore, Reconciler, ReconcilerBuilder,
    Result, StoreOp,
};
use tokio_util::sync::CancellationToken;

const NS: &str = "team-a";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn build(store: Arc<dyn LabelStore>, recorder: Arc<CollectingRecorder>) -> Reconciler {
    match ReconcilerBuilder::new()
        .with_store(store)
        .with_recorder(recorder)
        .with_protected(ProtectedKeySet::from_csv("kubernetes.io/managed-by"))
        .build()
    {
        Ok(reconciler) => reconciler,
        Err(e) => panic!("reconciler should build: {e}"),
    }
}

struct Fixture {
    store: Arc<InMemoryLabelStore>,
    recorder: Arc<CollectingRecorder>,
    reconciler: Reconciler,
}

impl Fixture {
    fn new() -> Self {
        let store = InMemoryLabelStore::new_arc();
        let recorder = Arc::new(CollectingRecorder::new());
        let reconciler = build(store.clone(), recorder.clone());
        Self {
            store,
            recorder,
            reconciler,
        }
    }

    async fn reconcile(&self) -> Result<nslabel_reconciler::ReconcileOutcome> {
        self.reconciler
            .reconcile(&TargetKey::new(NS), &CancellationToken::new())
            .await
    }

    async fn target_labels(&self) -> Labels {
        self.store
            .target(NS)
            .await
            .map(|t| t.labels_or_empty())
            .unwrap_or_default()
    }

    async fn applied_condition(&self, name: &str) -> Option<(ConditionStatus, String)> {
        self.store.source(NS, name).await.and_then(|s| {
            s.status
                .condition(LABELS_APPLIED)
                .map(|c| (c.status, c.reason.clone()))
        })
    }
}

/// Seed the documented example: A (older) and B (newer) against a target
/// holding a protected key and a stale key.
async fn seed_example(fixture: &Fixture) {
    fixture
        .store
        .put_source(Source::new(NS, "a", at(100)).with_labels([
            ("team", "payments"),
            ("kubernetes.io/managed-by", "tenant"),
        ]))
        .await;
    fixture
        .store
        .put_source(Source::new(NS, "b", at(200)).with_labels([("team", "checkout"), ("tier", "gold")]))
        .await;
    fixture
        .store
        .put_target(
            Target::new(NS)
                .with_label("kubernetes.io/managed-by", "platform")
                .with_label("stale", "x"),
        )
        .await;
}

// ==========================================================================
// Worked examples
// ==========================================================================

#[tokio::test]
async fn test_example_newer_wins_and_protected_untouched() {
    let fixture = Fixture::new();
    seed_example(&fixture).await;

    let outcome = fixture.reconcile().await;
    assert!(outcome.is_ok(), "reconcile failed: {:?}", outcome.err());
    let Ok(outcome) = outcome else { return };

    assert_eq!(outcome.combined, labels(&[("team", "checkout"), ("tier", "gold")]));
    assert!(outcome.target_updated);
    assert_eq!(
        fixture.target_labels().await,
        labels(&[
            ("kubernetes.io/managed-by", "platform"),
            ("team", "checkout"),
            ("tier", "gold"),
        ])
    );
    assert_eq!(outcome.finalizers_added.len(), 2);
    assert!(fixture.recorder.reasons().contains(&"ProtectedLabelSkipped".to_string()));
}

#[tokio::test]
async fn test_example_sources_report_applied() {
    let fixture = Fixture::new();
    seed_example(&fixture).await;
    let _ = fixture.reconcile().await;

    for name in ["a", "b"] {
        let source = fixture.store.source(NS, name).await;
        assert!(source.as_ref().is_some_and(|s| s.has_finalizer(FINALIZER)));
        assert!(source.as_ref().is_some_and(|s| s.status.applied));
        assert_eq!(
            fixture.applied_condition(name).await,
            Some((ConditionStatus::True, "Success".to_string()))
        );
    }
}

#[tokio::test]
async fn test_deleted_source_is_cleaned_and_excluded() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "base", at(1)).with_label("team", "payments"))
        .await;
    fixture
        .store
        .put_source(Source::new(NS, "c", at(2)).with_label("cost-center", "42"))
        .await;
    fixture.store.put_target(Target::new(NS)).await;
    let _ = fixture.reconcile().await;
    assert!(fixture.target_labels().await.contains_key("cost-center"));

    fixture.store.request_deletion(NS, "c", at(3)).await;
    let outcome = fixture.reconcile().await;

    assert_eq!(
        outcome.map(|o| o.cleaned_up).ok(),
        Some(vec![format!("{NS}/c")])
    );
    assert!(fixture.store.source(NS, "c").await.is_none());
    assert_eq!(fixture.store.cleaned().await, vec![format!("{NS}/c")]);
    assert_eq!(fixture.target_labels().await, labels(&[("team", "payments")]));
    assert!(fixture.recorder.reasons().contains(&"FinalizerRemoved".to_string()));
}

// ==========================================================================
// Properties
// ==========================================================================

#[tokio::test]
async fn test_second_reconcile_writes_nothing() {
    let fixture = Fixture::new();
    seed_example(&fixture).await;

    let _ = fixture.reconcile().await;
    let target_writes = fixture.store.target_writes();
    let status_writes = fixture.store.status_writes();

    let second = fixture.reconcile().await;
    assert!(second.as_ref().is_ok_and(|o| o.converged()));
    assert_eq!(fixture.store.target_writes(), target_writes);
    assert_eq!(fixture.store.status_writes(), status_writes);
}

#[tokio::test]
async fn test_removed_declaration_is_reclaimed() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "a", at(1)).with_labels([("team", "payments"), ("tier", "gold")]))
        .await;
    fixture.store.put_target(Target::new(NS)).await;
    let _ = fixture.reconcile().await;

    let Some(edited) = fixture.store.source(NS, "a").await else {
        panic!("source should exist");
    };
    fixture
        .store
        .put_source(Source {
            labels: labels(&[("team", "payments")]),
            generation: edited.generation + 1,
            ..edited
        })
        .await;
    let _ = fixture.reconcile().await;

    assert_eq!(fixture.target_labels().await, labels(&[("team", "payments")]));
    let source = fixture.store.source(NS, "a").await;
    assert_eq!(source.map(|s| s.status.observed_generation), Some(2));
}

#[tokio::test]
async fn test_protected_key_on_target_survives_empty_declarations() {
    let fixture = Fixture::new();
    fixture.store.put_source(Source::new(NS, "empty", at(1))).await;
    fixture
        .store
        .put_target(Target::new(NS).with_label("kubernetes.io/managed-by", "platform"))
        .await;

    let outcome = fixture.reconcile().await;
    assert!(outcome.is_ok_and(|o| !o.target_updated));
    assert_eq!(
        fixture.target_labels().await,
        labels(&[("kubernetes.io/managed-by", "platform")])
    );
}

#[tokio::test]
async fn test_no_sources_leaves_target_alone() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_target(Target::new(NS).with_label("owned-elsewhere", "yes"))
        .await;

    let outcome = fixture.reconcile().await;
    assert!(outcome.is_ok_and(|o| o.converged()));
    assert_eq!(fixture.target_labels().await, labels(&[("owned-elsewhere", "yes")]));
}

// ==========================================================================
// Error paths
// ==========================================================================

#[tokio::test]
async fn test_missing_target_is_a_soft_stop() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "a", at(1)).with_label("team", "payments"))
        .await;

    let outcome = fixture.reconcile().await;
    assert!(outcome.is_ok_and(|o| o.vanished));
    assert_eq!(fixture.applied_condition("a").await, None);
}

#[tokio::test]
async fn test_apply_failure_marks_every_live_source() {
    let fixture = Fixture::new();
    seed_example(&fixture).await;
    fixture.store.fail_on(StoreOp::UpdateTarget, 1).await;

    let outcome = fixture.reconcile().await;
    assert_eq!(outcome.err().map(|e| e.reason()), Some("TargetUpdateFailed"));

    for name in ["a", "b"] {
        assert_eq!(
            fixture.applied_condition(name).await,
            Some((ConditionStatus::False, "TargetUpdateFailed".to_string()))
        );
        let source = fixture.store.source(NS, name).await;
        assert!(source.is_some_and(|s| !s.status.applied));
    }
    assert!(fixture.recorder.reasons().contains(&"ApplyFailed".to_string()));
}

#[tokio::test]
async fn test_apply_failure_still_returned_when_status_write_fails() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "a", at(1)).with_finalizer(FINALIZER).with_label("team", "x"))
        .await;
    fixture.store.put_target(Target::new(NS)).await;
    fixture.store.fail_on(StoreOp::UpdateTarget, 1).await;
    fixture.store.fail_on(StoreOp::UpdateSourceStatus, 1).await;

    let outcome = fixture.reconcile().await;
    assert_eq!(outcome.err().map(|e| e.reason()), Some("TargetUpdateFailed"));
}

#[tokio::test]
async fn test_failed_cleanup_keeps_finalizer_and_surfaces_error() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "c", at(1)).with_finalizer(FINALIZER).with_label("team", "x"))
        .await;
    fixture.store.put_target(Target::new(NS).with_label("team", "x")).await;
    fixture.store.request_deletion(NS, "c", at(2)).await;
    fixture.store.fail_on(StoreOp::PerformCleanup, 1).await;

    let outcome = fixture.reconcile().await;
    assert!(matches!(outcome, Err(Error::CleanupFailed { .. })));
    let source = fixture.store.source(NS, "c").await;
    assert!(source.is_some_and(|s| s.has_finalizer(FINALIZER)));
    assert_eq!(fixture.store.target_writes(), 0);

    // The retry succeeds and reclaims the label.
    let retry = fixture.reconcile().await;
    assert!(retry.is_ok());
    assert!(fixture.store.source(NS, "c").await.is_none());
    assert!(fixture.target_labels().await.is_empty());
}

#[tokio::test]
async fn test_status_failure_after_apply_keeps_labels_converged() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "a", at(1)).with_finalizer(FINALIZER).with_label("team", "x"))
        .await;
    fixture.store.put_target(Target::new(NS)).await;
    fixture.store.fail_on(StoreOp::UpdateSourceStatus, 1).await;

    let outcome = fixture.reconcile().await;
    assert!(matches!(outcome, Err(Error::StatusUpdate { failed: 1, .. })));
    assert_eq!(fixture.target_labels().await, labels(&[("team", "x")]));

    let retry = fixture.reconcile().await;
    assert!(retry.is_ok());
    assert_eq!(
        fixture.applied_condition("a").await,
        Some((ConditionStatus::True, "Success".to_string()))
    );
}

#[tokio::test]
async fn test_list_failure_is_returned() {
    let fixture = Fixture::new();
    fixture.store.fail_on(StoreOp::ListSources, 1).await;

    let outcome = fixture.reconcile().await;
    assert_eq!(outcome.err().map(|e| e.reason()), Some("SourceListFailed"));
}

#[tokio::test]
async fn test_failed_finalizer_attach_marks_every_live_source() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_source(Source::new(NS, "a", at(1)).with_label("team", "x"))
        .await;
    fixture
        .store
        .put_source(Source::new(NS, "b", at(2)).with_label("tier", "gold"))
        .await;
    fixture.store.put_target(Target::new(NS)).await;
    fixture.store.fail_on(StoreOp::UpdateSourceStatus, 1).await;

    let outcome = fixture.reconcile().await;
    assert_eq!(outcome.err().map(|e| e.reason()), Some("StatusUpdateFailed"));

    for name in ["a", "b"] {
        assert_eq!(
            fixture.applied_condition(name).await,
            Some((ConditionStatus::False, "StatusUpdateFailed".to_string())),
            "source {name} should report the failure"
        );
    }
    assert_eq!(fixture.store.target_writes(), 0);
}

// ==========================================================================
// Concurrency and cancellation
// ==========================================================================

/// Delegating store that tracks concurrent status writes and can stall
/// target reads.
struct ProbeStore {
    inner: Arc<InMemoryLabelStore>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    stall_get_target: bool,
}

impl ProbeStore {
    fn new(inner: Arc<InMemoryLabelStore>, stall_get_target: bool) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            stall_get_target,
        }
    }
}

#[async_trait]
impl LabelStore for ProbeStore {
    async fn list_sources(&self, target: &TargetKey) -> Result<Vec<Source>> {
        self.inner.list_sources(target).await
    }

    async fn get_target(&self, target: &TargetKey) -> Result<Target> {
        if self.stall_get_target {
            std::future::pending::<()>().await;
        }
        self.inner.get_target(target).await
    }

    async fn update_target(&self, target: &Target) -> Result<()> {
        self.inner.update_target(target).await
    }

    async fn update_source_status(&self, source: &Source) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = self.inner.update_source_status(source).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn perform_cleanup(&self, source: &Source) -> Result<()> {
        self.inner.perform_cleanup(source).await
    }
}

#[tokio::test]
async fn test_status_writes_are_bounded() {
    let inner = InMemoryLabelStore::new_arc();
    for i in 0..12 {
        inner
            .put_source(
                Source::new(NS, format!("s{i:02}"), at(i))
                    .with_finalizer(FINALIZER)
                    .with_label(format!("k{i}"), "v"),
            )
            .await;
    }
    inner.put_target(Target::new(NS)).await;
    let probe = Arc::new(ProbeStore::new(inner.clone(), false));

    let reconciler = ReconcilerBuilder::new()
        .with_store(probe.clone())
        .status_concurrency(3)
        .build();
    let Ok(reconciler) = reconciler else {
        panic!("reconciler should build");
    };

    let outcome = reconciler
        .reconcile(&TargetKey::new(NS), &CancellationToken::new())
        .await;
    assert_eq!(outcome.map(|o| o.statuses_written).ok(), Some(12));
    let peak = probe.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded limit");
    assert!(peak >= 2, "status writes should overlap, peak was {peak}");
}

#[tokio::test]
async fn test_cancellation_aborts_without_writing() {
    let inner = InMemoryLabelStore::new_arc();
    inner
        .put_source(Source::new(NS, "a", at(1)).with_finalizer(FINALIZER).with_label("team", "x"))
        .await;
    inner.put_target(Target::new(NS)).await;
    let probe = Arc::new(ProbeStore::new(inner.clone(), true));
    let reconciler = build(probe, Arc::new(CollectingRecorder::new()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = reconciler.reconcile(&TargetKey::new(NS), &cancel).await;
    assert!(matches!(
        outcome,
        Err(Error::Cancelled {
            operation: "get_target"
        })
    ));
    assert_eq!(inner.target_writes(), 0);
    assert_eq!(inner.status_writes(), 0);
}

#[tokio::test]
async fn test_timeout_is_reported_on_sources() {
    let inner = InMemoryLabelStore::new_arc();
    inner
        .put_source(Source::new(NS, "a", at(1)).with_finalizer(FINALIZER).with_label("team", "x"))
        .await;
    inner.put_target(Target::new(NS)).await;
    let probe = Arc::new(ProbeStore::new(inner.clone(), true));
    let reconciler = ReconcilerBuilder::new()
        .with_store(probe)
        .operation_timeout(Some(Duration::from_millis(50)))
        .build();
    let Ok(reconciler) = reconciler else {
        panic!("reconciler should build");
    };

    let outcome = reconciler
        .reconcile(&TargetKey::new(NS), &CancellationToken::new())
        .await;
    assert!(matches!(outcome, Err(Error::Timeout { .. })));

    let source = inner.source(NS, "a").await;
    let reason = source.and_then(|s| s.status.condition(LABELS_APPLIED).map(|c| c.reason.clone()));
    assert_eq!(reason.as_deref(), Some("Timeout"));
}
