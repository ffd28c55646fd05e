//! The label store collaborator and its implementations.
//!
//! [`LabelStore`] is the only way the reconciler reads or writes the outside
//! world. [`Guarded`] wraps a store so that every call honours the caller's
//! cancellation token and an optional per-operation timeout.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nslabel_core::{Source, Target, TargetKey};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Read/write surface the reconciler needs from the cluster.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// List every source declared in the target's namespace, including ones
    /// pending deletion.
    async fn list_sources(&self, target: &TargetKey) -> Result<Vec<Source>>;

    /// Fetch the target namespace.
    async fn get_target(&self, target: &TargetKey) -> Result<Target>;

    /// Replace the target's labels. Fails with [`Error::Conflict`] if the
    /// target changed since it was read.
    async fn update_target(&self, target: &Target) -> Result<()>;

    /// Persist the source's mutable surface: finalizers and status.
    async fn update_source_status(&self, source: &Source) -> Result<()>;

    /// Revert side effects attributable to `source`. Must be idempotent.
    async fn perform_cleanup(&self, source: &Source) -> Result<()>;
}

/// A store bound to one reconciliation's cancellation token and timeout.
#[derive(Clone, Copy)]
pub struct Guarded<'a> {
    store: &'a dyn LabelStore,
    cancel: &'a CancellationToken,
    timeout: Option<Duration>,
}

impl<'a> Guarded<'a> {
    pub fn new(
        store: &'a dyn LabelStore,
        cancel: &'a CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            cancel,
            timeout,
        }
    }

    pub async fn list_sources(&self, target: &TargetKey) -> Result<Vec<Source>> {
        self.run("list_sources", self.store.list_sources(target))
            .await
    }

    pub async fn get_target(&self, target: &TargetKey) -> Result<Target> {
        self.run("get_target", self.store.get_target(target)).await
    }

    pub async fn update_target(&self, target: &Target) -> Result<()> {
        self.run("update_target", self.store.update_target(target))
            .await
    }

    pub async fn update_source_status(&self, source: &Source) -> Result<()> {
        self.run(
            "update_source_status",
            self.store.update_source_status(source),
        )
        .await
    }

    pub async fn perform_cleanup(&self, source: &Source) -> Result<()> {
        self.run("perform_cleanup", self.store.perform_cleanup(source))
            .await
    }

    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(operation));
        }

        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout(operation, limit)),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::cancelled(operation)),
            result = bounded => result,
        }
    }
}

/// Store operations, used to inject failures into [`InMemoryLabelStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListSources,
    GetTarget,
    UpdateTarget,
    UpdateSourceStatus,
    PerformCleanup,
}

impl StoreOp {
    const fn name(self) -> &'static str {
        match self {
            Self::ListSources => "list_sources",
            Self::GetTarget => "get_target",
            Self::UpdateTarget => "update_target",
            Self::UpdateSourceStatus => "update_source_status",
            Self::PerformCleanup => "perform_cleanup",
        }
    }
}

/// In-memory store for testing.
///
/// Behaves like the API server where it matters to the reconciler: targets
/// carry a resource version checked on update, and a source whose deletion
/// was requested disappears once its last finalizer is removed.
#[derive(Default)]
pub struct InMemoryLabelStore {
    sources: RwLock<BTreeMap<(String, String), Source>>,
    targets: RwLock<BTreeMap<String, Target>>,
    failures: Mutex<HashMap<StoreOp, usize>>,
    cleaned: Mutex<Vec<String>>,
    target_writes: AtomicUsize,
    status_writes: AtomicUsize,
    next_version: AtomicUsize,
}

impl InMemoryLabelStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert or replace a source.
    pub async fn put_source(&self, source: Source) {
        self.sources
            .write()
            .await
            .insert((source.namespace.clone(), source.name.clone()), source);
    }

    /// Insert or replace a target, assigning a fresh resource version.
    pub async fn put_target(&self, mut target: Target) {
        target.resource_version = Some(self.bump_version());
        self.targets.write().await.insert(target.name.clone(), target);
    }

    /// Mark a source as deleting. Without finalizers it is removed at once.
    pub async fn request_deletion(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        let mut sources = self.sources.write().await;
        let key = (namespace.to_string(), name.to_string());
        let remove = match sources.get_mut(&key) {
            Some(source) => {
                source.deletion_requested_at = Some(at);
                source.finalizers.is_empty()
            }
            None => false,
        };
        if remove {
            sources.remove(&key);
        }
    }

    /// Remove a source without going through finalization.
    pub async fn remove_source(&self, namespace: &str, name: &str) {
        self.sources
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Remove a target.
    pub async fn remove_target(&self, name: &str) {
        self.targets.write().await.remove(name);
    }

    /// Make the next `times` calls of `op` fail.
    pub async fn fail_on(&self, op: StoreOp, times: usize) {
        self.failures.lock().await.insert(op, times);
    }

    pub async fn source(&self, namespace: &str, name: &str) -> Option<Source> {
        self.sources
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn target(&self, name: &str) -> Option<Target> {
        self.targets.read().await.get(name).cloned()
    }

    /// Names (`namespace/name`) of sources cleaned up so far, in order.
    pub async fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().await.clone()
    }

    /// Number of successful target updates.
    pub fn target_writes(&self) -> usize {
        self.target_writes.load(Ordering::SeqCst)
    }

    /// Number of successful source writes.
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    fn bump_version(&self) -> String {
        self.next_version
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
            .to_string()
    }

    async fn injected(&self, op: StoreOp) -> Result<()> {
        let mut failures = self.failures.lock().await;
        match failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::store(op.name(), "injected failure"))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl LabelStore for InMemoryLabelStore {
    async fn list_sources(&self, target: &TargetKey) -> Result<Vec<Source>> {
        self.injected(StoreOp::ListSources).await?;
        Ok(self
            .sources
            .read()
            .await
            .values()
            .filter(|s| s.namespace == target.name())
            .cloned()
            .collect())
    }

    async fn get_target(&self, target: &TargetKey) -> Result<Target> {
        self.injected(StoreOp::GetTarget).await?;
        self.targets
            .read()
            .await
            .get(target.name())
            .cloned()
            .ok_or_else(|| Error::not_found("Namespace", target.name()))
    }

    async fn update_target(&self, target: &Target) -> Result<()> {
        self.injected(StoreOp::UpdateTarget).await?;
        let mut targets = self.targets.write().await;
        let stored = targets
            .get_mut(&target.name)
            .ok_or_else(|| Error::not_found("Namespace", &target.name))?;

        if stored.resource_version != target.resource_version {
            return Err(Error::conflict(
                "Namespace",
                &target.name,
                "the object has been modified",
            ));
        }

        stored.labels.clone_from(&target.labels);
        stored.resource_version = Some(self.bump_version());
        self.target_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_source_status(&self, source: &Source) -> Result<()> {
        self.injected(StoreOp::UpdateSourceStatus).await?;
        let mut sources = self.sources.write().await;
        let key = (source.namespace.clone(), source.name.clone());
        let stored = sources
            .get_mut(&key)
            .ok_or_else(|| Error::not_found("NamespaceLabel", source.to_string()))?;

        stored.finalizers.clone_from(&source.finalizers);
        stored.status = source.status.clone();
        self.status_writes.fetch_add(1, Ordering::SeqCst);

        if stored.is_deleting() && stored.finalizers.is_empty() {
            sources.remove(&key);
        }
        Ok(())
    }

    async fn perform_cleanup(&self, source: &Source) -> Result<()> {
        self.injected(StoreOp::PerformCleanup).await?;
        self.cleaned.lock().await.push(source.to_string());
        Ok(())
    }
}
