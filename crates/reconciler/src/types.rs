//! Core types for the reconciler.

use nslabel_core::{Labels, TargetKey};

/// A protected key a source tried to declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedKey {
    /// `namespace/name` of the declaring source.
    pub source: String,
    pub key: String,
}

/// Output of the label combiner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Combined {
    /// Conflict-resolved labels, protected keys excluded.
    pub labels: Labels,
    /// Protected keys that were declared and dropped.
    pub skipped: Vec<SkippedKey>,
}

/// What the convergence applier did to the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Keys written (new or changed value).
    pub upserted: Vec<String>,
    /// Keys reclaimed from the target.
    pub removed: Vec<String>,
    /// Whether a write was issued.
    pub updated: bool,
}

/// Result of one reconciliation of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub target: TargetKey,
    /// Labels combined from the live sources.
    pub combined: Labels,
    /// Sources that got the finalizer in this pass.
    pub finalizers_added: Vec<String>,
    /// Sources cleaned up and released in this pass.
    pub cleaned_up: Vec<String>,
    /// Sources whose status was written.
    pub statuses_written: usize,
    /// Whether the target was updated.
    pub target_updated: bool,
    /// The target or all sources vanished mid-way; nothing was reported.
    pub vanished: bool,
}

impl ReconcileOutcome {
    /// Create an outcome with nothing done yet.
    pub fn new(target: TargetKey) -> Self {
        Self {
            target,
            combined: Labels::new(),
            finalizers_added: Vec::new(),
            cleaned_up: Vec::new(),
            statuses_written: 0,
            target_updated: false,
            vanished: false,
        }
    }

    /// Outcome for a reconciliation cut short because an object disappeared.
    pub fn vanished(target: TargetKey) -> Self {
        Self {
            vanished: true,
            ..Self::new(target)
        }
    }

    /// Whether the pass changed nothing at all.
    pub fn converged(&self) -> bool {
        !self.target_updated
            && self.finalizers_added.is_empty()
            && self.cleaned_up.is_empty()
            && self.statuses_written == 0
    }
}
