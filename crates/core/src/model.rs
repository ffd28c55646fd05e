//! Sources, targets and their identities.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::{self, Condition, ConditionStatus};

/// A label mapping. Ordered so that every rendering of it is deterministic.
pub type Labels = BTreeMap<String, String>;

/// Finalizer marker attached to every source this system manages.
pub const FINALIZER: &str = "namespacelabel.finalizers.namespace";

/// Identity of a target namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Reference to a source, used when recording events against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Observed outcome of the last attempt to apply a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub conditions: Vec<Condition>,
    pub applied: bool,
    pub observed_generation: i64,
}

impl SourceStatus {
    /// Upsert a condition by type. Returns `true` if the status changed.
    pub fn set_condition(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> bool {
        condition::upsert(
            &mut self.conditions,
            Condition::new(type_, status, reason, message, now),
        )
    }

    /// Look up a condition by type.
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// A tenant declaration of labels for the namespace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    pub deletion_requested_at: Option<DateTime<Utc>>,
    pub finalizers: Vec<String>,
    pub labels: Labels,
    pub status: SourceStatus,
}

impl Source {
    /// Create a live source with no finalizers and an empty status.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: None,
            generation: 1,
            created_at,
            deletion_requested_at: None,
            finalizers: Vec::new(),
            labels: Labels::new(),
            status: SourceStatus::default(),
        }
    }

    /// Add a declared label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Replace all declared labels.
    #[must_use]
    pub fn with_labels<K, V>(mut self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Attach a finalizer marker.
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizers.push(finalizer.into());
        self
    }

    /// Set the generation.
    #[must_use]
    pub const fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    /// Whether deletion of this source has been requested.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.deletion_requested_at.is_some()
    }

    /// Whether `finalizer` is attached.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Reference for event recording.
    #[must_use]
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            uid: self.uid.clone(),
        }
    }

    /// Key used to order sources that share a creation timestamp.
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        (&self.namespace, &self.name)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The namespace receiving the combined labels.
///
/// `labels` is `None` when the namespace carries no label map at all.
/// `resource_version` is opaque to the reconciler and only used by the store
/// for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub labels: Option<Labels>,
    pub resource_version: Option<String>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: None,
            resource_version: None,
        }
    }

    /// Add a label, initialising the map if needed.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels
            .get_or_insert_with(Labels::new)
            .insert(key.into(), value.into());
        self
    }

    /// Current labels; an absent map reads as empty.
    #[must_use]
    pub fn labels_or_empty(&self) -> Labels {
        self.labels.clone().unwrap_or_default()
    }
}
