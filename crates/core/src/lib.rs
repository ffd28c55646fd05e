//! Core types for nslabel.
//!
//! A [`Source`] is a tenant-authored declaration of labels for the namespace it
//! lives in. Many sources may target the same namespace (the [`Target`]); the
//! reconciler combines them into one label set while never touching keys in
//! the [`ProtectedKeySet`].
//!
//! This crate is storage-agnostic: it knows nothing about Kubernetes clients,
//! only about the shapes the reconciler reads and writes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod condition;
pub mod model;
pub mod protected;

pub use condition::{Condition, ConditionStatus, LABELS_APPLIED};
pub use model::{FINALIZER, Labels, ObjectRef, Source, SourceStatus, Target, TargetKey};
pub use protected::{DEFAULT_PROTECTED_KEYS, ProtectedKeySet};
