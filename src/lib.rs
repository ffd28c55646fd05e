#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # nslabel
//!
//! Kubernetes binding for the namespace label engine: the `NamespaceLabel`
//! custom resource, an API-server backed label store and event recorder,
//! operator configuration and the controller loop.
//!
//! The engine itself lives in `nslabel-reconciler`; the data model in
//! `nslabel-core`. Both are re-exported.

pub use nslabel_core;
pub use nslabel_reconciler;

pub mod cli;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod store;

pub use config::OperatorConfig;
pub use crd::{NamespaceLabel, NamespaceLabelSpec, NamespaceLabelStatus};
pub use error::OperatorError;
pub use events::KubeEventRecorder;
pub use store::KubeLabelStore;
