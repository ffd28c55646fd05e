//! The `NamespaceLabel` custom resource and its mapping onto the core model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use nslabel_core::{Condition, ConditionStatus, Source, SourceStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Labels a tenant wants on the namespace this object lives in.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dana.io",
    version = "v1",
    kind = "NamespaceLabel",
    namespaced,
    status = "NamespaceLabelStatus",
    shortname = "nslabel",
    printcolumn = r#"{"name":"Applied","type":"boolean","jsonPath":".status.applied"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct NamespaceLabelSpec {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceLabelStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
    #[serde(default)]
    pub applied: bool,
    #[serde(default)]
    pub observed_generation: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl NamespaceLabelStatus {
    #[must_use]
    pub fn from_source_status(status: &SourceStatus) -> Self {
        Self {
            conditions: status
                .conditions
                .iter()
                .map(|c| StatusCondition {
                    type_: c.type_.clone(),
                    status: c.status.as_str().to_string(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_transition_time: c.last_transition_time,
                })
                .collect(),
            applied: status.applied,
            observed_generation: status.observed_generation,
        }
    }

    #[must_use]
    pub fn to_source_status(&self) -> SourceStatus {
        SourceStatus {
            conditions: self
                .conditions
                .iter()
                .map(|c| {
                    Condition::new(
                        c.type_.as_str(),
                        ConditionStatus::parse(&c.status),
                        c.reason.as_str(),
                        c.message.as_str(),
                        c.last_transition_time,
                    )
                })
                .collect(),
            applied: self.applied,
            observed_generation: self.observed_generation,
        }
    }
}

impl NamespaceLabel {
    /// The core view of this object. `None` for an object without a
    /// namespace, which the API server never hands out for this kind.
    #[must_use]
    pub fn to_source(&self) -> Option<Source> {
        let namespace = self.namespace()?;
        Some(Source {
            name: self.name_any(),
            namespace,
            uid: self.metadata.uid.clone(),
            generation: self.metadata.generation.unwrap_or_default(),
            created_at: self
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .unwrap_or_default(),
            deletion_requested_at: self.metadata.deletion_timestamp.as_ref().map(|t| t.0),
            finalizers: self.metadata.finalizers.clone().unwrap_or_default(),
            labels: self.spec.labels.clone(),
            status: self
                .status
                .as_ref()
                .map(NamespaceLabelStatus::to_source_status)
                .unwrap_or_default(),
        })
    }
}
