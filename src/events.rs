//! Kubernetes Events for reconciliation milestones.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use nslabel_core::ObjectRef;
use nslabel_reconciler::{EventLevel, EventRecorder};
use tracing::warn;

use crate::crd::NamespaceLabel;

/// Publishes events against NamespaceLabels without blocking the caller.
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// `instance` identifies this replica, usually the pod name.
    pub fn new(client: Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, object: &ObjectRef, level: EventLevel, reason: &str, message: &str) {
        let reference = object_reference(object);
        let event = Event {
            type_: match level {
                EventLevel::Normal => EventType::Normal,
                EventLevel::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: action_for(reason).to_string(),
            secondary: None,
        };

        let recorder = self.recorder.clone();
        let object = object.to_string();
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &reference).await {
                warn!(object = %object, reason = %event.reason, error = %e, "Failed to publish event");
            }
        });
    }
}

/// Reference to the NamespaceLabel an event is about.
fn object_reference(object: &ObjectRef) -> ObjectReference {
    ObjectReference {
        api_version: Some(NamespaceLabel::api_version(&()).into_owned()),
        kind: Some(NamespaceLabel::kind(&()).into_owned()),
        name: Some(object.name.clone()),
        namespace: Some(object.namespace.clone()),
        uid: object.uid.clone(),
        ..ObjectReference::default()
    }
}

/// Machine-readable action that led to an event.
fn action_for(reason: &str) -> &'static str {
    match reason {
        "FinalizerAdded" | "FinalizerRemoved" | "CleanupFailed" => "Finalize",
        "ProtectedLabelSkipped" => "Combine",
        _ => "Apply",
    }
}
