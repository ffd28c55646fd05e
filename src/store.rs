//! [`LabelStore`] backed by the Kubernetes API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use nslabel_core::{FINALIZER, Source, Target, TargetKey};
use nslabel_reconciler::{Error, LabelStore, Result};
use serde_json::json;
use tracing::{debug, warn};

use crate::crd::{NamespaceLabel, NamespaceLabelStatus};

/// Field manager recorded on every write.
pub const FIELD_MANAGER: &str = "nslabel-controller";

const NAMESPACE_KIND: &str = "Namespace";
const SOURCE_KIND: &str = "NamespaceLabel";

/// Reads NamespaceLabels and writes Namespaces through a kube [`Client`].
#[derive(Clone)]
pub struct KubeLabelStore {
    client: Client,
}

impl KubeLabelStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn sources(&self, namespace: &str) -> Api<NamespaceLabel> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

/// Map a kube error onto the reconciler's categories.
fn map_kube_error(operation: &'static str, kind: &'static str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::not_found(kind, name),
        kube::Error::Api(resp) if resp.code == 409 => Error::conflict(kind, name, resp.message),
        other => Error::store(operation, other),
    }
}

#[async_trait]
impl LabelStore for KubeLabelStore {
    async fn list_sources(&self, target: &TargetKey) -> Result<Vec<Source>> {
        let list = self
            .sources(target.name())
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error("list_sources", NAMESPACE_KIND, target.name(), e))?;

        Ok(list
            .items
            .iter()
            .filter_map(|object| {
                let source = object.to_source();
                if source.is_none() {
                    warn!(name = %object.name_any(), "Ignoring NamespaceLabel without namespace");
                }
                source
            })
            .collect())
    }

    async fn get_target(&self, target: &TargetKey) -> Result<Target> {
        let namespace = self
            .namespaces()
            .get(target.name())
            .await
            .map_err(|e| map_kube_error("get_target", NAMESPACE_KIND, target.name(), e))?;

        Ok(Target {
            name: namespace.name_any(),
            labels: namespace.metadata.labels,
            resource_version: namespace.metadata.resource_version,
        })
    }

    async fn update_target(&self, target: &Target) -> Result<()> {
        let api = self.namespaces();
        let mut namespace = api
            .get(&target.name)
            .await
            .map_err(|e| map_kube_error("update_target", NAMESPACE_KIND, &target.name, e))?;

        // Replace against the version the labels were computed from.
        namespace.metadata.labels.clone_from(&target.labels);
        namespace
            .metadata
            .resource_version
            .clone_from(&target.resource_version);

        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        api.replace(&target.name, &params, &namespace)
            .await
            .map_err(|e| map_kube_error("update_target", NAMESPACE_KIND, &target.name, e))?;
        Ok(())
    }

    async fn update_source_status(&self, source: &Source) -> Result<()> {
        let api = self.sources(&source.namespace);
        let name = source.to_string();
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };

        let live = api
            .get(&source.name)
            .await
            .map_err(|e| map_kube_error("update_source_status", SOURCE_KIND, &name, e))?;
        if let Some(patch) = finalizer_patch(&live, source) {
            api.patch(&source.name, &params, &Patch::Merge(&patch))
                .await
                .map_err(|e| map_kube_error("update_source_status", SOURCE_KIND, &name, e))?;
        }

        // A deleting object may already be gone once its finalizers are cleared.
        if source.is_deleting() {
            return Ok(());
        }

        let status = json!({ "status": NamespaceLabelStatus::from_source_status(&source.status) });
        api.patch_status(&source.name, &params, &Patch::Merge(&status))
            .await
            .map_err(|e| map_kube_error("update_source_status", SOURCE_KIND, &name, e))?;
        Ok(())
    }

    async fn perform_cleanup(&self, source: &Source) -> Result<()> {
        // The convergence pass that follows reclaims the keys this source
        // contributed, so there is nothing else to revert.
        debug!(source = %source, "Nothing to clean up beyond reclaiming labels");
        Ok(())
    }
}

/// Merge patch moving `live` to `desired`'s membership of [`FINALIZER`].
///
/// Finalizers owned by other controllers are kept as the API server has
/// them. `None` when membership already matches. The patch carries the live
/// `resourceVersion`, so a concurrent edit is rejected with 409.
fn finalizer_patch(live: &NamespaceLabel, desired: &Source) -> Option<serde_json::Value> {
    let current = live.finalizers();
    let want = desired.has_finalizer(FINALIZER);
    if current.iter().any(|f| f == FINALIZER) == want {
        return None;
    }

    let mut finalizers: Vec<&str> = current
        .iter()
        .map(String::as_str)
        .filter(|f| *f != FINALIZER)
        .collect();
    if want {
        finalizers.push(FINALIZER);
    }
    Some(json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": live.resource_version(),
        }
    }))
}
