//! Controller runtime: watches NamespaceLabels and reconciles their
//! namespaces.
//!
//! Every event is turned into a reconciliation of the object's namespace, so
//! all NamespaceLabels of one namespace share a single pass. Passes for the
//! same namespace are serialized; different namespaces run concurrently.
//! Changes to a Namespace itself also trigger a pass, which reverts drift on
//! its managed labels.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::controller::Action;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{Controller, watcher};
use kube::{Api, Client, ResourceExt};
use nslabel_core::TargetKey;
use nslabel_reconciler::{Reconciler, ReconcilerBuilder};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::crd::NamespaceLabel;
use crate::error::OperatorError;
use crate::events::KubeEventRecorder;
use crate::store::KubeLabelStore;

/// Name reported on published events.
pub const CONTROLLER_NAME: &str = "nslabel-controller";

/// Shared state handed to every reconciliation.
pub struct Context {
    reconciler: Reconciler,
    cancel: CancellationToken,
    error_requeue: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Context {
    pub fn new(reconciler: Reconciler, cancel: CancellationToken, error_requeue: Duration) -> Self {
        Self {
            reconciler,
            cancel,
            error_requeue,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, namespace: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(namespace.to_string()).or_default())
    }

    /// Drop the namespace's lock once no other reconcile holds or awaits it.
    async fn release(&self, namespace: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(namespace);
        }
    }
}

/// Reconcile the namespace `object` lives in.
///
/// # Errors
///
/// Returns an error if the object has no namespace or the pass fails.
#[instrument(skip_all, fields(object = %object.name_any()))]
pub async fn reconcile(object: Arc<NamespaceLabel>, ctx: Arc<Context>) -> Result<Action, OperatorError> {
    let namespace = object
        .namespace()
        .ok_or_else(|| OperatorError::missing_namespace(object.name_any()))?;

    let lock = ctx.lock_for(&namespace).await;
    let guard = lock.lock().await;
    let result = ctx
        .reconciler
        .reconcile(&TargetKey::new(namespace.clone()), &ctx.cancel)
        .await;
    drop(guard);
    ctx.release(&namespace, lock).await;

    result?;
    Ok(Action::await_change())
}

/// Requeue a failed object after the configured delay.
pub fn error_policy(object: Arc<NamespaceLabel>, error: &OperatorError, ctx: Arc<Context>) -> Action {
    warn!(
        object = %object.name_any(),
        namespace = ?object.namespace(),
        reason = error.reason(),
        %error,
        "Reconciliation failed"
    );
    Action::requeue(ctx.error_requeue)
}

/// One NamespaceLabel of `namespace`, if any, to stand in for the namespace.
fn representative(index: &Store<NamespaceLabel>, namespace: &str) -> Option<ObjectRef<NamespaceLabel>> {
    index
        .state()
        .into_iter()
        .find(|object| object.namespace().as_deref() == Some(namespace))
        .map(|object| ObjectRef::from_obj(object.as_ref()))
}

/// Build the reconciler for a live cluster.
///
/// # Errors
///
/// Returns an error if the configuration is rejected by the builder.
pub fn build_reconciler(client: &Client, config: &OperatorConfig) -> Result<Reconciler, OperatorError> {
    let instance = std::env::var("HOSTNAME").ok();
    let reconciler = ReconcilerBuilder::new()
        .with_store(Arc::new(KubeLabelStore::new(client.clone())))
        .with_recorder(Arc::new(KubeEventRecorder::new(
            client.clone(),
            CONTROLLER_NAME,
            instance,
        )))
        .with_protected(config.protected_keys())
        .with_config(config.reconciler_config())
        .build()?;
    Ok(reconciler)
}

/// Run the controller until `shutdown` resolves.
///
/// `cancel` is handed to every reconciliation so in-flight API calls stop
/// when it fires.
///
/// # Errors
///
/// Returns an error if the reconciler cannot be built.
pub async fn run<F>(
    client: Client,
    config: &OperatorConfig,
    cancel: CancellationToken,
    shutdown: F,
) -> Result<(), OperatorError>
where
    F: Future<Output = ()> + Send + Sync + 'static,
{
    let reconciler = build_reconciler(&client, config)?;
    info!(
        protected = %reconciler.protected(),
        status_concurrency = config.status_concurrency,
        "Starting controller"
    );
    let context = Arc::new(Context::new(reconciler, cancel, config.error_requeue()));

    let controller = Controller::new(
        Api::<NamespaceLabel>::all(client.clone()),
        watcher::Config::default(),
    );
    let index = controller.store();

    controller
        .watches(
            Api::<Namespace>::all(client),
            watcher::Config::default(),
            move |namespace| representative(&index, &namespace.name_any()),
        )
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(%object, "Reconciled"),
                Err(error) => debug!(%error, "Controller reported an error"),
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}
