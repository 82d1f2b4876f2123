use super::orchestrator::RolloutError;
use crate::cluster::{ClusterApi, WorkloadEvent};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use std::time::Duration;
use tracing::{debug, info, warn};

/// (ready, desired) replica counts from a Deployment's observed status
pub fn replica_counts(deployment: &Deployment) -> (Option<i32>, Option<i32>) {
    deployment
        .status
        .as_ref()
        .map(|s| (s.ready_replicas, s.replicas))
        .unwrap_or((None, None))
}

/// True once both counts are reported and ready >= desired
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    matches!(replica_counts(deployment), (Some(ready), Some(desired)) if ready >= desired)
}

/// Block until the named Deployment reports all replicas ready
///
/// Subscribes to Deployment changes in `namespace` and returns the first
/// observed state of `name` that is ready. There is no deadline here; see
/// [`await_ready_within`].
///
/// # Errors
/// - `Watch` if the subscription fails
/// - `WatchClosed` if the feed ends before readiness was observed
/// - `DeletedWhileWaiting` if the Deployment disappears
pub async fn await_ready(
    cluster: &dyn ClusterApi,
    name: &str,
    namespace: &str,
) -> Result<Deployment, RolloutError> {
    let mut events = cluster.watch_deployments(namespace);

    while let Some(event) = events.next().await {
        let event = event.map_err(|source| RolloutError::Watch {
            name: name.to_string(),
            source,
        })?;

        match event {
            WorkloadEvent::Applied(d) if d.metadata.name.as_deref() == Some(name) => {
                let (ready, desired) = replica_counts(&d);
                info!(
                    deployment = ?name,
                    ready = ?ready,
                    desired = ?desired,
                    "Deployment replicas ready"
                );
                if is_deployment_ready(&d) {
                    info!(deployment = ?name, "Deployment ready");
                    debug!(deployment = ?d, "Ready deployment");
                    return Ok(d);
                }
            }
            WorkloadEvent::Deleted(d) if d.metadata.name.as_deref() == Some(name) => {
                warn!(deployment = ?name, "Deployment deleted while waiting for readiness");
                return Err(RolloutError::DeletedWhileWaiting(name.to_string()));
            }
            _ => {}
        }
    }

    Err(RolloutError::WatchClosed(name.to_string()))
}

/// [`await_ready`] bounded by an optional deadline
pub async fn await_ready_within(
    cluster: &dyn ClusterApi,
    name: &str,
    namespace: &str,
    timeout: Option<Duration>,
) -> Result<Deployment, RolloutError> {
    match timeout {
        None => await_ready(cluster, name, namespace).await,
        Some(timeout) => tokio::time::timeout(timeout, await_ready(cluster, name, namespace))
            .await
            .map_err(|_| {
                warn!(deployment = ?name, timeout = ?timeout, "Readiness deadline exceeded");
                RolloutError::ReadinessTimeout {
                    name: name.to_string(),
                    timeout,
                }
            })?,
    }
}
