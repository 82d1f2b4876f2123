use super::locator::find_service;
use super::naming::VERSION_LABEL;
use super::orchestrator::RolloutError;
use crate::cluster::ClusterApi;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info};

/// Merge patch pointing a Service selector at one version
///
/// Only the `patch` key is written; every other selector key is left alone.
pub fn selector_patch(version: &str) -> serde_json::Value {
    serde_json::json!({
        "spec": {
            "selector": {
                (VERSION_LABEL): version
            }
        }
    })
}

/// Shift a Service's traffic to the pods labelled `patch={version}`
///
/// Re-fetches the Service first so a concurrent deletion surfaces as
/// `NotFound` rather than a failed patch.
pub async fn cutover_service(
    cluster: &dyn ClusterApi,
    name: &str,
    namespace: &str,
    version: &str,
) -> Result<Service, RolloutError> {
    let current = find_service(cluster, name, namespace).await?;
    let previous = current
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .and_then(|s| s.get(VERSION_LABEL))
        .cloned();

    info!(
        service = ?name,
        from = ?previous,
        to = %version,
        "Patching service selector"
    );

    let patched = cluster
        .patch_service(namespace, &current.name_any(), &selector_patch(version))
        .await?;

    debug!(service = ?patched, "Patched service");
    Ok(patched)
}
