use super::orchestrator::{Lookup, RolloutError};
use crate::cluster::{ClusterApi, ListFilter, ResourceKind};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, error};

fn not_found(kind: ResourceKind, lookup: Lookup, namespace: &str) -> RolloutError {
    RolloutError::NotFound {
        kind,
        lookup,
        namespace: namespace.to_string(),
    }
}

/// Get the Deployment with the given name
///
/// # Errors
/// - `NotFound` if no Deployment has this name
/// - `Api` if the list call fails
pub async fn find_deployment(
    cluster: &dyn ClusterApi,
    name: &str,
    namespace: &str,
) -> Result<Deployment, RolloutError> {
    let items = cluster
        .list_deployments(namespace, &ListFilter::by_name(name))
        .await
        .inspect_err(|e| error!(error = %e, deployment = ?name, "Failed to list deployments"))?;
    debug!(deployment = ?name, found = items.len(), "Deployments found");

    // metadata.name is unique per namespace, so there is at most one
    items.into_iter().next().ok_or_else(|| {
        not_found(
            ResourceKind::Deployment,
            Lookup::Name(name.to_string()),
            namespace,
        )
    })
}

/// List the Deployments matching a label selector
///
/// Order is whatever the API server returns.
pub async fn find_deployments(
    cluster: &dyn ClusterApi,
    selector: &str,
    namespace: &str,
) -> Result<Vec<Deployment>, RolloutError> {
    let items = cluster
        .list_deployments(namespace, &ListFilter::by_selector(selector))
        .await
        .inspect_err(|e| error!(error = %e, selector = ?selector, "Failed to list deployments"))?;
    debug!(selector = ?selector, found = items.len(), "Deployments found");

    if items.is_empty() {
        return Err(not_found(
            ResourceKind::Deployment,
            Lookup::Selector(selector.to_string()),
            namespace,
        ));
    }
    Ok(items)
}

pub async fn find_service(
    cluster: &dyn ClusterApi,
    name: &str,
    namespace: &str,
) -> Result<Service, RolloutError> {
    let items = cluster
        .list_services(namespace, &ListFilter::by_name(name))
        .await
        .inspect_err(|e| error!(error = %e, service = ?name, "Failed to list services"))?;

    items.into_iter().next().ok_or_else(|| {
        not_found(
            ResourceKind::Service,
            Lookup::Name(name.to_string()),
            namespace,
        )
    })
}

pub async fn find_services(
    cluster: &dyn ClusterApi,
    selector: &str,
    namespace: &str,
) -> Result<Vec<Service>, RolloutError> {
    let items = cluster
        .list_services(namespace, &ListFilter::by_selector(selector))
        .await
        .inspect_err(|e| error!(error = %e, selector = ?selector, "Failed to list services"))?;
    debug!(selector = ?selector, found = items.len(), "Services found");

    if items.is_empty() {
        return Err(not_found(
            ResourceKind::Service,
            Lookup::Selector(selector.to_string()),
            namespace,
        ));
    }
    Ok(items)
}
