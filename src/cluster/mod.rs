//! Cluster API seam
//!
//! The rollout core talks to Kubernetes only through [`ClusterApi`], so the
//! orchestration logic can run against the real API server (`KubeCluster`) or
//! against the in-memory `FakeCluster` in unit tests.

mod client;
#[cfg(test)]
pub mod fake;

pub use client::{build_client, KubeCluster};

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use std::fmt;
use thiserror::Error;

/// Kind of resource the orchestrator manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Deployment,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Deployment => write!(f, "deployment"),
            ResourceKind::Service => write!(f, "service"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: ResourceKind,
        name: String,
        namespace: String,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch stream failed: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    #[error("request failed: {0}")]
    Request(String),
}

/// Filter for list calls
///
/// `name` becomes a `metadata.name` field selector, `label_selector` is passed
/// through verbatim (e.g. `app=my-app`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub name: Option<String>,
    pub label_selector: Option<String>,
}

impl ListFilter {
    pub fn by_name(name: &str) -> Self {
        ListFilter {
            name: Some(name.to_string()),
            label_selector: None,
        }
    }

    pub fn by_selector(selector: &str) -> Self {
        ListFilter {
            name: None,
            label_selector: Some(selector.to_string()),
        }
    }
}

/// A change notification for a Deployment
#[derive(Debug, Clone)]
pub enum WorkloadEvent {
    /// Added or modified (including the initial listing)
    Applied(Deployment),
    Deleted(Deployment),
}

/// Operations the rollout core needs from the cluster, scoped by namespace
///
/// Patches are JSON merge patches.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_deployments(
        &self,
        namespace: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Deployment>, ClusterError>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError>;

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError>;

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn list_services(
        &self,
        namespace: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Service>, ClusterError>;

    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service, ClusterError>;

    /// Subscribe to Deployment changes in `namespace`
    ///
    /// The stream is unbounded; it only ends when the underlying connection
    /// is closed for good.
    fn watch_deployments(
        &self,
        namespace: &str,
    ) -> BoxStream<'static, Result<WorkloadEvent, ClusterError>>;
}
