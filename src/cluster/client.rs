use super::{ClusterApi, ClusterError, ListFilter, ResourceKind, WorkloadEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher;
use kube::Client;
use std::path::Path;
use tracing::{debug, info};

/// Build a Kubernetes client
///
/// Uses the given kubeconfig file when provided, otherwise kube's inferred
/// configuration (in-cluster service account, then `KUBECONFIG` or
/// `~/.kube/config`).
pub async fn build_client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    // kube's rustls transport needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    match kubeconfig {
        Some(path) => {
            info!(path = %path.display(), "Loading Kubernetes configuration from file");
            let kubeconfig = Kubeconfig::read_from(path)?;
            let config =
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await?;
            Ok(Client::try_from(config)?)
        }
        None => {
            debug!("No kubeconfig given, inferring Kubernetes configuration");
            Ok(Client::try_default().await?)
        }
    }
}

/// [`ClusterApi`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        KubeCluster { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn list_params(filter: &ListFilter) -> ListParams {
    let mut params = ListParams::default();
    if let Some(name) = &filter.name {
        params = params.fields(&format!("metadata.name={}", name));
    }
    if let Some(selector) = &filter.label_selector {
        params = params.labels(selector);
    }
    params
}

fn map_kube_error(e: kube::Error, kind: ResourceKind, name: &str, namespace: &str) -> ClusterError {
    match e {
        kube::Error::Api(err) if err.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
        },
        other => ClusterError::Kube(other),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_deployments(
        &self,
        namespace: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Deployment>, ClusterError> {
        let list = self.deployments(namespace).list(&list_params(filter)).await?;
        Ok(list.items)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        Ok(self
            .deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await?)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError> {
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_kube_error(e, ResourceKind::Deployment, name, namespace))
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.deployments(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(e, ResourceKind::Deployment, name, namespace))?;
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Service>, ClusterError> {
        let list = self.services(namespace).list(&list_params(filter)).await?;
        Ok(list.items)
    }

    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service, ClusterError> {
        self.services(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_kube_error(e, ResourceKind::Service, name, namespace))
    }

    fn watch_deployments(
        &self,
        namespace: &str,
    ) -> BoxStream<'static, Result<WorkloadEvent, ClusterError>> {
        // No backoff: a failing watch surfaces to the caller instead of retrying
        // This includes a 410 desync, so a routine relist also ends the readiness wait
        watcher(self.deployments(namespace), watcher::Config::default())
            .filter_map(|event| async move {
                match event {
                    Ok(watcher::Event::Apply(d)) | Ok(watcher::Event::InitApply(d)) => {
                        Some(Ok(WorkloadEvent::Applied(d)))
                    }
                    Ok(watcher::Event::Delete(d)) => Some(Ok(WorkloadEvent::Deleted(d))),
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(ClusterError::Watch(e))),
                }
            })
            .boxed()
    }
}
