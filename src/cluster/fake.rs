//! In-memory cluster for unit tests
//!
//! Stores Deployments and Services, records every mutating call, and scripts
//! the watch feed so a freshly created Deployment reports its ready replicas
//! climbing from zero to the desired count.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{ClusterApi, ClusterError, ListFilter, ResourceKind, WorkloadEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// A mutating call issued against the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateDeployment(String),
    PatchDeployment(String),
    DeleteDeployment(String),
    PatchService(String),
}

#[derive(Default)]
struct State {
    deployments: Vec<Deployment>,
    services: Vec<Service>,
    calls: Vec<Call>,
    next_resource_version: u64,
    fail_create: HashSet<String>,
    fail_patch_service: HashSet<String>,
    never_ready: HashSet<String>,
    deleted_while_waiting: HashSet<String>,
    watch_fails: bool,
    watch_silent: bool,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.state.lock().unwrap().deployments.push(deployment);
        self
    }

    pub fn with_service(self, service: Service) -> Self {
        self.state.lock().unwrap().services.push(service);
        self
    }

    /// Creating a Deployment whose name starts with `prefix` fails
    pub fn fail_create_for(self, prefix: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_create
            .insert(prefix.to_string());
        self
    }

    pub fn fail_patch_service(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_patch_service
            .insert(name.to_string());
        self
    }

    /// Deployments whose name starts with `prefix` never report readiness
    pub fn never_ready_for(self, prefix: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .never_ready
            .insert(prefix.to_string());
        self
    }

    /// Deployments whose name starts with `prefix` are deleted after the
    /// first ready-replica update
    pub fn deleted_while_waiting_for(self, prefix: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .deleted_while_waiting
            .insert(prefix.to_string());
        self
    }

    pub fn with_failing_watch(self) -> Self {
        self.state.lock().unwrap().watch_fails = true;
        self
    }

    /// Watch feed stays open without ever yielding
    pub fn with_silent_watch(self) -> Self {
        self.state.lock().unwrap().watch_silent = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn deployment_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .iter()
            .filter_map(|d| d.metadata.name.clone())
            .collect()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .iter()
            .find(|d| d.metadata.name.as_deref() == Some(name))
            .cloned()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state
            .lock()
            .unwrap()
            .services
            .iter()
            .find(|s| s.metadata.name.as_deref() == Some(name))
            .cloned()
    }

    pub fn remove_service(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .services
            .retain(|s| s.metadata.name.as_deref() != Some(name));
    }
}

/// Equality-based selector matching (`a=b,c==d,e!=f,g`)
pub fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                let value = value.trim_start_matches('=');
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

fn filter_matches(filter: &ListFilter, meta: &ObjectMeta) -> bool {
    let name_ok = filter
        .name
        .as_ref()
        .map(|n| meta.name.as_ref() == Some(n))
        .unwrap_or(true);
    let labels_ok = filter
        .label_selector
        .as_ref()
        .map(|s| selector_matches(s, meta.labels.as_ref()))
        .unwrap_or(true);
    name_ok && labels_ok
}

/// RFC 7386 JSON merge patch
fn merge(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if let serde_json::Value::Object(patch_map) = patch {
        if !target.is_object() {
            *target = serde_json::Value::Object(serde_json::Map::new());
        }
        let target_map = target.as_object_mut().unwrap();
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge(
                    target_map
                        .entry(key.clone())
                        .or_insert(serde_json::Value::Null),
                    value,
                );
            }
        }
    } else {
        *target = patch.clone();
    }
}

fn apply_patch<T>(object: &T, patch: &serde_json::Value) -> Result<T, ClusterError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut value =
        serde_json::to_value(object).map_err(|e| ClusterError::Request(e.to_string()))?;
    merge(&mut value, patch);
    serde_json::from_value(value).map_err(|e| ClusterError::Request(e.to_string()))
}

fn starts_with_any(set: &HashSet<String>, name: &str) -> bool {
    set.iter().any(|prefix| name.starts_with(prefix.as_str()))
}

fn with_status(deployment: &Deployment, replicas: i32, ready: Option<i32>) -> Deployment {
    let mut d = deployment.clone();
    d.status = Some(DeploymentStatus {
        replicas: Some(replicas),
        ready_replicas: ready,
        ..Default::default()
    });
    d
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_deployments(
        &self,
        _namespace: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Deployment>, ClusterError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .deployments
            .iter()
            .filter(|d| filter_matches(filter, &d.metadata))
            .cloned()
            .collect())
    }

    async fn create_deployment(
        &self,
        _namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let name = deployment.metadata.name.clone().unwrap_or_default();
        state.calls.push(Call::CreateDeployment(name.clone()));

        if starts_with_any(&state.fail_create, &name) {
            return Err(ClusterError::Request(format!(
                "admission webhook denied deployment '{}'",
                name
            )));
        }
        if deployment.metadata.resource_version.is_some() {
            return Err(ClusterError::Request(
                "resourceVersion should not be set on objects to be created".to_string(),
            ));
        }
        if state
            .deployments
            .iter()
            .any(|d| d.metadata.name.as_deref() == Some(name.as_str()))
        {
            return Err(ClusterError::Request(format!(
                "deployments.apps \"{}\" already exists",
                name
            )));
        }

        state.next_resource_version += 1;
        let mut created = deployment.clone();
        created.metadata.resource_version = Some(state.next_resource_version.to_string());
        state.deployments.push(created.clone());
        Ok(created)
    }

    async fn patch_deployment(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Deployment, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::PatchDeployment(name.to_string()));
        let Some(index) = state
            .deployments
            .iter()
            .position(|d| d.metadata.name.as_deref() == Some(name))
        else {
            return Err(ClusterError::NotFound {
                kind: ResourceKind::Deployment,
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        };
        let patched = apply_patch(&state.deployments[index], patch)?;
        state.deployments[index] = patched.clone();
        Ok(patched)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteDeployment(name.to_string()));
        let before = state.deployments.len();
        state
            .deployments
            .retain(|d| d.metadata.name.as_deref() != Some(name));
        if state.deployments.len() == before {
            return Err(ClusterError::NotFound {
                kind: ResourceKind::Deployment,
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }
        Ok(())
    }

    async fn list_services(
        &self,
        _namespace: &str,
        filter: &ListFilter,
    ) -> Result<Vec<Service>, ClusterError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .iter()
            .filter(|s| filter_matches(filter, &s.metadata))
            .cloned()
            .collect())
    }

    async fn patch_service(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<Service, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::PatchService(name.to_string()));
        if state.fail_patch_service.contains(name) {
            return Err(ClusterError::Request(format!(
                "connection reset while patching service '{}'",
                name
            )));
        }
        let Some(index) = state
            .services
            .iter()
            .position(|s| s.metadata.name.as_deref() == Some(name))
        else {
            return Err(ClusterError::NotFound {
                kind: ResourceKind::Service,
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        };
        let patched = apply_patch(&state.services[index], patch)?;
        state.services[index] = patched.clone();
        Ok(patched)
    }

    fn watch_deployments(
        &self,
        _namespace: &str,
    ) -> BoxStream<'static, Result<WorkloadEvent, ClusterError>> {
        let state = self.state.lock().unwrap();
        if state.watch_fails {
            return futures::stream::iter(vec![Err(ClusterError::Request(
                "watch connection refused".to_string(),
            ))])
            .boxed();
        }
        if state.watch_silent {
            return futures::stream::pending().boxed();
        }

        let mut events = Vec::new();
        for d in &state.deployments {
            let name = d.metadata.name.clone().unwrap_or_default();
            // Deployments that already report a status are replayed as-is
            if d.status.is_some() {
                events.push(Ok(WorkloadEvent::Applied(d.clone())));
                continue;
            }
            let desired = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            events.push(Ok(WorkloadEvent::Applied(with_status(d, desired, None))));
            if starts_with_any(&state.deleted_while_waiting, &name) {
                events.push(Ok(WorkloadEvent::Applied(with_status(d, desired, Some(0)))));
                events.push(Ok(WorkloadEvent::Deleted(with_status(d, desired, Some(0)))));
                continue;
            }
            let last_ready = if starts_with_any(&state.never_ready, &name) {
                desired - 1
            } else {
                desired
            };
            for ready in 0..=last_ready {
                events.push(Ok(WorkloadEvent::Applied(with_status(
                    d,
                    desired,
                    Some(ready),
                ))));
            }
        }
        futures::stream::iter(events).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_equality_terms() {
        let labels: BTreeMap<String, String> = [
            ("app".to_string(), "my-app".to_string()),
            ("tier".to_string(), "web".to_string()),
        ]
        .into_iter()
        .collect();

        assert!(selector_matches("app=my-app", Some(&labels)));
        assert!(selector_matches("app==my-app,tier=web", Some(&labels)));
        assert!(selector_matches("app=my-app,tier!=db", Some(&labels)));
        assert!(selector_matches("tier", Some(&labels)));
        assert!(!selector_matches("app=other", Some(&labels)));
        assert!(!selector_matches("app=my-app", None));
    }

    #[test]
    fn test_merge_patch_sets_and_removes_keys() {
        let mut target = serde_json::json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge(
            &mut target,
            &serde_json::json!({"a": {"b": 10, "c": null}, "e": "x"}),
        );
        assert_eq!(target, serde_json::json!({"a": {"b": 10}, "d": 3, "e": "x"}));
    }
}
