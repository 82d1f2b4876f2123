use super::locator::{find_deployment, find_deployments, find_services};
use super::naming::version_timestamp;
use super::readiness::await_ready_within;
use super::replicaset::{duplicate_deployment, restart_patch};
use super::traffic::cutover_service;
use super::validation::{
    check_services_have_selectors, check_unique_base_names, validate_label_selector,
};
use crate::cluster::{ClusterApi, ClusterError, ResourceKind};
use crate::config::RolloutConfig;
use crate::controller::clock::Clock;
use futures::stream::{FuturesUnordered, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How a resource was looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Name(String),
    Selector(String),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Name(name) => write!(f, "'{}'", name),
            Lookup::Selector(selector) => write!(f, "with label '{}'", selector),
        }
    }
}

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("Could not find {kind} {lookup} in namespace '{namespace}'")]
    NotFound {
        kind: ResourceKind,
        lookup: Lookup,
        namespace: String,
    },

    #[error(
        "Cannot duplicate Deployment '{conflicting}': base name '{base_name}' is not unique, \
         Deployment '{existing}' has the same base name"
    )]
    BasenameConflict {
        conflicting: String,
        existing: String,
        base_name: String,
    },

    #[error("Service '{0}' has no selector and cannot be cut over")]
    ServiceWithoutSelector(String),

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[source] ClusterError),

    #[error("Readiness watch for Deployment '{name}' failed: {source}")]
    Watch {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("Readiness watch for Deployment '{0}' closed before it became ready")]
    WatchClosed(String),

    #[error("Deployment '{0}' was deleted while waiting for it to become ready")]
    DeletedWhileWaiting(String),

    #[error("Deployment '{name}' not ready after {timeout:?}")]
    ReadinessTimeout { name: String, timeout: Duration },
}

impl From<ClusterError> for RolloutError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotFound {
                kind,
                name,
                namespace,
            } => RolloutError::NotFound {
                kind,
                lookup: Lookup::Name(name),
                namespace,
            },
            other => RolloutError::Api(other),
        }
    }
}

/// Phases of a smart rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutPhase {
    Discovering,
    Validating,
    Duplicating,
    Waiting,
    Cutover,
    Cleanup,
    Done,
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A superseded Deployment and the generation that replaced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub old: String,
    pub new: String,
}

/// Outcome of a successful smart rollout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutReport {
    pub version: String,
    pub selector: String,
    pub namespace: String,
    pub replacements: Vec<Replacement>,
    pub services: Vec<String>,
    pub deleted: Vec<String>,
}

/// Everything an orchestration run needs, injected by the caller
pub struct Context {
    pub cluster: Arc<dyn ClusterApi>,
    pub clock: Arc<dyn Clock>,
    pub config: RolloutConfig,
}

impl Context {
    pub fn new(cluster: Arc<dyn ClusterApi>, clock: Arc<dyn Clock>, config: RolloutConfig) -> Self {
        Context {
            cluster,
            clock,
            config,
        }
    }
}

/// Restart every pod of a Deployment using its own update strategy
pub async fn restart_by_name(
    ctx: &Context,
    name: &str,
    namespace: &str,
) -> Result<Deployment, RolloutError> {
    let deployment = find_deployment(ctx.cluster.as_ref(), name, namespace).await?;
    let patch = restart_patch(ctx.clock.now());
    debug!(deployment = ?name, patch = %patch, "Restart patch");

    let patched = ctx
        .cluster
        .patch_deployment(namespace, &deployment.name_any(), &patch)
        .await?;

    info!(deployment = ?name, namespace = ?namespace, "Deployment restarted");
    Ok(patched)
}

/// Create a new, inert generation of a Deployment next to the existing one
///
/// No readiness wait, no Service cutover, no cleanup.
pub async fn duplicate_by_name(
    ctx: &Context,
    name: &str,
    namespace: &str,
) -> Result<Deployment, RolloutError> {
    debug!(deployment = ?name, namespace = ?namespace, "Looking for deployment");
    let existing = find_deployment(ctx.cluster.as_ref(), name, namespace).await?;

    let version = version_timestamp(ctx.clock.now());
    let copy = duplicate_deployment(&existing, &version);
    info!(
        deployment = ?name,
        copy = ?copy.name_any(),
        namespace = ?namespace,
        "Creating copy of deployment"
    );

    let created = ctx
        .cluster
        .create_deployment(namespace, &copy)
        .await
        .map_err(|e| {
            error!(error = %e, deployment = ?copy.name_any(), "Failed to create deployment copy");
            RolloutError::from(e)
        })?;

    info!(deployment = ?name, copy = ?created.name_any(), "Copy of deployment created");
    Ok(created)
}

/// Zero-downtime replacement of every Deployment under `selector`
///
/// Discovering → Validating → (Duplicating → Waiting)* → Cutover → Cleanup? → Done
///
/// Nothing is mutated before validation passes. A failure while duplicating or
/// waiting leaves the new Deployments in place and every Service untouched;
/// no compensating action is taken.
pub async fn trigger_smart_rollout(
    ctx: &Context,
    selector: &str,
    namespace: &str,
    cleanup: bool,
) -> Result<RolloutReport, RolloutError> {
    validate_label_selector(selector)?;

    enter(RolloutPhase::Discovering, selector, namespace);
    let deployments = find_deployments(ctx.cluster.as_ref(), selector, namespace).await?;
    let services = find_services(ctx.cluster.as_ref(), selector, namespace).await?;
    for d in &deployments {
        info!(deployment = ?d.name_any(), "Deployment found");
    }
    for s in &services {
        info!(service = ?s.name_any(), "Service found");
    }

    enter(RolloutPhase::Validating, selector, namespace);
    check_unique_base_names(&deployments).inspect_err(|e| {
        error!(error = %e, "Error checking deployments");
    })?;
    check_services_have_selectors(&services)?;

    let version = version_timestamp(ctx.clock.now());
    info!(version = %version, "Rolling out new version");

    enter(RolloutPhase::Duplicating, selector, namespace);
    let replacements = if ctx.config.parallel {
        roll_out_parallel(ctx, &deployments, namespace, &version).await?
    } else {
        let mut replacements = Vec::with_capacity(deployments.len());
        for d in &deployments {
            replacements.push(roll_out_one(ctx, d, namespace, &version).await?);
        }
        replacements
    };

    enter(RolloutPhase::Cutover, selector, namespace);
    let mut cut_over = Vec::with_capacity(services.len());
    for s in &services {
        let name = s.name_any();
        cutover_service(ctx.cluster.as_ref(), &name, namespace, &version).await?;
        cut_over.push(name);
    }

    let mut deleted = Vec::new();
    if cleanup {
        enter(RolloutPhase::Cleanup, selector, namespace);
        for d in &deployments {
            let name = d.name_any();
            info!(deployment = ?name, "Deleting old deployment");
            ctx.cluster.delete_deployment(namespace, &name).await?;
            deleted.push(name);
        }
    } else {
        info!("Cleanup disabled, old deployments stay in place");
    }

    enter(RolloutPhase::Done, selector, namespace);
    Ok(RolloutReport {
        version,
        selector: selector.to_string(),
        namespace: namespace.to_string(),
        replacements,
        services: cut_over,
        deleted,
    })
}

fn enter(phase: RolloutPhase, selector: &str, namespace: &str) {
    info!(phase = %phase, selector = ?selector, namespace = ?namespace, "Smart rollout");
}

/// Duplicate, create, and wait for one Deployment
async fn roll_out_one(
    ctx: &Context,
    existing: &Deployment,
    namespace: &str,
    version: &str,
) -> Result<Replacement, RolloutError> {
    let old = existing.name_any();
    let copy = duplicate_deployment(existing, version);
    let new = copy.name_any();

    info!(deployment = ?old, copy = ?new, "Creating duplicate for deployment");
    ctx.cluster.create_deployment(namespace, &copy).await?;

    info!(phase = %RolloutPhase::Waiting, deployment = ?new, "Waiting for deployment to become ready");
    await_ready_within(
        ctx.cluster.as_ref(),
        &new,
        namespace,
        ctx.config.readiness_timeout,
    )
    .await?;

    Ok(Replacement { old, new })
}

/// Run [`roll_out_one`] for every Deployment concurrently
///
/// The first failing branch ends the batch: the other branches are dropped,
/// which only stops their readiness waits. Copies they already created stay.
/// Replacements are returned in input order.
async fn roll_out_parallel(
    ctx: &Context,
    deployments: &[Deployment],
    namespace: &str,
    version: &str,
) -> Result<Vec<Replacement>, RolloutError> {
    let mut branches: FuturesUnordered<_> = deployments
        .iter()
        .enumerate()
        .map(|(i, d)| async move { (i, roll_out_one(ctx, d, namespace, version).await) })
        .collect();

    let mut done = Vec::with_capacity(deployments.len());
    while let Some((i, result)) = branches.next().await {
        match result {
            Ok(r) => done.push((i, r)),
            Err(e) => {
                warn!(
                    error = %e,
                    abandoned = branches.len(),
                    "Deployment rollout branch failed, abandoning the others"
                );
                return Err(e);
            }
        }
    }

    done.sort_by_key(|(i, _)| *i);
    Ok(done.into_iter().map(|(_, r)| r).collect())
}
