use super::naming::{base_name, versioned_name, RESTARTED_AT_ANNOTATION, VERSION_LABEL};
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

/// Build the next generation of a Deployment
///
/// The copy:
/// - is named `{base-name}-{timestamp}`
/// - carries `patch={timestamp}` on its own labels and on its pod template
///   labels (the latter is what Services select on)
/// - has its server-populated identity cleared (resourceVersion, uid,
///   creationTimestamp, generation, managedFields) and no status, so the API
///   server accepts it as a new object
///
/// Everything else (containers, replicas, strategy, resources, selector) is
/// copied unchanged. The input is never modified.
pub fn duplicate_deployment(existing: &Deployment, timestamp: &str) -> Deployment {
    let mut copy = existing.clone();
    let existing_name = existing.name_any();

    copy.metadata.name = Some(versioned_name(base_name(&existing_name), timestamp));
    copy.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(VERSION_LABEL.to_string(), timestamp.to_string());

    copy.metadata.resource_version = None;
    copy.metadata.uid = None;
    copy.metadata.creation_timestamp = None;
    copy.metadata.generation = None;
    copy.metadata.managed_fields = None;
    copy.status = None;

    if let Some(spec) = copy.spec.as_mut() {
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(Default::default)
            .insert(VERSION_LABEL.to_string(), timestamp.to_string());
    }

    copy
}

/// Merge patch that restarts every pod of a Deployment
///
/// Changing a pod template annotation makes the Deployment controller roll
/// all pods using the Deployment's own update strategy.
pub fn restart_patch(now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        (RESTARTED_AT_ANNOTATION): now.to_rfc3339_opts(SecondsFormat::Secs, true)
                    }
                }
            }
        }
    })
}
