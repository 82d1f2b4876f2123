use super::naming::base_name;
use super::orchestrator::RolloutError;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::collections::HashMap;
use tracing::debug;

/// Reject an empty label selector
///
/// An empty selector would match every Deployment and Service in the namespace.
pub fn validate_label_selector(selector: &str) -> Result<(), RolloutError> {
    if selector.trim().is_empty() {
        return Err(RolloutError::InvalidSelector(
            "label selector cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Ensure no two Deployments reduce to the same base name
///
/// Two Deployments sharing a base name mean an earlier rollout was left half
/// done (or another one is running). Scans in input order and reports the
/// first duplicate.
pub fn check_unique_base_names(deployments: &[Deployment]) -> Result<(), RolloutError> {
    let mut seen: HashMap<String, String> = HashMap::new();

    for d in deployments {
        let name = d.name_any();
        let base = base_name(&name).to_string();
        debug!(deployment = ?name, base_name = ?base, "Checking base name");

        if let Some(existing) = seen.get(&base) {
            return Err(RolloutError::BasenameConflict {
                conflicting: name,
                existing: existing.clone(),
                base_name: base,
            });
        }
        seen.insert(base, name);
    }

    Ok(())
}

/// Ensure every Service has a selector map to cut over
pub fn check_services_have_selectors(services: &[Service]) -> Result<(), RolloutError> {
    for s in services {
        let has_selector = s
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref())
            .map(|selector| !selector.is_empty())
            .unwrap_or(false);
        if !has_selector {
            return Err(RolloutError::ServiceWithoutSelector(s.name_any()));
        }
    }
    Ok(())
}
