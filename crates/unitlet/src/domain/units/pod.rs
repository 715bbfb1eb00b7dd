//! Translation between Kubernetes pods and units.

use error_stack::Report;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::api::core::v1::SecurityContext;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::error::UnitError;
use super::id::UnitId;
use super::unit::Unit;

const DEFAULT_NAMESPACE: &str = "default";

/// Derives one unit per container, in spec order.
///
/// A pod without a namespace lands in `default`; the pod UID is carried
/// through as-is and checked later by [`Unit::check_required_fields`].
///
/// # Errors
///
/// - [`UnitError::MissingField`] if the pod has no name
pub fn units_from_pod(pod: &Pod) -> Result<Vec<Unit>, Report<UnitError>> {
    let metadata = &pod.metadata;
    let pod_name = metadata
        .name
        .as_deref()
        .ok_or_else(|| Report::new(UnitError::MissingField { field: "Pod" }))?;
    let namespace = metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let pod_uid = metadata.uid.clone().unwrap_or_default();

    let Some(spec) = &pod.spec else {
        return Ok(Vec::new());
    };
    let pod_user = spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.run_as_user);

    let units = spec
        .containers
        .iter()
        .map(|c| {
            let command = c
                .command
                .iter()
                .flatten()
                .chain(c.args.iter().flatten())
                .cloned()
                .collect();
            let working_dir = c.working_dir.clone().filter(|wd| !wd.is_empty());
            let user = c
                .security_context
                .as_ref()
                .and_then(|sc| sc.run_as_user)
                .or(pod_user);

            Unit {
                id: UnitId::new(namespace, pod_name, c.name.as_str()),
                command,
                pod_uid: pod_uid.clone(),
                working_dir,
                user,
            }
        })
        .collect();

    Ok(units)
}

impl Unit {
    /// Container spec recovered from the stored unit file.
    pub fn to_container(&self) -> Container {
        let (command, args) = match self.command.split_first() {
            Some((exe, rest)) => (
                Some(vec![exe.clone()]),
                (!rest.is_empty()).then(|| rest.to_vec()),
            ),
            None => (None, None),
        };

        Container {
            name: self.id.container().to_string(),
            command,
            args,
            working_dir: self.working_dir.clone(),
            security_context: self.user.map(|user| SecurityContext {
                run_as_user: Some(user),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Rebuilds the pod around this (lead) unit's identity.
    pub fn to_pod(&self, node_name: &str, containers: Vec<Container>, status: PodStatus) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.id.pod().to_string()),
                namespace: Some(self.id.namespace().to_string()),
                uid: Some(self.pod_uid.clone()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node_name.to_string()),
                containers,
                ..Default::default()
            }),
            status: Some(status),
        }
    }
}
