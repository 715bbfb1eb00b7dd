use std::collections::BTreeMap;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::PodStatus;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::classify::classify;
use super::classify::SubState;
use super::phase::container_status;
use super::phase::pod_status;
use super::properties::Properties;
use super::StateError;
use crate::domain::traits::ServiceManager;
use crate::domain::traits::ServiceManagerError;
use crate::domain::units::UnitId;
use crate::domain::units::UnitName;

/// All units of one pod plus the derived status.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    /// Unit whose file carries the pod-level metadata
    pub lead: UnitName,
    /// Member units in service manager enumeration order
    pub names: Vec<UnitName>,
    pub status: PodStatus,
}

/// Views keyed by namespace, then pod name.
pub type Views = BTreeMap<String, BTreeMap<String, View>>;

struct PendingView {
    names: Vec<UnitName>,
    statuses: Vec<ContainerStatus>,
}

/// Rebuilds every view from live service manager state.
///
/// # Errors
///
/// - [`StateError::ListFailed`] / [`StateError::PropertiesFailed`] on
///   transport errors
/// - [`StateError::InvalidUnitName`] if a name matches the naming
///   convention but does not parse; the whole listing is aborted
/// - [`StateError::Cancelled`] if `cancel` fires
pub async fn collect_views<M>(
    manager: &M,
    cancel: &CancellationToken,
) -> Result<Views, Report<StateError>>
where
    M: ServiceManager + ?Sized,
{
    let units = manager
        .list_units(cancel)
        .await
        .map_err(|e| lift(e, StateError::ListFailed))?;

    let mut pending: BTreeMap<String, BTreeMap<String, PendingView>> = BTreeMap::new();

    for unit in units.into_iter().filter(|u| u.name.is_managed()) {
        let id = UnitId::parse_name(&unit.name).change_context_lazy(|| {
            StateError::InvalidUnitName {
                unit: unit.name.to_string(),
            }
        })?;

        let props = Properties::fetch(manager, &unit.name, cancel)
            .await
            .map_err(|e| {
                lift(
                    e,
                    StateError::PropertiesFailed {
                        unit: unit.name.to_string(),
                    },
                )
            })?;

        let lifecycle = classify(&SubState::parse(&unit.sub_state), &props);
        debug!(unit = %unit.name, sub_state = %unit.sub_state, ?lifecycle, "classified unit");
        let status = container_status(id.container(), &props, lifecycle.to_container_state());

        let view = pending
            .entry(id.namespace().to_string())
            .or_default()
            .entry(id.pod().to_string())
            .or_insert_with(|| PendingView {
                names: Vec::new(),
                statuses: Vec::new(),
            });
        view.names.push(unit.name);
        view.statuses.push(status);
    }

    let views = pending
        .into_iter()
        .map(|(namespace, pods)| {
            let pods = pods
                .into_iter()
                .filter_map(|(pod, view)| {
                    let lead = view.names.first()?.clone();
                    Some((
                        pod,
                        View {
                            lead,
                            names: view.names,
                            status: pod_status(view.statuses),
                        },
                    ))
                })
                .collect();
            (namespace, pods)
        })
        .collect();

    Ok(views)
}

fn lift(report: Report<ServiceManagerError>, context: StateError) -> Report<StateError> {
    match report.current_context() {
        ServiceManagerError::Cancelled => report.change_context(StateError::Cancelled),
        _ => report.change_context(context),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use similar_asserts::assert_eq;
    use std::collections::HashMap;
    use std::path::Path;
    use test_log::test;

    use super::*;
    use crate::domain::state::properties::FINISHED_AT_KEY;
    use crate::domain::traits::ListedUnit;
    use crate::domain::traits::PropertyValue;

    /// Read-only manager serving a fixed listing.
    #[derive(Default)]
    struct FixedManager {
        units: Vec<ListedUnit>,
        properties: HashMap<(String, &'static str), PropertyValue>,
        property_calls: Mutex<Vec<String>>,
    }

    impl FixedManager {
        fn with_units(units: &[(&str, &str)]) -> Self {
            Self {
                units: units
                    .iter()
                    .map(|(name, sub_state)| ListedUnit {
                        name: UnitName::new(*name),
                        sub_state: sub_state.to_string(),
                    })
                    .collect(),
                ..Default::default()
            }
        }
    }

    type Mutation = Result<(), Report<ServiceManagerError>>;

    #[async_trait]
    impl ServiceManager for FixedManager {
        async fn link(&self, _: &Path, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }
        async fn enable(&self, _: &UnitName, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }
        async fn disable(&self, _: &UnitName, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }
        async fn start(&self, _: &UnitName, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }
        async fn stop(&self, _: &UnitName, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }
        async fn reload(&self, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }
        async fn reset_failed(&self, _: &UnitName, _: &CancellationToken) -> Mutation {
            unreachable!("read-only manager")
        }

        async fn list_units(
            &self,
            cancel: &CancellationToken,
        ) -> Result<Vec<ListedUnit>, Report<ServiceManagerError>> {
            if cancel.is_cancelled() {
                return Err(Report::new(ServiceManagerError::Cancelled));
            }
            Ok(self.units.clone())
        }

        async fn get_property(
            &self,
            name: &UnitName,
            key: &str,
            _: &CancellationToken,
        ) -> Result<PropertyValue, Report<ServiceManagerError>> {
            self.property_calls
                .lock()
                .expect("lock")
                .push(name.to_string());
            Ok(self
                .properties
                .iter()
                .find(|((unit, k), _)| unit == name.as_str() && *k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(PropertyValue::Unsigned(0)))
        }
    }

    #[test(tokio::test)]
    async fn groups_units_by_namespace_and_pod() {
        let manager = FixedManager::with_units(&[
            ("sshd.service", "running"),
            ("unitlet.prod.web.nginx.service", "running"),
            ("unitlet.dev.job.main.service", "exited"),
            ("unitlet.prod.web.sidecar.service", "start-pre"),
            ("unitlet.prod.api.app.service", "running"),
        ]);

        let views = collect_views(&manager, &CancellationToken::new())
            .await
            .expect("should collect");

        assert_eq!(views.len(), 2);
        let web = &views["prod"]["web"];
        assert_eq!(web.lead.as_str(), "unitlet.prod.web.nginx.service");
        assert_eq!(
            web.names,
            vec![
                UnitName::new("unitlet.prod.web.nginx.service"),
                UnitName::new("unitlet.prod.web.sidecar.service"),
            ]
        );
        assert_eq!(web.status.phase.as_deref(), Some("Pending"));
        let containers: Vec<String> = web
            .status
            .container_statuses
            .iter()
            .flatten()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(containers, vec!["nginx", "sidecar"]);

        assert_eq!(views["prod"]["api"].status.phase.as_deref(), Some("Running"));
        assert_eq!(views["dev"]["job"].status.phase.as_deref(), Some("Succeeded"));

        // foreign units are never queried
        let calls = manager.property_calls.lock().expect("lock");
        assert!(calls.iter().all(|n| n.starts_with("unitlet.")));
    }

    #[test(tokio::test)]
    async fn dead_unit_with_exit_timestamp_is_terminated() {
        let mut manager = FixedManager::with_units(&[("unitlet.a.b.c.service", "dead")]);
        manager.properties.insert(
            ("unitlet.a.b.c.service".to_string(), FINISHED_AT_KEY),
            PropertyValue::Unsigned(1_700_000_000_000_000),
        );

        let views = collect_views(&manager, &CancellationToken::new())
            .await
            .expect("should collect");
        let status = &views["a"]["b"].status;
        assert_eq!(status.phase.as_deref(), Some("Succeeded"));
    }

    #[test(tokio::test)]
    async fn unparseable_managed_name_aborts_listing() {
        let manager = FixedManager::with_units(&[
            ("unitlet.a.b.c.service", "running"),
            ("unitlet.broken.service", "running"),
        ]);

        let err = collect_views(&manager, &CancellationToken::new())
            .await
            .expect_err("listing must abort");
        assert!(matches!(
            err.current_context(),
            StateError::InvalidUnitName { .. }
        ));
    }

    #[test(tokio::test)]
    async fn cancellation_is_reported() {
        let manager = FixedManager::with_units(&[("unitlet.a.b.c.service", "running")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = collect_views(&manager, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err.current_context(), StateError::Cancelled));
    }

    #[test(tokio::test)]
    async fn unknown_sub_state_does_not_fail_listing() {
        let manager = FixedManager::with_units(&[("unitlet.a.b.c.service", "cleaning")]);
        let views = collect_views(&manager, &CancellationToken::new())
            .await
            .expect("should collect");
        let statuses = views["a"]["b"]
            .status
            .container_statuses
            .clone()
            .expect("statuses");
        assert_eq!(statuses[0].state, Some(Default::default()));
    }
}
