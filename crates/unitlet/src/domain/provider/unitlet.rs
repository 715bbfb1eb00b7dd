use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodStatus;
use tokio::sync::RwLock;
use tokio::sync::RwLockReadGuard;
use tokio::sync::RwLockWriteGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::api::AttachIo;
use super::api::ContainerLogOpts;
use super::api::LogStream;
use super::error::ProviderError;
use super::error::ProviderResultExt;
use super::node::configure_node;
use super::node::NodeConfig;
use super::Provider;
use crate::domain::state::collect_views;
use crate::domain::state::View;
use crate::domain::state::Views;
use crate::domain::traits::until_cancelled;
use crate::domain::traits::ServiceManager;
use crate::domain::traits::ServiceManagerError;
use crate::domain::traits::UnitStore;
use crate::domain::units::units_from_pod;
use crate::domain::units::Unit;
use crate::domain::units::UnitName;

/// Provider mapping each pod container onto one systemd service unit.
///
/// Writers (create, delete) hold the lock for their whole duration so a
/// reader never observes a half-provisioned pod.
pub struct Unitlet<S, M> {
    node_name: String,
    store: Arc<S>,
    manager: Arc<M>,
    node: NodeConfig,
    lock: RwLock<()>,
}

impl<S, M> Unitlet<S, M>
where
    S: UnitStore,
    M: ServiceManager,
{
    pub fn new(
        node_name: impl Into<String>,
        store: Arc<S>,
        manager: Arc<M>,
        node: NodeConfig,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            store,
            manager,
            node,
            lock: RwLock::new(()),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    async fn read_guard(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RwLockReadGuard<'_, ()>, Report<ProviderError>> {
        until_cancelled(cancel, ProviderError::Cancelled, async {
            Ok(self.lock.read().await)
        })
        .await
    }

    async fn write_guard(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RwLockWriteGuard<'_, ()>, Report<ProviderError>> {
        until_cancelled(cancel, ProviderError::Cancelled, async {
            Ok(self.lock.write().await)
        })
        .await
    }

    async fn views(&self, cancel: &CancellationToken) -> Result<Views, Report<ProviderError>> {
        collect_views(self.manager.as_ref(), cancel)
            .await
            .into_provider()
    }

    /// Links and enables one unit.
    async fn provision(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        self.manager
            .link(&self.store.location(name), cancel)
            .await?;
        self.manager.enable(name, cancel).await
    }

    /// Best-effort removal of a unit from the manager and the store.
    async fn force_unload(&self, name: &UnitName, cancel: &CancellationToken) {
        if let Err(e) = self.manager.disable(name, cancel).await {
            warn!(unit = %name, error = ?e, "failed to disable unit");
        }
        if let Err(e) = self.manager.reset_failed(name, cancel).await {
            debug!(unit = %name, error = ?e, "failed to reset unit");
        }
        if let Err(e) = self.store.delete_unit(name, cancel).await {
            warn!(unit = %name, error = ?e, "failed to delete unit file");
        }
    }

    /// Undoes a partially provisioned pod.
    ///
    /// `provisioned` units are stopped and unloaded, `failed` is unloaded and
    /// the files of `pending` units are removed so the pod can be recreated.
    async fn roll_back(
        &self,
        provisioned: &[Unit],
        failed: &UnitName,
        pending: &[Unit],
        cancel: &CancellationToken,
    ) {
        self.force_unload(failed, cancel).await;
        for unit in provisioned {
            let name = unit.id.name();
            if let Err(e) = self.manager.stop(&name, cancel).await {
                warn!(unit = %name, error = ?e, "failed to stop unit during rollback");
            }
            self.force_unload(&name, cancel).await;
        }
        for unit in pending {
            let name = unit.id.name();
            if let Err(e) = self.store.delete_unit(&name, cancel).await {
                warn!(unit = %name, error = ?e, "failed to delete unit file during rollback");
            }
        }
    }

    /// Rebuilds the pod object of a view from the stored unit files.
    async fn hydrate(
        &self,
        view: &View,
        cancel: &CancellationToken,
    ) -> Result<Pod, Report<ProviderError>> {
        let mut containers = Vec::with_capacity(view.names.len());
        let mut lead = None;
        for name in &view.names {
            let unit = self.store.get_unit(name, cancel).await.into_provider()?;
            containers.push(unit.to_container());
            if lead.is_none() && *name == view.lead {
                lead = Some(unit);
            }
        }
        let lead = match lead {
            Some(unit) => unit,
            None => self
                .store
                .get_unit(&view.lead, cancel)
                .await
                .into_provider()?,
        };
        Ok(lead.to_pod(&self.node_name, containers, view.status.clone()))
    }
}

fn find_view<'a>(
    views: &'a Views,
    namespace: &str,
    name: &str,
) -> Result<&'a View, Report<ProviderError>> {
    views
        .get(namespace)
        .and_then(|pods| pods.get(name))
        .ok_or_else(|| {
            Report::new(ProviderError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        })
}

#[async_trait]
impl<S, M> Provider for Unitlet<S, M>
where
    S: UnitStore + 'static,
    M: ServiceManager + 'static,
{
    #[tracing::instrument(
        skip(self, pod, cancel),
        fields(namespace = ?pod.metadata.namespace, pod = ?pod.metadata.name)
    )]
    async fn create_pod(
        &self,
        pod: &Pod,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>> {
        let units = units_from_pod(pod).into_provider()?;
        for unit in &units {
            unit.check_required_fields().into_provider()?;
        }

        let _guard = self.write_guard(cancel).await?;
        self.store.create_units(&units, cancel).await.into_provider()?;

        for (idx, unit) in units.iter().enumerate() {
            let name = unit.id.name();
            if let Err(report) = self.provision(&name, cancel).await {
                warn!(unit = %name, error = ?report, "failed to provision unit, rolling back pod");
                self.roll_back(&units[..idx], &name, &units[idx + 1..], cancel)
                    .await;
                return Err(report).into_provider();
            }
            self.manager.start(&name, cancel).await.into_provider()?;
            info!(unit = %name, "unit started");
        }

        Ok(())
    }

    #[tracing::instrument(
        skip(self, pod, _cancel),
        fields(namespace = ?pod.metadata.namespace, pod = ?pod.metadata.name)
    )]
    async fn update_pod(
        &self,
        pod: &Pod,
        _cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>> {
        warn!("pod update requested but not supported");
        Err(Report::new(ProviderError::Unsupported {
            operation: "Pod update",
        }))
    }

    #[tracing::instrument(
        skip(self, pod, cancel),
        fields(namespace = ?pod.metadata.namespace, pod = ?pod.metadata.name)
    )]
    async fn delete_pod(
        &self,
        pod: &Pod,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>> {
        let units = units_from_pod(pod).into_provider()?;

        let _guard = self.write_guard(cancel).await?;
        for unit in &units {
            let name = unit.id.name();
            match self.manager.stop(&name, cancel).await {
                Err(report)
                    if matches!(report.current_context(), ServiceManagerError::Cancelled) =>
                {
                    return Err(report).into_provider();
                }
                Err(report) => {
                    warn!(unit = %name, error = ?report, "failed to stop unit, skipping");
                    continue;
                }
                Ok(()) => {}
            }
            self.force_unload(&name, cancel).await;
            if let Err(e) = self.manager.reload(cancel).await {
                debug!(error = ?e, "reload after unload failed");
            }
            info!(unit = %name, "unit removed");
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Pod, Report<ProviderError>> {
        let _guard = self.read_guard(cancel).await?;
        let views = self.views(cancel).await?;
        let view = find_view(&views, namespace, name)?;
        self.hydrate(view, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn get_pod_status(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<PodStatus, Report<ProviderError>> {
        let _guard = self.read_guard(cancel).await?;
        let views = self.views(cancel).await?;
        Ok(find_view(&views, namespace, name)?.status.clone())
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn get_pods(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Pod>, Report<ProviderError>> {
        let _guard = self.read_guard(cancel).await?;
        let views = self.views(cancel).await?;

        let mut pods = Vec::new();
        for view in views.values().flat_map(|pods| pods.values()) {
            pods.push(self.hydrate(view, cancel).await?);
        }
        Ok(pods)
    }

    #[tracing::instrument(skip(self, _opts, _cancel))]
    async fn get_container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        _opts: &ContainerLogOpts,
        _cancel: &CancellationToken,
    ) -> Result<LogStream, Report<ProviderError>> {
        Err(Report::new(ProviderError::NotImplemented {
            operation: "Container logs",
        }))
    }

    #[tracing::instrument(skip(self, _attach, _cancel))]
    async fn run_in_container(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
        _attach: AttachIo,
        _cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>> {
        Err(Report::new(ProviderError::Unsupported {
            operation: "Exec in container",
        }))
    }

    fn configure_node(&self, node: &mut Node) {
        configure_node(node, &self.node);
    }
}
