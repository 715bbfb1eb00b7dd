//! [`ServiceManager`] backed by systemd over D-Bus.

mod path;
mod proxy;
mod value;

use std::fmt;
use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zbus::fdo::PropertiesProxy;
use zbus::names::InterfaceName;
use zbus::Connection;

pub use path::bus_label_escape;
pub use path::unit_object_path;
use proxy::ManagerProxy;
use value::to_property_value;

use crate::domain::traits::until_cancelled;
use crate::domain::traits::ListedUnit;
use crate::domain::traits::PropertyValue;
use crate::domain::traits::ServiceManager;
use crate::domain::traits::ServiceManagerError;
use crate::domain::units::UnitName;

/// Exists only when systemd is the running init.
pub const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";
pub const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
pub const SERVICE_INTERFACE: &str = "org.freedesktop.systemd1.Service";
pub const JOB_MODE_REPLACE: &str = "replace";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum BusKind {
    #[default]
    #[display("system")]
    System,
    #[display("session")]
    Session,
}

pub struct SystemdManager {
    connection: Connection,
    manager: ManagerProxy<'static>,
}

impl SystemdManager {
    /// Connects to the systemd instance on `bus`.
    ///
    /// # Errors
    ///
    /// - [`ServiceManagerError::NotRunning`] if systemd is not the running init
    /// - [`ServiceManagerError::ConnectionFailed`] if the bus is unreachable
    pub async fn connect(bus: BusKind) -> Result<Self, Report<ServiceManagerError>> {
        Self::connect_with_runtime_dir(bus, Path::new(SYSTEMD_RUNTIME_DIR)).await
    }

    async fn connect_with_runtime_dir(
        bus: BusKind,
        runtime_dir: &Path,
    ) -> Result<Self, Report<ServiceManagerError>> {
        if !tokio::fs::metadata(runtime_dir)
            .await
            .is_ok_and(|m| m.is_dir())
        {
            return Err(Report::new(ServiceManagerError::NotRunning)
                .attach_printable(format!("{} does not exist", runtime_dir.display())));
        }

        let connection = match bus {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .change_context_lazy(|| ServiceManagerError::ConnectionFailed {
            message: format!("cannot open {bus} bus"),
        })?;
        let manager = ManagerProxy::new(&connection)
            .await
            .change_context_lazy(|| ServiceManagerError::ConnectionFailed {
                message: "cannot create systemd manager proxy".to_string(),
            })?;

        debug!(%bus, "connected to systemd");
        Ok(Self {
            connection,
            manager,
        })
    }

    async fn properties(&self, name: &UnitName) -> zbus::Result<PropertiesProxy<'static>> {
        PropertiesProxy::builder(&self.connection)
            .destination(SYSTEMD_DESTINATION)?
            .path(unit_object_path(name.as_str()))?
            .build()
            .await
    }
}

/// Runs one bus call, mapping transport errors and honouring `cancel`.
async fn call<T, F>(
    cancel: &CancellationToken,
    method: &'static str,
    target: impl fmt::Display,
    fut: F,
) -> Result<T, Report<ServiceManagerError>>
where
    F: Future<Output = zbus::Result<T>>,
{
    let target = target.to_string();
    until_cancelled(cancel, ServiceManagerError::Cancelled, async move {
        fut.await
            .change_context_lazy(|| ServiceManagerError::call(method, &target))
    })
    .await
}

#[async_trait]
impl ServiceManager for SystemdManager {
    async fn link(
        &self,
        location: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        let file = location.to_string_lossy();
        let changes = call(
            cancel,
            "LinkUnitFiles",
            &file,
            self.manager.link_unit_files(&[&*file], true, true),
        )
        .await?;
        debug!(?changes, "linked unit file");
        Ok(())
    }

    async fn enable(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        let (carries_install_info, _) = call(
            cancel,
            "EnableUnitFiles",
            name,
            self.manager
                .enable_unit_files(&[name.as_str()], true, true),
        )
        .await?;
        if !carries_install_info {
            return Err(Report::new(ServiceManagerError::EnableRejected {
                unit: name.to_string(),
            }));
        }
        Ok(())
    }

    async fn disable(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        call(
            cancel,
            "DisableUnitFiles",
            name,
            self.manager.disable_unit_files(&[name.as_str()], true),
        )
        .await?;
        Ok(())
    }

    async fn start(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        let job = call(
            cancel,
            "StartUnit",
            name,
            self.manager.start_unit(name.as_str(), JOB_MODE_REPLACE),
        )
        .await?;
        debug!(unit = %name, job = %job.as_str(), "start job queued");
        Ok(())
    }

    async fn stop(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        let job = call(
            cancel,
            "StopUnit",
            name,
            self.manager.stop_unit(name.as_str(), JOB_MODE_REPLACE),
        )
        .await?;
        debug!(unit = %name, job = %job.as_str(), "stop job queued");
        Ok(())
    }

    async fn reload(&self, cancel: &CancellationToken) -> Result<(), Report<ServiceManagerError>> {
        call(cancel, "Reload", SYSTEMD_DESTINATION, self.manager.reload()).await
    }

    async fn reset_failed(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        call(
            cancel,
            "ResetFailedUnit",
            name,
            self.manager.reset_failed_unit(name.as_str()),
        )
        .await
    }

    async fn list_units(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListedUnit>, Report<ServiceManagerError>> {
        let rows = call(cancel, "ListUnits", SYSTEMD_DESTINATION, self.manager.list_units()).await?;
        Ok(rows
            .into_iter()
            .map(|(name, _, _, _, sub_state, ..)| ListedUnit {
                name: UnitName::new(name),
                sub_state,
            })
            .collect())
    }

    async fn get_property(
        &self,
        name: &UnitName,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<PropertyValue, Report<ServiceManagerError>> {
        let value = call(cancel, "Get", name, async {
            let proxy = self.properties(name).await?;
            let value = proxy
                .get(InterfaceName::from_static_str_unchecked(SERVICE_INTERFACE), key)
                .await?;
            Ok::<_, zbus::Error>(value)
        })
        .await?;

        to_property_value(&value).ok_or_else(|| {
            Report::new(ServiceManagerError::InvalidProperty {
                unit: name.to_string(),
                key: key.to_string(),
            })
            .attach_printable(format!("unsupported value type {}", value.value_signature()))
        })
    }
}
