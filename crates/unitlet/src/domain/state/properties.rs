use chrono::DateTime;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::domain::traits::PropertyValue;
use crate::domain::traits::ServiceManager;
use crate::domain::traits::ServiceManagerError;
use crate::domain::units::UnitName;

pub const EXIT_CODE_KEY: &str = "ExecMainStatus";
pub const RESTART_COUNT_KEY: &str = "NRestarts";
pub const STARTED_AT_KEY: &str = "ExecMainStartTimestamp";
pub const FINISHED_AT_KEY: &str = "ExecMainExitTimestamp";
pub const CONTAINER_ID_KEY: &str = "MainPID";

/// Scheme of synthesized container ids, e.g. `pid://1234`.
pub const CONTAINER_ID_SCHEME: &str = "pid";

/// Snapshot of runtime facts for one unit, fetched fresh per query.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    /// `-1` when unavailable or unparseable
    pub exit_code: i32,
    pub restart_count: i32,
    /// `None` until the main process started
    pub started_at: Option<Time>,
    /// `None` until the main process exited
    pub finished_at: Option<Time>,
    pub container_id: Url,
}

impl Properties {
    /// Builds properties from raw manager values.
    ///
    /// # Errors
    ///
    /// - [`ServiceManagerError::InvalidProperty`] if the main PID does not
    ///   form a valid container id
    pub fn from_values(
        name: &UnitName,
        exit_code: &PropertyValue,
        restart_count: &PropertyValue,
        started_at: &PropertyValue,
        finished_at: &PropertyValue,
        main_pid: &PropertyValue,
    ) -> Result<Self, Report<ServiceManagerError>> {
        let container_id = container_id(main_pid).change_context_lazy(|| {
            ServiceManagerError::InvalidProperty {
                unit: name.to_string(),
                key: CONTAINER_ID_KEY.to_string(),
            }
        })?;

        Ok(Self {
            exit_code: to_i32(exit_code),
            restart_count: to_i32(restart_count),
            started_at: to_time(started_at),
            finished_at: to_time(finished_at),
            container_id,
        })
    }

    /// Reads every property of `name` from the service manager.
    ///
    /// # Errors
    ///
    /// - any transport error of [`ServiceManager::get_property`]
    /// - [`ServiceManagerError::InvalidProperty`] for an unusable main PID
    pub async fn fetch<M>(
        manager: &M,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<Self, Report<ServiceManagerError>>
    where
        M: ServiceManager + ?Sized,
    {
        let exit_code = manager.get_property(name, EXIT_CODE_KEY, cancel).await?;
        let restart_count = manager
            .get_property(name, RESTART_COUNT_KEY, cancel)
            .await?;
        let started_at = manager.get_property(name, STARTED_AT_KEY, cancel).await?;
        let finished_at = manager.get_property(name, FINISHED_AT_KEY, cancel).await?;
        let main_pid = manager
            .get_property(name, CONTAINER_ID_KEY, cancel)
            .await?;

        Self::from_values(
            name,
            &exit_code,
            &restart_count,
            &started_at,
            &finished_at,
            &main_pid,
        )
    }
}

fn to_i32(value: &PropertyValue) -> i32 {
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(-1)
}

/// systemd timestamps are microseconds since the epoch; 0 means unset.
fn to_time(value: &PropertyValue) -> Option<Time> {
    let micros = value.as_u64().filter(|us| *us != 0)?;
    let micros = i64::try_from(micros).ok()?;
    DateTime::from_timestamp_micros(micros).map(Time)
}

fn container_id(main_pid: &PropertyValue) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{CONTAINER_ID_SCHEME}://{main_pid}"))
}
