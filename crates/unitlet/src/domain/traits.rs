//! Capabilities the provider consumes: the service manager and the unit-file store.
//!
//! Every call takes the caller's [`CancellationToken`]; implementations
//! must give up promptly once it fires.

use core::error::Error;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Context;
use error_stack::Report;
use tokio_util::sync::CancellationToken;

use crate::domain::units::Unit;
use crate::domain::units::UnitName;

/// One entry of the service manager's unit listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedUnit {
    pub name: UnitName,
    pub sub_state: String,
}

/// Opaque property value as reported by the service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Signed(i64),
    Unsigned(u64),
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    /// Integer view of the value; text is parsed leniently.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(*v),
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            Self::Bool(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Signed(v) => u64::try_from(*v).ok(),
            Self::Unsigned(v) => Some(*v),
            Self::Bool(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Errors from the service manager IPC.
#[derive(Debug, derive_more::Display)]
pub enum ServiceManagerError {
    #[display("systemd is not running on this host")]
    NotRunning,
    #[display("Failed to connect to the service manager: {message}")]
    ConnectionFailed { message: String },
    #[display("Service manager call {method} failed for {target}")]
    CallFailed { method: &'static str, target: String },
    #[display("Unit {unit} has no install information and cannot be enabled")]
    EnableRejected { unit: String },
    #[display("Invalid value for property {key} of {unit}")]
    InvalidProperty { unit: String, key: String },
    #[display("Service manager call cancelled")]
    Cancelled,
}

impl Error for ServiceManagerError {}

impl ServiceManagerError {
    pub fn call(method: &'static str, target: impl fmt::Display) -> Self {
        Self::CallFailed {
            method,
            target: target.to_string(),
        }
    }
}

/// Errors from the unit-file store.
#[derive(Debug, derive_more::Display)]
pub enum StoreError {
    #[display("Unit file already exists: {}", location.display())]
    AlreadyExists { location: PathBuf },
    #[display("Failed to read unit file {}", location.display())]
    ReadFailed { location: PathBuf },
    #[display("Failed to write unit file {}", location.display())]
    WriteFailed { location: PathBuf },
    #[display("Failed to delete unit file {}", location.display())]
    DeleteFailed { location: PathBuf },
    #[display("Unit file {} is not a pod-compatible unit", location.display())]
    Decode { location: PathBuf },
    #[display("Failed to encode unit {name}")]
    Encode { name: String },
    #[display("Unit store operation cancelled")]
    Cancelled,
}

impl Error for StoreError {}

/// Subset of service manager operations needed for unit lifecycle and status.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Links a unit file into the manager's search path.
    async fn link(
        &self,
        location: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>>;

    async fn enable(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>>;

    async fn disable(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>>;

    async fn start(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>>;

    async fn stop(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>>;

    /// Reloads all unit definitions.
    async fn reload(&self, cancel: &CancellationToken) -> Result<(), Report<ServiceManagerError>>;

    async fn reset_failed(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>>;

    /// All units currently known to the manager, in its enumeration order.
    async fn list_units(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListedUnit>, Report<ServiceManagerError>>;

    async fn get_property(
        &self,
        name: &UnitName,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<PropertyValue, Report<ServiceManagerError>>;
}

/// Durable storage of unit files, keyed by unit name.
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Path of the unit file, as handed to [`ServiceManager::link`].
    fn location(&self, name: &UnitName) -> PathBuf;

    async fn get_unit(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<Unit, Report<StoreError>>;

    /// Writes new unit files.
    ///
    /// Fails with [`StoreError::AlreadyExists`] before writing anything if
    /// any of the files already exists.
    async fn create_units(
        &self,
        units: &[Unit],
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>>;

    async fn delete_unit(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>>;

    /// Writes unit files, overwriting existing ones.
    async fn update_units(
        &self,
        units: &[Unit],
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>>;
}

/// Races `fut` against `cancel`, reporting `cancelled` if the token fires first.
pub async fn until_cancelled<T, C, F>(
    cancel: &CancellationToken,
    cancelled: C,
    fut: F,
) -> Result<T, Report<C>>
where
    C: Context,
    F: Future<Output = Result<T, Report<C>>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Report::new(cancelled)),
        result = fut => result,
    }
}
