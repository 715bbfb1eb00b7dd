//! In-memory capability doubles for provider tests.
//!
//! [`MockServiceManager`] keeps a unit listing that follows the calls made
//! against it and records every mutating call. [`MemoryStore`] keeps
//! marshaled unit files in a map.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::domain::state::properties::CONTAINER_ID_KEY;
use crate::domain::state::properties::FINISHED_AT_KEY;
use crate::domain::state::properties::STARTED_AT_KEY;
use crate::domain::traits::until_cancelled;
use crate::domain::traits::ListedUnit;
use crate::domain::traits::PropertyValue;
use crate::domain::traits::ServiceManager;
use crate::domain::traits::ServiceManagerError;
use crate::domain::traits::StoreError;
use crate::domain::traits::UnitStore;
use crate::domain::units::Unit;
use crate::domain::units::UnitName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Link,
    Enable,
    Disable,
    Start,
    Stop,
    Reload,
    ResetFailed,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Link => "LinkUnitFiles",
            Self::Enable => "EnableUnitFiles",
            Self::Disable => "DisableUnitFiles",
            Self::Start => "StartUnit",
            Self::Stop => "StopUnit",
            Self::Reload => "Reload",
            Self::ResetFailed => "ResetFailedUnit",
        }
    }
}

type StartBarrier = (oneshot::Sender<()>, oneshot::Receiver<()>);

#[derive(Default)]
struct ManagerState {
    units: Vec<ListedUnit>,
    properties: HashMap<(String, String), PropertyValue>,
    calls: Vec<(Method, String)>,
    failures: HashSet<(Method, String)>,
    barrier: Option<StartBarrier>,
    clock: u64,
}

impl ManagerState {
    fn set_sub_state(&mut self, name: &str, sub_state: &str) {
        if let Some(unit) = self.units.iter_mut().find(|u| u.name.as_str() == name) {
            unit.sub_state = sub_state.to_string();
        }
    }

    fn stamp(&mut self, name: &str, key: &str) {
        self.clock += 1_000_000;
        let micros = 1_700_000_000_000_000 + self.clock;
        self.properties.insert(
            (name.to_string(), key.to_string()),
            PropertyValue::Unsigned(micros),
        );
    }
}

#[derive(Default)]
pub struct MockServiceManager {
    state: Mutex<ManagerState>,
}

impl MockServiceManager {
    /// Makes every later `method` call against `target` fail.
    pub fn fail(&self, method: Method, target: &str) {
        self.lock().failures.insert((method, target.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Pauses the next `start` call.
    ///
    /// The first receiver fires once `start` is entered; sending on the
    /// returned sender lets it complete.
    pub fn pause_start(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.lock().barrier = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    /// Adds a unit to the listing as if loaded from elsewhere.
    pub fn insert_unit(&self, name: &str, sub_state: &str) {
        self.lock().units.push(ListedUnit {
            name: UnitName::new(name),
            sub_state: sub_state.to_string(),
        });
    }

    pub fn set_sub_state(&self, name: &str, sub_state: &str) {
        self.lock().set_sub_state(name, sub_state);
    }

    pub fn set_property(&self, name: &str, key: &str, value: PropertyValue) {
        self.lock()
            .properties
            .insert((name.to_string(), key.to_string()), value);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Records the call and applies injected failures.
    fn enter(
        &self,
        method: Method,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        if cancel.is_cancelled() {
            return Err(Report::new(ServiceManagerError::Cancelled));
        }
        let mut state = self.lock();
        state.calls.push((method, target.to_string()));
        if state.failures.contains(&(method, target.to_string())) {
            return Err(Report::new(ServiceManagerError::call(
                method.as_str(),
                target,
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceManager for MockServiceManager {
    async fn link(
        &self,
        location: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.enter(Method::Link, &name, cancel)?;
        let mut state = self.lock();
        if !state.units.iter().any(|u| u.name.as_str() == name) {
            state.units.push(ListedUnit {
                name: UnitName::new(name),
                sub_state: "dead".to_string(),
            });
        }
        Ok(())
    }

    async fn enable(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        self.enter(Method::Enable, name.as_str(), cancel)
    }

    async fn disable(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        self.enter(Method::Disable, name.as_str(), cancel)?;
        self.lock().units.retain(|u| &u.name != name);
        Ok(())
    }

    async fn start(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        self.enter(Method::Start, name.as_str(), cancel)?;

        let barrier = self.lock().barrier.take();
        if let Some((entered, release)) = barrier {
            let _ = entered.send(());
            until_cancelled(cancel, ServiceManagerError::Cancelled, async {
                release
                    .await
                    .change_context(ServiceManagerError::call("StartUnit", name))
            })
            .await?;
        }

        let mut state = self.lock();
        state.set_sub_state(name.as_str(), "running");
        state.stamp(name.as_str(), STARTED_AT_KEY);
        let pid = 4000 + state.units.len() as u64;
        state.properties.insert(
            (name.to_string(), CONTAINER_ID_KEY.to_string()),
            PropertyValue::Unsigned(pid),
        );
        Ok(())
    }

    async fn stop(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        self.enter(Method::Stop, name.as_str(), cancel)?;
        let mut state = self.lock();
        state.set_sub_state(name.as_str(), "dead");
        state.stamp(name.as_str(), FINISHED_AT_KEY);
        Ok(())
    }

    async fn reload(&self, cancel: &CancellationToken) -> Result<(), Report<ServiceManagerError>> {
        self.enter(Method::Reload, "", cancel)
    }

    async fn reset_failed(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ServiceManagerError>> {
        self.enter(Method::ResetFailed, name.as_str(), cancel)
    }

    async fn list_units(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListedUnit>, Report<ServiceManagerError>> {
        if cancel.is_cancelled() {
            return Err(Report::new(ServiceManagerError::Cancelled));
        }
        Ok(self.lock().units.clone())
    }

    async fn get_property(
        &self,
        name: &UnitName,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<PropertyValue, Report<ServiceManagerError>> {
        if cancel.is_cancelled() {
            return Err(Report::new(ServiceManagerError::Cancelled));
        }
        Ok(self
            .lock()
            .properties
            .get(&(name.to_string(), key.to_string()))
            .cloned()
            .unwrap_or(PropertyValue::Unsigned(0)))
    }
}

/// Unit files kept in memory, keyed by unit name.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of `get_unit` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Overwrites a file with arbitrary bytes.
    pub fn put_raw(&self, name: &str, data: Vec<u8>) {
        self.lock().insert(name.to_string(), data);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().expect("store poisoned")
    }

    fn check(cancel: &CancellationToken) -> Result<(), Report<StoreError>> {
        if cancel.is_cancelled() {
            return Err(Report::new(StoreError::Cancelled));
        }
        Ok(())
    }

    fn encode(units: &[Unit]) -> Result<Vec<(String, Vec<u8>)>, Report<StoreError>> {
        units
            .iter()
            .map(|unit| {
                let name = unit.id.name();
                let data = unit.marshal().change_context_lazy(|| StoreError::Encode {
                    name: name.to_string(),
                })?;
                Ok((name.to_string(), data))
            })
            .collect()
    }
}

#[async_trait]
impl UnitStore for MemoryStore {
    fn location(&self, name: &UnitName) -> PathBuf {
        PathBuf::from("/run/unitlet-test").join(name.as_str())
    }

    async fn get_unit(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<Unit, Report<StoreError>> {
        Self::check(cancel)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        let location = self.location(name);
        let data = self
            .lock()
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| {
                Report::new(StoreError::ReadFailed {
                    location: location.clone(),
                })
            })?;
        Unit::unmarshal(&data).change_context(StoreError::Decode { location })
    }

    async fn create_units(
        &self,
        units: &[Unit],
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>> {
        Self::check(cancel)?;
        let encoded = Self::encode(units)?;
        let mut files = self.lock();
        if let Some((name, _)) = encoded.iter().find(|(name, _)| files.contains_key(name)) {
            return Err(Report::new(StoreError::AlreadyExists {
                location: self.location(&UnitName::new(name.as_str())),
            }));
        }
        files.extend(encoded);
        Ok(())
    }

    async fn delete_unit(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>> {
        Self::check(cancel)?;
        self.lock().remove(name.as_str());
        Ok(())
    }

    async fn update_units(
        &self,
        units: &[Unit],
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>> {
        Self::check(cancel)?;
        let encoded = Self::encode(units)?;
        self.lock().extend(encoded);
        Ok(())
    }
}
