use error_stack::Report;

use super::error::UnitError;
use super::id::UnitId;

/// Execution definition of one container as a systemd service.
///
/// A unit never changes identity after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unit {
    pub id: UnitId,
    /// argv; the first element is the executable
    pub command: Vec<String>,
    pub pod_uid: String,
    pub working_dir: Option<String>,
    pub user: Option<i64>,
}

impl Unit {
    /// Checks the fields needed to rebuild the workload from the unit file.
    ///
    /// # Errors
    ///
    /// - [`UnitError::MissingField`] for an empty command, namespace, pod,
    ///   container or pod UID
    pub fn check_required_fields(&self) -> Result<(), Report<UnitError>> {
        let missing = [
            ("ExecStart", self.command.is_empty()),
            ("Namespace", self.id.namespace().is_empty()),
            ("Pod", self.id.pod().is_empty()),
            ("Container", self.id.container().is_empty()),
            ("PodUID", self.pod_uid.is_empty()),
        ]
        .into_iter()
        .find_map(|(field, missing)| missing.then_some(field));

        match missing {
            Some(field) => Err(Report::new(UnitError::MissingField { field })
                .attach_printable(format!("unit {}", self.id))),
            None => Ok(()),
        }
    }
}
