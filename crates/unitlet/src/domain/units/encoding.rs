//! Mapping between [`Unit`] and unit-file sections.
//!
//! Workload identity is stored verbatim in an `[X-Kubernetes]` section so a
//! unit file alone is enough to rebuild the pod after a restart.
//!
//! `ExecStart` is the command joined with single spaces and split the same
//! way on decode, so arguments containing spaces do not survive a round
//! trip.

use error_stack::Report;

use super::error::UnitError;
use super::unit::Unit;
use super::unit_file::deserialize_sections;
use super::unit_file::serialize_sections;
use super::unit_file::UnitEntry;
use super::unit_file::UnitSection;

pub const UNIT_SECTION: &str = "Unit";
pub const SERVICE_SECTION: &str = "Service";
pub const INSTALL_SECTION: &str = "Install";
pub const K8S_SECTION: &str = "X-Kubernetes";

pub const DESCRIPTION_KEY: &str = "Description";
pub const AFTER_KEY: &str = "After";
pub const TYPE_KEY: &str = "Type";
pub const EXEC_START_KEY: &str = "ExecStart";
pub const WORKDIR_KEY: &str = "WorkingDirectory";
pub const USER_KEY: &str = "User";

pub const NAMESPACE_KEY: &str = "Namespace";
pub const POD_KEY: &str = "Pod";
pub const POD_UID_KEY: &str = "PodUID";
pub const CONTAINER_KEY: &str = "Container";
pub const WANTED_BY_KEY: &str = "WantedBy";

/// Every key [`Unit::to_sections`] emits.
const EMITTED_KEYS: [&str; 11] = [
    DESCRIPTION_KEY,
    AFTER_KEY,
    TYPE_KEY,
    EXEC_START_KEY,
    WORKDIR_KEY,
    USER_KEY,
    WANTED_BY_KEY,
    NAMESPACE_KEY,
    POD_KEY,
    POD_UID_KEY,
    CONTAINER_KEY,
];

const NETWORK_TARGET: &str = "network-online.target";
const INSTALL_TARGET: &str = "multi-user.target";

impl Unit {
    pub fn to_sections(&self) -> Vec<UnitSection> {
        let mut service = vec![
            UnitEntry::new(TYPE_KEY, "simple"),
            UnitEntry::new(EXEC_START_KEY, self.command.join(" ")),
        ];
        if let Some(wd) = &self.working_dir {
            service.push(UnitEntry::new(WORKDIR_KEY, wd.as_str()));
        }
        if let Some(user) = self.user {
            service.push(UnitEntry::new(USER_KEY, user.to_string()));
        }

        vec![
            UnitSection::new(
                UNIT_SECTION,
                vec![
                    UnitEntry::new(DESCRIPTION_KEY, self.id.to_string()),
                    UnitEntry::new(AFTER_KEY, NETWORK_TARGET),
                ],
            ),
            UnitSection::new(SERVICE_SECTION, service),
            UnitSection::new(
                INSTALL_SECTION,
                vec![UnitEntry::new(WANTED_BY_KEY, INSTALL_TARGET)],
            ),
            UnitSection::new(
                K8S_SECTION,
                vec![
                    UnitEntry::new(NAMESPACE_KEY, self.id.namespace()),
                    UnitEntry::new(POD_KEY, self.id.pod()),
                    UnitEntry::new(POD_UID_KEY, self.pod_uid.as_str()),
                    UnitEntry::new(CONTAINER_KEY, self.id.container()),
                ],
            ),
        ]
    }

    /// Builds a unit from parsed sections, then checks required fields.
    ///
    /// Unknown sections and keys are ignored; a repeated key keeps its last
    /// value.
    ///
    /// # Errors
    ///
    /// - [`UnitError::InvalidField`] if `User` is not an integer
    /// - [`UnitError::MissingField`] if a required field is empty
    pub fn from_sections(sections: &[UnitSection]) -> Result<Self, Report<UnitError>> {
        let mut unit = Unit::default();

        for section in sections {
            for entry in &section.entries {
                let value = entry.value.clone();
                match (section.name.as_str(), entry.key.as_str()) {
                    (SERVICE_SECTION, EXEC_START_KEY) => {
                        unit.command = if value.is_empty() {
                            Vec::new()
                        } else {
                            value.split(' ').map(str::to_string).collect()
                        };
                    }
                    (SERVICE_SECTION, WORKDIR_KEY) => unit.working_dir = Some(value),
                    (SERVICE_SECTION, USER_KEY) => {
                        let user = value.parse::<i64>().map_err(|e| {
                            Report::new(UnitError::InvalidField {
                                field: USER_KEY,
                                value: value.clone(),
                            })
                            .attach_printable(e.to_string())
                        })?;
                        unit.user = Some(user);
                    }
                    (K8S_SECTION, NAMESPACE_KEY) => unit.id.set_namespace(value),
                    (K8S_SECTION, POD_KEY) => unit.id.set_pod(value),
                    (K8S_SECTION, POD_UID_KEY) => unit.pod_uid = value,
                    (K8S_SECTION, CONTAINER_KEY) => unit.id.set_container(value),
                    _ => {}
                }
            }
        }

        unit.check_required_fields()?;
        Ok(unit)
    }

    /// Renders the unit file.
    ///
    /// # Errors
    ///
    /// - [`UnitError::Unencodable`] if a value contains a line break or ends
    ///   in a backslash, which the parser would read as a continuation
    pub fn marshal(&self) -> Result<Vec<u8>, Report<UnitError>> {
        let sections = self.to_sections();
        for entry in sections.iter().flat_map(|s| s.entries.iter()) {
            if !encodable(&entry.value) {
                return Err(Report::new(UnitError::Unencodable {
                    field: field_name(&entry.key),
                })
                .attach_printable(format!("unit {}", self.id)));
            }
        }
        Ok(serialize_sections(&sections).into_bytes())
    }

    /// Parses a unit file produced by [`Unit::marshal`].
    ///
    /// # Errors
    ///
    /// - [`UnitError::Malformed`] if the data is not a valid unit file
    /// - any error of [`Unit::from_sections`]
    pub fn unmarshal(data: &[u8]) -> Result<Self, Report<UnitError>> {
        let text = std::str::from_utf8(data).map_err(|e| {
            Report::new(UnitError::Malformed {
                line: 0,
                reason: format!("not UTF-8: {e}"),
            })
        })?;
        let sections = deserialize_sections(text)?;
        Self::from_sections(&sections)
    }
}

fn encodable(value: &str) -> bool {
    !value.contains(['\n', '\r']) && !value.trim_end().ends_with('\\')
}

fn field_name(key: &str) -> &'static str {
    EMITTED_KEYS
        .iter()
        .find(|k| **k == key)
        .copied()
        .unwrap_or("unknown")
}
