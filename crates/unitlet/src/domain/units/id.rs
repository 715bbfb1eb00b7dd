use std::fmt;

use error_stack::Report;

use super::error::UnitError;

/// Leading component of every unit managed by this provider.
pub const PREFIX: &str = "unitlet";
/// Unit type suffix appended to the identity string.
pub const SUFFIX: &str = ".service";
/// Separator between identity components.
pub const SEPARATOR: char = '.';

/// Name of a systemd unit, e.g. `unitlet.default.nginx.web.service`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub struct UnitName(String);

impl UnitName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name follows this provider's naming convention.
    ///
    /// A managed name may still fail [`UnitId::parse_name`]; callers treat
    /// that as a naming-scheme violation rather than a foreign unit.
    pub fn is_managed(&self) -> bool {
        self.0
            .strip_prefix(PREFIX)
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
            && self.0.ends_with(SUFFIX)
    }
}

impl AsRef<str> for UnitName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Workload coordinates of one container.
///
/// The canonical string form is `unitlet.<namespace>.<pod>.<container>`.
/// The encoding stays injective as long as no coordinate contains
/// [`SEPARATOR`], which Kubernetes DNS-label names guarantee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId {
    namespace: String,
    pod: String,
    container: String,
}

impl UnitId {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub(crate) fn set_namespace(&mut self, namespace: String) {
        self.namespace = namespace;
    }

    pub(crate) fn set_pod(&mut self, pod: String) {
        self.pod = pod;
    }

    pub(crate) fn set_container(&mut self, container: String) {
        self.container = container;
    }

    /// Unit name for this identity.
    pub fn name(&self) -> UnitName {
        UnitName(format!("{self}{SUFFIX}"))
    }

    /// Inverse of [`UnitId::name`].
    ///
    /// # Errors
    ///
    /// - [`UnitError::InvalidName`] if the prefix, suffix or field count
    ///   does not match, or a coordinate is empty
    pub fn parse_name(name: &UnitName) -> Result<Self, Report<UnitError>> {
        const FIELDS: usize = 5;

        let invalid = || {
            Report::new(UnitError::InvalidName {
                name: name.to_string(),
            })
        };

        let fields: Vec<&str> = name.as_str().splitn(FIELDS, SEPARATOR).collect();
        let [prefix, namespace, pod, container, remainder] = fields.as_slice() else {
            return Err(invalid().attach_printable(format!(
                "expected {FIELDS} fields separated by '{SEPARATOR}', found {}",
                fields.len()
            )));
        };
        if *prefix != PREFIX {
            return Err(invalid().attach_printable(format!("unexpected prefix {prefix:?}")));
        }
        if Some(*remainder) != SUFFIX.strip_prefix(SEPARATOR) {
            return Err(invalid().attach_printable(format!("unexpected suffix {remainder:?}")));
        }
        if namespace.is_empty() || pod.is_empty() || container.is_empty() {
            return Err(invalid().attach_printable("empty coordinate"));
        }

        Ok(Self::new(*namespace, *pod, *container))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.namespace, self.pod, self.container
        )
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn name_round_trip() {
        let id = UnitId::new("a", "b", "c");
        assert_eq!(id.to_string(), "unitlet.a.b.c");
        assert_eq!(id.name().as_str(), "unitlet.a.b.c.service");

        let parsed = UnitId::parse_name(&id.name()).expect("should parse");
        assert_eq!(parsed.namespace(), "a");
        assert_eq!(parsed.pod(), "b");
        assert_eq!(parsed.container(), "c");
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        let err = UnitId::parse_name(&UnitName::new("other.a.b.c.service"))
            .expect_err("wrong prefix must fail");
        assert!(matches!(
            err.current_context(),
            UnitError::InvalidName { .. }
        ));
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        for name in ["unitlet.a.b.service", "unitlet.service", "unitlet"] {
            let result = UnitId::parse_name(&UnitName::new(name));
            assert!(result.is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn parse_rejects_dotted_container() {
        // the extra dot lands in the remainder, which must be the bare suffix
        let result = UnitId::parse_name(&UnitName::new("unitlet.a.b.c.d.service"));
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_wrong_suffix_and_empty_fields() {
        assert!(UnitId::parse_name(&UnitName::new("unitlet.a.b.c.socket")).is_err());
        assert!(UnitId::parse_name(&UnitName::new("unitlet..b.c.service")).is_err());
    }

    #[test]
    fn managed_names() {
        assert!(UnitName::new("unitlet.a.b.c.service").is_managed());
        assert!(!UnitName::new("unitletx.a.b.c.service").is_managed());
        assert!(!UnitName::new("unitlet.a.b.c.timer").is_managed());
        assert!(!UnitName::new("sshd.service").is_managed());
    }

    #[test]
    fn ids_order_by_coordinates() {
        let mut ids = vec![
            UnitId::new("b", "a", "a"),
            UnitId::new("a", "b", "a"),
            UnitId::new("a", "a", "b"),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["unitlet.a.a.b", "unitlet.a.b.a", "unitlet.b.a.a"]
        );
    }
}
