use core::error::Error;

/// Errors raised while encoding or decoding unit names and unit files.
#[derive(Debug, derive_more::Display)]
pub enum UnitError {
    #[display("Invalid unit name: {name}")]
    InvalidName { name: String },
    #[display("Malformed unit file at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[display("Unit file is missing required field {field}")]
    MissingField { field: &'static str },
    #[display("Unit file field {field} has invalid value {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[display("Field {field} cannot be encoded into a unit file")]
    Unencodable { field: &'static str },
}

impl Error for UnitError {}
