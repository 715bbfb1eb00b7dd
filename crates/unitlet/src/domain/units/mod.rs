//! Unit identity and the unit-file encoding.
//!
//! The main components are:
//! - [`UnitId`] / [`UnitName`]: bijective names derived from workload coordinates
//! - [`Unit`]: one container's execution definition
//! - [`unit_file`]: the section/key-value text format systemd reads
//! - [`pod`]: translation between pods and units

pub mod encoding;
pub mod error;
pub mod id;
pub mod pod;
pub mod unit;
pub mod unit_file;

pub use error::UnitError;
pub use id::UnitId;
pub use id::UnitName;
pub use pod::units_from_pod;
pub use unit::Unit;
