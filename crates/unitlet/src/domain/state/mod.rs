//! Pod status derived from live service manager state.

mod classify;
mod phase;
pub mod properties;
mod views;

use core::error::Error;

pub use classify::classify;
pub use classify::ContainerLifecycle;
pub use classify::SubState;
pub use phase::container_status;
pub use phase::pod_status;
pub use phase::reduce_phase;
pub use phase::PodPhase;
pub use properties::Properties;
pub use views::collect_views;
pub use views::View;
pub use views::Views;

#[derive(Debug, derive_more::Display)]
pub enum StateError {
    #[display("Failed to list units")]
    ListFailed,
    #[display("Failed to read properties of {unit}")]
    PropertiesFailed { unit: String },
    #[display("Managed unit {unit} has an unparseable name")]
    InvalidUnitName { unit: String },
    #[display("Status query cancelled")]
    Cancelled,
}

impl Error for StateError {}
