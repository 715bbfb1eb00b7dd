use core::error::Error;

use error_stack::Context;
use error_stack::Report;

use crate::domain::state::StateError;
use crate::domain::traits::ServiceManagerError;
use crate::domain::traits::StoreError;
use crate::domain::units::UnitError;

/// Errors surfaced to the node agent.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ProviderError {
    #[display("Pod {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[display("Pod units already exist")]
    Conflict,
    #[display("Pod cannot be mapped onto units")]
    InvalidPod,
    #[display("Stored unit file cannot be decoded")]
    Decode,
    #[display("Service manager is not available on this host")]
    Precondition,
    #[display("Service manager or unit store request failed")]
    Transport,
    #[display("{operation} is not supported")]
    Unsupported { operation: &'static str },
    #[display("{operation} is not implemented")]
    NotImplemented { operation: &'static str },
    #[display("Operation cancelled")]
    Cancelled,
}

impl Error for ProviderError {}

impl From<&StoreError> for ProviderError {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { .. } => Self::Conflict,
            StoreError::Decode { .. } => Self::Decode,
            StoreError::Encode { .. } => Self::InvalidPod,
            StoreError::Cancelled => Self::Cancelled,
            StoreError::ReadFailed { .. }
            | StoreError::WriteFailed { .. }
            | StoreError::DeleteFailed { .. } => Self::Transport,
        }
    }
}

impl From<&ServiceManagerError> for ProviderError {
    fn from(err: &ServiceManagerError) -> Self {
        match err {
            ServiceManagerError::NotRunning => Self::Precondition,
            ServiceManagerError::Cancelled => Self::Cancelled,
            ServiceManagerError::ConnectionFailed { .. }
            | ServiceManagerError::CallFailed { .. }
            | ServiceManagerError::EnableRejected { .. }
            | ServiceManagerError::InvalidProperty { .. } => Self::Transport,
        }
    }
}

impl From<&StateError> for ProviderError {
    fn from(err: &StateError) -> Self {
        match err {
            StateError::Cancelled => Self::Cancelled,
            StateError::InvalidUnitName { .. } => Self::Decode,
            StateError::ListFailed | StateError::PropertiesFailed { .. } => Self::Transport,
        }
    }
}

impl From<&UnitError> for ProviderError {
    fn from(_: &UnitError) -> Self {
        Self::InvalidPod
    }
}

/// Lifts a lower-layer report into a [`ProviderError`] report, keeping the
/// original frames.
pub trait ProviderResultExt<T> {
    fn into_provider(self) -> Result<T, Report<ProviderError>>;
}

impl<T, C> ProviderResultExt<T> for Result<T, Report<C>>
where
    C: Context,
    for<'a> ProviderError: From<&'a C>,
{
    fn into_provider(self) -> Result<T, Report<ProviderError>> {
        self.map_err(|report| {
            let context = ProviderError::from(report.current_context());
            report.change_context(context)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn store_errors_map_to_provider_errors() {
        let conflict: Result<(), _> = Err(Report::new(StoreError::AlreadyExists {
            location: PathBuf::from("/x"),
        }));
        let err = conflict.into_provider().expect_err("conflict");
        assert_eq!(err.current_context(), &ProviderError::Conflict);

        let io: Result<(), _> = Err(Report::new(StoreError::ReadFailed {
            location: PathBuf::from("/x"),
        }));
        let err = io.into_provider().expect_err("transport");
        assert_eq!(err.current_context(), &ProviderError::Transport);
    }

    #[test]
    fn cancellation_survives_every_layer() {
        assert_eq!(
            ProviderError::from(&ServiceManagerError::Cancelled),
            ProviderError::Cancelled
        );
        assert_eq!(
            ProviderError::from(&StoreError::Cancelled),
            ProviderError::Cancelled
        );
        assert_eq!(
            ProviderError::from(&StateError::Cancelled),
            ProviderError::Cancelled
        );
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::NotFound {
            namespace: "prod".to_string(),
            name: "web".to_string(),
        };
        assert_eq!(err.to_string(), "Pod prod/web not found");
        assert_eq!(
            ProviderError::Unsupported {
                operation: "Pod update"
            }
            .to_string(),
            "Pod update is not supported"
        );
    }
}
