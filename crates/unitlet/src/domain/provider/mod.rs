//! Pod lifecycle callbacks invoked by the node agent.
//!
//! [`Provider`] is the callback surface; [`Unitlet`] implements it on top
//! of a [`UnitStore`](crate::domain::traits::UnitStore) and a
//! [`ServiceManager`](crate::domain::traits::ServiceManager).

pub mod api;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;
pub mod node;
mod unitlet;

use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodStatus;
use tokio_util::sync::CancellationToken;

pub use api::AttachIo;
pub use api::ContainerLogOpts;
pub use api::LogStream;
pub use error::ProviderError;
pub use error::ProviderResultExt;
pub use node::configure_node;
pub use node::NodeCapacity;
pub use node::NodeConfig;
pub use unitlet::Unitlet;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Provisions one unit per container and starts them.
    async fn create_pod(
        &self,
        pod: &Pod,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>>;

    async fn update_pod(
        &self,
        pod: &Pod,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>>;

    /// Stops and unloads every unit of the pod.
    async fn delete_pod(
        &self,
        pod: &Pod,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>>;

    async fn get_pod(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Pod, Report<ProviderError>>;

    async fn get_pod_status(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<PodStatus, Report<ProviderError>>;

    async fn get_pods(&self, cancel: &CancellationToken) -> Result<Vec<Pod>, Report<ProviderError>>;

    async fn get_container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        opts: &ContainerLogOpts,
        cancel: &CancellationToken,
    ) -> Result<LogStream, Report<ProviderError>>;

    async fn run_in_container(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
        attach: AttachIo,
        cancel: &CancellationToken,
    ) -> Result<(), Report<ProviderError>>;

    /// Fills capacity, system info, conditions and labels of the node object.
    fn configure_node(&self, node: &mut Node);
}
