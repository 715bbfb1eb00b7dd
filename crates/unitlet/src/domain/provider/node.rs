//! Node object configuration advertised by the provider.

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::NodeCondition;
use k8s_openapi::api::core::v1::NodeSystemInfo;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

pub const NODE_TYPE_LABEL: &str = "type";
pub const NODE_TYPE: &str = "virtual-kubelet";
pub const NODE_ROLE_LABEL: &str = "kubernetes.io/role";
pub const NODE_ROLE: &str = "agent";

/// Kubernetes API version the provider was built against.
pub const K8S_VERSION: &str = "v1.19.10";

/// Resources advertised as both capacity and allocatable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCapacity {
    pub cpu: String,
    pub memory: String,
    pub pods: String,
}

impl Default for NodeCapacity {
    fn default() -> Self {
        Self {
            cpu: "20".to_string(),
            memory: "100Gi".to_string(),
            pods: "20".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub capacity: NodeCapacity,
    pub kubelet_version: String,
    pub kernel_version: String,
    pub operating_system: String,
    pub architecture: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            capacity: NodeCapacity::default(),
            kubelet_version: K8S_VERSION.to_string(),
            kernel_version: String::new(),
            operating_system: std::env::consts::OS.to_string(),
            architecture: go_arch(std::env::consts::ARCH).to_string(),
        }
    }
}

/// Architecture names as Kubernetes spells them.
fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

/// Fills the node object. Existing labels are kept.
pub fn configure_node(node: &mut Node, config: &NodeConfig) {
    let labels = node.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(NODE_TYPE_LABEL.to_string(), NODE_TYPE.to_string());
    labels.insert(NODE_ROLE_LABEL.to_string(), NODE_ROLE.to_string());

    let resources: BTreeMap<String, Quantity> = [
        ("cpu", &config.capacity.cpu),
        ("memory", &config.capacity.memory),
        ("pods", &config.capacity.pods),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Quantity(v.clone())))
    .collect();

    let now = Time(Utc::now());
    let status = node.status.get_or_insert_with(Default::default);
    status.capacity = Some(resources.clone());
    status.allocatable = Some(resources);
    status.node_info = Some(NodeSystemInfo {
        architecture: config.architecture.clone(),
        kernel_version: config.kernel_version.clone(),
        kubelet_version: config.kubelet_version.clone(),
        operating_system: config.operating_system.clone(),
        ..Default::default()
    });
    status.conditions = Some(vec![NodeCondition {
        type_: "Ready".to_string(),
        status: "True".to_string(),
        reason: Some("KubeletReady".to_string()),
        message: Some("unitlet is ready".to_string()),
        last_heartbeat_time: Some(now.clone()),
        last_transition_time: Some(now),
    }]);
}
