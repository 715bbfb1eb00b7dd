//! Classification of systemd sub-states into container lifecycle states.

use k8s_openapi::api::core::v1::ContainerState;
use k8s_openapi::api::core::v1::ContainerStateRunning;
use k8s_openapi::api::core::v1::ContainerStateTerminated;
use k8s_openapi::api::core::v1::ContainerStateWaiting;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tracing::warn;

use super::phase::PodPhase;
use super::properties::Properties;

/// Service sub-state as reported by systemd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubState {
    Running,
    AutoRestart,
    Reload,
    Exited,
    Failed,
    Dead,
    Condition,
    /// `start`, `start-pre`, `start-post`, ...
    Starting(String),
    /// `stop`, `stop-sigterm`, `stop-post`, ...
    Stopping(String),
    Other(String),
}

impl SubState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "auto-restart" => Self::AutoRestart,
            "reload" => Self::Reload,
            "exited" => Self::Exited,
            "failed" => Self::Failed,
            "dead" => Self::Dead,
            "condition" => Self::Condition,
            s if s.starts_with("stop") => Self::Stopping(s.to_string()),
            s if s.starts_with("start") => Self::Starting(s.to_string()),
            s => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::AutoRestart => "auto-restart",
            Self::Reload => "reload",
            Self::Exited => "exited",
            Self::Failed => "failed",
            Self::Dead => "dead",
            Self::Condition => "condition",
            Self::Starting(s) | Self::Stopping(s) | Self::Other(s) => s,
        }
    }
}

/// Container lifecycle state derived from one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerLifecycle {
    Waiting {
        reason: String,
    },
    Running {
        started_at: Option<Time>,
    },
    Terminated {
        exit_code: i32,
        started_at: Option<Time>,
        finished_at: Option<Time>,
        container_id: String,
    },
    Unknown {
        sub_state: String,
    },
}

/// Classifies a sub-state. Pure: equal inputs give equal outputs.
///
/// `dead` splits on the finished-at timestamp: a unit that never ran is
/// waiting, one that ran and died is terminated.
pub fn classify(sub_state: &SubState, props: &Properties) -> ContainerLifecycle {
    match sub_state {
        SubState::Stopping(_) | SubState::Failed | SubState::Exited => terminated(props),
        SubState::Dead if props.finished_at.is_some() => terminated(props),
        SubState::Starting(_) | SubState::Condition | SubState::Dead => {
            ContainerLifecycle::Waiting {
                reason: sub_state.as_str().to_string(),
            }
        }
        SubState::Running | SubState::AutoRestart | SubState::Reload => {
            ContainerLifecycle::Running {
                started_at: props.started_at.clone(),
            }
        }
        SubState::Other(s) => ContainerLifecycle::Unknown {
            sub_state: s.clone(),
        },
    }
}

fn terminated(props: &Properties) -> ContainerLifecycle {
    ContainerLifecycle::Terminated {
        exit_code: props.exit_code,
        started_at: props.started_at.clone(),
        finished_at: props.finished_at.clone(),
        container_id: props.container_id.to_string(),
    }
}

impl ContainerLifecycle {
    /// Kubernetes view of the state.
    ///
    /// An unknown sub-state yields an empty state so status reporting keeps
    /// working when systemd grows new sub-states.
    pub fn to_container_state(&self) -> ContainerState {
        match self {
            Self::Waiting { reason } => ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.clone()),
                    message: Some(reason.clone()),
                }),
                ..Default::default()
            },
            Self::Running { started_at } => ContainerState {
                running: Some(ContainerStateRunning {
                    started_at: started_at.clone(),
                }),
                ..Default::default()
            },
            Self::Terminated {
                exit_code,
                started_at,
                finished_at,
                container_id,
            } => {
                let reason = if *exit_code == 0 {
                    PodPhase::Succeeded
                } else {
                    PodPhase::Failed
                };
                ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code: *exit_code,
                        reason: Some(reason.to_string()),
                        message: Some(reason.to_string()),
                        started_at: started_at.clone(),
                        finished_at: finished_at.clone(),
                        container_id: Some(container_id.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            }
            Self::Unknown { sub_state } => {
                warn!(sub_state = %sub_state, "unknown sub-state");
                ContainerState::default()
            }
        }
    }
}
