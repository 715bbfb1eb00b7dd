//! Reduction of container states into a pod phase and pod status.

use k8s_openapi::api::core::v1::ContainerState;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::PodCondition;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use super::properties::Properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Folds container states into a pod phase.
///
/// Any waiting container forces `Pending`. Otherwise all running gives
/// `Running`, all terminated with exit code 0 gives `Succeeded`, and
/// everything else is `Failed`. The fold is order independent; an empty
/// set counts as all running.
pub fn reduce_phase(statuses: &[ContainerStatus]) -> PodPhase {
    #[derive(Default)]
    struct Tally {
        running: usize,
        succeeded: usize,
        waiting: bool,
    }

    let tally = statuses
        .iter()
        .filter_map(|s| s.state.as_ref())
        .fold(Tally::default(), |mut tally, state| {
            tally.waiting |= state.waiting.is_some();
            if state.running.is_some() {
                tally.running += 1;
            }
            if state.terminated.as_ref().is_some_and(|t| t.exit_code == 0) {
                tally.succeeded += 1;
            }
            tally
        });

    if tally.waiting {
        PodPhase::Pending
    } else if tally.running == statuses.len() {
        PodPhase::Running
    } else if tally.succeeded == statuses.len() {
        PodPhase::Succeeded
    } else {
        PodPhase::Failed
    }
}

/// Status entry for one container.
pub fn container_status(name: &str, props: &Properties, state: ContainerState) -> ContainerStatus {
    let last_state = state.terminated.is_some().then(|| state.clone());
    ContainerStatus {
        name: name.to_string(),
        ready: state.running.is_some(),
        started: Some(state.running.is_some()),
        restart_count: props.restart_count.max(0),
        container_id: Some(props.container_id.to_string()),
        last_state,
        state: Some(state),
        ..Default::default()
    }
}

/// Pod status from container statuses kept in encounter order.
pub fn pod_status(container_statuses: Vec<ContainerStatus>) -> PodStatus {
    let phase = reduce_phase(&container_statuses);
    let start_time = container_statuses
        .iter()
        .filter_map(started_at)
        .min_by_key(|t| t.0);
    let transition = container_statuses
        .iter()
        .filter_map(started_at)
        .max_by_key(|t| t.0);

    let ready = if phase == PodPhase::Running {
        "True"
    } else {
        "False"
    };
    let condition = |type_: &str, status: &str| PodCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: transition.clone(),
        ..Default::default()
    };

    PodStatus {
        phase: Some(phase.to_string()),
        conditions: Some(vec![
            condition("PodScheduled", "True"),
            condition("Initialized", "True"),
            condition("ContainersReady", ready),
            condition("Ready", ready),
        ]),
        start_time,
        container_statuses: Some(container_statuses),
        ..Default::default()
    }
}

fn started_at(status: &ContainerStatus) -> Option<Time> {
    let state = status.state.as_ref()?;
    state
        .running
        .as_ref()
        .and_then(|r| r.started_at.clone())
        .or_else(|| state.terminated.as_ref().and_then(|t| t.started_at.clone()))
}
