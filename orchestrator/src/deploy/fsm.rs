//! Finite state machine for deployment records

use api_models::models::DeployStatus;

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    /// Picked up by a deployment worker
    Dispatch,

    /// Compose run and container registration both succeeded
    Succeed,

    /// Anything after dispatch went wrong
    Fail(String),

    /// Abandoned before a worker picked it up
    Cancel(String),
}

/// Compute the next status for `event`, or an error for an illegal transition.
///
/// Legal moves are `PENDING -> DEPLOYING`, `PENDING -> CANCELED` and
/// `DEPLOYING -> SUCCESS | FAILED`. Terminal states accept nothing.
pub fn transition(state: &DeployStatus, event: &DeployEvent) -> Result<DeployStatus, String> {
    let next = match (state, event) {
        // From Pending
        (DeployStatus::Pending, DeployEvent::Dispatch) => DeployStatus::Deploying,
        (DeployStatus::Pending, DeployEvent::Cancel(_)) => DeployStatus::Canceled,

        // From Deploying
        (DeployStatus::Deploying, DeployEvent::Succeed) => DeployStatus::Success,
        (DeployStatus::Deploying, DeployEvent::Fail(_)) => DeployStatus::Failed,

        // Invalid transitions
        (state, _) if state.is_terminal() => {
            return Err(format!("deploy is already {}", state));
        }
        (state, event) => {
            return Err(format!("{} -> {:?}", state, event));
        }
    };
    Ok(next)
}

/// The error message an event attaches to the record, if any
pub fn event_message(event: &DeployEvent) -> Option<&str> {
    match event {
        DeployEvent::Fail(msg) | DeployEvent::Cancel(msg) => Some(msg.as_str()),
        DeployEvent::Dispatch | DeployEvent::Succeed => None,
    }
}
