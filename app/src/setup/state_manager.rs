//! Setup State Machine - Single source of truth for valid stage transitions
//!
//! State diagram:
//! ```text
//! Checking ──ServiceRunning──> ModelChecking ──ModelFound──> ModelAvailable ──Connect──> Connecting
//!    │                             ↑    │                       ↑    ↑                    │    │
//! [ServiceMissing]                 │ [ModelMissing]             │    └───CommitFailed─────┘    │
//!    ↓                             │    ↓                       │                     [CommitSucceeded]
//! ServiceAbsent ──StartInstall──> Polling    ModelAbsent ──StartDownload──> Downloading          ↓
//!                                  │  ↑           ↑                            │              Connected
//!                        [PollTimedOut]           └───────DownloadFailed───────┤
//!                                  ↓                                           └─DownloadSucceeded─> ModelAvailable
//!                               Failed ──Retry──> Checking
//! ```
//!
//! Polling reaches ModelChecking through ServiceRunning, same as Checking.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Events that can trigger stage transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SetupEvent {
    /// A probe saw the runtime answering
    ServiceRunning,
    /// The initial probe found nothing
    ServiceMissing,
    /// User went to install the runtime; start waiting for it
    StartInstall,
    /// Waited longer than the configured poll deadline
    PollTimedOut,
    ModelFound,
    ModelMissing,
    /// User asked to pull the model
    StartDownload,
    DownloadSucceeded,
    DownloadFailed,
    /// User confirmed using the runtime; commit configuration
    Connect,
    CommitSucceeded,
    CommitFailed,
    /// Start over from the initial probe
    Retry,
}

/// Setup stages
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SetupStage {
    /// Initial probe in flight
    Checking,
    /// Runtime not found; waiting for the user to install it
    ServiceAbsent,
    /// Probing on an interval until the runtime shows up
    Polling,
    /// Asking the runtime whether the model is installed
    ModelChecking,
    /// Runtime is up but the model is missing
    ModelAbsent,
    /// Pull in progress
    Downloading,
    /// Ready to commit configuration
    ModelAvailable,
    /// Configuration commit in progress
    Connecting,
    /// Configuration committed - setup is done
    Connected,
    /// Gave up waiting for the runtime
    Failed,
}

impl SetupStage {
    /// Stages that only change after a user action
    pub fn awaits_user(self) -> bool {
        matches!(
            self,
            Self::ServiceAbsent | Self::ModelAbsent | Self::ModelAvailable | Self::Failed
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Connected
    }
}

/// Result of a successful state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Stage changed
    Changed { from: SetupStage, to: SetupStage },
    /// Event was valid but stage didn't change
    Unchanged,
}

/// Reason a transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{attempted_event} event rejected in {current_state} stage")]
pub struct TransitionRejection {
    pub current_state: SetupStage,
    pub attempted_event: SetupEvent,
}

/// Thread-safe setup stage holder.
///
/// The stage lives in a watch channel so observers can wait for it to move.
#[derive(Debug)]
pub struct SetupStateManager {
    state: watch::Sender<SetupStage>,
}

impl SetupStateManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SetupStage::Checking);
        Self { state }
    }

    /// Get the current stage (read-only, thread-safe)
    pub fn current(&self) -> SetupStage {
        *self.state.borrow()
    }

    /// Receiver that sees every stage change from now on
    pub fn subscribe(&self) -> watch::Receiver<SetupStage> {
        self.state.subscribe()
    }

    /// Attempt a stage transition based on an event
    ///
    /// This is the ONLY way to change the stage - ensures all transitions are valid.
    pub fn transition(&self, event: SetupEvent) -> Result<TransitionResult, TransitionRejection> {
        let mut outcome = Ok(TransitionResult::Unchanged);

        self.state.send_if_modified(|state| {
            let current = *state;
            match compute_transition(current, event) {
                Some(new_state) if new_state == current => false,
                Some(new_state) => {
                    *state = new_state;
                    outcome = Ok(TransitionResult::Changed {
                        from: current,
                        to: new_state,
                    });
                    true
                }
                None => {
                    outcome = Err(TransitionRejection {
                        current_state: current,
                        attempted_event: event,
                    });
                    false
                }
            }
        });

        outcome
    }
}

impl Default for SetupStateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure function: compute the next stage (if any)
/// Returns None if the transition is invalid
fn compute_transition(current: SetupStage, event: SetupEvent) -> Option<SetupStage> {
    use SetupEvent as E;
    use SetupStage as S;

    match (current, event) {
        (S::Checking, E::ServiceRunning) => Some(S::ModelChecking),
        (S::Checking, E::ServiceMissing) => Some(S::ServiceAbsent),

        (S::ServiceAbsent, E::StartInstall) => Some(S::Polling),

        (S::Polling, E::ServiceRunning) => Some(S::ModelChecking),
        (S::Polling, E::PollTimedOut) => Some(S::Failed),

        (S::ModelChecking, E::ModelFound) => Some(S::ModelAvailable),
        (S::ModelChecking, E::ModelMissing) => Some(S::ModelAbsent),

        (S::ModelAbsent, E::StartDownload) => Some(S::Downloading),

        (S::Downloading, E::DownloadSucceeded) => Some(S::ModelAvailable),
        (S::Downloading, E::DownloadFailed) => Some(S::ModelAbsent),

        (S::ModelAvailable, E::Connect) => Some(S::Connecting),

        (S::Connecting, E::CommitSucceeded) => Some(S::Connected),
        (S::Connecting, E::CommitFailed) => Some(S::ModelAvailable),

        (S::Failed, E::Retry) => Some(S::Checking),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn drive(manager: &SetupStateManager, events: &[SetupEvent]) {
        for event in events {
            manager
                .transition(*event)
                .unwrap_or_else(|e| panic!("unexpected rejection: {}", e));
        }
    }

    #[test]
    fn test_happy_paths() {
        use SetupEvent::*;

        let test_cases = vec![
            (
                "already installed",
                vec![ServiceRunning, ModelFound, Connect, CommitSucceeded],
                SetupStage::Connected,
            ),
            (
                "install then download",
                vec![
                    ServiceMissing,
                    StartInstall,
                    ServiceRunning,
                    ModelMissing,
                    StartDownload,
                    DownloadSucceeded,
                ],
                SetupStage::ModelAvailable,
            ),
            (
                "download fails",
                vec![ServiceRunning, ModelMissing, StartDownload, DownloadFailed],
                SetupStage::ModelAbsent,
            ),
            (
                "commit fails",
                vec![ServiceRunning, ModelFound, Connect, CommitFailed],
                SetupStage::ModelAvailable,
            ),
            (
                "poll timeout then retry",
                vec![ServiceMissing, StartInstall, PollTimedOut, Retry],
                SetupStage::Checking,
            ),
        ];

        for (description, events, expected) in test_cases {
            let manager = SetupStateManager::new();
            drive(&manager, &events);
            assert_eq!(manager.current(), expected, "{}", description);
        }
    }

    #[test]
    fn test_rejection_keeps_stage() {
        let manager = SetupStateManager::new();

        let rejection = manager.transition(SetupEvent::StartDownload).unwrap_err();

        assert_eq!(rejection.current_state, SetupStage::Checking);
        assert_eq!(rejection.attempted_event, SetupEvent::StartDownload);
        assert_eq!(
            rejection.to_string(),
            "StartDownload event rejected in checking stage"
        );
        assert_eq!(manager.current(), SetupStage::Checking);
    }

    #[test]
    fn test_connected_is_final() {
        let manager = SetupStateManager::new();
        drive(
            &manager,
            &[
                SetupEvent::ServiceRunning,
                SetupEvent::ModelFound,
                SetupEvent::Connect,
                SetupEvent::CommitSucceeded,
            ],
        );

        for event in [
            SetupEvent::Retry,
            SetupEvent::Connect,
            SetupEvent::ServiceRunning,
            SetupEvent::StartDownload,
        ] {
            assert!(manager.transition(event).is_err());
        }
        assert!(manager.current().is_terminal());
    }

    #[test]
    fn test_every_stage_but_checking_is_reachable() {
        // Walk the table from Checking; every stage must show up somewhere.
        let events = [
            SetupEvent::ServiceRunning,
            SetupEvent::ServiceMissing,
            SetupEvent::StartInstall,
            SetupEvent::PollTimedOut,
            SetupEvent::ModelFound,
            SetupEvent::ModelMissing,
            SetupEvent::StartDownload,
            SetupEvent::DownloadSucceeded,
            SetupEvent::DownloadFailed,
            SetupEvent::Connect,
            SetupEvent::CommitSucceeded,
            SetupEvent::CommitFailed,
            SetupEvent::Retry,
        ];

        let mut seen = vec![SetupStage::Checking];
        let mut frontier = vec![SetupStage::Checking];
        while let Some(stage) = frontier.pop() {
            for event in events {
                if let Some(next) = compute_transition(stage, event) {
                    if !seen.contains(&next) {
                        seen.push(next);
                        frontier.push(next);
                    }
                }
            }
        }

        for stage in SetupStage::iter() {
            assert!(seen.contains(&stage), "{} is unreachable", stage);
        }
    }

    #[test]
    fn test_subscribers_see_changes() {
        let manager = SetupStateManager::new();
        let mut rx = manager.subscribe();

        manager.transition(SetupEvent::ServiceMissing).unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SetupStage::ServiceAbsent);

        // Rejected events don't wake subscribers
        let _ = manager.transition(SetupEvent::Connect);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(SetupStage::ServiceAbsent.to_string(), "service-absent");
        assert_eq!(
            serde_json::to_string(&SetupStage::ModelAvailable).unwrap(),
            "\"model-available\""
        );
    }
}
