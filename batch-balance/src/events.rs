//! Progress and status events emitted by the runner

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::summary::format_amount;

/// Lifecycle of a [`crate::BatchRunner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    /// No batch loaded
    #[default]
    Idle,
    /// A batch passed reconciliation and pre-flight and can be started
    Ready,
    Running,
    /// The current step waits on the operator
    AwaitingConfirmation,
    Completed,
    Failed,
}

impl RunnerStatus {
    /// Whether a step may currently be in flight
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunnerStatus::Running | RunnerStatus::AwaitingConfirmation
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Ready {
        cursor: usize,
        total: usize,
        resumed: bool,
    },
    Started {
        cursor: usize,
        total: usize,
    },
    StepStarted {
        index: usize,
        target_id: String,
        amount: i64,
    },
    AwaitingConfirmation {
        index: usize,
        target_id: String,
        amount: i64,
        /// Button-style prompt, e.g. `Add money: Leslie [15] +120`
        prompt: String,
    },
    Progress {
        done: usize,
        total: usize,
        target_id: String,
    },
    StepFailed {
        index: usize,
        target_id: String,
        message: String,
    },
    Completed {
        total: usize,
    },
    Failed {
        message: String,
    },
    Cleared,
}

impl BatchEvent {
    /// Text for the status line of a presentation layer
    pub fn status_line(&self) -> String {
        match self {
            BatchEvent::Ready { cursor, total, .. } => {
                format!("Progress: {cursor} / {total} done")
            }
            BatchEvent::Started { cursor, total } => {
                format!("Current progress: {cursor} / {total} done")
            }
            BatchEvent::StepStarted {
                index,
                target_id,
                amount,
            } => format!("Step {}: [{target_id}] {}", index + 1, format_amount(*amount)),
            BatchEvent::AwaitingConfirmation { prompt, .. } => prompt.clone(),
            BatchEvent::Progress { done, total, .. } => format!("Progress: {done} / {total} done"),
            BatchEvent::StepFailed { message, .. } | BatchEvent::Failed { message } => {
                message.clone()
            }
            BatchEvent::Completed { .. } => "All done!".to_string(),
            BatchEvent::Cleared => {
                "Saved data has been deleted, please reload the page".to_string()
            }
        }
    }

    /// Terminal error events are rendered differently by presentation layers
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            BatchEvent::StepFailed { .. } | BatchEvent::Failed { .. }
        )
    }
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status_line())
    }
}
