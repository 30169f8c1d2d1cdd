//! Typed events in and out of the conversation controller.

use serde::Serialize;

use crate::onboarding::{ExpiryStatus, ResendControl, Stage};
use crate::transcript::Message;

/// Input from the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    UserSubmitted(String),
    ResendRequested,
}

/// Why the controller refused an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// A gateway call is still in flight.
    Busy,
    /// Input is disabled: not started yet, or the session has ended.
    InputDisabled,
    /// No code is pending in this stage.
    ResendUnavailable,
    /// The resend cooldown is still running.
    ResendCoolingDown { remaining: u64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "still waiting for the previous reply"),
            Self::InputDisabled => write!(f, "input is disabled"),
            Self::ResendUnavailable => write!(f, "there is no code to resend"),
            Self::ResendCoolingDown { remaining } => {
                write!(f, "you can request a new code in {remaining}s")
            }
        }
    }
}

/// State changes published for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MessageAppended { message: Message },
    StageChanged { stage: Stage },
    InputChanged { enabled: bool, placeholder: String },
    Busy { busy: bool },
    Resend { control: ResendControl },
    Expiry { status: ExpiryStatus },
    InputRejected { reason: RejectReason },
}
