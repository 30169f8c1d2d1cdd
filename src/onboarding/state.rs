//! Session state machine: tracks which stage the conversation is in.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The client's top-level stage.
///
/// Progresses: Onboarding ⇄ AwaitingVerificationCode → InterviewActive →
/// Complete, with Terminated reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Onboarding,
    AwaitingVerificationCode,
    InterviewActive,
    Complete,
    Terminated,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            (Onboarding, AwaitingVerificationCode)
                | (AwaitingVerificationCode, Onboarding)
                | (Onboarding | AwaitingVerificationCode, InterviewActive)
                | (InterviewActive, Complete)
                | (Onboarding | AwaitingVerificationCode | InterviewActive, Terminated)
        )
    }

    /// Whether this stage ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Terminated)
    }

    /// Whether user input is routed to the onboarding flow.
    pub fn is_onboarding(&self) -> bool {
        matches!(self, Self::Onboarding | Self::AwaitingVerificationCode)
    }

    /// Input hint shown for this stage.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Onboarding => "Type your reply...",
            Self::AwaitingVerificationCode => "Enter the 5-digit code (or /resend)...",
            Self::InterviewActive => "Type your answer...",
            Self::Complete => "Interview complete.",
            Self::Terminated => "Session ended.",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Onboarding => "onboarding",
            Self::AwaitingVerificationCode => "awaiting_verification_code",
            Self::InterviewActive => "interview_active",
            Self::Complete => "complete",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Candidate profile collected during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub email: String,
    pub topic: String,
    /// Collected by the server but never required to proceed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Candidate {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            topic: topic.into(),
            phone: None,
        }
    }

    /// Whether the profile is complete enough to open an interview.
    pub fn is_usable(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.topic.trim().is_empty()
            && looks_like_email(self.email.trim())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// One end-to-end run: identifiers, stage, and the verified candidate.
#[derive(Debug, Clone)]
pub struct Session {
    /// Client-side id, recorded on log lines for this run.
    pub run_id: Uuid,
    pub onboarding_session_id: Option<String>,
    pub interview_session_id: Option<String>,
    stage: Stage,
    /// Populated only while InterviewActive or Complete.
    candidate: Option<Candidate>,
    /// Candidate waiting for interview-start to succeed.
    handoff: Option<Candidate>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            onboarding_session_id: None,
            interview_session_id: None,
            stage: Stage::Onboarding,
            candidate: None,
            handoff: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    pub fn handoff(&self) -> Option<&Candidate> {
        self.handoff.as_ref()
    }

    /// Move to `target`. Returns the previous stage, or an error for a
    /// transition the state machine does not allow.
    pub fn transition_to(&mut self, target: Stage) -> Result<Stage, String> {
        if !self.stage.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.stage, target));
        }
        let previous = self.stage;
        self.stage = target;
        if !matches!(target, Stage::InterviewActive | Stage::Complete) {
            self.candidate = None;
        }
        if target.is_terminal() {
            self.handoff = None;
        }
        Ok(previous)
    }

    /// Hold a verified candidate until the interview opens.
    pub fn begin_handoff(&mut self, candidate: Candidate) {
        self.handoff = Some(candidate);
    }

    /// Swap the onboarding id for the interview id and enter InterviewActive.
    ///
    /// Fails (leaving the session untouched) when no handoff is pending or the
    /// current stage cannot move to InterviewActive.
    pub fn promote_to_interview(&mut self, interview_session_id: String) -> Result<(), String> {
        if self.handoff.is_none() {
            return Err("No candidate pending for interview start".to_string());
        }
        self.transition_to(Stage::InterviewActive)?;
        self.candidate = self.handoff.take();
        self.onboarding_session_id = None;
        self.interview_session_id = Some(interview_session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate::new("A", "a@x.com", "Go")
    }

    #[test]
    fn valid_transitions() {
        use Stage::*;
        let transitions = [
            (Onboarding, AwaitingVerificationCode),
            (AwaitingVerificationCode, Onboarding),
            (Onboarding, InterviewActive),
            (AwaitingVerificationCode, InterviewActive),
            (AwaitingVerificationCode, Terminated),
            (Onboarding, Terminated),
            (InterviewActive, Complete),
            (InterviewActive, Terminated),
        ];
        for (from, to) in transitions {
            assert!(
                from.can_transition_to(to),
                "{from} should transition to {to}"
            );
        }
    }

    #[test]
    fn invalid_transitions() {
        use Stage::*;
        // Skip ahead
        assert!(!Onboarding.can_transition_to(Complete));
        // Go backward
        assert!(!InterviewActive.can_transition_to(Onboarding));
        // Terminal
        assert!(!Complete.can_transition_to(InterviewActive));
        assert!(!Terminated.can_transition_to(Onboarding));
        // Self-transition
        assert!(!Onboarding.can_transition_to(Onboarding));
    }

    #[test]
    fn is_terminal() {
        use Stage::*;
        assert!(Complete.is_terminal());
        assert!(Terminated.is_terminal());
        assert!(!Onboarding.is_terminal());
        assert!(!AwaitingVerificationCode.is_terminal());
        assert!(!InterviewActive.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        use Stage::*;
        for stage in [
            Onboarding,
            AwaitingVerificationCode,
            InterviewActive,
            Complete,
            Terminated,
        ] {
            let display = format!("{stage}");
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
    }

    #[test]
    fn promotion_swaps_identifiers() {
        let mut session = Session::new();
        session.onboarding_session_id = Some("o1".into());
        session.transition_to(Stage::AwaitingVerificationCode).unwrap();
        session.begin_handoff(candidate());

        session.promote_to_interview("s1".into()).unwrap();

        assert_eq!(session.stage(), Stage::InterviewActive);
        assert!(session.onboarding_session_id.is_none());
        assert_eq!(session.interview_session_id.as_deref(), Some("s1"));
        assert_eq!(session.candidate(), Some(&candidate()));
        assert!(session.handoff().is_none());
    }

    #[test]
    fn promotion_requires_handoff() {
        let mut session = Session::new();
        session.onboarding_session_id = Some("o1".into());
        assert!(session.promote_to_interview("s1".into()).is_err());
        assert_eq!(session.stage(), Stage::Onboarding);
        assert_eq!(session.onboarding_session_id.as_deref(), Some("o1"));
    }

    #[test]
    fn candidate_only_kept_in_interview_stages() {
        let mut session = Session::new();
        session.begin_handoff(candidate());
        session.promote_to_interview("s1".into()).unwrap();
        session.transition_to(Stage::Complete).unwrap();
        assert!(session.candidate().is_some());

        let mut aborted = Session::new();
        aborted.begin_handoff(candidate());
        aborted.promote_to_interview("s2".into()).unwrap();
        aborted.transition_to(Stage::Terminated).unwrap();
        assert!(aborted.candidate().is_none());
    }

    #[test]
    fn usable_candidate() {
        assert!(candidate().is_usable());
        assert!(!Candidate::new("", "a@x.com", "Go").is_usable());
        assert!(!Candidate::new("A", "ax.com", "Go").is_usable());
        assert!(!Candidate::new("A", "a@xcom", "Go").is_usable());
        assert!(!Candidate::new("A", "a@x.com", " ").is_usable());
    }
}
