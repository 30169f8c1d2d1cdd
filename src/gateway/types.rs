//! Request and response shapes exchanged with the interview service.

use serde::{Deserialize, Serialize};

use crate::onboarding::state::Candidate;

/// Server stage name meaning "waiting for the emailed one-time code".
pub const EMAIL_CODE_STAGE: &str = "email_code";

/// Verification hints the server attaches to onboarding responses.
///
/// Every field is optional; which ones are present drives the resend and
/// expiry countdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resend_available_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_left: Option<i64>,
}

impl VerificationMetadata {
    /// Metadata for a freshly issued code.
    pub fn email_code(
        resend_available_in: Option<i64>,
        expires_in: Option<i64>,
        attempts_left: Option<i64>,
    ) -> Self {
        Self {
            stage: Some(EMAIL_CODE_STAGE.to_string()),
            resend_available_in,
            expires_in,
            attempts_left,
        }
    }

    pub fn is_email_code(&self) -> bool {
        self.stage.as_deref() == Some(EMAIL_CODE_STAGE)
    }
}

/// Response to onboarding-start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OnboardingStart {
    #[serde(alias = "session_id")]
    pub onboarding_session_id: String,
    pub message: String,
    #[serde(flatten)]
    pub verification: VerificationMetadata,
}

/// Candidate profile as sent by the server. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl CandidatePayload {
    /// Convert into a usable profile, or `None` when a required field is
    /// missing or malformed.
    pub fn into_candidate(self) -> Option<Candidate> {
        let candidate = Candidate {
            name: self.name?.trim().to_string(),
            email: self.email?.trim().to_string(),
            topic: self.topic?.trim().to_string(),
            phone: self.phone.filter(|p| !p.trim().is_empty()),
        };
        candidate.is_usable().then_some(candidate)
    }
}

/// Response to onboarding-continue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OnboardingReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub verification: VerificationMetadata,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub candidate: Option<CandidatePayload>,
}

/// Response to onboarding-resend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResendReply {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub resend_available_in: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub attempts_left: Option<i64>,
    #[serde(default)]
    pub finished: bool,
}

impl ResendReply {
    /// A reissued code is handled exactly like a fresh `email_code` event.
    pub fn as_metadata(&self) -> VerificationMetadata {
        VerificationMetadata::email_code(
            self.resend_available_in,
            self.expires_in,
            self.attempts_left,
        )
    }
}

/// Request body for interview-start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterviewStartRequest {
    pub topic: String,
    pub name: String,
    pub email: String,
}

impl From<&Candidate> for InterviewStartRequest {
    fn from(candidate: &Candidate) -> Self {
        Self {
            topic: candidate.topic.clone(),
            name: candidate.name.clone(),
            email: candidate.email.clone(),
        }
    }
}

/// Response to interview-start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterviewStart {
    pub session_id: String,
    pub question: String,
}

/// Response to interview-submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnswerReply {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub finished: bool,
}
