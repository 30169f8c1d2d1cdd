//! Gateway: the boundary over every network call to the interview service.
//!
//! The conversation core only ever talks to a `dyn Gateway`. `HttpGateway`
//! is the production transport; tests substitute in-memory stubs.

pub mod http;
pub mod types;

pub use http::HttpGateway;
pub use types::*;

use async_trait::async_trait;

use crate::error::GatewayError;

/// The operations the conversation core consumes from the remote service.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open an onboarding session and fetch the greeting.
    async fn start_onboarding(&self) -> Result<OnboardingStart, GatewayError>;

    /// Forward one user message to the onboarding flow.
    async fn continue_onboarding(
        &self,
        onboarding_session_id: &str,
        message: &str,
    ) -> Result<OnboardingReply, GatewayError>;

    /// Ask the server to issue a fresh verification code.
    async fn resend_code(&self, onboarding_session_id: &str) -> Result<ResendReply, GatewayError>;

    /// Open the interview for a verified candidate.
    async fn start_interview(
        &self,
        request: &InterviewStartRequest,
    ) -> Result<InterviewStart, GatewayError>;

    /// Submit an answer and get the next question.
    async fn submit_answer(
        &self,
        session_id: &str,
        answer: &str,
    ) -> Result<AnswerReply, GatewayError>;
}
