//! HTTP gateway: JSON over `reqwest` against the interview service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::GatewayError;

use super::types::{
    AnswerReply, InterviewStart, InterviewStartRequest, OnboardingReply, OnboardingStart,
    ResendReply,
};
use super::Gateway;

const ONBOARDING_START_PATH: &str = "onboarding/start";
const ONBOARDING_CONTINUE_PATH: &str = "onboarding/continue";
const ONBOARDING_RESEND_PATH: &str = "onboarding/resend";
const INTERVIEW_START_PATH: &str = "start-interview";
const INTERVIEW_SUBMIT_PATH: &str = "submit";

/// Gateway backed by the service's REST endpoints.
pub struct HttpGateway {
    base_url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: with_trailing_slash(base_url),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        Self::new(config.base_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::transport(format!("Bad endpoint {path}: {e}")))
    }

    /// POST a JSON body and decode the answer for `operation`.
    async fn post<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GatewayError> {
        let url = self.endpoint(path)?;
        tracing::debug!(operation, %url, "Gateway request");

        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        let result = decode(operation, status, &text);
        if let Err(ref e) = result {
            tracing::warn!(operation, status = %status, error = %e, "Gateway call failed");
        }
        result
    }

    fn transport_error(&self, operation: &'static str, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::timed_out(operation, self.timeout)
        } else {
            GatewayError::transport(format!("{operation}: {e}"))
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn start_onboarding(&self) -> Result<OnboardingStart, GatewayError> {
        self.post(
            "onboarding-start",
            ONBOARDING_START_PATH,
            &serde_json::json!({}),
        )
        .await
    }

    async fn continue_onboarding(
        &self,
        onboarding_session_id: &str,
        message: &str,
    ) -> Result<OnboardingReply, GatewayError> {
        let body = serde_json::json!({
            "onboarding_session_id": onboarding_session_id,
            "message": message,
        });
        self.post("onboarding-continue", ONBOARDING_CONTINUE_PATH, &body)
            .await
    }

    async fn resend_code(&self, onboarding_session_id: &str) -> Result<ResendReply, GatewayError> {
        let body = serde_json::json!({ "onboarding_session_id": onboarding_session_id });
        self.post("onboarding-resend", ONBOARDING_RESEND_PATH, &body)
            .await
    }

    async fn start_interview(
        &self,
        request: &InterviewStartRequest,
    ) -> Result<InterviewStart, GatewayError> {
        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::transport(format!("interview-start: {e}")))?;
        self.post("interview-start", INTERVIEW_START_PATH, &body)
            .await
    }

    async fn submit_answer(
        &self,
        session_id: &str,
        answer: &str,
    ) -> Result<AnswerReply, GatewayError> {
        let body = serde_json::json!({ "session_id": session_id, "answer": answer });
        self.post("interview-submit", INTERVIEW_SUBMIT_PATH, &body)
            .await
    }
}

/// Classify a raw HTTP answer.
///
/// An `error` field in the body wins over the status code, because the
/// service reports its own failures as JSON with 4xx/5xx statuses.
pub(crate) fn decode<T: DeserializeOwned>(
    operation: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, GatewayError> {
    let parsed = serde_json::from_str::<serde_json::Value>(body);

    if let Ok(ref value) = parsed {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            return Err(GatewayError::Server {
                message: message.to_string(),
                finished: value
                    .get("finished")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            });
        }
    }

    if !status.is_success() {
        return Err(GatewayError::server(format!(
            "{operation} failed with HTTP {status}"
        )));
    }

    let value = parsed
        .map_err(|e| GatewayError::transport(format!("{operation}: invalid JSON body: {e}")))?;
    serde_json::from_value(value).map_err(|e| GatewayError::protocol(format!("{operation}: {e}")))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
