//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;
use crate::onboarding::Candidate;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5001";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the interview service; endpoint paths are joined onto it.
    pub base_url: Url,
    /// Upper bound on a single gateway call.
    pub request_timeout: Duration,
    /// Directory for daily-rolling log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
    /// When set, skip onboarding and interview this candidate directly.
    pub direct_candidate: Option<Candidate>,
}

impl ClientConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, applying defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = match get("INTERVIEW_ASSIST_URL") {
            Some(raw) => parse_base_url(raw.trim())?,
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| ConfigError::InvalidValue {
                key: "INTERVIEW_ASSIST_URL".into(),
                message: e.to_string(),
            })?,
        };

        let timeout_secs = match get("INTERVIEW_ASSIST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "INTERVIEW_ASSIST_TIMEOUT_SECS".into(),
                        message: format!("expected a positive number of seconds, got {raw:?}"),
                    });
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let log_dir = get("INTERVIEW_ASSIST_LOG_DIR").map(PathBuf::from);

        let direct_candidate = match (
            get("INTERVIEW_ASSIST_NAME"),
            get("INTERVIEW_ASSIST_EMAIL"),
            get("INTERVIEW_ASSIST_TOPIC"),
        ) {
            (None, None, None) => None,
            (Some(name), Some(email), Some(topic)) => {
                let candidate = Candidate::new(name.trim(), email.trim(), topic.trim());
                if !candidate.is_usable() {
                    return Err(ConfigError::InvalidValue {
                        key: "INTERVIEW_ASSIST_EMAIL".into(),
                        message: format!("{email:?} does not look like an email address"),
                    });
                }
                Some(candidate)
            }
            _ => {
                return Err(ConfigError::MissingRequired {
                    key: "INTERVIEW_ASSIST_NAME / INTERVIEW_ASSIST_EMAIL / INTERVIEW_ASSIST_TOPIC"
                        .into(),
                    hint: "Set all three to skip onboarding, or none of them.".into(),
                });
            }
        };

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            log_dir,
            direct_candidate,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: "INTERVIEW_ASSIST_URL".into(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "INTERVIEW_ASSIST_URL".into(),
            message: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    Ok(url)
}
