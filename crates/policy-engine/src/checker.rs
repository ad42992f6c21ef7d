use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use loginguards_core::SecretString;

/// The remote verdict, normalized to a single flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub compromised: bool,
}

/// Why a remote check did not produce a verdict. None of the variants carry
/// the password or the credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BreachCheckError {
    #[error("unauthorized (credential rejected)")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BreachCheckError {
    /// Short stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BreachCheckError::Unauthorized => "unauthorized",
            BreachCheckError::RateLimited => "rate_limited",
            BreachCheckError::Timeout => "timeout",
            BreachCheckError::Transport(_) => "transport",
            BreachCheckError::Status(_) => "status",
            BreachCheckError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Client for the remote breach-check API.
#[async_trait]
pub trait BreachChecker: Send + Sync {
    async fn check(
        &self,
        password: &SecretString,
        credential: &SecretString,
        timeout: Duration,
    ) -> Result<Verdict, BreachCheckError>;
}
