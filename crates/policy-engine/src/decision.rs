use loginguards_core::ipc::{DecisionResponse, MalformedRequest, Reason};

use crate::checker::BreachCheckError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allow: bool,
    pub reason: Reason,
    pub cause: Option<DecisionCause>,
}

/// Detail behind a failure reason, kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionCause {
    Malformed(MalformedRequest),
    Remote(BreachCheckError),
}

impl PolicyDecision {
    pub fn bad_request(cause: MalformedRequest) -> Self {
        Self {
            allow: false,
            reason: Reason::BadRequest,
            cause: Some(DecisionCause::Malformed(cause)),
        }
    }

    pub fn response(&self) -> DecisionResponse {
        DecisionResponse {
            allow: self.allow,
            reason: self.reason,
        }
    }
}
