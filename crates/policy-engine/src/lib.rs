use std::sync::Arc;

use loginguards_core::config::PolicyConfiguration;
use loginguards_core::ipc::Reason;
use loginguards_core::SecretString;

mod checker;
mod decision;

pub use checker::{BreachCheckError, BreachChecker, Verdict};
pub use decision::{DecisionCause, PolicyDecision};

/// Read-only view of the settings and credential a decision is made against.
///
/// The service publishes a new snapshot on reload; in-flight decisions keep
/// the one they started with.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    pub config: PolicyConfiguration,
    pub credential: Option<SecretString>,
}

/// Decides whether a candidate password is acceptable.
#[derive(Clone)]
pub struct PolicyEngine {
    checker: Arc<dyn BreachChecker>,
}

impl PolicyEngine {
    pub fn new(checker: Arc<dyn BreachChecker>) -> Self {
        Self { checker }
    }

    /// Evaluates one well-formed request. Never fails: every remote problem
    /// becomes an `api_error` decision governed by the fail mode.
    pub async fn evaluate(&self, snapshot: &PolicySnapshot, password: &SecretString) -> PolicyDecision {
        let fail_allows = snapshot.config.fail_mode.allows_on_failure();
        let Some(credential) = snapshot.credential.as_ref() else {
            return PolicyDecision {
                allow: fail_allows,
                reason: Reason::NoCredential,
                cause: None,
            };
        };

        let timeout = snapshot.config.decision_timeout;
        let outcome = match tokio::time::timeout(
            timeout,
            self.checker.check(password, credential, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BreachCheckError::Timeout),
        };

        match outcome {
            // A known-compromised password is refused whatever the fail mode.
            Ok(Verdict { compromised: true }) => PolicyDecision {
                allow: false,
                reason: Reason::Compromised,
                cause: None,
            },
            Ok(Verdict { compromised: false }) => PolicyDecision {
                allow: true,
                reason: Reason::Ok,
                cause: None,
            },
            Err(err) => PolicyDecision {
                allow: fail_allows,
                reason: Reason::ApiError,
                cause: Some(DecisionCause::Remote(err)),
            },
        }
    }
}
