//! One log event per decision, under the `loginguards::audit` target.
//!
//! Events carry the outcome and, when enabled, the account name. The
//! candidate password and the API credential are never recorded.

use tracing::{info, warn};
use uuid::Uuid;

use loginguards_core::ipc::{DecisionRequest, PasswordOp};
use loginguards_core::Reason;
use policy_engine::{DecisionCause, PolicyDecision};

fn op_label(op: PasswordOp) -> &'static str {
    match op {
        PasswordOp::Change => "change",
        PasswordOp::Reset => "reset",
    }
}

fn cause_label(cause: &DecisionCause) -> String {
    match cause {
        DecisionCause::Malformed(malformed) => malformed.to_string(),
        DecisionCause::Remote(err) => format!("{}: {err}", err.kind()),
    }
}

pub fn record(
    conn: &Uuid,
    decision: &PolicyDecision,
    request: Option<&DecisionRequest>,
    log_username: bool,
) {
    let user = request
        .filter(|_| log_username)
        .and_then(|request| request.username.as_deref());
    let op = request.and_then(DecisionRequest::op).map(op_label);
    let cause = decision.cause.as_ref().map(cause_label);
    let reason = decision.reason.as_str();

    match decision.reason {
        Reason::Compromised => warn!(
            target: "loginguards::audit",
            conn = %conn,
            allow = decision.allow,
            reason,
            user,
            op,
            "password found in breach corpus"
        ),
        Reason::Ok => info!(
            target: "loginguards::audit",
            conn = %conn,
            allow = decision.allow,
            reason,
            user,
            op,
            "password accepted"
        ),
        _ => info!(
            target: "loginguards::audit",
            conn = %conn,
            allow = decision.allow,
            reason,
            user,
            op,
            cause = cause.as_deref(),
            "decision made without a remote verdict"
        ),
    }
}
