//! Approval and deprecation of protocols by reviewers.

use chrono::Utc;
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::config::*;
use crate::store::ProtocolStore;

/// Records the decision on the protocol. Returns true if the actor was not already
/// recorded for this decision.
///
/// An approval only touches the approvals, a deprecation only the deprecations.
pub fn apply_decision(protocol: &mut Protocol, actor: &str, decision: Decision) -> bool {
    match decision {
        Decision::Approval => protocol.approvals.insert(actor.to_string()),
        Decision::Deprecation => protocol.deprecations.insert(actor.to_string()),
    }
}

/// Records the decision of `actor` about a protocol and persists it.
///
/// The write is a compare-and-swap: if another decision was stored in between, this fails
/// with `Conflict` and the caller has to retry. See `Verifier` for a retrying version.
pub fn verify<S: ProtocolStore + ?Sized>(
    store: &S,
    id: &ProtocolId,
    actor: &str,
    decision: Decision,
) -> CountingResult<Protocol> {
    ensure!(
        !actor.trim().is_empty(),
        InvalidArgumentSnafu {
            reason: "the actor id may not be empty"
        }
    );
    let mut protocol = store.find_by_id(id).context(NotFoundSnafu {
        entity: "protocol",
        key: id.to_string(),
    })?;
    let read_revision = protocol.revision;
    let added = apply_decision(&mut protocol, actor, decision);
    debug!(
        "verify: protocol {} {} by {} (new: {})",
        id, decision, actor, added
    );
    protocol.update_time = Utc::now();
    store.compare_and_swap(protocol, read_revision)
}

/// Records decisions, retrying when a concurrent write got in the way.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Verifier {
    pub max_attempts: u32,
}

impl Verifier {
    pub const DEFAULT: Verifier = Verifier { max_attempts: 3 };

    pub fn new(max_attempts: u32) -> CountingResult<Verifier> {
        ensure!(
            max_attempts >= 1,
            InvalidArgumentSnafu {
                reason: "at least one attempt is required"
            }
        );
        Ok(Verifier { max_attempts })
    }

    /// Like `verify`. `Conflict` is only returned once all the attempts failed.
    pub fn verify<S: ProtocolStore + ?Sized>(
        &self,
        store: &S,
        id: &ProtocolId,
        actor: &str,
        decision: Decision,
    ) -> CountingResult<Protocol> {
        let mut attempt = 1;
        loop {
            match verify(store, id, actor, decision) {
                Err(CountingError::Conflict { .. }) if attempt < self.max_attempts => {
                    warn!(
                        "verify: concurrent update on protocol {}, attempt {}/{}",
                        id, attempt, self.max_attempts
                    );
                    attempt += 1;
                }
                Ok(p) => {
                    info!(
                        "Protocol {}: {} by {} ({} approvals, {} deprecations)",
                        id,
                        decision,
                        actor,
                        p.approvals.len(),
                        p.deprecations.len()
                    );
                    return Ok(p);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Verifier::DEFAULT
    }
}
