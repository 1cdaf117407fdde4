//! Hash-identified changes, as recorded in a document's log.

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::hash::ChangeHash;

/// An immutable unit of mutation authored by a single actor.
///
/// Carries the change's identity and causal position; its effect on the
/// document is read with [`Replica::change_diff`](crate::Replica::change_diff).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    hash: ChangeHash,
    actor: ActorId,
    seq: u64,
    start_op: u64,
    max_op: u64,
    time: i64,
    message: Option<String>,
    deps: Vec<ChangeHash>,
}

impl Change {
    pub(crate) fn from_engine(change: &automerge::Change) -> Self {
        let mut deps: Vec<ChangeHash> = change.deps().iter().copied().map(Into::into).collect();
        deps.sort_unstable();
        Change {
            hash: change.hash().into(),
            actor: ActorId::from_engine(change.actor_id()),
            seq: change.seq(),
            start_op: change.start_op().get(),
            max_op: change.max_op(),
            time: change.timestamp(),
            message: change.message().cloned(),
            deps,
        }
    }

    pub fn hash(&self) -> ChangeHash {
        self.hash
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Per-actor sequence number, starting at 1.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Counter of the first operation.
    pub fn start_op(&self) -> u64 {
        self.start_op
    }

    /// Highest operation counter used by this change.
    pub fn max_op(&self) -> u64 {
        self.max_op
    }

    /// Number of operations in the change.
    pub fn op_count(&self) -> u64 {
        (self.max_op + 1).saturating_sub(self.start_op)
    }

    /// Milliseconds since the Unix epoch at which the change was committed.
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Sorted hashes of the changes this one was made on top of.
    pub fn deps(&self) -> &[ChangeHash] {
        &self.deps
    }
}
