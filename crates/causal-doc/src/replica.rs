//! The replica contract the history layer is written against.

use serde_json::Value;

use crate::change::Change;
use crate::error::EngineError;
use crate::hash::{ChangeHash, Frontier};
use crate::object::ObjId;
use crate::patch::{Patch, Prop};
use crate::transaction::Transact;
use crate::url::DocUrl;

/// A replica of a causally ordered, mergeable document.
///
/// Implementations must guarantee:
///
/// * [`changes`](Replica::changes) is a topological order of the change
///   graph (every change appears after all of its dependencies), and it only
///   ever grows by appending.
/// * [`merge`](Replica::merge) is idempotent and commutative up to the
///   resulting view: any two replicas holding the same set of changes render
///   the same JSON.
/// * [`diff`](Replica::diff) returns a sequential patch list which, applied to
///   [`view_at(from)`](Replica::view_at), yields `view_at(to)`.
pub trait Replica: Sized {
    fn url(&self) -> &DocUrl;

    /// Current heads: the changes nothing else depends on.
    fn heads(&self) -> Frontier;

    /// Every change held, in application order.
    fn changes(&self) -> &[Change];

    fn get_change(&self, hash: &ChangeHash) -> Option<&Change>;

    fn diff(&self, from: &Frontier, to: &Frontier) -> Result<Vec<Patch>, EngineError>;

    /// The effect of a single change: the diff from its dependencies to
    /// the change itself.
    fn change_diff(&self, hash: &ChangeHash) -> Result<Vec<Patch>, EngineError> {
        let change = self.get_change(hash).ok_or(EngineError::UnknownHash(*hash))?;
        self.diff(
            &Frontier::new(change.deps().iter().copied()),
            &Frontier::single(*hash),
        )
    }

    /// Materialized JSON of the current version.
    fn view(&self) -> Value;

    /// Materialized JSON of the version named by `frontier`.
    fn view_at(&self, frontier: &Frontier) -> Result<Value, EngineError>;

    /// Object reached by following `path` from the root in the current view.
    fn object_at(&self, path: &[Prop]) -> Option<ObjId>;

    /// Incorporates every change of `other` this replica lacks. Returns the
    /// hashes of the newly applied changes, in application order.
    fn merge(&mut self, other: &Self) -> Result<Vec<ChangeHash>, EngineError>;

    /// A new replica under `url` sharing this replica's full history.
    fn fork(&self, url: DocUrl) -> Self;

    /// A new replica under `url` holding only the history up to `frontier`.
    fn fork_at(&self, frontier: &Frontier, url: DocUrl) -> Result<Self, EngineError>;

    /// Runs `f` against a transaction and records whatever it wrote as one
    /// change carrying `message`. A transaction that writes nothing records
    /// nothing.
    fn mutate<R>(
        &mut self,
        message: Option<&str>,
        f: impl FnOnce(&mut dyn Transact) -> Result<R, EngineError>,
    ) -> Result<R, EngineError>;
}
