use thiserror::Error;

use crate::hash::ChangeHash;
use crate::object::{ObjId, ObjKind};

/// Failures raised by the document engine.
///
/// All of these indicate a programming error on the caller's side (a frontier
/// from another document, an index past the end of a sequence, ...). None of
/// them is transient.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown change hash: {0}")]
    UnknownHash(ChangeHash),
    #[error("object not found: {0}")]
    ObjectNotFound(ObjId),
    #[error("object {obj} is a {actual}, expected a {expected}")]
    WrongObjectKind {
        obj: ObjId,
        expected: ObjKind,
        actual: ObjKind,
    },
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("not a scalar value; use put_object or put_json")]
    NotAScalar,
    #[error("patch target not found: {0}")]
    PatchTarget(String),
    #[error("invalid change hash: {0}")]
    InvalidHash(String),
    #[error("invalid document url: {0}")]
    InvalidUrl(String),
    #[error("json conversion failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Automerge(#[from] automerge::AutomergeError),
}
