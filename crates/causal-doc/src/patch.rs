//! Structural edits produced by diffing two frontiers.
//!
//! A patch sequence is *sequential*: each patch's position is expressed
//! relative to the document after every preceding patch of the same sequence
//! has been applied. [`apply_patches`] relies on this.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::object::{empty_json, scalar_to_json, ObjId, ObjKind};

/// One step of a path from the root to an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prop {
    Key(String),
    Index(usize),
}

impl From<&str> for Prop {
    fn from(key: &str) -> Self {
        Prop::Key(key.to_string())
    }
}

impl From<usize> for Prop {
    fn from(index: usize) -> Self {
        Prop::Index(index)
    }
}

impl Prop {
    fn from_engine(prop: automerge::Prop) -> Self {
        match prop {
            automerge::Prop::Map(key) => Prop::Key(key),
            automerge::Prop::Seq(index) => Prop::Index(index),
        }
    }
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Key(key) => f.write_str(key),
            Prop::Index(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PatchAction {
    /// Set (or replace) a map key. A new object is given as its empty
    /// JSON shape; its content follows in later patches.
    PutMap { key: String, value: Value },
    DeleteMap { key: String },
    /// Overwrite the list element at `index`.
    PutSeq { index: usize, value: Value },
    /// Insert list elements starting at `index`.
    Insert { index: usize, values: Vec<Value> },
    /// Insert characters into a text object at `index`.
    SpliceText { index: usize, value: String },
    /// Remove `length` elements or characters starting at `index`.
    DeleteSeq { index: usize, length: usize },
    /// Replace `length` characters at `index` with `value`.
    ///
    /// Never emitted by a diff; produced when coalescing a deletion followed
    /// by an insertion at the same position.
    Replace {
        index: usize,
        length: usize,
        value: String,
    },
}

impl PatchAction {
    /// Short name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchAction::PutMap { .. } => "put",
            PatchAction::DeleteMap { .. } => "del",
            PatchAction::PutSeq { .. } => "put",
            PatchAction::Insert { .. } => "insert",
            PatchAction::SpliceText { .. } => "splice",
            PatchAction::DeleteSeq { .. } => "del",
            PatchAction::Replace { .. } => "replace",
        }
    }
}

/// A single structural edit to the object at `path`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patch {
    /// The object being edited.
    pub obj: ObjId,
    /// Path from the root to `obj`.
    pub path: Vec<Prop>,
    pub action: PatchAction,
}

impl Patch {
    /// Translates an engine patch. Counter increments, conflict notices and
    /// formatting marks have no JSON rendering and yield `None`.
    pub(crate) fn from_engine(patch: automerge::Patch) -> Option<Patch> {
        use automerge::PatchAction as Engine;

        let action = match patch.action {
            Engine::PutMap {
                key,
                value: (value, _),
                ..
            } => PatchAction::PutMap {
                key,
                value: value_json(&value),
            },
            Engine::PutSeq {
                index,
                value: (value, _),
                ..
            } => PatchAction::PutSeq {
                index,
                value: value_json(&value),
            },
            Engine::Insert { index, values } => PatchAction::Insert {
                index,
                values: values.iter().map(|(value, _, _)| value_json(value)).collect(),
            },
            Engine::SpliceText { index, value, .. } => PatchAction::SpliceText {
                index,
                value: value.make_string(),
            },
            Engine::DeleteMap { key } => PatchAction::DeleteMap { key },
            Engine::DeleteSeq { index, length } => PatchAction::DeleteSeq { index, length },
            Engine::Increment { .. } | Engine::Conflict { .. } | Engine::Mark { .. } => {
                return None
            }
        };
        Some(Patch {
            obj: ObjId(patch.obj),
            path: patch.path.into_iter().map(|(_, prop)| Prop::from_engine(prop)).collect(),
            action,
        })
    }

    /// Returns `true` if the patch edits root key `key` or anything below it.
    pub fn is_under(&self, key: &str) -> bool {
        match (self.path.first(), &self.action) {
            (Some(Prop::Key(k)), _) => k == key,
            (None, PatchAction::PutMap { key: k, .. } | PatchAction::DeleteMap { key: k }) => {
                k == key
            }
            _ => false,
        }
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        for (i, prop) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{prop}")?;
        }
        match &self.action {
            PatchAction::PutMap { key, value } => write!(f, " put {key}={value}"),
            PatchAction::DeleteMap { key } => write!(f, " del {key}"),
            PatchAction::PutSeq { index, value } => write!(f, " put@{index}={value}"),
            PatchAction::Insert { index, values } => write!(f, " insert@{index} x{}", values.len()),
            PatchAction::SpliceText { index, value } => write!(f, " splice@{index} {value:?}"),
            PatchAction::DeleteSeq { index, length } => write!(f, " del@{index} x{length}"),
            PatchAction::Replace {
                index,
                length,
                value,
            } => write!(f, " replace@{index} x{length} {value:?}"),
        }
    }
}

// ── Application ────────────────────────────────────────────────────────────

/// Applies a sequential patch list to a materialized JSON view.
pub fn apply_patches(view: &mut Value, patches: &[Patch]) -> Result<(), EngineError> {
    for patch in patches {
        apply_patch(view, patch)?;
    }
    Ok(())
}

pub fn apply_patch(view: &mut Value, patch: &Patch) -> Result<(), EngineError> {
    let target = resolve(view, &patch.path).ok_or_else(|| target_error(patch))?;
    match (&patch.action, target) {
        (PatchAction::PutMap { key, value }, Value::Object(map)) => {
            map.insert(key.clone(), value.clone());
        }
        (PatchAction::DeleteMap { key }, Value::Object(map)) => {
            map.remove(key);
        }
        (PatchAction::PutSeq { index, value }, Value::Array(items)) => {
            let len = items.len();
            let slot = items.get_mut(*index).ok_or(EngineError::IndexOutOfBounds {
                index: *index,
                len,
            })?;
            *slot = value.clone();
        }
        (PatchAction::Insert { index, values }, Value::Array(items)) => {
            if *index > items.len() {
                return Err(EngineError::IndexOutOfBounds {
                    index: *index,
                    len: items.len(),
                });
            }
            items.splice(*index..*index, values.iter().cloned());
        }
        (PatchAction::DeleteSeq { index, length }, Value::Array(items)) => {
            let end = index + length;
            if end > items.len() {
                return Err(EngineError::IndexOutOfBounds {
                    index: end,
                    len: items.len(),
                });
            }
            items.drain(*index..end);
        }
        (PatchAction::SpliceText { index, value }, Value::String(text)) => {
            *text = splice_chars(text, *index, 0, value)?;
        }
        (PatchAction::DeleteSeq { index, length }, Value::String(text)) => {
            *text = splice_chars(text, *index, *length, "")?;
        }
        (
            PatchAction::Replace {
                index,
                length,
                value,
            },
            Value::String(text),
        ) => {
            *text = splice_chars(text, *index, *length, value)?;
        }
        _ => return Err(target_error(patch)),
    }
    Ok(())
}

fn value_json(value: &automerge::Value<'_>) -> Value {
    match value {
        automerge::Value::Object(typ) => empty_json(ObjKind::from_engine(*typ)),
        automerge::Value::Scalar(scalar) => scalar_to_json(scalar),
    }
}

fn resolve<'a>(view: &'a mut Value, path: &[Prop]) -> Option<&'a mut Value> {
    let mut node = view;
    for prop in path {
        node = match (prop, node) {
            (Prop::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (Prop::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Removes `del` characters at character offset `index` and inserts `insert`.
fn splice_chars(text: &str, index: usize, del: usize, insert: &str) -> Result<String, EngineError> {
    let chars: Vec<char> = text.chars().collect();
    if index + del > chars.len() {
        return Err(EngineError::IndexOutOfBounds {
            index: index + del,
            len: chars.len(),
        });
    }
    let mut out: String = chars[..index].iter().collect();
    out.push_str(insert);
    out.extend(&chars[index + del..]);
    Ok(out)
}

fn target_error(patch: &Patch) -> EngineError {
    EngineError::PatchTarget(patch.to_string())
}
