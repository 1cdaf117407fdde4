//! Local mutation API.
//!
//! [`Transact`] is the editing surface handed to the closure passed to
//! [`Replica::mutate`](crate::Replica::mutate). Everything written through it
//! becomes a single [`Change`](crate::Change) when the closure returns `Ok`;
//! if the closure fails, the engine rolls the transaction back and nothing is
//! recorded.

use automerge::transaction::{Transactable, Transaction};
use serde_json::Value;

use crate::error::EngineError;
use crate::object::{json_to_scalar, ObjId, ObjKind, Slot};
use crate::view::Reader;

/// Reads and writes available inside a mutation.
///
/// Object safe; the provided methods are built on the required ones.
pub trait Transact {
    /// Kind of `obj`, or `None` if no such object exists.
    fn kind(&self, obj: &ObjId) -> Option<ObjKind>;

    fn get(&self, obj: &ObjId, key: &str) -> Result<Option<Slot>, EngineError>;

    fn get_at(&self, obj: &ObjId, index: usize) -> Result<Option<Slot>, EngineError>;

    /// Keys currently present in a map.
    fn keys(&self, obj: &ObjId) -> Result<Vec<String>, EngineError>;

    /// Number of elements of a list, characters of a text, or keys of a map.
    fn length(&self, obj: &ObjId) -> Result<usize, EngineError>;

    fn text(&self, obj: &ObjId) -> Result<String, EngineError>;

    /// Materialized JSON of `obj`.
    fn json(&self, obj: &ObjId) -> Result<Value, EngineError>;

    /// Assigns a scalar. Objects and arrays are rejected with
    /// [`EngineError::NotAScalar`].
    fn put(&mut self, obj: &ObjId, key: &str, value: Value) -> Result<(), EngineError>;

    fn put_object(&mut self, obj: &ObjId, key: &str, kind: ObjKind) -> Result<ObjId, EngineError>;

    fn delete(&mut self, obj: &ObjId, key: &str) -> Result<(), EngineError>;

    fn insert(&mut self, obj: &ObjId, index: usize, value: Value) -> Result<(), EngineError>;

    fn insert_object(&mut self, obj: &ObjId, index: usize, kind: ObjKind) -> Result<ObjId, EngineError>;

    /// Removes the list element at `index`.
    fn remove(&mut self, obj: &ObjId, index: usize) -> Result<(), EngineError>;

    /// Deletes `delete` characters at `pos` and inserts `text` there.
    fn splice_text(&mut self, obj: &ObjId, pos: usize, delete: usize, text: &str) -> Result<(), EngineError>;

    // ── Provided ───────────────────────────────────────────────────────────

    /// Object stored under `key`, if that key holds an object.
    fn get_object(&self, obj: &ObjId, key: &str) -> Result<Option<ObjId>, EngineError> {
        Ok(match self.get(obj, key)? {
            Some(Slot::Object(id)) => Some(id),
            _ => None,
        })
    }

    /// Replaces the content of a text object with `new_text`, touching only
    /// the range between the common prefix and the common suffix.
    fn update_text(&mut self, obj: &ObjId, new_text: &str) -> Result<(), EngineError> {
        let old: Vec<char> = self.text(obj)?.chars().collect();
        let new: Vec<char> = new_text.chars().collect();
        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();
        let delete = old.len() - prefix - suffix;
        let insert: String = new[prefix..new.len() - suffix].iter().collect();
        if delete == 0 && insert.is_empty() {
            return Ok(());
        }
        self.splice_text(obj, prefix, delete, &insert)
    }

    /// Writes an arbitrary JSON value under `key`, creating nested maps and
    /// lists as needed. Strings are stored as scalars.
    fn put_json(&mut self, obj: &ObjId, key: &str, value: &Value) -> Result<(), EngineError> {
        match value {
            Value::Object(entries) => {
                let child = self.put_object(obj, key, ObjKind::Map)?;
                for (k, v) in entries {
                    self.put_json(&child, k, v)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                let child = self.put_object(obj, key, ObjKind::List)?;
                for (i, v) in items.iter().enumerate() {
                    self.insert_json(&child, i, v)?;
                }
                Ok(())
            }
            scalar => self.put(obj, key, scalar.clone()),
        }
    }

    fn insert_json(&mut self, obj: &ObjId, index: usize, value: &Value) -> Result<(), EngineError> {
        match value {
            Value::Object(entries) => {
                let child = self.insert_object(obj, index, ObjKind::Map)?;
                for (k, v) in entries {
                    self.put_json(&child, k, v)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                let child = self.insert_object(obj, index, ObjKind::List)?;
                for (i, v) in items.iter().enumerate() {
                    self.insert_json(&child, i, v)?;
                }
                Ok(())
            }
            scalar => self.insert(obj, index, scalar.clone()),
        }
    }
}

/// Engine transaction behind the [`Transact`] surface. Reads see the
/// transaction's own pending writes.
pub(crate) struct Tx<'a, 'b>(pub(crate) &'a mut Transaction<'b>);

impl<'b> Tx<'_, 'b> {
    fn read(&self) -> Reader<'_, Transaction<'b>> {
        Reader::current(&*self.0)
    }

    fn expect_kind(&self, obj: &ObjId, expected: ObjKind) -> Result<(), EngineError> {
        match self.kind(obj) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(EngineError::WrongObjectKind {
                obj: obj.clone(),
                expected,
                actual,
            }),
            None => Err(EngineError::ObjectNotFound(obj.clone())),
        }
    }

    fn check_range(&self, obj: &ObjId, end: usize) -> Result<(), EngineError> {
        let len = self.read().length(obj);
        if end > len {
            return Err(EngineError::IndexOutOfBounds { index: end, len });
        }
        Ok(())
    }
}

impl Transact for Tx<'_, '_> {
    fn kind(&self, obj: &ObjId) -> Option<ObjKind> {
        self.read().kind(obj)
    }

    fn get(&self, obj: &ObjId, key: &str) -> Result<Option<Slot>, EngineError> {
        self.read().get(obj, key)
    }

    fn get_at(&self, obj: &ObjId, index: usize) -> Result<Option<Slot>, EngineError> {
        self.read().get(obj, index)
    }

    fn keys(&self, obj: &ObjId) -> Result<Vec<String>, EngineError> {
        self.expect_kind(obj, ObjKind::Map)?;
        Ok(self.read().keys(obj))
    }

    fn length(&self, obj: &ObjId) -> Result<usize, EngineError> {
        if self.kind(obj).is_none() {
            return Err(EngineError::ObjectNotFound(obj.clone()));
        }
        Ok(self.read().length(obj))
    }

    fn text(&self, obj: &ObjId) -> Result<String, EngineError> {
        self.expect_kind(obj, ObjKind::Text)?;
        self.read().text(obj)
    }

    fn json(&self, obj: &ObjId) -> Result<Value, EngineError> {
        self.read().json(obj)
    }

    fn put(&mut self, obj: &ObjId, key: &str, value: Value) -> Result<(), EngineError> {
        let value = json_to_scalar(&value)?;
        self.0.put(obj, key, value)?;
        Ok(())
    }

    fn put_object(&mut self, obj: &ObjId, key: &str, kind: ObjKind) -> Result<ObjId, EngineError> {
        Ok(ObjId(self.0.put_object(obj, key, kind.to_engine())?))
    }

    fn delete(&mut self, obj: &ObjId, key: &str) -> Result<(), EngineError> {
        if self.get(obj, key)?.is_none() {
            return Ok(());
        }
        self.0.delete(obj, key)?;
        Ok(())
    }

    fn insert(&mut self, obj: &ObjId, index: usize, value: Value) -> Result<(), EngineError> {
        let value = json_to_scalar(&value)?;
        self.expect_kind(obj, ObjKind::List)?;
        self.check_range(obj, index)?;
        self.0.insert(obj, index, value)?;
        Ok(())
    }

    fn insert_object(&mut self, obj: &ObjId, index: usize, kind: ObjKind) -> Result<ObjId, EngineError> {
        self.expect_kind(obj, ObjKind::List)?;
        self.check_range(obj, index)?;
        Ok(ObjId(self.0.insert_object(obj, index, kind.to_engine())?))
    }

    fn remove(&mut self, obj: &ObjId, index: usize) -> Result<(), EngineError> {
        self.expect_kind(obj, ObjKind::List)?;
        self.check_range(obj, index + 1)?;
        self.0.delete(obj, index)?;
        Ok(())
    }

    fn splice_text(&mut self, obj: &ObjId, pos: usize, delete: usize, text: &str) -> Result<(), EngineError> {
        self.expect_kind(obj, ObjKind::Text)?;
        self.check_range(obj, pos + delete)?;
        let count = isize::try_from(delete).map_err(|_| EngineError::IndexOutOfBounds {
            index: pos + delete,
            len: pos,
        })?;
        self.0.splice_text(obj, pos, count, text)?;
        Ok(())
    }
}
