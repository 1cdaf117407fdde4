//! Reading objects out of the engine, at the current version or at a past
//! set of heads.

use automerge::ReadDoc;
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::object::{scalar_to_json, ObjId, ObjKind, Slot};
use crate::patch::Prop;

pub(crate) struct Reader<'a, D> {
    doc: &'a D,
    heads: Option<&'a [automerge::ChangeHash]>,
}

impl<'a, D: ReadDoc> Reader<'a, D> {
    pub fn current(doc: &'a D) -> Self {
        Self { doc, heads: None }
    }

    pub fn at(doc: &'a D, heads: &'a [automerge::ChangeHash]) -> Self {
        Self {
            doc,
            heads: Some(heads),
        }
    }

    pub fn kind(&self, obj: &ObjId) -> Option<ObjKind> {
        self.doc.object_type(obj).ok().map(ObjKind::from_engine)
    }

    pub fn get(
        &self,
        obj: &ObjId,
        prop: impl Into<automerge::Prop>,
    ) -> Result<Option<Slot>, EngineError> {
        let found = match self.heads {
            Some(heads) => self.doc.get_at(obj, prop, heads)?,
            None => self.doc.get(obj, prop)?,
        };
        Ok(found.map(|(value, id)| match value {
            automerge::Value::Object(_) => Slot::Object(ObjId(id)),
            automerge::Value::Scalar(scalar) => Slot::Scalar(scalar_to_json(&scalar)),
        }))
    }

    pub fn keys(&self, obj: &ObjId) -> Vec<String> {
        match self.heads {
            Some(heads) => self.doc.keys_at(obj, heads).collect(),
            None => self.doc.keys(obj).collect(),
        }
    }

    pub fn length(&self, obj: &ObjId) -> usize {
        match self.heads {
            Some(heads) => self.doc.length_at(obj, heads),
            None => self.doc.length(obj),
        }
    }

    pub fn text(&self, obj: &ObjId) -> Result<String, EngineError> {
        Ok(match self.heads {
            Some(heads) => self.doc.text_at(obj, heads)?,
            None => self.doc.text(obj)?,
        })
    }

    /// Object reached by following `path` from the root.
    pub fn follow(&self, path: &[Prop]) -> Result<Option<ObjId>, EngineError> {
        let mut obj = ObjId::ROOT;
        for prop in path {
            let slot = match prop {
                Prop::Key(key) => self.get(&obj, key.as_str())?,
                Prop::Index(index) => self.get(&obj, *index)?,
            };
            match slot {
                Some(Slot::Object(child)) => obj = child,
                _ => return Ok(None),
            }
        }
        Ok(Some(obj))
    }

    /// Materialized JSON of `obj`.
    pub fn json(&self, obj: &ObjId) -> Result<Value, EngineError> {
        match self.kind(obj) {
            Some(ObjKind::Text) => Ok(Value::String(self.text(obj)?)),
            Some(ObjKind::List) => {
                let mut items = Vec::with_capacity(self.length(obj));
                for index in 0..self.length(obj) {
                    items.push(self.slot_json(self.get(obj, index)?)?);
                }
                Ok(Value::Array(items))
            }
            Some(ObjKind::Map) => {
                let mut entries = Map::new();
                for key in self.keys(obj) {
                    let value = self.slot_json(self.get(obj, key.as_str())?)?;
                    entries.insert(key, value);
                }
                Ok(Value::Object(entries))
            }
            None => Err(EngineError::ObjectNotFound(obj.clone())),
        }
    }

    fn slot_json(&self, slot: Option<Slot>) -> Result<Value, EngineError> {
        match slot {
            Some(Slot::Object(child)) => self.json(&child),
            Some(Slot::Scalar(value)) => Ok(value),
            None => Ok(Value::Null),
        }
    }
}
