//! Object identifiers and the values read out of objects.

use std::fmt;

use automerge::{ObjType, ScalarValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::EngineError;

/// Identifier of a map, list or text object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub(crate) automerge::ObjId);

impl ObjId {
    /// The root map every document starts with.
    pub const ROOT: ObjId = ObjId(automerge::ROOT);
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ROOT {
            return f.write_str("root");
        }
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for ObjId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl AsRef<automerge::ObjId> for ObjId {
    fn as_ref(&self) -> &automerge::ObjId {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjKind {
    Map,
    List,
    Text,
}

impl ObjKind {
    pub(crate) fn from_engine(typ: ObjType) -> Self {
        match typ {
            ObjType::Map | ObjType::Table => ObjKind::Map,
            ObjType::List => ObjKind::List,
            ObjType::Text => ObjKind::Text,
        }
    }

    pub(crate) fn to_engine(self) -> ObjType {
        match self {
            ObjKind::Map => ObjType::Map,
            ObjKind::List => ObjType::List,
            ObjKind::Text => ObjType::Text,
        }
    }
}

impl fmt::Display for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjKind::Map => "map",
            ObjKind::List => "list",
            ObjKind::Text => "text",
        })
    }
}

/// What a map key or list index holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Scalar(Value),
    Object(ObjId),
}

// ── Scalar conversion ──────────────────────────────────────────────────────

/// JSON rendering of an engine scalar. Byte strings become base64.
pub(crate) fn scalar_to_json(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Str(s) => Value::String(s.to_string()),
        ScalarValue::Int(n) | ScalarValue::Timestamp(n) => Value::from(*n),
        ScalarValue::Uint(n) => Value::from(*n),
        ScalarValue::F64(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        ScalarValue::Counter(c) => Value::from(i64::from(c)),
        ScalarValue::Boolean(b) => Value::Bool(*b),
        ScalarValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        ScalarValue::Null | ScalarValue::Unknown { .. } => Value::Null,
    }
}

/// Engine scalar for a JSON scalar. Objects and arrays are rejected.
pub(crate) fn json_to_scalar(value: &Value) -> Result<ScalarValue, EngineError> {
    Ok(match value {
        Value::Null => ScalarValue::Null,
        Value::Bool(b) => ScalarValue::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => ScalarValue::Int(i),
            (None, Some(u)) => ScalarValue::Uint(u),
            (None, None) => ScalarValue::F64(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => ScalarValue::from(s.as_str()),
        Value::Object(_) | Value::Array(_) => return Err(EngineError::NotAScalar),
    })
}

/// Initial JSON shape of a freshly created object.
pub(crate) fn empty_json(kind: ObjKind) -> Value {
    match kind {
        ObjKind::Map => Value::Object(Default::default()),
        ObjKind::List => Value::Array(Vec::new()),
        ObjKind::Text => Value::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_survive_the_engine() {
        for value in [json!(null), json!(true), json!(-3), json!(u64::MAX), json!(1.5), json!("x")] {
            let scalar = json_to_scalar(&value).unwrap();
            assert_eq!(scalar_to_json(&scalar), value);
        }
        assert!(matches!(
            json_to_scalar(&json!([1])),
            Err(EngineError::NotAScalar)
        ));
    }

    #[test]
    fn root_displays_by_name() {
        assert_eq!(ObjId::ROOT.to_string(), "root");
        assert_eq!(serde_json::to_value(ObjId::ROOT).unwrap(), json!("root"));
    }
}
