//! Named milestones: a frontier with a name, stored in the document itself
//! under root key `tags`.

use causal_doc::{EngineError, Frontier, ObjId, ObjKind, Replica};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;

pub const TAGS_KEY: &str = "tags";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub heads: Frontier,
    pub created_at: i64,
    /// Opaque author identifier, such as a contact url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Tags `heads` (the current heads when `None`) as `name`.
pub fn create_tag<R: Replica>(
    doc: &mut R,
    name: &str,
    heads: Option<Frontier>,
    created_by: Option<&str>,
) -> Result<Tag> {
    let heads = heads.unwrap_or_else(|| doc.heads());
    if let Some(unknown) = heads.iter().find(|h| doc.get_change(h).is_none()) {
        return Err(EngineError::UnknownHash(*unknown).into());
    }
    let tag = Tag {
        name: name.to_string(),
        heads,
        created_at: Utc::now().timestamp_millis(),
        created_by: created_by.map(str::to_string),
    };
    let value = serde_json::to_value(&tag)?;
    doc.mutate(Some("create tag"), |tx| {
        let list = match tx.get_object(&ObjId::ROOT, TAGS_KEY)? {
            Some(list) => list,
            None => tx.put_object(&ObjId::ROOT, TAGS_KEY, ObjKind::List)?,
        };
        let end = tx.length(&list)?;
        tx.insert_json(&list, end, &value)
    })?;
    info!(doc = %doc.url(), tag = %tag.name, heads = %tag.heads, "created tag");
    Ok(tag)
}

pub fn tags<R: Replica>(doc: &R) -> Result<Vec<Tag>> {
    match doc.view().get(TAGS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => Ok(serde_json::from_value(v.clone())?),
    }
}

/// The tag naming exactly `heads`, if any.
pub fn tag_at<R: Replica>(doc: &R, heads: &Frontier) -> Result<Option<Tag>> {
    Ok(tags(doc)?.into_iter().find(|t| &t.heads == heads))
}
