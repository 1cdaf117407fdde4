//! Branch metadata as persisted inside a document, and its typed reading.
//!
//! Two root keys:
//!
//! ```text
//! branchMetadata: { branches: [ { url, name, createdAt, createdBy?, mergeMetadata? } ] }
//! branchSource:   { mainDocUrl, branchHeads }      (branch documents only)
//! ```
//!
//! The link list is shared history: a branch inherits its source's map and
//! never creates one of its own, so merging it back can not shadow the
//! source's map. The source stamp describes one document only; it sits
//! beside the map and is cleared on the source after a merge. A stamp that
//! names the document itself as its source was carried in by a merged
//! branch and is ignored.
//!
//! Every write goes through a single document mutation that appends to a
//! list, removes one list element, or sets one key, so concurrent writers
//! converge through the engine's merge.

use causal_doc::{DocUrl, EngineError, Frontier, ObjId, ObjKind, Replica, Slot, Transact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub const METADATA_KEY: &str = "branchMetadata";
pub const SOURCE_KEY: &str = "branchSource";
const BRANCHES_KEY: &str = "branches";

// ── Persisted types ────────────────────────────────────────────────────────

/// Typed view over both root keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMetadata {
    /// Set on branch documents only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BranchSource>,
    #[serde(default)]
    pub branches: Vec<BranchLink>,
}

/// Where a branch was forked from, and the source version it last absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSource {
    pub main_doc_url: DocUrl,
    pub branch_heads: Frontier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchLink {
    pub url: DocUrl,
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Opaque author identifier, such as a contact url.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_metadata: Option<MergeMetadata>,
}

impl BranchLink {
    pub fn is_merged(&self) -> bool {
        self.merge_metadata.is_some()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeMetadata {
    pub merged_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_by: Option<String>,
    /// Branch heads at the moment of the merge.
    pub merge_heads: Frontier,
}

// ── Classification ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Main,
    Branch,
    MergedBranch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MainDocument {
    pub url: DocUrl,
    pub branches: Vec<BranchLink>,
}

impl MainDocument {
    /// Links that have not been merged yet.
    pub fn open_branches(&self) -> impl Iterator<Item = &BranchLink> {
        self.branches.iter().filter(|link| !link.is_merged())
    }
}

/// A forked document. `inherited` holds the links copied from the source at
/// fork time; they are kept so merging back never removes them.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchDocument {
    pub url: DocUrl,
    pub source: BranchSource,
    pub inherited: Vec<BranchLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentKind {
    Main(MainDocument),
    Branch(BranchDocument),
}

impl DocumentKind {
    pub fn url(&self) -> &DocUrl {
        match self {
            DocumentKind::Main(main) => &main.url,
            DocumentKind::Branch(branch) => &branch.url,
        }
    }

    pub fn as_branch(&self) -> Option<&BranchDocument> {
        match self {
            DocumentKind::Branch(branch) => Some(branch),
            DocumentKind::Main(_) => None,
        }
    }
}

// ── Reading ────────────────────────────────────────────────────────────────

fn parse<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Result<Option<T>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone()).map(Some),
    }
}

/// Typed branch metadata of `doc`, or `None` if it has neither a link list
/// nor a source stamp.
pub fn branch_metadata<R: Replica>(doc: &R) -> Result<Option<BranchMetadata>> {
    let view = doc.view();
    let stored: Option<BranchMetadata> = parse(view.get(METADATA_KEY))?;
    let source = parse::<BranchSource>(view.get(SOURCE_KEY))?
        .filter(|source| &source.main_doc_url != doc.url());
    Ok(match (stored, source) {
        (None, None) => None,
        (stored, source) => Some(BranchMetadata {
            source,
            branches: stored.map(|m| m.branches).unwrap_or_default(),
        }),
    })
}

pub fn document_kind<R: Replica>(doc: &R) -> Result<DocumentKind> {
    let metadata = branch_metadata(doc)?.unwrap_or_default();
    let url = doc.url().clone();
    Ok(match metadata.source {
        Some(source) => DocumentKind::Branch(BranchDocument {
            url,
            source,
            inherited: metadata.branches,
        }),
        None => DocumentKind::Main(MainDocument {
            url,
            branches: metadata.branches,
        }),
    })
}

pub fn find_branch<R: Replica>(doc: &R, url: &DocUrl) -> Result<Option<BranchLink>> {
    Ok(branch_metadata(doc)?
        .and_then(|m| m.branches.into_iter().find(|link| &link.url == url)))
}

pub fn open_branches<R: Replica>(doc: &R) -> Result<Vec<BranchLink>> {
    Ok(branch_metadata(doc)?
        .map(|m| m.branches.into_iter().filter(|l| !l.is_merged()).collect())
        .unwrap_or_default())
}

/// `"<prefix> N"` with the smallest `N` not already taken.
pub fn suggest_branch_name(existing: &[BranchLink], prefix: &str) -> String {
    let mut n = existing
        .iter()
        .filter(|link| link.name.starts_with(prefix))
        .count()
        + 1;
    loop {
        let name = format!("{prefix} {n}");
        if !existing.iter().any(|link| link.name == name) {
            return name;
        }
        n += 1;
    }
}

// ── Writing, inside a transaction ──────────────────────────────────────────

/// The metadata map, created with no branches if absent.
pub(crate) fn ensure(tx: &mut dyn Transact) -> Result<ObjId, EngineError> {
    if let Some(meta) = tx.get_object(&ObjId::ROOT, METADATA_KEY)? {
        return Ok(meta);
    }
    let meta = tx.put_object(&ObjId::ROOT, METADATA_KEY, ObjKind::Map)?;
    tx.put_object(&meta, BRANCHES_KEY, ObjKind::List)?;
    Ok(meta)
}

pub(crate) fn branches_list(tx: &mut dyn Transact) -> Result<ObjId, EngineError> {
    let meta = ensure(tx)?;
    match tx.get_object(&meta, BRANCHES_KEY)? {
        Some(list) => Ok(list),
        None => tx.put_object(&meta, BRANCHES_KEY, ObjKind::List),
    }
}

/// Position and object of the link for `url`.
pub(crate) fn locate_link(
    tx: &dyn Transact,
    list: &ObjId,
    url: &DocUrl,
) -> Result<Option<(usize, ObjId)>, EngineError> {
    let wanted = Slot::Scalar(Value::String(url.to_string()));
    for index in 0..tx.length(list)? {
        if let Some(Slot::Object(link)) = tx.get_at(list, index)? {
            if tx.get(&link, "url")?.as_ref() == Some(&wanted) {
                return Ok(Some((index, link)));
            }
        }
    }
    Ok(None)
}

pub(crate) fn read_link(tx: &dyn Transact, link: &ObjId) -> Result<BranchLink, EngineError> {
    Ok(serde_json::from_value(tx.json(link)?)?)
}

pub(crate) fn read_source(tx: &dyn Transact) -> Result<Option<BranchSource>, EngineError> {
    match tx.get_object(&ObjId::ROOT, SOURCE_KEY)? {
        Some(stamp) => Ok(Some(serde_json::from_value(tx.json(&stamp)?)?)),
        None => Ok(None),
    }
}

/// Sets the source stamp, or removes it for `None`. Writes nothing when the
/// stamp already matches.
pub(crate) fn write_source(
    tx: &mut dyn Transact,
    source: Option<&BranchSource>,
) -> Result<(), EngineError> {
    if read_source(tx)?.as_ref() == source {
        return Ok(());
    }
    match source {
        Some(source) => tx.put_json(&ObjId::ROOT, SOURCE_KEY, &serde_json::to_value(source)?),
        None => tx.delete(&ObjId::ROOT, SOURCE_KEY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causal_doc::Document;
    use serde_json::json;

    fn link(name: &str) -> BranchLink {
        BranchLink {
            url: DocUrl::generate(),
            name: name.to_string(),
            created_at: 0,
            created_by: None,
            merge_metadata: None,
        }
    }

    #[test]
    fn suggests_first_free_number() {
        assert_eq!(suggest_branch_name(&[], "Untitled branch"), "Untitled branch 1");
        let taken = [link("Untitled branch 2"), link("Feature")];
        assert_eq!(
            suggest_branch_name(&taken, "Untitled branch"),
            "Untitled branch 3"
        );
    }

    #[test]
    fn metadata_uses_camel_case_keys() {
        let url = DocUrl::generate();
        let source = BranchSource {
            main_doc_url: url.clone(),
            branch_heads: Frontier::empty(),
        };
        let value = serde_json::to_value(&source).unwrap();
        assert_eq!(
            value,
            json!({"mainDocUrl": url.to_string(), "branchHeads": []})
        );
        assert_eq!(parse::<BranchSource>(Some(&value)).unwrap(), Some(source));
        assert_eq!(parse::<BranchSource>(Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn stamp_and_links_live_under_separate_keys() {
        let mut doc = Document::new();
        assert_eq!(branch_metadata(&doc).unwrap(), None);
        let stamp = BranchSource {
            main_doc_url: DocUrl::generate(),
            branch_heads: Frontier::empty(),
        };
        doc.mutate(None, |tx| write_source(tx, Some(&stamp))).unwrap();
        assert!(doc.view().get(METADATA_KEY).is_none());
        let meta = branch_metadata(&doc).unwrap().unwrap();
        assert_eq!(meta.source, Some(stamp.clone()));
        assert!(meta.branches.is_empty());

        let writes = doc.changes().len();
        doc.mutate(None, |tx| write_source(tx, Some(&stamp))).unwrap();
        assert_eq!(doc.changes().len(), writes);
        doc.mutate(None, |tx| write_source(tx, None)).unwrap();
        assert!(doc.view().get(SOURCE_KEY).is_none());
    }

    #[test]
    fn link_without_optional_fields_parses() {
        let url = DocUrl::generate();
        let value = json!({"url": url.to_string(), "name": "x", "createdAt": 5});
        let parsed: BranchLink = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.url, url);
        assert!(!parsed.is_merged());
        assert!(parsed.created().is_some());
    }

    #[test]
    fn author_identifiers_are_kept_verbatim() {
        let value = json!({
            "url": DocUrl::generate().to_string(),
            "name": "x",
            "createdAt": 5,
            "createdBy": "automerge:3Xq9contact",
            "mergeMetadata": {
                "mergedAt": 6,
                "mergedBy": "automerge:7Yp2contact",
                "mergeHeads": []
            }
        });
        let parsed: BranchLink = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(parsed.created_by.as_deref(), Some("automerge:3Xq9contact"));
        assert_eq!(
            parsed.merge_metadata.as_ref().and_then(|m| m.merged_by.as_deref()),
            Some("automerge:7Yp2contact")
        );
        assert_eq!(serde_json::to_value(&parsed).unwrap(), value);
    }
}
