//! Actor-attributed diffs between arbitrary versions, and patch coalescing.
//!
//! # Overview
//!
//! [`diff_with_provenance`] attributes every patch between two frontiers to
//! the actor whose operations produced it:
//!
//! * When `from` is an ancestor of `to` (the common case: a branch against
//!   its fork point, a session against its start) the changes in between are
//!   replayed one same-actor run at a time and each step is diffed
//!   separately, so attribution is exact.
//! * Otherwise the engine's direct diff is attributed to the changes whose
//!   own effect edits the same object (and, for maps, the same key).
//!
//! [`combine_patches`] then folds adjacent edits into longer runs so a
//! history view shows one highlight per edit instead of one per keystroke.

use std::collections::HashSet;

use causal_doc::{
    ActorId, Change, ChangeHash, EngineError, Frontier, ObjId, Patch, PatchAction, Replica,
};
use indexmap::IndexSet;
use serde::Serialize;
use tracing::debug;

use crate::branch;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};

/// A patch together with who produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedPatch {
    pub patch: Patch,
    /// Author of the first contributing operation, if any could be found.
    pub actor: Option<ActorId>,
    /// Every actor whose operations contributed, in causal order.
    pub contributors: Vec<ActorId>,
}

impl AttributedPatch {
    pub fn unattributed(patch: Patch) -> Self {
        Self {
            patch,
            actor: None,
            contributors: Vec::new(),
        }
    }

    fn by(actor: ActorId, patch: Patch) -> Self {
        Self {
            patch,
            actor: Some(actor),
            contributors: vec![actor],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffWithProvenance {
    pub patches: Vec<AttributedPatch>,
    pub from_heads: Frontier,
    pub to_heads: Frontier,
}

impl DiffWithProvenance {
    /// The bare patch sequence, ready for [`causal_doc::apply_patches`].
    pub fn plain_patches(&self) -> Vec<Patch> {
        self.patches.iter().map(|p| p.patch.clone()).collect()
    }

    /// Returns a copy with adjacent patches coalesced.
    pub fn combined(&self) -> Self {
        Self {
            patches: combine_patches(&self.patches),
            from_heads: self.from_heads.clone(),
            to_heads: self.to_heads.clone(),
        }
    }
}

/// Every change reachable from `frontier`, inclusive.
pub fn ancestry<R: Replica>(doc: &R, frontier: &Frontier) -> Result<HashSet<ChangeHash>> {
    let mut seen = HashSet::new();
    let mut stack: Vec<ChangeHash> = frontier.iter().copied().collect();
    while let Some(hash) = stack.pop() {
        if !seen.insert(hash) {
            continue;
        }
        let change = doc
            .get_change(&hash)
            .ok_or(EngineError::UnknownHash(hash))?;
        stack.extend(change.deps().iter().copied());
    }
    Ok(seen)
}

pub fn diff_with_provenance<R: Replica>(
    doc: &R,
    from: &Frontier,
    to: &Frontier,
) -> Result<DiffWithProvenance> {
    let from_set = ancestry(doc, from)?;
    let to_set = ancestry(doc, to)?;

    let patches = if from_set.is_subset(&to_set) {
        let pending: Vec<&Change> = doc
            .changes()
            .iter()
            .filter(|c| to_set.contains(&c.hash()) && !from_set.contains(&c.hash()))
            .collect();
        stepwise(doc, from, &pending)?
    } else {
        let added = footprints(doc, |c| to_set.contains(c) && !from_set.contains(c))?;
        let removed = footprints(doc, |c| from_set.contains(c) && !to_set.contains(c))?;
        doc.diff(from, to)?
            .into_iter()
            .map(|patch| attribute(patch, &added, &removed))
            .collect()
    };

    debug!(
        doc = %doc.url(),
        from = %from,
        to = %to,
        patches = patches.len(),
        "computed attributed diff"
    );
    Ok(DiffWithProvenance {
        patches,
        from_heads: from.clone(),
        to_heads: to.clone(),
    })
}

/// Diffs one same-actor run of `pending` at a time, starting at `from`.
fn stepwise<R: Replica>(
    doc: &R,
    from: &Frontier,
    pending: &[&Change],
) -> Result<Vec<AttributedPatch>> {
    let mut patches = Vec::new();
    let mut frontier = from.clone();
    let mut start = 0;
    while start < pending.len() {
        let actor = pending[start].actor();
        let end = pending[start..]
            .iter()
            .position(|c| c.actor() != actor)
            .map_or(pending.len(), |n| start + n);
        let next = pending[start..end]
            .iter()
            .fold(frontier.clone(), |f, c| f.advance(c));
        patches.extend(
            doc.diff(&frontier, &next)?
                .into_iter()
                .map(|patch| AttributedPatch::by(actor, patch)),
        );
        frontier = next;
        start = end;
    }
    Ok(patches)
}

/// What one change edits: the objects its own diff touches, with the key
/// for map edits.
struct Footprint {
    actor: ActorId,
    edits: Vec<(ObjId, Option<String>)>,
}

impl Footprint {
    fn touches(&self, patch: &Patch) -> bool {
        self.edits.iter().any(|(obj, key)| {
            if *obj != patch.obj {
                return false;
            }
            match (&patch.action, key) {
                (PatchAction::PutMap { key: k, .. } | PatchAction::DeleteMap { key: k }, Some(key)) => {
                    k == key
                }
                (PatchAction::PutMap { .. } | PatchAction::DeleteMap { .. }, None) => false,
                _ => true,
            }
        })
    }
}

/// Footprints of the changes selected by `keep`, in log order.
fn footprints<R: Replica>(
    doc: &R,
    keep: impl Fn(&ChangeHash) -> bool,
) -> Result<Vec<Footprint>> {
    doc.changes()
        .iter()
        .filter(|c| keep(&c.hash()))
        .map(|c| -> Result<Footprint> {
            let edits = doc
                .change_diff(&c.hash())?
                .into_iter()
                .map(|p| {
                    let key = match p.action {
                        PatchAction::PutMap { key, .. } | PatchAction::DeleteMap { key } => Some(key),
                        _ => None,
                    };
                    (p.obj, key)
                })
                .collect();
            Ok(Footprint {
                actor: c.actor(),
                edits,
            })
        })
        .collect()
}

/// Blames `patch` on the changes that edit its object. Removals look first
/// at the changes only `from` has, since content missing from `to` was most
/// often written on the other side; everything else looks at `to` first.
fn attribute(patch: Patch, added: &[Footprint], removed: &[Footprint]) -> AttributedPatch {
    let contributing = |changes: &[Footprint]| -> IndexSet<ActorId> {
        changes
            .iter()
            .filter(|c| c.touches(&patch))
            .map(|c| c.actor)
            .collect()
    };
    let (first, second) = match patch.action {
        PatchAction::DeleteSeq { .. } | PatchAction::DeleteMap { .. } => (removed, added),
        _ => (added, removed),
    };
    let mut contributors = contributing(first);
    if contributors.is_empty() {
        contributors = contributing(second);
    }
    AttributedPatch {
        actor: contributors.first().copied(),
        contributors: contributors.into_iter().collect(),
        patch,
    }
}

// ── Coalescing ─────────────────────────────────────────────────────────────

/// Merges consecutive patches on the same object that continue one another.
///
/// The result has the same effect as the input when applied in order.
pub fn combine_patches(patches: &[AttributedPatch]) -> Vec<AttributedPatch> {
    let mut out: Vec<AttributedPatch> = Vec::with_capacity(patches.len());
    for next in patches {
        if let Some(last) = out.last_mut() {
            if last.patch.obj == next.patch.obj && last.patch.path == next.patch.path {
                if let Some(action) = fold(&last.patch.action, &next.patch.action) {
                    last.patch.action = action;
                    let mut contributors: IndexSet<ActorId> =
                        last.contributors.drain(..).collect();
                    contributors.extend(next.contributors.iter().copied());
                    last.contributors = contributors.into_iter().collect();
                    if last.actor.is_none() {
                        last.actor = next.actor;
                    }
                    continue;
                }
            }
        }
        out.push(next.clone());
    }
    out
}

/// [`combine_patches`] for patches without provenance.
pub fn combine_plain(patches: &[Patch]) -> Vec<Patch> {
    let attributed: Vec<AttributedPatch> = patches
        .iter()
        .cloned()
        .map(AttributedPatch::unattributed)
        .collect();
    combine_patches(&attributed)
        .into_iter()
        .map(|p| p.patch)
        .collect()
}

fn insert_chars(into: &str, offset: usize, text: &str) -> String {
    let mut out: String = into.chars().take(offset).collect();
    out.push_str(text);
    out.extend(into.chars().skip(offset));
    out
}

/// A single action equivalent to `first` followed by `second`, if one exists.
fn fold(first: &PatchAction, second: &PatchAction) -> Option<PatchAction> {
    use PatchAction::*;
    match (first, second) {
        (SpliceText { index: i, value: a }, SpliceText { index: j, value: b })
            if *i <= *j && *j <= i + a.chars().count() =>
        {
            Some(SpliceText {
                index: *i,
                value: insert_chars(a, j - i, b),
            })
        }
        (Insert { index: i, values: a }, Insert { index: j, values: b })
            if *i <= *j && *j <= i + a.len() =>
        {
            let mut values = a.clone();
            values.splice(j - i..j - i, b.iter().cloned());
            Some(Insert { index: *i, values })
        }
        (DeleteSeq { index: i, length: a }, DeleteSeq { index: j, length: b })
            if *j <= *i && *i <= j + b =>
        {
            Some(DeleteSeq {
                index: *j,
                length: a + b,
            })
        }
        (DeleteSeq { index: i, length }, SpliceText { index: j, value }) if i == j => {
            Some(Replace {
                index: *i,
                length: *length,
                value: value.clone(),
            })
        }
        (
            Replace {
                index: i,
                length,
                value,
            },
            SpliceText { index: j, value: more },
        ) if *i <= *j && *j <= i + value.chars().count() => Some(Replace {
            index: *i,
            length: *length,
            value: insert_chars(value, j - i, more),
        }),
        (
            Replace {
                index: i,
                length: a,
                value,
            },
            DeleteSeq { index: j, length: b },
        ) => {
            if j + b == *i {
                Some(Replace {
                    index: *j,
                    length: a + b,
                    value: value.clone(),
                })
            } else if *j == i + value.chars().count() {
                Some(Replace {
                    index: *i,
                    length: a + b,
                    value: value.clone(),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Patches whose path starts at root key `key`.
pub fn filter_patches(patches: &[AttributedPatch], key: &str) -> Vec<AttributedPatch> {
    patches
        .iter()
        .filter(|p| p.patch.is_under(key))
        .cloned()
        .collect()
}

// ── Views ──────────────────────────────────────────────────────────────────

/// Everything a branch changed since it was forked or last rebased,
/// coalesced. Edits to the branch bookkeeping itself are left out.
pub fn branch_diff<R: Replica>(branch_doc: &R) -> Result<DiffWithProvenance> {
    let source = branch::branch_metadata(branch_doc)?
        .and_then(|m| m.source)
        .ok_or_else(|| HistoryError::NotABranch(branch_doc.url().clone()))?;
    let diff = diff_with_provenance(branch_doc, &source.branch_heads, &branch_doc.heads())?;
    let patches: Vec<AttributedPatch> = diff
        .patches
        .into_iter()
        .filter(|p| {
            !p.patch.is_under(branch::METADATA_KEY) && !p.patch.is_under(branch::SOURCE_KEY)
        })
        .collect();
    Ok(DiffWithProvenance {
        patches: combine_patches(&patches),
        from_heads: diff.from_heads,
        to_heads: diff.to_heads,
    })
}

/// Edits to the content field since `session_start`, coalesced.
pub fn session_diff<R: Replica>(
    doc: &R,
    session_start: &Frontier,
    config: &HistoryConfig,
) -> Result<DiffWithProvenance> {
    let diff = diff_with_provenance(doc, session_start, &doc.heads())?;
    Ok(DiffWithProvenance {
        patches: combine_patches(&filter_patches(&diff.patches, &config.content_field)),
        from_heads: diff.from_heads,
        to_heads: diff.to_heads,
    })
}
