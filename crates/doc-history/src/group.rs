//! Partitioning a change log into per-actor change groups.
//!
//! # Overview
//!
//! A document's log is walked once, oldest first. Consecutive changes by the
//! same actor form a group, up to [`HistoryConfig::grouping_threshold`]
//! members; any other change closes the current group and opens a new one.
//! Every change lands in exactly one group and groups keep log order, so
//! concatenating them reproduces the log.
//!
//! A group's diff runs from the heads of the log prefix before the group to
//! those heads advanced by the group's own members. Changes by other actors
//! that sit earlier in the log are already inside the starting version, so
//! the diff of an interleaved merge holds only the group's edits.

use causal_doc::{ActorId, Change, ChangeHash, Frontier, Patch, PatchAction, Replica};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::HistoryConfig;
use crate::error::Result;

/// A run of changes by one actor, summarized for display.
///
/// `chars_added` and `chars_deleted` add up each member change's own
/// effect, not the group's net diff: text inserted by one member and
/// deleted by a later one counts as both.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeGroup {
    /// Hash of the first change.
    pub id: ChangeHash,
    pub changes: Vec<Change>,
    pub actor_ids: Vec<ActorId>,
    pub chars_added: usize,
    pub chars_deleted: usize,
    /// Net effect of the group, from `from_heads` to `to_heads`.
    pub diff: Vec<Patch>,
    /// Heads of the log prefix before the first change.
    pub from_heads: Frontier,
    /// `from_heads` advanced by every member.
    pub to_heads: Frontier,
}

impl ChangeGroup {
    fn open<R: Replica>(doc: &R, change: &Change, from_heads: Frontier) -> Result<Self> {
        let mut group = Self {
            id: change.hash(),
            changes: Vec::new(),
            actor_ids: vec![change.actor()],
            chars_added: 0,
            chars_deleted: 0,
            diff: Vec::new(),
            to_heads: from_heads.clone(),
            from_heads,
        };
        group.push(doc, change)?;
        Ok(group)
    }

    fn push<R: Replica>(&mut self, doc: &R, change: &Change) -> Result<()> {
        let (added, deleted) = op_counts(doc, change)?;
        self.chars_added += added;
        self.chars_deleted += deleted;
        self.to_heads = self.to_heads.advance(change);
        self.changes.push(change.clone());
        Ok(())
    }

    fn close<R: Replica>(mut self, doc: &R) -> Result<Self> {
        self.diff = doc.diff(&self.from_heads, &self.to_heads)?;
        Ok(self)
    }

    /// The actor every change in the group was authored by.
    pub fn actor(&self) -> ActorId {
        self.actor_ids[0]
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Wall-clock time of the first change.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.changes
            .first()
            .and_then(|c| DateTime::from_timestamp_millis(c.time()))
    }

    /// Wall-clock time of the last change.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.changes
            .last()
            .and_then(|c| DateTime::from_timestamp_millis(c.time()))
    }
}

/// Characters and list elements inserted, and sequence elements deleted, by
/// one change.
pub fn op_counts<R: Replica>(doc: &R, change: &Change) -> Result<(usize, usize)> {
    let counts = doc
        .change_diff(&change.hash())?
        .iter()
        .fold((0, 0), |(added, deleted), patch| match &patch.action {
            PatchAction::SpliceText { value, .. } => (added + value.chars().count(), deleted),
            PatchAction::Insert { values, .. } => (added + values.len(), deleted),
            PatchAction::DeleteSeq { length, .. } => (added, deleted + length),
            _ => (added, deleted),
        });
    Ok(counts)
}

/// Groups `doc`'s whole history with the default threshold.
pub fn group<R: Replica>(doc: &R) -> Result<Vec<ChangeGroup>> {
    group_with(doc, &HistoryConfig::default())
}

pub fn group_with<R: Replica>(doc: &R, config: &HistoryConfig) -> Result<Vec<ChangeGroup>> {
    let threshold = config.grouping_threshold.max(1);
    let mut groups = Vec::new();
    let mut current: Option<ChangeGroup> = None;
    // Heads of the log prefix walked so far.
    let mut frontier = Frontier::empty();

    for change in doc.changes() {
        let extends = current
            .as_ref()
            .is_some_and(|g| g.actor() == change.actor() && g.len() < threshold);
        if extends {
            if let Some(g) = current.as_mut() {
                g.push(doc, change)?;
            }
        } else if let Some(done) =
            current.replace(ChangeGroup::open(doc, change, frontier.clone())?)
        {
            groups.push(done.close(doc)?);
        }
        frontier = frontier.advance(change);
    }
    if let Some(done) = current {
        groups.push(done.close(doc)?);
    }

    debug!(
        doc = %doc.url(),
        changes = doc.changes().len(),
        groups = groups.len(),
        "grouped change log"
    );
    Ok(groups)
}
