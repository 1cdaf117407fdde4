//! Branch state machine: create, rebase, merge, rename, delete.
//!
//! Branches are whole-document forks. The source lists them in
//! `branchMetadata.branches`; each branch records its source and the source
//! version it is based on under root key `branchSource`. Staleness of that
//! version is a query ([`needs_rebase`]), never an error.

use causal_doc::{ChangeHash, DocUrl, EngineError, Frontier, ObjId, Replica};
use chrono::Utc;
use tracing::{debug, info};

use super::metadata::{
    branch_metadata, branches_list, document_kind, ensure, find_branch, locate_link, read_link,
    suggest_branch_name, write_source, BranchLink, BranchMetadata, BranchSource, BranchState,
    DocumentKind, MergeMetadata, METADATA_KEY, SOURCE_KEY,
};
use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Options for [`create_branch`].
#[derive(Debug, Clone, Default)]
pub struct CreateBranch {
    /// Display name; a numbered default is suggested when absent.
    pub name: Option<String>,
    /// Fork point; the source's current heads when absent.
    pub at: Option<Frontier>,
    /// Opaque author identifier recorded on the link.
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Branch content folded in and its link stamped.
    Merged,
    /// Content folded in, but the source holds no link for the branch.
    MergedUnlinked,
    /// The link already carries merge metadata; nothing was done.
    AlreadyMerged,
}

/// Writes an empty link list if `doc` has none yet.
pub fn init_branch_metadata<R: Replica>(doc: &mut R) -> Result<()> {
    can_hold_links(doc, branch_metadata(doc)?.as_ref())?;
    doc.mutate(Some("init branch metadata"), |tx| ensure(tx).map(|_| ()))?;
    Ok(())
}

/// A branch that lacks a link list would have to create one, and that list
/// would compete with its source's list once merged back.
fn can_hold_links<R: Replica>(doc: &R, meta: Option<&BranchMetadata>) -> Result<()> {
    let is_branch = meta.is_some_and(|m| m.source.is_some());
    if is_branch && doc.object_at(&[METADATA_KEY.into()]).is_none() {
        return Err(HistoryError::NoLinkList(doc.url().clone()));
    }
    Ok(())
}

pub fn create_branch<R: Replica>(source: &mut R, options: CreateBranch) -> Result<R> {
    create_branch_with(source, options, &HistoryConfig::default())
}

/// Forks `source` into a new branch document.
///
/// The link is appended to the source first, so when forking at the current
/// heads the branch starts out up to date with its source. The branch only
/// writes its source stamp; it never writes a link list of its own, even
/// when forked at a version older than the source's list.
///
/// Fails with [`HistoryError::NoLinkList`] when `source` is itself a branch
/// forked before its own source had a link list.
pub fn create_branch_with<R: Replica>(
    source: &mut R,
    options: CreateBranch,
    config: &HistoryConfig,
) -> Result<R> {
    let existing = branch_metadata(source)?;
    can_hold_links(source, existing.as_ref())?;
    let url = DocUrl::generate();
    let name = match options.name {
        Some(name) => name,
        None => {
            let taken = existing.map(|m| m.branches).unwrap_or_default();
            suggest_branch_name(&taken, &config.branch_name_prefix)
        }
    };
    let link = BranchLink {
        url: url.clone(),
        name,
        created_at: now_millis(),
        created_by: options.created_by,
        merge_metadata: None,
    };
    let link_json = serde_json::to_value(&link)?;
    source.mutate(Some("create branch"), |tx| {
        let list = branches_list(tx)?;
        let end = tx.length(&list)?;
        tx.insert_json(&list, end, &link_json)
    })?;

    let mut branch = match &options.at {
        Some(at) => source.fork_at(at, url)?,
        None => source.fork(url),
    };
    let stamp = BranchSource {
        main_doc_url: source.url().clone(),
        branch_heads: options.at.unwrap_or_else(|| source.heads()),
    };
    branch.mutate(Some("mark as branch"), |tx| write_source(tx, Some(&stamp)))?;

    info!(
        source = %source.url(),
        branch = %branch.url(),
        name = %link.name,
        at = %stamp.branch_heads,
        "created branch"
    );
    Ok(branch)
}

fn source_of<R: Replica>(branch: &R) -> Result<BranchSource> {
    branch_metadata(branch)?
        .and_then(|m| m.source)
        .ok_or_else(|| HistoryError::NotABranch(branch.url().clone()))
}

fn check_source<R: Replica>(source: &R, branch: &R) -> Result<BranchSource> {
    let recorded = source_of(branch)?;
    if &recorded.main_doc_url != source.url() {
        return Err(HistoryError::SourceMismatch {
            branch: branch.url().clone(),
            expected: recorded.main_doc_url,
        });
    }
    Ok(recorded)
}

/// Absorbs the source's changes into `branch` and advances the recorded
/// source version to the source's heads.
///
/// Idempotent: with nothing new in the source, no change is written.
/// Returns the hashes absorbed from the source.
pub fn rebase_branch<R: Replica>(source: &R, branch: &mut R) -> Result<Vec<ChangeHash>> {
    let recorded = check_source(source, branch)?;
    let absorbed = branch.merge(source)?;
    let stamp = BranchSource {
        main_doc_url: recorded.main_doc_url,
        branch_heads: source.heads(),
    };
    branch.mutate(Some("rebase branch"), |tx| write_source(tx, Some(&stamp)))?;
    info!(
        source = %source.url(),
        branch = %branch.url(),
        absorbed = absorbed.len(),
        branch_heads = %stamp.branch_heads,
        "rebased branch"
    );
    Ok(absorbed)
}

/// Folds `branch` into `source` and stamps the branch link as merged.
///
/// The branch's source stamp arrives with its history and is put back to
/// the source's own stamp (or removed) with a single root key write. The
/// link list is only ever edited in place.
///
/// A branch whose link is already stamped is left alone and reported as
/// [`MergeOutcome::AlreadyMerged`].
pub fn merge_branch<R: Replica>(
    source: &mut R,
    branch: &R,
    merged_by: Option<&str>,
) -> Result<MergeOutcome> {
    check_source(source, branch)?;
    let before = branch_metadata(source)?.unwrap_or_default();
    if before
        .branches
        .iter()
        .any(|link| &link.url == branch.url() && link.is_merged())
    {
        info!(source = %source.url(), branch = %branch.url(), "branch already merged");
        return Ok(MergeOutcome::AlreadyMerged);
    }

    let absorbed = source.merge(branch)?;
    let stamp = MergeMetadata {
        merged_at: now_millis(),
        merged_by: merged_by.map(str::to_string),
        merge_heads: branch.heads(),
    };
    let stamp_json = serde_json::to_value(&stamp)?;
    let branch_url = branch.url().clone();
    let linked = source.mutate(Some("merge branch"), |tx| {
        write_source(tx, before.source.as_ref())?;
        if tx.get_object(&ObjId::ROOT, METADATA_KEY)?.is_none() {
            return Ok(false);
        }
        let list = branches_list(tx)?;
        match locate_link(tx, &list, &branch_url)? {
            Some((_, link)) => {
                tx.put_json(&link, "mergeMetadata", &stamp_json)?;
                Ok(true)
            }
            None => Ok(false),
        }
    })?;

    info!(
        source = %source.url(),
        branch = %branch_url,
        absorbed = absorbed.len(),
        linked,
        "merged branch"
    );
    Ok(if linked {
        MergeOutcome::Merged
    } else {
        MergeOutcome::MergedUnlinked
    })
}

/// Removes the link to `url` from `source`. The branch document itself is
/// untouched and stays reachable by url.
///
/// Returns the removed link, or `None` if there was none.
pub fn delete_branch<R: Replica>(source: &mut R, url: &DocUrl) -> Result<Option<BranchLink>> {
    let removed = source.mutate(Some("delete branch"), |tx| {
        if tx.get_object(&ObjId::ROOT, METADATA_KEY)?.is_none() {
            return Ok(None);
        }
        let list = branches_list(tx)?;
        match locate_link(tx, &list, url)? {
            Some((index, link)) => {
                let removed = read_link(tx, &link)?;
                tx.remove(&list, index)?;
                Ok(Some(removed))
            }
            None => Ok(None),
        }
    })?;
    match &removed {
        Some(_) => info!(source = %source.url(), branch = %url, "deleted branch"),
        None => debug!(source = %source.url(), branch = %url, "no branch to delete"),
    }
    Ok(removed)
}

/// Renames the link to `url`. Returns the updated link, or `None` if there
/// was none.
pub fn rename_branch<R: Replica>(
    source: &mut R,
    url: &DocUrl,
    name: &str,
) -> Result<Option<BranchLink>> {
    let renamed = source.mutate(Some("rename branch"), |tx| {
        if tx.get_object(&ObjId::ROOT, METADATA_KEY)?.is_none() {
            return Ok(None);
        }
        let list = branches_list(tx)?;
        match locate_link(tx, &list, url)? {
            Some((_, link)) => {
                tx.put(&link, "name", name.into())?;
                read_link(tx, &link).map(Some)
            }
            None => Ok(None),
        }
    })?;
    match &renamed {
        Some(_) => info!(source = %source.url(), branch = %url, new_name = %name, "renamed branch"),
        None => debug!(source = %source.url(), branch = %url, "no branch to rename"),
    }
    Ok(renamed)
}

// ── Queries ────────────────────────────────────────────────────────────────

/// `true` when the source has moved past the version the branch is based on.
pub fn needs_rebase<R: Replica>(source: &R, branch: &R) -> Result<bool> {
    Ok(source.heads() != source_of(branch)?.branch_heads)
}

/// Heads of the part of `branch`'s history that `source` also holds.
fn shared_heads<R: Replica>(source: &R, branch: &R) -> Frontier {
    let shared: Vec<_> = branch
        .changes()
        .iter()
        .filter(|c| source.get_change(&c.hash()).is_some())
        .collect();
    let depended: std::collections::HashSet<ChangeHash> = shared
        .iter()
        .flat_map(|c| c.deps().iter().copied())
        .collect();
    shared
        .iter()
        .map(|c| c.hash())
        .filter(|h| !depended.contains(h))
        .collect()
}

/// `true` when the branch holds edits outside its branch metadata that the
/// source has not absorbed.
pub fn has_unmerged_changes<R: Replica>(source: &R, branch: &R) -> Result<bool> {
    let base = shared_heads(source, branch);
    let heads = branch.heads();
    if base == heads {
        return Ok(false);
    }
    Ok(branch
        .diff(&base, &heads)?
        .iter()
        .any(|patch| !patch.is_under(METADATA_KEY) && !patch.is_under(SOURCE_KEY)))
}

/// State of `doc`. `source` is needed to tell a merged branch from an open
/// one; without it every branch reports [`BranchState::Branch`].
pub fn branch_state<R: Replica>(doc: &R, source: Option<&R>) -> Result<BranchState> {
    match document_kind(doc)? {
        DocumentKind::Main(_) => Ok(BranchState::Main),
        DocumentKind::Branch(_) => {
            let merged = match source {
                Some(source) => find_branch(source, doc.url())?.is_some_and(|l| l.is_merged()),
                None => false,
            };
            Ok(if merged {
                BranchState::MergedBranch
            } else {
                BranchState::Branch
            })
        }
    }
}

/// Moves the content edits made since `session_start` off `source` onto a
/// new branch: the source's content reverts to its session-start text and
/// the branch carries the edited text.
pub fn move_changes_to_branch<R: Replica>(
    source: &mut R,
    session_start: &Frontier,
    created_by: Option<&str>,
    config: &HistoryConfig,
) -> Result<R> {
    let field = config.content_field.as_str();
    let text_of = |view: &serde_json::Value| -> String {
        view.get(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let original = text_of(&source.view_at(session_start)?);
    let edited = text_of(&source.view());

    let set_content = |text: String| {
        move |tx: &mut dyn causal_doc::Transact| -> Result<(), EngineError> {
            if let Some(content) = tx.get_object(&ObjId::ROOT, field)? {
                tx.update_text(&content, &text)?;
            }
            Ok(())
        }
    };

    source.mutate(Some("move changes to branch"), set_content(original))?;
    let mut branch = create_branch_with(
        source,
        CreateBranch {
            created_by: created_by.map(str::to_string),
            ..CreateBranch::default()
        },
        config,
    )?;
    branch.mutate(Some("restore moved changes"), set_content(edited))?;
    debug!(source = %source.url(), branch = %branch.url(), "moved session changes to branch");
    Ok(branch)
}
