//! Display statistics for change groups of markdown documents.
//!
//! A markdown document keeps its body as text under
//! [`HistoryConfig::content_field`] and its discussions under
//! [`HistoryConfig::comments_field`]. Unlike the per-op counters of a
//! [`ChangeGroup`], these numbers are derived from the group's diff.

use causal_doc::{Change, Patch, PatchAction, Prop, Replica};
use regex::Regex;
use serde::Serialize;

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::group::ChangeGroup;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heading {
    /// Character offset of the heading line in the content.
    pub index: usize,
    pub text: String,
    /// Content patches that touch this heading's section.
    pub patches: Vec<Patch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownStats {
    /// Number of distinct edit ranges in the content.
    pub edit_count: usize,
    pub chars_added: usize,
    pub chars_deleted: usize,
    pub headings: Vec<Heading>,
    pub comments_added: usize,
}

pub fn stats_for_change_group<R: Replica>(
    doc: &R,
    group: &ChangeGroup,
    config: &HistoryConfig,
) -> Result<MarkdownStats> {
    let content_patches: Vec<Patch> = group
        .diff
        .iter()
        .filter(|p| p.is_under(&config.content_field))
        .cloned()
        .collect();
    let (chars_added, chars_deleted) = chars_added_and_deleted(&content_patches);
    let comments_added = group
        .diff
        .iter()
        .map(|p| comments_in(p, &config.comments_field))
        .sum();

    let at_end = doc.view_at(&group.to_heads)?;
    let content = at_end
        .get(&config.content_field)
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let headings = extract_headings(content, &content_patches, &config.heading_regex()?);

    Ok(MarkdownStats {
        edit_count: content_patches.len(),
        chars_added,
        chars_deleted,
        headings,
        comments_added,
    })
}

/// Comments created by `patch`: either a new thread put with its comments,
/// or comments inserted into an existing thread's `comments` list.
fn comments_in(patch: &Patch, field: &str) -> usize {
    if !patch.is_under(field) {
        return 0;
    }
    match (&patch.action, patch.path.len()) {
        (PatchAction::PutMap { value, .. }, 1) => value
            .get("comments")
            .and_then(|c| c.as_array())
            .map_or(0, Vec::len),
        (PatchAction::Insert { values, .. }, 3)
            if patch.path[2] == Prop::Key("comments".to_string()) =>
        {
            values.len()
        }
        _ => 0,
    }
}

/// Characters spliced in and deleted across `patches`. A string put counts
/// as added text.
pub fn chars_added_and_deleted(patches: &[Patch]) -> (usize, usize) {
    patches
        .iter()
        .fold((0, 0), |(added, deleted), patch| match &patch.action {
            PatchAction::SpliceText { value, .. } => (added + value.chars().count(), deleted),
            PatchAction::PutMap {
                value: serde_json::Value::String(text),
                ..
            } => (added + text.chars().count(), deleted),
            PatchAction::DeleteSeq { length, .. } => (added, deleted + length),
            PatchAction::Replace { length, value, .. } => {
                (added + value.chars().count(), deleted + length)
            }
            _ => (added, deleted),
        })
}

/// Headings of `content` and, for each, the patches that edit it.
///
/// A patch edits a heading when the heading starts inside the patch's range,
/// or when the patch starts inside the heading's section (between the
/// heading and the next one).
pub fn extract_headings(content: &str, patches: &[Patch], pattern: &Regex) -> Vec<Heading> {
    let mut headings: Vec<Heading> = pattern
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Heading {
                index: content[..whole.start()].chars().count(),
                text: caps.get(1).map_or("", |m| m.as_str()).to_string(),
                patches: Vec::new(),
            })
        })
        .collect();

    for patch in patches {
        let (start, end) = match &patch.action {
            PatchAction::SpliceText { index, value } => (*index, index + value.chars().count()),
            PatchAction::DeleteSeq { index, length } => (*index, index + length),
            PatchAction::Replace { index, value, .. } => (*index, index + value.chars().count()),
            _ => continue,
        };
        for i in 0..headings.len() {
            let at = headings[i].index;
            let covers = at >= start && at <= end;
            let within = at < start && headings.get(i + 1).is_some_and(|next| next.index > start);
            if covers || within {
                headings[i].patches.push(patch.clone());
            }
        }
    }
    headings
}

pub fn include_patch(patch: &Patch, config: &HistoryConfig) -> bool {
    patch.is_under(&config.content_field) || patch.is_under(&config.comments_field)
}

/// `true` if `change` edits the content or the comment threads of `doc`.
pub fn include_change<R: Replica>(doc: &R, change: &Change, config: &HistoryConfig) -> Result<bool> {
    Ok(doc
        .change_diff(&change.hash())?
        .iter()
        .any(|patch| include_patch(patch, config)))
}

pub fn show_change_group_in_log(stats: &MarkdownStats) -> bool {
    stats.chars_added > 0 || stats.chars_deleted > 0 || stats.comments_added > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use causal_doc::{ActorId, DocUrl, Document, ObjId, ObjKind};
    use serde_json::json;

    fn content_patch(action: PatchAction) -> Patch {
        Patch {
            obj: ObjId::ROOT,
            path: vec![Prop::Key("content".into())],
            action,
        }
    }

    #[test]
    fn headings_collect_overlapping_patches() {
        let content = "# Title\n## One\nbody\n## Two\nmore";
        let regex = HistoryConfig::default().heading_regex().unwrap();
        let inside_one = content_patch(PatchAction::SpliceText {
            index: 17,
            value: "x".into(),
        });
        let on_two = content_patch(PatchAction::DeleteSeq {
            index: 20,
            length: 3,
        });
        let headings = extract_headings(content, &[inside_one.clone(), on_two.clone()], &regex);

        assert_eq!(headings.len(), 2);
        assert_eq!(headings[0].text, "One");
        assert_eq!(headings[0].index, 8);
        assert_eq!(headings[0].patches, vec![inside_one]);
        assert_eq!(headings[1].text, "Two");
        assert_eq!(headings[1].index, 20);
        assert_eq!(headings[1].patches, vec![on_two]);
    }

    #[test]
    fn counts_splices_deletes_and_new_comments() {
        let patches = vec![
            content_patch(PatchAction::SpliceText {
                index: 0,
                value: "héllo".into(),
            }),
            content_patch(PatchAction::DeleteSeq {
                index: 2,
                length: 2,
            }),
        ];
        assert_eq!(chars_added_and_deleted(&patches), (5, 2));

        let new_thread = Patch {
            obj: ObjId::ROOT,
            path: vec![Prop::Key("commentThreads".into())],
            action: PatchAction::PutMap {
                key: "t1".into(),
                value: json!({"comments": [{"text": "hi"}]}),
            },
        };
        let reply = Patch {
            obj: ObjId::ROOT,
            path: vec!["commentThreads".into(), "t1".into(), "comments".into()],
            action: PatchAction::Insert {
                index: 1,
                values: vec![json!({"text": "re"}), json!({"text": "re2"})],
            },
        };
        assert_eq!(comments_in(&new_thread, "commentThreads"), 1);
        assert_eq!(comments_in(&reply, "commentThreads"), 2);
        assert!(include_patch(&reply, &HistoryConfig::default()));
    }

    #[test]
    fn only_content_and_comment_changes_are_included() {
        let config = HistoryConfig::default();
        let mut doc = Document::with_url(DocUrl::generate(), ActorId(1));
        doc.mutate(None, |tx| {
            let content = tx.put_object(&ObjId::ROOT, "content", ObjKind::Text)?;
            tx.splice_text(&content, 0, 0, "body")
        })
        .unwrap();
        doc.mutate(None, |tx| tx.put(&ObjId::ROOT, "title", "t".into()))
            .unwrap();
        doc.mutate(None, |tx| {
            tx.put_json(
                &ObjId::ROOT,
                "commentThreads",
                &json!({"t1": {"comments": [{"text": "hi"}]}}),
            )
        })
        .unwrap();

        let included: Vec<bool> = doc
            .changes()
            .iter()
            .map(|c| include_change(&doc, c, &config).unwrap())
            .collect();
        assert_eq!(included, vec![true, false, true]);
    }

    #[test]
    fn group_stats_count_text_and_new_threads() {
        let config = HistoryConfig::default();
        let mut doc = Document::with_url(DocUrl::generate(), ActorId(1));
        doc.mutate(None, |tx| {
            let content = tx.put_object(&ObjId::ROOT, "content", ObjKind::Text)?;
            tx.splice_text(&content, 0, 0, "## Intro\nhello")
        })
        .unwrap();
        doc.mutate(None, |tx| {
            tx.put_json(
                &ObjId::ROOT,
                "commentThreads",
                &json!({"t1": {"comments": [{"text": "hi"}, {"text": "again"}]}}),
            )
        })
        .unwrap();

        let groups = crate::group::group(&doc).unwrap();
        assert_eq!(groups.len(), 1);
        let stats = stats_for_change_group(&doc, &groups[0], &config).unwrap();
        assert_eq!(stats.chars_added, 14);
        assert_eq!(stats.chars_deleted, 0);
        assert_eq!(stats.comments_added, 2);
        assert_eq!(stats.headings.len(), 1);
        assert_eq!(stats.headings[0].text, "Intro");
        assert!(show_change_group_in_log(&stats));
    }
}
