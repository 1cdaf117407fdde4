mod common;

use causal_doc::{apply_patches, ActorId, DocUrl, Document, ObjId, ObjKind, Replica};
use doc_history::branch::{
    branch_metadata, branch_state, create_branch, delete_branch, document_kind, find_branch,
    has_unmerged_changes, init_branch_metadata, merge_branch, move_changes_to_branch,
    needs_rebase, open_branches, rebase_branch, rename_branch, BranchState, CreateBranch,
    DocumentKind, MergeOutcome, METADATA_KEY, SOURCE_KEY,
};
use doc_history::provenance::branch_diff;
use doc_history::{HistoryConfig, HistoryError};

use common::{content, markdown, set_content, splice};

fn branch_off(main: &mut Document, name: &str) -> Document {
    let mut branch = create_branch(
        main,
        CreateBranch {
            name: Some(name.to_string()),
            created_by: Some("contact:one".into()),
            ..CreateBranch::default()
        },
    )
    .expect("create must succeed");
    branch.set_actor(ActorId(2));
    branch
}

fn recorded_heads(branch: &Document) -> causal_doc::Frontier {
    branch_metadata(branch)
        .expect("metadata must parse")
        .and_then(|m| m.source)
        .expect("branch must have a source")
        .branch_heads
}

#[test]
fn main_and_branch_scenario() {
    let mut main = markdown(1, "A");
    let h0 = main.heads();
    let mut b1 = create_branch(
        &mut main,
        CreateBranch {
            name: Some("B1".into()),
            at: Some(h0.clone()),
            created_by: Some("contact:one".into()),
        },
    )
    .expect("create must succeed");
    b1.set_actor(ActorId(2));
    assert_eq!(recorded_heads(&b1), h0);

    set_content(&mut main, "AB");
    let h1 = main.heads();
    set_content(&mut b1, "AX");
    assert!(needs_rebase(&main, &b1).expect("query must succeed"));

    rebase_branch(&main, &mut b1).expect("rebase must succeed");
    let rebased = content(&b1);
    assert_eq!(rebased.chars().count(), 3);
    assert!(rebased.starts_with('A'));
    assert!(rebased.contains('B') && rebased.contains('X'));
    assert_eq!(recorded_heads(&b1), h1);
    assert!(!needs_rebase(&main, &b1).expect("query must succeed"));

    let outcome = merge_branch(&mut main, &b1, Some("contact:one")).expect("merge must succeed");
    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(content(&main), rebased);

    let link = find_branch(&main, b1.url())
        .expect("metadata must parse")
        .expect("link must exist");
    assert_eq!(link.name, "B1");
    let merged = link.merge_metadata.expect("link must be stamped");
    assert_eq!(merged.merge_heads, b1.heads());
    assert_eq!(merged.merged_by.as_deref(), Some("contact:one"));
    assert_eq!(link.created_by.as_deref(), Some("contact:one"));
}

#[test]
fn fresh_branch_is_up_to_date() {
    let mut main = markdown(1, "hello");
    let branch = branch_off(&mut main, "fresh");
    assert!(!needs_rebase(&main, &branch).expect("query must succeed"));
    assert!(!has_unmerged_changes(&main, &branch).expect("query must succeed"));
    assert_eq!(content(&branch), "hello");
    assert!(matches!(
        document_kind(&branch).expect("metadata must parse"),
        DocumentKind::Branch(b) if &b.source.main_doc_url == main.url()
    ));
}

#[test]
fn rebase_twice_changes_nothing_the_second_time() {
    let mut main = markdown(1, "one");
    let mut branch = branch_off(&mut main, "b");
    set_content(&mut main, "one two");
    set_content(&mut branch, "zero one");

    let absorbed = rebase_branch(&main, &mut branch).expect("rebase must succeed");
    assert!(!absorbed.is_empty());
    let text = content(&branch);
    let heads = branch.heads();
    let recorded = recorded_heads(&branch);

    let absorbed = rebase_branch(&main, &mut branch).expect("rebase must succeed");
    assert!(absorbed.is_empty());
    assert_eq!(content(&branch), text);
    assert_eq!(branch.heads(), heads);
    assert_eq!(recorded_heads(&branch), recorded);
    assert_eq!(text, "zero one two");
}

#[test]
fn merge_folds_branch_content_into_main() {
    let mut main = markdown(1, "draft");
    let mut branch = branch_off(&mut main, "edits");
    splice(&mut branch, 5, 0, " v2");
    assert!(has_unmerged_changes(&main, &branch).expect("query must succeed"));

    let outcome = merge_branch(&mut main, &branch, None).expect("merge must succeed");
    assert_eq!(outcome, MergeOutcome::Merged);
    assert_eq!(content(&main), "draft v2");
    assert!(!has_unmerged_changes(&main, &branch).expect("query must succeed"));

    // Merging must not turn the main document into a branch of itself.
    assert!(matches!(
        document_kind(&main).expect("metadata must parse"),
        DocumentKind::Main(_)
    ));
    assert_eq!(
        branch_state(&branch, Some(&main)).expect("query must succeed"),
        BranchState::MergedBranch
    );
    assert!(open_branches(&main).expect("metadata must parse").is_empty());

    let next = branch_off(&mut main, "next");
    assert!(!needs_rebase(&main, &next).expect("query must succeed"));
    assert_eq!(content(&next), "draft v2");
}

#[test]
fn second_merge_is_refused_without_writing() {
    let mut main = markdown(1, "x");
    let mut branch = branch_off(&mut main, "b");
    splice(&mut branch, 1, 0, "y");
    merge_branch(&mut main, &branch, None).expect("merge must succeed");
    let stamped = find_branch(&main, branch.url())
        .expect("metadata must parse")
        .and_then(|l| l.merge_metadata);

    splice(&mut branch, 2, 0, "z");
    let heads = main.heads();
    let outcome = merge_branch(&mut main, &branch, Some("contact:seven")).expect("merge must succeed");
    assert_eq!(outcome, MergeOutcome::AlreadyMerged);
    assert_eq!(main.heads(), heads);
    assert_eq!(content(&main), "xy");
    assert_eq!(
        find_branch(&main, branch.url())
            .expect("metadata must parse")
            .and_then(|l| l.merge_metadata),
        stamped
    );
}

#[test]
fn rename_and_delete_tolerate_missing_links() {
    let mut main = markdown(1, "text");
    let branch = branch_off(&mut main, "old");

    let renamed = rename_branch(&mut main, branch.url(), "new")
        .expect("rename must succeed")
        .expect("link must exist");
    assert_eq!(renamed.name, "new");

    let heads = main.heads();
    let stranger = DocUrl::generate();
    assert_eq!(
        rename_branch(&mut main, &stranger, "x").expect("rename must succeed"),
        None
    );
    assert_eq!(
        delete_branch(&mut main, &stranger).expect("delete must succeed"),
        None
    );
    assert_eq!(main.heads(), heads);

    let removed = delete_branch(&mut main, branch.url())
        .expect("delete must succeed")
        .expect("link must exist");
    assert_eq!(removed.url, *branch.url());
    assert!(find_branch(&main, branch.url())
        .expect("metadata must parse")
        .is_none());
    // The branch document itself lives on.
    assert_eq!(content(&branch), "text");
}

#[test]
fn branch_operations_check_the_source() {
    let mut main = markdown(1, "a");
    let mut other = markdown(3, "b");
    let mut branch = branch_off(&mut main, "b");

    assert!(matches!(
        rebase_branch(&other, &mut branch),
        Err(HistoryError::SourceMismatch { .. })
    ));
    assert!(matches!(
        merge_branch(&mut other, &branch, None),
        Err(HistoryError::SourceMismatch { .. })
    ));
    let mut copy = main.clone();
    assert!(matches!(
        rebase_branch(&main, &mut copy),
        Err(HistoryError::NotABranch(_))
    ));
    assert_eq!(
        branch_state(&main, None).expect("query must succeed"),
        BranchState::Main
    );
    assert_eq!(
        branch_state(&branch, Some(&main)).expect("query must succeed"),
        BranchState::Branch
    );
}

#[test]
fn branch_diff_shows_branch_edits_only() {
    let mut main = markdown(1, "base text");
    let mut branch = branch_off(&mut main, "b");
    splice(&mut branch, 4, 0, "d");
    splice(&mut branch, 5, 0, "!");

    let diff = branch_diff(&branch).expect("diff must succeed");
    assert_eq!(diff.patches.len(), 1);
    assert_eq!(diff.patches[0].actor, Some(ActorId(2)));

    let mut view = branch.view_at(&diff.from_heads).expect("view must succeed");
    apply_patches(&mut view, &diff.plain_patches()).expect("patches must apply");
    assert_eq!(view["content"], branch.view()["content"]);
    assert_eq!(content(&branch), "based! text");
}

#[test]
fn session_edits_move_to_a_new_branch() {
    let mut main = markdown(1, "keep");
    let session_start = main.heads();
    set_content(&mut main, "keep and more");

    let branch = move_changes_to_branch(
        &mut main,
        &session_start,
        Some("contact:one"),
        &HistoryConfig::default(),
    )
    .expect("move must succeed");

    assert_eq!(content(&main), "keep");
    assert_eq!(content(&branch), "keep and more");
    let link = find_branch(&main, branch.url())
        .expect("metadata must parse")
        .expect("link must exist");
    assert_eq!(link.name, "Untitled branch 1");
    assert!(!needs_rebase(&main, &branch).expect("query must succeed"));
}

fn link_names(doc: &Document) -> Vec<String> {
    let mut names: Vec<String> = branch_metadata(doc)
        .expect("metadata must parse")
        .map(|m| m.branches.into_iter().map(|l| l.name).collect())
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn branch_forked_before_the_link_list_merges_back_cleanly() {
    let mut main = Document::with_url(DocUrl::generate(), ActorId(1));
    main.mutate(Some("create"), |tx| {
        let content = tx.put_object(&ObjId::ROOT, "content", ObjKind::Text)?;
        tx.splice_text(&content, 0, 0, "base")
    })
    .expect("create must succeed");
    let h0 = main.heads();

    let mut early = create_branch(
        &mut main,
        CreateBranch {
            name: Some("early".into()),
            at: Some(h0),
            created_by: None,
        },
    )
    .expect("create must succeed");
    early.set_actor(ActorId(2));
    assert!(early.view().get(METADATA_KEY).is_none());

    let mut peer = main.fork(main.url().clone());
    peer.set_actor(ActorId(3));
    let late = create_branch(
        &mut peer,
        CreateBranch {
            name: Some("late".into()),
            ..CreateBranch::default()
        },
    )
    .expect("create must succeed");

    splice(&mut early, 4, 0, "!");
    let outcome = merge_branch(&mut main, &early, None).expect("merge must succeed");
    assert_eq!(outcome, MergeOutcome::Merged);
    main.merge(&peer).expect("sync must succeed");

    assert_eq!(link_names(&main), ["early", "late"]);
    assert!(find_branch(&main, early.url())
        .expect("metadata must parse")
        .is_some_and(|l| l.is_merged()));
    assert!(find_branch(&main, late.url())
        .expect("metadata must parse")
        .is_some_and(|l| !l.is_merged()));
    assert!(matches!(
        document_kind(&main).expect("metadata must parse"),
        DocumentKind::Main(_)
    ));
    assert!(main.view().get(SOURCE_KEY).is_none());
    assert_eq!(content(&main), "base!");
}

#[test]
fn branch_without_link_list_can_not_hold_branches() {
    let mut main = Document::with_url(DocUrl::generate(), ActorId(1));
    main.mutate(Some("create"), |tx| tx.put(&ObjId::ROOT, "title", "t".into()))
        .expect("create must succeed");
    let h0 = main.heads();
    let mut early = create_branch(
        &mut main,
        CreateBranch {
            at: Some(h0),
            ..CreateBranch::default()
        },
    )
    .expect("create must succeed");

    let heads = early.heads();
    assert!(matches!(
        create_branch(&mut early, CreateBranch::default()),
        Err(HistoryError::NoLinkList(url)) if &url == early.url()
    ));
    assert!(matches!(
        init_branch_metadata(&mut early),
        Err(HistoryError::NoLinkList(_))
    ));
    assert_eq!(early.heads(), heads);

    // A branch forked after the list existed inherits it and can nest.
    let mut later = branch_off(&mut main, "later");
    let nested = create_branch(&mut later, CreateBranch::default()).expect("create must succeed");
    assert!(find_branch(&later, nested.url())
        .expect("metadata must parse")
        .is_some());
    assert!(find_branch(&main, nested.url())
        .expect("metadata must parse")
        .is_none());
}

#[test]
fn concurrent_link_edits_converge_across_replicas() {
    let mut main = markdown(1, "shared");
    let one = branch_off(&mut main, "one");
    let mut two = branch_off(&mut main, "two");
    two.set_actor(ActorId(6));
    let gone = branch_off(&mut main, "gone");

    let mut peer = main.fork(main.url().clone());
    peer.set_actor(ActorId(5));

    // Local replica appends, renames and merges.
    branch_off(&mut main, "three");
    rename_branch(&mut main, one.url(), "first")
        .expect("rename must succeed")
        .expect("link must exist");
    splice(&mut two, 6, 0, "!");
    let outcome = merge_branch(&mut main, &two, Some("contact:main")).expect("merge must succeed");
    assert_eq!(outcome, MergeOutcome::Merged);

    // The peer appends, deletes and edits content.
    branch_off(&mut peer, "four");
    delete_branch(&mut peer, gone.url())
        .expect("delete must succeed")
        .expect("link must exist");
    splice(&mut peer, 0, 0, ">");

    // Meanwhile the merged branch rebases onto the peer, which has not
    // seen the merge yet.
    rebase_branch(&peer, &mut two).expect("rebase must succeed");

    main.merge(&peer).expect("sync must succeed");
    peer.merge(&main).expect("sync must succeed");
    assert_eq!(main.heads(), peer.heads());
    assert_eq!(main.view(), peer.view());

    assert_eq!(link_names(&main), ["first", "four", "three", "two"]);
    let merged = find_branch(&main, two.url())
        .expect("metadata must parse")
        .and_then(|l| l.merge_metadata)
        .expect("link must stay stamped");
    assert_eq!(merged.merged_by.as_deref(), Some("contact:main"));
    assert!(main.view().get(SOURCE_KEY).is_none());
    assert_eq!(content(&main), ">shared!");

    // The rebase stamp reaches the source through plain replication. It
    // names the source itself, so the source stays a main document.
    main.merge(&two).expect("sync must succeed");
    assert!(main.view().get(SOURCE_KEY).is_some());
    assert!(matches!(
        document_kind(&main).expect("metadata must parse"),
        DocumentKind::Main(_)
    ));
    assert_eq!(link_names(&main), ["first", "four", "three", "two"]);
    assert_eq!(
        merge_branch(&mut main, &two, None).expect("merge must succeed"),
        MergeOutcome::AlreadyMerged
    );
    assert!(matches!(
        document_kind(&two).expect("metadata must parse"),
        DocumentKind::Branch(b) if &b.source.main_doc_url == main.url()
    ));
    assert_eq!(content(&two), ">shared!");
}
