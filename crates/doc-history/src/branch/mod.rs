//! Branch metadata and the branch lifecycle.

mod lifecycle;
mod metadata;

pub use lifecycle::{
    branch_state, create_branch, create_branch_with, delete_branch, has_unmerged_changes,
    init_branch_metadata, merge_branch, move_changes_to_branch, needs_rebase, rebase_branch,
    rename_branch, CreateBranch, MergeOutcome,
};
pub use metadata::{
    branch_metadata, document_kind, find_branch, open_branches, suggest_branch_name,
    BranchDocument, BranchLink, BranchMetadata, BranchSource, BranchState, DocumentKind,
    MainDocument, MergeMetadata, METADATA_KEY, SOURCE_KEY,
};
