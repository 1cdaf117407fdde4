//! Version-control semantics over replicated documents.
//!
//! # Overview
//!
//! Everything here is written against the [`causal_doc::Replica`] contract:
//!
//! - [`group`](group::group) partitions a change log into per-actor
//!   [`ChangeGroup`]s for a history view.
//! - [`diff_with_provenance`](provenance::diff_with_provenance) attributes the
//!   patches between two versions to their authors, and
//!   [`combine_patches`](provenance::combine_patches) coalesces them.
//! - The [`branch`] module forks documents into branches and rebases and
//!   merges them, keeping its bookkeeping inside the documents themselves.
//! - [`stats`] and [`tags`] add markdown statistics and named milestones.
//!
//! Nothing here holds state between calls; every query re-reads the
//! document it is given.

pub mod branch;
pub mod config;
pub mod error;
pub mod group;
pub mod provenance;
pub mod stats;
pub mod tags;

pub use branch::{
    create_branch, delete_branch, merge_branch, needs_rebase, rebase_branch, rename_branch,
    BranchLink, BranchMetadata, BranchState, CreateBranch, DocumentKind, MergeOutcome,
};
pub use config::HistoryConfig;
pub use error::{HistoryError, Result};
pub use group::{group, group_with, ChangeGroup};
pub use provenance::{
    combine_patches, diff_with_provenance, AttributedPatch, DiffWithProvenance,
};
