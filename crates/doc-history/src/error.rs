use causal_doc::{DocUrl, EngineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),
    #[error("document {0} is not a branch")]
    NotABranch(DocUrl),
    #[error("branch {branch} was forked from {expected}, not from this document")]
    SourceMismatch { branch: DocUrl, expected: DocUrl },
    #[error("branch {0} was forked before its source had a branch list and can not hold branches")]
    NoLinkList(DocUrl),
    #[error("malformed branch metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = HistoryError> = std::result::Result<T, E>;
