//! Replicated, causally ordered JSON documents.
//!
//! A [`Document`] wraps an automerge document: a log of hash-identified
//! [`Change`]s forming a DAG through their dependencies. Any set of heads
//! (a [`Frontier`]) names a version of the document; versions can be
//! viewed, diffed into structural [`Patch`]es, forked and merged.
//!
//! Code that only needs the replica contract should be generic over
//! [`Replica`] rather than use [`Document`] directly.
//!
//! ```
//! use causal_doc::{Document, ObjId, ObjKind, Replica};
//! use serde_json::json;
//!
//! let mut doc = Document::new();
//! doc.mutate(Some("start"), |tx| {
//!     let text = tx.put_object(&ObjId::ROOT, "content", ObjKind::Text)?;
//!     tx.splice_text(&text, 0, 0, "hello")
//! })
//! .unwrap();
//! assert_eq!(doc.view(), json!({"content": "hello"}));
//! ```

mod actor;
mod change;
mod document;
mod error;
mod hash;
mod object;
pub mod patch;
mod replica;
mod transaction;
mod url;
mod view;

pub use actor::ActorId;
pub use change::Change;
pub use document::Document;
pub use error::EngineError;
pub use hash::{ChangeHash, Frontier};
pub use object::{ObjId, ObjKind, Slot};
pub use patch::{apply_patches, Patch, PatchAction, Prop};
pub use replica::Replica;
pub use transaction::Transact;
pub use url::DocUrl;
