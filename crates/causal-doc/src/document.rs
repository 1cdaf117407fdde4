//! Engine-backed [`Replica`].

use std::collections::HashMap;

use automerge::patches::TextRepresentation;
use automerge::transaction::CommitOptions;
use automerge::{Automerge, TextEncoding};
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::actor::ActorId;
use crate::change::Change;
use crate::error::EngineError;
use crate::hash::{ChangeHash, Frontier};
use crate::object::ObjId;
use crate::patch::{Patch, Prop};
use crate::replica::Replica;
use crate::transaction::{Transact, Tx};
use crate::url::DocUrl;
use crate::view::Reader;

/// A complete document replica: the engine document plus a log of its
/// changes in application order.
#[derive(Debug, Clone)]
pub struct Document {
    url: DocUrl,
    doc: Automerge,
    log: Vec<Change>,
    index: HashMap<ChangeHash, usize>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document with a fresh url and a random actor.
    pub fn new() -> Self {
        Self::with_url(DocUrl::generate(), ActorId::random())
    }

    pub fn with_url(url: DocUrl, actor: ActorId) -> Self {
        Self::from_engine(url, Automerge::new().with_actor(actor.to_engine()))
    }

    fn from_engine(url: DocUrl, doc: Automerge) -> Self {
        let mut document = Self {
            url,
            doc,
            log: Vec::new(),
            index: HashMap::new(),
        };
        document.sync_log();
        document
    }

    pub fn actor(&self) -> ActorId {
        ActorId::from_engine(self.doc.get_actor())
    }

    /// Changes the actor future mutations are attributed to.
    ///
    /// One actor must never write to two replicas concurrently, otherwise
    /// their sequence numbers collide.
    pub fn set_actor(&mut self, actor: ActorId) {
        self.doc.set_actor(actor.to_engine());
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.set_actor(actor);
        self
    }

    /// Changes not contained in the history of `heads`, in log order.
    pub fn changes_since(&self, heads: &Frontier) -> Result<Vec<&Change>, EngineError> {
        self.check(heads)?;
        let mut positions: Vec<usize> = self
            .doc
            .get_changes(&heads.to_engine())
            .into_iter()
            .filter_map(|change| self.index.get(&ChangeHash::from(change.hash())).copied())
            .collect();
        positions.sort_unstable();
        Ok(positions.into_iter().map(|i| &self.log[i]).collect())
    }

    /// Text of the object at `path` as of `frontier`.
    pub fn text_at(&self, path: &[Prop], frontier: &Frontier) -> Result<Option<String>, EngineError> {
        self.check(frontier)?;
        let heads = frontier.to_engine();
        let reader = Reader::at(&self.doc, &heads);
        match reader.follow(path)? {
            Some(obj) => reader.text(&obj).map(Some),
            None => Ok(None),
        }
    }

    /// Appends the engine history this log has not seen yet. The engine
    /// only ever appends to its history, so the new entries are its tail.
    fn sync_log(&mut self) {
        let fresh: Vec<Change> = self
            .doc
            .get_changes(&[])
            .into_iter()
            .skip(self.log.len())
            .map(Change::from_engine)
            .collect();
        for change in fresh {
            self.index.insert(change.hash(), self.log.len());
            self.log.push(change);
        }
    }

    fn check(&self, frontier: &Frontier) -> Result<(), EngineError> {
        match frontier.iter().find(|hash| !self.index.contains_key(hash)) {
            Some(unknown) => Err(EngineError::UnknownHash(*unknown)),
            None => Ok(()),
        }
    }
}

impl Replica for Document {
    fn url(&self) -> &DocUrl {
        &self.url
    }

    fn heads(&self) -> Frontier {
        self.doc.get_heads().into_iter().map(ChangeHash::from).collect()
    }

    fn changes(&self) -> &[Change] {
        &self.log
    }

    fn get_change(&self, hash: &ChangeHash) -> Option<&Change> {
        self.index.get(hash).map(|&i| &self.log[i])
    }

    fn diff(&self, from: &Frontier, to: &Frontier) -> Result<Vec<Patch>, EngineError> {
        self.check(from)?;
        self.check(to)?;
        if from == to {
            return Ok(Vec::new());
        }
        let patches = self.doc.diff(
            &from.to_engine(),
            &to.to_engine(),
            TextRepresentation::String(TextEncoding::UnicodeCodePoint),
        );
        Ok(patches.into_iter().filter_map(Patch::from_engine).collect())
    }

    fn view(&self) -> Value {
        Reader::current(&self.doc)
            .json(&ObjId::ROOT)
            .unwrap_or_else(|_| Value::Object(Default::default()))
    }

    fn view_at(&self, frontier: &Frontier) -> Result<Value, EngineError> {
        self.check(frontier)?;
        let heads = frontier.to_engine();
        Reader::at(&self.doc, &heads).json(&ObjId::ROOT)
    }

    fn object_at(&self, path: &[Prop]) -> Option<ObjId> {
        Reader::current(&self.doc).follow(path).ok().flatten()
    }

    fn merge(&mut self, other: &Self) -> Result<Vec<ChangeHash>, EngineError> {
        let before = self.log.len();
        self.doc.merge(&mut other.doc.clone())?;
        self.sync_log();
        let added: Vec<ChangeHash> = self.log[before..].iter().map(Change::hash).collect();
        if !added.is_empty() {
            debug!(
                into = %self.url,
                from = %other.url,
                changes = added.len(),
                "merged replica"
            );
        }
        Ok(added)
    }

    fn fork(&self, url: DocUrl) -> Self {
        let mut doc = self.clone();
        doc.url = url;
        doc.set_actor(ActorId::random());
        debug!(from = %self.url, to = %doc.url, "forked replica");
        doc
    }

    fn fork_at(&self, frontier: &Frontier, url: DocUrl) -> Result<Self, EngineError> {
        self.check(frontier)?;
        let engine = self
            .doc
            .fork_at(&frontier.to_engine())?
            .with_actor(ActorId::random().to_engine());
        let doc = Document::from_engine(url, engine);
        debug!(from = %self.url, to = %doc.url, at = %frontier, "forked replica");
        Ok(doc)
    }

    fn mutate<R>(
        &mut self,
        message: Option<&str>,
        f: impl FnOnce(&mut dyn Transact) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let time = Utc::now().timestamp_millis();
        let outcome = self.doc.transact_with(
            |_| {
                let options = CommitOptions::default().with_time(time);
                match message {
                    Some(message) => options.with_message(message),
                    None => options,
                }
            },
            |tx| f(&mut Tx(tx)),
        );
        match outcome {
            Ok(success) => {
                self.sync_log();
                Ok(success.result)
            }
            Err(failure) => Err(failure.error),
        }
    }
}
