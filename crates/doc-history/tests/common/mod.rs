#![allow(dead_code)]

use causal_doc::{ActorId, DocUrl, Document, EngineError, ObjId, ObjKind, Replica};

/// A markdown document with `text` as its content and branch metadata
/// initialized.
pub fn markdown(actor: u64, text: &str) -> Document {
    let mut doc = Document::with_url(DocUrl::generate(), ActorId(actor));
    doc.mutate(Some("create"), |tx| {
        let content = tx.put_object(&ObjId::ROOT, "content", ObjKind::Text)?;
        tx.splice_text(&content, 0, 0, text)
    })
    .expect("create must succeed");
    doc_history::branch::init_branch_metadata(&mut doc).expect("init must succeed");
    doc
}

pub fn set_content(doc: &mut impl Replica, text: &str) {
    doc.mutate(None, |tx| {
        let content = tx
            .get_object(&ObjId::ROOT, "content")?
            .ok_or(EngineError::ObjectNotFound(ObjId::ROOT))?;
        tx.update_text(&content, text)
    })
    .expect("edit must succeed");
}

pub fn splice(doc: &mut impl Replica, pos: usize, del: usize, text: &str) {
    doc.mutate(None, |tx| {
        let content = tx
            .get_object(&ObjId::ROOT, "content")?
            .ok_or(EngineError::ObjectNotFound(ObjId::ROOT))?;
        tx.splice_text(&content, pos, del, text)
    })
    .expect("splice must succeed");
}

pub fn content(doc: &impl Replica) -> String {
    doc.view()["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
