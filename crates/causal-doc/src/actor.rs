//! Writer identities.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Stable identifier of a writer.
///
/// Stored in the engine as its eight big-endian bytes, so engine actors
/// produced here convert back losslessly. Foreign actors longer than eight
/// bytes are read by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Generates a random, non-zero actor identifier.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self(rng.gen_range(1..=u64::MAX))
    }

    /// Short printable form: the last four hex digits.
    pub fn short(&self) -> String {
        let full = self.to_string();
        full[full.len() - 4..].to_string()
    }

    pub(crate) fn from_engine(actor: &automerge::ActorId) -> Self {
        let bytes = actor.to_bytes();
        let mut out = [0u8; 8];
        let take = bytes.len().min(8);
        out[8 - take..].copy_from_slice(&bytes[..take]);
        Self(u64::from_be_bytes(out))
    }

    pub(crate) fn to_engine(self) -> automerge::ActorId {
        automerge::ActorId::from(self.0.to_be_bytes())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
