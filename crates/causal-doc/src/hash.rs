//! Content-derived change identifiers and frontiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::error::EngineError;

// ── ChangeHash ─────────────────────────────────────────────────────────────

/// Content hash identifying a [`Change`].
///
/// Serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChangeHash(pub [u8; 32]);

impl ChangeHash {
    /// First eight hex digits, for display in history listings.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeHash({})", self.short())
    }
}

impl FromStr for ChangeHash {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| EngineError::InvalidHash(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::InvalidHash(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for ChangeHash {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<automerge::ChangeHash> for ChangeHash {
    fn from(hash: automerge::ChangeHash) -> Self {
        Self(hash.0)
    }
}

impl From<ChangeHash> for automerge::ChangeHash {
    fn from(hash: ChangeHash) -> Self {
        automerge::ChangeHash(hash.0)
    }
}

impl From<ChangeHash> for String {
    fn from(hash: ChangeHash) -> Self {
        hash.to_string()
    }
}

// ── Frontier ───────────────────────────────────────────────────────────────

/// A set of change hashes naming a document version.
///
/// Kept sorted and de-duplicated, so two frontiers are equal exactly when
/// they name the same set of heads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ChangeHash>", into = "Vec<ChangeHash>")]
pub struct Frontier(Vec<ChangeHash>);

impl Frontier {
    /// The empty frontier: the version before any change.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn single(hash: ChangeHash) -> Self {
        Self(vec![hash])
    }

    pub fn new(hashes: impl IntoIterator<Item = ChangeHash>) -> Self {
        let mut hashes: Vec<ChangeHash> = hashes.into_iter().collect();
        hashes.sort_unstable();
        hashes.dedup();
        Self(hashes)
    }

    pub fn hashes(&self) -> &[ChangeHash] {
        &self.0
    }

    pub(crate) fn to_engine(&self) -> Vec<automerge::ChangeHash> {
        self.0.iter().copied().map(Into::into).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeHash> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, hash: &ChangeHash) -> bool {
        self.0.binary_search(hash).is_ok()
    }

    /// Returns the frontier after `change` is applied on top of this one:
    /// the change's dependencies stop being heads and the change becomes one.
    pub fn advance(&self, change: &Change) -> Frontier {
        Frontier::new(
            self.0
                .iter()
                .copied()
                .filter(|h| !change.deps().contains(h))
                .chain(std::iter::once(change.hash())),
        )
    }
}

impl From<Vec<ChangeHash>> for Frontier {
    fn from(hashes: Vec<ChangeHash>) -> Self {
        Frontier::new(hashes)
    }
}

impl From<Frontier> for Vec<ChangeHash> {
    fn from(frontier: Frontier) -> Self {
        frontier.0
    }
}

impl FromIterator<ChangeHash> for Frontier {
    fn from_iter<I: IntoIterator<Item = ChangeHash>>(iter: I) -> Self {
        Frontier::new(iter)
    }
}

impl fmt::Display for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, hash) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&hash.short())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> ChangeHash {
        ChangeHash([n; 32])
    }

    #[test]
    fn frontier_equality_ignores_order_and_duplicates() {
        let a = Frontier::new([h(1), h(2), h(1)]);
        let b = Frontier::new([h(2), h(1)]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn hash_hex_parses_back() {
        let hash = h(7);
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<ChangeHash>().unwrap(), hash);
        assert!("zz".parse::<ChangeHash>().is_err());
        assert!("abcd".parse::<ChangeHash>().is_err());
    }

    #[test]
    fn frontier_serializes_as_hex_list() {
        let frontier = Frontier::new([h(3)]);
        let json = serde_json::to_value(&frontier).unwrap();
        assert_eq!(json, serde_json::json!([h(3).to_string()]));
        let back: Frontier = serde_json::from_value(json).unwrap();
        assert_eq!(back, frontier);
    }
}
