//! Document URLs.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

const SCHEME: &str = "doc:";

/// Address of a replicated document: `doc:` followed by 16 random bytes in
/// unpadded base64url.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocUrl(String);

impl DocUrl {
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("{SCHEME}{}", URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocUrl {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| EngineError::InvalidUrl(s.to_string()))?;
        match URL_SAFE_NO_PAD.decode(id) {
            Ok(bytes) if bytes.len() == 16 => Ok(Self(s.to_string())),
            _ => Err(EngineError::InvalidUrl(s.to_string())),
        }
    }
}

impl TryFrom<String> for DocUrl {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocUrl> for String {
    fn from(url: DocUrl) -> Self {
        url.0
    }
}

impl fmt::Display for DocUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
