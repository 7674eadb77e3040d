//! Layergroup tokens.

use crate::hash::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a cached configuration.
///
/// Always the lowercase hex form of the configuration's [`Fingerprint`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LayergroupToken(String);

impl LayergroupToken {
    /// Token addressing the configuration with this fingerprint.
    pub fn from_fingerprint(fingerprint: &Fingerprint) -> Self {
        Self(fingerprint.to_hex())
    }

    /// Parse a token from a request path segment.
    ///
    /// Only 64 lowercase hex characters are accepted.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let well_formed = s.len() == 64
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(crate::Error::InvalidToken(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Fingerprint> for LayergroupToken {
    fn from(fingerprint: Fingerprint) -> Self {
        Self::from_fingerprint(&fingerprint)
    }
}

impl TryFrom<String> for LayergroupToken {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<LayergroupToken> for String {
    fn from(token: LayergroupToken) -> Self {
        token.0
    }
}

impl fmt::Debug for LayergroupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayergroupToken({})", &self.0[..16])
    }
}

impl fmt::Display for LayergroupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
