//! Store-generated document identifiers.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind an identifier.
const ID_BYTES: usize = 12;
/// Length of the hexadecimal form of an identifier.
pub const ID_LENGTH: usize = ID_BYTES * 2;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identifier must be {ID_LENGTH} characters long, got {0}")]
    Length(usize),
    #[error("identifier must be lowercase hexadecimal")]
    Alphabet,
}

/// Value object of a valid document identifier.
///
/// Identifiers are 24 lowercase hexadecimal characters, generated by the
/// application when a document is inserted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id(String);

/// Identifier of a [`crate::user::User`].
pub type UserId = Id;
/// Identifier of a [`crate::post::Post`].
pub type PostId = Id;

impl Id {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Converts a string into a valid [`Id`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the string is not exactly 24 hexadecimal characters.
    pub fn parse(id: impl AsRef<str>) -> Result<Self, IdError> {
        let id = id.as_ref().trim();
        if id.len() != ID_LENGTH {
            return Err(IdError::Length(id.len()));
        }

        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdError::Alphabet);
        }

        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Returns the identifier as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Id {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl std::str::FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let a = Id::generate();
        let b = Id::generate();

        assert_eq!(a.as_str().len(), ID_LENGTH);
        assert_ne!(a, b);
        assert_eq!(Id::parse(a.as_str()), Ok(a));
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert_eq!(Id::parse("abc"), Err(IdError::Length(3)));
        assert_eq!(
            Id::parse("zzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(IdError::Alphabet)
        );
        assert_eq!(
            Id::parse("64B7F0C2A1D3E4F5A6B7C8D9").map(|id| id.to_string()),
            Ok("64b7f0c2a1d3e4f5a6b7c8d9".to_string())
        );
    }
}
