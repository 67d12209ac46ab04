//! SHA-1 object identity used throughout the object model.
use std::fmt;
use std::str::FromStr;

use crate::error::GitError;

/// A 20-byte SHA-1 object identity, as produced by `git`'s own hex output.
///
/// THE CORE never computes a hash from raw bytes itself; it only parses the
/// hex identities `git` already prints (`rev-parse`, `cat-file`, `ls-tree`,
/// blame headers, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The all-zero identity git itself uses to mean "no object" (e.g. the
    /// left side of an added file's diff header, or a deleted ref's old id).
    pub const EMPTY: ObjectId = ObjectId([0u8; 20]);

    /// Build an identity directly from raw bytes, bypassing hex parsing.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        ObjectId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl FromStr for ObjectId {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(GitError::InvalidObjectId(s.to_string()));
        }
        let decoded =
            hex::decode(s).map_err(|_| GitError::InvalidObjectId(s.to_string()))?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| GitError::InvalidObjectId(s.to_string()))?;
        Ok(ObjectId(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", hex::encode(self.0))
    }
}

impl PartialEq<str> for ObjectId {
    fn eq(&self, other: &str) -> bool {
        self.to_string().eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for ObjectId {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_hex() {
        let id: ObjectId = "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c".parse().unwrap();
        assert_eq!(id.to_string(), "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abc123".parse::<ObjectId>().is_err());
        assert!("2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2cff".parse::<ObjectId>().is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let s = "zz49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c";
        assert_eq!(s.len(), 40);
        assert!(s.parse::<ObjectId>().is_err());
    }

    #[test]
    fn empty_is_all_zero() {
        assert!(ObjectId::EMPTY.is_empty());
        assert_eq!(
            ObjectId::EMPTY.to_string(),
            "0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn equality_against_str() {
        let id: ObjectId = "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c".parse().unwrap();
        assert_eq!(id, "2c49687c7f9e1f5b9f6a2e6a4f3b1c8d9e0a1b2c");
    }
}
