//! Secret payload types shared by the backend seam, the decoder and the cache.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A decoded field value.
///
/// Debug, Display and Serialize all print `[REDACTED]`; the only way to read
/// the value is [`SecretString::expose_secret`]. The buffer is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the plaintext. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Decoded payload of one secret: field name to value.
pub type FieldMap = HashMap<String, SecretString>;

/// A secret as the backend returns it, before decoding.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RawRecord {
    pub name: String,
    pub data: HashMap<String, Vec<u8>>,
}

impl RawRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), data: HashMap::new() }
    }

    /// Add a field with its raw bytes.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// Field bytes stay out of logs.
impl fmt::Debug for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.data.keys().collect();
        keys.sort();
        f.debug_struct("RawRecord").field("name", &self.name).field("fields", &keys).finish()
    }
}

/// A change notification from the backend's watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(RawRecord),
    Modified(RawRecord),
    Deleted(String),
}

impl ChangeEvent {
    /// Name of the secret the event refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::Added(record) | Self::Modified(record) => &record.name,
            Self::Deleted(name) => name,
        }
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}
