//! Record decoding.
//!
//! Converts a backend's raw field bytes into the string values the cache
//! serves. The contract is explicit and chosen once per process:
//!
//! - [`DecodePolicy::Utf8`] (default): the bytes are the value and must be
//!   valid UTF-8. Use this for backends whose client already strips any
//!   transport encoding.
//! - [`DecodePolicy::Base64`]: the bytes are standard base64 text; the decoded
//!   bytes must be valid UTF-8.
//!
//! One bad field fails the whole record, so a partial field map never reaches
//! the cache.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, SecretsError};
use super::types::{FieldMap, RawRecord, SecretString};

/// How raw field bytes are turned into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    #[default]
    Utf8,
    Base64,
}

impl DecodePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Base64 => "base64",
        }
    }
}

impl FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "raw" => Ok(Self::Utf8),
            "base64" => Ok(Self::Base64),
            other => Err(format!("Unknown decode policy: {}", other)),
        }
    }
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stateless decoder applying one [`DecodePolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordDecoder {
    policy: DecodePolicy,
}

impl RecordDecoder {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Decode every field of `record`, failing on the first bad one.
    pub fn decode(&self, record: &RawRecord) -> Result<FieldMap> {
        let mut fields = FieldMap::with_capacity(record.data.len());
        for (key, raw) in &record.data {
            let value = self.decode_field(key, raw)?;
            fields.insert(key.clone(), value);
        }
        Ok(fields)
    }

    fn decode_field(&self, key: &str, raw: &[u8]) -> Result<SecretString> {
        let bytes = match self.policy {
            DecodePolicy::Utf8 => raw.to_vec(),
            DecodePolicy::Base64 => STANDARD
                .decode(raw)
                .map_err(|e| SecretsError::decode(key, format!("invalid base64: {}", e)))?,
        };

        String::from_utf8(bytes)
            .map(SecretString::new)
            .map_err(|e| SecretsError::decode(key, format!("invalid UTF-8: {}", e.utf8_error())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_policy_passes_bytes_through() {
        let record = RawRecord::new("db").with_field("username", "alice");
        let fields = RecordDecoder::default().decode(&record).unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["username"].expose_secret(), "alice");
    }

    #[test]
    fn test_base64_policy_decodes_transport_encoding() {
        let record = RawRecord::new("db")
            .with_field("username", "YWxpY2U=")
            .with_field("password", "aHVudGVyMg==");
        let fields = RecordDecoder::new(DecodePolicy::Base64).decode(&record).unwrap();

        assert_eq!(fields["username"].expose_secret(), "alice");
        assert_eq!(fields["password"].expose_secret(), "hunter2");
    }

    #[test]
    fn test_single_bad_field_fails_record() {
        let record = RawRecord::new("db")
            .with_field("username", "YWxpY2U=")
            .with_field("password", "***not base64***");
        let err = RecordDecoder::new(DecodePolicy::Base64).decode(&record).unwrap_err();

        match err {
            SecretsError::Decode { field, reason } => {
                assert_eq!(field, "password");
                assert!(reason.contains("base64"));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let record = RawRecord::new("db").with_field("blob", vec![0xff, 0xfe, 0x00]);
        let err = RecordDecoder::default().decode(&record).unwrap_err();
        assert!(matches!(err, SecretsError::Decode { ref field, .. } if field == "blob"));

        // "//4A" is base64 for the same invalid bytes
        let record = RawRecord::new("db").with_field("blob", "//4A");
        let err = RecordDecoder::new(DecodePolicy::Base64).decode(&record).unwrap_err();
        assert!(matches!(err, SecretsError::Decode { ref reason, .. } if reason.contains("UTF-8")));
    }

    #[test]
    fn test_empty_record_decodes_to_empty_map() {
        let fields = RecordDecoder::default().decode(&RawRecord::new("empty")).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("utf8".parse::<DecodePolicy>().unwrap(), DecodePolicy::Utf8);
        assert_eq!("RAW".parse::<DecodePolicy>().unwrap(), DecodePolicy::Utf8);
        assert_eq!(" base64 ".parse::<DecodePolicy>().unwrap(), DecodePolicy::Base64);
        assert!("hex".parse::<DecodePolicy>().is_err());
        assert_eq!(DecodePolicy::Base64.to_string(), "base64");
        assert_eq!(serde_json::to_string(&DecodePolicy::Utf8).unwrap(), "\"utf8\"");
    }
}
