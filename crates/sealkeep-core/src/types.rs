use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical wallet record as seen by callers (DIDs, signing keys, credentials).
///
/// The wallet maps one record onto one encrypted item row plus its
/// encrypted and plaintext tag rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(rename = "id")]
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl WalletRecord {
    pub fn new(record_type: impl Into<String>, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            value: value.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Serialize to the opaque byte form carried inside backup files.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| anyhow::anyhow!("record serialization: {e}"))
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("record deserialization: {e}"))
    }
}

/// Which tag index a tag name is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCategory {
    /// Opaque ciphertext, equality search only
    Encrypted,
    /// Cleartext, prefix and range search
    Plaintext,
}

/// Fixed mapping from tag name to tag category, shared by writer and reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagPolicy {
    /// Tag names starting with this prefix are stored in plaintext (default: "~")
    pub plaintext_prefix: String,
    /// Additional tag names stored in plaintext regardless of prefix
    pub plaintext_names: Vec<String>,
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            plaintext_prefix: "~".into(),
            plaintext_names: Vec::new(),
        }
    }
}

impl TagPolicy {
    pub fn category(&self, tag_name: &str) -> TagCategory {
        let by_prefix =
            !self.plaintext_prefix.is_empty() && tag_name.starts_with(&self.plaintext_prefix);
        if by_prefix || self.plaintext_names.iter().any(|n| n == tag_name) {
            TagCategory::Plaintext
        } else {
            TagCategory::Encrypted
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
