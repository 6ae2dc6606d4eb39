//! API endpoint modules.

mod acl;
mod snippet;
mod version;

pub use acl::{AclApi, AclEntryInfo, AclInfo, EntryOperation, MAX_BATCH_OPERATIONS};
pub use snippet::{SnippetApi, SnippetInfo};
pub use version::{VersionApi, VersionInfo};

/// Serde helpers for Fastly's loosely typed JSON
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    /// Accept `"3"` as well as `3`
    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        })
    }

    /// Accept `"24"`, `24` or `null`
    pub fn optional_prefix<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => Ok(None),
            Some(StringOrNumber::Number(n)) => u8::try_from(n)
                .map(Some)
                .map_err(serde::de::Error::custom),
            Some(StringOrNumber::String(s)) if s.is_empty() => Ok(None),
            Some(StringOrNumber::String(s)) => {
                s.parse::<u8>().map(Some).map_err(serde::de::Error::custom)
            }
        }
    }
}
