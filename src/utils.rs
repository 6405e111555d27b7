use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamps are stored as RFC3339 TEXT.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Role names compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lets a `#[serde(default)]` `Option` field tell "absent" from "null":
/// a present field always deserializes to `Some`, even when it is null.
pub fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
