//! Shared typed models used across extraction, merging, and storage.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// Reverse index from URL scheme to the store item ids registering it.
pub type SchemeIndex = BTreeMap<String, BTreeSet<String>>;

// ---------------------------------------------------------------------------
// AppRecord
// ---------------------------------------------------------------------------

/// Canonical metadata for one application build.
///
/// Optional fields are omitted from serialized output when absent. Store item
/// ids written as JSON numbers by older collectors are accepted on load.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub bundle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_family: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_device_capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub url_schemes: BTreeSet<String>,
    #[serde(deserialize_with = "de_string_lenient")]
    pub item_id: String,
    pub name: String,
}

impl AppRecord {
    /// Deduplication and ordering key: `uppercase(bundle_id#version)`.
    ///
    /// Records without a version all collapse onto `BUNDLE#`.
    pub fn identity_key(&self) -> String {
        compose_key(&self.bundle_id, self.version.as_deref())
    }

    /// `uppercase(item_id#version)`; only used for dataset statistics.
    pub fn catalog_key(&self) -> String {
        compose_key(&self.item_id, self.version.as_deref())
    }

    pub fn has_schemes(&self) -> bool {
        !self.url_schemes.is_empty()
    }
}

/// Uppercases with single-character mappings only. Characters whose
/// uppercase form expands (`ß` -> `SS`) are kept unchanged.
fn compose_key(primary: &str, version: Option<&str>) -> String {
    format!("{}#{}", primary, version.unwrap_or_default())
        .chars()
        .map(simple_uppercase)
        .collect()
}

fn simple_uppercase(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

/// Stable sort by identity key; equal keys keep their input order.
pub fn sort_by_identity(records: &mut [AppRecord]) {
    records.sort_by_cached_key(AppRecord::identity_key);
}

// ---------------------------------------------------------------------------
// Inconsistency
// ---------------------------------------------------------------------------

/// A field that differs between the canonical record and a later record
/// sharing its identity key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Inconsistency {
    pub identity_key: String,
    pub field: &'static str,
    pub canonical: serde_json::Value,
    pub conflicting: serde_json::Value,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inconsistency: {} has different value for key {} ({} vs {})",
            self.identity_key, self.field, self.canonical, self.conflicting
        )
    }
}

// ---------------------------------------------------------------------------
// Lenient string deserialization
// ---------------------------------------------------------------------------

/// Accept a JSON string or integer, yielding its string form.
pub(crate) fn de_string_lenient<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientStringVisitor)
}

struct LenientStringVisitor;

impl Visitor<'_> for LenientStringVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

/// A string-or-integer value inside a list, used by scheme index files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LenientString(pub String);

impl<'de> Deserialize<'de> for LenientString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        de_string_lenient(deserializer).map(LenientString)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
