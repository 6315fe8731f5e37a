//! Merging record datasets produced by independent extraction runs.
//!
//! Records are grouped by identity key. The first record seen for a key is
//! canonical and every later record with the same key is only compared
//! against it. First-seen is an arbitrary tie-break kept for compatibility
//! with previously merged datasets: re-merging the same dataset is stable, but
//! the winner between genuinely conflicting sources depends on input order.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::errors::SchemeError;
use crate::merge::stats::DatasetStats;
use crate::models::{sort_by_identity, AppRecord, Inconsistency};

/// Result of a merge: one canonical record per identity key, plus every
/// field-level disagreement that was observed along the way.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub records: Vec<AppRecord>,
    pub inconsistencies: Vec<Inconsistency>,
}

/// Merge datasets in the order given.
pub fn reconcile<D: AsRef<[AppRecord]>>(datasets: &[D]) -> MergeOutcome {
    tracing::info!(datasets = datasets.len(), "merging bundle lists");

    let mut canonical: IndexMap<String, AppRecord> = IndexMap::new();
    let mut inconsistencies = Vec::new();

    for record in datasets.iter().flat_map(|d| d.as_ref().iter()) {
        if !record.has_schemes() {
            tracing::debug!(bundle_id = %record.bundle_id, "dropping record without URL schemes");
            continue;
        }
        match canonical.entry(record.identity_key()) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
            Entry::Occupied(slot) => {
                let found = compare_records(slot.key(), slot.get(), record);
                for inconsistency in &found {
                    tracing::warn!(
                        canonical = %inconsistency.canonical,
                        conflicting = %inconsistency.conflicting,
                        "{}",
                        SchemeError::from(inconsistency)
                    );
                }
                inconsistencies.extend(found);
            }
        }
    }

    let mut records: Vec<AppRecord> = canonical.into_values().collect();
    sort_by_identity(&mut records);

    let stats = DatasetStats::of_records(&records);
    tracing::info!(
        schemes = stats.schemes,
        apps = stats.apps,
        bundles = stats.bundles,
        inconsistencies = inconsistencies.len(),
        "merge complete"
    );

    MergeOutcome {
        records,
        inconsistencies,
    }
}

/// Every field of `candidate` that differs from `canonical`.
pub fn compare_records(
    identity_key: &str,
    canonical: &AppRecord,
    candidate: &AppRecord,
) -> Vec<Inconsistency> {
    let fields: [(&'static str, Value, Value); 12] = [
        ("bundle_id", json!(canonical.bundle_id), json!(candidate.bundle_id)),
        ("name", json!(canonical.name), json!(candidate.name)),
        ("url_schemes", json!(canonical.url_schemes), json!(candidate.url_schemes)),
        ("item_id", json!(canonical.item_id), json!(candidate.item_id)),
        ("version", json!(canonical.version), json!(candidate.version)),
        (
            "short_version",
            json!(canonical.short_version),
            json!(candidate.short_version),
        ),
        (
            "display_name",
            json!(canonical.display_name),
            json!(candidate.display_name),
        ),
        (
            "executable_name",
            json!(canonical.executable_name),
            json!(candidate.executable_name),
        ),
        (
            "platform_version",
            json!(canonical.platform_version),
            json!(candidate.platform_version),
        ),
        (
            "minimum_os_version",
            json!(canonical.minimum_os_version),
            json!(candidate.minimum_os_version),
        ),
        (
            "device_family",
            json!(canonical.device_family),
            json!(candidate.device_family),
        ),
        (
            "required_device_capabilities",
            json!(canonical.required_device_capabilities),
            json!(candidate.required_device_capabilities),
        ),
    ];

    fields
        .into_iter()
        .filter(|(_, a, b)| a != b)
        .map(|(field, canonical, conflicting)| Inconsistency {
            identity_key: identity_key.to_string(),
            field,
            canonical,
            conflicting,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(bundle_id: &str, version: Option<&str>, item_id: &str, name: &str, schemes: &[&str]) -> AppRecord {
        AppRecord {
            bundle_id: bundle_id.to_string(),
            version: version.map(str::to_string),
            item_id: item_id.to_string(),
            name: name.to_string(),
            url_schemes: schemes.iter().map(|s| s.to_string()).collect(),
            ..AppRecord::default()
        }
    }

    fn dataset() -> Vec<AppRecord> {
        vec![
            record("com.b.app", Some("1"), "2", "B", &["bee"]),
            record("com.a.app", Some("1"), "1", "A", &["aye", "a2"]),
            record("com.a.app", Some("2"), "1", "A", &["aye"]),
        ]
    }

    #[test]
    fn test_merge_single_dataset_sorts() {
        let outcome = reconcile(&[dataset()]);
        let keys: Vec<String> = outcome.records.iter().map(AppRecord::identity_key).collect();
        assert_eq!(keys, vec!["COM.A.APP#1", "COM.A.APP#2", "COM.B.APP#1"]);
        assert!(outcome.inconsistencies.is_empty());
    }

    #[test]
    fn test_merge_with_self_is_idempotent() {
        let once = reconcile(&[dataset()]);
        let thrice = reconcile(&[dataset(), dataset(), dataset()]);
        assert_eq!(once.records, thrice.records);
        assert!(thrice.inconsistencies.is_empty());
    }

    #[test]
    fn test_conflicting_name_first_wins() {
        let first = vec![record("com.x", Some("1"), "9", "First", &["x"])];
        let second = vec![record("com.x", Some("1"), "9", "Second", &["x"])];

        let outcome = reconcile(&[first.clone(), second.clone()]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].name, "First");
        assert_eq!(outcome.inconsistencies.len(), 1);
        let found = &outcome.inconsistencies[0];
        assert_eq!(found.identity_key, "COM.X#1");
        assert_eq!(found.field, "name");
        assert_eq!(found.canonical, json!("First"));
        assert_eq!(found.conflicting, json!("Second"));

        // Order-sensitive for genuine conflicts.
        let reversed = reconcile(&[second, first]);
        assert_eq!(reversed.records[0].name, "Second");
        assert_eq!(reversed.inconsistencies[0].canonical, json!("Second"));
    }

    #[test]
    fn test_identical_duplicates_are_order_stable() {
        let a = vec![record("com.x", Some("1"), "9", "X", &["x"])];
        let b = vec![
            record("com.y", None, "8", "Y", &["y"]),
            record("com.x", Some("1"), "9", "X", &["x"]),
        ];
        let ab = reconcile(&[a.clone(), b.clone()]);
        let ba = reconcile(&[b, a]);
        assert_eq!(ab.records, ba.records);
        assert!(ab.inconsistencies.is_empty());
        assert!(ba.inconsistencies.is_empty());
    }

    #[test]
    fn test_key_is_case_insensitive_and_reports_each_field() {
        let first = vec![record("com.Case.app", Some("1.0a"), "1", "Case", &["one"])];
        let second = vec![record("COM.CASE.APP", Some("1.0A"), "1", "Case", &["one", "two"])];
        let outcome = reconcile(&[first, second]);
        assert_eq!(outcome.records.len(), 1);
        let fields: Vec<&str> = outcome.inconsistencies.iter().map(|i| i.field).collect();
        assert_eq!(fields, vec!["bundle_id", "url_schemes", "version"]);
    }

    #[test]
    fn test_missing_version_collapses_onto_one_key() {
        let outcome = reconcile(&[vec![
            record("com.nov", None, "1", "NoVersion", &["nv"]),
            record("com.nov", None, "2", "NoVersion", &["nv"]),
        ]]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].item_id, "1");
        assert_eq!(outcome.inconsistencies.len(), 1);
        assert_eq!(outcome.inconsistencies[0].field, "item_id");
    }

    #[test]
    fn test_records_without_schemes_are_dropped() {
        let outcome = reconcile(&[vec![
            record("com.empty", Some("1"), "1", "Empty", &[]),
            record("com.full", Some("1"), "2", "Full", &["full"]),
        ]]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].bundle_id, "com.full");
    }

    #[test]
    fn test_no_datasets() {
        let empty: Vec<Vec<AppRecord>> = Vec::new();
        let outcome = reconcile(&empty);
        assert!(outcome.records.is_empty());
        assert!(outcome.inconsistencies.is_empty());
    }
}
