//! Summary counts for record datasets and scheme indices.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{AppRecord, SchemeIndex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    /// Distinct URL schemes.
    pub schemes: usize,
    /// Distinct store item ids.
    pub apps: usize,
    /// Distinct catalog keys (item id + version). Zero for scheme indices,
    /// which carry no version information.
    pub bundles: usize,
}

impl DatasetStats {
    pub fn of_records(records: &[AppRecord]) -> Self {
        let mut schemes = HashSet::new();
        let mut apps = HashSet::new();
        let mut bundles = HashSet::new();
        for record in records {
            schemes.extend(record.url_schemes.iter().map(String::as_str));
            apps.insert(record.item_id.as_str());
            bundles.insert(record.catalog_key());
        }
        Self {
            schemes: schemes.len(),
            apps: apps.len(),
            bundles: bundles.len(),
        }
    }

    pub fn of_index(index: &SchemeIndex) -> Self {
        let apps: HashSet<&str> = index.values().flatten().map(String::as_str).collect();
        Self {
            schemes: index.len(),
            apps: apps.len(),
            bundles: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(item_id: &str, version: &str, schemes: &[&str]) -> AppRecord {
        AppRecord {
            bundle_id: format!("com.app{item_id}"),
            version: Some(version.to_string()),
            item_id: item_id.to_string(),
            name: "App".to_string(),
            url_schemes: schemes.iter().map(|s| s.to_string()).collect(),
            ..AppRecord::default()
        }
    }

    #[test]
    fn test_record_stats_count_distinct_values() {
        let records = vec![
            record("1", "1.0", &["a", "b"]),
            record("1", "2.0", &["b"]),
            record("2", "1.0", &["c"]),
        ];
        assert_eq!(
            DatasetStats::of_records(&records),
            DatasetStats {
                schemes: 3,
                apps: 2,
                bundles: 3
            }
        );
    }

    #[test]
    fn test_index_stats() {
        let mut index = SchemeIndex::new();
        index.insert("a".into(), BTreeSet::from(["1".to_string(), "2".to_string()]));
        index.insert("b".into(), BTreeSet::from(["2".to_string()]));
        let stats = DatasetStats::of_index(&index);
        assert_eq!(stats.schemes, 2);
        assert_eq!(stats.apps, 2);
    }
}
