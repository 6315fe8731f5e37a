//! Scheme → item id reverse index: derivation and set-union merging.

use std::borrow::Borrow;

use crate::merge::stats::DatasetStats;
use crate::models::{AppRecord, SchemeIndex};

/// Associate each record's item id with every scheme it registers.
pub fn index_from_records(records: &[AppRecord]) -> SchemeIndex {
    let mut index = SchemeIndex::new();
    for record in records {
        for scheme in &record.url_schemes {
            index
                .entry(scheme.clone())
                .or_default()
                .insert(record.item_id.clone());
        }
    }
    index
}

/// Per-scheme union of every input index.
pub fn merge_indices<I: Borrow<SchemeIndex>>(indices: &[I]) -> SchemeIndex {
    let mut merged = SchemeIndex::new();
    for index in indices {
        let index: &SchemeIndex = index.borrow();
        for (scheme, ids) in index {
            merged
                .entry(scheme.clone())
                .or_default()
                .extend(ids.iter().cloned());
        }
    }

    let stats = DatasetStats::of_index(&merged);
    tracing::info!(
        inputs = indices.len(),
        schemes = stats.schemes,
        apps = stats.apps,
        "merged scheme indices"
    );
    merged
}
