//! JSON dataset files: per-run record lists and scheme indices.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Deserialize;

use crate::errors::SchemeResult;
use crate::merge::scheme_index::index_from_records;
use crate::merge::stats::DatasetStats;
use crate::models::{AppRecord, LenientString, SchemeIndex};

/// Either persisted format, as found on disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingsFile {
    Index(BTreeMap<String, Vec<LenientString>>),
    Records(Vec<AppRecord>),
}

/// Load a record-list dataset.
pub fn load_records(path: &Path) -> SchemeResult<Vec<AppRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let records: Vec<AppRecord> = serde_json::from_reader(reader)?;

    let stats = DatasetStats::of_records(&records);
    tracing::info!(
        path = %path.display(),
        schemes = stats.schemes,
        apps = stats.apps,
        bundles = stats.bundles,
        "loaded bundle list"
    );
    Ok(records)
}

/// Load a scheme index, deriving one when the file holds a record list.
pub fn load_mappings(path: &Path) -> SchemeResult<SchemeIndex> {
    let reader = BufReader::new(File::open(path)?);
    let index = match serde_json::from_reader(reader)? {
        MappingsFile::Index(raw) => raw
            .into_iter()
            .map(|(scheme, ids)| (scheme, ids.into_iter().map(|id| id.0).collect::<BTreeSet<_>>()))
            .collect(),
        MappingsFile::Records(records) => index_from_records(&records),
    };
    tracing::debug!(path = %path.display(), schemes = index.len(), "loaded scheme mappings");
    Ok(index)
}

/// Write records as a JSON array with sorted keys and two-space indent.
pub fn write_records<W: Write>(mut writer: W, records: &[AppRecord]) -> SchemeResult<()> {
    // Round-tripping through `Value` sorts object keys.
    let value = serde_json::to_value(records)?;
    serde_json::to_writer_pretty(&mut writer, &value)?;
    writer.flush()?;
    Ok(())
}

pub fn write_records_file(path: &Path, records: &[AppRecord]) -> SchemeResult<()> {
    write_records(BufWriter::new(File::create(path)?), records)
}

/// Render an index as sorted JSON with one scheme per line:
///
/// ```text
/// {
/// "myapp": ["1", "2"],
///  "other": ["3"]
/// }
/// ```
pub fn render_scheme_index(index: &SchemeIndex) -> SchemeResult<String> {
    let mut lines = Vec::with_capacity(index.len());
    for (scheme, ids) in index {
        let ids = ids
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        lines.push(format!("{}: [{}]", serde_json::to_string(scheme)?, ids.join(", ")));
    }
    Ok(format!("{{\n{}\n}}", lines.join(",\n ")))
}

pub fn write_scheme_index_file(path: &Path, index: &SchemeIndex) -> SchemeResult<()> {
    std::fs::write(path, render_scheme_index(index)?)?;
    Ok(())
}
