//! PyO3 bindings exposing the pipeline to the Python collector scripts.
//!
//! Records cross the boundary as plain dicts with the same keys as the JSON
//! datasets, so existing scripts can swap their own loops for these calls.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::config::ExtractorConfig;
use crate::extractor::bundle::extract;
use crate::extractor::pipeline::{process_archives, process_archives_parallel};
use crate::merge::reconcile::reconcile;
use crate::merge::scheme_index::merge_indices;
use crate::models::{AppRecord, Inconsistency, SchemeIndex};
use crate::store::dataset::{
    load_mappings, load_records, write_records_file, write_scheme_index_file,
};

fn record_to_pydict<'py>(py: Python<'py>, record: &AppRecord) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("bundle_id", &record.bundle_id)?;
    dict.set_item("item_id", &record.item_id)?;
    dict.set_item("name", &record.name)?;
    dict.set_item(
        "url_schemes",
        record.url_schemes.iter().cloned().collect::<Vec<_>>(),
    )?;
    let optional = [
        ("version", &record.version),
        ("short_version", &record.short_version),
        ("display_name", &record.display_name),
        ("executable_name", &record.executable_name),
        ("platform_version", &record.platform_version),
        ("minimum_os_version", &record.minimum_os_version),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            dict.set_item(key, value)?;
        }
    }
    if let Some(family) = &record.device_family {
        dict.set_item("device_family", family.clone())?;
    }
    if let Some(capabilities) = &record.required_device_capabilities {
        dict.set_item("required_device_capabilities", capabilities.clone())?;
    }
    Ok(dict)
}

fn records_to_pylist<'py>(py: Python<'py>, records: &[AppRecord]) -> PyResult<Bound<'py, PyList>> {
    let list = PyList::empty(py);
    for record in records {
        list.append(record_to_pydict(py, record)?)?;
    }
    Ok(list)
}

fn inconsistency_to_pydict<'py>(
    py: Python<'py>,
    inconsistency: &Inconsistency,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("identity_key", &inconsistency.identity_key)?;
    dict.set_item("field", inconsistency.field)?;
    dict.set_item("canonical", inconsistency.canonical.to_string())?;
    dict.set_item("conflicting", inconsistency.conflicting.to_string())?;
    Ok(dict)
}

fn index_to_pydict<'py>(py: Python<'py>, index: &SchemeIndex) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (scheme, ids) in index {
        dict.set_item(scheme, ids.iter().cloned().collect::<Vec<_>>())?;
    }
    Ok(dict)
}

/// Extract one archive. Returns `(record_or_None, [error, ...])`.
#[pyfunction]
pub fn extract_archive(py: Python<'_>, path: PathBuf) -> PyResult<(PyObject, Vec<String>)> {
    match extract(&path, &ExtractorConfig::from_env()) {
        Ok(record) => Ok((record_to_pydict(py, &record)?.into_any().unbind(), Vec::new())),
        Err(errors) => Ok((
            py.None(),
            errors.errors().iter().map(ToString::to_string).collect(),
        )),
    }
}

/// Run a batch and return the sorted records; optionally write them to
/// `output` as JSON.
#[pyfunction]
#[pyo3(signature = (paths, output=None, parallel=true))]
pub fn process_ipas(
    py: Python<'_>,
    paths: Vec<PathBuf>,
    output: Option<PathBuf>,
    parallel: bool,
) -> PyResult<PyObject> {
    let config = ExtractorConfig::from_env();
    let report = py.allow_threads(|| {
        if parallel {
            process_archives_parallel(&paths, &config)
        } else {
            process_archives(&paths, &config)
        }
    });
    if let Some(output) = output {
        write_records_file(&output, &report.records)?;
    }
    Ok(records_to_pylist(py, &report.records)?.into_any().unbind())
}

/// Merge record-list files. Returns `(records, inconsistencies)`.
#[pyfunction]
#[pyo3(signature = (paths, output=None))]
pub fn merge_bundle_files(
    py: Python<'_>,
    paths: Vec<PathBuf>,
    output: Option<PathBuf>,
) -> PyResult<(PyObject, PyObject)> {
    let datasets = paths
        .iter()
        .map(|p| load_records(p))
        .collect::<Result<Vec<_>, _>>()?;
    let outcome = reconcile(&datasets);
    if let Some(output) = output {
        write_records_file(&output, &outcome.records)?;
    }

    let inconsistencies = PyList::empty(py);
    for inconsistency in &outcome.inconsistencies {
        inconsistencies.append(inconsistency_to_pydict(py, inconsistency)?)?;
    }
    Ok((
        records_to_pylist(py, &outcome.records)?.into_any().unbind(),
        inconsistencies.into_any().unbind(),
    ))
}

/// Merge scheme-index or record-list files into one scheme index.
#[pyfunction]
#[pyo3(signature = (paths, output=None))]
pub fn merge_scheme_files(
    py: Python<'_>,
    paths: Vec<PathBuf>,
    output: Option<PathBuf>,
) -> PyResult<PyObject> {
    let indices = paths
        .iter()
        .map(|p| load_mappings(p))
        .collect::<Result<Vec<_>, _>>()?;
    let merged = merge_indices(&indices);
    if let Some(output) = output {
        write_scheme_index_file(&output, &merged)?;
    }
    Ok(index_to_pydict(py, &merged)?.into_any().unbind())
}

#[pymodule]
fn _ipa_schemes_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("MAX_DESCRIPTOR_BYTES", crate::config::MAX_DESCRIPTOR_BYTES)?;
    m.add_function(wrap_pyfunction!(extract_archive, m)?)?;
    m.add_function(wrap_pyfunction!(process_ipas, m)?)?;
    m.add_function(wrap_pyfunction!(merge_bundle_files, m)?)?;
    m.add_function(wrap_pyfunction!(merge_scheme_files, m)?)?;
    Ok(())
}
