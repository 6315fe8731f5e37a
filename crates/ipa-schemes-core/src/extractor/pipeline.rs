//! Batch extraction over a list of archives, with an optional Rayon pool.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::ExtractorConfig;
use crate::errors::ExtractionErrors;
use crate::extractor::bundle::{Extraction, Extractor};
use crate::models::{sort_by_identity, AppRecord};

/// An archive that produced no record.
#[derive(Debug)]
pub struct ArchiveFailure {
    pub path: PathBuf,
    pub errors: ExtractionErrors,
}

/// Output of one extraction run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records with at least one URL scheme, sorted by identity key.
    pub records: Vec<AppRecord>,
    pub failures: Vec<ArchiveFailure>,
    /// Archives that extracted cleanly but register no URL schemes.
    pub without_schemes: Vec<PathBuf>,
    pub elapsed_ms: i64,
}

impl BatchReport {
    pub fn archives_seen(&self) -> usize {
        self.records.len() + self.failures.len() + self.without_schemes.len()
    }
}

/// Extract every archive in input order on the calling thread.
pub fn process_archives<P: AsRef<Path>>(paths: &[P], config: &ExtractorConfig) -> BatchReport {
    let started = Instant::now();
    let extractor = Extractor::new(config.clone());
    let results: Vec<(PathBuf, Extraction)> = paths
        .iter()
        .map(|p| (p.as_ref().to_path_buf(), extractor.extract(p.as_ref())))
        .collect();
    assemble(results, started)
}

/// Extract archives on a pool of `config.workers` threads.
///
/// Each worker returns its own result; they are concatenated in input order
/// and then filtered and sorted exactly as in [`process_archives`], so the
/// output is identical to the sequential form.
pub fn process_archives_parallel<P: AsRef<Path> + Sync>(
    paths: &[P],
    config: &ExtractorConfig,
) -> BatchReport {
    if paths.is_empty() {
        return BatchReport::default();
    }

    let started = Instant::now();
    let extractor = Extractor::new(config.clone());
    let extract_one = |p: &P| (p.as_ref().to_path_buf(), extractor.extract(p.as_ref()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(extractor.config().workers.max(1))
        .build();

    let results: Vec<(PathBuf, Extraction)> = match pool {
        Ok(pool) => pool.install(|| paths.par_iter().map(extract_one).collect()),
        Err(e) => {
            tracing::warn!(error = %e, "thread pool unavailable, extracting sequentially");
            paths.iter().map(extract_one).collect()
        }
    };
    assemble(results, started)
}

fn assemble(results: Vec<(PathBuf, Extraction)>, started: Instant) -> BatchReport {
    let mut report = BatchReport::default();

    for (path, extraction) in results {
        match extraction {
            Ok(record) if record.has_schemes() => report.records.push(record),
            Ok(record) => {
                tracing::debug!(
                    archive = %path.display(),
                    bundle_id = %record.bundle_id,
                    "no URL schemes registered, skipping"
                );
                report.without_schemes.push(path);
            }
            Err(errors) => {
                tracing::warn!(archive = %path.display(), errors = %errors, "skipping archive");
                report.failures.push(ArchiveFailure { path, errors });
            }
        }
    }

    sort_by_identity(&mut report.records);
    report.elapsed_ms = started.elapsed().as_millis() as i64;

    tracing::info!(
        archives = report.archives_seen(),
        records = report.records.len(),
        failures = report.failures.len(),
        without_schemes = report.without_schemes.len(),
        elapsed_ms = report.elapsed_ms,
        "extraction run complete"
    );
    report
}
