//! ipa-schemes core library: Rust backend for the iOS URL scheme collector.
//!
//! Extracts bundle metadata and registered URL schemes from `.ipa` archives,
//! reconciles record datasets produced by independent runs, and maintains the
//! scheme → store item id reverse index. With the `python` feature the crate
//! is also built as the `_ipa_schemes_core` extension module via PyO3, a
//! drop-in replacement for the loops in the collector and merge scripts.

pub mod config;
pub mod errors;
pub mod extractor;
pub mod merge;
pub mod models;
pub mod store;

#[cfg(feature = "python")]
pub mod python;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ExtractorConfig;
pub use errors::{ExtractionErrors, SchemeError, SchemeResult};
pub use extractor::bundle::{extract, Extraction, Extractor};
pub use extractor::pipeline::{process_archives, process_archives_parallel, BatchReport};
pub use merge::reconcile::{reconcile, MergeOutcome};
pub use merge::scheme_index::{index_from_records, merge_indices};
pub use models::{AppRecord, Inconsistency, SchemeIndex};
