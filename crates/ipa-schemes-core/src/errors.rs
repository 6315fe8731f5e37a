//! Error types for the ipa-schemes core library.

use std::fmt;
use std::path::PathBuf;

use crate::extractor::locator::DescriptorRole;
use crate::models::Inconsistency;

/// Top-level error enum for the ipa-schemes core library.
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("not a valid archive [{}]: {reason}", .path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("{0} not found in archive")]
    DescriptorNotFound(DescriptorRole),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("{role} has no usable value for key {key}")]
    MissingField {
        role: DescriptorRole,
        key: &'static str,
    },

    #[error("inconsistency: {identity_key} has different value for key {field}")]
    InconsistentMerge {
        identity_key: String,
        field: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type SchemeResult<T> = Result<T, SchemeError>;

impl From<&Inconsistency> for SchemeError {
    fn from(found: &Inconsistency) -> Self {
        SchemeError::InconsistentMerge {
            identity_key: found.identity_key.clone(),
            field: found.field,
        }
    }
}

/// The errors collected while extracting one archive. Never empty.
#[derive(Debug)]
pub struct ExtractionErrors(Vec<SchemeError>);

impl ExtractionErrors {
    pub fn new(first: SchemeError, rest: impl IntoIterator<Item = SchemeError>) -> Self {
        let mut errors = vec![first];
        errors.extend(rest);
        Self(errors)
    }

    /// Wrap a collected error list; `None` when nothing was collected.
    pub fn from_vec(errors: Vec<SchemeError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    pub fn single(error: SchemeError) -> Self {
        Self(vec![error])
    }

    pub fn errors(&self) -> &[SchemeError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_vec(self) -> Vec<SchemeError> {
        self.0
    }
}

impl fmt::Display for ExtractionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExtractionErrors {}

#[cfg(feature = "python")]
impl From<SchemeError> for pyo3::PyErr {
    fn from(err: SchemeError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};

        match &err {
            SchemeError::Io(_) | SchemeError::InvalidArchive { .. } | SchemeError::Zip(_) => {
                PyIOError::new_err(err.to_string())
            }
            SchemeError::Sqlite(_) => PyRuntimeError::new_err(err.to_string()),
            SchemeError::DescriptorNotFound(_)
            | SchemeError::Decode(_)
            | SchemeError::MissingField { .. }
            | SchemeError::InconsistentMerge { .. }
            | SchemeError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}
