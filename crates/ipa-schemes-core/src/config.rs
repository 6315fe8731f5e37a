//! Environment-driven settings and guard limits for extraction runs.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::extractor::decoder::{NativeConverter, PlistConverter, PlutilConverter};

/// Largest descriptor entry we are willing to decompress.
pub const MAX_DESCRIPTOR_BYTES: u64 = 16 * 1024 * 1024;

/// Archives listing more entries than this are treated as invalid.
pub const MAX_ARCHIVE_ENTRIES: usize = 1_000_000;

pub const DEFAULT_CONVERT_TIMEOUT_MS: u64 = 30_000;

const ENV_CONVERTER: &str = "IPA_SCHEMES_CONVERTER";
const ENV_PLUTIL: &str = "IPA_SCHEMES_PLUTIL";
const ENV_CONVERT_TIMEOUT_MS: &str = "IPA_SCHEMES_CONVERT_TIMEOUT_MS";
const ENV_WORKERS: &str = "IPA_SCHEMES_WORKERS";
const ENV_TMPDIR: &str = "IPA_SCHEMES_TMPDIR";

/// Which binary-to-XML conversion backend the decoder uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConverterKind {
    /// Rewrite in-process with the `plist` crate.
    Native,
    /// Shell out to `plutil`.
    Plutil,
}

impl ConverterKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "native" | "builtin" => Some(Self::Native),
            "plutil" | "external" => Some(Self::Plutil),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub converter: ConverterKind,
    pub plutil_program: PathBuf,
    pub convert_timeout: Duration,
    pub workers: usize,
    pub temp_root: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            converter: ConverterKind::Native,
            plutil_program: PathBuf::from("plutil"),
            convert_timeout: Duration::from_millis(DEFAULT_CONVERT_TIMEOUT_MS),
            workers: default_workers(),
            temp_root: None,
        }
    }
}

impl ExtractorConfig {
    /// Build a config from `IPA_SCHEMES_*` variables. Unset or unparseable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CONVERTER) {
            match ConverterKind::parse(&raw) {
                Some(kind) => config.converter = kind,
                None => ignored(ENV_CONVERTER, &raw),
            }
        }
        if let Some(program) = lookup(ENV_PLUTIL) {
            let program = program.trim();
            if !program.is_empty() {
                config.plutil_program = PathBuf::from(program);
            }
        }
        if let Some(ms) = parsed::<u64>(&lookup, ENV_CONVERT_TIMEOUT_MS) {
            config = config.with_convert_timeout(Duration::from_millis(ms));
        }
        if let Some(workers) = parsed::<usize>(&lookup, ENV_WORKERS) {
            config = config.with_workers(workers);
        }
        if let Some(dir) = lookup(ENV_TMPDIR) {
            let dir = dir.trim();
            if !dir.is_empty() {
                config.temp_root = Some(PathBuf::from(dir));
            }
        }

        config
    }

    pub fn with_converter(mut self, converter: ConverterKind) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn with_convert_timeout(mut self, timeout: Duration) -> Self {
        self.convert_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Instantiate the configured conversion backend.
    pub fn build_converter(&self) -> Box<dyn PlistConverter> {
        match self.converter {
            ConverterKind::Native => Box::new(NativeConverter),
            ConverterKind::Plutil => Box::new(PlutilConverter::new(
                self.plutil_program.clone(),
                self.convert_timeout,
            )),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let value = raw.trim().parse().ok();
    if value.is_none() {
        ignored(key, &raw);
    }
    value
}

fn ignored(key: &str, raw: &str) {
    tracing::warn!(key, value = raw, "ignoring unparseable environment override");
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
