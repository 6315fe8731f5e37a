//! Per-archive metadata extraction.
//!
//! Both descriptors are required. Problems with either are collected rather
//! than returned early, so a single pass reports everything wrong with an
//! archive; any collected error means no record is produced.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use ::plist::{Dictionary, Integer, Value};
use zip::ZipArchive;

use crate::config::{ExtractorConfig, MAX_ARCHIVE_ENTRIES, MAX_DESCRIPTOR_BYTES};
use crate::errors::{ExtractionErrors, SchemeError, SchemeResult};
use crate::extractor::decoder::{decode, PlistConverter};
use crate::extractor::locator::{locate, DescriptorRole};
use crate::models::AppRecord;

/// A record, or every error that prevented building one.
pub type Extraction = Result<AppRecord, ExtractionErrors>;

/// Extraction settings shared by every archive in a batch.
pub struct Extractor {
    converter: Box<dyn PlistConverter>,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            converter: config.build_converter(),
            config,
        }
    }

    pub fn with_converter(config: ExtractorConfig, converter: Box<dyn PlistConverter>) -> Self {
        Self { converter, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract one archive.
    pub fn extract(&self, archive_path: &Path) -> Extraction {
        tracing::debug!(archive = %archive_path.display(), "processing archive");

        let mut archive = open_archive(archive_path).map_err(ExtractionErrors::single)?;

        // Both lookups run even when the first fails.
        let info = self.read_descriptor(&mut archive, DescriptorRole::AppDescriptor);
        let metadata = self.read_descriptor(&mut archive, DescriptorRole::StoreMetadata);

        match (info, metadata) {
            (Ok(info), Ok(metadata)) => project_record(&info, &metadata),
            (Err(first), metadata) => Err(ExtractionErrors::new(first, metadata.err())),
            (Ok(_), Err(first)) => Err(ExtractionErrors::single(first)),
        }
    }

    fn read_descriptor<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        role: DescriptorRole,
    ) -> SchemeResult<Dictionary> {
        let entry_name = locate(archive, role).ok_or(SchemeError::DescriptorNotFound(role))?;
        tracing::debug!(entry = %entry_name, role = %role, "located descriptor");

        read_entry(archive, &entry_name)
            .and_then(|bytes| {
                decode(&bytes, self.converter.as_ref(), self.config.temp_root.as_deref())
            })
            .map_err(|e| match e {
                SchemeError::Decode(msg) => SchemeError::Decode(format!("{role}: {msg}")),
                other => other,
            })
    }
}

/// Extract one archive with a one-off [`Extractor`].
pub fn extract(archive_path: &Path, config: &ExtractorConfig) -> Extraction {
    Extractor::new(config.clone()).extract(archive_path)
}

fn open_archive(path: &Path) -> SchemeResult<ZipArchive<File>> {
    let invalid = |reason: String| SchemeError::InvalidArchive {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| invalid(e.to_string()))?;
    let archive = ZipArchive::new(file).map_err(|e| invalid(e.to_string()))?;
    if archive.len() > MAX_ARCHIVE_ENTRIES {
        return Err(invalid(format!(
            "too many entries ({}), max allowed is {}",
            archive.len(),
            MAX_ARCHIVE_ENTRIES
        )));
    }
    Ok(archive)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> SchemeResult<Vec<u8>> {
    let entry = archive.by_name(name)?;
    if entry.size() > MAX_DESCRIPTOR_BYTES {
        return Err(SchemeError::Decode(format!(
            "{name} too large ({} bytes), max allowed is {MAX_DESCRIPTOR_BYTES} bytes",
            entry.size()
        )));
    }
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.take(MAX_DESCRIPTOR_BYTES).read_to_end(&mut bytes)?;
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Allow-list projection
// ---------------------------------------------------------------------------

fn required(value: Option<String>, role: DescriptorRole, key: &'static str) -> SchemeResult<String> {
    value.ok_or(SchemeError::MissingField { role, key })
}

fn project_record(info: &Dictionary, metadata: &Dictionary) -> Extraction {
    let bundle_id = required(
        string_field(info, "CFBundleIdentifier")
            .or_else(|| string_field(metadata, "softwareVersionBundleId")),
        DescriptorRole::AppDescriptor,
        "CFBundleIdentifier",
    );
    let item_id = required(
        id_field(metadata, "itemId"),
        DescriptorRole::StoreMetadata,
        "itemId",
    );
    let name = required(
        string_field(metadata, "itemName"),
        DescriptorRole::StoreMetadata,
        "itemName",
    );

    let (bundle_id, item_id, name) = match (bundle_id, item_id, name) {
        (Ok(bundle_id), Ok(item_id), Ok(name)) => (bundle_id, item_id, name),
        (Err(first), item_id, name) => {
            let rest = [item_id.err(), name.err()].into_iter().flatten();
            return Err(ExtractionErrors::new(first, rest));
        }
        (Ok(_), Err(first), name) => return Err(ExtractionErrors::new(first, name.err())),
        (Ok(_), Ok(_), Err(first)) => return Err(ExtractionErrors::single(first)),
    };

    Ok(AppRecord {
        bundle_id,
        version: string_field(info, "CFBundleVersion")
            .or_else(|| string_field(metadata, "bundleVersion")),
        short_version: string_field(info, "CFBundleShortVersionString")
            .or_else(|| string_field(metadata, "bundleShortVersionString")),
        display_name: string_field(info, "CFBundleDisplayName"),
        executable_name: string_field(info, "CFBundleExecutable"),
        platform_version: string_field(info, "DTPlatformVersion"),
        minimum_os_version: string_field(info, "MinimumOSVersion"),
        device_family: device_family(info),
        required_device_capabilities: capabilities(info),
        url_schemes: url_schemes(info),
        item_id,
        name,
    })
}

/// Every `CFBundleURLSchemes` entry across every `CFBundleURLTypes` group.
pub fn url_schemes(info: &Dictionary) -> BTreeSet<String> {
    let Some(groups) = info.get("CFBundleURLTypes").and_then(Value::as_array) else {
        return BTreeSet::new();
    };
    groups
        .iter()
        .filter_map(Value::as_dictionary)
        .filter_map(|group| group.get("CFBundleURLSchemes").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_string)
        .map(str::to_string)
        .collect()
}

fn string_field(dict: &Dictionary, key: &str) -> Option<String> {
    match dict.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Integer(i) => Some(integer_string(i)),
        _ => None,
    }
}

/// Store ids are integers in practice; strings are tolerated.
fn id_field(dict: &Dictionary, key: &str) -> Option<String> {
    match dict.get(key)? {
        Value::Integer(i) => Some(integer_string(i)),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn integer_string(i: &Integer) -> String {
    match i.as_signed() {
        Some(v) => v.to_string(),
        None => i.as_unsigned().unwrap_or_default().to_string(),
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => i.as_signed(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `UIDeviceFamily` is usually an integer array but may be a lone integer.
fn device_family(info: &Dictionary) -> Option<Vec<i64>> {
    match info.get("UIDeviceFamily")? {
        Value::Array(items) => Some(items.iter().filter_map(integer_of).collect()),
        other => integer_of(other).map(|family| vec![family]),
    }
}

/// `UIRequiredDeviceCapabilities` is either a list of names or a dictionary
/// of name to required flag; only required names are kept.
fn capabilities(info: &Dictionary) -> Option<Vec<String>> {
    match info.get("UIRequiredDeviceCapabilities")? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_string)
                .map(str::to_string)
                .collect(),
        ),
        Value::Dictionary(flags) => Some(
            flags
                .iter()
                .filter(|(_, required)| required.as_boolean().unwrap_or(false))
                .map(|(name, _)| name.clone())
                .collect(),
        ),
        _ => None,
    }
}
