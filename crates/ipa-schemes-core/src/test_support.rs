//! Fixture builders for archives and descriptors used by unit tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use plist::{Dictionary, Value};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Inputs for one synthetic application archive.
#[derive(Clone, Debug)]
pub struct FixtureApp {
    pub bundle_id: &'static str,
    pub version: Option<&'static str>,
    pub short_version: Option<&'static str>,
    pub url_types: Vec<Vec<&'static str>>,
    pub item_id: i64,
    pub name: &'static str,
}

impl FixtureApp {
    pub fn new(bundle_id: &'static str, item_id: i64, name: &'static str) -> Self {
        Self {
            bundle_id,
            version: Some("1.0"),
            short_version: Some("1.0"),
            url_types: vec![vec!["fixture"]],
            item_id,
            name,
        }
    }

    pub fn version(mut self, version: Option<&'static str>) -> Self {
        self.version = version;
        self
    }

    pub fn url_types(mut self, url_types: Vec<Vec<&'static str>>) -> Self {
        self.url_types = url_types;
        self
    }

    pub fn info_plist(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("CFBundleIdentifier".into(), Value::String(self.bundle_id.into()));
        if let Some(v) = self.version {
            dict.insert("CFBundleVersion".into(), Value::String(v.into()));
        }
        if let Some(v) = self.short_version {
            dict.insert("CFBundleShortVersionString".into(), Value::String(v.into()));
        }
        dict.insert("CFBundleExecutable".into(), Value::String("Fixture".into()));
        dict.insert("MinimumOSVersion".into(), Value::String("12.0".into()));
        dict.insert(
            "UIDeviceFamily".into(),
            Value::Array(vec![Value::from(1i64), Value::from(2i64)]),
        );
        // Not on the allow-list; must never leak into records.
        dict.insert("NSCameraUsageDescription".into(), Value::String("camera".into()));

        let groups: Vec<Value> = self
            .url_types
            .iter()
            .map(|schemes| {
                let mut group = Dictionary::new();
                group.insert("CFBundleURLName".into(), Value::String(self.bundle_id.into()));
                group.insert(
                    "CFBundleURLSchemes".into(),
                    Value::Array(schemes.iter().map(|s| Value::String((*s).into())).collect()),
                );
                Value::Dictionary(group)
            })
            .collect();
        if !groups.is_empty() {
            dict.insert("CFBundleURLTypes".into(), Value::Array(groups));
        }
        dict
    }

    pub fn store_metadata(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("itemId".into(), Value::from(self.item_id));
        dict.insert("itemName".into(), Value::String(self.name.into()));
        dict.insert(
            "softwareVersionBundleId".into(),
            Value::String(self.bundle_id.into()),
        );
        if let Some(v) = self.version {
            dict.insert("bundleVersion".into(), Value::String(v.into()));
        }
        dict
    }

    /// Write an archive with both descriptors; Info.plist is XML unless
    /// `binary_info` is set.
    pub fn write_ipa(&self, dir: &Path, file_name: &str, binary_info: bool) -> PathBuf {
        let info = if binary_info {
            binary(&self.info_plist())
        } else {
            xml(&self.info_plist())
        };
        let path = dir.join(file_name);
        write_zip(
            &path,
            &[
                ("Payload/Fixture.app/Fixture", b"\xCF\xFA\xED\xFE".to_vec()),
                ("Payload/Fixture.app/Info.plist", info),
                ("iTunesMetadata.plist", xml(&self.store_metadata())),
            ],
        );
        path
    }
}

pub fn xml(dict: &Dictionary) -> Vec<u8> {
    let mut buf = Vec::new();
    Value::Dictionary(dict.clone())
        .to_writer_xml(&mut buf)
        .expect("serialize xml plist");
    buf
}

pub fn binary(dict: &Dictionary) -> Vec<u8> {
    let mut buf = Vec::new();
    Value::Dictionary(dict.clone())
        .to_writer_binary(&mut buf)
        .expect("serialize binary plist");
    buf
}

pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = File::create(path).expect("create zip");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
    }
    writer.finish().expect("finish zip");
}
