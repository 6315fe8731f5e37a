//! Locates the metadata descriptors inside an application archive.

use std::fmt;
use std::io::{Read, Seek};
use std::sync::LazyLock;

use regex::Regex;
use zip::ZipArchive;

static APP_DESCRIPTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|/)Payload/.+?\.app/Info\.plist$").unwrap());

const STORE_METADATA_NAME: &str = "iTunesMetadata.plist";

/// The two property lists an archive must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorRole {
    /// `Payload/<App>.app/Info.plist`
    AppDescriptor,
    /// `iTunesMetadata.plist` at the archive root.
    StoreMetadata,
}

impl DescriptorRole {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::AppDescriptor => "Info.plist",
            Self::StoreMetadata => STORE_METADATA_NAME,
        }
    }

    /// Whether an archive entry name plays this role.
    pub fn matches(self, entry_name: &str) -> bool {
        match self {
            Self::AppDescriptor => APP_DESCRIPTOR_RE.is_match(entry_name),
            Self::StoreMetadata => entry_name.eq_ignore_ascii_case(STORE_METADATA_NAME),
        }
    }
}

impl fmt::Display for DescriptorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// First entry, in central-directory order, that plays `role`.
///
/// A missing descriptor is an expected outcome, so this returns `None`
/// rather than an error.
pub fn locate<R: Read + Seek>(archive: &ZipArchive<R>, role: DescriptorRole) -> Option<String> {
    locate_in_names(archive.file_names(), role)
}

pub fn locate_in_names<'a, I>(names: I, role: DescriptorRole) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .find(|name| role.matches(name))
        .map(str::to_string)
}
