//! Property list decoding for archive descriptors (Info.plist and
//! iTunesMetadata.plist).
//!
//! XML content is parsed directly. Anything else is treated as a binary
//! property list: it is written into a scoped temporary directory, rewritten
//! as XML by a [`PlistConverter`], and parsed from there. The directory is
//! owned by a [`TempDir`] and is removed on every exit path.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use plist::{Dictionary, Value};
use tempfile::TempDir;

use crate::errors::{SchemeError, SchemeResult};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CONVERT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const SCRATCH_PREFIX: &str = "ipa-plist-";

/// Rewrites a binary property list file in place as XML.
pub trait PlistConverter: Send + Sync {
    fn convert_to_xml(&self, path: &Path) -> SchemeResult<()>;
}

/// In-process conversion using the `plist` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeConverter;

impl PlistConverter for NativeConverter {
    fn convert_to_xml(&self, path: &Path) -> SchemeResult<()> {
        let value = Value::from_file(path)
            .map_err(|e| SchemeError::Decode(format!("cannot read {}: {e}", path.display())))?;
        value
            .to_file_xml(path)
            .map_err(|e| SchemeError::Decode(format!("cannot rewrite {}: {e}", path.display())))
    }
}

/// Conversion through an external `plutil` binary.
///
/// Linux hosts are expected to have the libplist-utils flavour, which takes
/// `-i`/`-o`; elsewhere the Apple tool's `-convert xml1` form is used.
#[derive(Clone, Debug)]
pub struct PlutilConverter {
    program: PathBuf,
    timeout: Duration,
}

impl PlutilConverter {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        if cfg!(target_os = "linux") {
            cmd.arg("-i").arg(path).arg("-o").arg(path);
        } else {
            cmd.arg("-convert").arg("xml1").arg(path);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl PlistConverter for PlutilConverter {
    fn convert_to_xml(&self, path: &Path) -> SchemeResult<()> {
        let program = self.program.display();
        tracing::debug!(program = %program, path = %path.display(), "converting binary plist");

        let mut child = self
            .command(path)
            .spawn()
            .map_err(|e| SchemeError::Decode(format!("cannot run {program}: {e}")))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(SchemeError::Decode(format!(
                        "{program} failed on {}: {status}",
                        path.display()
                    )))
                }
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SchemeError::Decode(format!(
                        "{program} timed out after {} ms",
                        self.timeout.as_millis()
                    )));
                }
                Ok(None) => thread::sleep(CONVERT_POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SchemeError::Decode(format!("waiting on {program}: {e}")));
                }
            }
        }
    }
}

/// Whether the content starts with an XML marker after any BOM/whitespace.
pub fn looks_like_xml(bytes: &[u8]) -> bool {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

/// Decode a descriptor into its top-level dictionary.
pub fn decode(
    bytes: &[u8],
    converter: &dyn PlistConverter,
    temp_root: Option<&Path>,
) -> SchemeResult<Dictionary> {
    let value = if looks_like_xml(bytes) {
        parse_xml(bytes)?
    } else {
        decode_via_converter(bytes, converter, temp_root)?
    };
    value
        .into_dictionary()
        .ok_or_else(|| SchemeError::Decode("top-level value is not a dictionary".to_string()))
}

fn parse_xml(bytes: &[u8]) -> SchemeResult<Value> {
    Value::from_reader_xml(Cursor::new(bytes))
        .map_err(|e| SchemeError::Decode(format!("malformed XML property list: {e}")))
}

fn decode_via_converter(
    bytes: &[u8],
    converter: &dyn PlistConverter,
    temp_root: Option<&Path>,
) -> SchemeResult<Value> {
    let scratch = scratch_dir(temp_root)?;
    let path = scratch.path().join("descriptor.plist");

    let result = (|| -> SchemeResult<Value> {
        std::fs::write(&path, bytes)?;
        converter.convert_to_xml(&path)?;
        let converted = std::fs::read(&path)?;
        parse_xml(&converted)
    })();

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!(dir = %scratch_path.display(), error = %e, "failed to remove scratch directory");
    }
    result
}

fn scratch_dir(temp_root: Option<&Path>) -> SchemeResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);
    let dir = match temp_root {
        Some(root) => builder.tempdir_in(root)?,
        None => builder.tempdir()?,
    };
    Ok(dir)
}
