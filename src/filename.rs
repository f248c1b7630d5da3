//! Database file names
//!
//! ```text
//!   {location}/
//!     ├── CURRENT          name of the live manifest
//!     ├── MANIFEST-000001  version edit log
//!     ├── 000003.log       write-ahead log
//!     ├── 000004.ldb       table file
//!     ├── LOCK
//!     ├── LOG              human-readable event log
//!     └── lost/            files set aside by repair
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub(crate) const CURRENT: &str = "CURRENT";
pub(crate) const LOCK: &str = "LOCK";
pub(crate) const INFO_LOG: &str = "LOG";
pub(crate) const INFO_LOG_OLD: &str = "LOG.old";
pub(crate) const LOST_DIR: &str = "lost";

/// Kinds of files found in a database directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Log(u64),
    Table(u64),
    Manifest(u64),
    Current,
    Lock,
    InfoLog,
    Temp(u64),
}

pub fn log_file_name(number: u64) -> String {
    format!("{:06}.log", number)
}

pub fn table_file_name(number: u64) -> String {
    format!("{:06}.ldb", number)
}

pub fn manifest_file_name(number: u64) -> String {
    format!("MANIFEST-{:06}", number)
}

fn temp_file_name(number: u64) -> String {
    format!("{:06}.dbtmp", number)
}

/// Parse a file name found in a database directory
///
/// "000042.ldb" → Some(FileType::Table(42))
pub fn parse_file_name(name: &str) -> Option<FileType> {
    match name {
        CURRENT => return Some(FileType::Current),
        LOCK => return Some(FileType::Lock),
        INFO_LOG | INFO_LOG_OLD => return Some(FileType::InfoLog),
        _ => {}
    }

    if let Some(number) = name.strip_prefix("MANIFEST-") {
        return number.parse().ok().map(FileType::Manifest);
    }

    let (stem, ext) = name.split_once('.')?;
    let number: u64 = stem.parse().ok()?;
    match ext {
        "log" => Some(FileType::Log(number)),
        "ldb" | "sst" => Some(FileType::Table(number)),
        "dbtmp" => Some(FileType::Temp(number)),
        _ => None,
    }
}

/// Point `CURRENT` at manifest `number`
///
/// Writes a temp file and renames it over `CURRENT` so that readers see
/// either the old or the new manifest name, never a partial one.
pub(crate) fn set_current_file(dir: &Path, number: u64) -> Result<()> {
    let manifest = manifest_file_name(number);
    let tmp = dir.join(temp_file_name(number));

    let mut file = fs::File::create(&tmp)?;
    file.write_all(manifest.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, dir.join(CURRENT)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    sync_dir(dir)
}

/// Read the manifest name stored in `CURRENT`
pub(crate) fn read_current_file(dir: &Path) -> Result<PathBuf> {
    let contents = fs::read_to_string(dir.join(CURRENT))?;
    let name = contents.strip_suffix('\n').unwrap_or(&contents);
    if name.is_empty() || !matches!(parse_file_name(name), Some(FileType::Manifest(_))) {
        return Err(crate::error::StrataError::corruption(format!(
            "CURRENT names an invalid manifest: {:?}",
            contents
        )));
    }
    Ok(dir.join(name))
}

/// fsync a directory so that renames and creations inside it are durable
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
