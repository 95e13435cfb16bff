// JSON file helpers shared by the frame store and the track index

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::constants::TEMP_SUFFIX;
use crate::core::error::{AnnotationError, Result};

/// Writes `value` as pretty JSON next to `path`, flushes it, then renames it
/// over `path`. Readers see either the old file or the complete new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnnotationError::persistence(parent, e))?;
    }

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| AnnotationError::persistence(path, io::Error::other(e)))?;

    let tmp = temp_path(path);
    if let Err(e) = write_and_sync(&tmp, &json) {
        discard_temp(&tmp);
        return Err(AnnotationError::persistence(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        discard_temp(&tmp);
        return Err(AnnotationError::persistence(path, e));
    }

    debug!("wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Reads and parses a JSON file. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AnnotationError::persistence(path, e)),
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|source| AnnotationError::CorruptFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Removes a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AnnotationError::persistence(path, e)),
    }
}

pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn discard_temp(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("could not remove temporary file {}: {}", tmp.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/data.json");
        let mut value = BTreeMap::new();
        value.insert("k".to_string(), vec![1, 2, 3]);

        write_json_atomic(&path, &value).unwrap();
        let back: Option<BTreeMap<String, Vec<i32>>> = read_json(&path).unwrap();
        assert_eq!(back, Some(value));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let back: Option<Vec<u8>> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_garbage_is_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{ not json").unwrap();
        let err = read_json::<Vec<u8>>(&path).unwrap_err();
        assert!(matches!(err, AnnotationError::CorruptFile { .. }));
        assert!(err.is_persistence());
    }

    #[test]
    fn test_failed_write_surfaces_path() {
        let dir = tempfile::tempdir().unwrap();
        // parent "file.json" is a regular file, so the directory cannot be created
        let blocker = dir.path().join("file.json");
        fs::write(&blocker, b"x").unwrap();
        let err = write_json_atomic(&blocker.join("child.json"), &1).unwrap_err();
        assert!(err.is_persistence());
        assert!(err.path().is_some());
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        let tmp = temp_path(Path::new("/a/annotations.json"));
        assert_eq!(tmp, PathBuf::from("/a/annotations.json.tmp"));
    }
}
