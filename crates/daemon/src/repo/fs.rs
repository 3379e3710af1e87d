//! Filesystem helpers shared by the stores.

use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{RepoError, Result};

/// Creates `dir` if needed and checks that it is a directory.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| RepoError::io("making directory", dir, e))?;
    let meta = fs::metadata(dir).map_err(|e| RepoError::io("checking directory", dir, e))?;
    if !meta.is_dir() {
        return Err(RepoError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

/// Serializes `value` to `path` through a temporary file and a rename.
///
/// Readers see either the previous document or the new one, never a torn one.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_vec_pretty(value).map_err(|e| RepoError::Json {
        op: "encoding",
        path: path.to_path_buf(),
        source: e,
    })?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &contents).map_err(|e| RepoError::io("writing", &temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| RepoError::io("renaming into place", path, e))?;
    Ok(())
}

/// Reads and decodes a JSON document.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read(path).map_err(|e| RepoError::io("reading", path, e))?;
    serde_json::from_slice(&contents).map_err(|e| RepoError::Json {
        op: "decoding",
        path: path.to_path_buf(),
        source: e,
    })
}

/// Removes a file. A file that is already gone counts as removed.
pub(crate) fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepoError::io("removing", path, e)),
    }
}

/// Removes a directory tree. A tree that is already gone counts as removed.
pub(crate) fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepoError::io("removing", path, e)),
    }
}

/// Checks that `value` can be used as a single path component.
pub(crate) fn validate_component(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(RepoError::Validation(format!("{what} cannot be empty")));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(RepoError::Validation(format!(
            "{what} {value:?} is not a valid path component"
        )));
    }
    Ok(())
}

/// Checks that an entry loaded from disk is stored under its own key.
///
/// `entry_name` is the directory name or file stem the entry was read from.
pub(crate) fn check_entry_name(what: &str, key: &str, entry_name: Option<&OsStr>) -> Result<()> {
    let entry_name = entry_name
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if key != entry_name {
        return Err(RepoError::Validation(format!(
            "{what} {key:?} does not match entry name {entry_name:?}"
        )));
    }
    Ok(())
}
