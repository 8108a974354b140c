//! Document Codec
//!
//! One YAML file per entity, named `<id>.yaml`. Writes go to a hidden
//! temporary sibling first and are renamed into place, so a single entity
//! write is atomic. Reading a directory never fails on one bad file: each
//! failure is collected next to the successfully parsed documents.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::error::Result;

pub const EXTENSION: &str = "yaml";
const ALT_EXTENSION: &str = "yml";

/// File name for an entity id
pub fn file_name(id: &str) -> String {
    format!("{}.{}", id, EXTENSION)
}

/// Full path of an entity file inside its type directory
pub fn document_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(file_name(id))
}

/// A parsed document before schema validation
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub path: PathBuf,
    /// File name without extension
    pub stem: String,
    pub data: Value,
    pub checksum: Checksum,
}

/// A file that could not be read or parsed
#[derive(Debug, Clone)]
pub struct ReadFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Result of reading one type directory
#[derive(Debug, Default)]
pub struct DirectoryScan {
    pub documents: Vec<RawDocument>,
    pub failures: Vec<ReadFailure>,
}

/// Serialize `data` to `<dir>/<id>.yaml`, creating `dir` if needed
pub fn write_document<T: Serialize>(dir: &Path, id: &str, data: &T) -> Result<PathBuf> {
    write_to(&document_path(dir, id), data)
}

/// Serialize `data` to an explicit file path through a staging sibling
pub fn write_to<T: Serialize>(target: &Path, data: &T) -> Result<PathBuf> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let text = serde_yaml::to_string(data)?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = dir.join(format!(".{}.tmp", name));
    fs::write(&staging, text)?;
    if let Err(e) = fs::rename(&staging, target) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(target.to_path_buf())
}

/// Remove a file by path; returns false when it was already gone
pub fn delete_path(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read and parse a single document
pub fn read_document(path: &Path) -> std::result::Result<RawDocument, ReadFailure> {
    let failure = |message: String| ReadFailure {
        path: path.to_path_buf(),
        message,
    };
    let text = fs::read_to_string(path).map_err(|e| failure(format!("unreadable: {}", e)))?;
    let data: Value = serde_yaml::from_str(&text).map_err(|e| failure(format!("invalid YAML: {}", e)))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(RawDocument {
        path: path.to_path_buf(),
        stem,
        data,
        checksum: Checksum::of_text(&text),
    })
}

fn is_document(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    let extension_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == EXTENSION || e == ALT_EXTENSION)
        .unwrap_or(false);
    !hidden && extension_ok && path.is_file()
}

/// Read every document in `dir`; a missing directory reads as empty
pub fn read_all(dir: &Path) -> DirectoryScan {
    let mut scan = DirectoryScan::default();
    if !dir.is_dir() {
        return scan;
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                scan.failures.push(ReadFailure {
                    path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
                    message: e.to_string(),
                });
                continue;
            }
        };
        let path = entry.path();
        if !is_document(path) {
            continue;
        }
        match read_document(path) {
            Ok(doc) => scan.documents.push(doc),
            Err(failure) => scan.failures.push(failure),
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directory_and_names_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("capabilities");
        let path = write_document(&dir, "data-export", &json!({"id": "data-export", "name": "Export"})).unwrap();
        assert_eq!(path, dir.join("data-export.yaml"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("id: data-export"));
        // no staging file left behind
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    fn test_bad_file_does_not_abort_scan() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("good.yaml"), "id: good\nname: Good\n").unwrap();
        fs::write(dir.join("bad.yaml"), "id: [unclosed\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        fs::write(dir.join(".good.yaml.tmp"), "ignored").unwrap();

        let scan = read_all(dir);
        assert_eq!(scan.documents.len(), 1);
        assert_eq!(scan.documents[0].stem, "good");
        assert_eq!(scan.failures.len(), 1);
        assert!(scan.failures[0].path.ends_with("bad.yaml"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let scan = read_all(&tmp.path().join("nope"));
        assert!(scan.documents.is_empty() && scan.failures.is_empty());
    }

    #[test]
    fn test_delete_reports_absence() {
        let tmp = TempDir::new().unwrap();
        write_document(tmp.path(), "x", &json!({"id": "x"})).unwrap();
        let path = document_path(tmp.path(), "x");
        assert!(delete_path(&path).unwrap());
        assert!(!delete_path(&path).unwrap());
    }

    #[test]
    fn test_write_to_keeps_alternate_extension() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("analyst.yml");
        write_to(&target, &json!({"id": "analyst"})).unwrap();
        let scan = read_all(tmp.path());
        assert_eq!(scan.documents.len(), 1);
        assert_eq!(scan.documents[0].path, target);
        assert!(delete_path(&target).unwrap());
        assert!(read_all(tmp.path()).documents.is_empty());
    }
}
