//! In-memory filesystem private to the interpreter module.
//!
//! The host can only reach it through the virtual I/O channel; the program
//! reads its input files from here during an invocation.

use rustc_hash::FxHashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Filesystem failures. These are infrastructure errors, not interpreter errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("`{0}` is not an absolute file path")]
    InvalidPath(PathBuf),

    #[error("`{0}`: no such file")]
    NotFound(PathBuf),

    #[error("writing {size} bytes to `{path}` exceeds the {quota} byte quota")]
    QuotaExceeded {
        path: PathBuf,
        size: usize,
        quota: usize,
    },
}

/// Flat map from absolute path to file contents.
#[derive(Debug, Default)]
pub struct VirtualFs {
    files: FxHashMap<PathBuf, Vec<u8>>,
    /// Per-file size limit in bytes (`None` = unlimited)
    quota: Option<usize>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem that rejects files larger than `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            files: FxHashMap::default(),
            quota: Some(quota),
        }
    }

    /// Write `data` to `path`, replacing any previous content.
    pub fn write(&mut self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let path = normalize(path)?;
        if let Some(quota) = self.quota
            && data.len() > quota
        {
            return Err(FsError::QuotaExceeded {
                path,
                size: data.len(),
                quota,
            });
        }
        self.files.insert(path, data.to_vec());
        Ok(())
    }

    pub fn read(&self, path: &Path) -> Result<&[u8], FsError> {
        let path = normalize(path)?;
        self.files
            .get(&path)
            .map(Vec::as_slice)
            .ok_or(FsError::NotFound(path))
    }

    /// Read a file as text, replacing invalid UTF-8.
    pub fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        self.read(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn remove(&mut self, path: &Path) -> Result<(), FsError> {
        let path = normalize(path)?;
        self.files
            .remove(&path)
            .map(|_| ())
            .ok_or(FsError::NotFound(path))
    }

    pub fn exists(&self, path: &Path) -> bool {
        normalize(path).is_ok_and(|path| self.files.contains_key(&path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Resolve `.` and `..` lexically and reject anything that is not an
/// absolute path naming a file.
fn normalize(path: &Path) -> Result<PathBuf, FsError> {
    if !path.is_absolute() {
        return Err(FsError::InvalidPath(path.to_path_buf()));
    }

    let mut normalized = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::ParentDir => {
                normalized.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }

    if normalized.file_name().is_none() || path.as_os_str().to_string_lossy().ends_with('/') {
        return Err(FsError::InvalidPath(path.to_path_buf()));
    }
    Ok(normalized)
}
