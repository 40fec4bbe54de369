//! Artifact storage shared by the coordinator and the worker pool.
//!
//! The coordinator only ever passes artifact *names* around; whichever worker
//! runs a task resolves them against the same store. With the ssh transport
//! the store root must therefore live on storage every host can reach.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

pub trait ArtifactStore: Send + Sync {
    fn write_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError>;
    fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError>;
    fn exists(&self, name: &str) -> bool;
}

/// Artifacts as flat files under a single directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Like [`FsArtifactStore::new`], creating the root directory if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Write {
            name: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        fs::write(&path, contents).map_err(|source| StorageError::Write {
            name: name.to_string(),
            source,
        })
    }

    fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                name: name.to_string(),
            }),
            Err(source) => Err(StorageError::Read {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }
}
