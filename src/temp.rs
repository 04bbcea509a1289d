use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};

use crate::{RetraceError, RetraceResult};

const FILE_PREFIX: &str = "retrace-";

/// A uniquely named scratch file owned by a [`TempScope`].
///
/// The handle only names the file; removal is the scope's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file contents.
    pub fn write(&self, bytes: &[u8]) -> RetraceResult<()> {
        fs::write(&self.path, bytes).map_err(|source| RetraceError::Resource {
            action: "write",
            path: Some(self.path.clone()),
            source,
        })
    }
}

/// Owns every scratch file of one pipeline run and removes them when dropped.
///
/// Removal is best-effort: files that are already gone or cannot be
/// deleted are logged and skipped.
#[derive(Debug, Default)]
pub struct TempScope {
    dir: Option<PathBuf>,
    files: Vec<TempPath>,
}

impl TempScope {
    /// A scope that places files in the platform temp directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that places files in `dir` instead of the platform temp directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            files: Vec::new(),
        }
    }

    /// Create an empty, uniquely named file ending in `suffix`.
    pub fn create(&mut self, suffix: &str) -> RetraceResult<TempFile> {
        let mut builder = Builder::new();
        builder.prefix(FILE_PREFIX).suffix(suffix);
        let created = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let file = created.map_err(|source| RetraceError::Resource {
            action: "create",
            path: self.dir.clone(),
            source,
        })?;

        let path = file.into_temp_path();
        let handle = TempFile {
            path: path.to_path_buf(),
        };
        log::debug!("created scratch file {}", handle.path.display());
        self.files.push(path);
        Ok(handle)
    }

    /// Paths of the files this scope still owns.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|path| &**path)
    }

    /// End the scope now instead of at the end of the enclosing block.
    pub fn release(self) {}
}

impl Drop for TempScope {
    fn drop(&mut self) {
        for path in self.files.drain(..) {
            let display = path.to_path_buf();
            match path.close() {
                Ok(()) => log::debug!("removed scratch file {}", display.display()),
                Err(err) => log::debug!(
                    "could not remove scratch file {}: {err}",
                    display.display()
                ),
            }
        }
    }
}
