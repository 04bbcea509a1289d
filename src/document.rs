use std::fs;
use std::path::Path;

use crate::{RetraceError, RetraceResult};

/// An SVG produced by the tracer, passed through to the renderer untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDocument {
    bytes: Vec<u8>,
}

impl VectorDocument {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Read a traced document back from disk.
    pub fn read(path: &Path) -> RetraceResult<Self> {
        let bytes = fs::read(path).map_err(|source| RetraceError::VectorRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the SVG to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> RetraceResult<()> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }
}
