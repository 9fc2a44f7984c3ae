//! Request-scoped staging of uploaded bytes.

use super::{ExtractionError, FileKind};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// An upload written to the staging directory.
///
/// The file is removed when the value is released or dropped, so a staged upload never outlives
/// the request that created it. The on-disk name is generated; only the suffix of the declared
/// filename is kept.
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    /// Write `bytes` to a fresh file under `dir` carrying the suffix of `kind`.
    pub fn write(dir: &Path, kind: FileKind, bytes: &[u8]) -> Result<Self, ExtractionError> {
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(kind.suffix())
            .tempfile_in(dir)
            .map_err(ExtractionError::Staging)?;
        file.write_all(bytes).map_err(ExtractionError::Staging)?;
        file.flush().map_err(ExtractionError::Staging)?;
        Ok(Self { file })
    }

    /// Location of the staged copy.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the staged copy now, logging instead of failing if removal goes wrong.
    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        if let Err(error) = self.file.close() {
            tracing::warn!(path = %path.display(), %error, "Failed to remove staged upload");
        }
    }
}
