use log::{debug, warn};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

use crate::errors::EmbedError;

// @module: Temporary transform file handling

/// Extension given to transform files
pub const TRANSFORM_EXTENSION: &str = ".mst";

// @struct: Temporary transform file, deleted on drop
#[derive(Debug)]
pub struct TransientTransform {
    path: TempPath,
}

impl TransientTransform {
    // @creates: Empty file in the platform temp directory
    pub fn create(prefix: &str) -> Result<Self, EmbedError> {
        Self::create_in(std::env::temp_dir(), prefix)
    }

    // @creates: Empty file in the given directory
    pub fn create_in<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Self, EmbedError> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(TRANSFORM_EXTENSION)
            .tempfile_in(dir)
            .map_err(|source| EmbedError::Filesystem {
                operation: "create temp-file",
                source,
            })?;

        let path = file.into_temp_path();
        debug!("Created temporary transform file: {:?}", path);
        Ok(Self { path })
    }

    // @returns: Path of the transform file
    pub fn path(&self) -> &Path {
        &self.path
    }

    // @deletes: Transform file, reporting failures
    pub fn remove(self) -> Result<(), EmbedError> {
        let path = self.path.to_path_buf();
        self.path.close().map_err(|source| EmbedError::Filesystem {
            operation: "delete temp-file",
            source,
        })?;
        debug!("Removed temporary transform file: {:?}", path);
        Ok(())
    }

    // @persists: Transform file past the end of the run
    pub fn keep(self) -> Option<PathBuf> {
        match self.path.keep() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not keep temporary transform file: {}", e);
                None
            }
        }
    }
}
