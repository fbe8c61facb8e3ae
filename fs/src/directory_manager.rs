use super::utils::validate_path;
use super::LocalFile;
use std::fs::{remove_dir_all, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum DirectoryManagementError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] super::utils::FsError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub trait DirectoryManager {
    /// Create a folder, recursively creating any missing parents.
    fn create(&self, path: &Path) -> Result<(), DirectoryManagementError>;

    /// Delete the folder and its contents. If the folder does not exist this is a no-op.
    fn delete(&self, path: &Path) -> Result<(), DirectoryManagementError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryManagerFs;

impl DirectoryManager for DirectoryManagerFs {
    fn create(&self, path: &Path) -> Result<(), DirectoryManagementError> {
        validate_path(path)?;
        let mut directory_builder = DirBuilder::new();
        directory_builder.recursive(true).mode(0o700);
        directory_builder.create(path)?;
        Ok(())
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn delete(&self, path: &Path) -> Result<(), DirectoryManagementError> {
        validate_path(path)?;
        if !path.exists() {
            return Ok(());
        }
        remove_dir_all(path)?;
        Ok(())
    }
}

impl DirectoryManager for LocalFile {
    fn create(&self, path: &Path) -> Result<(), DirectoryManagementError> {
        DirectoryManagerFs.create(path)
    }

    fn delete(&self, path: &Path) -> Result<(), DirectoryManagementError> {
        DirectoryManagerFs.delete(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_delete() {
        let tempdir = tempfile::tempdir().unwrap();
        let nested = tempdir.path().join("a/b/c");

        let manager = DirectoryManagerFs;
        manager.create(&nested).unwrap();
        assert!(nested.is_dir());

        manager.delete(&nested).unwrap();
        assert!(!nested.exists());
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let manager = DirectoryManagerFs;
        assert!(manager.delete(Path::new("/tmp/osctrl-does-not-exist")).is_ok());
    }

    #[test]
    fn test_create_rejects_dotted_path() {
        let manager = DirectoryManagerFs;
        let result = manager.create(Path::new("a/../b"));
        assert!(result.is_err());
    }
}
