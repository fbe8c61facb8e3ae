pub mod directory_manager;
pub mod file;
pub mod utils;

/// Handle to the local filesystem. Implements [`file::reader::FileReader`],
/// [`file::writer::FileWriter`], [`file::renamer::FileRenamer`] and
/// [`directory_manager::DirectoryManager`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFile;

#[cfg(feature = "mocks")]
pub mod mock {
    use super::directory_manager::{DirectoryManagementError, DirectoryManager};
    use super::file::reader::FileReader;
    use super::file::renamer::FileRenamer;
    use super::file::writer::{FileWriter, WriteError};
    use mockall::mock;
    use std::io;
    use std::path::{Path, PathBuf};

    mock! {
        pub LocalFile {}

        impl FileReader for LocalFile {
            fn read(&self, file_path: &Path) -> io::Result<String>;
            fn dir_entries(&self, dir_path: &Path) -> io::Result<Vec<PathBuf>>;
        }

        impl FileRenamer for LocalFile {
            fn rename(&self, file_path: &Path, rename_path: &Path) -> io::Result<()>;
        }

        impl FileWriter for LocalFile {
            fn write(&self, path: &Path, buf: &[u8]) -> Result<(), WriteError>;
        }

        impl DirectoryManager for LocalFile {
            fn create(&self, path: &Path) -> Result<(), DirectoryManagementError>;
            fn delete(&self, path: &Path) -> Result<(), DirectoryManagementError>;
        }
    }
}
