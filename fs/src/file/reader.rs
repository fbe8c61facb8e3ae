use super::super::LocalFile;
use std::fs::{self, read_dir};
use std::io;
use std::path::{Path, PathBuf};

pub trait FileReader {
    /// Read the contents of file_path and return them as string.
    ///
    /// If the file is not present it will return an io error.
    fn read(&self, file_path: &Path) -> io::Result<String>;

    /// Return the entries inside a given path.
    ///
    /// If the path does not exist it will return an io error.
    fn dir_entries(&self, dir_path: &Path) -> io::Result<Vec<PathBuf>>;
}

impl FileReader for LocalFile {
    fn read(&self, file_path: &Path) -> io::Result<String> {
        if !file_path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found or not a file: {}", file_path.display()),
            ));
        }

        let file_contents = fs::read(file_path)?;

        str::from_utf8(&file_contents)
            .map(str::to_string)
            .map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("UTF-8 decoding error: {e}"))
            })
    }

    fn dir_entries(&self, dir_path: &Path) -> io::Result<Vec<PathBuf>> {
        if !dir_path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "directory not found or not a directory: {}",
                    dir_path.display()
                ),
            ));
        }
        let files = read_dir(dir_path)?;
        let mut file_paths: Vec<PathBuf> = Vec::new();
        for path in files {
            file_paths.push(path?.path());
        }
        Ok(file_paths)
    }
}

#[cfg(feature = "mocks")]
pub mod mock {
    use super::*;
    use crate::mock::MockLocalFile;
    use mockall::predicate;

    impl MockLocalFile {
        pub fn should_read(&mut self, path: &Path, content: String) {
            self.expect_read()
                .with(predicate::eq(PathBuf::from(path)))
                .once()
                .returning(move |_| Ok(content.clone()));
        }

        pub fn should_not_read_file_not_found(&mut self, path: &Path, error_message: String) {
            self.expect_read()
                .with(predicate::eq(PathBuf::from(path)))
                .once()
                .returning(move |_| Err(io::Error::new(io::ErrorKind::NotFound, error_message.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_should_return_error() {
        let reader = LocalFile;
        let result = reader.read(Path::new("/a/path/that/does/not/exist"));
        assert!(result.is_err());
        assert_eq!(
            String::from("file not found or not a file: /a/path/that/does/not/exist"),
            result.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_dir_not_found_should_return_error() {
        let reader = LocalFile;
        let result = reader.dir_entries(Path::new("/a/path/that/does/not/exist"));
        assert!(result.is_err());
        assert_eq!(
            String::from("directory not found or not a directory: /a/path/that/does/not/exist"),
            result.unwrap_err().to_string()
        );
    }

    #[test]
    fn test_read_roundtrip() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("script.sh");
        fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();

        let reader = LocalFile;
        let content = reader.read(&path).unwrap();
        assert_eq!(content, "#!/bin/sh\necho hi\n");
    }
}
