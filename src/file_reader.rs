use std::fs::read_to_string;
use std::io::Error as ioError;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileReaderError {
    #[error("error reading contents of `{0}`: `{1}`")]
    Read(String, #[source] ioError),
}

#[cfg_attr(test, mockall::automock)]
pub trait FileReader {
    fn read(&self, path: &Path) -> Result<String, FileReaderError>;
}

#[derive(Default, Debug, Clone)]
pub struct FSFileReader;

impl FileReader for FSFileReader {
    fn read(&self, path: &Path) -> Result<String, FileReaderError> {
        read_to_string(path).map_err(|e| FileReaderError::Read(path.display().to_string(), e))
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use mockall::predicate;
    use std::io::ErrorKind;
    use std::path::PathBuf;

    impl MockFileReader {
        pub fn should_read(&mut self, path: &Path, content: String) {
            self.expect_read()
                .with(predicate::eq(PathBuf::from(path)))
                .once()
                .returning(move |_| Ok(content.clone()));
        }

        pub fn should_not_read(&mut self, path: &Path) {
            self.expect_read()
                .with(predicate::eq(PathBuf::from(path)))
                .once()
                .returning(|p| {
                    Err(FileReaderError::Read(
                        p.display().to_string(),
                        ioError::from(ErrorKind::NotFound),
                    ))
                });
        }
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = FSFileReader
            .read(Path::new("/non/existent/file.json"))
            .unwrap_err();
        assert!(err.to_string().contains("/non/existent/file.json"));
    }
}
