//! Plain-text run log: one line per terminal row outcome.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::DatasetError;

/// First line of every log.
pub const LOG_HEADER: &str = "Processing started...";

pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Truncates the log and writes [`LOG_HEADER`].
    pub fn create(path: &Path) -> Result<Self, DatasetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|source| DatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut log = Self {
            path: path.to_path_buf(),
            file,
        };
        log.append(LOG_HEADER)?;
        Ok(log)
    }

    pub fn append(&mut self, line: &str) -> Result<(), DatasetError> {
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|source| DatasetError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.log");
        std::fs::write(&path, "old content\n").expect("seed");

        let mut log = RunLog::create(&path).expect("create");
        log.append("Row 0: Issues: [\"none\"], Bias: [\"none\"]").expect("append");

        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            content,
            "Processing started...\nRow 0: Issues: [\"none\"], Bias: [\"none\"]\n"
        );
    }
}
