//! GOOD and ISSUES output datasets.
//!
//! Both files are truncated and given a header when a run starts, then
//! appended to and flushed row by row so partial results survive an
//! interrupted run.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::DatasetError;
use crate::validation::{Verdict, VerdictStatus};

/// Extra columns of the ISSUES dataset, after the input columns.
pub const ISSUE_COLUMNS: [&str; 3] = ["issues", "bias", "raw_response"];

/// Destination of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Good,
    Issues,
}

impl Destination {
    pub fn for_status(status: VerdictStatus) -> Self {
        match status {
            VerdictStatus::Clean => Self::Good,
            VerdictStatus::Flagged | VerdictStatus::ParseError => Self::Issues,
        }
    }
}

struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvSink {
    fn create(path: &Path, header: &[&str]) -> Result<Self, DatasetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let writer = csv::Writer::from_path(path).map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let mut sink = Self {
            path: path.to_path_buf(),
            writer,
        };
        sink.write(header)?;
        Ok(sink)
    }

    fn write<I, T>(&mut self, record: I) -> Result<(), DatasetError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(record)
            .map_err(|source| DatasetError::Csv {
                path: self.path.clone(),
                source,
            })?;
        self.writer.flush().map_err(|source| DatasetError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// The two output CSVs of a run.
pub struct OutputDatasets {
    good: CsvSink,
    issues: CsvSink,
}

impl OutputDatasets {
    /// Creates (or overwrites) both files and writes their headers.
    pub fn create(
        good_path: &Path,
        issues_path: &Path,
        input_headers: &[String],
    ) -> Result<Self, DatasetError> {
        let good_header: Vec<&str> = input_headers.iter().map(String::as_str).collect();
        let issues_header: Vec<&str> = good_header
            .iter()
            .copied()
            .chain(ISSUE_COLUMNS)
            .collect();

        Ok(Self {
            good: CsvSink::create(good_path, &good_header)?,
            issues: CsvSink::create(issues_path, &issues_header)?,
        })
    }

    /// Appends `row` to the dataset its verdict belongs to.
    ///
    /// Clean rows are copied unchanged. Issue rows get the joined labels, and
    /// parse errors additionally the raw model response.
    pub fn record(&mut self, row: &[String], verdict: &Verdict) -> Result<Destination, DatasetError> {
        let destination = Destination::for_status(verdict.status);
        match destination {
            Destination::Good => self.good.write(row)?,
            Destination::Issues => {
                let raw = match verdict.status {
                    VerdictStatus::ParseError => verdict.raw_response.as_str(),
                    _ => "",
                };
                let issues = verdict.issues_column();
                let bias = verdict.bias_column();
                let record = row
                    .iter()
                    .map(String::as_str)
                    .chain([issues.as_str(), bias.as_str(), raw]);
                self.issues.write(record)?;
            }
        }
        Ok(destination)
    }
}
