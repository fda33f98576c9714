//! Input CSV loading.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::DatasetError;

/// A CSV file held in memory: the header plus every row, short rows padded
/// to the header's width.
#[derive(Debug, Clone)]
pub struct InputTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl InputTable {
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, path)
    }

    /// Reads CSV from any source; `path` is only used in error messages.
    ///
    /// A row with more fields than the header is rejected, since its extra
    /// values would have no column in the outputs.
    pub fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self, DatasetError> {
        let csv_error = |source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(DatasetError::MissingHeader(path.to_path_buf()));
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            if record.len() > headers.len() {
                return Err(DatasetError::RaggedRow {
                    path: path.to_path_buf(),
                    row: index,
                    fields: record.len(),
                    expected: headers.len(),
                });
            }
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header indices of the columns to show the model. `None` selects all
    /// columns; unknown names are an error.
    pub fn column_indices(&self, columns: Option<&[String]>) -> Result<Vec<usize>, DatasetError> {
        match columns {
            None => Ok((0..self.headers.len()).collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    self.headers
                        .iter()
                        .position(|h| h == name)
                        .ok_or_else(|| DatasetError::UnknownColumn(name.clone()))
                })
                .collect(),
        }
    }

    /// `(column, value)` pairs of `row` for the given indices.
    pub fn fields<'a>(&'a self, row: &'a [String], indices: &[usize]) -> Vec<(&'a str, &'a str)> {
        indices
            .iter()
            .map(|&i| (self.headers[i].as_str(), row[i].as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> InputTable {
        InputTable::from_reader(csv.as_bytes(), Path::new("input.csv")).expect("valid csv")
    }

    #[test]
    fn test_reads_header_and_rows() {
        let t = table("source,target\nHello,Bonjour\n\"a, b\",\"c\nd\"\n");
        assert_eq!(t.headers(), ["source", "target"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[1], vec!["a, b", "c\nd"]);
    }

    #[test]
    fn test_short_rows_padded() {
        let t = table("a,b,c\n1\n");
        assert_eq!(t.rows()[0], vec!["1", "", ""]);
    }

    #[test]
    fn test_long_rows_rejected() {
        let err = InputTable::from_reader("a,b\n1,2\n3,4,5\n".as_bytes(), Path::new("input.csv"))
            .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::RaggedRow { row: 1, fields: 3, expected: 2, .. }
        ));
        assert_eq!(
            err.to_string(),
            "Row 1 of 'input.csv' has 3 fields but the header has 2"
        );
    }

    #[test]
    fn test_column_selection() {
        let t = table("id,source,target\n1,x,y\n");
        assert_eq!(t.column_indices(None).expect("all"), vec![0, 1, 2]);

        let picked = t
            .column_indices(Some(&["target".to_string(), "source".to_string()]))
            .expect("known");
        assert_eq!(picked, vec![2, 1]);
        assert_eq!(t.fields(&t.rows()[0], &picked), vec![("target", "y"), ("source", "x")]);

        let err = t.column_indices(Some(&["missing".to_string()])).unwrap_err();
        assert!(matches!(err, DatasetError::UnknownColumn(name) if name == "missing"));
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = InputTable::from_reader("".as_bytes(), Path::new("empty.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::MissingHeader(_)));
    }

    #[test]
    fn test_header_only_has_no_rows() {
        let t = table("a,b\n");
        assert!(t.is_empty());
    }
}
