//! A small string-typed table used for every CSV the pipeline reads back:
//! the kit metadata sheet, merged per-kit files and joined files.
//!
//! Parsing and serialisation go through polars; cells are kept as
//! `Option<String>` so values round-trip exactly as written, and an empty
//! cell is `None`.

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to parse CSV file '{0}'")]
    CsvRead(PathBuf, #[source] PolarsError),

    #[error("Failed to write CSV file '{0}'")]
    CsvWrite(PathBuf, #[source] PolarsError),

    #[error("Failed to create CSV file '{0}'")]
    FileCreate(PathBuf, #[source] std::io::Error),

    #[error("Column '{column}' not found in '{path}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Failed to build table for '{0}'")]
    Frame(PathBuf, #[source] PolarsError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl CsvTable {
    /// Creates a table from a header row and data rows. Rows are padded or
    /// truncated to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Reads a comma separated file with a header row.
    pub fn read(path: &Path) -> Result<Self, TableError> {
        Self::read_with_separator(path, b',')
    }

    pub fn read_with_separator(path: &Path, separator: u8) -> Result<Self, TableError> {
        // A schema inference length of zero reads every column as a string.
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .map_parse_options(|options| options.with_separator(separator))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .map_err(|e| TableError::CsvRead(path.to_path_buf(), e))?
            .finish()
            .map_err(|e| TableError::CsvRead(path.to_path_buf(), e))?;
        Self::from_dataframe(&df).map_err(|e| TableError::CsvRead(path.to_path_buf(), e))
    }

    fn from_dataframe(df: &DataFrame) -> PolarsResult<Self> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut rows = vec![vec![None; headers.len()]; df.height()];
        for (c, column) in df.get_columns().iter().enumerate() {
            let column = column.cast(&DataType::String)?;
            let values = column.str()?;
            for (r, value) in values.into_iter().enumerate() {
                rows[r][c] = value.filter(|v| !v.is_empty()).map(str::to_string);
            }
        }
        Ok(Self { headers, rows })
    }

    fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .headers
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let values: Vec<Option<&str>> =
                    self.rows.iter().map(|row| row[c].as_deref()).collect();
                Column::new(name.as_str().into(), values)
            })
            .collect();
        DataFrame::new(columns)
    }

    /// Writes the table as a comma separated file, overwriting `path`.
    pub fn write(&self, path: &Path) -> Result<(), TableError> {
        self.write_with_separator(path, b',')
    }

    pub fn write_with_separator(&self, path: &Path, separator: u8) -> Result<(), TableError> {
        let mut df = self
            .to_dataframe()
            .map_err(|e| TableError::Frame(path.to_path_buf(), e))?;
        let mut file =
            File::create(path).map_err(|e| TableError::FileCreate(path.to_path_buf(), e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(separator)
            .finish(&mut df)
            .map_err(|e| TableError::CsvWrite(path.to_path_buf(), e))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Like [`CsvTable::column_index`], but ignores ASCII case.
    pub fn column_index_ignore_case(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
    }

    /// Index of a column that must exist, reported against `path` otherwise.
    pub fn require_column(&self, name: &str, path: &Path) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    }

    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    pub fn set(&mut self, row: usize, column: usize, value: Option<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    /// Inserts an empty column at `position` (clamped to the table width) and
    /// returns the index it landed at.
    pub fn insert_column(&mut self, position: usize, name: &str) -> usize {
        let position = position.min(self.headers.len());
        self.headers.insert(position, name.to_string());
        for row in &mut self.rows {
            row.insert(position, None);
        }
        position
    }

    /// Index of `name`, appending an empty column when it does not exist yet.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        match self.column_index(name) {
            Some(index) => index,
            None => self.insert_column(self.headers.len(), name),
        }
    }

    /// Stable sort of the data rows by a key derived from each row.
    pub fn sort_rows_by_key<K: Ord>(&mut self, mut key: impl FnMut(&[Option<String>]) -> K) {
        self.rows.sort_by_cached_key(|row| key(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cell(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn write_then_read_preserves_cells_and_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.csv");
        let table = CsvTable::new(
            vec!["Kit ID".into(), "Date".into(), "TD".into()],
            vec![
                vec![cell("12"), cell("02/13/2024"), None],
                vec![cell("7"), cell("01/01/2023 08:30:00"), cell("__")],
            ],
        );
        table.write(&path).unwrap();

        let read = CsvTable::read(&path).unwrap();
        assert_eq!(read, table);
        assert_eq!(read.get(0, 2), None);
        assert_eq!(read.get(1, 2), Some("__"));
    }

    #[test]
    fn numeric_looking_cells_stay_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.csv");
        std::fs::write(&path, "a,b\n007,1.50\n").unwrap();
        let read = CsvTable::read(&path).unwrap();
        assert_eq!(read.get(0, 0), Some("007"));
        assert_eq!(read.get(0, 1), Some("1.50"));
    }

    #[test]
    fn tab_separated_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("joined.tsv");
        let table = CsvTable::new(
            vec!["Coordination".into()],
            vec![vec![cell("31.2, 34.8")]],
        );
        table.write_with_separator(&path, b'\t').unwrap();
        let read = CsvTable::read_with_separator(&path, b'\t').unwrap();
        assert_eq!(read.get(0, 0), Some("31.2, 34.8"));
    }

    #[test]
    fn insert_and_ensure_columns() {
        let mut table = CsvTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![cell("1"), cell("2")]],
        );
        assert_eq!(table.insert_column(1, "x"), 1);
        assert_eq!(table.headers(), ["a", "x", "b"]);
        assert_eq!(table.get(0, 2), Some("2"));
        assert_eq!(table.insert_column(99, "tail"), 3);
        assert_eq!(table.ensure_column("a"), 0);
        assert_eq!(table.ensure_column("new"), 4);
        assert_eq!(table.width(), 5);
        assert_eq!(table.rows()[0].len(), 5);
    }

    #[test]
    fn require_column_reports_missing_name() {
        let table = CsvTable::new(vec!["a".into()], vec![]);
        let err = table.require_column("Kit ID", Path::new("meta.csv")).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn { column, .. } if column == "Kit ID"));
    }
}
