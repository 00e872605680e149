//! Fixed-schema result tables with delimited-text persistence.
//!
//! A table is a `Dataset<R>` where `R: TableRow` declares its column names
//! and how one row maps to and from text fields. Two row types exist:
//! - [`RawResultRow`]: one evaluated run (`eval.csv`)
//! - [`SummaryRow`]: judged statistics of one condition (`eval_analyzed.csv`)
//!
//! File format:
//! - comma-separated, written through the `csv` writer
//! - header line prefixed with `#` so it doubles as a comment; with an index
//!   column the header starts with `#idx`, otherwise the first column name
//!   carries the `#`
//! - on load, `#` comments, blank lines and whitespace or comma separators are
//!   accepted; columns are mapped by header name when a header is present

mod raw;
mod summary;

pub use raw::{RawResultRow, RawResultsDataset, RAW_COLUMNS};
pub use summary::{SummaryDataset, SummaryRow, SUMMARY_COLUMNS};

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from loading, saving or building a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed dataset {origin}, line {line}: {reason}")]
    Format {
        origin: String,
        line: usize,
        reason: String,
    },

    #[error("duplicate row key: {0}")]
    DuplicateKey(String),
}

/// A row type with a fixed column schema.
pub trait TableRow: Sized {
    /// Uniqueness key of a row within a dataset.
    type Key: Ord + Clone + fmt::Debug + fmt::Display;

    /// Column names in file order.
    fn columns() -> &'static [&'static str];

    fn key(&self) -> Self::Key;

    /// Text fields in [`TableRow::columns`] order.
    fn to_record(&self) -> Vec<String>;

    /// Build a row from fields given in [`TableRow::columns`] order.
    fn from_record(fields: &[&str]) -> Result<Self, String>;
}

/// Options for [`Dataset::save`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Write a leading `#idx` column with the 0-based row position.
    pub include_index: bool,
}

impl SaveOptions {
    pub fn with_index() -> Self {
        Self {
            include_index: true,
        }
    }
}

/// Ordered rows with unique keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<R: TableRow> {
    rows: Vec<R>,
    keys: BTreeSet<R::Key>,
}

impl<R: TableRow> Default for Dataset<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            keys: BTreeSet::new(),
        }
    }
}

impl<R: TableRow> Dataset<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset, rejecting duplicate keys.
    pub fn from_rows(rows: impl IntoIterator<Item = R>) -> Result<Self, DatasetError> {
        let mut ds = Self::new();
        for row in rows {
            ds.push(row)?;
        }
        Ok(ds)
    }

    /// Append a row. A row whose key is already present is rejected.
    pub fn push(&mut self, row: R) -> Result<(), DatasetError> {
        let key = row.key();
        if !self.keys.insert(key.clone()) {
            return Err(DatasetError::DuplicateKey(key.to_string()));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn contains_key(&self, key: &R::Key) -> bool {
        self.keys.contains(key)
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    /// Write the dataset to `path`, creating the parent directory if needed.
    pub fn save(&self, path: &Path, options: SaveOptions) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = fs::File::create(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_to(file, options)?;
        log::debug!("saved {} rows to {}", self.len(), path.display());
        Ok(())
    }

    /// Render the dataset as text, as [`Dataset::save`] would write it.
    pub fn to_text(&self, options: SaveOptions) -> Result<String, DatasetError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, options)?;
        String::from_utf8(buf).map_err(|e| DatasetError::Format {
            origin: "<memory>".into(),
            line: 0,
            reason: e.to_string(),
        })
    }

    fn write_to<W: std::io::Write>(&self, out: W, options: SaveOptions) -> Result<(), DatasetError> {
        let mut wtr = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(out);

        let columns = R::columns();
        let mut header: Vec<String> = Vec::with_capacity(columns.len() + 1);
        if options.include_index {
            header.push("#idx".into());
            header.extend(columns.iter().map(|c| c.to_string()));
        } else {
            header.extend(columns.iter().map(|c| c.to_string()));
            header[0] = format!("#{}", header[0]);
        }
        wtr.write_record(&header)?;

        for (i, row) in self.rows.iter().enumerate() {
            let mut record = row.to_record();
            if options.include_index {
                record.insert(0, i.to_string());
            }
            wtr.write_record(&record)?;
        }
        wtr.flush().map_err(|e| DatasetError::Csv(e.into()))?;
        Ok(())
    }

    /// Load a dataset from `path`.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse dataset text; `origin` names the source in error messages.
    pub fn parse(text: &str, origin: &str) -> Result<Self, DatasetError> {
        let columns = R::columns();
        let format_err = |line: usize, reason: String| DatasetError::Format {
            origin: origin.to_string(),
            line,
            reason,
        };

        let mut layout: Option<Layout> = None;
        let mut ds = Self::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if layout.is_none() {
                if let Some(found) = Layout::from_header(line, columns).map_err(|r| format_err(line_no, r))? {
                    layout = Some(found);
                    continue;
                }
            }

            let content = line.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let fields = split_fields(content);
            if layout.is_none() {
                layout = Some(
                    Layout::positional(fields.len(), columns.len())
                        .map_err(|r| format_err(line_no, r))?,
                );
            }
            let Some(active) = layout.as_ref() else {
                continue;
            };
            if fields.len() != active.width {
                return Err(format_err(
                    line_no,
                    format!("expected {} fields, found {}", active.width, fields.len()),
                ));
            }

            let ordered: Vec<&str> = active.positions.iter().map(|p| fields[*p]).collect();
            let row = R::from_record(&ordered).map_err(|r| format_err(line_no, r))?;
            ds.push(row).map_err(|e| format_err(line_no, e.to_string()))?;
        }

        Ok(ds)
    }
}

impl<'a, R: TableRow> IntoIterator for &'a Dataset<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Where each schema column sits in a line of fields.
#[derive(Debug)]
struct Layout {
    positions: Vec<usize>,
    width: usize,
}

/// Header names that denote a leading row index rather than data.
const INDEX_NAMES: [&str; 3] = ["idx", "index", ""];

impl Layout {
    /// Interpret `line` as a header if it names any schema column.
    ///
    /// `Ok(None)` means the line is not a header (a plain comment or data).
    fn from_header(line: &str, columns: &[&str]) -> Result<Option<Self>, String> {
        let commented = line.starts_with('#');
        let body = line.trim_start_matches('#');
        let tokens: Vec<&str> = split_fields(body)
            .into_iter()
            .map(|t| t.trim_start_matches('#'))
            .collect();

        if !tokens.iter().any(|t| columns.contains(t)) {
            return Ok(None);
        }
        if !commented && tokens.iter().all(|t| t.parse::<f64>().is_ok()) {
            return Ok(None);
        }

        for (i, token) in tokens.iter().enumerate() {
            let is_index = i == 0 && INDEX_NAMES.contains(token);
            if !is_index && !columns.contains(token) {
                return Err(format!("unknown column '{token}'"));
            }
        }

        let mut positions = Vec::with_capacity(columns.len());
        for col in columns {
            let pos = tokens
                .iter()
                .position(|t| t == col)
                .ok_or_else(|| format!("missing column '{col}'"))?;
            positions.push(pos);
        }

        Ok(Some(Self {
            positions,
            width: tokens.len(),
        }))
    }

    /// Schema order without a header; one extra leading field is a row index.
    fn positional(width: usize, columns: usize) -> Result<Self, String> {
        let offset = if width == columns {
            0
        } else if width == columns + 1 {
            1
        } else {
            return Err(format!(
                "expected {columns} fields (or {} with index), found {width}",
                columns + 1
            ));
        };
        Ok(Self {
            positions: (offset..offset + columns).collect(),
            width,
        })
    }
}

/// Split on commas, and on whitespace inside each comma-separated piece.
fn split_fields(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for piece in line.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            out.push(piece);
        } else {
            out.extend(piece.split_whitespace());
        }
    }
    out
}

/// Parse a boolean cell: `True`/`False` in any case, or `1`/`0`.
pub(crate) fn parse_bool(field: &str) -> Option<bool> {
    match field.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_field<T: std::str::FromStr>(field: &str, column: &str) -> Result<T, String> {
    field
        .trim()
        .parse()
        .map_err(|_| format!("column '{column}': cannot parse '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_accepts_commas_and_whitespace() {
        assert_eq!(split_fields("1,2, 3"), ["1", "2", "3"]);
        assert_eq!(split_fields("1 2\t3"), ["1", "2", "3"]);
        assert_eq!(split_fields("a,,b"), ["a", "", "b"]);
    }

    #[test]
    fn header_maps_columns_by_name() {
        let layout = Layout::from_header("#b,a", &["a", "b"]).unwrap().unwrap();
        assert_eq!(layout.positions, vec![1, 0]);
        assert_eq!(layout.width, 2);
    }

    #[test]
    fn header_with_index_column() {
        let layout = Layout::from_header("#idx,a,b", &["a", "b"]).unwrap().unwrap();
        assert_eq!(layout.positions, vec![1, 2]);
        assert_eq!(layout.width, 3);
    }

    #[test]
    fn plain_comment_is_not_a_header() {
        assert!(Layout::from_header("# produced by a crawl", &["a", "b"])
            .unwrap()
            .is_none());
        assert!(Layout::from_header("1,2", &["a", "b"]).unwrap().is_none());
    }

    #[test]
    fn header_errors() {
        assert!(Layout::from_header("#a,c", &["a", "b"]).is_err());
        assert!(Layout::from_header("#a", &["a", "b"]).is_err());
    }

    #[test]
    fn positional_layouts() {
        assert_eq!(Layout::positional(2, 2).unwrap().positions, vec![0, 1]);
        assert_eq!(Layout::positional(3, 2).unwrap().positions, vec![1, 2]);
        assert!(Layout::positional(4, 2).is_err());
    }

    #[test]
    fn bool_cells() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
