use crate::errors::{DataError, Result};
use csv::{ReaderBuilder, Trim};
use log::debug;
use matfile::{MatFile, NumericData};
use ndarray::{Array2, ShapeBuilder};
use ndarray_npy::read_npy;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Name of the matrix read from `.mat` files
pub const MAT_VARIABLE: &str = "data";

/// Field separator of delimited text files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delimiter {
    /// `,`
    #[default]
    Comma,
    /// `;`
    Semicolon,
    /// `\t`
    Tab,
    /// Any run of spaces or tabs
    Whitespace,
}

impl FromStr for Delimiter {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "," | "comma" => Ok(Delimiter::Comma),
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            "\t" | "tab" => Ok(Delimiter::Tab),
            " " | "whitespace" => Ok(Delimiter::Whitespace),
            _ => Err(DataError::Parse(format!("Unknown delimiter '{s}'"))),
        }
    }
}

/// Options to read delimited text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field separator
    pub delimiter: Delimiter,
    /// Whether the first row is a header, detected from its content when `None`
    pub header: Option<bool>,
}

/// Load a numeric matrix from `.npy` or delimited text with default [CsvOptions]
pub fn load_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    load_matrix_with(path, &CsvOptions::default())
}

/// Load a numeric matrix from its file extension:
/// * `.npy` files are read with `ndarray-npy`,
/// * `.mat` files (MATLAB level 5) are read with `matfile`, the matrix being the
///   [MAT_VARIABLE] variable,
/// * any other file is parsed as delimited text.
pub fn load_matrix_with(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());
    let matrix = match extension.as_deref() {
        Some("npy") => check_finite(path, read_npy(path)?)?,
        Some("mat") => check_finite(path, read_mat(path)?)?,
        _ => parse_delimited(File::open(path)?, options)?,
    };
    if matrix.is_empty() {
        return Err(DataError::Empty(path.display().to_string()));
    }
    debug!(
        "Loaded {} ({} x {})",
        path.display(),
        matrix.nrows(),
        matrix.ncols()
    );
    Ok(matrix)
}

fn check_finite(path: &Path, matrix: Array2<f64>) -> Result<Array2<f64>> {
    if let Some(((row, col), v)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(DataError::Parse(format!(
            "{}: non finite value {v} at row {}, column {}",
            path.display(),
            row + 1,
            col + 1
        )));
    }
    Ok(matrix)
}

/// Read the [MAT_VARIABLE] double matrix of a MATLAB `.mat` file
pub fn read_mat(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let path = path.as_ref();
    let mat = MatFile::parse(BufReader::new(File::open(path)?))
        .map_err(|err| DataError::Mat(format!("{}: {err:?}", path.display())))?;
    let array = mat.find_by_name(MAT_VARIABLE).ok_or_else(|| {
        DataError::Mat(format!(
            "{}: no '{MAT_VARIABLE}' variable",
            path.display()
        ))
    })?;
    let (nrows, ncols) = match array.size()[..] {
        [nrows, ncols] => (nrows, ncols),
        ref size => {
            return Err(DataError::Shape(format!(
                "'{MAT_VARIABLE}' should be a matrix, got size {size:?}"
            )));
        }
    };
    match array.data() {
        // MATLAB arrays are stored column major
        NumericData::Double { real, .. } => {
            Array2::from_shape_vec((nrows, ncols).f(), real.clone())
                .map_err(|e| DataError::Shape(e.to_string()))
        }
        _ => Err(DataError::Mat(format!(
            "{}: '{MAT_VARIABLE}' is not a double matrix",
            path.display()
        ))),
    }
}

/// Parse delimited text into a numeric matrix
pub fn parse_delimited<R: Read>(reader: R, options: &CsvOptions) -> Result<Array2<f64>> {
    let records: Vec<Vec<String>> = match options.delimiter {
        Delimiter::Whitespace => BufReader::new(reader)
            .lines()
            .map(|line| -> Result<Vec<String>> {
                Ok(line?.split_whitespace().map(String::from).collect())
            })
            .collect::<Result<_>>()?,
        delimiter => {
            let sep = match delimiter {
                Delimiter::Semicolon => b';',
                Delimiter::Tab => b'\t',
                _ => b',',
            };
            let mut reader = ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .trim(Trim::All)
                .delimiter(sep)
                .from_reader(reader);
            reader
                .records()
                .map(|record| -> Result<Vec<String>> {
                    Ok(record?.iter().map(String::from).collect())
                })
                .collect::<Result<_>>()?
        }
    };
    records_to_matrix(records, options.header)
}

fn is_numeric_record(record: &[String]) -> bool {
    record.iter().all(|cell| cell.parse::<f64>().is_ok())
}

fn records_to_matrix(records: Vec<Vec<String>>, header: Option<bool>) -> Result<Array2<f64>> {
    let mut rows = records
        .into_iter()
        .enumerate()
        .filter(|(_, r)| r.iter().any(|cell| !cell.is_empty()))
        .peekable();
    let skip_header = match (header, rows.peek()) {
        (Some(h), _) => h,
        (None, Some((_, first))) => !is_numeric_record(first),
        (None, None) => false,
    };
    if skip_header && let Some((_, names)) = rows.next() {
        debug!("Skipping header {names:?}");
    }

    let mut ncols = None;
    let mut nrows = 0;
    let mut values = Vec::new();
    for (index, record) in rows {
        let expected = *ncols.get_or_insert(record.len());
        if record.len() != expected {
            return Err(DataError::Parse(format!(
                "record {}: expected {expected} fields, got {}",
                index + 1,
                record.len()
            )));
        }
        for (col, cell) in record.iter().enumerate() {
            let v = cell.parse::<f64>().map_err(|_| {
                DataError::Parse(format!(
                    "record {}, field {}: cannot parse '{cell}' as a number",
                    index + 1,
                    col + 1
                ))
            })?;
            if !v.is_finite() {
                return Err(DataError::Parse(format!(
                    "record {}, field {}: non finite value '{cell}'",
                    index + 1,
                    col + 1
                )));
            }
            values.push(v);
        }
        nrows += 1;
    }
    let ncols = ncols.ok_or_else(|| DataError::Empty("no data rows".to_string()))?;
    Array2::from_shape_vec((nrows, ncols), values).map_err(|e| DataError::Shape(e.to_string()))
}
