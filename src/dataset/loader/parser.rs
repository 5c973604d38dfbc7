//! Row parsers for CSV, TSV and LibSVM text data.
//!
//! A parser turns one line into sparse `(column, value)` pairs plus the
//! label. Column indices exclude the label column: columns after it shift
//! down by one.

use crate::core::error::{LightGBMError, Result};
use crate::core::meta::K_ZERO_THRESHOLD;
use crate::core::utils::Common;
use crate::dataset::loader::text_reader::TextReader;

/// Parses one text line into features and a label.
pub trait Parser: Send + Sync {
    /// Fill `features` with the non-zero (or NaN) values of `line`.
    /// `features` is cleared first; `label` is left alone without a label column.
    fn parse_one_line(&self, line: &str, features: &mut Vec<(i32, f64)>, label: &mut f64) -> Result<()>;

    /// Short name of the format
    fn name(&self) -> &'static str;
}

#[inline]
fn keep(value: f64) -> bool {
    value.abs() > K_ZERO_THRESHOLD || value.is_nan()
}

/// `"1.5"` reads as `1.5`, the way csv writers quote fields
#[inline]
fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

fn parse_delimited(
    line: &str,
    delimiter: char,
    label_idx: i32,
    features: &mut Vec<(i32, f64)>,
    label: &mut f64,
) -> Result<()> {
    features.clear();
    let mut offset = 0i32;
    for (idx, token) in line.split(delimiter).enumerate() {
        let idx = idx as i32;
        let value = Common::atof(unquote(Common::trim(token)))?;
        if idx == label_idx {
            *label = value;
            offset = -1;
        } else if keep(value) {
            features.push((idx + offset, value));
        }
    }
    Ok(())
}

/// Comma separated values
#[derive(Debug, Clone)]
pub struct CsvParser {
    label_idx: i32,
}

impl CsvParser {
    pub fn new(label_idx: i32) -> Self {
        CsvParser { label_idx }
    }
}

impl Parser for CsvParser {
    fn parse_one_line(&self, line: &str, features: &mut Vec<(i32, f64)>, label: &mut f64) -> Result<()> {
        parse_delimited(line, ',', self.label_idx, features, label)
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}

/// Tab separated values
#[derive(Debug, Clone)]
pub struct TsvParser {
    label_idx: i32,
}

impl TsvParser {
    pub fn new(label_idx: i32) -> Self {
        TsvParser { label_idx }
    }
}

impl Parser for TsvParser {
    fn parse_one_line(&self, line: &str, features: &mut Vec<(i32, f64)>, label: &mut f64) -> Result<()> {
        parse_delimited(line, '\t', self.label_idx, features, label)
    }

    fn name(&self) -> &'static str {
        "tsv"
    }
}

/// `label idx:value idx:value ...`
#[derive(Debug, Clone)]
pub struct LibSvmParser {
    label_idx: i32,
}

impl LibSvmParser {
    pub fn new(label_idx: i32) -> Self {
        LibSvmParser { label_idx }
    }
}

impl Parser for LibSvmParser {
    fn parse_one_line(&self, line: &str, features: &mut Vec<(i32, f64)>, label: &mut f64) -> Result<()> {
        features.clear();
        let mut tokens = line.split_whitespace().peekable();
        if self.label_idx >= 0 {
            if let Some(first) = tokens.next() {
                *label = Common::atof(first)?;
            }
        } else if let Some(first) = tokens.peek() {
            // a leading value without ':' is still a label
            if !first.contains(':') {
                tokens.next();
            }
        }
        for token in tokens {
            let (idx, value) = token.split_once(':').ok_or_else(|| {
                LightGBMError::data_loading(format!("bad libsvm token \"{}\" in line \"{}\"", token, line))
            })?;
            let idx = Common::atoi_and_check(idx).ok_or_else(|| {
                LightGBMError::data_loading(format!("bad libsvm index \"{}\"", idx))
            })?;
            let value = Common::atof(value)?;
            if keep(value) {
                features.push((idx, value));
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "libsvm"
    }
}

/// Pick a parser from the first data line of `filename`.
///
/// `idx:value` pairs mean LibSVM, tabs mean TSV and commas mean CSV.
pub fn create_parser(filename: &str, has_header: bool, label_idx: i32) -> Result<Box<dyn Parser>> {
    let reader = TextReader::new(filename, has_header)?;
    let lines = reader.read_first_lines(1)?;
    let line = lines
        .first()
        .ok_or_else(|| LightGBMError::data_loading(format!("Data file {} is empty", filename)))?;
    let parser = detect_parser(line, label_idx).ok_or_else(|| {
        LightGBMError::data_loading(format!("Unknown format of training data in {}", filename))
    })?;
    log::debug!("Using {} parser for {}", parser.name(), filename);
    Ok(parser)
}

/// Parser for lines shaped like `line`, `None` when no format matches
pub fn detect_parser(line: &str, label_idx: i32) -> Option<Box<dyn Parser>> {
    let is_libsvm = line.split_whitespace().take(2).any(|t| t.contains(':'));
    if is_libsvm {
        Some(Box::new(LibSvmParser::new(label_idx)))
    } else if line.contains('\t') {
        Some(Box::new(TsvParser::new(label_idx)))
    } else if line.contains(',') {
        Some(Box::new(CsvParser::new(label_idx)))
    } else {
        None
    }
}
