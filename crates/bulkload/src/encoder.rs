//! Batch slicing and CSV transfer encoding
//!
//! Rows are cut into contiguous batches of at most `batch_size` rows and each
//! batch is encoded on demand, so only one encoded payload exists at a time.
//!
//! The payload is RFC 4180 CSV as read by `COPY ... WITH (FORMAT csv)`:
//! - NULL is an unquoted empty field
//! - an empty string is `""`, keeping it distinct from NULL
//! - fields containing the delimiter, a quote, CR or LF are quoted with
//!   embedded quotes doubled
//! - a field that is exactly `\.` is quoted so the server does not read it
//!   as the end-of-data marker

use bytes::Bytes;

use crate::config::LoadOptions;
use crate::error::{Error, Result};
use crate::types::Value;

const DELIMITER: char = ',';
const QUOTE: char = '"';
const LINE_ENDING: &str = "\n";

/// Slices rows into batches
#[derive(Debug, Clone, Copy)]
pub struct BatchEncoder {
    batch_size: usize,
}

impl BatchEncoder {
    /// Create an encoder; a zero batch size is rejected
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("batch size must be at least 1"));
        }
        Ok(Self { batch_size })
    }

    /// Create an encoder from validated load options
    pub fn from_options(options: &LoadOptions) -> Result<Self> {
        options.check()?;
        Self::new(options.batch_size)
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `row_count` rows split into
    pub fn batch_count(&self, row_count: usize) -> usize {
        row_count.div_ceil(self.batch_size)
    }

    /// Iterate over batches in row order
    pub fn batches<'a>(&self, rows: &'a [Vec<Value>]) -> impl Iterator<Item = Batch<'a>> + 'a {
        rows.chunks(self.batch_size)
            .enumerate()
            .map(|(index, rows)| Batch { index, rows })
    }
}

/// A contiguous slice of rows; the unit of encoding and of failure
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    index: usize,
    rows: &'a [Vec<Value>],
}

impl<'a> Batch<'a> {
    /// Zero-based position of the batch
    pub fn index(&self) -> usize {
        self.index
    }

    /// Rows in the batch
    pub fn rows(&self) -> &'a [Vec<Value>] {
        self.rows
    }

    /// Number of rows in the batch
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Encode the batch as a CSV payload
    pub fn encode(&self) -> Result<Bytes> {
        encode_rows(self.rows)
            .map_err(|e| Error::encode(format!("batch {}: {}", self.index, e)))
    }
}

/// Encode rows as a CSV payload without a header line
pub fn encode_rows(rows: &[Vec<Value>]) -> Result<Bytes> {
    let mut out = String::new();
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            if col_idx > 0 {
                out.push(DELIMITER);
            }
            write_field(&mut out, value)
                .map_err(|e| Error::encode(format!("row {}, column {}: {}", row_idx, col_idx, e)))?;
        }
        out.push_str(LINE_ENDING);
    }
    Ok(Bytes::from(out))
}

fn write_field(out: &mut String, value: &Value) -> Result<()> {
    let Some(text) = value.to_text() else {
        return Ok(());
    };

    if text.contains('\0') {
        return Err(Error::encode("text contains a NUL byte"));
    }

    let needs_quoting = text.is_empty()
        || text == "\\."
        || text.contains(DELIMITER)
        || text.contains(QUOTE)
        || text.contains('\n')
        || text.contains('\r');

    if needs_quoting {
        out.push(QUOTE);
        out.push_str(&text.replace(QUOTE, "\"\""));
        out.push(QUOTE);
    } else {
        out.push_str(&text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(row: Vec<Value>) -> String {
        let bytes = encode_rows(&[row]).unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_null_vs_empty_string() {
        assert_eq!(encode(vec![Value::Null, Value::from("")]), ",\"\"\n");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(encode(vec![Value::from("a,b")]), "\"a,b\"\n");
        assert_eq!(encode(vec![Value::from("say \"hi\"")]), "\"say \"\"hi\"\"\"\n");
        assert_eq!(encode(vec![Value::from("line\nbreak")]), "\"line\nbreak\"\n");
        assert_eq!(encode(vec![Value::from("plain")]), "plain\n");
    }

    #[test]
    fn test_end_of_data_marker_quoted() {
        assert_eq!(encode(vec![Value::from("\\.")]), "\"\\.\"\n");
    }

    #[test]
    fn test_nul_rejected() {
        let err = encode_rows(&[vec![Value::from("a\0b")]]).unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }

    #[test]
    fn test_batches_cover_rows_in_order() {
        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::Int32(i)]).collect();
        let encoder = BatchEncoder::new(2).unwrap();

        let sizes: Vec<usize> = encoder.batches(&rows).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(encoder.batch_count(rows.len()), 3);
        assert_eq!(encoder.batch_count(0), 0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchEncoder::new(0).is_err());
    }
}
