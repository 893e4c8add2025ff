use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use log::debug;
use memchr::memchr_iter;

use crate::error::{Result, TaxaplotError};

const BUFFER_SIZE: usize = 256 * 1024;
const TAB_CHAR: u8 = b'\t';
const NEWLINE_CHAR: u8 = b'\n';
const CR_CHAR: u8 = b'\r';

/// A taxa × samples count table as read from a classic biom-style TSV.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    /// Name of the taxonomy column
    pub tax_col: String,
    /// Every non-taxonomy column, in header order
    pub sample_columns: Vec<String>,
    /// One taxonomy string per row
    pub taxonomy: Vec<String>,
    /// `rows × sample_columns` values
    pub values: Vec<Vec<f64>>,
}

impl AbundanceTable {
    pub fn num_rows(&self) -> usize {
        self.taxonomy.len()
    }

    /// Resolves the columns to plot.
    ///
    /// With no explicit list every sample column is used, in header order.
    pub fn select_samples(&self, requested: Option<&[String]>) -> Result<Vec<usize>> {
        let Some(requested) = requested else {
            return Ok((0..self.sample_columns.len()).collect());
        };

        let mut indices = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        for name in requested {
            match self.sample_columns.iter().position(|c| c == name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(TaxaplotError::MissingSamples(missing));
        }
        Ok(indices)
    }
}

// Block reader that hands out one line at a time without the trailing newline
struct LineReader<R: Read> {
    buffer: Box<[u8]>,
    pos: usize,
    cap: usize,
    source: R,
}

impl<R: Read> LineReader<R> {
    fn new(source: R) -> Self {
        Self {
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            cap: 0,
            source,
        }
    }

    fn fill_buffer(&mut self) -> std::io::Result<usize> {
        self.pos = 0;
        self.cap = self.source.read(&mut self.buffer)?;
        Ok(self.cap)
    }

    fn read_line(&mut self, line: &mut Vec<u8>) -> std::io::Result<bool> {
        line.clear();

        if self.pos >= self.cap && self.fill_buffer()? == 0 {
            return Ok(false);
        }

        loop {
            let chunk = &self.buffer[self.pos..self.cap];
            if let Some(offset) = memchr::memchr(NEWLINE_CHAR, chunk) {
                line.extend_from_slice(&chunk[..offset]);
                self.pos += offset + 1;
                break;
            }

            line.extend_from_slice(chunk);
            if self.fill_buffer()? == 0 {
                if line.is_empty() {
                    return Ok(false);
                }
                break;
            }
        }

        if line.last() == Some(&CR_CHAR) {
            line.pop();
        }
        Ok(true)
    }
}

/// Splits a line on tabs into borrowed fields.
#[inline(always)]
pub fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    let mut fields = Vec::with_capacity(16);
    let mut start = 0;
    for tab in memchr_iter(TAB_CHAR, line) {
        fields.push(&line[start..tab]);
        start = tab + 1;
    }
    fields.push(&line[start..]);
    fields
}

/// Parses a single abundance cell. Empty and NA-style cells count as zero.
#[inline(always)]
pub fn parse_value(field: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(field).ok()?.trim();
    match text {
        "" | "NA" | "NaN" | "nan" | "na" => Some(0.0),
        _ => fast_float::parse::<f64, _>(text).ok(),
    }
}

fn field_to_string(field: &[u8], line_no: usize) -> Result<String> {
    std::str::from_utf8(field)
        .map(|s| s.trim().to_string())
        .map_err(|_| TaxaplotError::Parse {
            line: line_no,
            message: "invalid UTF-8".to_string(),
        })
}

/// Reads a table from any reader. The first non-empty line is the header.
pub fn parse_table<R: Read>(source: R, tax_col: &str) -> Result<AbundanceTable> {
    let mut reader = LineReader::new(source);
    let mut line = Vec::with_capacity(1024);
    let mut line_no = 0;

    // Header
    let header = loop {
        if !reader.read_line(&mut line)? {
            return Err(TaxaplotError::Parse {
                line: line_no,
                message: "table is empty".to_string(),
            });
        }
        line_no += 1;
        if !line.iter().all(u8::is_ascii_whitespace) {
            break split_fields(&line)
                .into_iter()
                .map(|f| field_to_string(f, line_no))
                .collect::<Result<Vec<String>>>()?;
        }
    };

    let tax_idx = header
        .iter()
        .position(|c| c == tax_col)
        .ok_or_else(|| TaxaplotError::MissingColumn(tax_col.to_string()))?;
    let sample_columns: Vec<String> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != tax_idx)
        .map(|(_, c)| c.clone())
        .collect();

    let mut taxonomy = Vec::new();
    let mut values = Vec::new();

    while reader.read_line(&mut line)? {
        line_no += 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let fields = split_fields(&line);
        if fields.len() != header.len() {
            return Err(TaxaplotError::Parse {
                line: line_no,
                message: format!("expected {} fields, found {}", header.len(), fields.len()),
            });
        }

        let mut row = Vec::with_capacity(sample_columns.len());
        for (i, field) in fields.iter().enumerate() {
            if i == tax_idx {
                continue;
            }
            let value = parse_value(field).ok_or_else(|| TaxaplotError::Parse {
                line: line_no,
                message: format!(
                    "non-numeric value '{}' in column '{}'",
                    String::from_utf8_lossy(field),
                    header[i]
                ),
            })?;
            row.push(value);
        }

        taxonomy.push(field_to_string(fields[tax_idx], line_no)?);
        values.push(row);
    }

    Ok(AbundanceTable {
        tax_col: tax_col.to_string(),
        sample_columns,
        taxonomy,
        values,
    })
}

/// Reads a tab-separated abundance table from disk.
pub fn read_table<P: AsRef<Path>>(path: P, tax_col: &str) -> Result<AbundanceTable> {
    let start_time = Instant::now();
    let file = File::open(path.as_ref())?;
    let table = parse_table(file, tax_col)?;
    debug!(
        "Parsed {} rows x {} samples from {} in {:.6} seconds",
        table.num_rows(),
        table.sample_columns.len(),
        path.as_ref().display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(table)
}

/// Reads a list of sample names, one per line.
pub fn read_sample_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}
