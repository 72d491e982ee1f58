// Tabular file reader: delimited text and first-sheet spreadsheets

use crate::data::{Row, Schema, Value};
use crate::error::{PipelineError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::debug;
use std::io::Cursor;
use std::path::Path;

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Header row followed by comma separated data rows.
    Delimited,
    /// Binary workbook; only the first sheet is read.
    Spreadsheet,
}

impl Format {
    /// Pick the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Format> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if ext == "csv" {
            Ok(Format::Delimited)
        } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Format::Spreadsheet)
        } else {
            Err(PipelineError::UnsupportedFormat { extension: ext })
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Zero-based sheet row holding the header. Rows above it are ignored.
    pub sheet_header_row: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { sheet_header_row: 1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

/// Parse raw file bytes into a schema and its rows, in file order.
pub fn parse(bytes: &[u8], format: Format, options: &ParseOptions) -> Result<Table> {
    let table = match format {
        Format::Delimited => parse_delimited(bytes)?,
        Format::Spreadsheet => parse_spreadsheet(bytes, options)?,
    };

    if table.rows.is_empty() {
        return Err(PipelineError::malformed("file contains no data rows"));
    }

    debug!(
        "parsed {} rows with {} columns",
        table.rows.len(),
        table.schema.len()
    );
    Ok(table)
}

fn parse_delimited(bytes: &[u8]) -> Result<Table> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let raw_headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::malformed("missing header row"));
    }
    let schema = Schema::from_raw_headers(&raw_headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = schema.row_from_values(record.iter().map(Value::text).collect());
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(Table { schema, rows })
}

fn parse_spreadsheet(bytes: &[u8], options: &ParseOptions) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Err(PipelineError::malformed("workbook has no sheets")),
    };

    // Range rows are relative to the first used cell, not the sheet origin.
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let skip = options.sheet_header_row.saturating_sub(first_row);
    let mut sheet_rows = range.rows().skip(skip);

    let header_cells = sheet_rows
        .next()
        .ok_or_else(|| PipelineError::malformed("header row not found"))?;
    let raw_headers: Vec<String> = header_cells.iter().map(cell_header).collect();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(PipelineError::malformed("header row is empty"));
    }
    let schema = Schema::from_raw_headers(&raw_headers);

    let mut rows = Vec::new();
    for cells in sheet_rows {
        let row = schema.row_from_values(cells.iter().map(cell_value).collect());
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(Table { schema, rows })
}

fn cell_header(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Empty,
        Data::Int(v) => Value::Number(*v as f64),
        Data::Float(v) if v.is_finite() => Value::Number(*v),
        Data::String(s) => Value::text(s.clone()),
        other => Value::text(other.to_string()),
    }
}
