//! CSV reading and writing for attribute tables.
//!
//! Delimiters resolve from the file extension (`.tsv` means tab) unless
//! overridden, and input bytes are decoded through `encoding_rs`, defaulting
//! to UTF-8. Empty fields load as missing values.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    data::parse_cell,
    error::{ImputeError, Result},
    frame::{AttributeTable, RowId},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Accepts a literal single ASCII character or one of the names
/// `tab`, `comma`, `pipe`, `semicolon`.
pub fn parse_delimiter(value: &str) -> std::result::Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes()).ok_or_else(|| {
            ImputeError::Configuration(format!("unknown input encoding '{value}'"))
        }),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Read options shared by every table of one configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

impl ReadOptions {
    pub fn new(delimiter: Option<&str>, encoding: Option<&str>) -> Result<Self> {
        let delimiter = delimiter
            .map(parse_delimiter)
            .transpose()
            .map_err(ImputeError::Configuration)?;
        Ok(Self {
            delimiter,
            encoding: resolve_encoding(encoding)?,
        })
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

fn decode_field(bytes: &[u8], encoding: &'static Encoding, path: &Path) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ImputeError::Configuration(format!(
            "{path:?} is not valid {} text",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
    path: &Path,
) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_field(field, encoding, path))
        .collect()
}

/// Loads a CSV table. Row identities are the zero-based data row positions.
pub fn read_table(path: &Path, options: ReadOptions) -> Result<AttributeTable> {
    let delimiter = resolve_input_delimiter(path, options.delimiter);
    let file = File::open(path).map_err(|e| ImputeError::io(path, e))?;
    let mut reader = open_csv_reader(BufReader::new(file), delimiter);
    let headers = reader
        .byte_headers()
        .map_err(|e| ImputeError::csv(path, e))?
        .clone();
    let columns = decode_record(&headers, options.encoding, path)?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    let mut table = AttributeTable::new(columns)
        .map_err(|e| ImputeError::Configuration(format!("{path:?}: {e}")))?;

    let mut record = csv::ByteRecord::new();
    let mut id: RowId = 0;
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| ImputeError::csv(path, e))?
    {
        let values = decode_record(&record, options.encoding, path)?
            .iter()
            .map(|raw| parse_cell(raw))
            .collect();
        table
            .push(id, values)
            .map_err(|e| ImputeError::Configuration(format!("{path:?}: {e}")))?;
        id += 1;
    }
    debug!(
        "Loaded {} row(s) x {} column(s) from {:?}",
        table.len(),
        table.columns().len(),
        path
    );
    Ok(table)
}

/// Writes `table` as UTF-8 CSV; missing cells are empty fields.
pub fn write_table_csv(table: &AttributeTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ImputeError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| ImputeError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(resolve_input_delimiter(path, None))
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .from_writer(BufWriter::new(file));
    writer
        .write_record(table.columns())
        .map_err(|e| ImputeError::csv(path, e))?;
    for record in table.records() {
        writer
            .write_record(record.values.iter().map(|v| match v {
                Some(value) => value.as_display(),
                None => String::new(),
            }))
            .map_err(|e| ImputeError::csv(path, e))?;
    }
    writer
        .flush()
        .map_err(|e| ImputeError::io(path, e))?;
    Ok(())
}

/// Serializes `value` as pretty JSON.
pub fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| ImputeError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| ImputeError::io(path, e.into()))?;
    writer.write_all(b"\n").map_err(|e| ImputeError::io(path, e))?;
    writer.flush().map_err(|e| ImputeError::io(path, e))
}
