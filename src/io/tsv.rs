//! Tab-separated text form of tuples, used by the command line job.
//!
//! One record per line, fields in schema order. `\N` is a null field;
//! backslash, tab, newline and carriage return inside strings are escaped.
//! Bytes are written as lowercase hex and enums by symbol. Object and nested
//! tuple fields have no text form.

use crate::{
    constants::TSV_NULL,
    core::{
        schema::{Field, FieldType},
        tuple::{Tuple, TupleRead},
        value::Value,
    },
    error::TupleError,
    utils::util::{try_exists, Result},
};
use flate2::read::MultiGzDecoder;
use std::{
    fmt::Write as _,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

pub fn open_input(path: &Path) -> Result<BufReader<Box<dyn Read + Send>>> {
    fn is_gzipped(path: &Path) -> bool {
        let path_str = path.to_string_lossy().to_lowercase();
        path_str.ends_with(".gz") || path_str.ends_with(".gzip")
    }
    try_exists(path)?;
    let file = File::open(path)
        .map_err(|error| crate::tuple_error!("Failed to open file {}: {error}", path.display()))?;
    if is_gzipped(path) {
        let gz_decoder = MultiGzDecoder::new(file);
        if gz_decoder.header().is_some() {
            Ok(BufReader::new(Box::new(gz_decoder)))
        } else {
            Err(TupleError::InvalidGzipHeader {
                path: path.to_path_buf(),
            })
        }
    } else {
        Ok(BufReader::new(Box::new(file)))
    }
}

/// Reads tuples of one schema from tab-separated lines. Blank lines are skipped.
pub struct TsvReader<R> {
    reader: R,
    path: PathBuf,
    line: usize,
    buf: String,
}

impl TsvReader<BufReader<Box<dyn Read + Send>>> {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(open_input(path)?, path))
    }
}

impl<R: BufRead> TsvReader<R> {
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            line: 0,
            buf: String::new(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Fills `tuple` from the next record; `false` at end of input.
    pub fn read_tuple(&mut self, tuple: &mut Tuple) -> Result<bool> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(false);
            }
            self.line += 1;
            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return parse_line(line, tuple)
                .map(|()| true)
                .map_err(|e| TupleError::InvalidTsvLine {
                    path: self.path.clone(),
                    line: self.line,
                    reason: e.to_string(),
                });
        }
    }
}

pub fn parse_line(line: &str, tuple: &mut Tuple) -> Result<()> {
    let schema = tuple.schema().clone();
    let mut columns = line.split('\t');
    for (i, field) in schema.fields().iter().enumerate() {
        let text = columns.next().ok_or_else(|| {
            crate::tuple_error!(
                "expected {} columns for schema '{}', found {}",
                schema.len(),
                schema.name(),
                i
            )
        })?;
        if text == TSV_NULL {
            if !field.is_nullable() {
                return Err(TupleError::NullNotAllowed {
                    field: field.name().to_string(),
                });
            }
            tuple.unset(i);
            continue;
        }
        tuple.set(i, parse_value(field, text)?)?;
    }
    if columns.next().is_some() {
        return Err(crate::tuple_error!(
            "more than {} columns for schema '{}'",
            schema.len(),
            schema.name()
        ));
    }
    Ok(())
}

fn parse_value(field: &Field, text: &str) -> Result<Value> {
    let invalid = |reason: &dyn std::fmt::Display| {
        crate::tuple_error!("field '{}': cannot parse '{text}': {reason}", field.name())
    };
    let value = match field.field_type() {
        FieldType::Int | FieldType::VInt => Value::Int(text.parse().map_err(|e| invalid(&e))?),
        FieldType::Long | FieldType::VLong => Value::Long(text.parse().map_err(|e| invalid(&e))?),
        FieldType::Float => Value::Float(text.parse().map_err(|e| invalid(&e))?),
        FieldType::Double => Value::Double(text.parse().map_err(|e| invalid(&e))?),
        FieldType::Boolean => Value::Boolean(text.parse().map_err(|e| invalid(&e))?),
        FieldType::String => Value::String(unescape(text).map_err(|e| invalid(&e))?),
        FieldType::Bytes => Value::Bytes(decode_hex(text).map_err(|e| invalid(&e))?),
        FieldType::Enum(enum_type) => Value::Enum(enum_type.ordinal_of(text).ok_or_else(|| {
            TupleError::UnknownEnumSymbol {
                name: enum_type.name.clone(),
                symbol: text.to_string(),
            }
        })?),
        FieldType::Object(_) | FieldType::Tuple(_) => {
            return Err(crate::tuple_error!(
                "field '{}' of type {} has no text form",
                field.name(),
                field.field_type()
            ))
        }
    };
    Ok(value)
}

/// Appends the tuple as one tab-separated line, without the newline.
pub fn write_tuple<T: TupleRead + ?Sized>(tuple: &T, out: &mut String) -> Result<()> {
    let schema = tuple.schema();
    for (i, field) in schema.fields().iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        match tuple.get(i) {
            None => out.push_str(TSV_NULL),
            Some(value) => write_value(field, value, out)?,
        }
    }
    Ok(())
}

pub fn write_value(field: &Field, value: &Value, out: &mut String) -> Result<()> {
    let no_text_form = || {
        crate::tuple_error!(
            "field '{}' of type {} has no text form",
            field.name(),
            field.field_type()
        )
    };
    let written = match value {
        Value::Int(v) => write!(out, "{v}"),
        Value::Long(v) => write!(out, "{v}"),
        Value::Float(v) => write!(out, "{v}"),
        Value::Double(v) => write!(out, "{v}"),
        Value::Boolean(v) => write!(out, "{v}"),
        Value::String(s) => {
            escape_into(s, out);
            Ok(())
        }
        Value::Bytes(bytes) => bytes.iter().try_for_each(|b| write!(out, "{b:02x}")),
        Value::Enum(ordinal) => {
            let FieldType::Enum(enum_type) = field.field_type() else {
                return Err(no_text_form());
            };
            let ordinal = enum_type.check_ordinal(*ordinal as i64)?;
            out.push_str(&enum_type.symbols[ordinal]);
            Ok(())
        }
        Value::Object(_) | Value::Tuple(_) => return Err(no_text_form()),
    };
    written.map_err(|e| crate::tuple_error!("Failed to format field '{}': {e}", field.name()))
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(text: &str) -> std::result::Result<String, String> {
    if !text.contains('\\') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("unknown escape '\\{other}'")),
            None => return Err("dangling escape".to_string()),
        }
    }
    Ok(out)
}

fn decode_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex at offset {i}"))
        })
        .collect()
}
