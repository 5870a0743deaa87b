//! Lazy typed row reader.

use std::io::BufRead;

use crate::error::{DumpError, Result};
use crate::escape::unescape;
use crate::fields::{parse_fields, Fields};

/// How a column is coerced after unescaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Signed 64-bit integer.
    Int,
    /// `t` is true, anything else is false.
    Bool,
    /// Kept as text.
    Text,
    /// `"column"='value'` payload blob.
    Fields,
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
    Fields(Fields),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_fields(self) -> Option<Fields> {
        match self {
            Value::Fields(v) => Some(v),
            _ => None,
        }
    }
}

/// Forward-only iterator of typed rows over a dump stream.
///
/// Each item is one line split on tabs, unescaped and coerced column by
/// column according to the `types` it was built with. The first error ends
/// the useful part of the stream; callers are expected to stop there.
pub struct DumpReader<'a, R> {
    lines: std::io::Lines<R>,
    types: &'a [ColumnType],
    line_no: usize,
}

impl<'a, R: BufRead> DumpReader<'a, R> {
    pub fn new(reader: R, types: &'a [ColumnType]) -> Self {
        Self {
            lines: reader.lines(),
            types,
            line_no: 0,
        }
    }

    fn decode_line(&self, line: &str) -> Result<Vec<Value>> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let raw: Vec<&str> = line.split('\t').collect();
        if raw.len() != self.types.len() {
            return Err(DumpError::ColumnCount {
                line: self.line_no,
                expected: self.types.len(),
                found: raw.len(),
            });
        }

        raw.into_iter()
            .zip(self.types.iter())
            .enumerate()
            .map(|(column, (raw, column_type))| self.coerce(column, raw, *column_type))
            .collect()
    }

    fn coerce(&self, column: usize, raw: &str, column_type: ColumnType) -> Result<Value> {
        let Some(text) = unescape(raw) else {
            return Ok(Value::Null);
        };

        match column_type {
            ColumnType::Int => {
                text.trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| DumpError::InvalidInteger {
                        line: self.line_no,
                        column,
                        value: text.clone(),
                    })
            }
            ColumnType::Bool => Ok(Value::Bool(text == "t")),
            ColumnType::Text => Ok(Value::Text(text)),
            ColumnType::Fields => match parse_fields(&text) {
                Some(fields) => Ok(Value::Fields(fields)),
                None => Err(DumpError::MalformedFields {
                    line: self.line_no,
                    column,
                    value: text,
                }),
            },
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<'_, R> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(DumpError::Io(e))),
        };
        self.line_no += 1;
        Some(self.decode_line(&line))
    }
}
