//! Row payload parsing.
//!
//! The payload column of the pending-data dump is a single text blob of the
//! form `"id"='5' "name"='O''Brien' "comment"='' `. Embedded quotes are
//! doubled, embedded backslashes are doubled, and a present-but-empty value
//! stands for NULL.

use regex::Regex;
use std::sync::OnceLock;

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""([^"]+)"=('(?:''|[^'])*'|)(?:\s+|$)"#).expect("field pattern is valid")
    })
}

/// Ordered column → value map decoded from a payload blob.
///
/// Column order is the order in which the producer wrote the pairs, which
/// keeps generated statements stable and readable in logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, Option<String>)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a column value.
    pub fn insert(&mut self, column: impl Into<String>, value: Option<String>) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Value of a column. The outer `Option` is presence, the inner one is NULL.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_deref())
    }

    /// Non-NULL value of a column, if present.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.get(column).flatten()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (column, value) in iter {
            fields.insert(column, value);
        }
        fields
    }
}

/// Parse a payload blob into [`Fields`].
///
/// Returns `None` if the blob contains anything other than well-formed
/// `"column"='value'` pairs separated by whitespace.
pub fn parse_fields(blob: &str) -> Option<Fields> {
    let mut fields = Fields::new();
    let mut consumed = 0;

    for captures in field_pattern().captures_iter(blob) {
        let whole = captures.get(0)?;
        if !blob[consumed..whole.start()].trim().is_empty() {
            return None;
        }
        consumed = whole.end();

        let name = captures.get(1)?.as_str();
        let quoted = captures.get(2)?.as_str();
        fields.insert(name, decode_value(quoted));
    }

    if !blob[consumed..].trim().is_empty() {
        return None;
    }
    Some(fields)
}

/// Strip the surrounding quotes and undo `''` and `\\` doubling.
fn decode_value(quoted: &str) -> Option<String> {
    let inner = quoted
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or("");
    if inner.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            '\\' if chars.peek() == Some(&'\\') => {
                chars.next();
                out.push('\\');
            }
            other => out.push(other),
        }
    }
    Some(out)
}
