//! Column-level unescaping for the `COPY` text format.

/// Marker the producer writes for SQL NULL.
const NULL_MARKER: &str = "\\N";

/// Unescape a single raw column.
///
/// Returns `None` for the NULL marker. Otherwise the escape pairs
/// `\b \f \n \r \t \v \\` are replaced by the characters they stand for.
/// The scan is a single left-to-right pass, so an escaped backslash is never
/// re-read as the start of another escape (`\\n` decodes to `\n` as two
/// characters, not to a newline). Unknown escapes are kept verbatim.
pub fn unescape(raw: &str) -> Option<String> {
    if raw == NULL_MARKER {
        return None;
    }
    if !raw.contains('\\') {
        return Some(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\u{b}'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}
