//! Duration strings such as `"90"`, `"90s"`, `"2m"` or `"1h"`.

use anyhow::Context;

/// Parse a duration string into seconds. A bare number means seconds.
pub fn parse_duration_to_secs(s: &str) -> anyhow::Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (number, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
        _ => (s, 's'),
    };
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        other => anyhow::bail!("Unknown duration unit '{other}' in '{s}'"),
    };

    let value: i64 = number
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration value: {s}"))?;
    value
        .checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {s}"))
}
