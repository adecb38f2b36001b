//! Line-oriented record format.
//!
//! One record per line, `key=value`. Only the first `=` splits; key and
//! value are trimmed. The value grammar on read:
//!
//! - bare `null` removes the key,
//! - `""` is the empty string,
//! - a value wrapped in one leading and one trailing `"` has exactly that
//!   pair stripped (interior quotes are kept verbatim),
//! - anything else is taken literally.
//!
//! Writing never re-quotes, so values that are `null`, empty, or carry
//! edge whitespace do not survive a round trip unchanged.

use std::{collections::BTreeMap, ops::Bound};

use dashmap::DashMap;

use crate::error::{FormatError, Result, StoreError};

pub const DELIMITER: char = '=';

const NULL_LITERAL: &str = "null";
const QUOTE: char = '"';
const LINE_BREAKS: [char; 2] = ['\n', '\r'];

/// Effect of one parsed line on a record map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Set { key: String, value: String },
    Remove { key: String },
}

impl Entry {
    pub fn key(&self) -> &str {
        match self {
            Entry::Set { key, .. } | Entry::Remove { key } => key,
        }
    }
}

/// Parses a single line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> std::result::Result<Option<Entry>, FormatError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with(DELIMITER) {
        return Err(FormatError::StartsWithDelimiter);
    }

    let (key, rest) = trimmed
        .split_once(DELIMITER)
        .ok_or(FormatError::MissingDelimiter)?;
    let key = key.trim().to_string();
    let rest = rest.trim();

    if rest == NULL_LITERAL {
        return Ok(Some(Entry::Remove { key }));
    }

    Ok(Some(Entry::Set {
        key,
        value: unquote(rest).to_string(),
    }))
}

fn unquote(rest: &str) -> &str {
    let quoted = rest.len() > 1 && rest.starts_with(QUOTE) && rest.ends_with(QUOTE);
    if quoted {
        &rest[1..rest.len() - 1]
    } else {
        rest
    }
}

/// Parses a whole buffer, failing on the first malformed line.
///
/// Nothing is returned for a buffer with any malformed line, so callers can
/// apply the result knowing the source was valid in full.
pub fn parse(source: &str) -> Result<Vec<Entry>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match parse_line(line) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(source) => Some(Err(StoreError::Format {
                line: idx + 1,
                source,
            })),
        })
        .collect()
}

/// Rejects a record that would not read back as the same key and value.
///
/// Keys must be non-empty, free of the delimiter and line breaks, and carry
/// no edge whitespace. Values must not contain line breaks.
pub fn check_record(key: &str, value: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.contains(DELIMITER) {
        Some("key contains the delimiter")
    } else if key.contains(LINE_BREAKS) {
        Some("key contains a line break")
    } else if key.trim() != key {
        Some("key has leading or trailing whitespace")
    } else if value.contains(LINE_BREAKS) {
        Some("value contains a line break")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidRecord {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Applies parsed entries in order; later lines win.
pub fn apply(entries: Vec<Entry>, map: &DashMap<String, String>) {
    for entry in entries {
        match entry {
            Entry::Set { key, value } => {
                map.insert(key, value);
            }
            Entry::Remove { key } => {
                map.remove(&key);
            }
        }
    }
}

/// Serializes every record as `key=value\n` in key order.
pub fn stringify(records: &BTreeMap<String, String>) -> String {
    render(records.iter())
}

/// Serializes the records whose key starts with `prefix`, in key order.
pub fn stringify_group(records: &BTreeMap<String, String>, prefix: &str) -> String {
    render(
        records
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix)),
    )
}

fn render<'a>(records: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let mut out = String::new();
    for (key, value) in records {
        out.push_str(key);
        out.push(DELIMITER);
        out.push_str(value);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_map(source: &str) -> DashMap<String, String> {
        let map = DashMap::new();
        apply(parse(source).expect("parse"), &map);
        map
    }

    fn value(map: &DashMap<String, String>, key: &str) -> Option<String> {
        map.get(key).map(|v| v.value().clone())
    }

    #[test]
    fn plain_value_is_trimmed() {
        let map = parse_map("  key =  value  ");
        assert_eq!(value(&map, "key").as_deref(), Some("value"));
    }

    #[test]
    fn quote_handling() {
        let map = parse_map("key1=\"\nkey2=\"\"\nkey3=\"\"\"\nkey4=\"\"\"\"\n");
        assert_eq!(value(&map, "key1").as_deref(), Some("\""));
        assert_eq!(value(&map, "key2").as_deref(), Some(""));
        assert_eq!(value(&map, "key3").as_deref(), Some("\""));
        assert_eq!(value(&map, "key4").as_deref(), Some("\"\""));
    }

    #[test]
    fn one_sided_quotes_are_kept() {
        let map = parse_map("key1=\" space edged value\nkey2=space edged value \"");
        assert_eq!(value(&map, "key1").as_deref(), Some("\" space edged value"));
        assert_eq!(value(&map, "key2").as_deref(), Some("space edged value \""));
    }

    #[test]
    fn quoted_value_keeps_edge_spaces() {
        let map = parse_map("key=\" space edged value \"");
        assert_eq!(value(&map, "key").as_deref(), Some(" space edged value "));
    }

    #[test]
    fn bare_null_removes_and_quoted_null_is_literal() {
        let map = DashMap::new();
        map.insert("key1".to_string(), "v".to_string());
        apply(parse("key1=null\nkey2=\"null\"").expect("parse"), &map);
        assert_eq!(value(&map, "key1"), None);
        assert_eq!(value(&map, "key2").as_deref(), Some("null"));
    }

    #[test]
    fn empty_value_is_empty_string() {
        let map = parse_map("key=");
        assert_eq!(value(&map, "key").as_deref(), Some(""));
    }

    #[test]
    fn only_first_delimiter_splits() {
        let map = parse_map("two=equals=chars");
        assert_eq!(value(&map, "two").as_deref(), Some("equals=chars"));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert!(parse("").expect("empty").is_empty());
        assert!(parse("   \t").expect("blank").is_empty());
        assert_eq!(parse_line("  \t "), Ok(None));
    }

    #[test]
    fn rejects_leading_delimiter() {
        assert_eq!(parse_line("=value"), Err(FormatError::StartsWithDelimiter));
        assert_eq!(parse_line("   =value"), Err(FormatError::StartsWithDelimiter));
    }

    #[test]
    fn rejects_missing_delimiter() {
        assert_eq!(
            parse_line("string without equals char"),
            Err(FormatError::MissingDelimiter)
        );
    }

    #[test]
    fn parse_reports_line_number_and_returns_nothing() {
        let err = parse("a=1\n\nno-delimiter-here\nb=2").expect_err("should fail");
        match err {
            StoreError::Format { line, source } => {
                assert_eq!(line, 3);
                assert_eq!(source, FormatError::MissingDelimiter);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn check_record_rejects_what_cannot_read_back() {
        assert!(check_record("ui.theme", "dark mode = on").is_ok());
        assert!(check_record("k", "").is_ok());

        for (key, value) in [
            ("", "v"),
            ("x=y", "z"),
            ("a\nb", "v"),
            (" padded", "v"),
            ("padded\t", "v"),
            ("k", "line1\nline2"),
            ("k", "ends\r"),
        ] {
            let err = check_record(key, value).expect_err("should reject");
            assert!(
                matches!(err, StoreError::InvalidRecord { .. }),
                "{key:?}={value:?}"
            );
        }
    }

    #[test]
    fn stringify_sorts_keys() {
        let mut records = BTreeMap::new();
        records.insert("b".to_string(), "2".to_string());
        records.insert("a".to_string(), "1".to_string());
        records.insert("c".to_string(), "x=y".to_string());
        assert_eq!(stringify(&records), "a=1\nb=2\nc=x=y\n");
    }

    #[test]
    fn stringify_group_filters_by_prefix() {
        let mut records = BTreeMap::new();
        for key in ["ui.theme", "ui.font", "net.port", "uix"] {
            records.insert(key.to_string(), "v".to_string());
        }
        assert_eq!(
            stringify_group(&records, "ui."),
            "ui.font=v\nui.theme=v\n"
        );
        assert_eq!(stringify_group(&records, "zzz"), "");
    }

    #[test]
    fn round_trip_for_unambiguous_values() {
        let mut records = BTreeMap::new();
        records.insert("name".to_string(), "alice".to_string());
        records.insert("path".to_string(), "/a=b/c".to_string());
        records.insert("count".to_string(), "42".to_string());

        let parsed = parse_map(&stringify(&records));
        let back: BTreeMap<String, String> = parsed.into_iter().collect();
        assert_eq!(back, records);
    }
}
