//! Two-column `Key`/`Value` text tables for console display.

use std::collections::BTreeMap;

const HEADERS: [&str; 2] = ["Key", "Value"];

/// Renders records in key order. A decorated table gets ASCII borders;
/// an undecorated one is just aligned columns.
pub fn render(records: &BTreeMap<String, String>, decorated: bool) -> String {
    let key_width = column_width(HEADERS[0], records.keys());
    let value_width = column_width(HEADERS[1], records.values());

    let mut out = String::new();
    let border = format!(
        "+{}+{}+\n",
        "-".repeat(key_width + 2),
        "-".repeat(value_width + 2)
    );

    let row = |key: &str, value: &str| {
        if decorated {
            format!("| {key:<key_width$} | {value:<value_width$} |\n")
        } else {
            format!("{key:<key_width$}  {value}\n")
        }
    };

    if decorated {
        out.push_str(&border);
    }
    out.push_str(&row(HEADERS[0], HEADERS[1]));
    if decorated {
        out.push_str(&border);
    }
    for (key, value) in records {
        out.push_str(&row(key, value));
    }
    if decorated {
        out.push_str(&border);
    }
    out
}

fn column_width<'a>(header: &str, cells: impl Iterator<Item = &'a String>) -> usize {
    cells
        .map(|cell| cell.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
}
