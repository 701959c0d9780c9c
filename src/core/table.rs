//! Minimal CSV row formatting shared by the scan store and the stats export.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Quote a field when it contains a delimiter, quote or line break.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

pub fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Append one row, writing `header` first when the file is new or empty.
pub fn append_row<S: AsRef<str>>(path: &Path, header: &[&str], fields: &[S]) -> io::Result<()> {
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        writeln!(file, "{}", format_row(header))?;
    }
    writeln!(file, "{}", format_row(fields))
}

/// Write a whole table, replacing any existing file.
pub fn write_table<S: AsRef<str>>(
    path: &Path,
    header: &[S],
    rows: &[Vec<String>],
) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{}", format_row(header))?;
    for row in rows {
        writeln!(file, "{}", format_row(row))?;
    }
    Ok(())
}
