//! Comma-separated reader and writer for source and staged files.
//!
//! Quoting follows RFC 4180 within a single line; quoted fields spanning
//! several lines are not supported.

use std::str::Lines;

use crate::error::{PipelineError, Result};

/// One tokenized record and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Lazy record iterator over in-memory text.
pub struct TabularReader<'a> {
    lines: std::iter::Enumerate<Lines<'a>>,
    skip_header: bool,
}

impl<'a> TabularReader<'a> {
    pub fn new(text: &'a str, has_header: bool) -> Self {
        Self {
            lines: text.lines().enumerate(),
            skip_header: has_header,
        }
    }
}

impl<'a> Iterator for TabularReader<'a> {
    type Item = Result<TabularRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, line) = self.lines.next()?;
            if line.trim().is_empty() {
                continue;
            }
            if self.skip_header {
                self.skip_header = false;
                continue;
            }
            let line_no = index + 1;
            return Some(parse_line(line).map(|fields| TabularRecord {
                line: line_no,
                fields,
            }).map_err(|reason| PipelineError::malformed(line_no, reason)));
        }
    }
}

fn parse_line(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == ',' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

fn quote(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
    {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Accumulates records into a comma-separated buffer.
#[derive(Debug, Default)]
pub struct TabularWriter {
    buffer: String,
    records: usize,
}

impl TabularWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(header: &[&str]) -> Self {
        let mut writer = Self::new();
        writer.push_line(header.iter().map(|h| quote(h)));
        writer
    }

    pub fn write_record(&mut self, fields: &[String]) {
        self.push_line(fields.iter().map(|f| quote(f)));
        self.records += 1;
    }

    fn push_line(&mut self, fields: impl Iterator<Item = String>) {
        let line = fields.collect::<Vec<_>>().join(",");
        self.buffer.push_str(&line);
        self.buffer.push('\n');
    }

    /// Number of data records written, header excluded.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_bytes()
    }
}
