//! Parser for `smartctl -a` output.
//!
//! Extracts the vendor attribute table that follows the line
//!
//! ```text
//! SMART Attributes Data Structure revision number: 16
//! ```
//!
//! Rows are read from the `ID#` header line up to the first blank line and
//! paired positionally with the ten revision-16 columns.

use tracing::warn;

use crate::error::ParseError;

/// Marker line that must appear, on its own, before the table is trusted.
pub const REVISION_MARKER: &str = "SMART Attributes Data Structure revision number: 16";

/// Columns of the revision-16 attribute table, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Id,
    AttributeName,
    Flag,
    Value,
    Worst,
    Thresh,
    Type,
    Updated,
    WhenFailed,
    RawValue,
}

impl Column {
    /// All columns, in table order.
    pub const ALL: [Column; 10] = [
        Column::Id,
        Column::AttributeName,
        Column::Flag,
        Column::Value,
        Column::Worst,
        Column::Thresh,
        Column::Type,
        Column::Updated,
        Column::WhenFailed,
        Column::RawValue,
    ];

    /// Header text smartctl prints for this column.
    pub const fn header(self) -> &'static str {
        match self {
            Column::Id => "ID#",
            Column::AttributeName => "ATTRIBUTE_NAME",
            Column::Flag => "FLAG",
            Column::Value => "VALUE",
            Column::Worst => "WORST",
            Column::Thresh => "THRESH",
            Column::Type => "TYPE",
            Column::Updated => "UPDATED",
            Column::WhenFailed => "WHEN_FAILED",
            Column::RawValue => "RAW_VALUE",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// One row of the attribute table.
///
/// Fields are kept as the text smartctl printed. A row with fewer tokens
/// than columns simply lacks the trailing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    fields: Vec<String>,
}

impl AttributeRecord {
    /// Pair whitespace-separated tokens with the columns, dropping extras.
    fn from_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> Self {
        let fields = Column::ALL
            .iter()
            .zip(tokens)
            .map(|(_, token)| token.to_string())
            .collect();
        Self { fields }
    }

    /// Field for a column, if the row had one.
    pub fn get(&self, column: Column) -> Option<&str> {
        self.fields.get(column.index()).map(String::as_str)
    }

    /// `(header, value)` pairs for the fields present, in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Column::ALL
            .iter()
            .zip(&self.fields)
            .map(|(c, v)| (c.header(), v.as_str()))
    }

    /// Attribute ID, if the `ID#` field is an integer in 0-255.
    pub fn id(&self) -> Option<u8> {
        self.get(Column::Id)?.parse().ok()
    }

    /// `ATTRIBUTE_NAME` field.
    pub fn name(&self) -> Option<&str> {
        self.get(Column::AttributeName)
    }

    /// Normalized reading (`VALUE` field).
    pub fn value(&self) -> Option<&str> {
        self.get(Column::Value)
    }

    /// Raw reading (`RAW_VALUE` field).
    pub fn raw_value(&self) -> Option<&str> {
        self.get(Column::RawValue)
    }
}

/// How strictly rows are checked against the column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnCheck {
    /// Pair tokens positionally; short rows lose trailing fields, long rows
    /// lose extra tokens. Nothing is reported.
    #[default]
    Lenient,
    /// Report every row whose token count differs from the column count.
    /// Short rows are skipped, long rows are kept truncated.
    Strict,
}

/// A table row that did not have exactly one token per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    /// 1-based line number within the output.
    pub line_number: usize,
    /// The row as printed.
    pub line: String,
    /// Number of whitespace-separated fields found.
    pub tokens: usize,
}

/// Result of parsing one smartctl output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeTable {
    /// Rows in the order they appeared.
    pub records: Vec<AttributeRecord>,
    /// Rows reported under [`ColumnCheck::Strict`].
    pub malformed: Vec<MalformedRow>,
}

impl AttributeTable {
    /// Whether no rows were read.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of rows read.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// First record with the given attribute ID.
    pub fn find(&self, id: u8) -> Option<&AttributeRecord> {
        self.records.iter().find(|r| r.id() == Some(id))
    }
}

/// Stateless parser for the attribute table.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeParser {
    check: ColumnCheck,
}

impl AttributeParser {
    /// Create a parser with the given column check.
    pub fn new(check: ColumnCheck) -> Self {
        Self { check }
    }

    /// Parse the full standard output of `smartctl -a`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::IncompatibleFormat`] if [`REVISION_MARKER`] is not
    /// on a line of its own. No rows are returned in that case.
    pub fn parse(&self, output: &str) -> Result<AttributeTable, ParseError> {
        if !output.lines().any(|line| line == REVISION_MARKER) {
            return Err(ParseError::IncompatibleFormat(REVISION_MARKER));
        }

        let mut table = AttributeTable::default();
        let mut reading = false;

        for (index, raw_line) in output.lines().enumerate() {
            let line = raw_line.trim();
            if line.starts_with(Column::Id.header()) {
                reading = true;
                continue;
            }
            if !reading {
                continue;
            }
            if line.is_empty() {
                break;
            }

            let tokens = line.split_whitespace().count();
            if self.check == ColumnCheck::Strict && tokens != Column::ALL.len() {
                warn!(
                    "Malformed attribute row at line {} ({} fields, expected {}): {}",
                    index + 1,
                    tokens,
                    Column::ALL.len(),
                    line
                );
                table.malformed.push(MalformedRow {
                    line_number: index + 1,
                    line: line.to_string(),
                    tokens,
                });
                if tokens < Column::ALL.len() {
                    continue;
                }
            }

            table
                .records
                .push(AttributeRecord::from_tokens(line.split_whitespace()));
        }

        Ok(table)
    }
}

/// Parse with [`ColumnCheck::Lenient`], returning only the records.
pub fn parse_attributes(output: &str) -> Result<Vec<AttributeRecord>, ParseError> {
    AttributeParser::default().parse(output).map(|t| t.records)
}
