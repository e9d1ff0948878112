use std::fmt;
use crate::core::{Row, Value};

/// Rows produced by a stored function of the in-memory backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Column labels without any rows yet.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, builder style.
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// A one-column, one-row result.
    pub fn scalar(column: &str, value: impl Into<Value>) -> Self {
        let value: Value = value.into();
        Self::with_columns([column]).row([value])
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return writeln!(f, "Empty result set");
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        for row in &self.rows {
            for (i, value) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(value.to_string().len());
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{:width$}", col, width = widths[i]))
            .collect();
        writeln!(f, "{}", header.join(" | "))?;

        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", separator.join("-+-"))?;

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .take(widths.len())
                .map(|(i, val)| format!("{:width$}", val.to_string(), width = widths[i]))
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }

        writeln!(f, "\n{} row(s)", self.rows.len())
    }
}
