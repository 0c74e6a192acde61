use serde::Serialize;

/// Number of columns a submission occupies.
pub const ROW_WIDTH: usize = 7;
/// Row 0 holds the form headers.
pub const FIRST_DATA_ROW: usize = 1;
pub const END_DATE_COLUMN: usize = 5;

/// Cell text of the first sheet, as loaded in one request. Row 0 is the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetSnapshot {
    rows: Vec<Vec<String>>,
}

impl SheetSnapshot {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn from_rows<I, R, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells outside the loaded region read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One form submission: `timestamp, email, name, link, type, end date, other info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRow {
    pub row_index: usize,
    pub fields: [String; ROW_WIDTH],
}

impl RawRow {
    pub fn new(row_index: usize, fields: [&str; ROW_WIDTH]) -> Self {
        Self {
            row_index,
            fields: fields.map(str::to_string),
        }
    }

    pub(crate) fn extract(snapshot: &SheetSnapshot, row_index: usize) -> Self {
        Self {
            row_index,
            fields: std::array::from_fn(|col| snapshot.cell(row_index, col).trim().to_string()),
        }
    }

    pub fn has_data(&self) -> bool {
        self.fields.iter().any(|value| !value.is_empty())
    }

    pub fn timestamp(&self) -> &str {
        &self.fields[0]
    }

    pub fn email(&self) -> &str {
        &self.fields[1]
    }

    pub fn name(&self) -> &str {
        &self.fields[2]
    }

    pub fn link(&self) -> &str {
        &self.fields[3]
    }

    pub fn entry_type(&self) -> &str {
        &self.fields[4]
    }

    pub fn end_date(&self) -> &str {
        &self.fields[END_DATE_COLUMN]
    }

    pub fn other_info(&self) -> &str {
        &self.fields[6]
    }
}
