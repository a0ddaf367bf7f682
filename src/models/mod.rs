use serde::Serialize;
use std::fmt;

// ── References ────────────────────────────────────────────────────────────────

/// One extra page of search results, produced only by the search step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaginationRef {
    pub url: String,
    pub search_name: String,
    pub offset: u64,
}

/// Absolute URL of a single record's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetailRef {
    pub url: String,
}

impl DetailRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

// ── Search outcome ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Blank name, or the site reported zero matches.
    Empty,
    /// All matches fit on the first results page.
    Direct(Vec<DetailRef>),
    /// Matches span several pages; each ref is expanded later.
    Paginated(Vec<PaginationRef>),
}

/// Numbers parsed from the results heading: "Results 1 - 30 of 1,234".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultsHeading {
    pub page_size: u64,
    pub total_count: u64,
}

// ── Extracted values ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Flag(bool),
}

/// Spreadsheet-style rendering: null is an empty cell, flags are True/False.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Flag(true) => f.write_str("True"),
            FieldValue::Flag(false) => f.write_str("False"),
        }
    }
}

/// One row scraped from a detail page. `values` line up with the table columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub source_url: String,
    pub values: Vec<FieldValue>,
}

// ── Result table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ExtractedRecord>,
}

impl ResultTable {
    pub fn with_rows(columns: Vec<String>, rows: Vec<ExtractedRecord>) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ExtractedRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&FieldValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.values.get(idx)
    }
}

/// Everything a successful run hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: ResultTable,
    /// One flag per input name, same order, duplicates and blanks included.
    pub success: Vec<bool>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::Flag(true).to_string(), "True");
        assert_eq!(FieldValue::Flag(false).to_string(), "False");
        assert_eq!(FieldValue::Text("N00024".into()).to_string(), "N00024");
    }

    #[test]
    fn test_empty_table_keeps_columns() {
        let table = ResultTable::with_rows(vec!["PIID".into(), "Vendor".into()], Vec::new());
        assert!(table.is_empty());
        assert_eq!(table.columns(), ["PIID", "Vendor"]);
        assert_eq!(table.value(0, "PIID"), None);
    }

    #[test]
    fn test_value_lookup() {
        let table = ResultTable::with_rows(
            vec!["PIID".into(), "Small".into()],
            vec![ExtractedRecord {
                source_url: "https://fpds.test/1".into(),
                values: vec![FieldValue::Text("A1".into()), FieldValue::Flag(false)],
            }],
        );
        assert_eq!(table.value(0, "Small"), Some(&FieldValue::Flag(false)));
        assert_eq!(table.value(0, "Missing"), None);
    }
}
