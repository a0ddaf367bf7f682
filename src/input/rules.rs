//! Closed rule set for deriving a search name from the other cells of a row.
//!
//! Rules are evaluated in order; the first one whose predicates all hold wins.
//! Predicates compare normalized cells (lowercase, whitespace removed), the
//! transform reads the raw cells.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Empty { field: String },
    NotEmpty { field: String },
    Equals { field: String, value: String },
    Contains { field: String, value: String },
    StartsWith { field: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Transform {
    pub fields: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DerivationRule {
    pub name: String,
    #[serde(default)]
    pub when: Vec<Predicate>,
    pub search_name: Transform,
}

fn default_separator() -> String {
    " ".to_string()
}

/// Lowercase and drop every whitespace character.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Read-only view of one sheet row, addressed by configured column key.
pub struct RowView<'a> {
    raw: &'a [String],
    columns: &'a BTreeMap<String, usize>,
}

impl<'a> RowView<'a> {
    pub fn new(raw: &'a [String], columns: &'a BTreeMap<String, usize>) -> Self {
        Self { raw, columns }
    }

    pub fn raw(&self, field: &str) -> &'a str {
        self.columns
            .get(field)
            .and_then(|&i| self.raw.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn normalized(&self, field: &str) -> String {
        normalize(self.raw(field))
    }
}

impl Predicate {
    fn field(&self) -> &str {
        match self {
            Predicate::Empty { field }
            | Predicate::NotEmpty { field }
            | Predicate::Equals { field, .. }
            | Predicate::Contains { field, .. }
            | Predicate::StartsWith { field, .. } => field,
        }
    }

    pub fn holds(&self, row: &RowView<'_>) -> bool {
        let cell = row.normalized(self.field());
        match self {
            Predicate::Empty { .. } => cell.is_empty(),
            Predicate::NotEmpty { .. } => !cell.is_empty(),
            Predicate::Equals { value, .. } => cell == normalize(value),
            Predicate::Contains { value, .. } => cell.contains(&normalize(value)),
            Predicate::StartsWith { value, .. } => cell.starts_with(&normalize(value)),
        }
    }
}

impl Transform {
    pub fn apply(&self, row: &RowView<'_>) -> String {
        self.fields
            .iter()
            .map(|f| row.raw(f).trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}

impl DerivationRule {
    pub fn matches(&self, row: &RowView<'_>) -> bool {
        self.when.iter().all(|p| p.holds(row))
    }

    /// Every field a rule names must be one of the configured column keys.
    pub fn check_fields(&self, columns: &BTreeMap<String, String>) -> Result<()> {
        let named = self
            .when
            .iter()
            .map(Predicate::field)
            .chain(self.search_name.fields.iter().map(String::as_str));
        for field in named {
            if !columns.contains_key(field) {
                bail!("unknown column key '{}'", field);
            }
        }
        if self.search_name.fields.is_empty() {
            bail!("search_name transform names no fields");
        }
        Ok(())
    }
}

/// First matching rule's derived name, if any rule applies.
pub fn derive_search_name(rules: &[DerivationRule], row: &RowView<'_>) -> Option<String> {
    rules
        .iter()
        .find(|r| r.matches(row))
        .map(|r| r.search_name.apply(row))
}
