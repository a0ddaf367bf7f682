//! CSV input sheet: header detection, row classification, search-name list.

pub mod rules;

use crate::config::{InputConfig, SEARCH_NAME_KEY};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use self::rules::{RowView, derive_search_name, normalize};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot open input sheet {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("input sheet has no data rows")]
    NoData,

    #[error("input sheet has no row containing all headers: {expected:?}")]
    WrongHeaders { expected: Vec<String> },
}

/// Parsed input sheet, split into rows that will be searched and rows that won't.
#[derive(Debug, Clone)]
pub struct InputSheet {
    pub header: Vec<String>,
    pub columns: BTreeMap<String, usize>,
    pub processed: Vec<Vec<String>>,
    pub non_processed: Vec<Vec<String>>,
}

impl InputSheet {
    /// Search name of every processed row, in row order.
    pub fn search_names(&self) -> Vec<String> {
        let Some(&idx) = self.columns.get(SEARCH_NAME_KEY) else {
            return Vec::new();
        };
        self.processed
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or_default())
            .collect()
    }

    pub fn has_non_processed(&self) -> bool {
        !self.non_processed.is_empty()
    }
}

pub fn load_input(path: &Path, config: &InputConfig) -> Result<InputSheet, InputError> {
    info!("Parsing input sheet {:?}", path);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| InputError::Open {
            path: path.display().to_string(),
            source,
        })?;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect::<Vec<_>>()),
            Err(e) => warn!("Row {} in {:?}: {}", i + 1, path, e),
        }
    }

    parse_rows(rows, config)
}

/// Classify already-read rows. Split out so the logic is testable without files.
pub fn parse_rows(rows: Vec<Vec<String>>, config: &InputConfig) -> Result<InputSheet, InputError> {
    if rows.is_empty() {
        return Err(InputError::NoData);
    }

    let wrong_headers = || InputError::WrongHeaders {
        expected: config.columns.values().cloned().collect(),
    };
    let (header_idx, columns) = find_header(&rows, &config.columns).ok_or_else(wrong_headers)?;
    let search_idx = *columns.get(SEARCH_NAME_KEY).ok_or_else(wrong_headers)?;
    let header = rows[header_idx].clone();

    let data: Vec<Vec<String>> = rows.into_iter().skip(header_idx + 1).collect();
    if data.is_empty() {
        return Err(InputError::NoData);
    }

    let mut processed = Vec::new();
    let mut non_processed = Vec::new();

    for mut row in data {
        if row.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        if row.len() < header.len() {
            row.resize(header.len(), String::new());
        }

        for key in &config.strip_symbols {
            if let Some(&i) = columns.get(key) {
                row[i] = strip_symbols(&row[i]);
            }
        }

        if !row[search_idx].trim().is_empty() {
            processed.push(row);
            continue;
        }

        let derived = derive_search_name(&config.rules, &RowView::new(&row, &columns));
        match derived {
            Some(name) => {
                debug!("Derived search name {:?}", name);
                row[search_idx] = name;
                processed.push(row);
            }
            None => non_processed.push(row),
        }
    }

    info!(
        "Input sheet: {} rows to search, {} rows skipped",
        processed.len(),
        non_processed.len()
    );

    Ok(InputSheet { header, columns, processed, non_processed })
}

/// First row that contains every configured header title (normalized).
fn find_header(
    rows: &[Vec<String>],
    titles: &BTreeMap<String, String>,
) -> Option<(usize, BTreeMap<String, usize>)> {
    rows.iter().enumerate().find_map(|(row_idx, row)| {
        let cells: Vec<String> = row.iter().map(|c| normalize(c)).collect();
        let columns = titles
            .iter()
            .map(|(key, title)| {
                let want = normalize(title);
                cells.iter().position(|c| *c == want).map(|i| (key.clone(), i))
            })
            .collect::<Option<BTreeMap<_, _>>>()?;
        Some((row_idx, columns))
    })
}

/// Keep letters, digits and underscores only.
pub fn strip_symbols(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}
