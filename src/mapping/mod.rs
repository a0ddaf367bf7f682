//! Output column mapping, loaded from a JSON object whose key order is the
//! column order:
//!
//! ```json
//! { "Contract ID": ["PIIDagreementID", "input"], "Notes": [null, null] }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Input,
    Checkbox,
    #[serde(alias = "td")]
    Text,
    Select,
}

/// Where a column's value comes from on the detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// `None` declares the column without scraping it.
    pub source_tag_id: Option<String>,
    pub kind: TagKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMapping {
    entries: Vec<(String, FieldRule)>,
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("cannot read mapping file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mapping is not a JSON object of [tag_id, kind] pairs: {0}")]
    Json(#[from] serde_json::Error),

    #[error("column '{0}' names a source tag but no tag kind")]
    MissingKind(String),
}

/// On-disk shape of one entry: `[tag_id | null, kind | null]`.
#[derive(Deserialize)]
struct RawRule(Option<String>, #[serde(default)] Option<TagKind>);

impl FieldMapping {
    pub fn new(entries: Vec<(String, FieldRule)>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let raw = std::fs::read_to_string(path).map_err(|source| MappingError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mapping = Self::from_json(&raw)?;
        info!("Loaded {} output columns from {:?}", mapping.len(), path);
        Ok(mapping)
    }

    pub fn from_json(raw: &str) -> Result<Self, MappingError> {
        // serde_json's preserve_order keeps the object's key order here.
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;

        let mut entries = Vec::with_capacity(object.len());
        for (column, value) in object {
            let RawRule(tag, kind) = serde_json::from_value(value)?;
            let tag = tag.filter(|t| !t.trim().is_empty());
            let kind = match (&tag, kind) {
                (_, Some(kind)) => kind,
                (None, None) => TagKind::Text,
                (Some(_), None) => return Err(MappingError::MissingKind(column)),
            };
            entries.push((column, FieldRule { source_tag_id: tag, kind }));
        }
        Ok(Self { entries })
    }

    pub fn columns(&self) -> Vec<String> {
        self.entries.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn entries(&self) -> &[(String, FieldRule)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
