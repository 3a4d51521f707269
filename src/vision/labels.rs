//! Label and product metadata tables
//!
//! Both files are plain text, one entry per line; the line index is the
//! index into the model's score vector. Metadata lines look like
//! `category/weight/description`.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Field separator in metadata lines
pub const METADATA_DELIMITER: char = '/';

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered class labels, index-aligned with the model output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Parse one label per line. Blank lines are kept to preserve indexing.
    pub fn parse(content: &str) -> Self {
        Self {
            labels: content.lines().map(|l| l.trim_end().to_string()).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let content = std::fs::read_to_string(path).map_err(|source| AssetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&content);
        info!("Loaded {} labels from {:?}", table.len(), path);
        Ok(table)
    }

    /// Load, or log and fall back to an empty table
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            error!("Error loading labels: {}", e);
            Self::default()
        })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Weight and description for one label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    pub weight: Option<String>,
    pub description: Option<String>,
}

impl ProductInfo {
    /// Parse a `category/weight/description` line.
    ///
    /// The description keeps any further delimiters. Empty fields become `None`.
    pub fn parse_line(line: &str) -> Self {
        let mut fields = line.splitn(3, METADATA_DELIMITER).skip(1);
        let non_empty = |field: Option<&str>| {
            field
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
        };
        let weight = non_empty(fields.next());
        let description = non_empty(fields.next());
        Self { weight, description }
    }
}

/// Per-label product metadata, index-aligned with [`LabelTable`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    rows: Vec<ProductInfo>,
}

impl MetadataTable {
    pub fn parse(content: &str) -> Self {
        Self {
            rows: content.lines().map(ProductInfo::parse_line).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let content = std::fs::read_to_string(path).map_err(|source| AssetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&content);
        info!("Loaded {} metadata rows from {:?}", table.len(), path);
        Ok(table)
    }

    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            error!("Error loading product metadata: {}", e);
            Self::default()
        })
    }

    pub fn get(&self, index: usize) -> Option<&ProductInfo> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Warn when the table does not line up with the labels
    pub fn check_alignment(&self, labels: &LabelTable) {
        if self.len() != labels.len() {
            warn!(
                "Metadata has {} rows for {} labels; unmatched labels have no weight/description",
                self.len(),
                labels.len()
            );
        }
    }
}
