//! Header parsing and column classification.
//!
//! A raw simulator table names every column on its first line. The
//! classifier maps each name to exactly one category, checking the rule
//! lists first-match-wins in the fixed order parameter → stat → dummy.
//! Classification depends only on the header line, so it succeeds even on
//! a zero-row output.

use std::path::Path;

use abcpool_types::{Error, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::patterns::{Rule, RuleSet};

/// Semantic category of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnCategory {
    Parameter,
    Stat,
    Dummy,
    Other,
}

/// An ordered header plus the category of every column.
///
/// Bound to one raw output file and immutable thereafter. Duplicate column
/// names are classified independently per position; the schema never
/// deduplicates.
#[derive(Debug, Clone)]
pub struct HeaderSchema {
    columns: Vec<String>,
    categories: Vec<ColumnCategory>,
}

impl HeaderSchema {
    /// Classify `columns` under `rules`. Total and deterministic: every
    /// name lands in exactly one category, unmatched names in `Other`.
    pub fn classify(columns: Vec<String>, rules: &RuleSet) -> Result<Self> {
        let stat_rules = rules.effective_stat_rules()?;
        let categories = columns
            .iter()
            .map(|name| {
                if rules.parameter.iter().any(|r| r.is_match(name)) {
                    ColumnCategory::Parameter
                } else if stat_rules.iter().any(|r| r.is_match(name)) {
                    ColumnCategory::Stat
                } else if rules.dummy.iter().any(|r| r.is_match(name)) {
                    ColumnCategory::Dummy
                } else {
                    ColumnCategory::Other
                }
            })
            .collect();
        Ok(Self {
            columns,
            categories,
        })
    }

    /// Parse the header line of `path` and classify it.
    pub async fn from_file(path: &Path, sep: char, rules: &RuleSet) -> Result<Self> {
        let columns = parse_header(path, sep).await?;
        Self::classify(columns, rules)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn category(&self, index: usize) -> Option<ColumnCategory> {
        self.categories.get(index).copied()
    }

    /// Indices of every column in `category`, ascending.
    pub fn indices(&self, category: ColumnCategory) -> Vec<usize> {
        self.categories
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == category)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn parameter_indices(&self) -> Vec<usize> {
        self.indices(ColumnCategory::Parameter)
    }

    pub fn stat_indices(&self) -> Vec<usize> {
        self.indices(ColumnCategory::Stat)
    }

    pub fn dummy_indices(&self) -> Vec<usize> {
        self.indices(ColumnCategory::Dummy)
    }

    /// Column names at `indices`, in the order given.
    pub fn names_at(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&i| self.columns.get(i).cloned())
            .collect()
    }
}

/// Read only the first line of `path` and split it on `sep`.
///
/// The body is never touched; callers stream it separately.
pub async fn parse_header(path: &Path, sep: char) -> Result<Vec<String>> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let line = lines.next_line().await?.ok_or_else(|| Error::MalformedTable {
        path: path.to_path_buf(),
        reason: "missing header line".into(),
    })?;
    let columns: Vec<String> = line
        .trim()
        .split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if columns.is_empty() {
        return Err(Error::MalformedTable {
            path: path.to_path_buf(),
            reason: "empty header line".into(),
        });
    }
    Ok(columns)
}

/// Ascending indices of `names` matching any rule in `rules`.
pub fn indices_of_rules(names: &[String], rules: &[Rule]) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| rules.iter().any(|r| r.is_match(name)))
        .map(|(i, _)| i)
        .collect()
}
