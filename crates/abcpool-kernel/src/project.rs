//! Streaming column projection.
//!
//! This is the throughput-critical path: raw simulator tables run to
//! millions of rows, so the projector holds exactly one row in memory and
//! never materializes the table. A requested index beyond a row's width is
//! a hard error, not a silent skip.

use std::path::Path;

use abcpool_types::{Error, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::header::HeaderSchema;
use crate::patterns::RuleSet;

/// A selection of column indices plus layout flags, derived from a header
/// schema and a requested category combination.
#[derive(Debug, Clone)]
pub struct ColumnProjection {
    indices: Vec<usize>,
    include_header: bool,
    extra_delimiter: bool,
}

impl ColumnProjection {
    /// Build a projection onto `indices`; they are kept sorted ascending by
    /// original position regardless of input order.
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        Self {
            indices,
            include_header: false,
            extra_delimiter: false,
        }
    }

    /// Emit the header line too (projected like any other row).
    pub fn include_header(mut self, yes: bool) -> Self {
        self.include_header = yes;
        self
    }

    /// Append a trailing delimiter to every emitted row, as the legacy
    /// rejection reader expects.
    pub fn extra_delimiter(mut self, yes: bool) -> Self {
        self.extra_delimiter = yes;
        self
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// Stream `input`, writing only the projected columns of every row to
/// `output`. Returns the number of data rows written (the header, when
/// emitted, is not counted).
pub async fn reduce_columns(
    input: &Path,
    output: &Path,
    projection: &ColumnProjection,
    sep: char,
) -> Result<u64> {
    let infile = File::open(input).await?;
    let mut lines = BufReader::new(infile).lines();
    let mut writer = BufWriter::new(File::create(output).await?);

    let mut row: u64 = 0;
    let mut first = true;
    let mut out_line = String::new();

    while let Some(line) = lines.next_line().await? {
        if first {
            first = false;
            if !projection.include_header {
                continue;
            }
        } else {
            row += 1;
        }
        let parts: Vec<&str> = line.split(sep).collect();
        out_line.clear();
        for (k, &i) in projection.indices.iter().enumerate() {
            match parts.get(i) {
                Some(field) => {
                    if k > 0 {
                        out_line.push(sep);
                    }
                    out_line.push_str(field);
                }
                None => {
                    return Err(Error::ColumnOutOfRange {
                        path: input.to_path_buf(),
                        row,
                        index: i,
                        width: parts.len(),
                    });
                }
            }
        }
        if projection.extra_delimiter {
            out_line.push(sep);
        }
        out_line.push('\n');
        writer.write_all(out_line.as_bytes()).await?;
    }
    writer.flush().await?;
    Ok(row)
}

/// Project a raw table for the rejection sampler: parameter, stat, and
/// dummy columns, header stripped, trailing delimiter appended. Returns
/// the projected column names in ascending original order.
pub async fn project_for_rejection(
    input: &Path,
    output: &Path,
    rules: &RuleSet,
) -> Result<Vec<String>> {
    let schema = HeaderSchema::from_file(input, '\t', rules).await?;
    let mut indices = schema.parameter_indices();
    indices.extend(schema.stat_indices());
    indices.extend(schema.dummy_indices());
    let projection = ColumnProjection::new(indices)
        .include_header(false)
        .extra_delimiter(true);
    reduce_columns(input, output, &projection, '\t').await?;
    Ok(schema.names_at(projection.indices()))
}

/// Project a raw table for the regression stage: parameter and stat
/// columns, header kept.
pub async fn project_for_regression(
    input: &Path,
    output: &Path,
    rules: &RuleSet,
) -> Result<Vec<String>> {
    let schema = HeaderSchema::from_file(input, '\t', rules).await?;
    let mut indices = schema.parameter_indices();
    indices.extend(schema.stat_indices());
    let projection = ColumnProjection::new(indices).include_header(true);
    reduce_columns(input, output, &projection, '\t').await?;
    Ok(schema.names_at(projection.indices()))
}

/// Project only the stat columns of an observed table, header kept.
pub async fn project_observed_stats(
    input: &Path,
    output: &Path,
    rules: &RuleSet,
) -> Result<Vec<String>> {
    let schema = HeaderSchema::from_file(input, '\t', rules).await?;
    let projection = ColumnProjection::new(schema.stat_indices()).include_header(true);
    reduce_columns(input, output, &projection, '\t').await?;
    Ok(schema.names_at(projection.indices()))
}

/// Project only the parameter columns of an observed table, header kept.
pub async fn project_observed_parameters(
    input: &Path,
    output: &Path,
    rules: &RuleSet,
) -> Result<Vec<String>> {
    let schema = HeaderSchema::from_file(input, '\t', rules).await?;
    let projection = ColumnProjection::new(schema.parameter_indices()).include_header(true);
    reduce_columns(input, output, &projection, '\t').await?;
    Ok(schema.names_at(projection.indices()))
}
