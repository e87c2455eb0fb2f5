//! Constant-memory running statistics.
//!
//! One summarizer per quantity of interest, updated in O(1) per sample and
//! never implicitly reset. Derived quantities follow the documented
//! conventions: undefined (`None`) with no samples, sample variance
//! `+infinity` with exactly one.

use std::fmt;
use std::path::Path;

use abcpool_types::{Error, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::header::parse_header;

/// Online mean/variance/min/max over a stream of samples.
///
/// The sum-of-squares formulation cancels catastrophically for samples
/// whose magnitude dwarfs their spread; it is kept for output
/// compatibility with the historical summaries.
#[derive(Debug, Clone)]
pub struct SampleSummarizer {
    name: String,
    n: u64,
    sum: f64,
    sum_of_squares: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl SampleSummarizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            n: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
            min: None,
            max: None,
        }
    }

    /// O(1) update.
    pub fn add_sample(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
        self.sum_of_squares += x * x;
        if self.min.is_none_or(|m| x < m) {
            self.min = Some(x);
        }
        if self.max.is_none_or(|m| x > m) {
            self.max = Some(x);
        }
    }

    pub fn update_samples(&mut self, samples: impl IntoIterator<Item = f64>) {
        for x in samples {
            self.add_sample(x);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    pub fn minimum(&self) -> Option<f64> {
        self.min
    }

    pub fn maximum(&self) -> Option<f64> {
        self.max
    }

    /// Undefined until the first sample.
    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }

    /// Unbiased sample variance; `+infinity` by convention when `n == 1`.
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        if self.n == 1 {
            return Some(f64::INFINITY);
        }
        Some((self.sum_of_squares - mean * self.sum) / (self.n - 1) as f64)
    }

    /// Population variance (divides by `n`); exactly `0` when `n == 1`.
    pub fn pop_variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        Some((self.sum_of_squares - mean * self.sum) / self.n as f64)
    }

    pub fn std_deviation(&self) -> Option<f64> {
        Some(self.variance()?.sqrt())
    }
}

impl fmt::Display for SampleSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name = {}", self.name)?;
        writeln!(f, "sample size = {}", self.n)?;
        writeln!(f, "sum = {}", self.sum)?;
        writeln!(f, "sum of squares = {}", self.sum_of_squares)?;
        writeln!(f, "min = {:?}", self.min)?;
        writeln!(f, "max = {:?}", self.max)?;
        writeln!(f, "mean = {:?}", self.mean())?;
        writeln!(f, "variance = {:?}", self.variance())?;
        writeln!(f, "pop variance = {:?}", self.pop_variance())
    }
}

/// Stream a headed, delimited table and return one summarizer per column,
/// named after the header. Memory use is independent of row count.
pub async fn summarize_columns(path: &Path, sep: char) -> Result<Vec<SampleSummarizer>> {
    let names = parse_header(path, sep).await?;
    let mut summaries: Vec<SampleSummarizer> =
        names.into_iter().map(SampleSummarizer::new).collect();

    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    lines.next_line().await?; // header, already parsed
    let mut row: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        row += 1;
        let fields: Vec<&str> = line.split(sep).collect();
        if fields.len() < summaries.len() {
            return Err(Error::MalformedTable {
                path: path.to_path_buf(),
                reason: format!(
                    "data row {row} has {} columns, header has {}",
                    fields.len(),
                    summaries.len()
                ),
            });
        }
        for (summary, field) in summaries.iter_mut().zip(&fields) {
            let x: f64 = field.parse().map_err(|_| Error::MalformedTable {
                path: path.to_path_buf(),
                reason: format!("unparseable value {field:?} on data row {row}"),
            })?;
            summary.add_sample(x);
        }
    }
    Ok(summaries)
}

/// Write the per-column means and standard deviations consumed by the
/// standardization stage: a header line, a line of means, and a line of
/// standard deviations.
pub async fn write_summary(
    summaries: &[SampleSummarizer],
    path: &Path,
    sep: char,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path).await?);
    let mut sep_buf = [0u8; 4];
    let sep_str: &str = sep.encode_utf8(&mut sep_buf);

    let names: Vec<&str> = summaries.iter().map(|s| s.name()).collect();
    let means: Vec<String> = summaries
        .iter()
        .map(|s| s.mean().unwrap_or(f64::NAN).to_string())
        .collect();
    let std_devs: Vec<String> = summaries
        .iter()
        .map(|s| s.std_deviation().unwrap_or(f64::NAN).to_string())
        .collect();

    writer.write_all(names.join(sep_str).as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.write_all(means.join(sep_str).as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.write_all(std_devs.join(sep_str).as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
