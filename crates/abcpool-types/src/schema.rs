//! Output schemas — the enumerated set of projected-table layouts.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// How a worker's raw simulator table is reduced for its downstream
/// consumer.
///
/// The set is closed on purpose: an unrecognized schema name is a
/// configuration error raised before any process starts, never deferred to
/// run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSchema {
    /// Legacy rejection-sampler layout: header line stripped, dummy column
    /// kept, and every row terminated with an extra trailing delimiter.
    Rejection,
    /// Regression-toolbox layout: header line kept, parameter and stat
    /// columns only.
    Regression,
}

impl OutputSchema {
    /// All valid schema names, for error messages.
    pub const NAMES: &[&str] = &["rejection", "regression"];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSchema::Rejection => "rejection",
            OutputSchema::Regression => "regression",
        }
    }

    /// Whether the projected table keeps the header line.
    pub fn include_header(&self) -> bool {
        matches!(self, OutputSchema::Regression)
    }

    /// Whether every projected row gets an extra trailing delimiter, as the
    /// legacy rejection reader expects.
    pub fn extra_delimiter(&self) -> bool {
        matches!(self, OutputSchema::Rejection)
    }
}

impl fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputSchema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rejection" => Ok(OutputSchema::Rejection),
            "regression" => Ok(OutputSchema::Regression),
            other => Err(Error::Configuration(format!(
                "schema {:?} is not valid. options are: {}",
                other,
                Self::NAMES.join(", ")
            ))),
        }
    }
}
