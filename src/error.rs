//! Error types for the simulator library.
//!
//! Only setup and input loading can fail. Numerical recoveries (degenerate
//! regressions, infeasible release demands) are handled locally by the
//! engines, and an out-of-range day-of-water-year or month index is a
//! programming error: the fixed-size rule tables are indexed directly and
//! panic on violation rather than propagating.

use thiserror::Error;

/// Main error type for simulation setup and input loading.
#[derive(Error, Debug)]
pub enum SimError {
    /// A required rule-file attribute is absent or inconsistent at construction.
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// The hydrology input is malformed or incomplete.
    #[error("hydrology input: {0}")]
    Hydrology(String),

    /// Failed to parse CSV data.
    #[error("failed to parse CSV: {0}")]
    CsvParse(#[from] csv::Error),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
