//! Typed failures that callers may want to match on

use thiserror::Error;

/// Errors raised before any dashboard computation runs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DashboardError {
    /// An input table lacks a column the pipeline depends on
    #[error("table '{table}' is missing required column '{column}'")]
    MissingColumn { table: &'static str, column: String },

    /// A date supplied on the command line could not be parsed
    #[error("invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    /// No date range was given and none could be derived from the orders
    #[error("orders table has no purchase timestamps; pass --start and --end explicitly")]
    NoPurchaseDates,
}
