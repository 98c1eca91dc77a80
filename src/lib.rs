//! SalesForge: a date-filtered sales dashboard over an e-commerce dataset
//!
//! The centre of the crate is the RFM (Recency, Frequency, Monetary)
//! pipeline: filter orders by purchase date, aggregate delivered orders per
//! customer, score each dimension by rank quintiles and label segments.

pub mod cli;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod filter;
pub mod insights;
pub mod model;
pub mod summary;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use dashboard::{build_report, DashboardReport};
pub use data::Tables;
pub use error::DashboardError;
pub use filter::{filter_orders, DateRange, EndBoundary};
pub use model::{score_customers, RfmOutcome, RfmRecord, Segment};
pub use summary::{summarize_customers, CustomerSummary, TransactionSummary};
pub use viz::{print_report, render_report};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
