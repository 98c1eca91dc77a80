//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use crate::error::DashboardError;
use crate::filter::{DateRange, EndBoundary};

/// Sales dashboard with date-filtered RFM customer segmentation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding the cleaned CSV tables
    #[arg(short, long, default_value = "dashboard")]
    pub data_dir: PathBuf,

    /// First purchase date to include (YYYY-MM-DD); defaults to the earliest order
    #[arg(short, long)]
    pub start: Option<String>,

    /// Last purchase date to include (YYYY-MM-DD); defaults to the latest order
    #[arg(short, long)]
    pub end: Option<String>,

    /// Treat the end date as midnight, dropping orders placed later that day
    #[arg(long)]
    pub legacy_end_bound: bool,

    /// Directory to write PNG charts into
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the full report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Resolve the requested date range, falling back to the dataset's span
    ///
    /// Expected format: "YYYY-MM-DD". An inverted range is returned as-is; the
    /// dashboard reports it as a warning.
    pub fn date_range(&self, span: Option<(NaiveDate, NaiveDate)>) -> crate::Result<DateRange> {
        let start = match self.start.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => span.ok_or(DashboardError::NoPurchaseDates)?.0,
        };
        let end = match self.end.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => span.ok_or(DashboardError::NoPurchaseDates)?.1,
        };

        let boundary = if self.legacy_end_bound {
            EndBoundary::Midnight
        } else {
            EndBoundary::EndOfDay
        };
        Ok(DateRange::new(start, end).with_end_boundary(boundary))
    }
}

pub fn parse_date(raw: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        DashboardError::InvalidDate {
            value: raw.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(start: Option<&str>, end: Option<&str>) -> Args {
        Args {
            data_dir: PathBuf::from("dashboard"),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
            legacy_end_bound: false,
            output: None,
            json: false,
            verbose: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range() {
        let span = Some((date(2016, 9, 4), date(2018, 10, 17)));

        let range = args(Some("2017-01-01"), Some("2017-12-31")).date_range(span).unwrap();
        assert_eq!(range.start, date(2017, 1, 1));
        assert_eq!(range.end, date(2017, 12, 31));
        assert_eq!(range.end_boundary, EndBoundary::EndOfDay);

        let defaulted = args(None, Some("2017-12-31")).date_range(span).unwrap();
        assert_eq!(defaulted.start, date(2016, 9, 4));

        let mut legacy = args(None, None);
        legacy.legacy_end_bound = true;
        let range = legacy.date_range(span).unwrap();
        assert_eq!(range.end, date(2018, 10, 17));
        assert_eq!(range.end_boundary, EndBoundary::Midnight);
    }

    #[test]
    fn test_invalid_dates() {
        let err = args(Some("31/12/2017"), None)
            .date_range(Some((date(2017, 1, 1), date(2017, 1, 2))))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<DashboardError>(),
            Some(&DashboardError::InvalidDate {
                value: "31/12/2017".to_string()
            })
        );

        let err = args(None, None).date_range(None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DashboardError>(),
            Some(&DashboardError::NoPurchaseDates)
        );
    }

    #[test]
    fn test_inverted_range_is_kept() {
        let range = args(Some("2018-01-01"), Some("2017-01-01")).date_range(None).unwrap();
        assert!(range.is_inverted());
    }

    #[test]
    fn test_cli_parses() {
        let parsed = Args::try_parse_from([
            "salesforge",
            "--data-dir",
            "data",
            "--start",
            "2017-01-01",
            "--legacy-end-bound",
            "--json",
        ])
        .unwrap();
        assert_eq!(parsed.data_dir, PathBuf::from("data"));
        assert_eq!(parsed.start.as_deref(), Some("2017-01-01"));
        assert!(parsed.legacy_end_bound);
        assert!(parsed.json);
        assert!(parsed.output.is_none());
    }
}
